//! Per-request defaulting and validation.
//!
//! Every request message implements [`ApiRequest`]. The pipeline applies
//! [`ApiRequest::set_defaults`] before [`ApiRequest::validate`], so a field
//! that validation requires is accepted when a default fills it in. Validation
//! reports only the first violation it finds.

use crate::proto::*;
use crate::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Page size applied to list requests that leave `limit` at zero.
pub const DEFAULT_LIMIT: i64 = 20;
/// Largest page size a list request may ask for.
pub const MAX_LIMIT: i64 = 100;

static USERNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9_]{4,20}$").expect("valid regex")
});
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("valid regex")
});
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{11}$").expect("valid regex")
});

/// Behaviour the request pipeline needs from a decoded request message.
pub trait ApiRequest {
    /// Fills in field-level defaults. Never fails.
    fn set_defaults(&mut self) {}

    /// Checks the request, returning the first violation as
    /// [`Error::InvalidArgument`].
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Resource the call acts on, passed to the authorization policy.
    fn target(&self) -> &str {
        "*"
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidArgument(msg.into())
}

fn char_len_between(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(invalid(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

fn non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(invalid(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn username(value: &str) -> Result<()> {
    if !USERNAME_RE.is_match(value) {
        return Err(invalid(
            "username must be 4-20 characters of lowercase letters, digits or underscores",
        ));
    }
    Ok(())
}

fn password(field: &str, value: &str) -> Result<()> {
    char_len_between(field, value, 6, 18)
}

fn nickname(value: &str) -> Result<()> {
    char_len_between("nickname", value, 1, 30)
}

fn email(value: &str) -> Result<()> {
    if !EMAIL_RE.is_match(value) {
        return Err(invalid("email is not a valid address"));
    }
    Ok(())
}

fn phone(value: &str) -> Result<()> {
    if !PHONE_RE.is_match(value) {
        return Err(invalid("phone must be 11 digits"));
    }
    Ok(())
}

fn title(value: &str) -> Result<()> {
    char_len_between("title", value, 1, 256)
}

fn page(offset: i64, limit: i64) -> Result<()> {
    if offset < 0 {
        return Err(invalid("offset must not be negative"));
    }
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(invalid(format!("limit must be between 1 and {MAX_LIMIT}")));
    }
    Ok(())
}

impl ApiRequest for HealthzRequest {}

impl ApiRequest for RefreshTokenRequest {}

impl ApiRequest for LoginRequest {
    fn validate(&self) -> Result<()> {
        non_empty("username", &self.username)?;
        non_empty("password", &self.password)
    }
}

impl ApiRequest for ChangePasswordRequest {
    fn validate(&self) -> Result<()> {
        non_empty("userId", &self.user_id)?;
        password("newPassword", &self.new_password)
    }

    fn target(&self) -> &str {
        &self.user_id
    }
}

impl ApiRequest for CreateUserRequest {
    fn set_defaults(&mut self) {
        if self.nickname.as_deref().is_none_or(str::is_empty) {
            self.nickname = Some(self.username.clone());
        }
    }

    fn validate(&self) -> Result<()> {
        username(&self.username)?;
        password("password", &self.password)?;
        nickname(self.nickname.as_deref().unwrap_or_default())?;
        email(&self.email)?;
        phone(&self.phone)
    }
}

impl ApiRequest for UpdateUserRequest {
    fn validate(&self) -> Result<()> {
        non_empty("userId", &self.user_id)?;
        if let Some(value) = &self.username {
            username(value)?;
        }
        if let Some(value) = &self.nickname {
            nickname(value)?;
        }
        if let Some(value) = &self.email {
            email(value)?;
        }
        if let Some(value) = &self.phone {
            phone(value)?;
        }
        Ok(())
    }

    fn target(&self) -> &str {
        &self.user_id
    }
}

impl ApiRequest for DeleteUserRequest {
    fn validate(&self) -> Result<()> {
        non_empty("userId", &self.user_id)
    }

    fn target(&self) -> &str {
        &self.user_id
    }
}

impl ApiRequest for GetUserRequest {
    fn validate(&self) -> Result<()> {
        non_empty("userId", &self.user_id)
    }

    fn target(&self) -> &str {
        &self.user_id
    }
}

impl ApiRequest for ListUserRequest {
    fn set_defaults(&mut self) {
        if self.limit == 0 {
            self.limit = DEFAULT_LIMIT;
        }
    }

    fn validate(&self) -> Result<()> {
        page(self.offset, self.limit)
    }
}

impl ApiRequest for CreatePostRequest {
    fn validate(&self) -> Result<()> {
        title(&self.title)?;
        non_empty("content", &self.content)
    }
}

impl ApiRequest for UpdatePostRequest {
    fn validate(&self) -> Result<()> {
        non_empty("postId", &self.post_id)?;
        if let Some(value) = &self.title {
            title(value)?;
        }
        if let Some(value) = &self.content {
            non_empty("content", value)?;
        }
        Ok(())
    }

    fn target(&self) -> &str {
        &self.post_id
    }
}

impl ApiRequest for DeletePostRequest {
    fn validate(&self) -> Result<()> {
        if self.post_ids.is_empty() {
            return Err(invalid("postIds must contain at least one post ID"));
        }
        if self.post_ids.iter().any(String::is_empty) {
            return Err(invalid("postIds cannot contain an empty post ID"));
        }
        Ok(())
    }
}

impl ApiRequest for GetPostRequest {
    fn validate(&self) -> Result<()> {
        non_empty("postId", &self.post_id)
    }

    fn target(&self) -> &str {
        &self.post_id
    }
}

impl ApiRequest for ListPostRequest {
    fn set_defaults(&mut self) {
        if self.limit == 0 {
            self.limit = DEFAULT_LIMIT;
        }
    }

    fn validate(&self) -> Result<()> {
        page(self.offset, self.limit)
    }
}
