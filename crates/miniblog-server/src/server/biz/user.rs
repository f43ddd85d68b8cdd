use super::{caller, internal, page_bounds};
use crate::server::auth::{Identity, ROOT_USER_ID, ROOT_USERNAME, TokenManager};
use crate::server::pipeline::RequestContext;
use crate::server::store::{NewUser, PostStore, StoreError, UserRecord, UserStore};
use miniblog_core::Error;
use miniblog_core::proto::*;
use std::sync::Arc;

pub struct UserBiz {
    users: Arc<dyn UserStore>,
    posts: Arc<dyn PostStore>,
    tokens: TokenManager,
    bcrypt_cost: u32,
}

impl UserBiz {
    pub fn new(
        users: Arc<dyn UserStore>,
        posts: Arc<dyn PostStore>,
        tokens: TokenManager,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            users,
            posts,
            tokens,
            bcrypt_cost,
        }
    }

    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, Error> {
        let user = self.load_by_username(&req.username).await?;
        if !verify_password(req.password, user.password_hash.clone()).await? {
            return Err(Error::PasswordIncorrect);
        }
        let issued = self.tokens.issue(&user.user_id)?;
        tracing::info!(user_id = %user.user_id, "user logged in");
        Ok(LoginResponse {
            token: issued.token,
            expire_at: issued.expire_at,
        })
    }

    pub async fn refresh_token(
        &self,
        ctx: &RequestContext,
        _req: RefreshTokenRequest,
    ) -> Result<RefreshTokenResponse, Error> {
        let issued = self.tokens.issue(caller(ctx)?)?;
        Ok(RefreshTokenResponse {
            token: issued.token,
            expire_at: issued.expire_at,
        })
    }

    pub async fn change_password(
        &self,
        ctx: &RequestContext,
        req: ChangePasswordRequest,
    ) -> Result<ChangePasswordResponse, Error> {
        ensure_self_or_root(ctx, &req.user_id)?;
        let mut user = self.load(&req.user_id).await?;
        if !verify_password(req.old_password, user.password_hash.clone()).await? {
            return Err(Error::PasswordIncorrect);
        }
        user.password_hash = hash_password(req.new_password, self.bcrypt_cost).await?;
        self.users.update(user).await.map_err(user_error)?;
        Ok(ChangePasswordResponse {})
    }

    pub async fn create_user(&self, req: CreateUserRequest) -> Result<CreateUserResponse, Error> {
        let password_hash = hash_password(req.password, self.bcrypt_cost).await?;
        let user = self
            .users
            .create(NewUser {
                nickname: req.nickname.unwrap_or_else(|| req.username.clone()),
                username: req.username,
                password_hash,
                email: req.email,
                phone: req.phone,
            })
            .await
            .map_err(user_error)?;
        tracing::info!(user_id = %user.user_id, username = %user.username, "user created");
        Ok(CreateUserResponse {
            user_id: user.user_id,
        })
    }

    pub async fn update_user(
        &self,
        ctx: &RequestContext,
        req: UpdateUserRequest,
    ) -> Result<UpdateUserResponse, Error> {
        ensure_self_or_root(ctx, &req.user_id)?;
        let renames = req.username.as_deref().is_some_and(|u| u != ROOT_USERNAME);
        if req.user_id == ROOT_USER_ID && renames {
            return Err(Error::PermissionDenied("the root account cannot be renamed".into()));
        }
        let mut user = self.load(&req.user_id).await?;
        if let Some(username) = req.username {
            user.username = username;
        }
        if let Some(nickname) = req.nickname {
            user.nickname = nickname;
        }
        if let Some(email) = req.email {
            user.email = email;
        }
        if let Some(phone) = req.phone {
            user.phone = phone;
        }
        self.users.update(user).await.map_err(user_error)?;
        Ok(UpdateUserResponse {})
    }

    pub async fn delete_user(
        &self,
        ctx: &RequestContext,
        req: DeleteUserRequest,
    ) -> Result<DeleteUserResponse, Error> {
        ensure_self_or_root(ctx, &req.user_id)?;
        if req.user_id == ROOT_USER_ID {
            return Err(Error::PermissionDenied("the root account cannot be deleted".into()));
        }
        self.posts
            .delete_by_user(&req.user_id)
            .await
            .map_err(internal)?;
        self.users.delete(&req.user_id).await.map_err(internal)?;
        tracing::info!(user_id = %req.user_id, "user deleted");
        Ok(DeleteUserResponse {})
    }

    pub async fn get_user(
        &self,
        ctx: &RequestContext,
        req: GetUserRequest,
    ) -> Result<GetUserResponse, Error> {
        ensure_self_or_root(ctx, &req.user_id)?;
        let user = self.load(&req.user_id).await?;
        let post_count = self
            .posts
            .count_by_user(&user.user_id)
            .await
            .map_err(internal)?;
        Ok(GetUserResponse {
            user: Some(user.to_proto(post_count)),
        })
    }

    pub async fn list_user(
        &self,
        _ctx: &RequestContext,
        req: ListUserRequest,
    ) -> Result<ListUserResponse, Error> {
        let (offset, limit) = page_bounds(req.offset, req.limit);
        let page = self.users.list(offset, limit).await.map_err(internal)?;

        let mut users = Vec::with_capacity(page.items.len());
        for user in &page.items {
            let post_count = self
                .posts
                .count_by_user(&user.user_id)
                .await
                .map_err(internal)?;
            users.push(user.to_proto(post_count));
        }
        Ok(ListUserResponse {
            total_count: page.total,
            users,
        })
    }

    async fn load(&self, user_id: &str) -> Result<UserRecord, Error> {
        self.users.get(user_id).await.map_err(user_error)
    }

    async fn load_by_username(&self, username: &str) -> Result<UserRecord, Error> {
        self.users
            .get_by_username(username)
            .await
            .map_err(user_error)
    }
}

fn user_error(err: StoreError) -> Error {
    match err {
        StoreError::Duplicate(_) => Error::UserAlreadyExists,
        StoreError::NotFound => Error::UserNotFound,
    }
}

/// Users may act on themselves; the root account may act on anyone.
fn ensure_self_or_root(ctx: &RequestContext, user_id: &str) -> Result<(), Error> {
    let caller = caller(ctx)?;
    if caller == user_id || ctx.identity().is_some_and(Identity::is_root) {
        return Ok(());
    }
    Err(Error::PermissionDenied(format!(
        "user `{caller}` may not act on user `{user_id}`"
    )))
}

async fn hash_password(password: String, cost: u32) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| Error::Internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| Error::Internal(format!("failed to hash password: {e}")))
}

async fn verify_password(password: String, hash: String) -> Result<bool, Error> {
    // Locked account.
    if hash.is_empty() {
        return Ok(false);
    }
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| Error::Internal(format!("password check task failed: {e}")))?
        .map_err(|e| Error::Internal(format!("failed to verify password: {e}")))
}
