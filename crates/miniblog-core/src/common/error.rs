//! Error types for the blog API.
//!
//! This module defines the central `Error` enum, which captures every
//! per-request failure a caller can observe. It implements `From<Error>` for
//! `tonic::Status` so handlers and pipeline stages can return it with `?`. The
//! stable reason string travels alongside the status in the
//! [`ERROR_REASON_KEY`] metadata entry so HTTP front-ends can render the same
//! error body as a direct call would.
//!
//! ## Error Cases
//! - `TokenInvalid`: the bearer token is missing, malformed, expired or was
//!   signed with another key.
//! - `Unauthenticated`: the token is valid but its subject is unknown.
//! - `PermissionDenied`: the policy decision for the call was deny.
//! - `InvalidArgument`: the request failed validation.
//! - `UserAlreadyExists`, `UserNotFound`, `PostNotFound`,
//!   `PasswordIncorrect`: business-rule failures.
//! - `Internal`: anything the caller cannot act on.

use tonic::metadata::MetadataValue;
use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Metadata key carrying [`Error::reason`] on error statuses.
pub const ERROR_REASON_KEY: &str = "x-error-reason";

/// Unified per-request error type.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Bearer token absent, malformed, expired or signature-mismatched.
    #[error("Token invalid: {0}")]
    TokenInvalid(String),

    /// The token subject does not resolve to a known user.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// The authorization policy denied the call.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The request violated a validation rule.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("User not found")]
    UserNotFound,

    #[error("Post not found")]
    PostNotFound,

    #[error("Password is incorrect")]
    PasswordIncorrect,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable, machine-readable reason, e.g. `Unauthenticated.TokenInvalid`.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::TokenInvalid(_) => "Unauthenticated.TokenInvalid",
            Self::Unauthenticated(_) => "Unauthenticated",
            Self::PermissionDenied(_) => "PermissionDenied",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::UserAlreadyExists => "AlreadyExists.UserAlreadyExists",
            Self::UserNotFound => "NotFound.UserNotFound",
            Self::PostNotFound => "NotFound.PostNotFound",
            Self::PasswordIncorrect => "Unauthenticated.PasswordIncorrect",
            Self::Internal(_) => "InternalError",
        }
    }

    /// gRPC status code for this error.
    #[must_use]
    pub fn code(&self) -> Code {
        match self {
            Self::TokenInvalid(_) | Self::Unauthenticated(_) | Self::PasswordIncorrect => {
                Code::Unauthenticated
            }
            Self::PermissionDenied(_) => Code::PermissionDenied,
            Self::InvalidArgument(_) => Code::InvalidArgument,
            Self::UserAlreadyExists => Code::AlreadyExists,
            Self::UserNotFound | Self::PostNotFound => Code::NotFound,
            Self::Internal(_) => Code::Internal,
        }
    }

    /// HTTP status code used by the plain HTTP front-end.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        http_status_from_code(self.code())
    }
}

/// Maps a gRPC status code to the HTTP status the gateway responds with.
///
/// Follows the mapping used by grpc-gateway so JSON clients see the same
/// status regardless of which HTTP front-end served them.
#[must_use]
pub fn http_status_from_code(code: Code) -> u16 {
    match code {
        Code::Ok => 200,
        Code::Cancelled => 499,
        Code::InvalidArgument | Code::OutOfRange | Code::FailedPrecondition => 400,
        Code::DeadlineExceeded => 504,
        Code::NotFound => 404,
        Code::AlreadyExists | Code::Aborted => 409,
        Code::PermissionDenied => 403,
        Code::Unauthenticated => 401,
        Code::ResourceExhausted => 429,
        Code::Unimplemented => 501,
        Code::Unavailable => 503,
        Code::Unknown | Code::Internal | Code::DataLoss => 500,
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        let mut status = Status::new(err.code(), err.to_string());
        status
            .metadata_mut()
            .insert(ERROR_REASON_KEY, MetadataValue::from_static(err.reason()));
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_carries_code_message_and_reason() {
        let status = Status::from(Error::TokenInvalid("token is expired".into()));
        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(status.message(), "Token invalid: token is expired");
        assert_eq!(
            status.metadata().get(ERROR_REASON_KEY).unwrap(),
            "Unauthenticated.TokenInvalid"
        );
    }

    #[test]
    fn duplicate_user_maps_to_conflict() {
        let err = Error::UserAlreadyExists;
        assert_eq!(err.code(), Code::AlreadyExists);
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn validation_and_policy_failures_map_to_client_errors() {
        assert_eq!(Error::InvalidArgument("x".into()).http_status(), 400);
        assert_eq!(Error::PermissionDenied("x".into()).http_status(), 403);
        assert_eq!(Error::Unauthenticated("x".into()).http_status(), 401);
        assert_eq!(Error::Internal("x".into()).http_status(), 500);
    }
}
