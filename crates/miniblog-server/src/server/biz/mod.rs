//! Business rules behind every operation.
//!
//! Handlers receive the [`RequestContext`] built by the interceptor chain (or
//! the HTTP middleware) and an already defaulted and validated request.

mod post;
mod user;

pub use post::PostBiz;
pub use user::UserBiz;

use crate::server::auth::TokenManager;
use crate::server::pipeline::RequestContext;
use crate::server::store::{PostStore, StoreError, TIME_FORMAT, UserStore};
use chrono::Local;
use miniblog_core::Error;
use miniblog_core::proto::{HealthzResponse, ServiceStatus};
use std::sync::Arc;

/// Entry point for the business layer.
pub struct Biz {
    users: UserBiz,
    posts: PostBiz,
}

impl Biz {
    pub fn new(
        users: Arc<dyn UserStore>,
        posts: Arc<dyn PostStore>,
        tokens: TokenManager,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            users: UserBiz::new(users, posts.clone(), tokens, bcrypt_cost),
            posts: PostBiz::new(posts),
        }
    }

    pub fn users(&self) -> &UserBiz {
        &self.users
    }

    pub fn posts(&self) -> &PostBiz {
        &self.posts
    }

    pub fn healthz(&self) -> HealthzResponse {
        HealthzResponse {
            status: ServiceStatus::Healthy.into(),
            timestamp: Local::now().format(TIME_FORMAT).to_string(),
            message: String::new(),
        }
    }
}

/// The authenticated caller's user ID.
fn caller(ctx: &RequestContext) -> Result<&str, Error> {
    ctx.user_id()
        .ok_or_else(|| Error::Unauthenticated("request has no authenticated user".into()))
}

fn internal(err: StoreError) -> Error {
    tracing::error!(error = %err, "store operation failed");
    Error::Internal(err.to_string())
}

fn page_bounds(offset: i64, limit: i64) -> (usize, usize) {
    (
        usize::try_from(offset).unwrap_or(0),
        usize::try_from(limit).unwrap_or(0),
    )
}
