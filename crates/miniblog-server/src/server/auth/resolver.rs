use super::ROOT_USER_ID;
use super::carrier::CredentialCarrier;
use super::token::TokenManager;
use crate::server::store::{StoreError, UserStore};
use miniblog_core::Error;
use miniblog_core::proto::User;
use std::sync::Arc;

/// The authenticated caller. Attached once per request and never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

impl Identity {
    /// Root rights follow the provisioned account, not the username.
    pub fn is_root(&self) -> bool {
        self.user_id == ROOT_USER_ID
    }
}

/// Looks up users by ID on behalf of the resolver.
#[tonic::async_trait]
pub trait UserRetriever: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<User, Error>;
}

/// [`UserRetriever`] backed by the user store.
#[derive(Clone)]
pub struct StoreUserRetriever {
    users: Arc<dyn UserStore>,
}

impl StoreUserRetriever {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

#[tonic::async_trait]
impl UserRetriever for StoreUserRetriever {
    async fn get_user(&self, user_id: &str) -> Result<User, Error> {
        match self.users.get(user_id).await {
            Ok(record) => Ok(record.to_proto(0)),
            Err(StoreError::NotFound) => Err(Error::UserNotFound),
            Err(e) => Err(Error::Internal(e.to_string())),
        }
    }
}

/// Resolves a request's credential to an [`Identity`].
#[derive(Clone)]
pub struct IdentityResolver {
    tokens: TokenManager,
    users: Arc<dyn UserRetriever>,
}

impl IdentityResolver {
    pub fn new(tokens: TokenManager, users: Arc<dyn UserRetriever>) -> Self {
        Self { tokens, users }
    }

    /// Verifies the bearer token in `carrier` and loads its subject.
    ///
    /// Fails with [`Error::TokenInvalid`] when the token is absent or does not
    /// verify, and with [`Error::Unauthenticated`] when its subject is unknown.
    pub async fn resolve<C>(&self, carrier: &C) -> Result<Identity, Error>
    where
        C: CredentialCarrier + Sync + ?Sized,
    {
        let token = carrier
            .bearer_token()
            .ok_or_else(|| Error::TokenInvalid("missing bearer token".into()))?;
        let user_id = self.tokens.verify(token)?;
        self.identify(&user_id).await
    }

    /// Loads the identity for an already-trusted user ID.
    pub async fn identify(&self, user_id: &str) -> Result<Identity, Error> {
        let user = self.users.get_user(user_id).await.map_err(|e| {
            tracing::debug!(user_id, error = %e, "token subject did not resolve");
            Error::Unauthenticated(format!("user `{user_id}` does not exist"))
        })?;
        Ok(Identity {
            user_id: user.user_id,
            username: user.username,
        })
    }
}
