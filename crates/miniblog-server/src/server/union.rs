use crate::server::auth::{
    Authorizer, IdentityResolver, PolicyAuthorizer, ROOT_USER_SEQ, ROOT_USERNAME,
    StoreUserRetriever, TokenManager,
};
use crate::server::biz::Biz;
use crate::server::config::{HttpAuthPolicy, ServerConfig};
use crate::server::error::ServerError;
use crate::server::exemption::ExemptionSet;
use crate::server::frontend::{FrontEnd, selector};
use crate::server::lifecycle::{self, Coordinator, LifecycleState};
use crate::server::pipeline::InterceptorChain;
use crate::server::service::MiniBlogService;
use crate::server::store::{MemoryStore, NewUser};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Everything the front-ends are built from, wired by explicit constructor
/// composition.
#[derive(Clone)]
pub struct Dependencies {
    pub exemptions: ExemptionSet,
    pub resolver: IdentityResolver,
    pub authorizer: Arc<dyn Authorizer>,
    pub biz: Arc<Biz>,
    pub http_auth: HttpAuthPolicy,
}

impl Dependencies {
    /// In-memory store with the root account provisioned, HS256 tokens and
    /// the default policy.
    pub fn assemble(config: &ServerConfig) -> Result<Self, ServerError> {
        let store = Arc::new(MemoryStore::new());
        provision_root(&store, config)?;
        let tokens = TokenManager::new(&config.jwt_key, config.token_ttl);
        let resolver =
            IdentityResolver::new(tokens.clone(), Arc::new(StoreUserRetriever::new(store.clone())));
        let biz = Biz::new(store.clone(), store, tokens, config.bcrypt_cost);

        Ok(Self {
            exemptions: ExemptionSet::default(),
            resolver,
            authorizer: Arc::new(PolicyAuthorizer),
            biz: Arc::new(biz),
            http_auth: config.http_auth,
        })
    }

    pub fn chain(&self) -> InterceptorChain {
        InterceptorChain::new(
            self.exemptions.clone(),
            self.resolver.clone(),
            self.authorizer.clone(),
        )
    }

    pub fn service(&self) -> MiniBlogService {
        MiniBlogService::new(self.chain(), self.biz.clone())
    }
}

/// Inserts the root account ahead of every other user, so the username can
/// never be claimed by signing up. Without a configured password the account
/// is locked.
fn provision_root(store: &MemoryStore, config: &ServerConfig) -> Result<(), ServerError> {
    let password_hash = match &config.root_password {
        Some(password) => bcrypt::hash(password, config.bcrypt_cost)
            .map_err(|e| ServerError::Provision(e.to_string()))?,
        None => {
            tracing::warn!("ROOT_PASSWORD not set, the root account is locked");
            String::new()
        }
    };
    let root = store
        .provision_user(
            ROOT_USER_SEQ,
            NewUser {
                username: ROOT_USERNAME.into(),
                password_hash,
                nickname: ROOT_USERNAME.into(),
                email: String::new(),
                phone: String::new(),
            },
        )
        .map_err(|e| ServerError::Provision(e.to_string()))?;
    tracing::info!(user_id = %root.user_id, "root account provisioned");
    Ok(())
}

/// The server process: one front-end selected by mode, driven by the
/// lifecycle coordinator.
pub struct UnionServer {
    frontend: Arc<dyn FrontEnd>,
    coordinator: Coordinator,
}

impl UnionServer {
    /// Assembles dependencies and binds every listener for `config.mode`.
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        Self::with_dependencies(&config, &Dependencies::assemble(&config)?).await
    }

    pub async fn with_dependencies(
        config: &ServerConfig,
        deps: &Dependencies,
    ) -> Result<Self, ServerError> {
        let frontend = selector::select(config, deps).await?;
        Ok(Self {
            frontend,
            coordinator: Coordinator::new(config.shutdown_timeout),
        })
    }

    pub fn listeners(&self) -> Vec<(&'static str, SocketAddr)> {
        self.frontend.listeners()
    }

    /// Address of the listener labelled `name`, e.g. `rpc` or `gateway`.
    pub fn listener(&self, name: &str) -> Option<SocketAddr> {
        self.listeners()
            .into_iter()
            .find_map(|(n, addr)| (n == name).then_some(addr))
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.coordinator.shutdown_token()
    }

    pub fn lifecycle(&self) -> watch::Receiver<LifecycleState> {
        self.coordinator.subscribe()
    }

    /// Serves until SIGINT, SIGTERM or [`Self::shutdown_token`] is cancelled,
    /// then shuts down within the configured deadline.
    pub async fn run(self) -> Result<(), ServerError> {
        for (name, addr) in self.listeners() {
            tracing::info!(name, %addr, "listening");
        }
        let signals = tokio::spawn(lifecycle::cancel_on_signal(self.shutdown_token()));
        let res = self.coordinator.run(self.frontend).await;
        signals.abort();
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::auth::ROOT_USER_ID;
    use crate::server::config::ServerMode;
    use miniblog_core::Error;
    use miniblog_core::proto::{CreateUserRequest, LoginRequest};
    use std::time::Duration;

    fn config(root_password: Option<&str>) -> ServerConfig {
        ServerConfig {
            mode: ServerMode::Grpc,
            grpc_addr: "127.0.0.1:0".parse().unwrap(),
            http_addr: "127.0.0.1:0".parse().unwrap(),
            tls: None,
            jwt_key: "union-secret".into(),
            token_ttl: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(1),
            rpc_ready_timeout: Duration::from_secs(1),
            http_auth: HttpAuthPolicy::Jwt,
            bcrypt_cost: 4,
            root_password: root_password.map(str::to_owned),
        }
    }

    fn login(password: &str) -> LoginRequest {
        LoginRequest {
            username: ROOT_USERNAME.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn root_username_is_taken_from_the_start() {
        let deps = Dependencies::assemble(&config(Some("rootpass123"))).unwrap();
        let err = deps
            .biz
            .users()
            .create_user(CreateUserRequest {
                username: ROOT_USERNAME.into(),
                password: "miniblog1234".into(),
                nickname: None,
                email: "root@example.com".into(),
                phone: "18110000000".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, Error::UserAlreadyExists);

        let token = deps.biz.users().login(login("rootpass123")).await.unwrap().token;
        let identity = deps
            .resolver
            .resolve(&http::HeaderMap::from_iter([(
                http::header::AUTHORIZATION,
                format!("Bearer {token}").parse().unwrap(),
            )]))
            .await
            .unwrap();
        assert_eq!(identity.user_id, ROOT_USER_ID);
        assert!(identity.is_root());
    }

    #[tokio::test]
    async fn root_is_locked_without_a_password() {
        let deps = Dependencies::assemble(&config(None)).unwrap();
        let err = deps.biz.users().login(login("")).await.unwrap_err();
        assert_eq!(err, Error::PasswordIncorrect);
        let err = deps.biz.users().login(login("miniblog1234")).await.unwrap_err();
        assert_eq!(err, Error::PasswordIncorrect);
    }
}
