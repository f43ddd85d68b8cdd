#![allow(dead_code)]

use miniblog_core::proto::CreateUserRequest;
use miniblog_server::server::lifecycle::LifecycleState;
use miniblog_server::{HttpAuthPolicy, ServerConfig, ServerError, ServerMode, UnionServer};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const JWT_KEY: &str = "integration-secret";
pub const ROOT_PASSWORD: &str = "rootpass123";

pub fn config(mode: ServerMode) -> ServerConfig {
    ServerConfig {
        mode,
        grpc_addr: "127.0.0.1:0".parse().unwrap(),
        http_addr: "127.0.0.1:0".parse().unwrap(),
        tls: None,
        jwt_key: JWT_KEY.into(),
        token_ttl: Duration::from_secs(60),
        shutdown_timeout: Duration::from_secs(5),
        rpc_ready_timeout: Duration::from_secs(5),
        http_auth: HttpAuthPolicy::Jwt,
        bcrypt_cost: 4,
        root_password: Some(ROOT_PASSWORD.into()),
    }
}

pub struct Running {
    pub rpc: Option<SocketAddr>,
    pub gateway: Option<SocketAddr>,
    pub http: Option<SocketAddr>,
    pub lifecycle: watch::Receiver<LifecycleState>,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), ServerError>>,
}

impl Running {
    pub fn rpc_url(&self) -> String {
        format!("http://{}", self.rpc.unwrap())
    }

    /// Base URL of whichever HTTP listener is up.
    pub fn http_url(&self) -> String {
        format!("http://{}", self.gateway.or(self.http).unwrap())
    }

    pub fn https_url(&self) -> String {
        format!("https://{}", self.gateway.or(self.http).unwrap())
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        self.task.await.unwrap().unwrap();
        assert_eq!(*self.lifecycle.borrow(), LifecycleState::Stopped);
    }
}

pub async fn start(config: ServerConfig) -> Running {
    let server = UnionServer::new(config).await.unwrap();
    Running {
        rpc: server.listener("rpc"),
        gateway: server.listener("gateway"),
        http: server.listener("http"),
        lifecycle: server.lifecycle(),
        shutdown: server.shutdown_token(),
        task: tokio::spawn(server.run()),
    }
}

pub fn new_user(username: &str) -> CreateUserRequest {
    CreateUserRequest {
        username: username.into(),
        password: "miniblog1234".into(),
        nickname: None,
        email: format!("{username}@example.com"),
        phone: "18110000000".into(),
    }
}

pub fn user_json(username: &str) -> serde_json::Value {
    serde_json::json!({
        "username": username,
        "password": "miniblog1234",
        "email": format!("{username}@example.com"),
        "phone": "18110000000",
    })
}
