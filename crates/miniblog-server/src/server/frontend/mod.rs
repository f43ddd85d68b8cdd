//! Network front-ends.
//!
//! A [`FrontEnd`] owns one or more bound listeners. [`selector::select`]
//! builds the front-end for the configured [`ServerMode`]:
//!
//! | mode           | front-end                                          |
//! |----------------|----------------------------------------------------|
//! | `grpc`         | [`RpcFrontEnd`]                                    |
//! | `grpc-gateway` | [`CompositeFrontEnd`] of [`GatewayFrontEnd`] + RPC |
//! | `http`         | [`HttpFrontEnd`]                                   |
//!
//! Listeners are bound during construction, so a bind failure surfaces before
//! the lifecycle reaches `Running`.
//!
//! [`ServerMode`]: crate::server::config::ServerMode

mod composite;
mod gateway;
mod grpc;
mod http;
mod listener;
mod rest;
pub mod selector;
mod stop;

pub use composite::CompositeFrontEnd;
pub use gateway::GatewayFrontEnd;
pub use grpc::RpcFrontEnd;
pub use http::HttpFrontEnd;
pub use stop::StopHandle;

use crate::server::error::ServerError;
use std::net::SocketAddr;
use std::time::Duration;

#[tonic::async_trait]
pub trait FrontEnd: Send + Sync {
    fn name(&self) -> &'static str;

    /// Bound listener addresses, one per listener, labelled by front-end.
    fn listeners(&self) -> Vec<(&'static str, SocketAddr)>;

    /// Serves until stopped. Returns early only on failure.
    async fn run(&self) -> Result<(), ServerError>;

    /// Stops accepting, drains in-flight requests and force-closes whatever
    /// is left once `deadline` passes. Calling it again is a no-op.
    async fn graceful_stop(&self, deadline: Duration) -> Result<(), ServerError>;
}
