//! Process-level errors.
//!
//! Per-request failures live in [`miniblog_core::Error`]; this enum covers
//! construction, listening, serving and shutdown of the front-ends.

use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configured mode is not one of `grpc`, `grpc-gateway` or `http`.
    #[error("invalid server mode `{0}`, expected one of: grpc, grpc-gateway, http")]
    InvalidServerMode(String),

    /// A listener could not be bound. Fatal.
    #[error("{name} front-end failed to listen on {addr}: {source}")]
    Listen {
        name: &'static str,
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The root account could not be provisioned.
    #[error("failed to provision the root account: {0}")]
    Provision(String),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// The RPC front-end did not report `SERVING` within the readiness bound.
    #[error("RPC front-end was not ready within {0:?}")]
    NotReady(Duration),

    /// Graceful stop exceeded its deadline and the front-end was force-closed.
    #[error("{name} front-end did not drain within {deadline:?}, force-closed")]
    ShutdownTimeout {
        name: &'static str,
        deadline: Duration,
    },

    /// A front-end stopped serving because of an I/O or runtime failure.
    #[error("{name} front-end failed: {reason}")]
    Serve { name: &'static str, reason: String },
}
