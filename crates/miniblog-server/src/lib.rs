#![doc = include_str!("../README.md")]

pub mod server;

pub use server::config::{CliArgs, HttpAuthPolicy, ServerConfig, ServerMode, TlsConfig};
pub use server::error::ServerError;
pub use server::lifecycle::LifecycleState;
pub use server::union::{Dependencies, UnionServer};
