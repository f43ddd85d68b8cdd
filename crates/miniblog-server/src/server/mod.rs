//! Server internals, leaf-first:
//!
//! - [`auth`] - bearer tokens, credential carriers, identity resolution and
//!   the authorization policy.
//! - [`exemption`] - operations that bypass authentication and authorization.
//! - [`pipeline`] - the interceptor chain wrapped around every gRPC call.
//! - [`store`] and [`biz`] - persistence and business rules.
//! - [`service`] - the tonic `MiniBlog` implementation.
//! - [`frontend`] - the gRPC, gateway and plain HTTP listeners and the mode
//!   selector.
//! - [`lifecycle`] - start, signal wait and bounded graceful shutdown.
//! - [`union`] - dependency assembly and the top-level [`UnionServer`].
//!
//! [`UnionServer`]: union::UnionServer

pub mod auth;
pub mod biz;
pub mod config;
pub mod error;
pub mod exemption;
pub mod frontend;
pub mod lifecycle;
pub mod pipeline;
pub mod routes;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod union;
