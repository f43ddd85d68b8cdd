//! Definitions shared by every front-end.
//!
//! - [`error`] - request-level error taxonomy and its gRPC mapping.
//! - [`json`] - serde adapters for enum fields of the generated messages.
//! - [`operations`] - fully-qualified gRPC operation names.
//! - [`request`] - per-request defaulting, validation and authorization
//!   target.

pub mod error;
pub mod json;
pub mod operations;
pub mod request;

pub use error::{ERROR_REASON_KEY, Error, Result, http_status_from_code};
pub use request::ApiRequest;
