#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

/// gRPC service and message definitions generated from
/// `proto/miniblog/v1/miniblog.proto`.
///
/// ## Service
///
/// - [`MiniBlog`] - health check, session management and user/post CRUD.
///
/// Every message also implements `serde::Serialize`/`Deserialize` with
/// camelCase field names so the HTTP front-ends can bind JSON bodies directly
/// into request messages.
///
/// [`MiniBlog`]: crate::proto::mini_blog_server::MiniBlog
pub mod proto {
    tonic::include_proto!("miniblog.v1");

    /// Encoded file descriptor set for the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("miniblog_descriptor");
}
