use crate::server::auth::CredentialCarrier;
use tonic::metadata::{MetadataMap, MetadataValue};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Reuses a non-empty inbound `x-request-id`, otherwise mints a UUIDv4.
pub fn extract_or_mint<C: CredentialCarrier + ?Sized>(carrier: &C) -> String {
    carrier
        .header_value(REQUEST_ID_HEADER)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned)
}

/// Writes the request ID into outbound response or status metadata.
pub fn attach(metadata: &mut MetadataMap, request_id: &str) {
    match MetadataValue::try_from(request_id) {
        Ok(value) => {
            metadata.insert(REQUEST_ID_HEADER, value);
        }
        Err(_) => tracing::warn!(request_id, "request ID is not valid metadata"),
    }
}
