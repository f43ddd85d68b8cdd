use http::HeaderMap;
use tonic::metadata::MetadataMap;

pub const AUTHORIZATION: &str = "authorization";
const BEARER: &str = "bearer ";

/// A transport-specific bag of request headers that may hold a credential.
pub trait CredentialCarrier {
    /// Looks up a header value, ignoring values that are not visible ASCII.
    fn header_value(&self, key: &str) -> Option<&str>;

    /// Extracts the token from `Authorization: Bearer <token>`.
    fn bearer_token(&self) -> Option<&str> {
        let value = self.header_value(AUTHORIZATION)?.trim();
        let prefix = value.get(..BEARER.len())?;
        if !prefix.eq_ignore_ascii_case(BEARER) {
            return None;
        }
        let token = value[BEARER.len()..].trim();
        (!token.is_empty()).then_some(token)
    }
}

impl CredentialCarrier for MetadataMap {
    fn header_value(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.to_str().ok())
    }
}

impl CredentialCarrier for HeaderMap {
    fn header_value(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.to_str().ok())
    }
}
