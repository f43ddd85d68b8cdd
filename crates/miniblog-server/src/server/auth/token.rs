use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use miniblog_core::Error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Claim carrying the subject's user ID.
pub const USER_ID_CLAIM: &str = "x-user-id";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "x-user-id")]
    pub user_id: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    /// Unix seconds.
    pub expire_at: i64,
}

/// Issues and verifies HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenManager {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
    validation: Arc<Validation>,
    ttl: Duration,
}

impl TokenManager {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "iat", "nbf"]);

        Self {
            encoding: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            validation: Arc::new(validation),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: &str) -> Result<IssuedToken, Error> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            user_id: user_id.to_owned(),
            iat: now,
            nbf: now,
            exp: now.saturating_add(ttl),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!(error = %e, "failed to sign token");
            Error::Internal("failed to sign token".into())
        })?;

        Ok(IssuedToken {
            token,
            expire_at: claims.exp,
        })
    }

    /// Returns the token's user ID, or [`Error::TokenInvalid`].
    pub fn verify(&self, token: &str) -> Result<String, Error> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "token is expired",
                ErrorKind::ImmatureSignature => "token is not valid yet",
                ErrorKind::InvalidSignature => "signature is invalid",
                _ => "token is malformed",
            };
            Error::TokenInvalid(reason.into())
        })?;

        if data.claims.user_id.is_empty() {
            return Err(Error::TokenInvalid(format!(
                "token has no `{USER_ID_CLAIM}` claim"
            )));
        }
        Ok(data.claims.user_id)
    }
}
