//! Authentication and authorization building blocks.
//!
//! - [`token`] - signs and verifies HS256 bearer tokens.
//! - [`carrier`] - reads credentials out of gRPC metadata or HTTP headers.
//! - [`resolver`] - turns a credential into an [`Identity`].
//! - [`authz`] - the allow/deny policy.

pub mod authz;
pub mod carrier;
pub mod resolver;
pub mod token;

pub use authz::{Authorizer, Decision, PolicyAuthorizer};
pub use carrier::CredentialCarrier;
pub use resolver::{Identity, IdentityResolver, StoreUserRetriever, UserRetriever};
pub use token::{IssuedToken, TokenManager};

/// Username of the account provisioned at startup.
pub const ROOT_USERNAME: &str = "root";
/// Sequence number of the provisioned root account.
pub const ROOT_USER_SEQ: u64 = 0;
/// ID of the provisioned root account, the only one with unrestricted access.
pub const ROOT_USER_ID: &str = "user-000000";
