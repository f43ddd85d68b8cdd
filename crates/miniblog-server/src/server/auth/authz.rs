use super::resolver::Identity;
use miniblog_core::operations;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Policy decision point consulted after authentication.
///
/// `action` is the fully-qualified operation name and `resource` the request
/// target (a user or post ID, or `*`).
pub trait Authorizer: Send + Sync {
    fn decide(&self, subject: &Identity, action: &str, resource: &str) -> Decision;
}

/// The root account may do anything and is the only one allowed to list
/// users. Every other operation is open to authenticated users, with
/// ownership checked by the business layer.
#[derive(Clone, Copy, Debug, Default)]
pub struct PolicyAuthorizer;

impl Authorizer for PolicyAuthorizer {
    fn decide(&self, subject: &Identity, action: &str, _resource: &str) -> Decision {
        if subject.is_root() {
            return Decision::Allow;
        }
        match action {
            operations::LIST_USER => Decision::Deny,
            _ => Decision::Allow,
        }
    }
}
