//! Authentication, authorization and request preparation stages.
//!
//! Both the gRPC interceptor chain and the HTTP middleware call these, so the
//! two front-ends make identical decisions.

use crate::server::auth::{Authorizer, CredentialCarrier, Decision, Identity, IdentityResolver};
use crate::server::exemption::ExemptionSet;
use miniblog_core::{ApiRequest, Error};

/// Authentication stage. `Ok(None)` for exempt operations.
pub async fn authenticate<C>(
    exemptions: &ExemptionSet,
    resolver: &IdentityResolver,
    operation: &str,
    carrier: &C,
) -> Result<Option<Identity>, Error>
where
    C: CredentialCarrier + Sync + ?Sized,
{
    if exemptions.is_exempt(operation) {
        return Ok(None);
    }
    resolver.resolve(carrier).await.map(Some)
}

/// Authorization stage. Exempt operations are always allowed.
pub fn authorize(
    exemptions: &ExemptionSet,
    authorizer: &dyn Authorizer,
    operation: &str,
    identity: Option<&Identity>,
    resource: &str,
) -> Result<(), Error> {
    if exemptions.is_exempt(operation) {
        return Ok(());
    }
    let Some(subject) = identity else {
        return Err(Error::Unauthenticated("request has no authenticated user".into()));
    };
    match authorizer.decide(subject, operation, resource) {
        Decision::Allow => Ok(()),
        Decision::Deny => Err(Error::PermissionDenied(format!(
            "user `{}` may not call {operation}",
            subject.user_id
        ))),
    }
}

/// Defaulting then validation.
pub fn prepare<R: ApiRequest>(request: &mut R) -> Result<(), Error> {
    request.set_defaults();
    request.validate()
}
