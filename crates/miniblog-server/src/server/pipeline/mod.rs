//! The interceptor chain wrapped around every gRPC call.
//!
//! Stages run in a fixed order, outer to inner:
//!
//! 1. **Request ID** - reuse the inbound `x-request-id` or mint one; echoed
//!    on success and error responses alike.
//! 2. **Authentication** - skipped for exempt operations; otherwise the
//!    bearer token must resolve to a known user.
//! 3. **Authorization** - skipped for exempt operations; otherwise the policy
//!    must allow `(user, operation, target)`.
//! 4. **Defaulting** - fill in field defaults. Never fails.
//! 5. **Validation** - reject with the first violation.
//!
//! The handler runs only after all five pass. A cancelled call drops the
//! chain future, so later stages never run.

mod context;
pub mod guard;
pub mod request_id;

pub use context::RequestContext;

use crate::server::auth::{Authorizer, IdentityResolver};
use crate::server::exemption::ExemptionSet;
use core::fmt;
use miniblog_core::{ApiRequest, Error};
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};
use tracing::Instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    RequestId,
    Authentication,
    Authorization,
    Defaulting,
    Validation,
}

impl Stage {
    /// Execution order, outermost first.
    pub const ORDER: [Stage; 5] = [
        Stage::RequestId,
        Stage::Authentication,
        Stage::Authorization,
        Stage::Defaulting,
        Stage::Validation,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RequestId => "request-id",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Defaulting => "defaulting",
            Self::Validation => "validation",
        })
    }
}

struct Inner {
    exemptions: ExemptionSet,
    resolver: IdentityResolver,
    authorizer: Arc<dyn Authorizer>,
}

/// Immutable, shareable chain; clones share one instance.
#[derive(Clone)]
pub struct InterceptorChain {
    inner: Arc<Inner>,
}

impl InterceptorChain {
    pub fn new(
        exemptions: ExemptionSet,
        resolver: IdentityResolver,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        tracing::debug!(stages = ?Stage::ORDER, "interceptor chain installed");
        Self {
            inner: Arc::new(Inner {
                exemptions,
                resolver,
                authorizer,
            }),
        }
    }

    /// Runs a unary call through every stage, then `handler`.
    pub async fn unary<Req, Resp, F, Fut>(
        &self,
        operation: &'static str,
        request: Request<Req>,
        handler: F,
    ) -> Result<Response<Resp>, Status>
    where
        Req: ApiRequest,
        F: FnOnce(RequestContext, Req) -> Fut,
        Fut: Future<Output = Result<Resp, Error>>,
    {
        let (metadata, _, mut message) = request.into_parts();
        let request_id = request_id::extract_or_mint(&metadata);
        let span = tracing::info_span!("rpc", operation, request_id = %request_id);

        let result = async {
            let ctx = self
                .admit(operation, &metadata, &mut message, &request_id)
                .await?;
            handler(ctx, message).await
        }
        .instrument(span)
        .await;

        match result {
            Ok(body) => {
                let mut response = Response::new(body);
                request_id::attach(response.metadata_mut(), &request_id);
                Ok(response)
            }
            Err(err) => {
                tracing::debug!(operation, %request_id, error = %err, "call failed");
                let mut status = Status::from(err);
                request_id::attach(status.metadata_mut(), &request_id);
                Err(status)
            }
        }
    }

    async fn admit<Req: ApiRequest>(
        &self,
        operation: &str,
        metadata: &MetadataMap,
        message: &mut Req,
        request_id: &str,
    ) -> Result<RequestContext, Error> {
        let inner = &*self.inner;
        let mut ctx = RequestContext::new(request_id.to_owned());

        let identity =
            guard::authenticate(&inner.exemptions, &inner.resolver, operation, metadata)
                .await
                .inspect_err(|e| rejected(Stage::Authentication, e))?;
        if let Some(identity) = identity {
            ctx = ctx.with_identity(identity);
        }

        guard::authorize(
            &inner.exemptions,
            inner.authorizer.as_ref(),
            operation,
            ctx.identity(),
            message.target(),
        )
        .inspect_err(|e| rejected(Stage::Authorization, e))?;

        message.set_defaults();
        message
            .validate()
            .inspect_err(|e| rejected(Stage::Validation, e))?;

        Ok(ctx)
    }
}

fn rejected(stage: Stage, err: &Error) {
    tracing::info!(%stage, reason = err.reason(), "request rejected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::auth::{
        Decision, Identity, PolicyAuthorizer, ROOT_USER_ID, TokenManager, UserRetriever,
    };
    use miniblog_core::operations;
    use miniblog_core::proto::{
        CreateUserRequest, HealthzRequest, ListUserRequest, ListUserResponse, User,
    };
    use parking_lot::Mutex;
    use std::time::Duration;

    struct Users;

    #[tonic::async_trait]
    impl UserRetriever for Users {
        async fn get_user(&self, user_id: &str) -> Result<User, Error> {
            let username = match user_id {
                ROOT_USER_ID => "root",
                "user-000002" => "colin",
                _ => return Err(Error::UserNotFound),
            };
            Ok(User {
                user_id: user_id.into(),
                username: username.into(),
                ..Default::default()
            })
        }
    }

    fn chain() -> (InterceptorChain, TokenManager) {
        let tokens = TokenManager::new("pipeline-secret", Duration::from_secs(60));
        let resolver = IdentityResolver::new(tokens.clone(), Arc::new(Users));
        let chain =
            InterceptorChain::new(ExemptionSet::default(), resolver, Arc::new(PolicyAuthorizer));
        (chain, tokens)
    }

    fn with_token<T>(message: T, token: &str) -> Request<T> {
        let mut request = Request::new(message);
        request
            .metadata_mut()
            .insert("authorization", format!("Bearer {token}").parse().unwrap());
        request
    }

    fn list_users(ctx: RequestContext, req: ListUserRequest) -> impl Future<Output = Result<ListUserResponse, Error>> {
        async move {
            assert!(ctx.identity().is_some());
            Ok(ListUserResponse {
                total_count: req.limit,
                users: Vec::new(),
            })
        }
    }

    type Log = Arc<Mutex<Vec<Stage>>>;

    struct RecordingUsers(Log);

    #[tonic::async_trait]
    impl UserRetriever for RecordingUsers {
        async fn get_user(&self, user_id: &str) -> Result<User, Error> {
            self.0.lock().push(Stage::Authentication);
            Users.get_user(user_id).await
        }
    }

    struct RecordingAuthorizer(Log);

    impl Authorizer for RecordingAuthorizer {
        fn decide(&self, _: &Identity, _: &str, _: &str) -> Decision {
            self.0.lock().push(Stage::Authorization);
            Decision::Allow
        }
    }

    struct RecordingRequest(Log);

    impl ApiRequest for RecordingRequest {
        fn set_defaults(&mut self) {
            self.0.lock().push(Stage::Defaulting);
        }

        fn validate(&self) -> Result<(), Error> {
            self.0.lock().push(Stage::Validation);
            Ok(())
        }
    }

    #[tokio::test]
    async fn stages_run_in_order_before_the_handler() {
        let log = Log::default();
        let tokens = TokenManager::new("pipeline-secret", Duration::from_secs(60));
        let resolver = IdentityResolver::new(tokens.clone(), Arc::new(RecordingUsers(log.clone())));
        let chain = InterceptorChain::new(
            ExemptionSet::default(),
            resolver,
            Arc::new(RecordingAuthorizer(log.clone())),
        );
        let token = tokens.issue("user-000002").unwrap().token;

        let response = chain
            .unary(
                operations::LIST_USER,
                with_token(RecordingRequest(log.clone()), &token),
                |_, req| async move { Ok(req.0.lock().clone()) },
            )
            .await
            .unwrap();

        // The handler snapshots the log, so anything after it would be missing.
        assert_eq!(response.get_ref()[..], Stage::ORDER[1..]);
        assert_eq!(*log.lock(), Stage::ORDER[1..]);
        assert!(response.metadata().get(request_id::REQUEST_ID_HEADER).is_some());
    }

    #[tokio::test]
    async fn a_rejected_stage_stops_the_chain() {
        let log = Log::default();
        let tokens = TokenManager::new("pipeline-secret", Duration::from_secs(60));
        let resolver = IdentityResolver::new(tokens, Arc::new(RecordingUsers(log.clone())));
        let chain = InterceptorChain::new(
            ExemptionSet::default(),
            resolver,
            Arc::new(RecordingAuthorizer(log.clone())),
        );

        let status = chain
            .unary(
                operations::LIST_USER,
                with_token(RecordingRequest(log.clone()), "not-a-token"),
                |_, _| async { Ok::<_, Error>(()) },
            )
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn exempt_operation_needs_no_credential() {
        let (chain, _) = chain();
        let response = chain
            .unary(operations::HEALTHZ, Request::new(HealthzRequest {}), |ctx, _| async move {
                assert!(ctx.identity().is_none());
                Ok(())
            })
            .await
            .unwrap();
        assert!(response.metadata().get(request_id::REQUEST_ID_HEADER).is_some());
    }

    #[tokio::test]
    async fn authentication_runs_before_validation() {
        let (chain, _) = chain();
        let invalid = ListUserRequest {
            offset: -1,
            limit: 1000,
        };
        let status = chain
            .unary(operations::LIST_USER, Request::new(invalid), list_users)
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
        assert_eq!(
            status.metadata().get(miniblog_core::ERROR_REASON_KEY).unwrap(),
            "Unauthenticated.TokenInvalid"
        );
    }

    #[tokio::test]
    async fn authorization_denial_is_permission_denied() {
        let (chain, tokens) = chain();
        let token = tokens.issue("user-000002").unwrap().token;
        let status = chain
            .unary(
                operations::LIST_USER,
                with_token(ListUserRequest::default(), &token),
                list_users,
            )
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);
    }

    #[tokio::test]
    async fn defaults_apply_before_validation() {
        let (chain, tokens) = chain();
        let token = tokens.issue(ROOT_USER_ID).unwrap().token;
        let response = chain
            .unary(
                operations::LIST_USER,
                with_token(ListUserRequest::default(), &token),
                list_users,
            )
            .await
            .unwrap();
        assert_eq!(
            response.get_ref().total_count,
            miniblog_core::request::DEFAULT_LIMIT
        );
    }

    #[tokio::test]
    async fn validation_failure_echoes_the_request_id() {
        let (chain, _) = chain();
        let mut request = Request::new(CreateUserRequest::default());
        request
            .metadata_mut()
            .insert(request_id::REQUEST_ID_HEADER, "req-42".parse().unwrap());
        let status = chain
            .unary(operations::CREATE_USER, request, |_, _| async {
                Ok::<_, Error>(())
            })
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert_eq!(
            status.metadata().get(request_id::REQUEST_ID_HEADER).unwrap(),
            "req-42"
        );
    }

    #[tokio::test]
    async fn handler_sees_the_resolved_identity() {
        let (chain, tokens) = chain();
        let token = tokens.issue("user-000002").unwrap().token;
        let response = chain
            .unary(
                operations::REFRESH_TOKEN,
                with_token(miniblog_core::proto::RefreshTokenRequest {}, &token),
                |ctx, _| async move { Ok(ctx.identity().cloned()) },
            )
            .await
            .unwrap();
        assert_eq!(
            response.into_inner(),
            Some(Identity {
                user_id: "user-000002".into(),
                username: "colin".into()
            })
        );
    }
}
