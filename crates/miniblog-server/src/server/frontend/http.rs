//! Plain HTTP front-end. Calls the business layer directly, no gRPC hop.
//!
//! Middleware, outer to inner: request ID and tracing, authentication,
//! authorization. Handlers apply defaulting and validation before calling
//! the business layer, mirroring the gRPC interceptor chain.

use super::FrontEnd;
use super::listener::RestListener;
use super::rest::{self, ApiError, ApiResult, JsonBody, QueryParams};
use crate::server::auth::{Authorizer, IdentityResolver};
use crate::server::biz::Biz;
use crate::server::config::{HttpAuthPolicy, TlsConfig};
use crate::server::error::ServerError;
use crate::server::exemption::ExemptionSet;
use crate::server::pipeline::{RequestContext, guard, request_id};
use crate::server::routes;
use crate::server::union::Dependencies;
use axum::extract::{MatchedPath, Path, RawPathParams, Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use miniblog_core::Error;
use miniblog_core::proto::*;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const NAME: &str = "http";

/// Header trusted under [`HttpAuthPolicy::Bypass`].
pub const BYPASS_USER_HEADER: &str = "x-user-id";
/// Caller assumed under [`HttpAuthPolicy::Bypass`] when the header is absent.
pub const BYPASS_DEFAULT_USER: &str = "user-000001";

pub struct HttpFrontEnd {
    listener: RestListener,
    router: Router,
}

impl HttpFrontEnd {
    pub async fn bind(
        addr: SocketAddr,
        deps: &Dependencies,
        tls: Option<TlsConfig>,
    ) -> Result<Self, ServerError> {
        let state = AppState {
            biz: deps.biz.clone(),
            exemptions: deps.exemptions.clone(),
            resolver: deps.resolver.clone(),
            authorizer: deps.authorizer.clone(),
            policy: deps.http_auth,
        };
        if state.policy == HttpAuthPolicy::Bypass {
            tracing::warn!(header = BYPASS_USER_HEADER, "HTTP authentication bypassed");
        }
        Ok(Self {
            listener: RestListener::bind(NAME, addr, tls).await?,
            router: router(state),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }
}

#[tonic::async_trait]
impl FrontEnd for HttpFrontEnd {
    fn name(&self) -> &'static str {
        NAME
    }

    fn listeners(&self) -> Vec<(&'static str, SocketAddr)> {
        vec![(NAME, self.listener.local_addr())]
    }

    async fn run(&self) -> Result<(), ServerError> {
        self.listener.serve(self.router.clone()).await
    }

    async fn graceful_stop(&self, deadline: Duration) -> Result<(), ServerError> {
        self.listener.stop(deadline).await
    }
}

#[derive(Clone)]
struct AppState {
    biz: Arc<Biz>,
    exemptions: ExemptionSet,
    resolver: IdentityResolver,
    authorizer: Arc<dyn Authorizer>,
    policy: HttpAuthPolicy,
}

/// Operation name of the matched route, set by [`authenticate`].
#[derive(Clone, Copy, Debug)]
struct Operation(&'static str);

fn router(state: AppState) -> Router {
    Router::new()
        .route(routes::HEALTHZ, get(healthz))
        .route(routes::LOGIN, post(login))
        .route(routes::REFRESH_TOKEN, put(refresh_token))
        .route(routes::CHANGE_PASSWORD, put(change_password))
        .route(routes::USERS, post(create_user).get(list_user))
        .route(
            routes::USER,
            put(update_user).delete(delete_user).get(get_user),
        )
        .route(routes::POSTS, post(create_post).delete(delete_post).get(list_post))
        .route(routes::POST, put(update_post).get(get_post))
        // Last added runs first.
        .route_layer(middleware::from_fn_with_state(state.clone(), authorize))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .with_state(state)
        .layer(rest::layers())
}

async fn authenticate(
    State(state): State<AppState>,
    matched: MatchedPath,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();
    let operation = routes::operation_for(&parts.method, matched.as_str()).ok_or_else(|| {
        Error::Internal(format!("no operation for {} {}", parts.method, matched.as_str()))
    })?;
    let request_id = request_id::extract_or_mint(&parts.headers);

    let identity = match state.policy {
        HttpAuthPolicy::Jwt => {
            guard::authenticate(&state.exemptions, &state.resolver, operation, &parts.headers)
                .await?
        }
        HttpAuthPolicy::Bypass if state.exemptions.is_exempt(operation) => None,
        HttpAuthPolicy::Bypass => {
            let user_id = bypass_user(&parts.headers);
            Some(state.resolver.identify(user_id).await?)
        }
    };

    let mut ctx = RequestContext::new(request_id);
    if let Some(identity) = identity {
        ctx = ctx.with_identity(identity);
    }
    parts.extensions.insert(Operation(operation));
    parts.extensions.insert(ctx);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

async fn authorize(
    State(state): State<AppState>,
    params: RawPathParams,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    {
        let extensions = request.extensions();
        let (Some(Operation(operation)), Some(ctx)) = (
            extensions.get::<Operation>().copied(),
            extensions.get::<RequestContext>(),
        ) else {
            return Err(Error::Internal("authentication middleware did not run".into()).into());
        };
        let resource = params.iter().next().map_or("*", |(_, value)| value);
        guard::authorize(
            &state.exemptions,
            state.authorizer.as_ref(),
            operation,
            ctx.identity(),
            resource,
        )?;
    }
    Ok(next.run(request).await)
}

fn bypass_user(headers: &HeaderMap) -> &str {
    headers
        .get(BYPASS_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(BYPASS_DEFAULT_USER)
}

async fn healthz(State(state): State<AppState>) -> ApiResult<HealthzResponse> {
    Ok(Json(state.biz.healthz()))
}

async fn login(
    State(state): State<AppState>,
    JsonBody(mut req): JsonBody<LoginRequest>,
) -> ApiResult<LoginResponse> {
    guard::prepare(&mut req)?;
    Ok(Json(state.biz.users().login(req).await?))
}

async fn refresh_token(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<RefreshTokenResponse> {
    let mut req = RefreshTokenRequest {};
    guard::prepare(&mut req)?;
    Ok(Json(state.biz.users().refresh_token(&ctx, req).await?))
}

async fn change_password(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(user_id): Path<String>,
    JsonBody(mut req): JsonBody<ChangePasswordRequest>,
) -> ApiResult<ChangePasswordResponse> {
    req.user_id = user_id;
    guard::prepare(&mut req)?;
    Ok(Json(state.biz.users().change_password(&ctx, req).await?))
}

async fn create_user(
    State(state): State<AppState>,
    JsonBody(mut req): JsonBody<CreateUserRequest>,
) -> ApiResult<CreateUserResponse> {
    guard::prepare(&mut req)?;
    Ok(Json(state.biz.users().create_user(req).await?))
}

async fn update_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(user_id): Path<String>,
    JsonBody(mut req): JsonBody<UpdateUserRequest>,
) -> ApiResult<UpdateUserResponse> {
    req.user_id = user_id;
    guard::prepare(&mut req)?;
    Ok(Json(state.biz.users().update_user(&ctx, req).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(user_id): Path<String>,
) -> ApiResult<DeleteUserResponse> {
    let mut req = DeleteUserRequest { user_id };
    guard::prepare(&mut req)?;
    Ok(Json(state.biz.users().delete_user(&ctx, req).await?))
}

async fn get_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(user_id): Path<String>,
) -> ApiResult<GetUserResponse> {
    let mut req = GetUserRequest { user_id };
    guard::prepare(&mut req)?;
    Ok(Json(state.biz.users().get_user(&ctx, req).await?))
}

async fn list_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    QueryParams(mut req): QueryParams<ListUserRequest>,
) -> ApiResult<ListUserResponse> {
    guard::prepare(&mut req)?;
    Ok(Json(state.biz.users().list_user(&ctx, req).await?))
}

async fn create_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    JsonBody(mut req): JsonBody<CreatePostRequest>,
) -> ApiResult<CreatePostResponse> {
    guard::prepare(&mut req)?;
    Ok(Json(state.biz.posts().create_post(&ctx, req).await?))
}

async fn update_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(post_id): Path<String>,
    JsonBody(mut req): JsonBody<UpdatePostRequest>,
) -> ApiResult<UpdatePostResponse> {
    req.post_id = post_id;
    guard::prepare(&mut req)?;
    Ok(Json(state.biz.posts().update_post(&ctx, req).await?))
}

async fn delete_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    JsonBody(mut req): JsonBody<DeletePostRequest>,
) -> ApiResult<DeletePostResponse> {
    guard::prepare(&mut req)?;
    Ok(Json(state.biz.posts().delete_post(&ctx, req).await?))
}

async fn get_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(post_id): Path<String>,
) -> ApiResult<GetPostResponse> {
    let mut req = GetPostRequest { post_id };
    guard::prepare(&mut req)?;
    Ok(Json(state.biz.posts().get_post(&ctx, req).await?))
}

async fn list_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    QueryParams(mut req): QueryParams<ListPostRequest>,
) -> ApiResult<ListPostResponse> {
    guard::prepare(&mut req)?;
    Ok(Json(state.biz.posts().list_post(&ctx, req).await?))
}
