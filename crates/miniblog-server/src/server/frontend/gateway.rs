//! JSON/HTTP gateway in front of the gRPC listener.
//!
//! Every route decodes its JSON body, path and query into the request
//! message and forwards it over a loopback channel, so the call passes
//! through the same interceptor chain as a direct gRPC call. The
//! `authorization` and `x-request-id` headers travel as metadata; a failed
//! call is rendered from its status code and `x-error-reason` metadata.

use super::listener::RestListener;
use super::rest::{self, ApiError, ApiResult, JsonBody, QueryParams};
use super::{FrontEnd, grpc::read_pem};
use crate::server::auth::carrier::AUTHORIZATION;
use crate::server::config::TlsConfig;
use crate::server::error::ServerError;
use crate::server::pipeline::request_id::REQUEST_ID_HEADER;
use crate::server::routes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use miniblog_core::proto::mini_blog_client::MiniBlogClient;
use miniblog_core::proto::*;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tonic::metadata::MetadataValue;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};

const NAME: &str = "gateway";

type Client = MiniBlogClient<Channel>;

pub struct GatewayFrontEnd {
    listener: RestListener,
    router: Router,
}

impl GatewayFrontEnd {
    pub async fn bind(
        addr: SocketAddr,
        client: Client,
        tls: Option<TlsConfig>,
    ) -> Result<Self, ServerError> {
        Ok(Self {
            listener: RestListener::bind(NAME, addr, tls).await?,
            router: router(client),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }
}

#[tonic::async_trait]
impl FrontEnd for GatewayFrontEnd {
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

/// Lazily connected channel to the gRPC listener at `target`.
///
/// An unspecified listen address is dialed on loopback. With TLS, the
/// listener's own certificate is the trust anchor and `server_name` must
/// match it.
pub async fn dial(target: SocketAddr, tls: Option<&TlsConfig>) -> Result<Channel, ServerError> {
    let ip = match target.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    let addr = SocketAddr::new(ip, target.port());

    let endpoint = match tls {
        None => Endpoint::from_shared(format!("http://{addr}"))?,
        Some(tls) => {
            let ca = Certificate::from_pem(read_pem(&tls.cert_path).await?);
            Endpoint::from_shared(format!("https://{addr}"))?.tls_config(
                ClientTlsConfig::new()
                    .ca_certificate(ca)
                    .domain_name(tls.server_name.clone()),
            )?
        }
    };
    Ok(endpoint.connect_lazy())
}

fn router(client: Client) -> Router {
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
        .with_state(client)
        .layer(rest::layers())
}

/// Wraps `message` for the gRPC call, carrying the caller's credential and
/// request ID.
fn outbound<T>(headers: &HeaderMap, message: T) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    for key in [AUTHORIZATION, REQUEST_ID_HEADER] {
        let value = headers
            .get(key)
            .and_then(|v| MetadataValue::try_from(v.as_bytes()).ok());
        if let Some(value) = value {
            request.metadata_mut().insert(key, value);
        }
    }
    request
}

fn reply<T>(result: Result<tonic::Response<T>, tonic::Status>) -> ApiResult<T> {
    result.map(|r| Json(r.into_inner())).map_err(ApiError::from)
}

async fn healthz(State(mut client): State<Client>, headers: HeaderMap) -> ApiResult<HealthzResponse> {
    reply(client.healthz(outbound(&headers, HealthzRequest {})).await)
}

async fn login(
    State(mut client): State<Client>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<LoginResponse> {
    reply(client.login(outbound(&headers, req)).await)
}

async fn refresh_token(
    State(mut client): State<Client>,
    headers: HeaderMap,
) -> ApiResult<RefreshTokenResponse> {
    reply(client.refresh_token(outbound(&headers, RefreshTokenRequest {})).await)
}

async fn change_password(
    State(mut client): State<Client>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    JsonBody(mut req): JsonBody<ChangePasswordRequest>,
) -> ApiResult<ChangePasswordResponse> {
    req.user_id = user_id;
    reply(client.change_password(outbound(&headers, req)).await)
}

async fn create_user(
    State(mut client): State<Client>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<CreateUserRequest>,
) -> ApiResult<CreateUserResponse> {
    reply(client.create_user(outbound(&headers, req)).await)
}

async fn update_user(
    State(mut client): State<Client>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    JsonBody(mut req): JsonBody<UpdateUserRequest>,
) -> ApiResult<UpdateUserResponse> {
    req.user_id = user_id;
    reply(client.update_user(outbound(&headers, req)).await)
}

async fn delete_user(
    State(mut client): State<Client>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> ApiResult<DeleteUserResponse> {
    reply(client.delete_user(outbound(&headers, DeleteUserRequest { user_id })).await)
}

async fn get_user(
    State(mut client): State<Client>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> ApiResult<GetUserResponse> {
    reply(client.get_user(outbound(&headers, GetUserRequest { user_id })).await)
}

async fn list_user(
    State(mut client): State<Client>,
    headers: HeaderMap,
    QueryParams(req): QueryParams<ListUserRequest>,
) -> ApiResult<ListUserResponse> {
    reply(client.list_user(outbound(&headers, req)).await)
}

async fn create_post(
    State(mut client): State<Client>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<CreatePostRequest>,
) -> ApiResult<CreatePostResponse> {
    reply(client.create_post(outbound(&headers, req)).await)
}

async fn update_post(
    State(mut client): State<Client>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
    JsonBody(mut req): JsonBody<UpdatePostRequest>,
) -> ApiResult<UpdatePostResponse> {
    req.post_id = post_id;
    reply(client.update_post(outbound(&headers, req)).await)
}

async fn delete_post(
    State(mut client): State<Client>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<DeletePostRequest>,
) -> ApiResult<DeletePostResponse> {
    reply(client.delete_post(outbound(&headers, req)).await)
}

async fn get_post(
    State(mut client): State<Client>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> ApiResult<GetPostResponse> {
    reply(client.get_post(outbound(&headers, GetPostRequest { post_id })).await)
}

async fn list_post(
    State(mut client): State<Client>,
    headers: HeaderMap,
    QueryParams(req): QueryParams<ListPostRequest>,
) -> ApiResult<ListPostResponse> {
    reply(client.list_post(outbound(&headers, req)).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_copies_credential_and_request_id_only() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        headers.insert("x-request-id", "req-7".parse().unwrap());
        headers.insert("cookie", "session=1".parse().unwrap());

        let request = outbound(&headers, HealthzRequest {});
        let metadata = request.metadata();
        assert_eq!(metadata.get(AUTHORIZATION).unwrap(), "Bearer abc");
        assert_eq!(metadata.get(REQUEST_ID_HEADER).unwrap(), "req-7");
        assert!(metadata.get("cookie").is_none());
    }

    #[tokio::test]
    async fn unspecified_target_is_dialed_on_loopback() {
        // connect_lazy never touches the network, so any port will do.
        let target: SocketAddr = "0.0.0.0:8881".parse().unwrap();
        assert!(dial(target, None).await.is_ok());
    }
}
