//! Pieces shared by the gateway and plain HTTP front-ends: the JSON error
//! body, extractors that report rejections in that body, and the
//! request-ID/trace middleware.

use crate::server::pipeline::request_id::REQUEST_ID_HEADER;
use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::StatusCode;
use axum::http::header::HeaderName;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use miniblog_core::{ERROR_REASON_KEY, Error, http_status_from_code};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tonic::Status;
use tower::ServiceBuilder;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Error body: `{"code": <http status>, "reason": "...", "message": "..."}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    code: u16,
    reason: String,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: status.as_u16(),
            reason: reason.into(),
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidArgument", message)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.reason(), err.to_string())
    }
}

impl From<Status> for ApiError {
    fn from(status: Status) -> Self {
        let http = StatusCode::from_u16(http_status_from_code(status.code()))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let reason = status
            .metadata()
            .get(ERROR_REASON_KEY)
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| format!("{:?}", status.code()), str::to_owned);
        Self::new(http, reason, status.message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// `Json` that rejects with an [`ApiError`].
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

/// `Query` that rejects with an [`ApiError`].
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|rejection: QueryRejection| ApiError::bad_request(rejection.body_text()))
    }
}

type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        TraceLayer<SharedClassifier<ServerErrorsAsFailures>>,
        tower::layer::util::Stack<SetRequestIdLayer<MakeRequestUuid>, tower::layer::util::Identity>,
    >,
>;

/// Request-ID and tracing middleware, outermost first:
///
/// 1. `SetRequestId` -- mints a UUID v4 `x-request-id` when the caller sent none
/// 2. `Tracing` -- one span per request
/// 3. `PropagateRequestId` -- echoes `x-request-id` on the response, errors included
pub fn layers() -> HttpLayers {
    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}
