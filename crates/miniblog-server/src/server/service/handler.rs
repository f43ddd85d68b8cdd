//! gRPC implementation of the `miniblog.v1.MiniBlog` service.
//!
//! Each method routes its request through the [`InterceptorChain`] and hands
//! the resulting [`RequestContext`] plus the prepared request to the business
//! layer. No method touches the request before the chain has run.
//!
//! [`RequestContext`]: crate::server::pipeline::RequestContext

use crate::server::biz::Biz;
use crate::server::pipeline::InterceptorChain;
use miniblog_core::operations;
use miniblog_core::proto::mini_blog_server::{MiniBlog, MiniBlogServer};
use miniblog_core::proto::*;
use std::sync::Arc;
use tonic::codec::CompressionEncoding;
use tonic::{Request, Response, Status};

#[derive(Clone)]
pub struct MiniBlogService {
    chain: InterceptorChain,
    biz: Arc<Biz>,
}

impl MiniBlogService {
    pub fn new(chain: InterceptorChain, biz: Arc<Biz>) -> Self {
        Self { chain, biz }
    }

    /// Wraps the service for tonic with gzip enabled in both directions.
    pub fn into_server(self) -> MiniBlogServer<Self> {
        MiniBlogServer::new(self)
            .send_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Gzip)
    }
}

#[tonic::async_trait]
impl MiniBlog for MiniBlogService {
    async fn healthz(
        &self,
        request: Request<HealthzRequest>,
    ) -> Result<Response<HealthzResponse>, Status> {
        self.chain
            .unary(operations::HEALTHZ, request, move |_, _| async move {
                Ok(self.biz.healthz())
            })
            .await
    }

    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<LoginResponse>, Status> {
        self.chain
            .unary(operations::LOGIN, request, move |_, req| self.biz.users().login(req))
            .await
    }

    async fn refresh_token(
        &self,
        request: Request<RefreshTokenRequest>,
    ) -> Result<Response<RefreshTokenResponse>, Status> {
        self.chain
            .unary(operations::REFRESH_TOKEN, request, move |ctx, req| async move {
                self.biz.users().refresh_token(&ctx, req).await
            })
            .await
    }

    async fn change_password(
        &self,
        request: Request<ChangePasswordRequest>,
    ) -> Result<Response<ChangePasswordResponse>, Status> {
        self.chain
            .unary(operations::CHANGE_PASSWORD, request, move |ctx, req| async move {
                self.biz.users().change_password(&ctx, req).await
            })
            .await
    }

    async fn create_user(
        &self,
        request: Request<CreateUserRequest>,
    ) -> Result<Response<CreateUserResponse>, Status> {
        self.chain
            .unary(operations::CREATE_USER, request, move |_, req| {
                self.biz.users().create_user(req)
            })
            .await
    }

    async fn update_user(
        &self,
        request: Request<UpdateUserRequest>,
    ) -> Result<Response<UpdateUserResponse>, Status> {
        self.chain
            .unary(operations::UPDATE_USER, request, move |ctx, req| async move {
                self.biz.users().update_user(&ctx, req).await
            })
            .await
    }

    async fn delete_user(
        &self,
        request: Request<DeleteUserRequest>,
    ) -> Result<Response<DeleteUserResponse>, Status> {
        self.chain
            .unary(operations::DELETE_USER, request, move |ctx, req| async move {
                self.biz.users().delete_user(&ctx, req).await
            })
            .await
    }

    async fn get_user(
        &self,
        request: Request<GetUserRequest>,
    ) -> Result<Response<GetUserResponse>, Status> {
        self.chain
            .unary(operations::GET_USER, request, move |ctx, req| async move {
                self.biz.users().get_user(&ctx, req).await
            })
            .await
    }

    async fn list_user(
        &self,
        request: Request<ListUserRequest>,
    ) -> Result<Response<ListUserResponse>, Status> {
        self.chain
            .unary(operations::LIST_USER, request, move |ctx, req| async move {
                self.biz.users().list_user(&ctx, req).await
            })
            .await
    }

    async fn create_post(
        &self,
        request: Request<CreatePostRequest>,
    ) -> Result<Response<CreatePostResponse>, Status> {
        self.chain
            .unary(operations::CREATE_POST, request, move |ctx, req| async move {
                self.biz.posts().create_post(&ctx, req).await
            })
            .await
    }

    async fn update_post(
        &self,
        request: Request<UpdatePostRequest>,
    ) -> Result<Response<UpdatePostResponse>, Status> {
        self.chain
            .unary(operations::UPDATE_POST, request, move |ctx, req| async move {
                self.biz.posts().update_post(&ctx, req).await
            })
            .await
    }

    async fn delete_post(
        &self,
        request: Request<DeletePostRequest>,
    ) -> Result<Response<DeletePostResponse>, Status> {
        self.chain
            .unary(operations::DELETE_POST, request, move |ctx, req| async move {
                self.biz.posts().delete_post(&ctx, req).await
            })
            .await
    }

    async fn get_post(
        &self,
        request: Request<GetPostRequest>,
    ) -> Result<Response<GetPostResponse>, Status> {
        self.chain
            .unary(operations::GET_POST, request, move |ctx, req| async move {
                self.biz.posts().get_post(&ctx, req).await
            })
            .await
    }

    async fn list_post(
        &self,
        request: Request<ListPostRequest>,
    ) -> Result<Response<ListPostResponse>, Status> {
        self.chain
            .unary(operations::LIST_POST, request, move |ctx, req| async move {
                self.biz.posts().list_post(&ctx, req).await
            })
            .await
    }
}
