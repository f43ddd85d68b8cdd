use super::{caller, internal, page_bounds};
use crate::server::pipeline::RequestContext;
use crate::server::store::{NewPost, PostStore, StoreError};
use miniblog_core::Error;
use miniblog_core::proto::*;
use std::sync::Arc;

/// Post operations. Every post is scoped to the user that created it.
pub struct PostBiz {
    posts: Arc<dyn PostStore>,
}

impl PostBiz {
    pub fn new(posts: Arc<dyn PostStore>) -> Self {
        Self { posts }
    }

    pub async fn create_post(
        &self,
        ctx: &RequestContext,
        req: CreatePostRequest,
    ) -> Result<CreatePostResponse, Error> {
        let post = self
            .posts
            .create(NewPost {
                user_id: caller(ctx)?.to_owned(),
                title: req.title,
                content: req.content,
            })
            .await
            .map_err(internal)?;
        Ok(CreatePostResponse {
            post_id: post.post_id,
        })
    }

    pub async fn update_post(
        &self,
        ctx: &RequestContext,
        req: UpdatePostRequest,
    ) -> Result<UpdatePostResponse, Error> {
        let mut post = self
            .posts
            .get(caller(ctx)?, &req.post_id)
            .await
            .map_err(post_error)?;
        if let Some(title) = req.title {
            post.title = title;
        }
        if let Some(content) = req.content {
            post.content = content;
        }
        self.posts.update(post).await.map_err(post_error)?;
        Ok(UpdatePostResponse {})
    }

    pub async fn delete_post(
        &self,
        ctx: &RequestContext,
        req: DeletePostRequest,
    ) -> Result<DeletePostResponse, Error> {
        self.posts
            .delete(caller(ctx)?, &req.post_ids)
            .await
            .map_err(internal)?;
        Ok(DeletePostResponse {})
    }

    pub async fn get_post(
        &self,
        ctx: &RequestContext,
        req: GetPostRequest,
    ) -> Result<GetPostResponse, Error> {
        let post = self
            .posts
            .get(caller(ctx)?, &req.post_id)
            .await
            .map_err(post_error)?;
        Ok(GetPostResponse {
            post: Some(post.to_proto()),
        })
    }

    pub async fn list_post(
        &self,
        ctx: &RequestContext,
        req: ListPostRequest,
    ) -> Result<ListPostResponse, Error> {
        let (offset, limit) = page_bounds(req.offset, req.limit);
        let title = req.title.as_deref().filter(|t| !t.is_empty());
        let page = self
            .posts
            .list(caller(ctx)?, title, offset, limit)
            .await
            .map_err(internal)?;
        Ok(ListPostResponse {
            total_count: page.total,
            posts: page.items.iter().map(|p| p.to_proto()).collect(),
        })
    }
}

fn post_error(err: StoreError) -> Error {
    match err {
        StoreError::NotFound => Error::PostNotFound,
        other => internal(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::auth::Identity;
    use crate::server::store::MemoryStore;

    fn ctx(user_id: &str) -> RequestContext {
        RequestContext::new("req-1".into()).with_identity(Identity {
            user_id: user_id.into(),
            username: user_id.into(),
        })
    }

    fn create(title: &str) -> CreatePostRequest {
        CreatePostRequest {
            title: title.into(),
            content: "body".into(),
        }
    }

    #[tokio::test]
    async fn other_users_posts_are_not_found() {
        let biz = PostBiz::new(Arc::new(MemoryStore::new()));
        let owner = ctx("user-000001");
        let post_id = biz.create_post(&owner, create("hello")).await.unwrap().post_id;

        let req = GetPostRequest {
            post_id: post_id.clone(),
        };
        let err = biz.get_post(&ctx("user-000002"), req.clone()).await.unwrap_err();
        assert_eq!(err, Error::PostNotFound);

        let post = biz.get_post(&owner, req).await.unwrap().post.unwrap();
        assert_eq!(post.title, "hello");
        assert_eq!(post.user_id, "user-000001");
    }

    #[tokio::test]
    async fn update_changes_only_present_fields() {
        let biz = PostBiz::new(Arc::new(MemoryStore::new()));
        let owner = ctx("user-000001");
        let post_id = biz.create_post(&owner, create("hello")).await.unwrap().post_id;

        biz.update_post(
            &owner,
            UpdatePostRequest {
                post_id: post_id.clone(),
                title: Some("renamed".into()),
                content: None,
            },
        )
        .await
        .unwrap();

        let post = biz
            .get_post(&owner, GetPostRequest { post_id })
            .await
            .unwrap()
            .post
            .unwrap();
        assert_eq!(post.title, "renamed");
        assert_eq!(post.content, "body");
    }

    #[tokio::test]
    async fn delete_then_list() {
        let biz = PostBiz::new(Arc::new(MemoryStore::new()));
        let owner = ctx("user-000001");
        let first = biz.create_post(&owner, create("one")).await.unwrap().post_id;
        biz.create_post(&owner, create("two")).await.unwrap();

        biz.delete_post(
            &owner,
            DeletePostRequest {
                post_ids: vec![first, "post-999999".into()],
            },
        )
        .await
        .unwrap();

        let listed = biz
            .list_post(
                &owner,
                ListPostRequest {
                    offset: 0,
                    limit: 20,
                    title: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(listed.total_count, 1);
        assert_eq!(listed.posts[0].title, "two");
    }
}
