use super::{
    NewPost, NewUser, Page, PostRecord, PostStore, StoreError, UserRecord, UserStore,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;

const USER_PREFIX: &str = "user-";
const POST_PREFIX: &str = "post-";

#[derive(Default)]
struct Tables {
    // Keyed by the numeric part of the ID, so map order is insertion order.
    users: BTreeMap<u64, UserRecord>,
    posts: BTreeMap<u64, PostRecord>,
    next_user: u64,
    next_post: u64,
}

impl Tables {
    fn insert_user(&mut self, seq: u64, user: NewUser) -> Result<UserRecord, StoreError> {
        if self.users.contains_key(&seq) {
            return Err(StoreError::Duplicate("user_id"));
        }
        if self.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate("username"));
        }

        let now = Utc::now();
        let record = UserRecord {
            user_id: format_id(USER_PREFIX, seq),
            username: user.username,
            password_hash: user.password_hash,
            nickname: user.nickname,
            email: user.email,
            phone: user.phone,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(seq, record.clone());
        Ok(record)
    }

    fn user(&self, user_id: &str) -> Option<&UserRecord> {
        parse_id(USER_PREFIX, user_id)
            .and_then(|seq| self.users.get(&seq))
            .filter(|u| u.user_id == user_id)
    }

    fn post(&self, post_id: &str) -> Option<&PostRecord> {
        parse_id(POST_PREFIX, post_id)
            .and_then(|seq| self.posts.get(&seq))
            .filter(|p| p.post_id == post_id)
    }
}

fn format_id(prefix: &str, seq: u64) -> String {
    format!("{prefix}{seq:06}")
}

fn parse_id(prefix: &str, id: &str) -> Option<u64> {
    id.strip_prefix(prefix)?.parse().ok()
}

/// In-process store for users and posts.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a user under a fixed sequence number instead of the next free
    /// one. Later users are numbered after it.
    pub fn provision_user(&self, seq: u64, user: NewUser) -> Result<UserRecord, StoreError> {
        let mut tables = self.tables.write();
        let record = tables.insert_user(seq, user)?;
        tables.next_user = tables.next_user.max(seq);
        Ok(record)
    }
}

fn page<T: Clone>(items: impl Iterator<Item = T>, offset: usize, limit: usize) -> Page<T> {
    let items: Vec<T> = items.collect();
    let total = i64::try_from(items.len()).unwrap_or(i64::MAX);
    Page {
        total,
        items: items.into_iter().skip(offset).take(limit).collect(),
    }
}

#[tonic::async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let mut tables = self.tables.write();
        let seq = tables.next_user + 1;
        let record = tables.insert_user(seq, user)?;
        tables.next_user = seq;
        Ok(record)
    }

    async fn get(&self, user_id: &str) -> Result<UserRecord, StoreError> {
        self.tables
            .read()
            .user(user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_username(&self, username: &str) -> Result<UserRecord, StoreError> {
        self.tables
            .read()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, mut user: UserRecord) -> Result<UserRecord, StoreError> {
        let mut tables = self.tables.write();
        let seq = tables.user(&user.user_id).and(parse_id(USER_PREFIX, &user.user_id));
        let Some(seq) = seq else {
            return Err(StoreError::NotFound);
        };
        if tables
            .users
            .values()
            .any(|u| u.username == user.username && u.user_id != user.user_id)
        {
            return Err(StoreError::Duplicate("username"));
        }
        user.updated_at = Utc::now();
        tables.users.insert(seq, user.clone());
        Ok(user)
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if let Some(seq) = tables.user(user_id).and(parse_id(USER_PREFIX, user_id)) {
            tables.users.remove(&seq);
        }
        Ok(())
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Page<UserRecord>, StoreError> {
        let tables = self.tables.read();
        Ok(page(tables.users.values().cloned(), offset, limit))
    }
}

#[tonic::async_trait]
impl PostStore for MemoryStore {
    async fn create(&self, post: NewPost) -> Result<PostRecord, StoreError> {
        let mut tables = self.tables.write();
        tables.next_post += 1;
        let seq = tables.next_post;
        let now = Utc::now();
        let record = PostRecord {
            post_id: format_id(POST_PREFIX, seq),
            user_id: post.user_id,
            title: post.title,
            content: post.content,
            created_at: now,
            updated_at: now,
        };
        tables.posts.insert(seq, record.clone());
        Ok(record)
    }

    async fn get(&self, user_id: &str, post_id: &str) -> Result<PostRecord, StoreError> {
        self.tables
            .read()
            .post(post_id)
            .filter(|p| p.user_id == user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, mut post: PostRecord) -> Result<PostRecord, StoreError> {
        let mut tables = self.tables.write();
        let seq = match tables.post(&post.post_id) {
            Some(existing) if existing.user_id == post.user_id => {
                parse_id(POST_PREFIX, &post.post_id)
            }
            _ => None,
        };
        let Some(seq) = seq else {
            return Err(StoreError::NotFound);
        };
        post.updated_at = Utc::now();
        tables.posts.insert(seq, post.clone());
        Ok(post)
    }

    async fn delete(&self, user_id: &str, post_ids: &[String]) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        for post_id in post_ids {
            let owned = tables.post(post_id).is_some_and(|p| p.user_id == user_id);
            if let Some(seq) = parse_id(POST_PREFIX, post_id).filter(|_| owned) {
                tables.posts.remove(&seq);
            }
        }
        Ok(())
    }

    async fn delete_by_user(&self, user_id: &str) -> Result<(), StoreError> {
        self.tables.write().posts.retain(|_, p| p.user_id != user_id);
        Ok(())
    }

    async fn count_by_user(&self, user_id: &str) -> Result<i64, StoreError> {
        let count = self
            .tables
            .read()
            .posts
            .values()
            .filter(|p| p.user_id == user_id)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn list(
        &self,
        user_id: &str,
        title: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PostRecord>, StoreError> {
        let tables = self.tables.read();
        let matching = tables.posts.values().filter(|p| {
            p.user_id == user_id && title.is_none_or(|t| p.title.contains(t))
        });
        Ok(page(matching.cloned(), offset, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.into(),
            password_hash: "hash".into(),
            nickname: username.into(),
            email: format!("{username}@example.com"),
            phone: "18110000000".into(),
        }
    }

    fn new_post(user_id: &str, title: &str) -> NewPost {
        NewPost {
            user_id: user_id.into(),
            title: title.into(),
            content: "content".into(),
        }
    }

    #[tokio::test]
    async fn ids_follow_insertion_order() {
        let store = MemoryStore::new();
        let first = UserStore::create(&store, new_user("alice")).await.unwrap();
        let second = UserStore::create(&store, new_user("bobby")).await.unwrap();
        assert_eq!(first.user_id, "user-000001");
        assert_eq!(second.user_id, "user-000002");

        let listed = UserStore::list(&store, 0, 10).await.unwrap();
        assert_eq!(listed.total, 2);
        assert_eq!(listed.items[1].username, "bobby");
    }

    #[tokio::test]
    async fn listing_order_survives_wider_ids() {
        let store = MemoryStore::new();
        store.provision_user(999_999, new_user("alice")).unwrap();
        let wide = UserStore::create(&store, new_user("bobby")).await.unwrap();
        assert_eq!(wide.user_id, "user-1000000");

        let listed = UserStore::list(&store, 0, 10).await.unwrap();
        let ids: Vec<_> = listed.items.iter().map(|u| u.user_id.as_str()).collect();
        assert_eq!(ids, ["user-999999", "user-1000000"]);
        assert!(UserStore::get(&store, "user-1000000").await.is_ok());
    }

    #[tokio::test]
    async fn provisioned_user_keeps_its_id() {
        let store = MemoryStore::new();
        let root = store.provision_user(0, new_user("root")).unwrap();
        assert_eq!(root.user_id, "user-000000");

        let next = UserStore::create(&store, new_user("alice")).await.unwrap();
        assert_eq!(next.user_id, "user-000001");

        let err = store.provision_user(0, new_user("other")).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("user_id")));
        let err = UserStore::create(&store, new_user("root")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("username")));
    }

    #[tokio::test]
    async fn lookups_need_the_exact_id() {
        let store = MemoryStore::new();
        UserStore::create(&store, new_user("alice")).await.unwrap();
        assert!(UserStore::get(&store, "user-1").await.is_err());
        assert!(UserStore::get(&store, "post-000001").await.is_err());
        assert!(UserStore::get(&store, "user-000001").await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_username_is_reported() {
        let store = MemoryStore::new();
        UserStore::create(&store, new_user("alice")).await.unwrap();
        let err = UserStore::create(&store, new_user("alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("username")));
    }

    #[tokio::test]
    async fn rename_onto_taken_username_is_duplicate() {
        let store = MemoryStore::new();
        UserStore::create(&store, new_user("alice")).await.unwrap();
        let mut bob = UserStore::create(&store, new_user("bobby")).await.unwrap();
        bob.username = "alice".into();
        let err = UserStore::update(&store, bob).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn posts_are_scoped_to_their_owner() {
        let store = MemoryStore::new();
        let post = PostStore::create(&store, new_post("user-000001", "hello"))
            .await
            .unwrap();
        assert_eq!(post.post_id, "post-000001");
        assert!(PostStore::get(&store, "user-000002", &post.post_id).await.is_err());

        PostStore::delete(&store, "user-000002", &[post.post_id.clone()])
            .await
            .unwrap();
        assert!(PostStore::get(&store, "user-000001", &post.post_id).await.is_ok());
    }

    #[tokio::test]
    async fn list_filters_by_title_and_pages() {
        let store = MemoryStore::new();
        for title in ["rust one", "go two", "rust three"] {
            PostStore::create(&store, new_post("user-000001", title))
                .await
                .unwrap();
        }

        let page = PostStore::list(&store, "user-000001", Some("rust"), 1, 10)
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "rust three");
        assert_eq!(store.count_by_user("user-000001").await.unwrap(), 3);
    }
}
