mod common;

use common::{config, start, user_json};
use miniblog_server::{HttpAuthPolicy, ServerMode};
use reqwest::StatusCode;
use serde_json::{Value, json};

async fn login(http: &reqwest::Client, base: &str, username: &str) -> String {
    let body: Value = http
        .post(format!("{base}/login"))
        .json(&json!({ "username": username, "password": "miniblog1234" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["token"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn http_mode_runs_without_a_grpc_listener() {
    let server = start(config(ServerMode::Http)).await;
    assert!(server.rpc.is_none());
    assert!(server.http.is_some());

    let response = reqwest::get(format!("{}/healthz", server.http_url()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    server.stop().await;
}

#[tokio::test]
async fn users_only_see_their_own_posts() {
    let server = start(config(ServerMode::Http)).await;
    let http = reqwest::Client::new();
    let base = server.http_url();

    for username in ["colin", "alice"] {
        let created = http
            .post(format!("{base}/v1/users"))
            .json(&user_json(username))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::OK);
    }
    let colin = login(&http, &base, "colin").await;
    let alice = login(&http, &base, "alice").await;

    let created: Value = http
        .post(format!("{base}/v1/posts"))
        .bearer_auth(&colin)
        .json(&json!({ "title": "mine", "content": "colin's post" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let post_id = created["postId"].as_str().unwrap().to_owned();

    let own = http
        .get(format!("{base}/v1/posts/{post_id}"))
        .bearer_auth(&colin)
        .send()
        .await
        .unwrap();
    assert_eq!(own.status(), StatusCode::OK);

    let other = http
        .get(format!("{base}/v1/posts/{post_id}"))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::NOT_FOUND);
    let body: Value = other.json().await.unwrap();
    assert_eq!(body["reason"], "NotFound.PostNotFound");

    let updated = http
        .put(format!("{base}/v1/posts/{post_id}"))
        .bearer_auth(&colin)
        .json(&json!({ "title": "renamed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);

    let deleted = http
        .delete(format!("{base}/v1/posts"))
        .bearer_auth(&colin)
        .json(&json!({ "postIds": [post_id] }))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);

    let listed: Value = http
        .get(format!("{base}/v1/posts"))
        .bearer_auth(&colin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["totalCount"], 0);

    server.stop().await;
}

#[tokio::test]
async fn users_cannot_touch_other_users() {
    let server = start(config(ServerMode::Http)).await;
    let http = reqwest::Client::new();
    let base = server.http_url();

    for username in ["colin", "alice"] {
        http.post(format!("{base}/v1/users"))
            .json(&user_json(username))
            .send()
            .await
            .unwrap();
    }
    let alice = login(&http, &base, "alice").await;

    let response = http
        .delete(format!("{base}/v1/users/user-000001"))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let changed = http
        .put(format!("{base}/v1/users/user-000002/change-password"))
        .bearer_auth(&alice)
        .json(&json!({ "oldPassword": "wrong-password", "newPassword": "another1234" }))
        .send()
        .await
        .unwrap();
    assert_eq!(changed.status(), StatusCode::UNAUTHORIZED);
    let body: Value = changed.json().await.unwrap();
    assert_eq!(body["reason"], "Unauthenticated.PasswordIncorrect");

    server.stop().await;
}

#[tokio::test]
async fn validation_failures_are_bad_requests() {
    let server = start(config(ServerMode::Http)).await;
    let http = reqwest::Client::new();

    let mut user = user_json("colin");
    user["email"] = json!("not-an-email");
    let response = http
        .post(format!("{}/v1/users", server.http_url()))
        .header("x-request-id", "bad-email")
        .json(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["x-request-id"], "bad-email");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], 400);
    assert_eq!(body["reason"], "InvalidArgument");

    server.stop().await;
}

#[tokio::test]
async fn bypass_policy_trusts_the_user_id_header() {
    let mut cfg = config(ServerMode::Http);
    cfg.http_auth = HttpAuthPolicy::Bypass;
    let server = start(cfg).await;
    let http = reqwest::Client::new();
    let base = server.http_url();

    http.post(format!("{base}/v1/users"))
        .json(&user_json("colin"))
        .send()
        .await
        .unwrap();

    // no header: the default user
    let user: Value = http
        .get(format!("{base}/v1/users/user-000001"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(user["user"]["username"], "colin");

    let unknown = http
        .get(format!("{base}/v1/users/user-000001"))
        .header("x-user-id", "user-999999")
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    let body: Value = unknown.json().await.unwrap();
    assert_eq!(body["reason"], "Unauthenticated");

    server.stop().await;
}
