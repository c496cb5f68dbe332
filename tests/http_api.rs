use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use snapfeed::config::AppCfg;

fn app() -> Router {
    snapfeed::app(&AppCfg::default())
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_req(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

/// Sign up and sign in. Returns the user id and session secret.
async fn register(app: &Router, username: &str) -> (String, String) {
    let (status, user) = call(
        app,
        json_req(
            "POST",
            "/auth/sign-up",
            None,
            json!({
                "name": format!("{username} tester"),
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "correct horse",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{user}");

    let (status, session) = call(
        app,
        json_req(
            "POST",
            "/auth/sign-in",
            None,
            json!({ "email": format!("{username}@example.com"), "password": "correct horse" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    (
        user["id"].as_str().unwrap().to_owned(),
        session["secret"].as_str().unwrap().to_owned(),
    )
}

#[tokio::test]
async fn sign_up_then_me() {
    let app = app();
    let (id, token) = register(&app, "ann").await;

    let (status, me) = call(&app, get("/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], id.as_str());
    assert_eq!(me["username"], "ann");

    let (status, _) = call(&app, json_req("POST", "/auth/sign-out", Some(&token), Value::Null)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, get("/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = app();
    let (status, body) = call(&app, get("/notifications", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let app = app();
    register(&app, "ann").await;

    let (status, _) = call(
        &app,
        json_req(
            "POST",
            "/auth/sign-up",
            None,
            json!({
                "name": "Another Ann",
                "username": "Ann",
                "email": "ann2@example.com",
                "password": "correct horse",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn follow_shows_up_in_notifications() {
    let app = app();
    let (_, ann) = register(&app, "ann").await;
    let (bob_id, bob) = register(&app, "bob").await;

    let (status, state) = call(
        &app,
        json_req("POST", &format!("/users/{bob_id}/follow"), Some(&ann), Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["following"], true);
    assert_eq!(state["label"], "Unfollow");

    let (_, stats) = call(&app, get(&format!("/users/{bob_id}/stats"), None)).await;
    assert_eq!(stats["followers"], 1);

    let (_, unread) = call(&app, get("/notifications/unread-count", Some(&bob))).await;
    assert_eq!(unread["count"], 1);

    let (status, marked) = call(&app, json_req("POST", "/notifications/read-all", Some(&bob), Value::Null)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(marked["count"], 1);
    let (_, unread) = call(&app, get("/notifications/unread-count", Some(&bob))).await;
    assert_eq!(unread["count"], 0);

    let (_, state) = call(
        &app,
        json_req("POST", &format!("/users/{bob_id}/follow/toggle"), Some(&ann), Value::Null),
    )
    .await;
    assert_eq!(state["following"], false);
}

#[tokio::test]
async fn following_yourself_is_rejected() {
    let app = app();
    let (ann_id, ann) = register(&app, "ann").await;

    let (status, _) = call(
        &app,
        json_req("POST", &format!("/users/{ann_id}/follow"), Some(&ann), Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_post_is_not_found() {
    let app = app();
    let (status, body) = call(&app, get(&format!("/posts/{}", uuid::Uuid::now_v7()), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn empty_feed_pages() {
    let app = app();
    let (status, page) = call(&app, get("/posts", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 0);
    assert_eq!(page["documents"], json!([]));
}
