//! Per-request identity resolution over HTTP.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use chrono::Duration;

use corner_shop_core::SessionKey;
use corner_shop_integration_tests::{PASSWORD, TestContext, json_body, set_cookie};
use corner_shop_storefront::store::SessionStore;

async fn login_token(ctx: &TestContext) -> String {
    ctx.register("shopper@example.com").await;
    let response = ctx
        .post_form(
            "/auth/login",
            &format!("email=shopper%40example.com&password={}", PASSWORD.replace(' ', "+")),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    set_cookie(&response, "auth_token").unwrap().value
}

#[tokio::test]
async fn test_no_cookies_creates_day_long_session() {
    let ctx = TestContext::new().await;

    let response = ctx.get("/cart/count", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = set_cookie(&response, "session_id").unwrap();
    assert!(cookie.has("HttpOnly"));
    assert!(cookie.has("SameSite=Lax"));
    assert!(cookie.has("Path=/"));
    assert!(!cookie.has("Secure"));
    assert_eq!(cookie.max_age(), Some(24 * 3600));

    let key = SessionKey::parse(&cookie.value).unwrap();
    let session = ctx.store.get_session(&key).await.unwrap().unwrap();
    assert_eq!(session.expires_at - session.created_at, Duration::hours(24));
    assert_eq!(json_body(response).await["count"], 0);
}

#[tokio::test]
async fn test_live_session_is_reused() {
    let ctx = TestContext::new().await;
    let first = ctx.get("/cart", &[]).await;
    let session = set_cookie(&first, "session_id").unwrap();

    ctx.clock.advance(Duration::hours(23));
    let response = ctx.get("/cart", &[("session_id", &session.value)]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response, "session_id").is_none());
    assert_eq!(ctx.store.session_count(), 1);
}

#[tokio::test]
async fn test_expired_session_is_replaced() {
    let ctx = TestContext::new().await;
    let first = ctx.get("/cart", &[]).await;
    let session = set_cookie(&first, "session_id").unwrap();

    ctx.clock.advance(Duration::hours(24));
    let response = ctx.get("/cart", &[("session_id", &session.value)]).await;
    let replacement = set_cookie(&response, "session_id").unwrap();
    assert_ne!(replacement.value, session.value);
}

#[tokio::test]
async fn test_unparseable_session_cookie_is_replaced() {
    let ctx = TestContext::new().await;
    let response = ctx.get("/cart", &[("session_id", "not-a-session-key")]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response, "session_id").is_some());
}

#[tokio::test]
async fn test_valid_token_resolves_account() {
    let ctx = TestContext::new().await;
    let token = login_token(&ctx).await;

    let response = ctx.get("/cart", &[("auth_token", &token)]).await;
    assert!(set_cookie(&response, "session_id").is_none());
    assert_eq!(json_body(response).await["owner"], "user");
}

#[tokio::test]
async fn test_expired_token_falls_back_to_guest() {
    let ctx = TestContext::new().await;
    let token = login_token(&ctx).await;

    ctx.clock.advance(Duration::hours(72));
    let response = ctx.get("/cart", &[("auth_token", &token)]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response, "session_id").is_some());
    assert_eq!(json_body(response).await["owner"], "session");
}

#[tokio::test]
async fn test_garbage_token_is_not_an_error() {
    let ctx = TestContext::new().await;
    let response = ctx.get("/cart/count", &[("auth_token", "garbage")]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response, "session_id").is_some());
}

#[tokio::test]
async fn test_session_store_failure_still_serves_guest() {
    let ctx = TestContext::new().await;
    ctx.store.fail_next("create_session");

    let response = ctx.get("/cart/count", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response, "session_id").is_some());
    assert_eq!(ctx.store.session_count(), 0);
}

#[tokio::test]
async fn test_logout_clears_token_cookie() {
    let ctx = TestContext::new().await;
    let token = login_token(&ctx).await;

    let response = ctx
        .post_form("/auth/logout", "", &[("auth_token", &token)])
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cleared = set_cookie(&response, "auth_token").unwrap();
    assert_eq!(cleared.value, "");
    assert_eq!(cleared.max_age(), Some(0));
}

#[tokio::test]
async fn test_register_over_http() {
    let ctx = TestContext::new().await;

    let response = ctx
        .post_form(
            "/auth/register",
            "email=new%40example.com&password=long-enough&password_confirm=long-enough",
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(json_body(response).await["user_id"].is_i64());

    let duplicate = ctx
        .post_form(
            "/auth/register",
            "email=new%40example.com&password=long-enough&password_confirm=long-enough",
            &[],
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let mismatch = ctx
        .post_form(
            "/auth/register",
            "email=other%40example.com&password=long-enough&password_confirm=different",
            &[],
        )
        .await;
    assert_eq!(mismatch.status(), StatusCode::BAD_REQUEST);
}
