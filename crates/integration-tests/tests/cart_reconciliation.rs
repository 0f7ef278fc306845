//! Guest-to-account cart reconciliation scenarios.

#![allow(clippy::unwrap_used)]

use std::time::Duration as StdDuration;

use axum::http::StatusCode;
use chrono::Duration;

use corner_shop_core::{Cart, CartLine, Identity, OwnerKey, ProductId, Quantity, SessionKey};
use corner_shop_integration_tests::{PASSWORD, TestContext, json_body, set_cookie};
use corner_shop_storefront::services::ReconcileOutcome;
use corner_shop_storefront::store::{CartStore, Deadline, SessionStore};

fn deadline() -> Deadline {
    Deadline::after(StdDuration::from_secs(2))
}

fn cart(lines: &[(i64, u32)]) -> Cart {
    lines
        .iter()
        .map(|&(p, q)| CartLine {
            product_id: ProductId::new(p),
            quantity: Quantity::new(q).unwrap(),
        })
        .collect()
}

async fn guest(ctx: &TestContext, lines: &[(i64, u32)]) -> Identity {
    let key = SessionKey::generate();
    let now = corner_shop_core::Clock::now(&ctx.clock);
    ctx.store
        .create_session(&key, now, now + Duration::hours(24))
        .await
        .unwrap();
    let identity = Identity::Anonymous { session_key: key };
    ctx.store
        .replace_cart(&identity.owner_key(), &cart(lines))
        .await
        .unwrap();
    identity
}

#[tokio::test]
async fn test_login_merges_additively_and_rerun_is_noop() {
    let ctx = TestContext::new().await;
    let user_id = ctx.register("shopper@example.com").await;
    let account = OwnerKey::User(user_id);
    ctx.store
        .replace_cart(&account, &cart(&[(1, 1), (2, 3)]))
        .await
        .unwrap();
    let prior = guest(&ctx, &[(1, 2)]).await;

    let outcome = ctx
        .state
        .login()
        .login(&prior, "shopper@example.com", PASSWORD, ctx.app_id, deadline())
        .await
        .unwrap();
    assert!(matches!(
        outcome.merge,
        Ok(ReconcileOutcome::Merged {
            lines_moved: 1,
            account_lines: 2
        })
    ));
    assert_eq!(
        ctx.store.get_cart(&account).await.unwrap(),
        cart(&[(1, 3), (2, 3)])
    );
    assert!(ctx.store.get_cart(&prior.owner_key()).await.unwrap().is_empty());

    // Logging in again from the same (now folded) guest changes nothing.
    let again = ctx
        .state
        .login()
        .login(&prior, "shopper@example.com", PASSWORD, ctx.app_id, deadline())
        .await
        .unwrap();
    assert!(matches!(again.merge, Ok(ReconcileOutcome::NothingToMerge)));
    assert_eq!(
        ctx.store.get_cart(&account).await.unwrap(),
        cart(&[(1, 3), (2, 3)])
    );
}

#[tokio::test]
async fn test_folded_session_is_invalidated() {
    let ctx = TestContext::new().await;
    ctx.register("shopper@example.com").await;
    let prior = guest(&ctx, &[(7, 1)]).await;
    let Identity::Anonymous { session_key } = &prior else {
        unreachable!()
    };

    ctx.state
        .login()
        .login(&prior, "shopper@example.com", PASSWORD, ctx.app_id, deadline())
        .await
        .unwrap();
    assert!(ctx.store.get_session(session_key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_logins_merge_exactly_once() {
    let ctx = TestContext::new().await;
    let user_id = ctx.register("shopper@example.com").await;
    let prior = guest(&ctx, &[(1, 1)]).await;

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let state = ctx.state.clone();
            let prior = prior.clone();
            let app_id = ctx.app_id;
            tokio::spawn(async move {
                state
                    .login()
                    .login(&prior, "shopper@example.com", PASSWORD, app_id, deadline())
                    .await
            })
        })
        .collect();

    let mut merged = 0;
    for task in tasks {
        let outcome = task.await.unwrap().unwrap();
        match outcome.merge.unwrap() {
            ReconcileOutcome::Merged { .. } => merged += 1,
            ReconcileOutcome::NothingToMerge => {}
            ReconcileOutcome::NotApplicable => panic!("guest login must reconcile"),
        }
    }

    assert_eq!(merged, 1);
    assert_eq!(
        ctx.store.get_cart(&OwnerKey::User(user_id)).await.unwrap(),
        cart(&[(1, 1)])
    );
}

#[tokio::test]
async fn test_http_login_moves_guest_cart_and_clears_session_cookie() {
    let ctx = TestContext::new().await;
    ctx.register("shopper@example.com").await;

    // First anonymous contact: the add creates the guest session.
    let response = ctx.post_form("/cart/add", "product_id=42&quantity=2", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let session = set_cookie(&response, "session_id").unwrap();

    let response = ctx
        .post_form(
            "/auth/login",
            &format!("email=shopper%40example.com&password={}", PASSWORD.replace(' ', "+")),
            &[("session_id", &session.value)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let auth = set_cookie(&response, "auth_token").unwrap();
    assert!(auth.has("HttpOnly"));
    assert!(auth.has("SameSite=Lax"));
    assert_eq!(auth.max_age(), Some(72 * 3600));
    let cleared = set_cookie(&response, "session_id").unwrap();
    assert_eq!(cleared.value, "");
    assert_eq!(cleared.max_age(), Some(0));

    let body = json_body(response).await;
    assert_eq!(body["cart_merged"], true);
    assert!(body.get("cart_error").is_none());

    let response = ctx.get("/cart", &[("auth_token", &auth.value)]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response, "session_id").is_none());
    let body = json_body(response).await;
    assert_eq!(body["owner"], "user");
    assert_eq!(body["item_count"], 2);
    assert_eq!(body["lines"][0]["product_id"], 42);

    // The folded session no longer resolves; a new, empty one replaces it.
    let response = ctx.get("/cart", &[("session_id", &session.value)]).await;
    let replacement = set_cookie(&response, "session_id").unwrap();
    assert_ne!(replacement.value, session.value);
    assert_eq!(json_body(response).await["item_count"], 0);
}

#[tokio::test]
async fn test_merge_failure_does_not_fail_http_login() {
    let ctx = TestContext::new().await;
    ctx.register("shopper@example.com").await;
    let prior = guest(&ctx, &[(5, 1)]).await;
    let Identity::Anonymous { session_key } = &prior else {
        unreachable!()
    };
    ctx.store.fail_next("commit_merge");

    let response = ctx
        .post_form(
            "/auth/login",
            &format!("email=shopper%40example.com&password={}", PASSWORD.replace(' ', "+")),
            &[("session_id", session_key.as_str())],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response, "auth_token").is_some());
    assert!(set_cookie(&response, "session_id").is_none());

    let body = json_body(response).await;
    assert_eq!(body["cart_merged"], false);
    assert!(body["cart_error"].is_string());
    assert_eq!(ctx.store.item_count(&prior.owner_key()).await.unwrap(), 1);
    assert!(ctx.store.get_session(session_key).await.unwrap().is_some());

    // The guest still holds its session, so the next login merges the cart.
    let response = ctx
        .post_form(
            "/auth/login",
            &format!("email=shopper%40example.com&password={}", PASSWORD.replace(' ', "+")),
            &[("session_id", session_key.as_str())],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(set_cookie(&response, "session_id").unwrap().max_age(), Some(0));
    assert_eq!(json_body(response).await["cart_merged"], true);
    assert_eq!(ctx.store.item_count(&prior.owner_key()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_wrong_password_over_http_keeps_guest_session() {
    let ctx = TestContext::new().await;
    ctx.register("shopper@example.com").await;
    let prior = guest(&ctx, &[(5, 1)]).await;
    let Identity::Anonymous { session_key } = &prior else {
        unreachable!()
    };

    let response = ctx
        .post_form(
            "/auth/login",
            "email=shopper%40example.com&password=nope-nope",
            &[("session_id", session_key.as_str())],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(&response, "session_id").is_none());
    assert!(set_cookie(&response, "auth_token").is_none());
    assert_eq!(ctx.store.item_count(&prior.owner_key()).await.unwrap(), 1);
}
