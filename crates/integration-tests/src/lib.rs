//! Integration test harness for Corner Shop.
//!
//! The storefront router runs in-process on the in-memory store with a
//! controllable clock, so scenarios can move time and inject store faults.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p corner-shop-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use chrono::{TimeZone, Utc};
use secrecy::SecretString;
use tower::ServiceExt;
use url::Url;

use corner_shop_core::{AppId, FixedClock};
use corner_shop_storefront::app;
use corner_shop_storefront::config::{LogFormat, StorefrontConfig};
use corner_shop_storefront::services::{ChannelNotifier, LogSink};
use corner_shop_storefront::state::AppState;
use corner_shop_storefront::store::{AccountStore, InMemoryStore};

pub const SIGNING_SECRET: &[u8] = b"integration-signing-key-9f8e7d6c5b4a";
pub const PASSWORD: &str = "correct horse battery";

/// A storefront wired onto an in-memory store.
pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    pub clock: FixedClock,
    pub state: AppState,
    pub router: Router,
    pub app_id: AppId,
}

impl TestContext {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let app_id = store.create_app("web", SIGNING_SECRET).await.unwrap();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());

        let config = StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/unused"),
            host: "127.0.0.1".parse().unwrap(),
            port: 0,
            base_url: Url::parse("http://localhost:3000").unwrap(),
            app_id,
            token_ttl: chrono::Duration::hours(72),
            session_ttl: chrono::Duration::hours(24),
            store_timeout: Duration::from_secs(2),
            notify_queue: 16,
            log_format: LogFormat::Text,
            sentry_dsn: None,
            sentry_environment: None,
        };
        let (notifier, _worker) = ChannelNotifier::spawn(config.notify_queue, Arc::new(LogSink));
        let state = AppState::with_clock(
            config,
            store.clone(),
            Arc::new(notifier),
            Arc::new(clock.clone()),
        );
        let router = app(state.clone());

        Self {
            store,
            clock,
            state,
            router,
            app_id,
        }
    }

    /// Send one request through the router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookies: &[(&str, &str)]) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie_header(cookies) {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(
        &self,
        uri: &str,
        form: &str,
        cookies: &[(&str, &str)],
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie_header(cookies) {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.to_string())).unwrap())
            .await
    }

    /// Register an account through the service layer.
    pub async fn register(&self, email: &str) -> corner_shop_core::UserId {
        self.state
            .auth()
            .register_account(email, PASSWORD, self.state.deadline())
            .await
            .unwrap()
    }
}

fn cookie_header(cookies: &[(&str, &str)]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// A parsed `Set-Cookie` header: name, value and raw attributes.
#[derive(Debug, Clone)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub attributes: Vec<String>,
}

impl SetCookie {
    #[must_use]
    pub fn has(&self, attribute: &str) -> bool {
        self.attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(attribute))
    }

    #[must_use]
    pub fn max_age(&self) -> Option<i64> {
        self.attributes
            .iter()
            .find_map(|a| a.strip_prefix("Max-Age="))
            .and_then(|v| v.parse().ok())
    }
}

/// Every `Set-Cookie` on a response.
#[must_use]
pub fn set_cookies<B>(response: &Response<B>) -> Vec<SetCookie> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| {
            let mut parts = raw.split(';').map(str::trim);
            let (name, value) = parts.next()?.split_once('=')?;
            Some(SetCookie {
                name: name.to_string(),
                value: value.to_string(),
                attributes: parts.map(String::from).collect(),
            })
        })
        .collect()
}

/// The `Set-Cookie` for `name`, if any.
#[must_use]
pub fn set_cookie<B>(response: &Response<B>, name: &str) -> Option<SetCookie> {
    set_cookies(response).into_iter().find(|c| c.name == name)
}

/// Read a JSON response body.
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
