//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span with `request_id` and `user_id` fields)
//! 3. Request ID (add unique ID to each request)
//! 4. Identity (resolve token or guest session, set `session_id` cookie)

pub mod identity;
pub mod request_id;

pub use identity::{
    AUTH_COOKIE, CurrentIdentity, SESSION_COOKIE, append_cookie, build_clear_cookie,
    build_set_cookie, identity_middleware, presented_credentials,
};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
