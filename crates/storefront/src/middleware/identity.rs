//! Identity resolution for every request.
//!
//! [`identity_middleware`] reads the `auth_token` and `session_id` cookies
//! (or an `Authorization: Bearer` token), resolves the caller, and stores the
//! resulting [`Identity`] in request extensions for the [`CurrentIdentity`]
//! extractor. When the resolver minted a guest session, the `session_id`
//! cookie is appended to the response unless the handler already set or
//! cleared it.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{
        HeaderMap, HeaderValue,
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
        request::Parts,
    },
    middleware::Next,
    response::Response,
};
use tower_sessions::cookie::{Cookie, SameSite, time::Duration};
use tracing::Span;

use corner_shop_core::Identity;

use crate::error::AppError;
use crate::services::PresentedCredentials;
use crate::state::AppState;

/// Cookie carrying the signed token of a logged-in customer.
pub const AUTH_COOKIE: &str = "auth_token";

/// Cookie carrying a guest's session key.
pub const SESSION_COOKIE: &str = "session_id";

/// Collect the credentials a request presents. A bearer token takes
/// precedence over the `auth_token` cookie.
#[must_use]
pub fn presented_credentials(headers: &HeaderMap) -> PresentedCredentials {
    let mut credentials = PresentedCredentials::default();

    for header in headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else {
            continue;
        };
        for cookie in Cookie::split_parse(raw).flatten() {
            match cookie.name() {
                AUTH_COOKIE if !cookie.value().is_empty() => {
                    credentials.token = Some(cookie.value().to_string());
                }
                SESSION_COOKIE if !cookie.value().is_empty() => {
                    credentials.session_key = Some(cookie.value().to_string());
                }
                _ => {}
            }
        }
    }

    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        credentials.token = Some(token.to_string());
    }

    credentials
}

/// `Set-Cookie` for a value that lives `max_age` seconds.
#[must_use]
pub fn build_set_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::seconds(max_age_secs))
        .build()
        .to_string()
}

/// `Set-Cookie` that removes `name` from the client.
#[must_use]
pub fn build_clear_cookie(name: &str, secure: bool) -> String {
    build_set_cookie(name, "", 0, secure)
}

/// Append a `Set-Cookie` header. Values that are not valid header text are
/// skipped.
pub fn append_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "Dropping unrepresentable cookie"),
    }
}

fn response_sets_cookie(response: &Response, name: &str) -> bool {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| Cookie::parse(v).ok())
        .any(|c| c.name() == name)
}

/// Resolve the caller and make the identity available to handlers.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let credentials = presented_credentials(request.headers());
    let resolution = state
        .identity()
        .resolve(&credentials, state.deadline())
        .await;

    if let Some(user_id) = resolution.identity.user_id() {
        Span::current().record("user_id", user_id.get());
    }
    request.extensions_mut().insert(resolution.identity);

    let mut response = next.run(request).await;

    if let Some(cookie) = resolution.session_cookie
        && !response_sets_cookie(&response, SESSION_COOKIE)
    {
        let value = build_set_cookie(
            SESSION_COOKIE,
            cookie.key.as_str(),
            cookie.max_age.num_seconds(),
            state.config().secure_cookies(),
        );
        append_cookie(&mut response, &value);
    }

    response
}

/// Extractor for the identity resolved by [`identity_middleware`].
///
/// # Example
///
/// ```rust,ignore
/// async fn whoami(CurrentIdentity(identity): CurrentIdentity) -> String {
///     identity.owner_key().to_string()
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Identity);

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(Self)
            .ok_or_else(|| AppError::Internal("identity middleware not installed".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_reads_both_cookies() {
        let creds = presented_credentials(&headers(&[(
            "cookie",
            "theme=dark; auth_token=abc.def.ghi; session_id=key123",
        )]));
        assert_eq!(creds.token.as_deref(), Some("abc.def.ghi"));
        assert_eq!(creds.session_key.as_deref(), Some("key123"));
    }

    #[test]
    fn test_reads_split_cookie_headers() {
        let creds = presented_credentials(&headers(&[
            ("cookie", "session_id=key123"),
            ("cookie", "auth_token=tok"),
        ]));
        assert_eq!(creds.token.as_deref(), Some("tok"));
        assert_eq!(creds.session_key.as_deref(), Some("key123"));
    }

    #[test]
    fn test_empty_cookie_values_are_absent() {
        let creds = presented_credentials(&headers(&[("cookie", "auth_token=; session_id=")]));
        assert_eq!(creds, PresentedCredentials::default());
    }

    #[test]
    fn test_bearer_overrides_cookie() {
        let creds = presented_credentials(&headers(&[
            ("cookie", "auth_token=from-cookie"),
            ("authorization", "Bearer from-header"),
        ]));
        assert_eq!(creds.token.as_deref(), Some("from-header"));
    }

    #[test]
    fn test_set_cookie_attributes() {
        let value = build_set_cookie(SESSION_COOKIE, "key123", 86_400, true);
        let cookie = Cookie::parse(value).unwrap();
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "key123");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(86_400)));
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        let cookie = Cookie::parse(build_clear_cookie(AUTH_COOKIE, false)).unwrap();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert_eq!(cookie.secure(), None);
    }

    #[test]
    fn test_response_sets_cookie() {
        let mut response = Response::new(Body::empty());
        assert!(!response_sets_cookie(&response, SESSION_COOKIE));
        append_cookie(&mut response, &build_clear_cookie(SESSION_COOKIE, false));
        assert!(response_sets_cookie(&response, SESSION_COOKIE));
        assert!(!response_sets_cookie(&response, AUTH_COOKIE));
    }
}
