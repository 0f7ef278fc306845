//! Authentication route handlers.
//!
//! Login issues a signed token in the `auth_token` cookie and folds any guest
//! cart into the account. Registration creates the account and queues a
//! notification. Logout only drops the token cookie.

use axum::{
    Form, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use corner_shop_core::{Email, UserId};

use crate::error::{AppError, Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::middleware::{
    AUTH_COOKIE, CurrentIdentity, SESSION_COOKIE, append_cookie, build_clear_cookie,
    build_set_cookie,
};
use crate::services::RegistrationNotice;
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub email: Email,
    /// Whether guest cart lines were moved into the account cart.
    pub cart_merged: bool,
    /// Set when the guest cart could not be merged. The login still succeeded.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cart_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: UserId,
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle login form submission.
#[instrument(skip(state, prior, form))]
pub async fn login(
    State(state): State<AppState>,
    CurrentIdentity(prior): CurrentIdentity,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    if form.email.trim().is_empty() || form.password.is_empty() {
        return Err(AppError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    let config = state.config();
    let outcome = state
        .login()
        .login(
            &prior,
            &form.email,
            &form.password,
            config.app_id,
            state.deadline(),
        )
        .await?;

    let claims = outcome.token.claims();
    set_sentry_user(&claims.user_id, None);
    add_breadcrumb("auth", "Logged in", None);
    tracing::info!(user_id = %claims.user_id, cart_merged = outcome.cart_merged(), "User logged in");

    let body = LoginResponse {
        user_id: claims.user_id,
        email: claims.email.clone(),
        cart_merged: outcome.cart_merged(),
        cart_error: outcome
            .merge
            .as_ref()
            .err()
            .map(|_| "Your guest cart could not be merged".to_string()),
    };

    let secure = config.secure_cookies();
    let mut response = Json(body).into_response();
    append_cookie(
        &mut response,
        &build_set_cookie(
            AUTH_COOKIE,
            outcome.token.as_str(),
            config.token_ttl.num_seconds(),
            secure,
        ),
    );
    if outcome.clear_session_cookie {
        append_cookie(&mut response, &build_clear_cookie(SESSION_COOKIE, secure));
    }

    Ok(response)
}

/// Handle registration form submission.
#[instrument(skip(state, form))]
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    if form.password != form.password_confirm {
        return Err(AppError::BadRequest("Passwords do not match".to_string()));
    }

    let user_id = state
        .auth()
        .register_account(&form.email, &form.password, state.deadline())
        .await?;

    // Registration already validated the address.
    if let Ok(email) = Email::parse(&form.email) {
        state.notifier().notify(RegistrationNotice {
            user_id,
            email,
            registered_at: state.clock().now(),
        });
    }
    add_breadcrumb("auth", "Registered", None);

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id })).into_response())
}

/// Handle logout.
#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>) -> Response {
    clear_sentry_user();
    let mut response = StatusCode::NO_CONTENT.into_response();
    append_cookie(
        &mut response,
        &build_clear_cookie(AUTH_COOKIE, state.config().secure_cookies()),
    );
    response
}
