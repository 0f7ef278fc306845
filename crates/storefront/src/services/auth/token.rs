//! Signed account tokens.
//!
//! Tokens are compact JWS strings signed with HMAC-SHA256:
//!
//! ```text
//! base64url({"alg":"HS256","typ":"JWT"}) . base64url(claims) . base64url(mac)
//! ```
//!
//! with claims `{"uid", "email", "app_id", "iat", "exp"}` (unix seconds). The
//! MAC key is the secret of the application named by `app_id`.
//!
//! Validation always runs in the same order: structural parse, secret lookup,
//! MAC check, expiry check. A forged token is therefore reported as
//! `SignatureMismatch` even when it is also expired.

use core::fmt;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use moka::future::Cache;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::instrument;

use corner_shop_core::{AppId, Clock, Email, UserId};

use crate::models::ApplicationSecret;
use crate::store::{AccountStore, Deadline, StoreError};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";

/// How long a resolved application secret stays cached.
const SECRET_CACHE_TTL: StdDuration = StdDuration::from_secs(300);
const SECRET_CACHE_CAPACITY: u64 = 64;

/// Reasons a presented token is rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    SignatureMismatch,
    #[error("token has expired")]
    Expired,
    #[error("token names an unknown application")]
    UnknownApp,
}

/// Reasons minting fails.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MintError {
    #[error("application secret is empty")]
    InvalidSecret,
}

/// Who a token is issued to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimsInput {
    pub user_id: UserId,
    pub email: Email,
    pub app_id: AppId,
}

/// Claims of a token whose signature and expiry have been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub user_id: UserId,
    pub email: Email,
    pub app_id: AppId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A freshly minted token.
#[derive(Clone)]
pub struct Token {
    encoded: String,
    claims: VerifiedClaims,
}

impl Token {
    /// The compact wire form, as sent in the `auth_token` cookie.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    #[must_use]
    pub const fn claims(&self) -> &VerifiedClaims {
        &self.claims
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("encoded", &"[REDACTED]")
            .field("claims", &self.claims)
            .finish()
    }
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

#[derive(Deserialize)]
struct WireClaims {
    uid: UserId,
    email: Email,
    app_id: AppId,
    iat: i64,
    exp: i64,
}

/// Mint a token for `input`, valid from `now` for `ttl`.
///
/// # Errors
///
/// Returns `MintError::InvalidSecret` if `secret` is empty.
pub fn mint(
    input: &ClaimsInput,
    secret: &[u8],
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<Token, MintError> {
    if secret.is_empty() {
        return Err(MintError::InvalidSecret);
    }

    let iat = now.timestamp();
    let exp = iat.saturating_add(ttl.num_seconds());

    let header = serde_json::json!({ "alg": ALGORITHM, "typ": TOKEN_TYPE });
    let claims = serde_json::json!({
        "uid": input.user_id,
        "email": input.email.as_str(),
        "app_id": input.app_id,
        "iat": iat,
        "exp": exp,
    });

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    );
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| MintError::InvalidSecret)?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(Token {
        encoded: format!("{signing_input}.{signature}"),
        claims: VerifiedClaims {
            user_id: input.user_id,
            email: input.email.clone(),
            app_id: input.app_id,
            issued_at: DateTime::from_timestamp(iat, 0).unwrap_or(now),
            expires_at: DateTime::from_timestamp(exp, 0).unwrap_or(DateTime::<Utc>::MAX_UTC),
        },
    })
}

/// A structurally valid token that has not been verified yet.
pub struct UnverifiedToken {
    signing_input: String,
    signature: Vec<u8>,
    claims: VerifiedClaims,
}

impl UnverifiedToken {
    /// Split and decode a compact token.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Malformed` for anything that is not three
    /// base64url segments with an `HS256` header and well-formed claims.
    pub fn parse(token: &str) -> Result<Self, TokenError> {
        let mut parts = token.split('.');
        let (Some(header), Some(claims), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let parsed_header: Header = decode_json(header)?;
        if parsed_header.alg != ALGORITHM {
            return Err(TokenError::Malformed);
        }

        let wire: WireClaims = decode_json(claims)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        Ok(Self {
            signing_input: format!("{header}.{claims}"),
            signature,
            claims: VerifiedClaims {
                user_id: wire.uid,
                email: wire.email,
                app_id: wire.app_id,
                issued_at: DateTime::from_timestamp(wire.iat, 0).ok_or(TokenError::Malformed)?,
                expires_at: DateTime::from_timestamp(wire.exp, 0).ok_or(TokenError::Malformed)?,
            },
        })
    }

    /// The application whose secret must verify this token.
    #[must_use]
    pub const fn app_id(&self) -> AppId {
        self.claims.app_id
    }

    /// Check the MAC under `secret`, then the expiry against `now`.
    ///
    /// # Errors
    ///
    /// Returns `SignatureMismatch` if the MAC does not verify, otherwise
    /// `Expired` if `now >= exp`.
    pub fn verify(self, secret: &[u8], now: DateTime<Utc>) -> Result<VerifiedClaims, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::SignatureMismatch);
        }
        let mut mac =
            HmacSha256::new_from_slice(secret).map_err(|_| TokenError::SignatureMismatch)?;
        mac.update(self.signing_input.as_bytes());
        mac.verify_slice(&self.signature)
            .map_err(|_| TokenError::SignatureMismatch)?;

        if now >= self.claims.expires_at {
            return Err(TokenError::Expired);
        }
        Ok(self.claims)
    }
}

fn decode_json<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

/// Mints and validates tokens against the application secrets in the
/// account store.
///
/// Secrets are read-only once an application is registered, so successful
/// lookups are cached for a few minutes. Unknown applications are not cached.
pub struct TokenService {
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    secrets: Cache<AppId, Arc<ApplicationSecret>>,
}

impl TokenService {
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            accounts,
            clock,
            ttl,
            secrets: Cache::builder()
                .max_capacity(SECRET_CACHE_CAPACITY)
                .time_to_live(SECRET_CACHE_TTL)
                .build(),
        }
    }

    /// Look up the signing secret for `app_id`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the account store fails or the deadline passes.
    pub async fn secret_for(
        &self,
        app_id: AppId,
        deadline: Deadline,
    ) -> Result<Option<Arc<ApplicationSecret>>, StoreError> {
        if let Some(secret) = self.secrets.get(&app_id).await {
            return Ok(Some(secret));
        }

        let found = deadline
            .bounded("lookup_app_secret", self.accounts.lookup_app_secret(app_id))
            .await?;

        match found {
            Some(secret) => {
                let secret = Arc::new(secret);
                self.secrets.insert(app_id, Arc::clone(&secret)).await;
                Ok(Some(secret))
            }
            None => Ok(None),
        }
    }

    /// Mint a token under `secret` using the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns `MintError::InvalidSecret` if the secret is empty.
    pub fn issue(&self, input: &ClaimsInput, secret: &ApplicationSecret) -> Result<Token, MintError> {
        mint(input, secret.secret(), self.ttl, self.clock.now())
    }

    /// Validate a presented token.
    ///
    /// A store failure during the secret lookup is logged and reported as
    /// `UnknownApp`; callers treat every validation failure as "no token".
    ///
    /// # Errors
    ///
    /// Returns the first failing check as a `TokenError`.
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str, deadline: Deadline) -> Result<VerifiedClaims, TokenError> {
        let unverified = UnverifiedToken::parse(token)?;
        let app_id = unverified.app_id();

        let secret = match self.secret_for(app_id, deadline).await {
            Ok(Some(secret)) => secret,
            Ok(None) => return Err(TokenError::UnknownApp),
            Err(e) => {
                tracing::warn!(app_id = %app_id, error = %e, "Application secret lookup failed");
                return Err(TokenError::UnknownApp);
            }
        };

        unverified.verify(secret.secret(), self.clock.now())
    }
}
