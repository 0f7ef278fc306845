//! Applications and their token signing secrets.

use core::fmt;

use secrecy::{ExposeSecret, SecretBox};

use corner_shop_core::AppId;

/// Signing key for tokens issued to one application.
///
/// The secret bytes are only reachable through [`ApplicationSecret::secret`];
/// `Debug` never prints them.
pub struct ApplicationSecret {
    pub app_id: AppId,
    pub name: String,
    secret: SecretBox<[u8]>,
}

impl ApplicationSecret {
    #[must_use]
    pub fn new(app_id: AppId, name: impl Into<String>, secret: Vec<u8>) -> Self {
        Self {
            app_id,
            name: name.into(),
            secret: SecretBox::new(secret.into_boxed_slice()),
        }
    }

    /// Raw key material for HMAC signing and verification.
    #[must_use]
    pub fn secret(&self) -> &[u8] {
        self.secret.expose_secret()
    }
}

impl fmt::Debug for ApplicationSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationSecret")
            .field("app_id", &self.app_id)
            .field("name", &self.name)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let app = ApplicationSecret::new(AppId::new(1), "web", b"hunter2-hunter2".to_vec());
        let debug = format!("{app:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
        assert_eq!(app.secret(), b"hunter2-hunter2");
    }
}
