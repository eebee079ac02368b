//! Persisted OAuth credential record

use serde::{Deserialize, Serialize};

/// The access/refresh/expiry triple of one subscription account.
///
/// Stored as `{"type":"oauth","refresh":..,"access":..,"expire":..}` with
/// `expire` in epoch seconds.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "oauth")]
pub struct Credential {
    #[serde(rename = "refresh")]
    pub refresh_token: String,
    #[serde(rename = "access")]
    pub access_token: String,
    #[serde(rename = "expire")]
    pub expires_at: i64,
}

impl Credential {
    pub fn new(
        refresh_token: impl Into<String>,
        access_token: impl Into<String>,
        expires_at: i64,
    ) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// A credential holding only a refresh token; the first use refreshes it.
    pub fn from_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self::new(refresh_token, String::new(), 0)
    }

    /// Whether the access token stays valid for at least `margin_secs` more.
    pub fn is_fresh_at(&self, now: i64, margin_secs: i64) -> bool {
        !self.access_token.is_empty() && now.saturating_add(margin_secs) < self.expires_at
    }

    pub fn is_fresh(&self, margin_secs: i64) -> bool {
        self.is_fresh_at(chrono::Utc::now().timestamp(), margin_secs)
    }
}

// Tokens must never reach logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("refresh_token", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_store_encoding() {
        let credential = Credential::new("rt", "at", 1_700_000_000);

        let encoded = serde_json::to_value(&credential).unwrap();

        assert_eq!(
            encoded,
            json!({"type": "oauth", "refresh": "rt", "access": "at", "expire": 1_700_000_000})
        );
        assert_eq!(serde_json::from_value::<Credential>(encoded).unwrap(), credential);
    }

    #[test]
    fn test_freshness_respects_margin() {
        let credential = Credential::new("rt", "at", 1_000);

        assert!(credential.is_fresh_at(900, 60));
        assert!(!credential.is_fresh_at(940, 60), "Inside the margin counts as stale");
        assert!(!credential.is_fresh_at(1_000, 0), "now == expiresAt is expired");
    }

    #[test]
    fn test_refresh_only_credential_is_stale() {
        assert!(!Credential::from_refresh_token("rt").is_fresh(60));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", Credential::new("secret-rt", "secret-at", 5));

        assert!(!rendered.contains("secret"));
    }
}
