//! Relay configuration
//!
//! All settings come from environment variables and are read once, at
//! startup, by [`RelayConfig::from_env`]. Unset variables fall back to
//! defaults that leave the protocol untouched.

use crate::auth::oauth::{DEFAULT_CLIENT_ID, DEFAULT_TOKEN_URL};
use crate::error::{RelayError, RelayResult};
use crate::internals::retry::RetryPolicy;
use crate::logging::log_debug;
use crate::repair::{IdentityFraming, RepairPolicy};

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 60;
pub const DEFAULT_STORE_PATH: &str = "relay.db";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_DEBUG_LOG_PATH: &str = "relay-requests.jsonl";

/// Messages API connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Whole-call timeout for proxied requests, streaming included.
    pub timeout: Duration,
    /// Adds the interleaved-thinking beta flag to every call.
    pub interleaved_thinking: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            interleaved_thinking: false,
        }
    }
}

/// OAuth refresh settings
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthConfig {
    pub token_url: String,
    pub client_id: String,
    /// Tokens expiring within this margin are refreshed before use.
    pub refresh_margin: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            refresh_margin: Duration::from_secs(DEFAULT_REFRESH_MARGIN_SECS),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Top-level configuration of the relay process
#[derive(Clone, PartialEq)]
pub struct RelayConfig {
    pub port: u16,
    pub upstream: UpstreamConfig,
    pub oauth: OAuthConfig,
    pub repair: RepairPolicy,
    /// Restore authentic thinking blocks from the conversation cache.
    pub heal_from_cache: bool,
    /// Age after which cached thinking blocks are dropped.
    pub cache_ttl: Duration,
    /// Append repaired requests as JSON lines to this file.
    pub debug_log: Option<PathBuf>,
    pub store_path: PathBuf,
    /// Seeds the credential store when it holds no credential.
    pub seed_refresh_token: Option<String>,
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("port", &self.port)
            .field("upstream", &self.upstream)
            .field("oauth", &self.oauth)
            .field("repair", &self.repair)
            .field("heal_from_cache", &self.heal_from_cache)
            .field("cache_ttl", &self.cache_ttl)
            .field("debug_log", &self.debug_log)
            .field("store_path", &self.store_path)
            .field("seed_refresh_token", &self.seed_refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            upstream: UpstreamConfig::default(),
            oauth: OAuthConfig::default(),
            repair: RepairPolicy::default(),
            heal_from_cache: true,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            debug_log: None,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            seed_refresh_token: None,
        }
    }
}

impl RelayConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Configuration`] if a numeric variable does not
    /// parse, `IDENTITY_FRAMING` is unknown, or the result fails
    /// [`RelayConfig::validate`].
    pub fn from_env() -> RelayResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> RelayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };
        let defaults = Self::default();

        let upstream = UpstreamConfig {
            base_url: vars
                .string("UPSTREAM_BASE_URL")
                .unwrap_or(defaults.upstream.base_url),
            timeout: Duration::from_secs(
                vars.parse("UPSTREAM_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            ),
            interleaved_thinking: vars.flag("INTERLEAVED_THINKING").unwrap_or(false),
        };

        let oauth = OAuthConfig {
            token_url: vars.string("OAUTH_TOKEN_URL").unwrap_or(defaults.oauth.token_url),
            client_id: vars.string("OAUTH_CLIENT_ID").unwrap_or(defaults.oauth.client_id),
            refresh_margin: Duration::from_secs(
                vars.parse("TOKEN_REFRESH_MARGIN_SECS")?
                    .unwrap_or(DEFAULT_REFRESH_MARGIN_SECS),
            ),
            retry_policy: RetryPolicy::default(),
        };

        let identity_framing = match vars.string("IDENTITY_FRAMING") {
            Some(raw) => IdentityFraming::from_str(&raw).map_err(RelayError::configuration)?,
            None => IdentityFraming::default(),
        };
        let repair = RepairPolicy {
            identity_framing,
            // Zero means "off", same as unset
            forced_thinking_budget: vars.parse("FORCE_THINKING_BUDGET")?.filter(|&v: &u32| v > 0),
            forced_max_tokens: vars.parse("FORCE_MAX_TOKENS")?.filter(|&v: &u32| v > 0),
            fallback_padding: vars
                .parse("FALLBACK_BUDGET_PADDING")?
                .unwrap_or(defaults.repair.fallback_padding),
            fallback_multiplier: vars
                .parse("FALLBACK_BUDGET_MULTIPLIER")?
                .unwrap_or(defaults.repair.fallback_multiplier),
        };

        let debug_log = if vars.flag("DEBUG_REQUEST_LOG").unwrap_or(false) {
            Some(PathBuf::from(
                vars.string("DEBUG_REQUEST_LOG_PATH")
                    .unwrap_or_else(|| DEFAULT_DEBUG_LOG_PATH.to_string()),
            ))
        } else {
            None
        };

        let config = Self {
            port: vars.parse("PORT")?.unwrap_or(DEFAULT_PORT),
            upstream,
            oauth,
            repair,
            heal_from_cache: vars.flag("HEAL_FROM_CACHE").unwrap_or(true),
            cache_ttl: Duration::from_secs(
                vars.parse("CONVERSATION_CACHE_TTL_SECS")?
                    .unwrap_or(DEFAULT_CACHE_TTL_SECS),
            ),
            debug_log,
            store_path: vars
                .string("RELAY_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
            seed_refresh_token: vars.string("CLAUDE_REFRESH_TOKEN"),
        };

        config.validate()?;

        log_debug!(
            port = config.port,
            upstream = %config.upstream.base_url,
            identity_framing = ?config.repair.identity_framing,
            forced_thinking_budget = ?config.repair.forced_thinking_budget,
            forced_max_tokens = ?config.repair.forced_max_tokens,
            heal_from_cache = config.heal_from_cache,
            debug_log = ?config.debug_log,
            "Relay configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Configuration`] if:
    /// - An endpoint URL is empty or not http(s)
    /// - The upstream timeout is zero
    /// - The fallback multiplier is zero
    pub fn validate(&self) -> RelayResult<()> {
        for (name, url) in [
            ("UPSTREAM_BASE_URL", &self.upstream.base_url),
            ("OAUTH_TOKEN_URL", &self.oauth.token_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(RelayError::configuration(format!(
                    "{name} must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if self.oauth.client_id.trim().is_empty() {
            return Err(RelayError::configuration("OAUTH_CLIENT_ID must not be empty"));
        }
        if self.upstream.timeout.is_zero() {
            return Err(RelayError::configuration("UPSTREAM_TIMEOUT_SECS must be positive"));
        }
        if self.repair.fallback_multiplier == 0 {
            return Err(RelayError::configuration(
                "FALLBACK_BUDGET_MULTIPLIER must be positive",
            ));
        }
        Ok(())
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value; blank counts as unset.
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str) -> RelayResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| {
                    RelayError::configuration(format!("{key}='{raw}' is invalid: {e}"))
                })
            })
            .transpose()
    }

    /// `1|true|yes|on` is true; any other set value is false.
    fn flag(&self, key: &str) -> Option<bool> {
        self.string(key).map(|raw| {
            matches!(
                raw.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }
}
