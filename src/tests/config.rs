// Unit Tests for Relay Configuration Loading
//
// UNIT UNDER TEST: RelayConfig::from_env
//
// BUSINESS RESPONSIBILITY:
//   - Reads operator policy from the process environment once at startup
//   - Leaves protocol behavior untouched when variables are unset
//   - Rejects malformed values instead of silently ignoring them
//
// TEST COVERAGE:
//   - Operator policies flowing into the repair policy and upstream config
//   - Invalid integers and unknown framing names
//   - Seed refresh token pickup

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::repair::IdentityFraming;

const RELAY_VARS: &[&str] = &[
    "PORT",
    "UPSTREAM_BASE_URL",
    "UPSTREAM_TIMEOUT_SECS",
    "FORCE_THINKING_BUDGET",
    "FORCE_MAX_TOKENS",
    "INTERLEAVED_THINKING",
    "IDENTITY_FRAMING",
    "FALLBACK_BUDGET_PADDING",
    "FALLBACK_BUDGET_MULTIPLIER",
    "HEAL_FROM_CACHE",
    "CONVERSATION_CACHE_TTL_SECS",
    "DEBUG_REQUEST_LOG",
    "DEBUG_REQUEST_LOG_PATH",
    "RELAY_STORE_PATH",
    "OAUTH_TOKEN_URL",
    "OAUTH_CLIENT_ID",
    "TOKEN_REFRESH_MARGIN_SECS",
    "CLAUDE_REFRESH_TOKEN",
];

fn clear_relay_env() {
    for var in RELAY_VARS {
        std::env::remove_var(var);
    }
}

#[cfg(test)]
mod from_env_tests {
    use super::*;
    use std::time::Duration;

    #[test]
    #[serial_test::serial]
    fn test_unset_environment_changes_nothing() {
        // Test verifies a bare environment yields the pass-through defaults

        // Arrange
        clear_relay_env();

        // Act
        let config = RelayConfig::from_env().unwrap();

        // Assert
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.repair.forced_thinking_budget, None);
        assert_eq!(config.repair.forced_max_tokens, None);
        assert!(!config.upstream.interleaved_thinking);
    }

    #[test]
    #[serial_test::serial]
    fn test_operator_policy_is_applied() {
        // Test verifies each operator variable reaches the component that uses it

        // Arrange
        clear_relay_env();
        std::env::set_var("PORT", "9000");
        std::env::set_var("FORCE_THINKING_BUDGET", "16000");
        std::env::set_var("FORCE_MAX_TOKENS", "32000");
        std::env::set_var("INTERLEAVED_THINKING", "yes");
        std::env::set_var("IDENTITY_FRAMING", "preserve");
        std::env::set_var("TOKEN_REFRESH_MARGIN_SECS", "120");
        std::env::set_var("CLAUDE_REFRESH_TOKEN", "sk-ant-ort01-seed");

        // Act
        let config = RelayConfig::from_env().unwrap();

        // Assert
        assert_eq!(config.port, 9000);
        assert_eq!(config.repair.forced_thinking_budget, Some(16000));
        assert_eq!(config.repair.forced_max_tokens, Some(32000));
        assert!(config.upstream.interleaved_thinking);
        assert_eq!(config.repair.identity_framing, IdentityFraming::Preserve);
        assert_eq!(config.oauth.refresh_margin, Duration::from_secs(120));
        assert_eq!(config.seed_refresh_token.as_deref(), Some("sk-ant-ort01-seed"));

        // Cleanup
        clear_relay_env();
    }

    #[test]
    #[serial_test::serial]
    fn test_invalid_port_is_rejected() {
        // Test verifies a typo in a numeric variable stops startup

        // Arrange
        clear_relay_env();
        std::env::set_var("PORT", "eighty");

        // Act
        let result = RelayConfig::from_env();

        // Assert
        match result {
            Err(RelayError::Configuration { message }) => {
                assert!(message.contains("PORT"), "Error should name the variable: {message}");
            }
            other => panic!("Expected Configuration error, got {other:?}"),
        }

        // Cleanup
        clear_relay_env();
    }

    #[test]
    #[serial_test::serial]
    fn test_unknown_identity_framing_is_rejected() {
        // Arrange
        clear_relay_env();
        std::env::set_var("IDENTITY_FRAMING", "impersonate");

        // Act
        let result = RelayConfig::from_env();

        // Assert
        assert!(matches!(result, Err(RelayError::Configuration { .. })));

        // Cleanup
        clear_relay_env();
    }
}
