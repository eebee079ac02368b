// Unit Tests for Relay Error Handling
//
// UNIT UNDER TEST: RelayError
//
// BUSINESS RESPONSIBILITY:
//   - Categorizes failures so the gateway knows what to retry and what to surface
//   - Maps each failure to the HTTP status the caller receives
//   - Keeps upstream diagnostics verbatim while giving remediation for auth failures
//
// TEST COVERAGE:
//   - Retry decisions for refresh failures (transport, 429, 5xx vs rejections)
//   - Status mapping for every variant
//   - User messages for auth and upstream failures

use crate::error::{ErrorCategory, ErrorSeverity, RelayError};

#[cfg(test)]
mod retry_classification_tests {
    use super::*;

    #[test]
    fn test_transport_failures_are_retryable() {
        // Test verifies a refresh that never reached the server is retried

        // Arrange & Act
        let error = RelayError::upstream_transport("connection reset");

        // Assert
        assert!(error.is_retryable(), "Transport failures should be retried");
        assert_eq!(error.category(), ErrorCategory::External);
    }

    #[test]
    fn test_rate_limit_and_server_errors_are_retryable() {
        // Test verifies 429 and 5xx answers are treated as transient

        for status in [429, 500, 503, 529] {
            // Act
            let error = RelayError::upstream_status(status, "{}");

            // Assert
            assert!(error.is_retryable(), "Status {status} should be retryable");
        }
    }

    #[test]
    fn test_rejections_are_not_retryable() {
        // Test verifies client-side failures are never retried
        // A rejected refresh token must not be replayed against the server

        // Arrange
        let errors = [
            RelayError::auth_required("invalid_grant"),
            RelayError::upstream_status(404, "{}"),
            RelayError::malformed_request("'model' must be a string"),
            RelayError::stream_aborted("peer reset"),
        ];

        // Act & Assert
        for error in errors {
            assert!(!error.is_retryable(), "{error} should not be retryable");
        }
    }
}

#[cfg(test)]
mod status_mapping_tests {
    use super::*;

    #[test]
    fn test_each_variant_maps_to_documented_status() {
        // Test verifies the status table the gateway relies on

        // Arrange
        let cases = [
            (RelayError::auth_required("none"), 401),
            (RelayError::upstream_status(429, "slow down"), 429),
            (RelayError::upstream_transport("timeout"), 502),
            (RelayError::malformed_request("bad"), 400),
            (RelayError::stream_aborted("reset"), 502),
            (RelayError::storage("disk full"), 500),
            (RelayError::configuration("bad url"), 500),
        ];

        // Act & Assert
        for (error, expected) in cases {
            assert_eq!(error.status_code(), expected, "Unexpected status for {error}");
        }
    }

    #[test]
    fn test_storage_failures_are_critical() {
        // Test verifies a broken credential store pages an operator

        let error = RelayError::storage("database is locked");

        assert_eq!(error.category(), ErrorCategory::Internal);
        assert_eq!(error.severity(), ErrorSeverity::Critical);
    }
}

#[cfg(test)]
mod user_message_tests {
    use super::*;

    #[test]
    fn test_upstream_body_is_passed_through() {
        // Test verifies callers receive the upstream's own diagnostic

        // Arrange
        let body = r#"{"type":"error","error":{"type":"invalid_request_error","message":"max_tokens: too large"}}"#;

        // Act
        let error = RelayError::upstream_status(400, body);

        // Assert
        assert_eq!(error.user_message(), body);
    }

    #[test]
    fn test_auth_required_explains_remediation() {
        // Test verifies the 401 tells the operator how to recover

        let error = RelayError::auth_required("Refresh token rejected");

        let message = error.user_message();

        assert!(message.starts_with("Refresh token rejected"));
        assert!(
            message.contains("authorization flow"),
            "Message should point at re-authorization: {message}"
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        // Test verifies storage paths and config values do not leak to callers

        let error = RelayError::storage("/var/lib/relay/relay.db: permission denied");

        assert!(!error.user_message().contains("/var/lib"));
    }
}
