// Test modules for claude-relay crate
//
// Each module covers one unit's business behavior across module boundaries;
// narrow unit tests live next to the code in #[cfg(test)] modules.

pub mod config;
pub mod error;

// NOTE: HTTP-level tests (wiremock upstream, full router) live in tests/
