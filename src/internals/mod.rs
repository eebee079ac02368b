//! Internal utilities for claude-relay
//!
//! This module contains implementation details that are not part of the public API.
//! `RetryPolicy` is re-exported through `lib.rs` because it is part of the OAuth configuration.

pub mod retry;
