//! Subscription OAuth credential handling
//!
//! - `credential` - persisted access/refresh/expiry record
//! - `oauth` - refresh-token exchange with the authorization server
//! - `manager` - `TokenManager`, the single-flight token lifecycle

pub mod credential;
pub mod manager;
pub mod oauth;

pub use credential::Credential;
pub use manager::TokenManager;
pub use oauth::{OAuthClient, TokenExchanger, TokenGrant};
