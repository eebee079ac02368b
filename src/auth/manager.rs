//! Access-token lifecycle with single-flight refresh
//!
//! The steady-state path is one store read and no network call. When the
//! cached token is inside the safety margin, exactly one refresh exchange runs
//! per credential; every concurrent caller awaits the same shared result,
//! because the authorization server may invalidate a refresh token after its
//! first use. The exchange runs as its own task, so the rotated credential is
//! persisted even if every waiting request is cancelled.

use super::credential::Credential;
use super::oauth::TokenExchanger;
use crate::error::{RelayError, RelayResult};
use crate::logging::{log_debug, log_info, log_warn};
use crate::store::{credential_key, KvStore, DEFAULT_ACCOUNT};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

type PendingRefresh = Shared<BoxFuture<'static, RelayResult<String>>>;

/// Owns the persisted credential of one account.
pub struct TokenManager {
    store: Arc<dyn KvStore>,
    exchanger: Arc<dyn TokenExchanger>,
    key: String,
    refresh_margin_secs: i64,
    in_flight: Mutex<Option<PendingRefresh>>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("key", &self.key)
            .field("refresh_margin_secs", &self.refresh_margin_secs)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn KvStore>,
        exchanger: Arc<dyn TokenExchanger>,
        refresh_margin: Duration,
    ) -> Self {
        Self::for_account(store, exchanger, refresh_margin, DEFAULT_ACCOUNT)
    }

    pub fn for_account(
        store: Arc<dyn KvStore>,
        exchanger: Arc<dyn TokenExchanger>,
        refresh_margin: Duration,
        account: &str,
    ) -> Self {
        Self {
            store,
            exchanger,
            key: credential_key(account),
            refresh_margin_secs: i64::try_from(refresh_margin.as_secs()).unwrap_or(i64::MAX),
            in_flight: Mutex::new(None),
        }
    }

    /// Currently persisted credential, if any.
    pub async fn credential(&self) -> RelayResult<Option<Credential>> {
        load_credential(self.store.as_ref(), &self.key).await
    }

    /// Persist a credential obtained out of band (authorization flow, seed).
    pub async fn install(&self, credential: Credential) -> RelayResult<()> {
        save_credential(self.store.as_ref(), &self.key, &credential).await?;
        log_info!(expires_at = credential.expires_at, "OAuth credential installed");
        Ok(())
    }

    /// Return an access token valid for at least the safety margin,
    /// refreshing it first when needed.
    pub async fn ensure_valid_access_token(&self) -> RelayResult<String> {
        let credential = self.credential().await?.ok_or_else(|| {
            RelayError::auth_required("No OAuth credential is stored for this gateway")
        })?;

        if credential.is_fresh(self.refresh_margin_secs) {
            return Ok(credential.access_token);
        }

        log_debug!(
            expires_at = credential.expires_at,
            margin_secs = self.refresh_margin_secs,
            "Access token stale, joining refresh"
        );
        self.refresh_single_flight().await
    }

    async fn refresh_single_flight(&self) -> RelayResult<String> {
        let pending = {
            let mut slot = self.in_flight.lock().await;
            // A settled flight left behind by cancelled waiters is not reused.
            match slot.as_ref().filter(|pending| pending.peek().is_none()) {
                Some(pending) => pending.clone(),
                None => {
                    let pending = self.spawn_refresh();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;

        let mut slot = self.in_flight.lock().await;
        if slot
            .as_ref()
            .is_some_and(|current| Shared::ptr_eq(current, &pending))
        {
            *slot = None;
        }
        result
    }

    fn spawn_refresh(&self) -> PendingRefresh {
        let task = tokio::spawn(refresh_credential(
            self.store.clone(),
            self.exchanger.clone(),
            self.key.clone(),
            self.refresh_margin_secs,
        ));
        async move {
            task.await.unwrap_or_else(|e| {
                Err(RelayError::storage(format!("Token refresh task failed: {e}")))
            })
        }
        .boxed()
        .shared()
    }
}

async fn load_credential(store: &dyn KvStore, key: &str) -> RelayResult<Option<Credential>> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| RelayError::storage(format!("Stored credential is unreadable: {e}")))
}

async fn save_credential(store: &dyn KvStore, key: &str, credential: &Credential) -> RelayResult<()> {
    let encoded = serde_json::to_string(credential)
        .map_err(|e| RelayError::storage(format!("Failed to encode credential: {e}")))?;
    store.put(key, encoded).await
}

/// The single refresh exchange shared by all waiters.
async fn refresh_credential(
    store: Arc<dyn KvStore>,
    exchanger: Arc<dyn TokenExchanger>,
    key: String,
    margin_secs: i64,
) -> RelayResult<String> {
    let current = load_credential(store.as_ref(), &key)
        .await?
        .ok_or_else(|| RelayError::auth_required("OAuth credential was removed"))?;

    // A previous flight may have finished between our check and the lock.
    if current.is_fresh(margin_secs) {
        return Ok(current.access_token);
    }

    let grant = match exchanger.refresh(&current.refresh_token).await {
        Ok(grant) => grant,
        Err(error @ RelayError::AuthRequired { .. }) => {
            log_warn!("Refresh token rejected, removing stored credential");
            store.delete(&key).await?;
            return Err(error);
        }
        Err(error) => return Err(error),
    };

    let refreshed = Credential {
        refresh_token: grant
            .refresh_token
            .unwrap_or_else(|| current.refresh_token.clone()),
        access_token: grant.access_token,
        expires_at: chrono::Utc::now().timestamp() + grant.expires_in,
    };
    save_credential(store.as_ref(), &key, &refreshed).await?;

    log_info!(
        expires_at = refreshed.expires_at,
        rotated = refreshed.refresh_token != current.refresh_token,
        "OAuth access token refreshed"
    );
    Ok(refreshed.access_token)
}
