//! The in-memory token bundle, mirrored to durable storage.

use std::sync::RwLock;

use chrono::Utc;
use tracing::{debug, warn};

use crate::auth::storage::TokenStorage;

/// Storage keys for the persisted bundle fields
const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";
const EXPIRES_AT_KEY: &str = "expires_at";

#[derive(Debug, Default)]
struct Bundle {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
}

/// Process-wide holder of the access/refresh token pair and its expiry.
///
/// In-memory state is authoritative for the process lifetime; durable storage
/// is best-effort. Construct one per process and share it behind an `Arc` -
/// there is no hidden global.
pub struct TokenStore {
    bundle: RwLock<Bundle>,
    storage: Box<dyn TokenStorage>,
}

impl TokenStore {
    pub fn new(storage: Box<dyn TokenStorage>) -> Self {
        Self {
            bundle: RwLock::new(Bundle::default()),
            storage,
        }
    }

    /// Populate in-memory state from durable storage.
    ///
    /// Called once at startup. Missing or malformed stored values load as
    /// absent.
    pub fn load_from_storage(&self) {
        let access_token = self.storage.get(ACCESS_TOKEN_KEY);
        let refresh_token = self.storage.get(REFRESH_TOKEN_KEY);
        let expires_at = self
            .storage
            .get(EXPIRES_AT_KEY)
            .and_then(|raw| raw.parse::<i64>().ok());

        if let Ok(mut bundle) = self.bundle.write() {
            bundle.access_token = access_token;
            bundle.refresh_token = refresh_token;
            bundle.expires_at = expires_at;
        }
    }

    /// Overwrite the bundle and best-effort persist it.
    ///
    /// The access token and expiry always change together here; the refresh
    /// token is whatever the caller resolved it to.
    pub fn set_tokens(&self, access_token: &str, refresh_token: &str, expires_at: i64) {
        if let Ok(mut bundle) = self.bundle.write() {
            bundle.access_token = Some(access_token.to_string());
            bundle.refresh_token = Some(refresh_token.to_string());
            bundle.expires_at = Some(expires_at);
        }

        self.persist(ACCESS_TOKEN_KEY, access_token);
        self.persist(REFRESH_TOKEN_KEY, refresh_token);
        self.persist(EXPIRES_AT_KEY, &expires_at.to_string());
        debug!(expires_at, "stored new token bundle");
    }

    /// Wipe in-memory and durable state. Idempotent.
    pub fn clear_tokens(&self) {
        if let Ok(mut bundle) = self.bundle.write() {
            *bundle = Bundle::default();
        }

        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, EXPIRES_AT_KEY] {
            if let Err(err) = self.storage.remove(key) {
                warn!(key, error = %err, "failed to remove persisted token field");
            }
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.bundle.read().ok()?.access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.bundle.read().ok()?.refresh_token.clone()
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.bundle.read().ok().and_then(|bundle| bundle.expires_at)
    }

    /// Whether the access token is within `threshold_secs` of expiry.
    ///
    /// An unset expiry is not known to be expiring, so it reports false.
    pub fn is_near_expiry(&self, threshold_secs: i64) -> bool {
        near_expiry(self.expires_at(), Utc::now().timestamp(), threshold_secs)
    }

    fn persist(&self, key: &str, value: &str) {
        if let Err(err) = self.storage.set(key, value) {
            warn!(key, error = %err, "failed to persist token field");
        }
    }
}

fn near_expiry(expires_at: Option<i64>, now: i64, threshold_secs: i64) -> bool {
    match expires_at {
        Some(expires_at) => expires_at - now <= threshold_secs,
        None => false,
    }
}
