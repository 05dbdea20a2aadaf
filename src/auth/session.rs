//! Login, logout and the authenticated identity.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::service::SessionService;
use crate::auth::error::AuthError;
use crate::auth::tokens::TokenStore;

/// The authenticated user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Shared handle to the current identity.
///
/// Cheap to clone. The session sets and clears it; the request pipeline
/// clears it when a renewal fails terminally.
#[derive(Clone, Default)]
pub struct IdentityHandle {
    inner: Arc<RwLock<Option<User>>>,
}

impl IdentityHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<User> {
        self.inner.read().ok()?.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    pub(crate) fn set(&self, user: User) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = Some(user);
        }
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = None;
        }
    }
}

/// Authenticated session state: login, logout and the current user.
///
/// The only transitions are anonymous to authenticated via a successful
/// `login`, and back via `logout` or a terminal renewal failure in the
/// request pipeline.
pub struct Session {
    service: Arc<dyn SessionService>,
    tokens: Arc<TokenStore>,
    identity: IdentityHandle,
}

impl Session {
    pub fn new(
        service: Arc<dyn SessionService>,
        tokens: Arc<TokenStore>,
        identity: IdentityHandle,
    ) -> Self {
        Self {
            service,
            tokens,
            identity,
        }
    }

    /// Handle to the identity slot, for sharing with the request pipeline.
    pub fn identity(&self) -> IdentityHandle {
        self.identity.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.identity.current()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_authenticated()
    }

    /// Log in against the session service.
    ///
    /// Tokens are stored and the identity is set only after the response has
    /// been validated; no state changes on any failure path.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let response = self.service.login(email, password).await?;
        let grant = response.into_grant()?;

        self.tokens
            .set_tokens(&grant.access_token, &grant.refresh_token, grant.expires_at);
        self.identity.set(grant.user.clone());
        info!(user = %grant.user.id, "logged in");
        Ok(grant.user)
    }

    /// Log out: best-effort remote revocation, unconditional local teardown.
    ///
    /// A service failure never blocks the local teardown; the remote error is
    /// swallowed once cleanup has completed.
    pub async fn logout(&self) {
        let result = self.service.logout().await;

        self.tokens.clear_tokens();
        self.identity.clear();

        if let Err(err) = result {
            warn!(error = %err, "remote logout failed; local session cleared");
        }
    }
}
