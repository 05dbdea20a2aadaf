//! Scripted in-process doubles of the session service and dispatcher.

// Allow dead code: not every helper is used by every test binary
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use vaultgate::api::service::{LoginResponse, RefreshResponse, UserPayload};
use vaultgate::{
    ApiRequest, ApiResponse, AuthClient, AuthError, Dispatcher, IdentityHandle, MemoryStorage,
    Session, SessionService, TokenStore,
};

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn full_login_response(access: &str, refresh: &str, expires_at: i64) -> LoginResponse {
    LoginResponse {
        user: Some(UserPayload {
            id: Some("1".to_string()),
            name: Some("Demo User".to_string()),
            email: Some("demo@mail.com".to_string()),
        }),
        access_token: Some(access.to_string()),
        refresh_token: Some(refresh.to_string()),
        expires_at: Some(expires_at),
    }
}

/// What the scripted refresh endpoint does.
pub enum RefreshScript {
    /// Resolve with a grant after `delay`.
    Grant {
        access_token: String,
        refresh_token: Option<String>,
        expires_at: i64,
        delay: Duration,
    },
    /// Reject, as the service does for an invalid refresh token.
    Deny { delay: Duration },
    /// Resolve with a structurally broken payload.
    Malformed,
}

impl RefreshScript {
    pub fn grant(access_token: &str, expires_at: i64) -> Self {
        Self::Grant {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_at,
            delay: Duration::ZERO,
        }
    }

    pub fn grant_after(access_token: &str, expires_at: i64, delay: Duration) -> Self {
        Self::Grant {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_at,
            delay,
        }
    }

    pub fn deny() -> Self {
        Self::Deny {
            delay: Duration::ZERO,
        }
    }
}

impl Default for RefreshScript {
    fn default() -> Self {
        Self::deny()
    }
}

#[derive(Default)]
pub struct ScriptedService {
    pub login_result: Mutex<Option<Result<LoginResponse, AuthError>>>,
    pub refresh_script: RefreshScript,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub logout_fails: bool,
}

impl ScriptedService {
    pub fn with_login(result: Result<LoginResponse, AuthError>) -> Arc<Self> {
        Arc::new(Self {
            login_result: Mutex::new(Some(result)),
            ..Self::default()
        })
    }

    pub fn with_refresh(script: RefreshScript) -> Arc<Self> {
        Arc::new(Self {
            refresh_script: script,
            ..Self::default()
        })
    }

    pub fn refresh_call_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_call_count(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionService for ScriptedService {
    async fn login(&self, _email: &str, _password: &str) -> Result<LoginResponse, AuthError> {
        self.login_result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(AuthError::AuthenticationFailed("no scripted login".into())))
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.logout_fails {
            Err(AuthError::AuthenticationFailed(
                "logout endpoint down".into(),
            ))
        } else {
            Ok(())
        }
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshResponse, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        match &self.refresh_script {
            RefreshScript::Grant {
                access_token,
                refresh_token,
                expires_at,
                delay,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                Ok(RefreshResponse {
                    access_token: Some(access_token.clone()),
                    refresh_token: refresh_token.clone(),
                    expires_at: Some(*expires_at),
                })
            }
            RefreshScript::Deny { delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                Err(AuthError::AuthenticationFailed(
                    "refresh token rejected".into(),
                ))
            }
            RefreshScript::Malformed => Ok(RefreshResponse::default()),
        }
    }
}

/// Which bearer tokens the fake resource server accepts.
pub enum Accept {
    Any,
    Only(String),
    Nothing,
}

/// Dispatcher double that records every credential it sees.
pub struct ScriptedDispatcher {
    pub accept: Mutex<Accept>,
    pub seen_bearers: Mutex<Vec<Option<String>>>,
}

impl ScriptedDispatcher {
    fn with_accept(accept: Accept) -> Arc<Self> {
        Arc::new(Self {
            accept: Mutex::new(accept),
            seen_bearers: Mutex::new(Vec::new()),
        })
    }

    pub fn accepting(bearer: &str) -> Arc<Self> {
        Self::with_accept(Accept::Only(bearer.to_string()))
    }

    pub fn accepting_any() -> Arc<Self> {
        Self::with_accept(Accept::Any)
    }

    pub fn rejecting_all() -> Arc<Self> {
        Self::with_accept(Accept::Nothing)
    }

    pub fn bearers(&self) -> Vec<Option<String>> {
        self.seen_bearers.lock().unwrap().clone()
    }

    pub fn dispatch_count(&self) -> usize {
        self.seen_bearers.lock().unwrap().len()
    }
}

#[async_trait]
impl Dispatcher for ScriptedDispatcher {
    async fn dispatch(
        &self,
        _request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, AuthError> {
        // yield once so concurrent calls interleave like real network I/O
        tokio::task::yield_now().await;

        self.seen_bearers
            .lock()
            .unwrap()
            .push(bearer.map(str::to_string));

        let authorized = match &*self.accept.lock().unwrap() {
            Accept::Any => true,
            Accept::Only(expected) => bearer == Some(expected.as_str()),
            Accept::Nothing => false,
        };

        let status = if authorized {
            StatusCode::OK
        } else {
            StatusCode::UNAUTHORIZED
        };
        Ok(ApiResponse {
            status,
            body: String::new(),
        })
    }
}

/// A fully wired client stack over scripted collaborators.
pub struct Harness {
    pub storage: Arc<MemoryStorage>,
    pub tokens: Arc<TokenStore>,
    pub identity: IdentityHandle,
    pub session: Session,
    pub client: Arc<AuthClient>,
    pub service: Arc<ScriptedService>,
    pub dispatcher: Arc<ScriptedDispatcher>,
}

pub fn harness(service: Arc<ScriptedService>, dispatcher: Arc<ScriptedDispatcher>) -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    let tokens = Arc::new(TokenStore::new(Box::new(storage.clone())));
    let identity = IdentityHandle::new();
    let session = Session::new(service.clone(), tokens.clone(), identity.clone());
    let client = Arc::new(AuthClient::new(
        dispatcher.clone(),
        service.clone(),
        tokens.clone(),
        identity.clone(),
        30,
    ));

    Harness {
        storage,
        tokens,
        identity,
        session,
        client,
        service,
        dispatcher,
    }
}
