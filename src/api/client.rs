//! Authenticated request dispatch with silent token renewal.
//!
//! Every application call passes through [`AuthClient`], which attaches the
//! current access token, renews it when it is close to expiry, and retries a
//! call exactly once after an unauthorized response.
//!
//! Concurrent renewal attempts collapse into a single in-flight refresh
//! call: callers that arrive while one is running queue behind it and all
//! observe its outcome.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::api::service::SessionService;
use crate::auth::error::AuthError;
use crate::auth::session::IdentityHandle;
use crate::auth::tokens::TokenStore;
use crate::config::Config;

/// An outbound application call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// A dispatched call's response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AuthError> {
        serde_json::from_str(&self.body)
            .map_err(|err| AuthError::MalformedResponse(err.to_string()))
    }

    fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }
}

/// Transport seam for application calls.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Send the call, attaching `bearer` as the Authorization credential when
    /// present. Non-success statuses are data, not errors; only transport
    /// failures reject.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, AuthError>;
}

/// HTTP dispatcher.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpDispatcher {
    client: Client,
    base_url: String,
}

impl HttpDispatcher {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, AuthError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.clone(), &url);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok(ApiResponse { status, body })
    }
}

/// Renewal coordination state.
///
/// `Refreshing` exists for exactly the lifetime of one in-flight refresh
/// call; its waiter queue is drained atomically when that call resolves.
enum RenewalState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<Result<(), AuthError>>>,
    },
}

/// What a caller holds after consulting the renewal gate.
enum RenewalTicket {
    /// This caller owns the renewal and must run it.
    Run,
    /// A renewal is already in flight; wait for its outcome.
    Join(oneshot::Receiver<Result<(), AuthError>>),
}

fn join_queue(waiters: &mut Vec<oneshot::Sender<Result<(), AuthError>>>) -> RenewalTicket {
    let (tx, rx) = oneshot::channel();
    waiters.push(tx);
    RenewalTicket::Join(rx)
}

/// Exclusive hold on the renewal gate, taken by the caller that runs the
/// renewal.
///
/// `finish` resets the gate to idle and hands back the queued waiters for
/// draining. If the renewal future is dropped before finishing, `Drop`
/// resets the gate and closes the waiters' channels instead, so no caller
/// stays suspended behind an abandoned renewal.
struct GateHold<'a> {
    gate: &'a Mutex<RenewalState>,
}

impl GateHold<'_> {
    fn finish(self) -> Vec<oneshot::Sender<Result<(), AuthError>>> {
        let waiters = reset_gate(self.gate);
        mem::forget(self);
        waiters
    }
}

impl Drop for GateHold<'_> {
    fn drop(&mut self) {
        // dropping the senders closes every queued waiter's channel
        drop(reset_gate(self.gate));
    }
}

fn reset_gate(gate: &Mutex<RenewalState>) -> Vec<oneshot::Sender<Result<(), AuthError>>> {
    let mut state = gate.lock().unwrap_or_else(PoisonError::into_inner);
    match mem::replace(&mut *state, RenewalState::Idle) {
        RenewalState::Refreshing { waiters } => waiters,
        RenewalState::Idle => Vec::new(),
    }
}

/// Immutable per-call retry marker: a call is retried at most once.
#[derive(Debug, Clone, Copy)]
struct Attempt {
    retried: bool,
}

impl Attempt {
    fn first() -> Self {
        Self { retried: false }
    }

    fn retry(self) -> Self {
        Self { retried: true }
    }
}

/// The request pipeline: credential attachment, silent renewal, retry.
pub struct AuthClient {
    dispatcher: Arc<dyn Dispatcher>,
    service: Arc<dyn SessionService>,
    tokens: Arc<TokenStore>,
    identity: IdentityHandle,
    renewal: Mutex<RenewalState>,
    near_expiry_threshold_secs: i64,
}

impl AuthClient {
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        service: Arc<dyn SessionService>,
        tokens: Arc<TokenStore>,
        identity: IdentityHandle,
        near_expiry_threshold_secs: i64,
    ) -> Self {
        Self {
            dispatcher,
            service,
            tokens,
            identity,
            renewal: Mutex::new(RenewalState::Idle),
            near_expiry_threshold_secs,
        }
    }

    /// Send an application call with credential handling.
    ///
    /// An unauthorized response triggers one token renewal and one retry. A
    /// second unauthorized response is terminal for this call. A renewal
    /// failure propagates in place of the original unauthorized status.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, AuthError> {
        let mut attempt = Attempt::first();
        loop {
            let response = self.dispatch_with_credentials(&request).await?;
            if !response.is_unauthorized() {
                return Ok(response);
            }

            if attempt.retried {
                warn!(path = %request.path, "unauthorized after renewed token; giving up");
                self.tokens.clear_tokens();
                return Err(AuthError::AuthenticationFailed(
                    "request unauthorized after token renewal".to_string(),
                ));
            }

            self.renew().await?;
            attempt = attempt.retry();
        }
    }

    /// Pre-dispatch: attach a usable access token, renewing first if needed.
    async fn dispatch_with_credentials(
        &self,
        request: &ApiRequest,
    ) -> Result<ApiResponse, AuthError> {
        if self.tokens.access_token().is_none() {
            // No credential on record; dispatch bare and let the service
            // decide.
            return self.dispatcher.dispatch(request, None).await;
        }

        self.ensure_fresh().await?;

        // Re-read after any renewal; a token captured before suspending
        // could be stale.
        let bearer = self.tokens.access_token();
        self.dispatcher.dispatch(request, bearer.as_deref()).await
    }

    /// Renew when a renewal is already in flight (join it) or the token is
    /// near expiry (run one). Otherwise a no-op.
    async fn ensure_fresh(&self) -> Result<(), AuthError> {
        let ticket = {
            let mut state = self.lock_gate();
            match &mut *state {
                RenewalState::Refreshing { waiters } => Some(join_queue(waiters)),
                RenewalState::Idle => {
                    if self.tokens.is_near_expiry(self.near_expiry_threshold_secs) {
                        *state = RenewalState::Refreshing { waiters: Vec::new() };
                        Some(RenewalTicket::Run)
                    } else {
                        None
                    }
                }
            }
        };

        match ticket {
            Some(ticket) => self.settle(ticket).await,
            None => Ok(()),
        }
    }

    /// Renew unconditionally, joining an in-flight renewal if present.
    async fn renew(&self) -> Result<(), AuthError> {
        let ticket = {
            let mut state = self.lock_gate();
            match &mut *state {
                RenewalState::Refreshing { waiters } => join_queue(waiters),
                RenewalState::Idle => {
                    *state = RenewalState::Refreshing { waiters: Vec::new() };
                    RenewalTicket::Run
                }
            }
        };

        self.settle(ticket).await
    }

    /// Resolve a renewal ticket: run the operation and drain the queue, or
    /// wait on the in-flight one.
    ///
    /// The gate lock is only taken in non-suspending code, never across the
    /// refresh call itself, so queued callers can register while it is in
    /// flight.
    async fn settle(&self, ticket: RenewalTicket) -> Result<(), AuthError> {
        match ticket {
            RenewalTicket::Join(rx) => match rx.await {
                Ok(outcome) => outcome,
                // The renewal that owned the gate was dropped before
                // resolving; treat it as a failed renewal rather than
                // waiting forever.
                Err(_) => Err(AuthError::AuthenticationFailed(
                    "token renewal abandoned".to_string(),
                )),
            },
            RenewalTicket::Run => {
                let hold = GateHold {
                    gate: &self.renewal,
                };
                let outcome = self.run_renewal().await;

                for waiter in hold.finish() {
                    let _ = waiter.send(outcome.clone());
                }

                outcome
            }
        }
    }

    /// A panic while the gate is held cannot tear its state, so a poisoned
    /// lock is recovered instead of wedging every future renewal.
    fn lock_gate(&self) -> MutexGuard<'_, RenewalState> {
        self.renewal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The renewal operation proper. Runs under the exclusive `Refreshing`
    /// state; every failure path drops the session credentials.
    async fn run_renewal(&self) -> Result<(), AuthError> {
        let Some(refresh_token) = self.tokens.refresh_token() else {
            self.fail_session();
            return Err(AuthError::MissingRefreshToken);
        };

        let response = match self.service.refresh(&refresh_token).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "token renewal failed");
                self.fail_session();
                return Err(err);
            }
        };

        let grant = match response.into_grant() {
            Ok(grant) => grant,
            Err(err) => {
                warn!(error = %err, "token renewal returned a malformed payload");
                self.fail_session();
                return Err(err);
            }
        };

        // Adopt a rotated refresh token when the service returns one, keep
        // the current one otherwise.
        let next_refresh = grant.refresh_token.unwrap_or(refresh_token);
        self.tokens
            .set_tokens(&grant.access_token, &next_refresh, grant.expires_at);
        debug!(expires_at = grant.expires_at, "access token renewed");
        Ok(())
    }

    fn fail_session(&self) {
        self.tokens.clear_tokens();
        self.identity.clear();
    }
}
