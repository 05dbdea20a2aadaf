//! The session-service contract: wire payloads, validation, HTTP transport.
//!
//! The service that issues, renews and revokes tokens is an external
//! collaborator. Implementations of [`SessionService`] return raw wire
//! payloads with every field optional; validation into a well-formed grant
//! happens on this side of the boundary so structural checks are identical
//! for the HTTP transport and test doubles.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::auth::error::AuthError;
use crate::auth::session::User;
use crate::config::Config;

/// Session service endpoints, relative to the configured base URL
pub const LOGIN_ENDPOINT: &str = "/api/auth/login";
pub const LOGOUT_ENDPOINT: &str = "/api/auth/logout";
pub const REFRESH_ENDPOINT: &str = "/api/auth/refresh";

/// Raw login payload as received on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: Option<UserPayload>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserPayload {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Raw refresh payload as received on the wire.
///
/// The refresh token is optional: the service only includes one when it
/// rotates the token.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

/// A validated login response.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// A validated refresh response. With no rotated refresh token the caller
/// keeps the one it already holds.
#[derive(Debug, Clone)]
pub struct RefreshGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: i64,
}

impl UserPayload {
    fn into_user(self) -> Option<User> {
        Some(User {
            id: self.id?,
            name: self.name?,
            email: self.email?,
        })
    }
}

impl LoginResponse {
    /// Require identity, both tokens and a numeric expiry.
    pub fn into_grant(self) -> Result<LoginGrant, AuthError> {
        let user = self.user.and_then(UserPayload::into_user);
        match (user, self.access_token, self.refresh_token, self.expires_at) {
            (Some(user), Some(access_token), Some(refresh_token), Some(expires_at)) => {
                Ok(LoginGrant {
                    user,
                    access_token,
                    refresh_token,
                    expires_at,
                })
            }
            _ => Err(AuthError::MalformedResponse(
                "login response missing user, tokens or expiry".to_string(),
            )),
        }
    }
}

impl RefreshResponse {
    /// Require a new access token and a numeric expiry.
    pub fn into_grant(self) -> Result<RefreshGrant, AuthError> {
        match (self.access_token, self.expires_at) {
            (Some(access_token), Some(expires_at)) => Ok(RefreshGrant {
                access_token,
                refresh_token: self.refresh_token,
                expires_at,
            }),
            _ => Err(AuthError::MalformedResponse(
                "refresh response missing access token or expiry".to_string(),
            )),
        }
    }
}

/// Contract of the external session service.
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AuthError>;

    async fn logout(&self) -> Result<(), AuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, AuthError>;
}

/// HTTP session service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpSessionService {
    client: Client,
    base_url: String,
}

impl HttpSessionService {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Map a non-success response into the auth failure surface.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AuthError::from_status(status, &body))
        }
    }
}

#[async_trait]
impl SessionService for HttpSessionService {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let response = self
            .client
            .post(self.url(LOGIN_ENDPOINT))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        let response = self.client.post(self.url(LOGOUT_ENDPOINT)).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, AuthError> {
        debug!("requesting access token renewal");
        let response = self
            .client
            .post(self.url(REFRESH_ENDPOINT))
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await?;

        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }
}
