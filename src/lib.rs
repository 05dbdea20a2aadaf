//! Client library for the Vaultgate card dashboard API.
//!
//! This crate implements the client side of the Vaultgate session lifecycle:
//! durable token storage, silent access-token renewal, and authenticated
//! request dispatch with a single retry after an unauthorized response.
//! Concurrent renewal attempts are collapsed into one in-flight refresh
//! call; callers that arrive while a renewal is running wait for its outcome
//! and proceed with the renewed token.
//!
//! Wiring the pieces together:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vaultgate::{
//!     ApiRequest, AuthClient, Config, FileStorage, HttpDispatcher, HttpSessionService,
//!     IdentityHandle, Session, TokenStore,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//!
//! let storage = FileStorage::new(FileStorage::default_path(vaultgate::config::APP_NAME)?);
//! let tokens = Arc::new(TokenStore::new(Box::new(storage)));
//! tokens.load_from_storage();
//!
//! let service = Arc::new(HttpSessionService::new(&config)?);
//! let identity = IdentityHandle::new();
//! let session = Session::new(service.clone(), tokens.clone(), identity.clone());
//! let client = AuthClient::new(
//!     Arc::new(HttpDispatcher::new(&config)?),
//!     service,
//!     tokens,
//!     identity,
//!     config.near_expiry_threshold_secs,
//! );
//!
//! session.login("demo@mail.com", "hunter2").await?;
//! let _cards = client.send(ApiRequest::get("/api/cards")).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;

pub use api::{
    ApiRequest, ApiResponse, AuthClient, Dispatcher, HttpDispatcher, HttpSessionService,
    SessionService,
};
pub use auth::{
    AuthError, FileStorage, IdentityHandle, KeyringStorage, MemoryStorage, Session, TokenStorage,
    TokenStore, User,
};
pub use config::Config;
