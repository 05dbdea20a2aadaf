//! Request pipeline and session-service contract for the Vaultgate API.
//!
//! This module provides:
//! - `AuthClient`: authenticated request dispatch with silent token renewal
//! - `SessionService`: the login/logout/refresh collaborator contract
//! - HTTP implementations of both over pooled `reqwest` clients

pub mod client;
pub mod service;

pub use client::{ApiRequest, ApiResponse, AuthClient, Dispatcher, HttpDispatcher};
pub use service::{HttpSessionService, LoginResponse, RefreshResponse, SessionService};
