//! Authentication module for session, identity and token lifecycle state.
//!
//! This module provides:
//! - `TokenStore`: the in-memory token bundle, mirrored to durable storage
//! - `Session`: login/logout and the authenticated identity
//! - `TokenStorage`: the durable key-value contract, with file, keychain and
//!   in-memory implementations

pub mod error;
pub mod session;
pub mod storage;
pub mod tokens;

pub use error::AuthError;
pub use session::{IdentityHandle, Session, User};
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, TokenStorage};
pub use tokens::TokenStore;
