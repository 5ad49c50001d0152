//! Usage: Authenticated API client with transparent bearer-token refresh.
//!
//! Wraps a `reqwest` client so every outgoing request carries the stored access
//! token, and a 401 response triggers a single coordinated refresh followed by a
//! one-shot retry. Concurrent 401s share one refresh call; the other requests
//! queue and resume once it settles.

mod auth;
mod client;
mod config;
mod shared;
mod store;

pub use auth::navigation::{LoginNavigator, NoopNavigator};
pub use auth::tokens::is_token_expired;
pub use client::{ApiClient, ApiClientBuilder, ApiRequest};
pub use config::ClientConfig;
pub use shared::error::{AppError, AppResult};
pub use shared::logging;
pub use store::{CredentialPair, CredentialStore, KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_USER};
