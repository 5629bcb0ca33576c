//! Authenticated API client for the practice platform.
//!
//! Every request goes through [`api::ApiClient`], which attaches the stored
//! bearer credential, classifies failures and, when the access credential has
//! expired, hands off to a single shared [`auth::RefreshCoordinator`] so that
//! only one renewal exchange is ever in flight.

pub mod api;
pub mod auth;
pub mod config;
pub mod notify;

pub use api::{ApiClient, ApiError, ApiRequest};
pub use auth::{CredentialPair, CredentialStore, SessionSignal, SessionState};
pub use config::{Config, ConfigManager};
