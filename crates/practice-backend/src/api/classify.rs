//! Failure classification
//!
//! Decides whether a failed call may be rescued by renewing the access
//! credential, and derives the message shown to the user for it.

use super::http::{HttpResponse, TransportError};
use crate::config::AuthEndpoints;

const NETWORK_ERROR_MESSAGE: &str = "Network error: unable to reach the server";

/// A request attempt that did not succeed
#[derive(Debug, Clone)]
pub enum Failure {
    /// The server answered with a non-2xx status
    Status(HttpResponse),
    /// No response was received
    Transport(TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    AuthExpired,
    OtherHttpError,
    NetworkError,
}

/// Classifies a failed attempt against `path`
pub fn classify(path: &str, failure: &Failure, endpoints: &AuthEndpoints) -> FailureKind {
    match failure {
        Failure::Transport(_) => FailureKind::NetworkError,
        Failure::Status(response) if response.is_unauthorized() && !endpoints.is_exempt(path) => {
            FailureKind::AuthExpired
        }
        Failure::Status(_) => FailureKind::OtherHttpError,
    }
}

impl Failure {
    /// Human-readable message for the notification channel
    pub fn user_message(&self) -> String {
        match self {
            Failure::Transport(_) => NETWORK_ERROR_MESSAGE.to_string(),
            Failure::Status(response) => server_message(&response.body)
                .unwrap_or_else(|| format!("Request failed with status {}", response.status)),
        }
    }
}

/// Pulls an error message out of a JSON error body
///
/// Accepts `message`, `error` or `detail`; a list of messages (as returned
/// by validation errors) is joined.
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    ["message", "error", "detail"]
        .iter()
        .find_map(|key| match value.get(key)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Array(items) => {
                let parts: Vec<&str> = items.iter().filter_map(|i| i.as_str()).collect();
                (!parts.is_empty()).then(|| parts.join(", "))
            }
            _ => None,
        })
}
