//! Login, registration and logout
//!
//! These endpoints are exempt from credential renewal: a 401 from login or
//! registration is a wrong password, not an expired session.

use serde::{Deserialize, Serialize};

use super::client::ApiClient;
use super::error::ApiError;
use super::http::HttpClient;
use super::request::ApiRequest;
use crate::auth::CredentialPair;

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Credentials issued by login or registration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub credentials: CredentialPair,
    /// Profile of the signed-in user, when the server includes one
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

fn revocation(refresh_token: &str) -> serde_json::Value {
    serde_json::json!({ "refreshToken": refresh_token })
}

impl<H: HttpClient> ApiClient<H> {
    /// Signs in and stores the issued credentials
    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        let path = self.endpoints.login.clone();
        self.authenticate(&path, request).await
    }

    /// Creates an account and stores the issued credentials
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        let path = self.endpoints.register.clone();
        self.authenticate(&path, request).await
    }

    /// Ends the session
    ///
    /// The server is told to revoke the renewal credential on a best-effort
    /// basis; local credentials are cleared regardless of the outcome. If the
    /// logout request itself triggers a renewal, the replay revokes the
    /// renewal credential issued by that renewal.
    pub async fn logout(&self) {
        if let Some(refresh_token) = self.store.refresh_token() {
            let request = ApiRequest::post(self.endpoints.logout.as_str())
                .body(revocation(&refresh_token));

            let result = self
                .send_replaying(request, |retry| match self.store.refresh_token() {
                    Some(current) => retry.body(revocation(&current)),
                    None => retry,
                })
                .await;

            if let Err(e) = result {
                tracing::debug!("Logout request failed: {}", e);
            }
        }

        self.session.terminate();
    }

    /// Reports whether persisted credentials were restored at startup
    pub fn restore_session(&self) -> bool {
        let restored = self.store.is_authenticated();
        if restored {
            self.session.session_started();
        }
        restored
    }

    async fn authenticate<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<AuthResponse, ApiError> {
        let response: AuthResponse = self.post_json(path, body).await?;

        self.store.set(response.credentials.clone());
        self.session.session_started();
        tracing::info!("Signed in");

        Ok(response)
    }
}
