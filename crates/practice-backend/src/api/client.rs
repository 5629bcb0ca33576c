use anyhow::Context;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::poll_fn;
use std::sync::Arc;
use std::time::Duration;

use super::classify::{classify, Failure, FailureKind};
use super::error::ApiError;
use super::http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
use super::request::ApiRequest;
use crate::auth::{
    CredentialStore, HttpRenewer, RefreshCoordinator, Renewed, ReplayTurn, SessionTerminator,
};
use crate::config::{AuthEndpoints, Config};
use crate::notify::Notifier;

/// Practice platform API client
///
/// Generic over the HTTP client implementation for testability. Clones share
/// the credential store and the refresh coordinator, so every clone takes
/// part in the same single renewal.
pub struct ApiClient<H: HttpClient = ReqwestClient> {
    http: H,
    base_url: String,
    pub(super) endpoints: AuthEndpoints,
    notify_on_error: bool,
    pub(super) store: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
    notifier: Arc<dyn Notifier>,
    pub(super) session: Arc<dyn SessionTerminator>,
}

impl ApiClient<ReqwestClient> {
    /// Creates a client using reqwest with the configured timeout
    pub fn new(
        config: &Config,
        store: Arc<CredentialStore>,
        notifier: Arc<dyn Notifier>,
        session: Arc<dyn SessionTerminator>,
    ) -> anyhow::Result<Self> {
        let http = ReqwestClient::with_timeout(Duration::from_secs(config.request_timeout_sec))?;
        Ok(Self::with_http_client(config, http, store, notifier, session))
    }
}

impl<H: HttpClient + Clone + 'static> ApiClient<H> {
    /// Creates a client with a custom HTTP implementation
    ///
    /// The renewal exchange is sent through the same HTTP client, so it is
    /// subject to the same transport timeout as every other request.
    pub fn with_http_client(
        config: &Config,
        http: H,
        store: Arc<CredentialStore>,
        notifier: Arc<dyn Notifier>,
        session: Arc<dyn SessionTerminator>,
    ) -> Self {
        let refresh_url = ApiRequest::post(config.endpoints.refresh.as_str())
            .url(&config.api_base_url);
        let renewer = HttpRenewer::new(http.clone(), refresh_url);
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            Arc::new(renewer),
            session.clone(),
        ));

        Self {
            http,
            base_url: config.api_base_url.clone(),
            endpoints: config.endpoints.clone(),
            notify_on_error: config.notify_on_error,
            store,
            coordinator,
            notifier,
            session,
        }
    }
}

impl<H: HttpClient> ApiClient<H> {
    /// Returns the credential store backing this client
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Returns the shared refresh coordinator
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Sends a request, renewing the access credential once if it has expired
    ///
    /// An expired credential is absorbed: the request waits for the shared
    /// renewal and is replayed a single time with the new credential. Replays
    /// go out in the order their requests joined the renewal. If the renewal
    /// fails the session has already ended and the renewal error is returned.
    /// A replay that is rejected again fails with `ApiError::Unauthorized`.
    pub async fn send(&self, request: ApiRequest) -> Result<HttpResponse, ApiError> {
        self.send_replaying(request, |retry| retry).await
    }

    /// Like [`Self::send`], with `prepare` applied to the request before it
    /// is replayed under the renewed credential
    pub(super) async fn send_replaying<F>(
        &self,
        request: ApiRequest,
        prepare: F,
    ) -> Result<HttpResponse, ApiError>
    where
        F: FnOnce(ApiRequest) -> ApiRequest,
    {
        let credential = self.store.access_token();
        let failure = match self.dispatch(&request, credential.as_deref(), None).await {
            Ok(response) => return Ok(response),
            Err(failure) => failure,
        };

        if request.is_retry()
            || classify(request.path(), &failure, &self.endpoints) != FailureKind::AuthExpired
        {
            return Err(self.terminal(&request, failure));
        }

        let Renewed {
            access_token,
            mut turn,
        } = self.coordinator.renew().await?;

        let retry = prepare(request.into_retry());
        turn.wait().await;
        tracing::debug!(path = retry.path(), "Replaying request with renewed credential");

        self.dispatch(&retry, Some(access_token.as_str()), Some(turn))
            .await
            .map_err(|failure| self.terminal(&retry, failure))
    }

    /// Sends a request and deserializes the JSON response
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        Ok(response.json()?)
    }

    /// Makes a GET request and deserializes the JSON response
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(ApiRequest::get(path)).await
    }

    /// Makes a POST request with a JSON body and deserializes the JSON response
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body).context("Failed to serialize request body")?;
        self.send_json(ApiRequest::post(path).body(body)).await
    }

    /// Performs one attempt, attaching `credential` as a bearer token
    ///
    /// A replay's `turn` is passed on once the request has been handed to
    /// the transport. Failed first attempts are reported on the notification
    /// channel; replays fail silently.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        credential: Option<&str>,
        mut turn: Option<ReplayTurn>,
    ) -> Result<HttpResponse, Failure> {
        let mut headers = request.headers().clone();
        if let Some(token) = credential {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("Access credential is not a valid header value"),
            }
        }

        let http_request = HttpRequest {
            method: request.method().clone(),
            url: request.url(&self.base_url),
            headers,
            body: request.json_body().cloned(),
        };

        let mut call = self.http.execute(http_request);
        let result = poll_fn(|cx| {
            let poll = call.as_mut().poll(cx);
            if let Some(turn) = turn.take() {
                turn.pass();
            }
            poll
        })
        .await;

        let failure = match result {
            Ok(response) if response.is_success() => return Ok(response),
            Ok(response) => Failure::Status(response),
            Err(e) => Failure::Transport(e),
        };

        if !request.is_retry() {
            self.notify(&failure);
        }

        Err(failure)
    }

    fn notify(&self, failure: &Failure) {
        if !self.notify_on_error {
            return;
        }

        if let Err(e) = self.notifier.error(&failure.user_message()) {
            tracing::warn!("Failed to send notification: {}", e);
        }
    }

    fn terminal(&self, request: &ApiRequest, failure: Failure) -> ApiError {
        match classify(request.path(), &failure, &self.endpoints) {
            FailureKind::AuthExpired => {
                tracing::warn!(path = request.path(), "Request rejected after renewal");
                ApiError::Unauthorized
            }
            FailureKind::OtherHttpError | FailureKind::NetworkError => failure.into(),
        }
    }
}

impl<H: HttpClient + Clone> Clone for ApiClient<H> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            endpoints: self.endpoints.clone(),
            notify_on_error: self.notify_on_error,
            store: self.store.clone(),
            coordinator: self.coordinator.clone(),
            notifier: self.notifier.clone(),
            session: self.session.clone(),
        }
    }
}
