//! Coordinated credential renewal
//!
//! Any number of requests may discover an expired access credential at the
//! same time. The first one becomes the leader and performs the renewal
//! exchange; everyone arriving while it is in flight is queued and receives
//! the leader's outcome, in arrival order, once the exchange settles.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

use super::session::SessionTerminator;
use super::store::{CredentialPair, CredentialStore};
use crate::api::classify::Failure;
use crate::api::http::{HttpClient, HttpRequest, TransportError};

/// Why a renewal did not produce new credentials
///
/// Cloneable because one outcome is handed to every queued caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenewalError {
    #[error("no renewal credential stored")]
    MissingCredential,
    #[error("renewal rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("renewal request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("invalid renewal response: {0}")]
    InvalidResponse(String),
    /// The exchange task stopped without an outcome; credentials are untouched
    #[error("renewal abandoned before completion")]
    Abandoned,
}

/// Exchanges a renewal credential for a fresh credential pair
#[async_trait]
pub trait CredentialRenewer: Send + Sync {
    async fn renew(&self, refresh_token: &str) -> Result<CredentialPair, RenewalError>;
}

/// Renewal exchange against the API's refresh endpoint
pub struct HttpRenewer<H> {
    http: H,
    url: String,
}

impl<H: HttpClient> HttpRenewer<H> {
    pub fn new(http: H, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl<H: HttpClient> CredentialRenewer for HttpRenewer<H> {
    async fn renew(&self, refresh_token: &str) -> Result<CredentialPair, RenewalError> {
        let request = HttpRequest {
            method: Method::POST,
            url: self.url.clone(),
            headers: HeaderMap::new(),
            body: Some(serde_json::json!({ "refreshToken": refresh_token })),
        };

        let response = self.http.execute(request).await?;

        if !response.is_success() {
            let status = response.status;
            return Err(RenewalError::Rejected {
                status,
                message: Failure::Status(response).user_message(),
            });
        }

        let pair: CredentialPair = response
            .json()
            .map_err(|e| RenewalError::InvalidResponse(format!("{e:#}")))?;

        if pair.access_token.is_empty() || pair.refresh_token.is_empty() {
            return Err(RenewalError::InvalidResponse(
                "empty credential in response".to_string(),
            ));
        }

        Ok(pair)
    }
}

/// A renewed access credential and the caller's place in the replay order
#[derive(Debug)]
pub struct Renewed {
    pub access_token: String,
    pub turn: ReplayTurn,
}

/// Position of one caller in the queue of replays
///
/// Replays are dispatched in the order their callers queued. Each caller
/// waits for its predecessor, dispatches, then passes the turn on. Dropping
/// a turn passes it too, so a caller that goes away never stalls the queue.
#[derive(Debug)]
pub struct ReplayTurn {
    ready: Option<oneshot::Receiver<()>>,
    next: oneshot::Sender<()>,
}

impl ReplayTurn {
    /// Waits until every earlier replay has been dispatched
    pub async fn wait(&mut self) {
        if let Some(ready) = self.ready.take() {
            let _ = ready.await;
        }
    }

    /// Lets the next replay go
    pub fn pass(self) {
        let _ = self.next.send(());
    }
}

type Outcome = Result<Renewed, RenewalError>;

enum RenewalState {
    Idle,
    /// Senders are in arrival order
    Refreshing(Vec<oneshot::Sender<Outcome>>),
}

/// Guarantees at most one renewal exchange in flight
pub struct RefreshCoordinator {
    state: Mutex<RenewalState>,
    store: Arc<CredentialStore>,
    renewer: Arc<dyn CredentialRenewer>,
    terminator: Arc<dyn SessionTerminator>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        renewer: Arc<dyn CredentialRenewer>,
        terminator: Arc<dyn SessionTerminator>,
    ) -> Self {
        Self {
            state: Mutex::new(RenewalState::Idle),
            store,
            renewer,
            terminator,
        }
    }

    /// Obtains a renewed access credential
    ///
    /// Joins the renewal already in flight, or starts one. The exchange runs
    /// on its own task, so a caller that is cancelled while waiting does not
    /// cancel it for everyone else. On success the new pair is committed to
    /// the credential store before any caller resumes. On failure the store
    /// is cleared, every caller receives the same error and the session
    /// terminator runs once.
    pub async fn renew(self: &Arc<Self>) -> Result<Renewed, RenewalError> {
        let (rx, first) = self.join();

        if first {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move { coordinator.exchange().await });
        }

        rx.await.unwrap_or(Err(RenewalError::Abandoned))
    }

    /// Returns true while a renewal exchange is in flight
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_state(), RenewalState::Refreshing(_))
    }

    /// Number of callers waiting on the in-flight renewal
    pub fn pending_count(&self) -> usize {
        match &*self.lock_state() {
            RenewalState::Refreshing(waiters) => waiters.len(),
            RenewalState::Idle => 0,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RenewalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the caller, reporting whether it opened the renewal
    ///
    /// The state is checked and set in one critical section.
    fn join(&self) -> (oneshot::Receiver<Outcome>, bool) {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock_state();
        match &mut *state {
            RenewalState::Refreshing(waiters) => {
                waiters.push(tx);
                tracing::debug!(queued = waiters.len(), "Renewal in flight, waiting");
                (rx, false)
            }
            RenewalState::Idle => {
                *state = RenewalState::Refreshing(vec![tx]);
                (rx, true)
            }
        }
    }

    /// Returns to idle, handing back the queued callers
    fn drain(&self) -> Vec<oneshot::Sender<Outcome>> {
        match std::mem::replace(&mut *self.lock_state(), RenewalState::Idle) {
            RenewalState::Refreshing(waiters) => waiters,
            RenewalState::Idle => Vec::new(),
        }
    }

    async fn exchange(&self) {
        let flight = InFlight {
            coordinator: self,
            settled: false,
        };

        let outcome = match self.store.refresh_token() {
            Some(token) => {
                tracing::info!("Access credential expired, renewing");
                self.renewer.renew(&token).await
            }
            None => Err(RenewalError::MissingCredential),
        };

        flight.settle(outcome);
    }

    fn settle(&self, outcome: Result<CredentialPair, RenewalError>) {
        match outcome {
            Ok(pair) => {
                let access = pair.access_token.clone();
                self.store.set(pair);

                let waiters = self.drain();
                tracing::info!(queued = waiters.len(), "Credentials renewed");

                let mut ready = None;
                for waiter in waiters {
                    let (next, successor) = oneshot::channel();
                    let turn = ReplayTurn {
                        ready: std::mem::replace(&mut ready, Some(successor)),
                        next,
                    };
                    let _ = waiter.send(Ok(Renewed {
                        access_token: access.clone(),
                        turn,
                    }));
                }
            }
            Err(e) => {
                self.store.clear();

                let waiters = self.drain();
                tracing::warn!(queued = waiters.len(), "Credential renewal failed: {}", e);

                // Callers resume into the logged-out state
                self.terminator.terminate();

                for waiter in waiters {
                    let _ = waiter.send(Err(e.clone()));
                }
            }
        }
    }
}

/// Hold on the in-flight renewal
///
/// If the exchange unwinds before settling, queued callers are released
/// with `Abandoned` instead of waiting forever.
struct InFlight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, outcome: Result<CredentialPair, RenewalError>) {
        self.settled = true;
        self.coordinator.settle(outcome);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let waiters = self.coordinator.drain();
        tracing::warn!(queued = waiters.len(), "Credential renewal abandoned");
        for waiter in waiters {
            let _ = waiter.send(Err(RenewalError::Abandoned));
        }
    }
}
