use std::sync::Arc;
use tokio::sync::watch;

use super::store::CredentialStore;

/// Whether the user currently has a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Authenticated,
    LoggedOut,
}

/// Port through which the client tells its host that the session ended
///
/// `terminate` must be idempotent.
pub trait SessionTerminator: Send + Sync {
    fn terminate(&self);

    /// Called after a successful login or registration
    fn session_started(&self) {}
}

/// Session state published over a watch channel
///
/// Hosts subscribe to learn when to show the logged-out state. Ending the
/// session clears the credential store and, when configured, opens the login
/// page in the user's browser.
pub struct SessionSignal {
    store: Arc<CredentialStore>,
    state_tx: watch::Sender<SessionState>,
    login_page_url: Option<String>,
}

impl SessionSignal {
    /// Creates a signal whose initial state reflects the store's contents
    pub fn new(store: Arc<CredentialStore>) -> Self {
        let initial = if store.is_authenticated() {
            SessionState::Authenticated
        } else {
            SessionState::LoggedOut
        };
        let (state_tx, _) = watch::channel(initial);

        Self {
            store,
            state_tx,
            login_page_url: None,
        }
    }

    /// Opens `url` whenever the session ends
    pub fn with_login_page(mut self, url: Option<String>) -> Self {
        self.login_page_url = url;
        self
    }

    /// Returns a receiver for session state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn transition(&self, next: SessionState) -> bool {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        })
    }
}

impl SessionTerminator for SessionSignal {
    fn terminate(&self) {
        self.store.clear();

        if !self.transition(SessionState::LoggedOut) {
            return;
        }

        tracing::info!("Session ended");

        if let Some(ref url) = self.login_page_url {
            if let Err(e) = open::that(url) {
                tracing::warn!("Failed to open login page: {}", e);
            }
        }
    }

    fn session_started(&self) {
        if self.transition(SessionState::Authenticated) {
            tracing::info!("Session started");
        }
    }
}
