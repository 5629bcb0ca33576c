//! Common test utilities for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use practice_backend::api::{HttpClient, HttpRequest, HttpResponse, TransportError};
use practice_backend::auth::{SessionSignal, SessionTerminator};
use practice_backend::notify::Notifier;
use practice_backend::{ApiClient, Config, CredentialPair, CredentialStore};

pub const BASE: &str = "https://api.example.com";

/// What the refresh endpoint answers
#[derive(Debug, Clone)]
pub enum RenewalScript {
    Issue { access: String, refresh: String },
    Reject(u16),
    Timeout,
}

impl RenewalScript {
    pub fn issue(access: &str, refresh: &str) -> Self {
        Self::Issue {
            access: access.to_string(),
            refresh: refresh.to_string(),
        }
    }
}

/// Fake API server
///
/// Protected endpoints accept exactly one access credential. The refresh
/// endpoint follows a script and can be held until the test releases it.
#[derive(Clone)]
pub struct ScriptedServer {
    accepted: Arc<String>,
    renewal: RenewalScript,
    gate: Arc<Semaphore>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedServer {
    /// Renewals are answered immediately
    pub fn open(accepted: &str, renewal: RenewalScript) -> Self {
        let server = Self::held(accepted, renewal);
        server.gate.add_permits(1_000);
        server
    }

    /// Renewals wait for `release_renewal`
    pub fn held(accepted: &str, renewal: RenewalScript) -> Self {
        Self {
            accepted: Arc::new(accepted.to_string()),
            renewal,
            gate: Arc::new(Semaphore::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn release_renewal(&self) {
        self.gate.add_permits(1);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose URL is `BASE` + `path`
    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        let url = format!("{BASE}{path}");
        self.requests()
            .into_iter()
            .filter(|r| r.url == url)
            .collect()
    }

    pub fn renewal_count(&self) -> usize {
        self.requests_to("/auth/refresh").len()
    }

    fn respond(status: u16, body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status,
            body: body.to_string(),
        })
    }
}

#[async_trait]
impl HttpClient for ScriptedServer {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let path = request.url.trim_start_matches(BASE).to_string();

        match path.as_str() {
            "/auth/refresh" => {
                self.gate.acquire().await.unwrap().forget();
                match &self.renewal {
                    RenewalScript::Issue { access, refresh } => Self::respond(
                        200,
                        &format!(r#"{{"accessToken": "{access}", "refreshToken": "{refresh}"}}"#),
                    ),
                    RenewalScript::Reject(status) => {
                        Self::respond(*status, r#"{"message": "Refresh token revoked"}"#)
                    }
                    RenewalScript::Timeout => Err(TransportError::Timeout),
                }
            }
            "/auth/login" | "/auth/register" => {
                Self::respond(401, r#"{"message": "Invalid credentials"}"#)
            }
            "/broken" => Self::respond(500, r#"{"message": "Internal error"}"#),
            _ if request.bearer() == Some(self.accepted.as_str()) => {
                Self::respond(200, &format!(r#"{{"path": "{path}"}}"#))
            }
            _ => Self::respond(401, r#"{"message": "jwt expired"}"#),
        }
    }
}

/// Notifier that counts messages
#[derive(Debug, Default)]
pub struct CountingNotifier {
    messages: Mutex<Vec<String>>,
}

impl CountingNotifier {
    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

impl Notifier for CountingNotifier {
    fn error(&self, message: &str) -> anyhow::Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// Session signal that also counts how often it was asked to terminate
pub struct CountingSession {
    pub signal: SessionSignal,
    terminations: AtomicUsize,
}

impl CountingSession {
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

impl SessionTerminator for CountingSession {
    fn terminate(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.signal.terminate();
    }

    fn session_started(&self) {
        self.signal.session_started();
    }
}

pub struct Harness {
    pub client: ApiClient<ScriptedServer>,
    pub server: ScriptedServer,
    pub store: Arc<CredentialStore>,
    pub notifier: Arc<CountingNotifier>,
    pub session: Arc<CountingSession>,
}

pub fn harness(server: ScriptedServer, initial: Option<CredentialPair>) -> Harness {
    let config = Config {
        api_base_url: BASE.to_string(),
        ..Config::default()
    };
    let store = Arc::new(CredentialStore::in_memory(initial));
    let notifier = Arc::new(CountingNotifier::default());
    let session = Arc::new(CountingSession {
        signal: SessionSignal::new(store.clone()),
        terminations: AtomicUsize::new(0),
    });
    let client = ApiClient::with_http_client(
        &config,
        server.clone(),
        store.clone(),
        notifier.clone(),
        session.clone(),
    );

    Harness {
        client,
        server,
        store,
        notifier,
        session,
    }
}

/// Polls `condition` until it holds, giving other tasks time to run
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..5000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition never became true");
}
