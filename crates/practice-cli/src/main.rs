mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Command};
use practice_backend::api::{LoginRequest, RegisterRequest};
use practice_backend::auth::FileCredentialStore;
use practice_backend::notify::{DesktopNotifier, LogNotifier, Notifier};
use practice_backend::{ApiClient, ApiRequest, ConfigManager, CredentialStore, SessionSignal};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.default_filter())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ConfigManager::new()?.get();
    let store = Arc::new(CredentialStore::with_backend(Box::new(
        FileCredentialStore::new()?,
    )));
    let session = Arc::new(
        SessionSignal::new(store.clone()).with_login_page(config.login_page_url.clone()),
    );
    let notifier: Arc<dyn Notifier> = if config.desktop_notifications {
        Arc::new(DesktopNotifier::new())
    } else {
        Arc::new(LogNotifier)
    };
    let client = ApiClient::new(&config, store, notifier, session)?;

    if client.restore_session() {
        tracing::debug!("Using stored session");
    }

    match cli.command {
        Command::Status => {
            if client.store().is_authenticated() {
                println!("signed in");
            } else {
                println!("signed out");
            }
        }
        Command::Login { email, password } => {
            let request = LoginRequest {
                email: email.clone(),
                password,
            };
            client.login(&request).await?;
            println!("signed in as {email}");
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let request = RegisterRequest {
                username: username.clone(),
                email,
                password,
            };
            client.register(&request).await?;
            println!("registered {username}");
        }
        Command::Logout => {
            client.logout().await;
            println!("signed out");
        }
        Command::Get { path } => {
            let body: serde_json::Value = client.get_json(&path).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Post { path, json } => {
            let payload: serde_json::Value =
                serde_json::from_str(&json).context("Request body is not valid JSON")?;
            let response = client.send(ApiRequest::post(path).body(payload)).await?;
            println!("{}", response.body);
        }
    }

    Ok(())
}
