//! marksyncd: runs the sync coordinator over the stores listed in settings.
//!
//! Stores are JSON bookmark files watched for changes. On the first run without
//! a stored login, `MARKSYNC_PASSWORD` together with `remote.username` from the
//! settings file is submitted as the login.

use std::process::exit;
use std::sync::Arc;

use tracing::{error, info, warn};

use marksync::database::{Database, DATABASE_FILE};
use marksync::managers::local_store::{watch_file, JsonFileStore, LocalStore};
use marksync::platform;
use marksync::services::credential_store::{CredentialStore, CredentialStoreTrait};
use marksync::services::exchange::HttpExchange;
use marksync::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use marksync::services::sync_coordinator::SyncCoordinator;
use marksync::types::credential::Credentials;
use marksync::types::errors::CredentialError;

const PASSWORD_VAR: &str = "MARKSYNC_PASSWORD";

#[tokio::main]
async fn main() {
    let mut engine = SettingsEngine::new(None);
    if let Err(e) = engine.load() {
        eprintln!("marksyncd: {}", e);
        exit(1);
    }

    let level = engine
        .get_settings()
        .general
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();

    let client_id = match engine.client_id() {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "could not assign client id");
            exit(1);
        }
    };
    let settings = engine.get_settings().clone();
    if settings.stores.is_empty() {
        error!(config = engine.get_config_path(), "no local stores configured");
        exit(1);
    }

    let data_dir = platform::get_data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        error!(dir = %data_dir.display(), error = %e, "could not create data directory");
        exit(1);
    }
    let db = match Database::open(data_dir.join(DATABASE_FILE)) {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "could not open state database");
            exit(1);
        }
    };

    let credentials = match CredentialStore::new(db.connection(), client_id.as_bytes()).load() {
        Ok(credentials) => Some(credentials),
        Err(CredentialError::NotConfigured) => None,
        Err(e) => {
            warn!(error = %e, "stored login unreadable, login required");
            None
        }
    };
    let pending_login = match (&credentials, std::env::var(PASSWORD_VAR)) {
        (None, Ok(password)) if !settings.remote.username.is_empty() => {
            Some(Credentials::new(&settings.remote.username, &password))
        }
        _ => None,
    };

    let remote = match HttpExchange::new(&settings.remote) {
        Ok(remote) => remote,
        Err(e) => {
            error!(error = %e, "could not build HTTP client");
            exit(1);
        }
    };
    info!(server = remote.url(), stores = settings.stores.len(), "starting");

    let stores: Vec<Box<dyn LocalStore>> = settings
        .stores
        .iter()
        .map(|s| Box::new(JsonFileStore::new(&s.name, &s.path)) as Box<dyn LocalStore>)
        .collect();

    let coordinator = SyncCoordinator::new(db, stores, Arc::new(remote), &settings, credentials);
    let notifier = coordinator.notifier();
    let mut watchers = Vec::with_capacity(settings.stores.len());
    for (index, store) in settings.stores.iter().enumerate() {
        let notifier = notifier.clone();
        match watch_file(&store.path, move || {
            notifier.store_changed(index);
        }) {
            Ok(watcher) => watchers.push(watcher),
            Err(e) => warn!(store = %store.name, error = %e, "not watching store"),
        }
    }

    let running = tokio::spawn(coordinator.run());
    if let Some(login) = pending_login {
        info!(user = %login.username, "submitting login from environment");
        notifier.login(login);
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "signal handler failed, shutting down");
    }
    info!("shutting down");
    notifier.shutdown();
    if let Err(e) = running.await {
        error!(error = %e, "coordinator task failed");
    }
    drop(watchers);
}
