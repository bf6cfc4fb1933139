//! # Context Framework Sample
//!
//! A small greeting application wired entirely through a context hierarchy.
//!
//! ## Components
//!
//! - **[model]**: [`AppConfig`](context_sample::model::AppConfig), read from the JSON file
//!   named by `APP_CONFIG` or built from defaults.
//! - **[services]**: injectable `GreetingService` and `TimestampProvider`.
//! - **[controllers]**: `GreetingController`, invoked through an interception proxy.
//! - **[observers]**: data source and server life cycle observers.
//! - **[lifecycle]**: [`AppSystem`](context_sample::lifecycle::AppSystem), the composition root.
//!
//! ## Running
//!
//! ```bash
//! RUST_LOG=info cargo run -p context-sample
//! RUST_LOG=context_framework=debug,info cargo run -p context-sample
//! ```

use context_framework::tracing::setup_tracing;
use context_sample::lifecycle::AppSystem;
use context_sample::model::AppConfig;
use tracing::{error, info, Instrument};

fn load_config() -> Result<AppConfig, String> {
    match std::env::var("APP_CONFIG") {
        Ok(path) => {
            let json = std::fs::read_to_string(&path).map_err(|e| format!("{path}: {e}"))?;
            AppConfig::from_json(&json).map_err(|e| e.to_string())
        }
        Err(_) => Ok(AppConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = load_config()?;
    info!(app = %config.name, "Starting application");

    let system = AppSystem::new(config).map_err(|e| e.to_string())?;

    let span = tracing::info_span!("startup");
    system
        .start()
        .instrument(span)
        .await
        .map_err(|e| e.to_string())?;

    for (user, name) in [(Some("alice"), None), (None, Some("Bob")), (None, None)] {
        match system.handle_request(user, name).await {
            Ok(response) => info!(%response, "Request served"),
            Err(e) => error!(error = %e, "Request failed"),
        }
    }

    for entry in system.audit.entries() {
        info!(entry = %entry, "Audit");
    }

    system.shutdown().await.map_err(|e| e.to_string())?;

    info!("Application completed successfully");
    Ok(())
}
