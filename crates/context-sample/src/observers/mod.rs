//! # Life Cycle Observers
//!
//! The data source must be up before the server accepts requests and must go down
//! after it. Both observers are bound through the life cycle registry; the order comes
//! from `lifeCycle.orderedGroups` in the configuration (`["datasource", "server"]`).
//!
//! - [`DataSourceObserver`] declares its group with a `lifeCycleObserverGroup` tag.
//! - [`ServerObserver`] is only tagged `server`, which counts as its group because
//!   `server` is one of the ordered groups.

use crate::services::AuditLog;
use async_trait::async_trait;
use context_framework::keys::core_tags;
use context_framework::{BindingSpec, BoxError, ContextResult, Injectable, Injection, LifeCycleObserver, ResolvedArgs};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub struct DataSourceObserver {
    url: String,
    log: Arc<AuditLog>,
    connected: AtomicBool,
}

impl Injectable for DataSourceObserver {
    fn injections() -> Vec<Injection> {
        vec![Injection::key("config#datasource.url"), Injection::key("audit.log")]
    }

    fn construct(args: ResolvedArgs) -> ContextResult<Self> {
        Ok(Self {
            url: args.value::<Value>(0)?.as_str().unwrap_or_default().to_string(),
            log: args.value::<AuditLog>(1)?,
            connected: AtomicBool::new(false),
        })
    }

    fn binding_spec() -> BindingSpec {
        BindingSpec::new().tag((core_tags::LIFE_CYCLE_OBSERVER_GROUP, "datasource"))
    }
}

impl DataSourceObserver {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LifeCycleObserver for DataSourceObserver {
    async fn start(&self) -> Result<(), BoxError> {
        info!(url = %self.url, "Connecting data source");
        self.connected.store(true, Ordering::SeqCst);
        self.log.record(format!("datasource: connected to {}", self.url));
        Ok(())
    }

    async fn stop(&self) -> Result<(), BoxError> {
        info!(url = %self.url, "Disconnecting data source");
        self.connected.store(false, Ordering::SeqCst);
        self.log.record("datasource: disconnected");
        Ok(())
    }
}

pub struct ServerObserver {
    address: String,
    log: Arc<AuditLog>,
    listening: AtomicBool,
}

impl Injectable for ServerObserver {
    fn injections() -> Vec<Injection> {
        vec![
            Injection::key("config#server.host"),
            Injection::key("config#server.port"),
            Injection::key("audit.log"),
        ]
    }

    fn construct(args: ResolvedArgs) -> ContextResult<Self> {
        let host = args.value::<Value>(0)?;
        let port = args.value::<Value>(1)?;
        Ok(Self {
            address: format!("{}:{}", host.as_str().unwrap_or("0.0.0.0"), port),
            log: args.value::<AuditLog>(2)?,
            listening: AtomicBool::new(false),
        })
    }

    fn binding_spec() -> BindingSpec {
        BindingSpec::new().tag("server")
    }
}

impl ServerObserver {
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LifeCycleObserver for ServerObserver {
    async fn start(&self) -> Result<(), BoxError> {
        info!(address = %self.address, "Server listening");
        self.listening.store(true, Ordering::SeqCst);
        self.log.record(format!("server: listening on {}", self.address));
        Ok(())
    }

    async fn stop(&self) -> Result<(), BoxError> {
        info!(address = %self.address, "Server stopped");
        self.listening.store(false, Ordering::SeqCst);
        self.log.record("server: stopped");
        Ok(())
    }
}
