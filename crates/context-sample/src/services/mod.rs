//! # Services
//!
//! Plain injectable classes and providers. None of them knows how it gets its
//! dependencies; the application context wires them by key.

use context_framework::{BindingScope, BindingSpec, ContextResult, Injectable, Injection, Provider, ResolvedArgs, ValueOrPromise};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Shared, ordered record of what the application did. Bound under `audit.log`.
#[derive(Clone, Debug, Default)]
pub struct AuditLog(Arc<Mutex<Vec<String>>>);

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Builds greetings from the configured greeting. Bound as `services.greeting`.
pub struct GreetingService {
    greeting: String,
}

impl Injectable for GreetingService {
    fn injections() -> Vec<Injection> {
        vec![Injection::key("config#greeting")]
    }

    fn construct(args: ResolvedArgs) -> ContextResult<Self> {
        let greeting = args.value::<Value>(0)?;
        Ok(Self {
            greeting: greeting.as_str().unwrap_or("Hello").to_string(),
        })
    }

    fn binding_spec() -> BindingSpec {
        BindingSpec::new()
            .scope(BindingScope::Singleton)
            .tag(("namespace", "services"))
            .tag(("name", "greeting"))
    }
}

impl GreetingService {
    pub fn greet(&self, name: &str) -> String {
        format!("{}, {name}!", self.greeting)
    }
}

/// Current time in milliseconds since the epoch, fresh for each resolution.
pub struct TimestampProvider;

impl Injectable for TimestampProvider {
    fn construct(_args: ResolvedArgs) -> ContextResult<Self> {
        Ok(TimestampProvider)
    }
}

impl Provider for TimestampProvider {
    type Value = u64;

    fn value(&self) -> ValueOrPromise<u64> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        ValueOrPromise::Ready(millis)
    }
}
