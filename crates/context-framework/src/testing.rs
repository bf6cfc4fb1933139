//! # Test Doubles
//!
//! Small recording implementations of the framework traits, shared by the unit tests,
//! the integration tests and downstream crates. They all write into an [`EventLog`], so a
//! test can assert on the exact order in which things happened across observers,
//! interceptors and context events.
//!
//! | Double | Implements | Records |
//! |--------|------------|---------|
//! | [`RecordingObserver`] | [`LifeCycleObserver`] | `<name>-start`, `<name>-stop` |
//! | [`RecordingInterceptor`] | [`Interceptor`] | `<name>: before-<method>`, `<name>: after-<method>` |
//! | [`RecordingContextObserver`] | [`ContextEventObserver`] | `<event>:<key>` |
//! | [`CountingFactory`] | a dynamic value factory | number of calls |
//!
//! <details>
//! <summary><b>Life cycle order</b></summary>
//!
//! ```rust
//! use context_framework::lifecycle::{as_life_cycle_observer, life_cycle_group, LifeCycleObserverRegistry};
//! use context_framework::testing::{EventLog, RecordingObserver};
//! use context_framework::Context;
//!
//! #[tokio::main]
//! async fn main() {
//!     let ctx = Context::new();
//!     let log = EventLog::new();
//!     for (name, group) in [("web", "server"), ("db", "datasource")] {
//!         ctx.bind(&format!("observers.{name}"))
//!             .unwrap()
//!             .to(RecordingObserver::new(name, &log))
//!             .apply(as_life_cycle_observer::<RecordingObserver>())
//!             .apply(life_cycle_group(group));
//!     }
//!
//!     let registry = LifeCycleObserverRegistry::new(&ctx);
//!     registry.set_ordered_groups(vec!["datasource".into(), "server".into()]);
//!     registry.start().await.unwrap();
//!     assert_eq!(log.take(), vec!["db-start", "web-start"]);
//! }
//! ```
//! </details>
//!
//! <details>
//! <summary><b>Scopes with a counting factory</b></summary>
//!
//! ```rust
//! use context_framework::testing::CountingFactory;
//! use context_framework::{BindingScope, Context};
//!
//! let ctx = Context::new();
//! let counter = CountingFactory::new();
//! let factory = counter.clone();
//! ctx.bind("n").unwrap().to_dynamic_value(move || factory.next()).in_scope(BindingScope::Singleton);
//! ctx.get_sync::<usize>("n").unwrap();
//! ctx.get_sync::<usize>("n").unwrap();
//! assert_eq!(counter.count(), 1);
//! ```
//! </details>

use crate::binding::Binding;
use crate::binding_filter::BindingFilter;
use crate::error::{BoxError, ContextResult};
use crate::interceptor::{Interceptor, InvocationContext, Next};
use crate::lifecycle::LifeCycleObserver;
use crate::subscription::{ContextEvent, ContextEventObserver};
use async_trait::async_trait;
use futures::channel::oneshot;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A shared, ordered log of strings.
#[derive(Clone, Debug, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Returns the entries and clears the log.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// Life cycle observer recording `<name>-start` and `<name>-stop`.
#[derive(Clone, Debug)]
pub struct RecordingObserver {
    name: String,
    log: EventLog,
    fail_on_start: bool,
    start_delay: Option<Duration>,
}

impl RecordingObserver {
    pub fn new(name: impl Into<String>, log: &EventLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            fail_on_start: false,
            start_delay: None,
        }
    }

    /// Makes `start` fail after recording.
    pub fn failing(mut self) -> Self {
        self.fail_on_start = true;
        self
    }

    /// Makes `start` wait for `delay` before recording.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }
}

/// Resolves after `delay` without depending on an async runtime's timer.
async fn sleep(delay: Duration) {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        std::thread::sleep(delay);
        let _ = tx.send(());
    });
    let _ = rx.await;
}

#[async_trait]
impl LifeCycleObserver for RecordingObserver {
    async fn start(&self) -> Result<(), BoxError> {
        if let Some(delay) = self.start_delay {
            sleep(delay).await;
        }
        self.log.push(format!("{}-start", self.name));
        if self.fail_on_start {
            return Err(format!("{} failed", self.name).into());
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), BoxError> {
        self.log.push(format!("{}-stop", self.name));
        Ok(())
    }
}

/// Interceptor recording `<name>: before-<method>` and `<name>: after-<method>`.
#[derive(Clone, Debug)]
pub struct RecordingInterceptor {
    name: String,
    log: EventLog,
}

impl RecordingInterceptor {
    pub fn new(name: impl Into<String>, log: &EventLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
        }
    }
}

#[async_trait]
impl Interceptor for RecordingInterceptor {
    async fn intercept(&self, invocation: &mut InvocationContext, next: Next<'_>) -> ContextResult<Value> {
        self.log
            .push(format!("{}: before-{}", self.name, invocation.method_name));
        let result = next.run(invocation).await;
        self.log
            .push(format!("{}: after-{}", self.name, invocation.method_name));
        result
    }
}

/// Context event observer recording `<event>:<key>`.
pub struct RecordingContextObserver {
    log: EventLog,
    filter: Option<BindingFilter>,
}

impl RecordingContextObserver {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            filter: None,
        }
    }

    /// Only records events of bindings accepted by `filter`.
    pub fn with_filter(mut self, filter: BindingFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl ContextEventObserver for RecordingContextObserver {
    fn filter(&self, binding: &Binding) -> bool {
        self.filter.as_ref().map_or(true, |f| f(binding))
    }

    fn observe(&self, event: &ContextEvent) {
        self.log
            .push(format!("{}:{}", event.event_type, event.binding.key()));
    }
}

/// Counts its invocations; `next()` returns the new count.
#[derive(Clone, Debug, Default)]
pub struct CountingFactory(Arc<AtomicUsize>);

impl CountingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding_filter::filter_by_tag;
    use crate::context::Context;

    #[test]
    fn test_recording_context_observer() {
        let ctx = Context::new();
        let log = EventLog::new();
        ctx.subscribe(Arc::new(
            RecordingContextObserver::new(&log).with_filter(filter_by_tag("x")),
        ));
        ctx.add(Binding::bind("a").to(1u8).tag("x")).unwrap();
        ctx.add(Binding::bind("b").to(2u8)).unwrap();
        ctx.bind("c").unwrap().to(3u8).tag("x");
        ctx.unbind("a").unwrap();
        assert_eq!(log.take(), vec!["bind:a", "changed:c", "unbind:a"]);
    }

    #[test]
    fn test_counting_factory() {
        let counter = CountingFactory::new();
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.count(), 2);
    }
}
