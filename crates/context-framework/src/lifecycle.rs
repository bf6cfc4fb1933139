//! # Life Cycle Observers
//!
//! Components that need to be started and stopped together (database connections,
//! servers, background jobs) are bound as **life cycle observers**: bindings tagged
//! `lifeCycleObserver` whose values implement [`LifeCycleObserver`].
//!
//! The [`LifeCycleObserverRegistry`] watches those bindings through a [`ContextView`],
//! groups them and drives them:
//!
//! ```text
//!                 ordered_groups = ["datasource", "server"]
//!
//!   start():   [ungrouped] ──▶ [datasource] ──▶ [server]
//!   stop():    [server]    ──▶ [datasource] ──▶ [ungrouped]    (observers reversed too)
//! ```
//!
//! ## Groups
//!
//! The group of a binding is its `lifeCycleObserverGroup` tag. Without that tag, a tag
//! whose name and value both equal one of the ordered groups (e.g. `server`) counts,
//! and otherwise the group is `""`. Groups are ordered like phases (see
//! [`crate::binding_sorter::compare_by_order`]): unknown groups first, then the ordered
//! groups in configured order.
//!
//! ## Parallelism
//!
//! With `parallel = true` all observers of one group are started (or stopped)
//! together and every one of them runs to completion, even when a sibling fails;
//! otherwise one after another. Groups always run one after another.
//!
//! ## Failures
//!
//! A failing observer stops the sequence before the next group (or, in sequential
//! mode, the next observer). Every failure is logged; the first one in binding order
//! is returned as [`ContextError::LifeCycle`].

use crate::binding::{Binding, BindingScope};
use crate::binding_inspector::{create_binding_from_class, ClassBindingOptions};
use crate::binding_filter::filter_by_tag;
use crate::binding_sorter::compare_by_order;
use crate::context::Context;
use crate::context_view::ContextView;
use crate::error::{BoxError, ContextError, ContextResult};
use crate::injection::{Injectable, Injection, ResolvedArgs};
use crate::keys::{core_bindings, core_tags};
use crate::resolution_session::ResolutionSession;
use crate::tags::TagValue;
use crate::value::BoxedValue;
use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A component with optional `start` and `stop` hooks.
#[async_trait]
pub trait LifeCycleObserver: Send + Sync {
    async fn start(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Registry configuration, bindable under `lifeCycleObserver.options`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifeCycleObserverOptions {
    pub ordered_groups: Vec<String>,
    pub parallel: bool,
}

impl Default for LifeCycleObserverOptions {
    fn default() -> Self {
        Self {
            ordered_groups: vec!["server".to_string()],
            parallel: true,
        }
    }
}

/// Observers sharing a group, in start order.
#[derive(Clone, Debug)]
pub struct LifeCycleObserverGroup {
    pub group: String,
    pub bindings: Vec<Binding>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LifeCycleEvent {
    Start,
    Stop,
}

impl LifeCycleEvent {
    fn as_str(&self) -> &'static str {
        match self {
            LifeCycleEvent::Start => "start",
            LifeCycleEvent::Stop => "stop",
        }
    }
}

/// Template tagging a binding as a life cycle observer of type `T`.
pub fn as_life_cycle_observer<T: LifeCycleObserver + 'static>() -> impl FnOnce(Binding) -> Binding {
    |binding: Binding| {
        binding
            .tag(core_tags::LIFE_CYCLE_OBSERVER)
            .with_capability::<dyn LifeCycleObserver, _>(|v: BoxedValue| {
                v.downcast::<T>().ok().map(|o| o as Arc<dyn LifeCycleObserver>)
            })
    }
}

/// Template putting a life cycle observer binding into `group`.
pub fn life_cycle_group(group: &str) -> impl FnOnce(Binding) -> Binding {
    let group = group.to_string();
    move |binding: Binding| binding.tag((core_tags::LIFE_CYCLE_OBSERVER_GROUP, group.as_str()))
}

/// Starts and stops life cycle observers group by group.
pub struct LifeCycleObserverRegistry {
    context: Context,
    observers: ContextView,
    options: RwLock<LifeCycleObserverOptions>,
}

impl Injectable for LifeCycleObserverRegistry {
    fn injections() -> Vec<Injection> {
        vec![
            Injection::context(),
            Injection::view(filter_by_tag(core_tags::LIFE_CYCLE_OBSERVER)),
            Injection::key(core_bindings::LIFE_CYCLE_OBSERVER_OPTIONS).optional(),
        ]
    }

    fn construct(args: ResolvedArgs) -> ContextResult<Self> {
        let options = args
            .optional::<LifeCycleObserverOptions>(2)?
            .map(|o| o.as_ref().clone())
            .unwrap_or_default();
        Ok(Self {
            context: args.context(0)?,
            observers: args.view(1)?,
            options: RwLock::new(options),
        })
    }
}

impl LifeCycleObserverRegistry {
    pub fn new(ctx: &Context) -> Self {
        Self::with_options(ctx, LifeCycleObserverOptions::default())
    }

    pub fn with_options(ctx: &Context, options: LifeCycleObserverOptions) -> Self {
        Self {
            context: ctx.clone(),
            observers: ctx.create_view(filter_by_tag(core_tags::LIFE_CYCLE_OBSERVER), None),
            options: RwLock::new(options),
        }
    }

    pub fn options(&self) -> LifeCycleObserverOptions {
        self.options.read().clone()
    }

    pub fn set_ordered_groups(&self, groups: Vec<String>) {
        self.options.write().ordered_groups = groups;
    }

    pub fn set_parallel(&self, parallel: bool) {
        self.options.write().parallel = parallel;
    }

    /// The group a life cycle observer binding belongs to.
    pub fn observer_group(&self, binding: &Binding) -> String {
        if let Some(TagValue::Text(group)) = binding.tag_value(core_tags::LIFE_CYCLE_OBSERVER_GROUP) {
            if !group.is_empty() {
                return group;
            }
        }
        self.options
            .read()
            .ordered_groups
            .iter()
            .find(|g| binding.tag_value(g).and_then(|v| v.as_str().map(str::to_string)).as_deref() == Some(g.as_str()))
            .cloned()
            .unwrap_or_default()
    }

    /// Observer bindings grouped and sorted in start order.
    pub fn observer_groups_by_order(&self) -> Vec<LifeCycleObserverGroup> {
        let mut groups: Vec<LifeCycleObserverGroup> = Vec::new();
        for binding in self.observers.bindings() {
            let group = self.observer_group(&binding);
            match groups.iter_mut().find(|g| g.group == group) {
                Some(existing) => existing.bindings.push(binding),
                None => groups.push(LifeCycleObserverGroup {
                    group,
                    bindings: vec![binding],
                }),
            }
        }
        let order: Vec<TagValue> = self
            .options
            .read()
            .ordered_groups
            .iter()
            .map(|g| TagValue::from(g.as_str()))
            .collect();
        groups.sort_by(|a, b| {
            compare_by_order(
                Some(&TagValue::from(a.group.as_str())),
                Some(&TagValue::from(b.group.as_str())),
                &order,
            )
        });
        groups
    }

    /// Binds a class observer under `lifeCycleObservers.<name>`, singleton unless the
    /// class declares another scope.
    pub fn add_observer<T>(&self, name: &str) -> ContextResult<Binding>
    where
        T: Injectable + LifeCycleObserver,
    {
        let options = ClassBindingOptions::default()
            .with_namespace(core_bindings::LIFE_CYCLE_OBSERVERS)
            .with_name(name)
            .with_default_scope(BindingScope::Singleton);
        let binding = create_binding_from_class::<T>(&options).apply(as_life_cycle_observer::<T>());
        self.context.add(binding.clone())?;
        Ok(binding)
    }

    /// Registers a handler run on `start`, after the observers registered before it.
    pub fn on_start<F, Fut>(&self, name: &str, handler: F) -> ContextResult<Binding>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.add_handler(name, HandlerObserver::start(handler))
    }

    /// Registers a handler run on `stop`, before the observers registered before it.
    pub fn on_stop<F, Fut>(&self, name: &str, handler: F) -> ContextResult<Binding>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.add_handler(name, HandlerObserver::stop(handler))
    }

    fn add_handler(&self, name: &str, observer: HandlerObserver) -> ContextResult<Binding> {
        let key = format!(
            "{}.{name}_{}",
            core_bindings::LIFE_CYCLE_OBSERVERS,
            uuid::Uuid::new_v4()
        );
        Ok(self
            .context
            .bind(&key)?
            .to(observer)
            .apply(as_life_cycle_observer::<HandlerObserver>()))
    }

    pub async fn start(&self) -> ContextResult<()> {
        info!(context = %self.context.name(), "Starting life cycle observers");
        for group in self.observer_groups_by_order() {
            self.notify_group(&group, LifeCycleEvent::Start).await?;
        }
        info!(context = %self.context.name(), "Life cycle observers started");
        Ok(())
    }

    pub async fn stop(&self) -> ContextResult<()> {
        info!(context = %self.context.name(), "Stopping life cycle observers");
        for mut group in self.observer_groups_by_order().into_iter().rev() {
            group.bindings.reverse();
            self.notify_group(&group, LifeCycleEvent::Stop).await?;
        }
        info!(context = %self.context.name(), "Life cycle observers stopped");
        Ok(())
    }

    async fn notify_group(&self, group: &LifeCycleObserverGroup, event: LifeCycleEvent) -> ContextResult<()> {
        info!(group = %group.group, event = event.as_str(), observers = group.bindings.len(), "Notifying group");
        let mut observers = Vec::with_capacity(group.bindings.len());
        for binding in &group.bindings {
            let value = binding
                .get_value(&self.context, &ResolutionSession::new())?
                .resolve()
                .await?;
            match binding.cast::<dyn LifeCycleObserver>(&value) {
                Some(observer) => observers.push((binding.key().to_string(), observer)),
                None => debug!(key = %binding.key(), "Binding value is not a life cycle observer, skipped"),
            }
        }

        if self.options.read().parallel {
            let results = join_all(
                observers
                    .iter()
                    .map(|(key, observer)| invoke_observer(key, observer.as_ref(), event)),
            )
            .await;
            results.into_iter().collect::<ContextResult<Vec<()>>>()?;
        } else {
            for (key, observer) in &observers {
                invoke_observer(key, observer.as_ref(), event).await?;
            }
        }
        Ok(())
    }
}

async fn invoke_observer(key: &str, observer: &dyn LifeCycleObserver, event: LifeCycleEvent) -> ContextResult<()> {
    debug!(key, event = event.as_str(), "Notifying observer");
    let result = match event {
        LifeCycleEvent::Start => observer.start().await,
        LifeCycleEvent::Stop => observer.stop().await,
    };
    result.map_err(|source| {
        warn!(key, event = event.as_str(), error = %source, "Life cycle observer failed");
        ContextError::LifeCycle {
            key: key.to_string(),
            event: event.as_str(),
            source,
        }
    })
}

type Handler = Arc<dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Observer backing `on_start` / `on_stop`.
struct HandlerObserver {
    on_start: Option<Handler>,
    on_stop: Option<Handler>,
}

impl HandlerObserver {
    fn handler<F, Fut>(f: F) -> Handler
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Arc::new(move || f().boxed())
    }

    fn start<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            on_start: Some(Self::handler(f)),
            on_stop: None,
        }
    }

    fn stop<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            on_start: None,
            on_stop: Some(Self::handler(f)),
        }
    }
}

#[async_trait]
impl LifeCycleObserver for HandlerObserver {
    async fn start(&self) -> Result<(), BoxError> {
        match &self.on_start {
            Some(handler) => handler().await,
            None => Ok(()),
        }
    }

    async fn stop(&self) -> Result<(), BoxError> {
        match &self.on_stop {
            Some(handler) => handler().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EventLog, RecordingObserver};
    use std::time::Duration;

    struct Silent;

    impl LifeCycleObserver for Silent {}

    fn bind_observer(ctx: &Context, name: &str, observer: RecordingObserver) -> Binding {
        ctx.bind(&format!("observers.{name}"))
            .unwrap()
            .to(observer)
            .apply(as_life_cycle_observer::<RecordingObserver>())
    }

    fn observe(ctx: &Context, name: &str, group: &str, log: &EventLog) -> Binding {
        bind_observer(ctx, name, RecordingObserver::new(name, log)).apply(life_cycle_group(group))
    }

    #[tokio::test]
    async fn test_groups_start_in_order_and_stop_in_reverse() {
        let ctx = Context::new();
        let log = EventLog::new();
        observe(&ctx, "1", "g1", &log);
        observe(&ctx, "2", "g2", &log);
        observe(&ctx, "3", "g1", &log);
        let registry = LifeCycleObserverRegistry::new(&ctx);
        registry.set_ordered_groups(vec!["g1".into(), "g2".into()]);

        registry.start().await.unwrap();
        assert_eq!(log.take(), vec!["1-start", "3-start", "2-start"]);
        registry.stop().await.unwrap();
        assert_eq!(log.take(), vec!["2-stop", "3-stop", "1-stop"]);
    }

    #[tokio::test]
    async fn test_sequential_mode_waits_for_each_observer() {
        let ctx = Context::new();
        let log = EventLog::new();
        bind_observer(&ctx, "slow", RecordingObserver::new("slow", &log).delayed(Duration::from_millis(30)));
        bind_observer(&ctx, "fast", RecordingObserver::new("fast", &log));
        let registry = LifeCycleObserverRegistry::new(&ctx);

        registry.set_parallel(false);
        registry.start().await.unwrap();
        assert_eq!(log.take(), vec!["slow-start", "fast-start"]);

        registry.set_parallel(true);
        registry.start().await.unwrap();
        assert_eq!(log.take(), vec!["fast-start", "slow-start"]);
    }

    #[tokio::test]
    async fn test_parallel_failure_lets_siblings_finish() {
        let ctx = Context::new();
        let log = EventLog::new();
        bind_observer(&ctx, "slow", RecordingObserver::new("slow", &log).delayed(Duration::from_millis(20)));
        bind_observer(&ctx, "fails", RecordingObserver::new("fails", &log).failing());
        let registry = LifeCycleObserverRegistry::new(&ctx);

        let err = registry.start().await.unwrap_err();
        assert!(matches!(&err, ContextError::LifeCycle { key, .. } if key == "observers.fails"));
        assert_eq!(log.take(), vec!["fails-start", "slow-start"]);
    }

    #[tokio::test]
    async fn test_parallel_failures_report_first_in_binding_order() {
        let ctx = Context::new();
        let log = EventLog::new();
        bind_observer(
            &ctx,
            "first",
            RecordingObserver::new("first", &log)
                .delayed(Duration::from_millis(20))
                .failing(),
        );
        bind_observer(&ctx, "second", RecordingObserver::new("second", &log).failing());
        let registry = LifeCycleObserverRegistry::new(&ctx);

        let err = registry.start().await.unwrap_err();
        assert!(matches!(&err, ContextError::LifeCycle { key, .. } if key == "observers.first"));
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_hooks_are_skipped() {
        let ctx = Context::new();
        ctx.bind("observers.silent")
            .unwrap()
            .to(Silent)
            .apply(as_life_cycle_observer::<Silent>());
        let registry = LifeCycleObserverRegistry::new(&ctx);
        registry.start().await.unwrap();
        registry.stop().await.unwrap();
    }

    #[test]
    fn test_observer_group() {
        let ctx = Context::new();
        let registry = LifeCycleObserverRegistry::new(&ctx);
        let tagged = Binding::bind("a").tag((core_tags::LIFE_CYCLE_OBSERVER_GROUP, "db"));
        let server = Binding::bind("b").tag("server");
        let plain = Binding::bind("c");
        assert_eq!(registry.observer_group(&tagged), "db");
        assert_eq!(registry.observer_group(&server), "server");
        assert_eq!(registry.observer_group(&plain), "");
    }

    #[tokio::test]
    async fn test_server_group_goes_last() {
        let ctx = Context::new();
        let log = EventLog::new();
        bind_observer(&ctx, "server", RecordingObserver::new("server", &log)).tag("server");
        observe(&ctx, "db", "datasource", &log);

        let registry = LifeCycleObserverRegistry::new(&ctx);
        let groups: Vec<String> = registry
            .observer_groups_by_order()
            .into_iter()
            .map(|g| g.group)
            .collect();
        assert_eq!(groups, vec!["datasource", "server"]);
        registry.start().await.unwrap();
        assert_eq!(log.take(), vec!["db-start", "server-start"]);
    }

    #[tokio::test]
    async fn test_on_start_and_on_stop_handlers() {
        let ctx = Context::new();
        let log = EventLog::new();
        let registry = LifeCycleObserverRegistry::new(&ctx);
        for name in ["a", "b"] {
            let (l1, l2) = (log.clone(), log.clone());
            let started = format!("{name}-start");
            let stopped = format!("{name}-stop");
            registry
                .on_start(name, move || {
                    let (log, entry) = (l1.clone(), started.clone());
                    async move {
                        log.push(entry);
                        Ok(())
                    }
                })
                .unwrap();
            registry
                .on_stop(name, move || {
                    let (log, entry) = (l2.clone(), stopped.clone());
                    async move {
                        log.push(entry);
                        Ok(())
                    }
                })
                .unwrap();
        }
        assert!(ctx
            .find("lifeCycleObservers.*")
            .iter()
            .all(|b| b.key().starts_with("lifeCycleObservers.a_") || b.key().starts_with("lifeCycleObservers.b_")));

        registry.start().await.unwrap();
        assert_eq!(log.take(), vec!["a-start", "b-start"]);
        registry.stop().await.unwrap();
        assert_eq!(log.take(), vec!["b-stop", "a-stop"]);
    }

    struct Tracked {
        log: Arc<EventLog>,
    }

    impl Injectable for Tracked {
        fn injections() -> Vec<Injection> {
            vec![Injection::key("log")]
        }

        fn construct(args: ResolvedArgs) -> ContextResult<Self> {
            Ok(Tracked { log: args.value::<EventLog>(0)? })
        }
    }

    #[async_trait]
    impl LifeCycleObserver for Tracked {
        async fn start(&self) -> Result<(), BoxError> {
            self.log.push("tracked-start");
            Ok(())
        }

        async fn stop(&self) -> Result<(), BoxError> {
            self.log.push("tracked-stop");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_add_observer_binds_singleton_class() {
        let ctx = Context::new();
        let log = EventLog::new();
        ctx.bind("log").unwrap().to(log.clone());
        let registry = LifeCycleObserverRegistry::new(&ctx);
        let binding = registry.add_observer::<Tracked>("tracked").unwrap();
        assert_eq!(binding.key(), "lifeCycleObservers.tracked");
        assert_eq!(binding.scope(), BindingScope::Singleton);

        registry.start().await.unwrap();
        registry.stop().await.unwrap();
        assert_eq!(log.take(), vec!["tracked-start", "tracked-stop"]);
        assert!(binding.is_cached(&ctx));
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let ctx = Context::new();
        let registry = LifeCycleObserverRegistry::new(&ctx);
        registry
            .on_start("broken", || async { Err::<(), BoxError>("disk full".into()) })
            .unwrap();
        let err = registry.start().await.unwrap_err();
        assert!(matches!(err, ContextError::LifeCycle { event: "start", .. }));
        assert!(err.to_string().ends_with("failed to start: disk full"));
    }

    #[tokio::test]
    async fn test_registry_from_context() {
        let ctx = Context::new();
        ctx.bind(core_bindings::LIFE_CYCLE_OBSERVER_OPTIONS)
            .unwrap()
            .to(LifeCycleObserverOptions {
                ordered_groups: vec!["a".into()],
                parallel: false,
            });
        ctx.bind(core_bindings::LIFE_CYCLE_OBSERVER_REGISTRY)
            .unwrap()
            .to_class::<LifeCycleObserverRegistry>();
        let registry = ctx
            .get::<LifeCycleObserverRegistry>(core_bindings::LIFE_CYCLE_OBSERVER_REGISTRY)
            .await
            .unwrap();
        assert_eq!(registry.options().ordered_groups, vec!["a"]);
        assert!(!registry.options().parallel);
    }

    #[test]
    fn test_options_from_json() {
        let options: LifeCycleObserverOptions = serde_json::from_str(r#"{"parallel": false}"#).unwrap();
        assert_eq!(options.ordered_groups, vec!["server"]);
        assert!(!options.parallel);
        let options: LifeCycleObserverOptions =
            serde_json::from_str(r#"{"orderedGroups": ["db", "server"]}"#).unwrap();
        assert_eq!(options.ordered_groups, vec!["db", "server"]);
        assert!(options.parallel);
    }
}
