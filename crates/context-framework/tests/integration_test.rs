use async_trait::async_trait;
use context_framework::binding_filter::filter_by_tag;
use context_framework::interceptor::as_global_interceptor;
use context_framework::lifecycle::{as_life_cycle_observer, life_cycle_group};
use context_framework::testing::{CountingFactory, EventLog, RecordingInterceptor, RecordingObserver};
use context_framework::{
    sort_bindings_by_phase, sort_list_of_groups, Binding, BindingScope, Context, ContextError, ContextEvent,
    ContextResult, Injectable, Injection, InterceptionProxy, InterceptorRef, LifeCycleObserverRegistry,
    ResolutionOptions, ResolvedArgs, TagValue, ViewEventType,
};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn counter_binding(ctx: &Context, key: &str, scope: BindingScope) -> CountingFactory {
    let counter = CountingFactory::new();
    let factory = counter.clone();
    ctx.bind(key)
        .unwrap()
        .to_dynamic_value(move || factory.next())
        .in_scope(scope);
    counter
}

/// Binds a JSON document `{"a": {"b": <call count>}}` produced by a counting factory.
fn json_counter_binding(ctx: &Context, key: &str, scope: BindingScope) -> CountingFactory {
    let counter = CountingFactory::new();
    let factory = counter.clone();
    ctx.bind(key)
        .unwrap()
        .to_dynamic_value(move || json!({"a": {"b": factory.next()}}))
        .in_scope(scope);
    counter
}

#[test]
fn test_constant_round_trip() {
    let ctx = Context::new();
    ctx.bind("foo").unwrap().to("bar".to_string());
    assert_eq!(*ctx.get_sync::<String>("foo").unwrap(), "bar");
}

#[test]
fn test_singleton_is_computed_once_for_all_descendants() {
    let app = Context::named("app");
    let counter = counter_binding(&app, "n", BindingScope::Singleton);
    let req1 = Context::child_of(&app);
    let req2 = Context::child_of(&app);

    let a = req1.get_sync::<usize>("n").unwrap();
    let b = req2.get_sync::<usize>("n").unwrap();
    let c = app.get_sync::<usize>("n").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(counter.count(), 1);
}

#[test]
fn test_context_scope_caches_per_requesting_context() {
    let app = Context::named("app");
    counter_binding(&app, "n", BindingScope::Context);
    let req1 = Context::child_of(&app);
    let req2 = Context::child_of(&app);

    let first = req1.get_sync::<usize>("n").unwrap();
    let second = req2.get_sync::<usize>("n").unwrap();
    assert_ne!(*first, *second);
    assert_eq!(*req1.get_sync::<usize>("n").unwrap(), *first);
    assert_eq!(*req2.get_sync::<usize>("n").unwrap(), *second);
}

#[test]
fn test_transient_computes_every_time() {
    let ctx = Context::new();
    let counter = counter_binding(&ctx, "n", BindingScope::Transient);
    let child = Context::child_of(&ctx);
    assert_eq!(*ctx.get_sync::<usize>("n").unwrap(), 1);
    assert_eq!(*child.get_sync::<usize>("n").unwrap(), 2);
    assert_eq!(*ctx.get_sync::<usize>("n").unwrap(), 3);
    assert_eq!(counter.count(), 3);
}

#[test]
fn test_property_paths_follow_scope_caching() {
    for (scope, calls, last) in [
        (BindingScope::Transient, 3, 2),
        (BindingScope::Singleton, 1, 1),
        (BindingScope::Context, 1, 1),
    ] {
        let ctx = Context::new();
        let counter = json_counter_binding(&ctx, "cfg", scope);
        ctx.get_sync::<Value>("cfg#a.b").unwrap();
        let b = ctx.get_sync::<Value>("cfg#a.b").unwrap();
        let whole = ctx.get_sync::<Value>("cfg").unwrap();
        assert_eq!(counter.count(), calls, "{scope}");
        assert_eq!(*b, json!(last), "{scope}");
        assert_eq!(whole["a"]["b"], json!(calls), "{scope}");
    }
}

#[test]
fn test_locked_binding_cannot_be_rebound_or_unbound() {
    let ctx = Context::new();
    ctx.bind("foo").unwrap().to(1u8).lock();

    let err = ctx.bind("foo").unwrap_err();
    assert_eq!(err.to_string(), "Cannot rebind key \"foo\" to a locked binding");
    let err = ctx.unbind("foo").unwrap_err();
    assert_eq!(err.to_string(), "Cannot unbind key \"foo\" of a locked binding");
    assert!(ctx.contains("foo"));
}

#[test]
fn test_glob_find() {
    let ctx = Context::new();
    for key in ["foo", "foo.bar", "foo:bar"] {
        ctx.bind(key).unwrap().to(0u8);
    }
    let keys = |pattern: &str| -> Vec<String> { ctx.find(pattern).iter().map(|b| b.key().to_string()).collect() };
    assert_eq!(keys("*"), vec!["foo"]);
    assert_eq!(keys("*.*"), vec!["foo.bar"]);
    assert_eq!(keys("*:ba*"), vec!["foo:bar"]);
}

#[test]
fn test_phase_sort_puts_unknown_first() {
    let mut bindings = vec![
        Binding::bind("auth1").tag(("phase", "auth")),
        Binding::bind("plain"),
        Binding::bind("log").tag(("phase", "log")),
        Binding::bind("auth2").tag(("phase", "auth")),
        Binding::bind("other").tag(("phase", "metrics")),
    ];
    sort_bindings_by_phase(
        &mut bindings,
        "phase",
        &[TagValue::from("log"), TagValue::from("auth")],
    );
    let keys: Vec<&str> = bindings.iter().map(|b| b.key()).collect();
    assert_eq!(keys, vec!["plain", "other", "log", "auth1", "auth2"]);
}

#[test]
fn test_cyclic_group_order() {
    let err = sort_list_of_groups(&[vec!["one", "two"], vec!["two", "one"]]).unwrap_err();
    assert!(matches!(err, ContextError::CyclicGroupOrder(_)));
    assert_eq!(
        sort_list_of_groups(&[vec!["a", "b"], vec!["b", "c"]]).unwrap(),
        vec!["a", "b", "c"]
    );
}

#[tokio::test]
async fn test_view_values_are_equal_but_distinct() {
    let ctx = Context::new();
    ctx.bind("a").unwrap().to(1u32).tag("num");
    ctx.bind("b").unwrap().to(2u32).tag("num");
    let view = ctx.create_view(filter_by_tag("num"), None);

    let first = view.values_of::<u32>().await.unwrap();
    let second = view.values_of::<u32>().await.unwrap();
    let as_numbers = |v: &[Arc<u32>]| v.iter().map(|n| **n).collect::<Vec<_>>();
    assert_eq!(as_numbers(&first), vec![1, 2]);
    assert_eq!(as_numbers(&first), as_numbers(&second));
    assert_ne!(first.as_ptr(), second.as_ptr());
}

#[tokio::test]
async fn test_view_ignores_shadowed_parent_changes() {
    let parent = Context::named("parent");
    let child = Context::child_of(&parent);
    parent.bind("bar").unwrap().to("parent".to_string()).tag("foo");
    child.bind("bar").unwrap().to("child".to_string()).tag("foo");

    let view = child.create_view(filter_by_tag("foo"), None);
    let events = Arc::new(Mutex::new(Vec::new()));
    for event_type in [ViewEventType::Bind, ViewEventType::Unbind] {
        let events = events.clone();
        view.on(event_type, move |event| events.lock().push(event.event_type()));
    }

    assert_eq!(view.values_of::<String>().await.unwrap()[0].as_str(), "child");
    parent.bind("bar").unwrap().to("parent 2".to_string()).tag("foo");
    parent.unbind("bar").unwrap();
    assert!(events.lock().is_empty());
    assert_eq!(view.values_of::<String>().await.unwrap()[0].as_str(), "child");
}

#[tokio::test]
async fn test_life_cycle_groups() {
    let ctx = Context::new();
    let log = EventLog::new();
    for (name, group) in [("1", "g1"), ("2", "g2"), ("3", "g1")] {
        ctx.bind(&format!("observers.{name}"))
            .unwrap()
            .to(RecordingObserver::new(name, &log))
            .apply(as_life_cycle_observer::<RecordingObserver>())
            .apply(life_cycle_group(group));
    }
    let registry = LifeCycleObserverRegistry::new(&ctx);
    registry.set_ordered_groups(vec!["g1".into(), "g2".into()]);

    registry.start().await.unwrap();
    assert_eq!(log.take(), vec!["1-start", "3-start", "2-start"]);
    registry.stop().await.unwrap();
    assert_eq!(log.take(), vec!["2-stop", "3-stop", "1-stop"]);
}

#[tokio::test]
async fn test_life_cycle_failure_stops_sequence() {
    let ctx = Context::new();
    let log = EventLog::new();
    for (name, observer) in [
        ("a", RecordingObserver::new("a", &log).failing()),
        ("b", RecordingObserver::new("b", &log)),
    ] {
        ctx.bind(&format!("observers.{name}"))
            .unwrap()
            .to(observer)
            .apply(as_life_cycle_observer::<RecordingObserver>());
    }
    let registry = LifeCycleObserverRegistry::new(&ctx);
    registry.set_parallel(false);

    let err = registry.start().await.unwrap_err();
    assert_eq!(err.to_string(), "Life cycle observer 'observers.a' failed to start: a failed");
    assert_eq!(log.take(), vec!["a-start"]);
}

#[tokio::test]
async fn test_parallel_life_cycle_failure_waits_for_siblings() {
    let ctx = Context::new();
    let log = EventLog::new();
    for (name, observer) in [
        ("fails", RecordingObserver::new("fails", &log).failing()),
        ("slow", RecordingObserver::new("slow", &log).delayed(Duration::from_millis(20))),
    ] {
        ctx.bind(&format!("observers.{name}"))
            .unwrap()
            .to(observer)
            .apply(as_life_cycle_observer::<RecordingObserver>());
    }
    let registry = LifeCycleObserverRegistry::new(&ctx);
    assert!(registry.options().parallel);

    let err = registry.start().await.unwrap_err();
    assert_eq!(err.to_string(), "Life cycle observer 'observers.fails' failed to start: fails failed");
    assert_eq!(log.take(), vec!["fails-start", "slow-start"]);
}

struct MyController {
    name: String,
}

impl Injectable for MyController {
    fn construct(_args: ResolvedArgs) -> ContextResult<Self> {
        Ok(MyController {
            name: "my-controller".to_string(),
        })
    }

    fn class_interceptors() -> Vec<InterceptorRef> {
        vec![InterceptorRef::key("interceptors.source")]
    }

    fn invoke_method(self: Arc<Self>, method: &str, args: Vec<Value>) -> BoxFuture<'static, ContextResult<Value>> {
        match method {
            "hello" => {
                let who = args.first().and_then(Value::as_str).unwrap_or("world").to_string();
                async move { Ok(json!(format!("{} says hello to {who}", self.name))) }.boxed()
            }
            _ => context_framework::injection::method_not_found::<Self>(method),
        }
    }
}

struct DummyController {
    controller: Arc<InterceptionProxy>,
}

impl Injectable for DummyController {
    fn injections() -> Vec<Injection> {
        vec![Injection::key("my-controller").as_proxy()]
    }

    fn construct(args: ResolvedArgs) -> ContextResult<Self> {
        Ok(DummyController {
            controller: args.value::<InterceptionProxy>(0)?,
        })
    }
}

struct SourceRecorder(EventLog);

#[async_trait]
impl context_framework::Interceptor for SourceRecorder {
    async fn intercept(
        &self,
        invocation: &mut context_framework::InvocationContext,
        next: context_framework::Next<'_>,
    ) -> ContextResult<Value> {
        self.0.push(format!(
            "source: {}",
            invocation.source_description().unwrap_or_default()
        ));
        next.run(invocation).await
    }
}

#[tokio::test]
async fn test_proxy_knows_its_source() {
    let ctx = Context::new();
    let log = EventLog::new();
    ctx.bind("interceptors.source").unwrap().to(SourceRecorder(log.clone())).apply(
        |binding: Binding| {
            binding.with_capability::<dyn context_framework::Interceptor, _>(|v| {
                v.downcast::<SourceRecorder>()
                    .ok()
                    .map(|i| i as Arc<dyn context_framework::Interceptor>)
            })
        },
    );
    ctx.bind("globalInterceptors.log")
        .unwrap()
        .to(RecordingInterceptor::new("log", &log))
        .apply(as_global_interceptor::<RecordingInterceptor>("log"));
    ctx.bind("my-controller").unwrap().to_class::<MyController>();
    ctx.bind("dummy-controller").unwrap().to_class::<DummyController>();

    let dummy = ctx.get::<DummyController>("dummy-controller").await.unwrap();
    let result = dummy.controller.invoke("hello", vec![json!("John")]).await.unwrap();
    assert_eq!(result, json!("my-controller says hello to John"));
    assert_eq!(
        log.take(),
        vec![
            "log: before-hello",
            "source: dummy-controller --> my-controller",
            "log: after-hello",
        ]
    );

    let proxy = ctx
        .get_with::<InterceptionProxy>("my-controller", &ResolutionOptions::default().with_proxy(true))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(proxy.source().map(|s| s.binding_path()), Some("my-controller".to_string()));
    assert!(proxy.target::<MyController>().is_some());
}

#[test]
fn test_context_events_reach_child_observers() {
    let parent = Context::new();
    let child = Context::child_of(&parent);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription = child.subscribe(Arc::new(move |event: &ContextEvent| {
        sink.lock()
            .push(format!("{}:{}@{}", event.event_type, event.binding.key(), event.context.name()))
    }));

    parent.add(Binding::bind("x").to(1u8)).unwrap();
    child.add(Binding::bind("y").to(2u8)).unwrap();
    subscription.unsubscribe();
    parent.add(Binding::bind("z").to(3u8)).unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            format!("bind:x@{}", parent.name()),
            format!("bind:y@{}", child.name()),
        ]
    );
}
