//! # Interceptors
//!
//! An [`Interceptor`] wraps method calls made through an [`InterceptionProxy`]. It sees
//! the [`InvocationContext`] (target, method, arguments, source) and decides whether and
//! how to continue with [`Next::run`].
//!
//! ## Chain Order
//!
//! For every invocation the chain is assembled from three levels:
//!
//! 1. **Global** interceptors: bindings tagged `globalInterceptor` in the context chain,
//!    ordered by their `globalInterceptorGroup` tag against the optional
//!    `globalInterceptor.orderedGroups` binding.
//! 2. **Class** interceptors from [`Injectable::class_interceptors`].
//! 3. **Method** interceptors from [`Injectable::method_interceptors`].
//!
//! An interceptor listed on more than one level runs once, at its latest position.
//!
//! ```text
//! proxy.invoke("greet", args)
//!   -> global[0] -> global[1] -> class[0] -> method[0] -> Greeter::invoke_method("greet")
//!   <-          <-            <-          <-           <- result
//! ```
//!
//! ## Proxies
//!
//! Resolving a class binding with `as_proxy_with_interceptors` yields an
//! `InterceptionProxy` instead of the instance. Its source is the resolution session, so
//! interceptors can tell which binding path asked for it (`controller --> service`).
//! Interceptors referenced by key are resolved in a child context of the one that
//! created the proxy, fresh for each invocation.

use crate::binding::Binding;
use crate::binding_sorter::compare_bindings_by_tag;
use crate::context::Context;
use crate::error::{ContextError, ContextResult};
use crate::injection::{short_type_name, Injectable};
use crate::keys::{context_bindings, context_tags};
use crate::resolution_session::{ResolutionOptions, ResolutionSession};
use crate::value::BoxedValue;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Intercepts method invocations on proxied instances.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, invocation: &mut InvocationContext, next: Next<'_>) -> ContextResult<Value>;
}

/// An interceptor given directly or by binding key.
#[derive(Clone)]
pub enum InterceptorRef {
    Instance(Arc<dyn Interceptor>),
    Key(String),
}

impl InterceptorRef {
    pub fn instance<I: Interceptor + 'static>(interceptor: I) -> Self {
        InterceptorRef::Instance(Arc::new(interceptor))
    }

    pub fn key(key: impl Into<String>) -> Self {
        InterceptorRef::Key(key.into())
    }

    fn same_as(&self, other: &InterceptorRef) -> bool {
        match (self, other) {
            (InterceptorRef::Key(a), InterceptorRef::Key(b)) => a == b,
            (InterceptorRef::Instance(a), InterceptorRef::Instance(b)) => {
                std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
            }
            _ => false,
        }
    }
}

impl fmt::Debug for InterceptorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptorRef::Instance(_) => f.write_str("Instance(..)"),
            InterceptorRef::Key(key) => write!(f, "Key({key})"),
        }
    }
}

impl From<&str> for InterceptorRef {
    fn from(key: &str) -> Self {
        InterceptorRef::Key(key.to_string())
    }
}

/// Appends `later` to `earlier`, dropping entries of `earlier` that `later` repeats.
pub fn merge_interceptors(earlier: Vec<InterceptorRef>, later: Vec<InterceptorRef>) -> Vec<InterceptorRef> {
    let mut merged: Vec<InterceptorRef> = earlier
        .into_iter()
        .filter(|i| !later.iter().any(|l| l.same_as(i)))
        .collect();
    merged.extend(later);
    merged
}

/// One method invocation passing through an interceptor chain.
pub struct InvocationContext {
    pub target_name: String,
    pub method_name: String,
    pub args: Vec<Value>,
    /// The resolution session that created the proxy, if any.
    pub source: Option<ResolutionSession>,
    context: Context,
}

impl InvocationContext {
    /// A child context of the proxy's context, private to this invocation.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// `Target.method`
    pub fn description(&self) -> String {
        format!("{}.{}", self.target_name, self.method_name)
    }

    pub fn source_description(&self) -> Option<String> {
        self.source.as_ref().map(ResolutionSession::binding_path)
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("target", &self.target_name)
            .field("method", &self.method_name)
            .field("args", &self.args)
            .field("source", &self.source_description())
            .finish()
    }
}

/// The rest of the chain after the current interceptor.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
    target: &'a dyn InterceptedTarget,
}

impl<'a> Next<'a> {
    pub async fn run(self, invocation: &mut InvocationContext) -> ContextResult<Value> {
        match self.chain.split_first() {
            Some((first, rest)) => {
                let next = Next {
                    chain: rest,
                    target: self.target,
                };
                first.intercept(invocation, next).await
            }
            None => {
                trace!(method = %invocation.description(), "Invoking target");
                self.target
                    .invoke(&invocation.method_name, invocation.args.clone())
                    .await
            }
        }
    }
}

/// A type-erased instance that can be invoked through a proxy.
pub(crate) trait InterceptedTarget: Send + Sync {
    fn target_name(&self) -> &str;
    fn class_interceptors(&self) -> Vec<InterceptorRef>;
    fn method_interceptors(&self, method: &str) -> Vec<InterceptorRef>;
    fn invoke(&self, method: &str, args: Vec<Value>) -> BoxFuture<'static, ContextResult<Value>>;
    fn instance(&self) -> BoxedValue;
}

pub(crate) struct ClassTarget<T: Injectable> {
    instance: Arc<T>,
}

impl<T: Injectable> ClassTarget<T> {
    pub(crate) fn new(instance: Arc<T>) -> Self {
        Self { instance }
    }
}

impl<T: Injectable> InterceptedTarget for ClassTarget<T> {
    fn target_name(&self) -> &str {
        short_type_name::<T>()
    }

    fn class_interceptors(&self) -> Vec<InterceptorRef> {
        T::class_interceptors()
    }

    fn method_interceptors(&self, method: &str) -> Vec<InterceptorRef> {
        T::method_interceptors(method)
    }

    fn invoke(&self, method: &str, args: Vec<Value>) -> BoxFuture<'static, ContextResult<Value>> {
        self.instance.clone().invoke_method(method, args)
    }

    fn instance(&self) -> BoxedValue {
        self.instance.clone()
    }
}

/// Wraps an instance so that its method calls pass through interceptors.
pub struct InterceptionProxy {
    target: Arc<dyn InterceptedTarget>,
    context: Context,
    source: Option<ResolutionSession>,
}

impl InterceptionProxy {
    pub(crate) fn from_target(
        target: Arc<dyn InterceptedTarget>,
        context: &Context,
        source: Option<ResolutionSession>,
    ) -> Self {
        Self {
            target,
            context: context.clone(),
            source,
        }
    }

    pub fn target_name(&self) -> &str {
        self.target.target_name()
    }

    pub fn source(&self) -> Option<&ResolutionSession> {
        self.source.as_ref()
    }

    /// The proxied instance itself, bypassing interceptors.
    pub fn target<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.target.instance().downcast::<T>().ok()
    }

    /// Invokes `method` through global, class and method interceptors.
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> ContextResult<Value> {
        invoke_with_interceptors(&self.context, self.target.as_ref(), method, args, self.source.clone()).await
    }
}

impl fmt::Debug for InterceptionProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptionProxy")
            .field("target", &self.target.target_name())
            .field("context", &self.context.name())
            .field("source", &self.source.as_ref().map(ResolutionSession::binding_path))
            .finish()
    }
}

/// Wraps an instance created outside of a binding.
pub fn create_proxy_with_interceptors<T: Injectable>(
    instance: Arc<T>,
    ctx: &Context,
    source: Option<ResolutionSession>,
) -> InterceptionProxy {
    InterceptionProxy::from_target(Arc::new(ClassTarget::new(instance)), ctx, source)
}

async fn invoke_with_interceptors(
    ctx: &Context,
    target: &dyn InterceptedTarget,
    method: &str,
    args: Vec<Value>,
    source: Option<ResolutionSession>,
) -> ContextResult<Value> {
    let refs = merge_interceptors(
        merge_interceptors(global_interceptors(ctx)?, target.class_interceptors()),
        target.method_interceptors(method),
    );
    let invocation_ctx = Context::builder()
        .name(format!("InvocationContext-{}", uuid::Uuid::new_v4()))
        .parent(ctx)
        .build();

    let mut chain = Vec::with_capacity(refs.len());
    for interceptor in refs {
        chain.push(resolve_interceptor(&invocation_ctx, interceptor).await?);
    }

    let mut invocation = InvocationContext {
        target_name: target.target_name().to_string(),
        method_name: method.to_string(),
        args,
        source,
        context: invocation_ctx,
    };
    debug!(
        method = %invocation.description(),
        interceptors = chain.len(),
        source = ?invocation.source_description(),
        "Invoking with interceptors"
    );
    let next = Next {
        chain: &chain,
        target,
    };
    let result = next.run(&mut invocation).await;
    invocation.context.close();
    result
}

/// Keys of global interceptors visible from `ctx`, in group order.
pub fn global_interceptors(ctx: &Context) -> ContextResult<Vec<InterceptorRef>> {
    let ordered_groups = ctx
        .get_sync_with::<Vec<String>>(
            context_bindings::GLOBAL_INTERCEPTOR_ORDERED_GROUPS,
            &ResolutionOptions::optional(),
        )?
        .map(|groups| groups.as_ref().clone())
        .unwrap_or_default();
    let mut bindings = ctx.find_by_tag(context_tags::GLOBAL_INTERCEPTOR);
    let comparator = compare_bindings_by_tag(context_tags::GLOBAL_INTERCEPTOR_GROUP, ordered_groups);
    bindings.sort_by(|a, b| comparator(a, b));
    Ok(bindings
        .iter()
        .map(|b| InterceptorRef::Key(b.key().to_string()))
        .collect())
}

async fn resolve_interceptor(ctx: &Context, interceptor: InterceptorRef) -> ContextResult<Arc<dyn Interceptor>> {
    let key = match interceptor {
        InterceptorRef::Instance(instance) => return Ok(instance),
        InterceptorRef::Key(key) => key,
    };
    let binding = ctx.get_binding(&key)?;
    let value = ctx
        .get_value_or_promise(key.as_str(), &ResolutionOptions::default())?
        .resolve()
        .await?
        .ok_or_else(|| ContextError::UndefinedValue(key.clone()))?;
    as_interceptor_value(&binding, value).ok_or(ContextError::NotAnInterceptor(key))
}

fn as_interceptor_value(binding: &Binding, value: BoxedValue) -> Option<Arc<dyn Interceptor>> {
    if let Some(interceptor) = binding.cast::<dyn Interceptor>(&value) {
        return Some(interceptor);
    }
    value
        .downcast::<Arc<dyn Interceptor>>()
        .ok()
        .map(|i| i.as_ref().clone())
}

/// Template marking a binding's value as an interceptor of type `T`.
pub fn as_interceptor<T: Interceptor + 'static>() -> impl FnOnce(Binding) -> Binding {
    |binding: Binding| {
        binding.with_capability::<dyn Interceptor, _>(|v: BoxedValue| {
            v.downcast::<T>().ok().map(|i| i as Arc<dyn Interceptor>)
        })
    }
}

/// Template registering a binding as a global interceptor in `group`.
pub fn as_global_interceptor<T: Interceptor + 'static>(group: &str) -> impl FnOnce(Binding) -> Binding {
    let group = group.to_string();
    move |binding: Binding| {
        binding
            .apply(as_interceptor::<T>())
            .tag(context_tags::GLOBAL_INTERCEPTOR)
            .tag((context_tags::GLOBAL_INTERCEPTOR_GROUP, group.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injection::{method_not_found, ResolvedArgs};
    use crate::testing::{EventLog, RecordingInterceptor};
    use futures::FutureExt;
    use serde_json::json;
    struct Guard;

    #[async_trait]
    impl Interceptor for Guard {
        async fn intercept(&self, invocation: &mut InvocationContext, next: Next<'_>) -> ContextResult<Value> {
            if invocation.args.first() == Some(&json!("forbidden")) {
                return Ok(json!("denied"));
            }
            invocation.args = vec![json!(format!("{}!", invocation.args[0].as_str().unwrap_or_default()))];
            next.run(invocation).await
        }
    }

    struct Greeter;

    impl Injectable for Greeter {
        fn construct(_args: ResolvedArgs) -> ContextResult<Self> {
            Ok(Greeter)
        }

        fn class_interceptors() -> Vec<InterceptorRef> {
            vec![InterceptorRef::key("interceptors.class")]
        }

        fn method_interceptors(method: &str) -> Vec<InterceptorRef> {
            match method {
                "greet" => vec![InterceptorRef::key("interceptors.guard")],
                _ => Vec::new(),
            }
        }

        fn invoke_method(self: Arc<Self>, method: &str, args: Vec<Value>) -> BoxFuture<'static, ContextResult<Value>> {
            match method {
                "greet" => async move {
                    let name = args.first().and_then(Value::as_str).unwrap_or("world").to_string();
                    Ok(json!(format!("Hello, {name}")))
                }
                .boxed(),
                _ => method_not_found::<Self>(method),
            }
        }
    }

    fn setup(log: &EventLog) -> Context {
        let ctx = Context::named("app");
        ctx.bind("interceptors.class")
            .unwrap()
            .to(RecordingInterceptor::new("class", log))
            .apply(as_interceptor::<RecordingInterceptor>());
        ctx.bind("interceptors.guard")
            .unwrap()
            .to(Guard)
            .apply(as_interceptor::<Guard>());
        ctx.bind("greeter").unwrap().to_class::<Greeter>();
        ctx
    }

    #[tokio::test]
    async fn test_proxy_runs_chain_in_order() {
        let log = EventLog::new();
        let ctx = setup(&log);
        ctx.bind("globalInterceptors.log")
            .unwrap()
            .to(RecordingInterceptor::new("global", &log))
            .apply(as_global_interceptor::<RecordingInterceptor>("log"));

        let proxy = ctx
            .get_sync_with::<InterceptionProxy>("greeter", &ResolutionOptions::proxy())
            .unwrap()
            .unwrap();
        let result = proxy.invoke("greet", vec![json!("John")]).await.unwrap();
        assert_eq!(result, json!("Hello, John!"));
        assert_eq!(
            log.entries(),
            vec![
                "global: before-greet",
                "class: before-greet",
                "class: after-greet",
                "global: after-greet",
            ]
        );
    }

    #[tokio::test]
    async fn test_interceptor_can_short_circuit() {
        let log = EventLog::new();
        let ctx = setup(&log);
        let proxy = ctx
            .get_sync_with::<InterceptionProxy>("greeter", &ResolutionOptions::proxy())
            .unwrap()
            .unwrap();
        assert_eq!(proxy.invoke("greet", vec![json!("forbidden")]).await.unwrap(), json!("denied"));
        assert!(proxy.target::<Greeter>().is_some());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let ctx = setup(&EventLog::new());
        let proxy = ctx
            .get_sync_with::<InterceptionProxy>("greeter", &ResolutionOptions::proxy())
            .unwrap()
            .unwrap();
        let err = proxy.invoke("wave", vec![]).await.unwrap_err();
        assert_eq!(err.to_string(), "Method 'wave' is not found on Greeter");
    }

    #[tokio::test]
    async fn test_global_interceptor_groups() {
        let log = EventLog::new();
        let ctx = setup(&log);
        ctx.bind(context_bindings::GLOBAL_INTERCEPTOR_ORDERED_GROUPS)
            .unwrap()
            .to(vec!["auth".to_string(), "log".to_string()]);
        ctx.bind("globalInterceptors.log")
            .unwrap()
            .to(RecordingInterceptor::new("log", &log))
            .apply(as_global_interceptor::<RecordingInterceptor>("log"));
        ctx.bind("globalInterceptors.auth")
            .unwrap()
            .to(RecordingInterceptor::new("auth", &log))
            .apply(as_global_interceptor::<RecordingInterceptor>("auth"));

        let keys: Vec<String> = global_interceptors(&ctx)
            .unwrap()
            .into_iter()
            .filter_map(|i| match i {
                InterceptorRef::Key(k) => Some(k),
                InterceptorRef::Instance(_) => None,
            })
            .collect();
        assert_eq!(keys, vec!["globalInterceptors.auth", "globalInterceptors.log"]);
    }

    #[test]
    fn test_proxy_requires_class_binding() {
        let ctx = Context::new();
        ctx.bind("value").unwrap().to_dynamic_value(|| 1_u8);
        let err = ctx
            .get_sync_with::<InterceptionProxy>("value", &ResolutionOptions::proxy())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Binding 'value' (DynamicValue) does not support 'asProxyWithInterceptors'"
        );
    }

    #[test]
    fn test_merge_interceptors() {
        let merged = merge_interceptors(
            vec!["a".into(), "b".into(), "c".into()],
            vec!["b".into(), "d".into()],
        );
        let keys: Vec<String> = merged
            .into_iter()
            .filter_map(|i| match i {
                InterceptorRef::Key(k) => Some(k),
                InterceptorRef::Instance(_) => None,
            })
            .collect();
        assert_eq!(keys, vec!["a", "c", "b", "d"]);
    }

    #[tokio::test]
    async fn test_not_an_interceptor() {
        let ctx = setup(&EventLog::new());
        ctx.bind("interceptors.class").unwrap().to(42_u32);
        let proxy = ctx
            .get_sync_with::<InterceptionProxy>("greeter", &ResolutionOptions::proxy())
            .unwrap()
            .unwrap();
        let err = proxy.invoke("greet", vec![json!("x")]).await.unwrap_err();
        assert!(matches!(err, ContextError::NotAnInterceptor(_)));
    }
}
