//! # Dependency Injection
//!
//! Types that a context can construct declare their dependencies up front. There is no
//! reflection: an [`Injectable`] lists its constructor arguments as [`Injection`]s, the
//! context resolves them in order, and `construct` receives the results.
//!
//! ```rust,ignore
//! struct GreetingService {
//!     prefix: Arc<String>,
//! }
//!
//! impl Injectable for GreetingService {
//!     fn injections() -> Vec<Injection> {
//!         vec![Injection::key("greeting.prefix")]
//!     }
//!
//!     fn construct(args: ResolvedArgs) -> ContextResult<Self> {
//!         Ok(Self { prefix: args.value::<String>(0)? })
//!     }
//! }
//!
//! ctx.bind("services.greeting")?.to_class::<GreetingService>();
//! ```
//!
//! ## Injection Kinds
//!
//! | Constructor | Argument |
//! |-------------|----------|
//! | [`Injection::key`] | the value of a key (optionally missing, optionally proxied) |
//! | [`Injection::values`] / [`Injection::tagged`] | values of all bindings matching a filter |
//! | [`Injection::getter`] | a [`Getter`] re-resolving a key on every call |
//! | [`Injection::values_getter`] | a [`Getter`] re-evaluating a filter on every call |
//! | [`Injection::view`] | a live [`ContextView`] |
//! | [`Injection::context`] | the resolving context itself |
//!
//! Arguments resolve through the current [`ResolutionSession`], so a type that ends up
//! depending on itself fails with a `Circular dependency detected` error instead of
//! recursing. If any argument is pending, construction waits for all of them.

use crate::binding_filter::{filter_by_tag, BindingFilter, TagPattern};
use crate::binding_inspector::BindingSpec;
use crate::binding_key::BindingKey;
use crate::binding_sorter::BindingComparator;
use crate::context::Context;
use crate::context_view::{create_view_getter, ContextView};
use crate::error::{ContextError, ContextResult};
use crate::interceptor::{ClassTarget, InterceptedTarget, InterceptorRef};
use crate::resolution_session::{ResolutionOptions, ResolutionSession};
use crate::value::{downcast_value, resolve_list, BoxedValue, Getter, ValueOrPromise};
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A type the context can construct from declared dependencies.
pub trait Injectable: Send + Sync + Sized + 'static {
    /// Constructor arguments, in order.
    fn injections() -> Vec<Injection> {
        Vec::new()
    }

    fn construct(args: ResolvedArgs) -> ContextResult<Self>;

    /// Scope and tags applied by `create_binding_from_class`.
    fn binding_spec() -> BindingSpec {
        BindingSpec::default()
    }

    /// Interceptors applied to every method invoked through a proxy.
    fn class_interceptors() -> Vec<InterceptorRef> {
        Vec::new()
    }

    /// Interceptors applied to one method, after the class interceptors.
    fn method_interceptors(_method: &str) -> Vec<InterceptorRef> {
        Vec::new()
    }

    /// Dispatches a method call made through an [`crate::interceptor::InterceptionProxy`].
    fn invoke_method(self: Arc<Self>, method: &str, _args: Vec<Value>) -> BoxFuture<'static, ContextResult<Value>> {
        method_not_found::<Self>(method)
    }
}

/// A factory type whose binding resolves to `value()` instead of the instance.
pub trait Provider: Injectable {
    type Value: Any + Send + Sync;

    fn value(&self) -> ValueOrPromise<Self::Value>;
}

/// The failure returned for a method an [`Injectable`] does not dispatch.
pub fn method_not_found<T>(method: &str) -> BoxFuture<'static, ContextResult<Value>> {
    let err = ContextError::MethodNotFound {
        target: short_type_name::<T>().to_string(),
        method: method.to_string(),
    };
    futures::future::ready(Err(err)).boxed()
}

/// `my_crate::services::Greeter<T>` becomes `Greeter`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[derive(Clone)]
pub enum InjectionKind {
    Key {
        key: BindingKey,
        optional: bool,
        as_proxy: bool,
    },
    Values {
        filter: BindingFilter,
        comparator: Option<BindingComparator>,
    },
    Getter {
        key: BindingKey,
        optional: bool,
    },
    ValuesGetter {
        filter: BindingFilter,
        comparator: Option<BindingComparator>,
    },
    View {
        filter: BindingFilter,
        comparator: Option<BindingComparator>,
    },
    Context,
}

/// One declared constructor argument.
#[derive(Clone)]
pub struct Injection {
    kind: InjectionKind,
}

impl Injection {
    pub fn key(key: impl Into<BindingKey>) -> Self {
        Self {
            kind: InjectionKind::Key {
                key: key.into(),
                optional: false,
                as_proxy: false,
            },
        }
    }

    pub fn values(filter: BindingFilter) -> Self {
        Self {
            kind: InjectionKind::Values {
                filter,
                comparator: None,
            },
        }
    }

    /// Values of all bindings matching a tag pattern.
    pub fn tagged(pattern: impl Into<TagPattern>) -> Self {
        Self::values(filter_by_tag(pattern))
    }

    pub fn getter(key: impl Into<BindingKey>) -> Self {
        Self {
            kind: InjectionKind::Getter {
                key: key.into(),
                optional: false,
            },
        }
    }

    pub fn values_getter(filter: BindingFilter) -> Self {
        Self {
            kind: InjectionKind::ValuesGetter {
                filter,
                comparator: None,
            },
        }
    }

    pub fn view(filter: BindingFilter) -> Self {
        Self {
            kind: InjectionKind::View {
                filter,
                comparator: None,
            },
        }
    }

    pub fn context() -> Self {
        Self {
            kind: InjectionKind::Context,
        }
    }

    /// Resolves to nothing instead of failing when the key is not bound.
    pub fn optional(mut self) -> Self {
        match &mut self.kind {
            InjectionKind::Key { optional, .. } | InjectionKind::Getter { optional, .. } => {
                *optional = true
            }
            _ => {}
        }
        self
    }

    /// Injects an interception proxy instead of the raw instance.
    pub fn as_proxy(mut self) -> Self {
        if let InjectionKind::Key { as_proxy, .. } = &mut self.kind {
            *as_proxy = true;
        }
        self
    }

    /// Orders the bindings of a filter injection.
    pub fn sorted_by(mut self, cmp: BindingComparator) -> ContextResult<Self> {
        match &mut self.kind {
            InjectionKind::Values { comparator, .. }
            | InjectionKind::ValuesGetter { comparator, .. }
            | InjectionKind::View { comparator, .. } => {
                *comparator = Some(cmp);
                Ok(self)
            }
            _ => Err(ContextError::Injection(
                "Binding comparator is only allowed with a binding filter".to_string(),
            )),
        }
    }

    pub fn kind(&self) -> &InjectionKind {
        &self.kind
    }

    /// The key this injection resolves, if it resolves a single key.
    pub fn binding_key(&self) -> Option<&BindingKey> {
        match &self.kind {
            InjectionKind::Key { key, .. } | InjectionKind::Getter { key, .. } => Some(key),
            _ => None,
        }
    }

    pub(crate) fn describe(&self, target_name: &str) -> Value {
        match &self.kind {
            InjectionKind::Key { key, optional, as_proxy } => json!({
                "targetName": target_name,
                "bindingKey": key.to_string(),
                "optional": optional,
                "asProxyWithInterceptors": as_proxy,
            }),
            InjectionKind::Getter { key, optional } => json!({
                "targetName": target_name,
                "bindingKey": key.to_string(),
                "optional": optional,
                "resolve": "getter",
            }),
            InjectionKind::Values { .. } => json!({"targetName": target_name, "resolve": "values"}),
            InjectionKind::ValuesGetter { .. } => json!({"targetName": target_name, "resolve": "valuesGetter"}),
            InjectionKind::View { .. } => json!({"targetName": target_name, "resolve": "view"}),
            InjectionKind::Context => json!({"targetName": target_name, "resolve": "context"}),
        }
    }

    fn resolve(
        &self,
        ctx: &Context,
        session: &ResolutionSession,
    ) -> ContextResult<ValueOrPromise<Injected>> {
        match &self.kind {
            InjectionKind::Key { key, optional, as_proxy } => {
                let options = ResolutionOptions::default()
                    .with_optional(*optional)
                    .with_proxy(*as_proxy)
                    .with_session(session.clone());
                Ok(ctx.get_value_or_promise(key.clone(), &options)?.map(Injected::Value))
            }
            InjectionKind::Values { filter, comparator } => {
                let mut bindings = ctx.find_in_chain_with(filter);
                if let Some(comparator) = comparator {
                    bindings.sort_by(|a, b| comparator(a, b));
                }
                let mut items = Vec::with_capacity(bindings.len());
                for binding in &bindings {
                    items.push(binding.get_value(ctx, session)?);
                }
                Ok(resolve_list(items).map(Injected::Values))
            }
            InjectionKind::Getter { key, optional } => Ok(ValueOrPromise::Ready(Injected::Getter(
                ctx.getter(key.clone(), *optional),
            ))),
            InjectionKind::ValuesGetter { filter, comparator } => Ok(ValueOrPromise::Ready(
                Injected::ValuesGetter(create_view_getter(ctx, filter.clone(), comparator.clone())),
            )),
            InjectionKind::View { filter, comparator } => Ok(ValueOrPromise::Ready(Injected::View(
                ctx.create_view(filter.clone(), comparator.clone()),
            ))),
            InjectionKind::Context => Ok(ValueOrPromise::Ready(Injected::Context(ctx.clone()))),
        }
    }
}

impl fmt::Debug for Injection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            InjectionKind::Key { key, optional, as_proxy } => f
                .debug_struct("Key")
                .field("key", &key.to_string())
                .field("optional", optional)
                .field("as_proxy", as_proxy)
                .finish(),
            InjectionKind::Getter { key, optional } => f
                .debug_struct("Getter")
                .field("key", &key.to_string())
                .field("optional", optional)
                .finish(),
            InjectionKind::Values { .. } => f.write_str("Values"),
            InjectionKind::ValuesGetter { .. } => f.write_str("ValuesGetter"),
            InjectionKind::View { .. } => f.write_str("View"),
            InjectionKind::Context => f.write_str("Context"),
        }
    }
}

/// A resolved constructor argument.
#[derive(Clone)]
pub enum Injected {
    Value(Option<BoxedValue>),
    Values(Vec<BoxedValue>),
    Getter(Getter<Option<BoxedValue>>),
    ValuesGetter(Getter<Vec<BoxedValue>>),
    View(ContextView),
    Context(Context),
}

impl Injected {
    fn kind_name(&self) -> &'static str {
        match self {
            Injected::Value(_) => "value",
            Injected::Values(_) => "values",
            Injected::Getter(_) => "getter",
            Injected::ValuesGetter(_) => "values getter",
            Injected::View(_) => "view",
            Injected::Context(_) => "context",
        }
    }
}

/// Constructor arguments handed to [`Injectable::construct`].
pub struct ResolvedArgs {
    target: String,
    args: Vec<Injected>,
}

impl ResolvedArgs {
    pub fn new(target: impl Into<String>, args: Vec<Injected>) -> Self {
        Self {
            target: target.into(),
            args,
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    fn target_name(&self, index: usize) -> String {
        format!("{}.constructor[{index}]", self.target)
    }

    fn arg(&self, index: usize) -> ContextResult<&Injected> {
        self.args.get(index).ok_or_else(|| {
            ContextError::Injection(format!("{} is not declared", self.target_name(index)))
        })
    }

    fn wrong_kind(&self, index: usize, expected: &str, actual: &Injected) -> ContextError {
        ContextError::Injection(format!(
            "{} is a {}, not a {expected}",
            self.target_name(index),
            actual.kind_name()
        ))
    }

    /// The raw value of a key injection; `None` when optional and unbound.
    pub fn raw(&self, index: usize) -> ContextResult<Option<BoxedValue>> {
        match self.arg(index)? {
            Injected::Value(value) => Ok(value.clone()),
            other => Err(self.wrong_kind(index, "value", other)),
        }
    }

    pub fn value<T: Any + Send + Sync>(&self, index: usize) -> ContextResult<Arc<T>> {
        self.optional::<T>(index)?
            .ok_or_else(|| ContextError::UndefinedValue(self.target_name(index)))
    }

    pub fn optional<T: Any + Send + Sync>(&self, index: usize) -> ContextResult<Option<Arc<T>>> {
        self.raw(index)?
            .map(|v| downcast_value::<T>(&self.target_name(index), v))
            .transpose()
    }

    pub fn values<T: Any + Send + Sync>(&self, index: usize) -> ContextResult<Vec<Arc<T>>> {
        match self.arg(index)? {
            Injected::Values(values) => values
                .iter()
                .map(|v| downcast_value::<T>(&self.target_name(index), v.clone()))
                .collect(),
            other => Err(self.wrong_kind(index, "values", other)),
        }
    }

    pub fn raw_values(&self, index: usize) -> ContextResult<Vec<BoxedValue>> {
        match self.arg(index)? {
            Injected::Values(values) => Ok(values.clone()),
            other => Err(self.wrong_kind(index, "values", other)),
        }
    }

    pub fn getter(&self, index: usize) -> ContextResult<Getter<Option<BoxedValue>>> {
        match self.arg(index)? {
            Injected::Getter(getter) => Ok(getter.clone()),
            other => Err(self.wrong_kind(index, "getter", other)),
        }
    }

    /// A getter that downcasts and fails on a missing value.
    pub fn typed_getter<T: Any + Send + Sync>(&self, index: usize) -> ContextResult<Getter<Arc<T>>> {
        let getter = self.getter(index)?;
        let name = self.target_name(index);
        Ok(Getter::new(move || {
            let getter = getter.clone();
            let name = name.clone();
            async move {
                let value = getter
                    .get()
                    .await?
                    .ok_or_else(|| ContextError::UndefinedValue(name.clone()))?;
                downcast_value::<T>(&name, value)
            }
            .boxed()
        }))
    }

    pub fn values_getter(&self, index: usize) -> ContextResult<Getter<Vec<BoxedValue>>> {
        match self.arg(index)? {
            Injected::ValuesGetter(getter) => Ok(getter.clone()),
            other => Err(self.wrong_kind(index, "values getter", other)),
        }
    }

    pub fn view(&self, index: usize) -> ContextResult<ContextView> {
        match self.arg(index)? {
            Injected::View(view) => Ok(view.clone()),
            other => Err(self.wrong_kind(index, "view", other)),
        }
    }

    pub fn context(&self, index: usize) -> ContextResult<Context> {
        match self.arg(index)? {
            Injected::Context(ctx) => Ok(ctx.clone()),
            other => Err(self.wrong_kind(index, "context", other)),
        }
    }
}

/// Resolves declared injections for `type_name` against `ctx`.
pub fn resolve_injections(
    type_name: &str,
    injections: &[Injection],
    ctx: &Context,
    session: &ResolutionSession,
) -> ContextResult<ValueOrPromise<Vec<Injected>>> {
    let mut items = Vec::with_capacity(injections.len());
    for (i, injection) in injections.iter().enumerate() {
        let target_name = format!("{type_name}.constructor[{i}]");
        let session = session.enter_injection(target_name.clone());
        debug!(injection = %target_name, path = %session.resolution_path(), "Resolving injection");
        items.push(injection.resolve(ctx, &session)?);
    }
    Ok(resolve_list(items))
}

type Construct = Arc<dyn Fn(ResolvedArgs) -> ContextResult<ValueOrPromise<BoxedValue>> + Send + Sync>;
type ProxyFactory = Arc<dyn Fn(BoxedValue) -> Option<Arc<dyn InterceptedTarget>> + Send + Sync>;

/// Type-erased constructor of a class or provider binding.
pub(crate) struct ClassFactory {
    pub(crate) type_name: &'static str,
    pub(crate) type_id: TypeId,
    pub(crate) injections: Vec<Injection>,
    construct: Construct,
    proxy: Option<ProxyFactory>,
}

impl ClassFactory {
    pub(crate) fn for_class<T: Injectable>() -> Self {
        Self {
            type_name: short_type_name::<T>(),
            type_id: TypeId::of::<T>(),
            injections: T::injections(),
            construct: Arc::new(|args: ResolvedArgs| -> ContextResult<ValueOrPromise<BoxedValue>> {
                Ok(ValueOrPromise::Ready(Arc::new(T::construct(args)?) as BoxedValue))
            }),
            proxy: Some(Arc::new(|value: BoxedValue| {
                let instance = value.downcast::<T>().ok()?;
                Some(Arc::new(ClassTarget::new(instance)) as Arc<dyn InterceptedTarget>)
            })),
        }
    }

    pub(crate) fn for_provider<P: Provider>() -> Self {
        Self {
            type_name: short_type_name::<P>(),
            type_id: TypeId::of::<P>(),
            injections: P::injections(),
            construct: Arc::new(|args: ResolvedArgs| -> ContextResult<ValueOrPromise<BoxedValue>> {
                let provider = P::construct(args)?;
                Ok(provider.value().map(|v| Arc::new(v) as BoxedValue))
            }),
            proxy: None,
        }
    }

    pub(crate) fn instantiate(
        &self,
        ctx: &Context,
        session: &ResolutionSession,
    ) -> ContextResult<ValueOrPromise<BoxedValue>> {
        let args = resolve_injections(self.type_name, &self.injections, ctx, session)?;
        let construct = self.construct.clone();
        let target = self.type_name;
        args.and_then(move |args| {
            debug!(class = target, "Constructing");
            construct(ResolvedArgs::new(target, args))
        })
    }

    pub(crate) fn proxy(&self, value: BoxedValue) -> Option<Arc<dyn InterceptedTarget>> {
        self.proxy.as_ref().and_then(|proxy| proxy(value))
    }
}
