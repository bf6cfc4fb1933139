//! # Bindings
//!
//! A [`Binding`] is one named unit of resolution inside a [`Context`]. It knows *how* to
//! produce a value (its source), *how long* to keep it (its [`BindingScope`]), which
//! [tags](crate::tags) describe it, and whether it is locked against rebinding.
//!
//! ## Sources
//!
//! | Method | [`BindingType`] | Produces |
//! |--------|-----------------|----------|
//! | [`Binding::to`] | `Constant` | the same value every time |
//! | [`Binding::to_dynamic_value`] | `DynamicValue` | the factory result |
//! | [`Binding::to_async_dynamic_value`] | `DynamicValue` | a pending factory result |
//! | [`Binding::to_class`] | `Class` | an instance built from injected arguments |
//! | [`Binding::to_provider`] | `Provider` | the `value()` of an injected provider |
//! | [`Binding::to_alias`] | `Alias` | the value of another key |
//!
//! ## Scopes
//!
//! - `Transient`: computed on every resolution.
//! - `Context`: cached once per requesting context.
//! - `Singleton`: cached once at the context that owns the binding. Dependencies are
//!   resolved from the owner too, so a child can never leak into a singleton.
//! - `Application` / `Server` / `Request`: cached at the nearest context in the requesting
//!   chain created with that scope.
//!
//! ## Handles
//!
//! `Binding` is a cheap handle (`Arc` inside). Configuration methods take `&self` and
//! return a clone of the handle, so both `ctx.bind("k")?.to(1).lock()` and
//! `binding.tag("x");` work. Every configuration change is reported to the owning
//! context, which turns it into a `Changed` event for views and observers.

use crate::binding_key::BindingKey;
use crate::context::{Context, ContextInner};
use crate::error::{ContextError, ContextResult};
use crate::injection::{ClassFactory, Injectable, Provider};
use crate::interceptor::InterceptedTarget;
use crate::resolution_session::{ResolutionOptions, ResolutionSession};
use crate::tags::{BindingTag, TagMap, TagValue};
use crate::value::{BoxedValue, ValueOrPromise};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Caching discipline for resolved values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingScope {
    #[default]
    Transient,
    Context,
    Singleton,
    Application,
    Server,
    Request,
}

impl BindingScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingScope::Transient => "Transient",
            BindingScope::Context => "Context",
            BindingScope::Singleton => "Singleton",
            BindingScope::Application => "Application",
            BindingScope::Server => "Server",
            BindingScope::Request => "Request",
        }
    }
}

impl fmt::Display for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of source a binding resolves from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum BindingType {
    Constant,
    DynamicValue,
    Class,
    Provider,
    Alias,
}

impl BindingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingType::Constant => "Constant",
            BindingType::DynamicValue => "DynamicValue",
            BindingType::Class => "Class",
            BindingType::Provider => "Provider",
            BindingType::Alias => "Alias",
        }
    }
}

impl fmt::Display for BindingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The aspect of a binding that was reconfigured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingChange {
    Value,
    Scope,
    Tag,
    Lock,
}

pub(crate) type ValueFactory = Arc<dyn Fn() -> ValueOrPromise<BoxedValue> + Send + Sync>;
pub(crate) type ChangeListener = Arc<dyn Fn(&Binding, BindingChange) + Send + Sync>;

#[derive(Clone)]
pub(crate) enum ValueSource {
    Constant(BoxedValue),
    DynamicValue(ValueFactory),
    Class(Arc<ClassFactory>),
    Provider(Arc<ClassFactory>),
    Alias(BindingKey),
}

impl ValueSource {
    fn binding_type(&self) -> BindingType {
        match self {
            ValueSource::Constant(_) => BindingType::Constant,
            ValueSource::DynamicValue(_) => BindingType::DynamicValue,
            ValueSource::Class(_) => BindingType::Class,
            ValueSource::Provider(_) => BindingType::Provider,
            ValueSource::Alias(_) => BindingType::Alias,
        }
    }
}

struct CapabilityCaster<C: ?Sized>(Arc<dyn Fn(BoxedValue) -> Option<Arc<C>> + Send + Sync>);

#[derive(Default)]
struct BindingState {
    scope: BindingScope,
    scope_set: bool,
    source: Option<ValueSource>,
    tags: TagMap,
    locked: bool,
    capabilities: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

struct CacheEntry {
    owner: Weak<ContextInner>,
    value: BoxedValue,
}

struct BindingInner {
    id: u64,
    key: String,
    state: RwLock<BindingState>,
    cache: Mutex<HashMap<u64, CacheEntry>>,
    listeners: Mutex<Vec<(u64, ChangeListener)>>,
}

/// A named, configurable unit of dependency resolution.
#[derive(Clone)]
pub struct Binding {
    inner: Arc<BindingInner>,
}

impl Binding {
    /// Creates a standalone binding. Use [`Context::add`] to register it.
    pub fn bind(key: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(BindingInner {
                id: NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed),
                key: key.into(),
                state: RwLock::new(BindingState::default()),
                cache: Mutex::new(HashMap::new()),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Process-unique identity of this binding instance.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn scope(&self) -> BindingScope {
        self.inner.state.read().scope
    }

    pub(crate) fn scope_is_set(&self) -> bool {
        self.inner.state.read().scope_set
    }

    pub fn binding_type(&self) -> Option<BindingType> {
        self.inner.state.read().source.as_ref().map(ValueSource::binding_type)
    }

    pub fn is_locked(&self) -> bool {
        self.inner.state.read().locked
    }

    pub fn tag_map(&self) -> TagMap {
        self.inner.state.read().tags.clone()
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.inner.state.read().tags.names().map(str::to_string).collect()
    }

    pub fn tag_value(&self, name: &str) -> Option<TagValue> {
        self.inner.state.read().tags.get(name).cloned()
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.inner.state.read().tags.contains(name)
    }

    pub(crate) fn source(&self) -> Option<ValueSource> {
        self.inner.state.read().source.clone()
    }

    /// Key this binding points at when it is an alias.
    pub fn alias_target(&self) -> Option<BindingKey> {
        match self.source() {
            Some(ValueSource::Alias(key)) => Some(key),
            _ => None,
        }
    }

    // ---- configuration ----

    /// Binds a constant value.
    pub fn to<T: Any + Send + Sync>(&self, value: T) -> Self {
        self.to_boxed(Arc::new(value))
    }

    /// Binds an already type-erased constant value.
    pub fn to_boxed(&self, value: BoxedValue) -> Self {
        self.set_source(ValueSource::Constant(value))
    }

    /// Binds a synchronous factory, invoked per resolution according to the scope.
    pub fn to_dynamic_value<T, F>(&self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory: ValueFactory =
            Arc::new(move || ValueOrPromise::Ready(Arc::new(factory()) as BoxedValue));
        self.set_source(ValueSource::DynamicValue(factory))
    }

    /// Binds an asynchronous factory. Resolution through this binding is always pending.
    pub fn to_async_dynamic_value<T, F, Fut>(&self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ContextResult<T>> + Send + 'static,
    {
        let factory: ValueFactory = Arc::new(move || {
            let future = factory();
            ValueOrPromise::pending(async move { future.await.map(|v| Arc::new(v) as BoxedValue) })
        });
        self.set_source(ValueSource::DynamicValue(factory))
    }

    /// Binds a factory that decides per call whether its value is ready or pending.
    pub fn to_value_factory<F>(&self, factory: F) -> Self
    where
        F: Fn() -> ValueOrPromise<BoxedValue> + Send + Sync + 'static,
    {
        self.set_source(ValueSource::DynamicValue(Arc::new(factory)))
    }

    /// Binds a class, constructed from its declared injections.
    pub fn to_class<T: Injectable>(&self) -> Self {
        self.set_source(ValueSource::Class(Arc::new(ClassFactory::for_class::<T>())))
    }

    /// Binds a provider; the binding resolves to the provider's `value()`.
    pub fn to_provider<P: Provider>(&self) -> Self {
        self.set_source(ValueSource::Provider(Arc::new(ClassFactory::for_provider::<P>())))
    }

    /// Makes this binding resolve another key, optionally with a property path.
    pub fn to_alias(&self, key: impl Into<BindingKey>) -> Self {
        self.set_source(ValueSource::Alias(key.into()))
    }

    pub fn tag(&self, tag: impl Into<BindingTag>) -> Self {
        let tag = tag.into();
        self.update(BindingChange::Tag, |state| state.tags.add(tag))
    }

    pub fn tags<I, T>(&self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<BindingTag>,
    {
        let tags: Vec<BindingTag> = tags.into_iter().map(Into::into).collect();
        self.update(BindingChange::Tag, |state| {
            for tag in tags {
                state.tags.add(tag);
            }
        })
    }

    pub fn in_scope(&self, scope: BindingScope) -> Self {
        self.update(BindingChange::Scope, |state| {
            state.scope = scope;
            state.scope_set = true;
        })
    }

    /// Sets the scope only if none was set explicitly.
    pub fn apply_default_scope(&self, scope: BindingScope) -> Self {
        if self.scope_is_set() {
            return self.clone();
        }
        self.in_scope(scope)
    }

    /// Locks the binding. There is no way back.
    pub fn lock(&self) -> Self {
        self.update(BindingChange::Lock, |state| state.locked = true)
    }

    /// Applies a template function, e.g. [`crate::lifecycle::as_life_cycle_observer`].
    pub fn apply<F>(&self, template: F) -> Self
    where
        F: FnOnce(Binding) -> Binding,
    {
        template(self.clone())
    }

    /// Declares that values of this binding can be viewed as `C` (typically a `dyn Trait`).
    pub fn with_capability<C, F>(&self, cast: F) -> Self
    where
        C: ?Sized + 'static,
        F: Fn(BoxedValue) -> Option<Arc<C>> + Send + Sync + 'static,
    {
        let caster: Arc<dyn Any + Send + Sync> = Arc::new(CapabilityCaster::<C>(Arc::new(cast)));
        self.inner
            .state
            .write()
            .capabilities
            .insert(TypeId::of::<C>(), caster);
        self.clone()
    }

    pub fn has_capability<C: ?Sized + 'static>(&self) -> bool {
        self.inner
            .state
            .read()
            .capabilities
            .contains_key(&TypeId::of::<C>())
    }

    /// Views a resolved value of this binding as `C`.
    pub fn cast<C: ?Sized + 'static>(&self, value: &BoxedValue) -> Option<Arc<C>> {
        let caster = self
            .inner
            .state
            .read()
            .capabilities
            .get(&TypeId::of::<C>())
            .cloned()?;
        let caster = caster.downcast_ref::<CapabilityCaster<C>>()?;
        (caster.0)(value.clone())
    }

    fn set_source(&self, source: ValueSource) -> Self {
        self.update(BindingChange::Value, |state| state.source = Some(source))
    }

    fn update<F>(&self, change: BindingChange, f: F) -> Self
    where
        F: FnOnce(&mut BindingState),
    {
        f(&mut *self.inner.state.write());
        if matches!(change, BindingChange::Value | BindingChange::Scope) {
            self.inner.cache.lock().clear();
        }
        self.notify(change);
        self.clone()
    }

    fn notify(&self, change: BindingChange) {
        let listeners: Vec<ChangeListener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(self, change);
        }
    }

    pub(crate) fn on_change(&self, listener: ChangeListener) -> u64 {
        let id = NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, listener));
        id
    }

    pub(crate) fn remove_change_listener(&self, id: u64) {
        self.inner.listeners.lock().retain(|(l, _)| *l != id);
    }

    // ---- resolution ----

    /// Finds the context whose cache slot (and dependency view) applies to `ctx`.
    fn resolution_context(&self, ctx: &Context) -> ContextResult<Context> {
        match self.scope() {
            BindingScope::Transient | BindingScope::Context => Ok(ctx.clone()),
            BindingScope::Singleton => Ok(ctx.owner_of(self).unwrap_or_else(|| ctx.clone())),
            scope => ctx
                .get_scoped_context(scope)
                .ok_or_else(|| ContextError::ScopedContextNotFound {
                    key: self.key().to_string(),
                    scope: scope.to_string(),
                }),
        }
    }

    fn cached_value(&self, ctx: &Context) -> Option<BoxedValue> {
        let cache = self.inner.cache.lock();
        let entry = cache.get(&ctx.id())?;
        entry.owner.upgrade().map(|_| entry.value.clone())
    }

    fn store_value(&self, ctx_id: u64, owner: Weak<ContextInner>, value: BoxedValue) {
        let mut cache = self.inner.cache.lock();
        cache.retain(|_, entry| entry.owner.strong_count() > 0);
        cache.insert(ctx_id, CacheEntry { owner, value });
    }

    /// Returns `true` if a value is cached for the scope slot `ctx` resolves to.
    pub fn is_cached(&self, ctx: &Context) -> bool {
        self.resolution_context(ctx)
            .map(|owner| self.cached_value(&owner).is_some())
            .unwrap_or(false)
    }

    /// Discards the cached value for the scope slot `ctx` resolves to.
    pub fn refresh(&self, ctx: &Context) {
        if let Ok(owner) = self.resolution_context(ctx) {
            self.inner.cache.lock().remove(&owner.id());
        }
    }

    /// Resolves the value of this binding for `ctx`, honoring its scope.
    pub fn get_value(
        &self,
        ctx: &Context,
        session: &ResolutionSession,
    ) -> ContextResult<ValueOrPromise<BoxedValue>> {
        let resolution_ctx = self.resolution_context(ctx)?;
        let scope = self.scope();
        if scope != BindingScope::Transient {
            if let Some(value) = self.cached_value(&resolution_ctx) {
                debug!(key = %self.key(), %scope, context = %resolution_ctx.name(), "Cache hit");
                return Ok(ValueOrPromise::Ready(value));
            }
        }

        let session = session.enter_binding(self)?;
        let value = self.compute(&resolution_ctx, &session)?;
        if scope == BindingScope::Transient {
            return Ok(value);
        }

        let binding = self.clone();
        let ctx_id = resolution_ctx.id();
        let owner = resolution_ctx.downgrade();
        Ok(value.map(move |v| {
            binding.store_value(ctx_id, owner, v.clone());
            v
        }))
    }

    fn compute(
        &self,
        ctx: &Context,
        session: &ResolutionSession,
    ) -> ContextResult<ValueOrPromise<BoxedValue>> {
        match self.source() {
            None => Err(ContextError::NoValue(self.key().to_string())),
            Some(ValueSource::Constant(value)) => Ok(ValueOrPromise::Ready(value)),
            Some(ValueSource::DynamicValue(factory)) => Ok(factory()),
            Some(ValueSource::Class(factory)) | Some(ValueSource::Provider(factory)) => {
                factory.instantiate(ctx, session)
            }
            Some(ValueSource::Alias(target)) => {
                let options = ResolutionOptions::default().with_session(session.clone());
                let display = target.to_string();
                ctx.get_value_or_promise(target, &options)?
                    .and_then(move |value| match value {
                        Some(value) => Ok(ValueOrPromise::Ready(value)),
                        None => Err(ContextError::UndefinedValue(display)),
                    })
            }
        }
    }

    fn unsupported_proxy(&self) -> ContextError {
        ContextError::UnsupportedProxyTarget {
            key: self.key().to_string(),
            binding_type: self
                .binding_type()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "undefined".to_string()),
        }
    }

    /// Fails unless values of this binding can be wrapped in an interception proxy.
    pub(crate) fn check_proxy_target(&self) -> ContextResult<()> {
        match self.source() {
            Some(ValueSource::Class(_)) => Ok(()),
            _ => Err(self.unsupported_proxy()),
        }
    }

    /// Wraps a resolved value for interception; only class bindings support it.
    pub(crate) fn proxy_target(&self, value: BoxedValue) -> ContextResult<Arc<dyn InterceptedTarget>> {
        match self.source() {
            Some(ValueSource::Class(factory)) => factory
                .proxy(value)
                .ok_or_else(|| self.unsupported_proxy()),
            _ => Err(self.unsupported_proxy()),
        }
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Binding {}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Binding")
            .field("key", &self.inner.key)
            .field("scope", &state.scope)
            .field("type", &state.source.as_ref().map(ValueSource::binding_type))
            .field("tags", &state.tags)
            .field("locked", &state.locked)
            .finish()
    }
}
