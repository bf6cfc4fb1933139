//! # Context
//!
//! A [`Context`] is a hierarchical registry of [`Binding`]s. Each context owns its own
//! bindings and may have one parent; lookups for resolution fall through to ancestors,
//! introspection (`contains`, `find`) does not.
//!
//! ## Resolution
//!
//! ```text
//! get("config#db.host")
//!   -> parse key "config", path "db.host"
//!   -> find the binding in this context, else the parent, else its parent, ...
//!   -> binding.get_value(ctx)      scope decides where the cache slot lives
//!   -> project the path            JSON values only
//!   -> wrap in an interception proxy if requested
//! ```
//!
//! Every step yields a [`ValueOrPromise`]: a fully synchronous dependency graph stays
//! synchronous and can be read with [`Context::get_sync`]. As soon as one step is async
//! the whole result is pending and only [`Context::get`] can read it.
//!
//! ## Names and Logging
//!
//! Every context has a name (given or a generated UUID) and its own `tracing` span
//! (`context{name=...}`), entered around registry changes and resolutions.
//!
//! ## Example
//!
//! ```rust,ignore
//! let app = Context::named("app");
//! app.bind("greeting")?.to("hello".to_string());
//! let request = Context::child_of(&app);
//! assert_eq!(*request.get_sync::<String>("greeting")?, "hello");
//! ```

use crate::binding::{Binding, BindingChange, BindingScope};
use crate::binding_filter::{filter_by_tag, BindingFilter, BindingPattern, TagPattern};
use crate::binding_key::BindingKey;
use crate::binding_sorter::BindingComparator;
use crate::context_view::ContextView;
use crate::error::{ContextError, ContextResult};
use crate::interceptor::InterceptionProxy;
use crate::resolution_session::ResolutionOptions;
use crate::subscription::{ContextEvent, ContextEventType, SubscriptionManager};
use crate::value::{downcast_value, BoxedValue, Getter, ValueOrPromise};
use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, Span};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// How `find_or_create_binding` treats an existing binding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BindingCreationPolicy {
    /// Always bind a new binding; fails on a locked key.
    AlwaysCreate,
    /// Never create; fails if the key is not bound in the chain.
    NeverCreate,
    /// Return the binding from the chain, or bind a new one.
    #[default]
    CreateIfNotBound,
}

struct RegistryEntry {
    seq: u64,
    binding: Binding,
    listener: u64,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<String, RegistryEntry>,
    next_seq: u64,
}

impl Registry {
    fn ordered(&self) -> Vec<Binding> {
        let mut entries: Vec<&RegistryEntry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.binding.clone()).collect()
    }
}

pub(crate) struct ContextInner {
    id: u64,
    name: String,
    scope: BindingScope,
    parent: Option<Context>,
    registry: RwLock<Registry>,
    pub(crate) subscriptions: SubscriptionManager,
    span: Span,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        for entry in self.registry.get_mut().entries.values() {
            entry.binding.remove_change_listener(entry.listener);
        }
        if let (Some(parent), Some(id)) = (&self.parent, self.subscriptions.parent_listener.get_mut().take()) {
            parent.remove_listener(id);
        }
    }
}

/// Builder for contexts with a parent, a name or a non-default scope.
#[derive(Default)]
pub struct ContextBuilder {
    name: Option<String>,
    parent: Option<Context>,
    scope: Option<BindingScope>,
}

impl ContextBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn parent(mut self, parent: &Context) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// The scope bindings in `Application`/`Server`/`Request` scope look for.
    pub fn scope(mut self, scope: BindingScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn build(self) -> Context {
        let name = self
            .name
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let span = tracing::debug_span!("context", name = %name);
        Context {
            inner: Arc::new(ContextInner {
                id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                name,
                scope: self.scope.unwrap_or(BindingScope::Context),
                parent: self.parent,
                registry: RwLock::new(Registry::default()),
                subscriptions: SubscriptionManager::new(),
                span,
            }),
        }
    }
}

/// A hierarchical binding registry.
#[derive(Clone)]
pub struct Context {
    pub(crate) inner: Arc<ContextInner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        ContextBuilder::default().build()
    }

    pub fn named(name: impl Into<String>) -> Self {
        ContextBuilder::default().name(name).build()
    }

    pub fn child_of(parent: &Context) -> Self {
        ContextBuilder::default().parent(parent).build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub(crate) fn from_inner(inner: Arc<ContextInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ContextInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Process-unique identity of this context.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn scope(&self) -> BindingScope {
        self.inner.scope
    }

    pub fn parent(&self) -> Option<&Context> {
        self.inner.parent.as_ref()
    }

    fn ancestry(&self) -> impl Iterator<Item = &Context> {
        std::iter::successors(Some(self), |ctx| ctx.parent())
    }

    // ---- registration ----

    /// Creates a binding for `key` and registers it, replacing an unlocked one.
    pub fn bind(&self, key: &str) -> ContextResult<Binding> {
        BindingKey::validate(key)?;
        let binding = Binding::bind(key);
        self.add(binding.clone())?;
        Ok(binding)
    }

    /// Registers an existing binding.
    pub fn add(&self, binding: Binding) -> ContextResult<&Self> {
        let key = binding.key().to_string();
        BindingKey::validate(&key)?;
        let _span = self.inner.span.enter();

        let replaced = {
            let mut registry = self.inner.registry.write();
            let seq = match registry.entries.get(&key) {
                Some(existing) if existing.binding == binding => return Ok(self),
                Some(existing) if existing.binding.is_locked() => {
                    return Err(ContextError::LockedBindingRebind(key));
                }
                Some(existing) => existing.seq,
                None => {
                    registry.next_seq += 1;
                    registry.next_seq
                }
            };
            let listener = binding.on_change(self.change_listener());
            registry.entries.insert(
                key.clone(),
                RegistryEntry {
                    seq,
                    binding: binding.clone(),
                    listener,
                },
            )
        };

        if let Some(old) = replaced {
            old.binding.remove_change_listener(old.listener);
            debug!(key = %key, "Unbind replaced binding");
            self.emit(ContextEventType::Unbind, old.binding);
        }
        debug!(key = %key, "Bind");
        self.emit(ContextEventType::Bind, binding);
        Ok(self)
    }

    /// Removes a binding from this context only. Returns `false` if it is not here.
    pub fn unbind(&self, key: &str) -> ContextResult<bool> {
        BindingKey::validate(key)?;
        let _span = self.inner.span.enter();
        let removed = {
            let mut registry = self.inner.registry.write();
            match registry.entries.get(key) {
                None => return Ok(false),
                Some(entry) if entry.binding.is_locked() => {
                    return Err(ContextError::LockedBindingUnbind(key.to_string()));
                }
                Some(_) => registry.entries.remove(key),
            }
        };
        if let Some(entry) = removed {
            entry.binding.remove_change_listener(entry.listener);
            debug!(key, "Unbind");
            self.emit(ContextEventType::Unbind, entry.binding);
        }
        Ok(true)
    }

    fn change_listener(&self) -> crate::binding::ChangeListener {
        let ctx = self.downgrade();
        Arc::new(move |binding: &Binding, change: BindingChange| {
            if let Some(inner) = ctx.upgrade() {
                let ctx = Context::from_inner(inner);
                debug!(key = %binding.key(), ?change, context = %ctx.name(), "Binding changed");
                ctx.emit(ContextEventType::Changed, binding.clone());
            }
        })
    }

    fn emit(&self, event_type: ContextEventType, binding: Binding) {
        let event = ContextEvent {
            event_type,
            binding,
            context: self.clone(),
        };
        self.emit_event(&event);
    }

    // ---- lookup ----

    /// Checks this context only.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.registry.read().entries.contains_key(key)
    }

    /// Checks this context and its ancestors.
    pub fn is_bound(&self, key: &str) -> bool {
        self.ancestry().any(|ctx| ctx.contains(key))
    }

    /// The first context in the chain that contains `key`.
    pub fn get_owner_context(&self, key: &str) -> Option<Context> {
        self.ancestry().find(|ctx| ctx.contains(key)).cloned()
    }

    /// The first context in the chain that holds this very binding.
    pub(crate) fn owner_of(&self, binding: &Binding) -> Option<Context> {
        self.ancestry()
            .find(|ctx| {
                ctx.inner
                    .registry
                    .read()
                    .entries
                    .get(binding.key())
                    .is_some_and(|e| e.binding == *binding)
            })
            .cloned()
    }

    /// The first context in the chain created with `scope`.
    pub fn get_scoped_context(&self, scope: BindingScope) -> Option<Context> {
        self.ancestry().find(|ctx| ctx.scope() == scope).cloned()
    }

    fn not_found(&self, key: &str) -> ContextError {
        ContextError::BindingNotFound {
            key: key.to_string(),
            context: self.name().to_string(),
        }
    }

    /// Looks up a binding in the chain, failing if it is absent.
    pub fn get_binding(&self, key: &str) -> ContextResult<Binding> {
        self.get_binding_optional(key)?
            .ok_or_else(|| self.not_found(key))
    }

    /// Looks up a binding in the chain.
    pub fn get_binding_optional(&self, key: &str) -> ContextResult<Option<Binding>> {
        BindingKey::validate(key)?;
        Ok(self.ancestry().find_map(|ctx| {
            ctx.inner
                .registry
                .read()
                .entries
                .get(key)
                .map(|e| e.binding.clone())
        }))
    }

    pub fn find_or_create_binding(
        &self,
        key: &str,
        policy: BindingCreationPolicy,
    ) -> ContextResult<Binding> {
        match policy {
            BindingCreationPolicy::AlwaysCreate => self.bind(key),
            BindingCreationPolicy::NeverCreate => self.get_binding(key),
            BindingCreationPolicy::CreateIfNotBound => match self.get_binding_optional(key)? {
                Some(binding) => Ok(binding),
                None => self.bind(key),
            },
        }
    }

    /// Own bindings in registration order.
    pub fn bindings(&self) -> Vec<Binding> {
        self.inner.registry.read().ordered()
    }

    /// Finds own bindings (not ancestors') by glob, regex or predicate.
    pub fn find(&self, pattern: impl Into<BindingPattern>) -> Vec<Binding> {
        let filter = pattern.into().into_filter();
        self.bindings().into_iter().filter(|b| filter(b)).collect()
    }

    /// Finds bindings in this context and its ancestors, own first.
    ///
    /// An ancestor binding is skipped when a closer context holds the same key.
    pub fn find_in_chain(&self, pattern: impl Into<BindingPattern>) -> Vec<Binding> {
        self.find_in_chain_with(&pattern.into().into_filter())
    }

    pub(crate) fn find_in_chain_with(&self, filter: &BindingFilter) -> Vec<Binding> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for ctx in self.ancestry() {
            for binding in ctx.bindings() {
                if seen.insert(binding.key().to_string()) && filter(&binding) {
                    found.push(binding);
                }
            }
        }
        found
    }

    /// Finds bindings in the chain by tag name, tag glob, regex or name/value map.
    pub fn find_by_tag(&self, pattern: impl Into<TagPattern>) -> Vec<Binding> {
        self.find_in_chain_with(&filter_by_tag(pattern))
    }

    // ---- resolution ----

    /// Resolves `key` to a ready or pending value.
    ///
    /// Returns `None` for an optional missing key or a property path that does not exist.
    pub fn get_value_or_promise(
        &self,
        key: impl Into<BindingKey>,
        options: &ResolutionOptions,
    ) -> ContextResult<ValueOrPromise<Option<BoxedValue>>> {
        let key = key.into();
        let _span = self.inner.span.enter();
        debug!(key = %key, "Resolving");

        let binding = match self.get_binding_optional(key.key())? {
            Some(binding) => binding,
            None if options.optional => return Ok(ValueOrPromise::Ready(None)),
            None => return Err(self.not_found(key.key())),
        };
        let session = options.session.clone().unwrap_or_default();
        let proxy = options.as_proxy_with_interceptors.then(|| {
            (binding.clone(), session.with_binding(&binding), self.clone())
        });
        if proxy.is_some() {
            binding.check_proxy_target()?;
        }

        let value = binding.get_value(self, &session)?;
        value.and_then(move |value| {
            let value = match key.property_path() {
                Some(path) => match project(&key, value, path)? {
                    Some(v) => v,
                    None => return Ok(ValueOrPromise::Ready(None)),
                },
                None => value,
            };
            let value = match proxy {
                Some((binding, session, ctx)) => {
                    let target = binding.proxy_target(value)?;
                    Arc::new(InterceptionProxy::from_target(target, &ctx, Some(session))) as BoxedValue
                }
                None => value,
            };
            Ok(ValueOrPromise::Ready(Some(value)))
        })
    }

    /// Resolves and downcasts a value, waiting if necessary.
    pub async fn get<T: Any + Send + Sync>(&self, key: &str) -> ContextResult<Arc<T>> {
        self.get_with::<T>(key, &ResolutionOptions::default())
            .await?
            .ok_or_else(|| ContextError::UndefinedValue(key.to_string()))
    }

    pub async fn get_with<T: Any + Send + Sync>(
        &self,
        key: &str,
        options: &ResolutionOptions,
    ) -> ContextResult<Option<Arc<T>>> {
        let value = self.get_value_or_promise(key, options)?.resolve().await?;
        value.map(|v| downcast_value::<T>(key, v)).transpose()
    }

    /// Resolves and downcasts a value that must be available synchronously.
    pub fn get_sync<T: Any + Send + Sync>(&self, key: &str) -> ContextResult<Arc<T>> {
        self.get_sync_with::<T>(key, &ResolutionOptions::default())?
            .ok_or_else(|| ContextError::UndefinedValue(key.to_string()))
    }

    pub fn get_sync_with<T: Any + Send + Sync>(
        &self,
        key: &str,
        options: &ResolutionOptions,
    ) -> ContextResult<Option<Arc<T>>> {
        let value = self.get_value_or_promise(key, options)?.into_sync(key)?;
        value.map(|v| downcast_value::<T>(key, v)).transpose()
    }

    /// Returns a getter that resolves `key` again on every call.
    pub fn getter(&self, key: impl Into<BindingKey>, optional: bool) -> Getter<Option<BoxedValue>> {
        let ctx = self.clone();
        let key = key.into();
        Getter::new(move || {
            let options = ResolutionOptions::default().with_optional(optional);
            match ctx.get_value_or_promise(key.clone(), &options) {
                Ok(value) => value.into_future(),
                Err(e) => futures::future::ready(Err(e)).boxed(),
            }
        })
    }

    /// Creates a live view of the bindings matching `filter` in this context chain.
    pub fn create_view(&self, filter: BindingFilter, comparator: Option<BindingComparator>) -> ContextView {
        ContextView::new(self, filter, comparator)
    }
}

fn project(key: &BindingKey, value: BoxedValue, path: &str) -> ContextResult<Option<BoxedValue>> {
    let json = value
        .downcast_ref::<serde_json::Value>()
        .ok_or_else(|| ContextError::InvalidPropertyPath {
            key: key.key().to_string(),
            path: path.to_string(),
        })?;
    let mut current = json;
    for segment in path.split('.') {
        let next = match current {
            serde_json::Value::Object(map) => map.get(segment),
            serde_json::Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }
    Ok(Some(Arc::new(current.clone()) as BoxedValue))
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.inner.name)
            .field("scope", &self.inner.scope)
            .field("parent", &self.parent().map(Context::name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding_filter::binding_filter;
    use regex::Regex;

    fn keys(bindings: &[Binding]) -> Vec<&str> {
        bindings.iter().map(Binding::key).collect()
    }

    #[test]
    fn test_generated_names_are_unique() {
        let a = Context::new();
        let b = Context::new();
        assert_ne!(a.name(), b.name());
        assert_eq!(Context::named("app").name(), "app");
    }

    #[test]
    fn test_bind_rejects_separator() {
        let ctx = Context::new();
        let err = ctx.bind("foo#bar").unwrap_err();
        assert!(err.to_string().contains("Binding key foo#bar cannot contain #"));
    }

    #[test]
    fn test_contains_and_is_bound() {
        let parent = Context::named("parent");
        let child = Context::child_of(&parent);
        parent.bind("foo").unwrap();
        assert!(!child.contains("foo"));
        assert!(child.is_bound("foo"));
        assert_eq!(child.get_owner_context("foo"), Some(parent.clone()));
        assert_eq!(child.get_owner_context("bar"), None);
    }

    #[test]
    fn test_unbind_in_child_does_not_touch_parent() {
        let parent = Context::named("parent");
        let child = Context::child_of(&parent);
        parent.bind("foo").unwrap();
        assert!(!child.unbind("foo").unwrap());
        assert!(parent.contains("foo"));
    }

    #[test]
    fn test_locked_binding() {
        let ctx = Context::new();
        ctx.bind("foo").unwrap().lock();
        let rebind = ctx.bind("foo").unwrap_err();
        assert_eq!(rebind.to_string(), "Cannot rebind key \"foo\" to a locked binding");
        let unbind = ctx.unbind("foo").unwrap_err();
        assert_eq!(unbind.to_string(), "Cannot unbind key \"foo\" of a locked binding");
        let add = ctx.add(Binding::bind("foo")).unwrap_err();
        assert!(matches!(add, ContextError::LockedBindingRebind(_)));
    }

    #[test]
    fn test_rebind_keeps_position() {
        let ctx = Context::new();
        ctx.bind("a").unwrap();
        ctx.bind("b").unwrap();
        ctx.bind("a").unwrap();
        assert_eq!(keys(&ctx.bindings()), vec!["a", "b"]);
    }

    #[test]
    fn test_find_by_glob_regex_and_filter() {
        let ctx = Context::new();
        for key in ["foo", "foo.bar", "foo:bar", "bar"] {
            ctx.bind(key).unwrap();
        }
        assert_eq!(keys(&ctx.find("*")), vec!["foo", "bar"]);
        assert_eq!(keys(&ctx.find("ba*")), vec!["bar"]);
        assert_eq!(keys(&ctx.find("*.*")), vec!["foo.bar"]);
        assert_eq!(keys(&ctx.find("*:ba*")), vec!["foo:bar"]);
        assert_eq!(keys(&ctx.find(Regex::new(r"^foo\.").unwrap())), vec!["foo.bar"]);
        assert_eq!(
            keys(&ctx.find(binding_filter(|b| b.key().ends_with("bar")))),
            vec!["foo.bar", "foo:bar", "bar"]
        );
    }

    #[test]
    fn test_find_is_own_level_only() {
        let parent = Context::named("parent");
        let child = Context::child_of(&parent);
        parent.bind("foo").unwrap();
        child.bind("bar").unwrap();
        assert_eq!(keys(&child.find("*")), vec!["bar"]);
        assert_eq!(keys(&child.find_in_chain("*")), vec!["bar", "foo"]);
    }

    #[test]
    fn test_find_in_chain_skips_shadowed() {
        let parent = Context::named("parent");
        let child = Context::child_of(&parent);
        parent.bind("foo").unwrap().tag("x");
        let own = child.bind("foo").unwrap();
        let found = child.find_in_chain("foo");
        assert_eq!(found, vec![own]);
        assert!(child.find_by_tag("x").is_empty());
    }

    #[test]
    fn test_find_by_tag() {
        let ctx = Context::new();
        ctx.bind("my-controller")
            .unwrap()
            .tag("controller")
            .tag(("name", "my-controller"));
        ctx.bind("my-service").unwrap().tag("service");
        assert_eq!(keys(&ctx.find_by_tag("controller")), vec!["my-controller"]);
        assert_eq!(keys(&ctx.find_by_tag("*")), vec!["my-controller", "my-service"]);
        assert_eq!(
            keys(&ctx.find_by_tag(TagPattern::pairs([("name", "my-controller")]))),
            vec!["my-controller"]
        );
        assert_eq!(
            keys(&ctx.find_by_tag(TagPattern::pairs([("name", "my-controller"), ("controller", "x")]))),
            Vec::<&str>::new()
        );
    }

    #[test]
    fn test_get_binding() {
        let ctx = Context::named("app");
        let binding = ctx.bind("foo").unwrap();
        assert_eq!(ctx.get_binding("foo").unwrap(), binding);
        assert!(ctx.get_binding_optional("bar").unwrap().is_none());
        let err = ctx.get_binding("a-new-key").unwrap_err();
        assert_eq!(
            err.to_string(),
            "The key 'a-new-key' is not bound to any value in context app"
        );
    }

    #[test]
    fn test_find_or_create_binding() {
        let parent = Context::named("parent");
        let child = Context::child_of(&parent);
        let existing = parent.bind("foo").unwrap();

        let found = child
            .find_or_create_binding("foo", BindingCreationPolicy::CreateIfNotBound)
            .unwrap();
        assert_eq!(found, existing);

        let created = child
            .find_or_create_binding("foo", BindingCreationPolicy::AlwaysCreate)
            .unwrap();
        assert_ne!(created, existing);
        assert!(child.contains("foo"));

        assert!(child
            .find_or_create_binding("missing", BindingCreationPolicy::NeverCreate)
            .unwrap_err()
            .is_not_found());
        let fresh = child
            .find_or_create_binding("missing", BindingCreationPolicy::default())
            .unwrap();
        assert_eq!(fresh.key(), "missing");

        child.bind("locked").unwrap().lock();
        assert!(child
            .find_or_create_binding("locked", BindingCreationPolicy::AlwaysCreate)
            .is_err());
    }

    #[test]
    fn test_round_trip() {
        let ctx = Context::new();
        ctx.bind("foo").unwrap().to("bar".to_string());
        assert_eq!(*ctx.get_sync::<String>("foo").unwrap(), "bar");
    }

    #[test]
    fn test_get_sync_on_async_value() {
        let ctx = Context::new();
        ctx.bind("foo")
            .unwrap()
            .to_async_dynamic_value(|| async { Ok("bar".to_string()) });
        let err = ctx.get_sync::<String>("foo").unwrap_err();
        assert!(matches!(err, ContextError::AsyncResolution { .. }));
        assert!(err.to_string().contains("foo"));
        assert!(err.to_string().contains("the value is a promise"));
    }

    #[tokio::test]
    async fn test_get_async_value() {
        let ctx = Context::new();
        ctx.bind("foo")
            .unwrap()
            .to_async_dynamic_value(|| async { Ok("bar".to_string()) });
        assert_eq!(*ctx.get::<String>("foo").await.unwrap(), "bar");
    }

    #[test]
    fn test_optional_and_type_mismatch() {
        let ctx = Context::new();
        let missing = ctx
            .get_sync_with::<String>("nope", &ResolutionOptions::optional())
            .unwrap();
        assert!(missing.is_none());
        assert!(ctx.get_sync::<String>("nope").unwrap_err().is_not_found());

        ctx.bind("n").unwrap().to(1_u32);
        let err = ctx.get_sync::<String>("n").unwrap_err();
        assert!(matches!(err, ContextError::TypeMismatch { .. }));
    }

    #[test]
    fn test_property_path() {
        let ctx = Context::new();
        ctx.bind("config")
            .unwrap()
            .to(serde_json::json!({"db": {"host": "localhost", "ports": [5432, 5433]}}));
        let host = ctx.get_sync::<serde_json::Value>("config#db.host").unwrap();
        assert_eq!(*host, serde_json::json!("localhost"));
        let port = ctx.get_sync::<serde_json::Value>("config#db.ports.1").unwrap();
        assert_eq!(*port, serde_json::json!(5433));
        let missing = ctx
            .get_sync_with::<serde_json::Value>("config#db.user", &ResolutionOptions::default())
            .unwrap();
        assert!(missing.is_none());

        ctx.bind("plain").unwrap().to(1_u8);
        let err = ctx.get_sync::<serde_json::Value>("plain#x").unwrap_err();
        assert!(matches!(err, ContextError::InvalidPropertyPath { .. }));
    }

    #[test]
    fn test_alias() {
        let ctx = Context::new();
        ctx.bind("config")
            .unwrap()
            .to(serde_json::json!({"port": 3000}));
        ctx.bind("port").unwrap().to_alias("config#port");
        assert_eq!(*ctx.get_sync::<serde_json::Value>("port").unwrap(), serde_json::json!(3000));
    }

    #[test]
    fn test_scoped_context_lookup() {
        let app = Context::builder()
            .name("app")
            .scope(BindingScope::Application)
            .build();
        let request = Context::builder()
            .parent(&app)
            .scope(BindingScope::Request)
            .build();
        assert_eq!(request.get_scoped_context(BindingScope::Application), Some(app.clone()));
        assert_eq!(request.get_scoped_context(BindingScope::Request), Some(request.clone()));
        assert_eq!(app.get_scoped_context(BindingScope::Server), None);
    }
}
