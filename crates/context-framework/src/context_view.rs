//! # Context Views
//!
//! A [`ContextView`] is a live, filtered and ordered query over a context chain. It
//! keeps two caches:
//!
//! - the matched **bindings**, computed on first access from `find_in_chain` and sorted
//!   by the optional comparator (stable, so ties keep registration order);
//! - the resolved **values** of those bindings, computed on first `values()`/`resolve()`.
//!
//! Both caches are dropped whenever membership may have changed: a matching binding
//! is bound or unbound, or a binding's reconfiguration makes it start or stop matching.
//! Events of shadowed ancestor bindings never reach the view (see
//! [`crate::subscription`]).
//!
//! ## Events
//!
//! | Event | When |
//! |-------|------|
//! | `Bind` | a matching binding was added |
//! | `Unbind` | a matching binding was removed; carries its cached value, if any |
//! | `Refresh` | the caches were dropped |
//! | `Resolve` | values were computed (not when served from the cache) |
//! | `Close` | the view was closed, once |
//!
//! After [`ContextView::close`] the view no longer follows the context. Bindings
//! captured at that moment, and values resolved from them, stay available.

use crate::binding::Binding;
use crate::binding_filter::BindingFilter;
use crate::binding_sorter::BindingComparator;
use crate::context::Context;
use crate::error::{ContextError, ContextResult};
use crate::resolution_session::ResolutionSession;
use crate::subscription::{ContextEvent, ContextEventObserver, ContextEventType, Subscription};
use crate::value::{downcast_value, resolve_list, BoxedValue, Getter, ValueOrPromise};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewEventType {
    Bind,
    Unbind,
    Refresh,
    Resolve,
    Close,
}

/// An event emitted by a [`ContextView`].
#[derive(Clone)]
pub enum ViewEvent {
    Bind(ContextEvent),
    Unbind {
        event: ContextEvent,
        cached_value: Option<BoxedValue>,
    },
    Refresh,
    Resolve(Vec<BoxedValue>),
    Close,
}

impl ViewEvent {
    pub fn event_type(&self) -> ViewEventType {
        match self {
            ViewEvent::Bind(_) => ViewEventType::Bind,
            ViewEvent::Unbind { .. } => ViewEventType::Unbind,
            ViewEvent::Refresh => ViewEventType::Refresh,
            ViewEvent::Resolve(_) => ViewEventType::Resolve,
            ViewEvent::Close => ViewEventType::Close,
        }
    }
}

impl fmt::Debug for ViewEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewEvent::Bind(event) => f.debug_tuple("Bind").field(event).finish(),
            ViewEvent::Unbind { event, cached_value } => f
                .debug_struct("Unbind")
                .field("event", event)
                .field("cached", &cached_value.is_some())
                .finish(),
            ViewEvent::Refresh => f.write_str("Refresh"),
            ViewEvent::Resolve(values) => write!(f, "Resolve({} values)", values.len()),
            ViewEvent::Close => f.write_str("Close"),
        }
    }
}

pub type ViewEventHandler = Arc<dyn Fn(&ViewEvent) + Send + Sync>;

#[derive(Default)]
struct ViewState {
    tracked: HashSet<u64>,
    bindings: Option<Vec<Binding>>,
    values: Option<Vec<(u64, BoxedValue)>>,
    generation: u64,
    closed: bool,
}

struct ViewInner {
    context: Context,
    filter: BindingFilter,
    comparator: Option<BindingComparator>,
    state: Mutex<ViewState>,
    handlers: Mutex<Vec<(u64, ViewEventType, ViewEventHandler)>>,
    subscription: Subscription,
}

impl Drop for ViewInner {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

struct ViewObserver {
    view: Weak<ViewInner>,
}

impl ContextEventObserver for ViewObserver {
    fn observe(&self, event: &ContextEvent) {
        if let Some(inner) = self.view.upgrade() {
            ContextView { inner }.handle(event);
        }
    }
}

/// A live, filtered, ordered and cached query over a context chain.
#[derive(Clone)]
pub struct ContextView {
    inner: Arc<ViewInner>,
}

impl ContextView {
    pub fn new(context: &Context, filter: BindingFilter, comparator: Option<BindingComparator>) -> Self {
        let tracked = context
            .find_in_chain_with(&filter)
            .iter()
            .map(Binding::id)
            .collect();
        let inner = Arc::new_cyclic(|view: &Weak<ViewInner>| {
            let observer = Arc::new(ViewObserver { view: view.clone() });
            ViewInner {
                context: context.clone(),
                filter,
                comparator,
                state: Mutex::new(ViewState {
                    tracked,
                    ..ViewState::default()
                }),
                handlers: Mutex::new(Vec::new()),
                subscription: context.subscribe(observer),
            }
        });
        debug!(context = %context.name(), "View created");
        Self { inner }
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    fn handle(&self, event: &ContextEvent) {
        let matches = (self.inner.filter)(&event.binding);
        let id = event.binding.id();
        let was_tracked = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            let was = state.tracked.contains(&id);
            match event.event_type {
                ContextEventType::Bind | ContextEventType::Changed if matches => {
                    state.tracked.insert(id);
                }
                _ => {
                    state.tracked.remove(&id);
                }
            }
            was
        };

        match event.event_type {
            ContextEventType::Bind if matches => {
                self.emit(&ViewEvent::Bind(event.clone()));
                self.refresh();
            }
            ContextEventType::Unbind if matches || was_tracked => {
                let cached_value = self.cached_value_of(id);
                self.emit(&ViewEvent::Unbind {
                    event: event.clone(),
                    cached_value,
                });
                self.refresh();
            }
            ContextEventType::Changed => match (was_tracked, matches) {
                (false, true) => {
                    self.emit(&ViewEvent::Bind(event.clone()));
                    self.refresh();
                }
                (true, false) => {
                    let cached_value = self.cached_value_of(id);
                    self.emit(&ViewEvent::Unbind {
                        event: event.clone(),
                        cached_value,
                    });
                    self.refresh();
                }
                (true, true) => self.refresh(),
                (false, false) => {}
            },
            _ => {}
        }
    }

    fn cached_value_of(&self, binding_id: u64) -> Option<BoxedValue> {
        self.inner
            .state
            .lock()
            .values
            .as_ref()?
            .iter()
            .find(|(id, _)| *id == binding_id)
            .map(|(_, v)| v.clone())
    }

    /// Drops the cached bindings and values. A closed view stays frozen.
    pub fn refresh(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.bindings = None;
            state.values = None;
            state.generation += 1;
        }
        debug!(context = %self.inner.context.name(), "View refreshed");
        self.emit(&ViewEvent::Refresh);
    }

    /// The matched bindings, sorted by the comparator.
    pub fn bindings(&self) -> Vec<Binding> {
        if let Some(bindings) = &self.inner.state.lock().bindings {
            return bindings.clone();
        }
        let mut found = self.inner.context.find_in_chain_with(&self.inner.filter);
        if let Some(comparator) = &self.inner.comparator {
            found.sort_by(|a, b| comparator(a, b));
        }
        let mut state = self.inner.state.lock();
        match &state.bindings {
            Some(existing) => existing.clone(),
            None => {
                state.bindings = Some(found.clone());
                found
            }
        }
    }

    /// Resolves the values of the matched bindings; ready if every value is.
    pub fn resolve(&self, session: Option<&ResolutionSession>) -> ContextResult<ValueOrPromise<Vec<BoxedValue>>> {
        let generation = {
            let state = self.inner.state.lock();
            if let Some(values) = &state.values {
                return Ok(ValueOrPromise::Ready(
                    values.iter().map(|(_, v)| v.clone()).collect(),
                ));
            }
            state.generation
        };

        let bindings = self.bindings();
        let session = session.cloned().unwrap_or_default();
        let mut items = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            items.push(binding.get_value(&self.inner.context, &session)?);
        }
        let ids: Vec<u64> = bindings.iter().map(Binding::id).collect();
        let view = self.clone();
        Ok(resolve_list(items).map(move |values| {
            view.store_values(generation, ids, &values);
            values
        }))
    }

    fn store_values(&self, generation: u64, ids: Vec<u64>, values: &[BoxedValue]) {
        {
            let mut state = self.inner.state.lock();
            if state.generation != generation || state.values.is_some() {
                return;
            }
            state.values = Some(ids.into_iter().zip(values.iter().cloned()).collect());
        }
        self.emit(&ViewEvent::Resolve(values.to_vec()));
    }

    /// Resolved values of all matched bindings. Every call returns a new `Vec`.
    pub async fn values(&self) -> ContextResult<Vec<BoxedValue>> {
        self.resolve(None)?.resolve().await
    }

    /// Resolved values downcast to `T`.
    pub async fn values_of<T: Any + Send + Sync>(&self) -> ContextResult<Vec<Arc<T>>> {
        let bindings = self.bindings();
        let values = self.values().await?;
        values
            .into_iter()
            .zip(bindings.iter())
            .map(|(value, binding)| downcast_value::<T>(binding.key(), value))
            .collect()
    }

    /// The value of the only matched binding, `None` if nothing matches.
    pub async fn single_value(&self) -> ContextResult<Option<BoxedValue>> {
        match self.bindings().len() {
            0 => Ok(None),
            1 => Ok(self.values().await?.into_iter().next()),
            _ => Err(ContextError::MultipleValues),
        }
    }

    /// A getter that evaluates `values()` on every call.
    pub fn as_getter(&self) -> Getter<Vec<BoxedValue>> {
        let view = self.clone();
        Getter::new(move || match view.resolve(None) {
            Ok(values) => values.into_future(),
            Err(e) => futures::future::ready(Err(e)).boxed(),
        })
    }

    /// Stops following the context and freezes the current bindings. Idempotent.
    pub fn close(&self) {
        let bindings = self.bindings();
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.bindings.get_or_insert(bindings);
        }
        self.inner.subscription.unsubscribe();
        debug!(context = %self.inner.context.name(), "View closed");
        self.emit(&ViewEvent::Close);
    }

    /// Registers a handler for one event type. Returns an id for [`ContextView::off`].
    pub fn on<F>(&self, event_type: ViewEventType, handler: F) -> u64
    where
        F: Fn(&ViewEvent) + Send + Sync + 'static,
    {
        let id = NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .lock()
            .push((id, event_type, Arc::new(handler)));
        id
    }

    pub fn off(&self, id: u64) -> bool {
        let mut handlers = self.inner.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(h, _, _)| *h != id);
        before != handlers.len()
    }

    fn emit(&self, event: &ViewEvent) {
        let event_type = event.event_type();
        let handlers: Vec<ViewEventHandler> = self
            .inner
            .handlers
            .lock()
            .iter()
            .filter(|(_, t, _)| *t == event_type)
            .map(|(_, _, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }
}

impl fmt::Debug for ContextView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ContextView")
            .field("context", &self.inner.context.name())
            .field("bindings", &state.bindings.as_ref().map(Vec::len))
            .field("closed", &state.closed)
            .finish()
    }
}

/// Creates a getter over a fresh view of `ctx`.
pub fn create_view_getter(
    ctx: &Context,
    filter: BindingFilter,
    comparator: Option<BindingComparator>,
) -> Getter<Vec<BoxedValue>> {
    ctx.create_view(filter, comparator).as_getter()
}
