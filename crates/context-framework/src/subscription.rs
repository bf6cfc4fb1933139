//! # Context Events and Subscriptions
//!
//! A context emits a [`ContextEvent`] whenever its registry changes:
//!
//! - `Bind` after a binding is added (or replaces an unlocked one),
//! - `Unbind` after a binding is removed or replaced,
//! - `Changed` after a registered binding is reconfigured (value, scope, tags, lock).
//!
//! Events are delivered synchronously, in the order the operations happen, to:
//!
//! 1. **Observers** registered with [`Context::subscribe`]. An observer may narrow the
//!    bindings it cares about with [`ContextEventObserver::filter`].
//! 2. **Child contexts** that have observers of their own. A child re-emits a parent
//!    event only when it does not hold a binding with the same key itself. A binding
//!    shadowed that way is invisible to the child, so its changes are too.
//!
//! The child registers itself on its parent lazily, the first time anything listens to
//! the child, and walks up the chain the same way. [`Context::close`] drops all
//! observers and detaches the child from its parent. Bindings and the parent itself are
//! left untouched.

use crate::binding::Binding;
use crate::context::Context;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::context::ContextInner;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextEventType {
    Bind,
    Unbind,
    Changed,
}

impl fmt::Display for ContextEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContextEventType::Bind => "bind",
            ContextEventType::Unbind => "unbind",
            ContextEventType::Changed => "changed",
        })
    }
}

/// A registry change in `context`, the context that owns `binding`.
#[derive(Clone)]
pub struct ContextEvent {
    pub event_type: ContextEventType,
    pub binding: Binding,
    pub context: Context,
}

impl fmt::Debug for ContextEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextEvent")
            .field("type", &self.event_type)
            .field("key", &self.binding.key())
            .field("context", &self.context.name())
            .finish()
    }
}

/// Receives context events.
pub trait ContextEventObserver: Send + Sync {
    /// Only events whose binding passes the filter are observed.
    fn filter(&self, _binding: &Binding) -> bool {
        true
    }

    fn observe(&self, event: &ContextEvent);
}

impl<F> ContextEventObserver for F
where
    F: Fn(&ContextEvent) + Send + Sync,
{
    fn observe(&self, event: &ContextEvent) {
        self(event)
    }
}

pub(crate) type EventListener = Arc<dyn Fn(&ContextEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct SubscriptionManager {
    observers: Mutex<Option<Vec<(u64, Arc<dyn ContextEventObserver>)>>>,
    listeners: Mutex<Vec<(u64, EventListener)>>,
    pub(crate) parent_listener: Mutex<Option<u64>>,
}

impl SubscriptionManager {
    pub(crate) fn new() -> Self {
        Self {
            observers: Mutex::new(Some(Vec::new())),
            ..Self::default()
        }
    }
}

/// Handle returned by [`Context::subscribe`].
pub struct Subscription {
    context: Weak<ContextInner>,
    id: u64,
    closed: AtomicBool,
}

impl Subscription {
    /// Removes the observer. Returns `false` if it was already removed.
    pub fn unsubscribe(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        match self.context.upgrade() {
            Some(inner) => Context::from_inner(inner).remove_observer(self.id),
            None => false,
        }
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.closed())
            .finish()
    }
}

fn same_observer(a: &Arc<dyn ContextEventObserver>, b: &Arc<dyn ContextEventObserver>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl Context {
    /// Adds an observer for bind, unbind and change events of this context and its
    /// (non-shadowed) ancestors.
    pub fn subscribe(&self, observer: Arc<dyn ContextEventObserver>) -> Subscription {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscriptions
            .observers
            .lock()
            .get_or_insert_with(Vec::new)
            .push((id, observer));
        self.ensure_parent_listener();
        debug!(context = %self.name(), subscription = id, "Observer subscribed");
        Subscription {
            context: self.downgrade(),
            id,
            closed: AtomicBool::new(false),
        }
    }

    /// Removes an observer. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, observer: &Arc<dyn ContextEventObserver>) -> bool {
        let mut observers = self.inner.subscriptions.observers.lock();
        let Some(list) = observers.as_mut() else {
            return false;
        };
        let before = list.len();
        list.retain(|(_, o)| !same_observer(o, observer));
        before != list.len()
    }

    pub fn is_subscribed(&self, observer: &Arc<dyn ContextEventObserver>) -> bool {
        self.inner
            .subscriptions
            .observers
            .lock()
            .as_ref()
            .is_some_and(|list| list.iter().any(|(_, o)| same_observer(o, observer)))
    }

    pub(crate) fn remove_observer(&self, id: u64) -> bool {
        let mut observers = self.inner.subscriptions.observers.lock();
        let Some(list) = observers.as_mut() else {
            return false;
        };
        let before = list.len();
        list.retain(|(i, _)| *i != id);
        before != list.len()
    }

    #[cfg(test)]
    pub(crate) fn observer_count(&self) -> usize {
        self.inner
            .subscriptions
            .observers
            .lock()
            .as_ref()
            .map_or(0, Vec::len)
    }

    #[cfg(test)]
    pub(crate) fn has_parent_listener(&self) -> bool {
        self.inner.subscriptions.parent_listener.lock().is_some()
    }

    /// Drops all observers and detaches from the parent. Bindings and the parent stay.
    pub fn close(&self) {
        debug!(context = %self.name(), "Closing context");
        *self.inner.subscriptions.observers.lock() = None;
        if let Some(parent) = self.parent() {
            if let Some(id) = self.inner.subscriptions.parent_listener.lock().take() {
                parent.remove_listener(id);
            }
        }
    }

    pub(crate) fn add_listener(&self, listener: EventListener) -> u64 {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        self.inner.subscriptions.listeners.lock().push((id, listener));
        self.ensure_parent_listener();
        id
    }

    pub(crate) fn remove_listener(&self, id: u64) {
        self.inner.subscriptions.listeners.lock().retain(|(i, _)| *i != id);
    }

    fn ensure_parent_listener(&self) {
        let Some(parent) = self.parent() else {
            return;
        };
        let mut slot = self.inner.subscriptions.parent_listener.lock();
        if slot.is_some() {
            return;
        }
        let child = self.downgrade();
        let id = parent.add_listener(Arc::new(move |event: &ContextEvent| {
            if let Some(inner) = child.upgrade() {
                Context::from_inner(inner).handle_parent_event(event);
            }
        }));
        *slot = Some(id);
    }

    fn handle_parent_event(&self, event: &ContextEvent) {
        let key = event.binding.key();
        if self.contains(key) {
            debug!(
                event = %event.event_type,
                key,
                from = %event.context.name(),
                to = %self.name(),
                "Event is not re-emitted, binding is shadowed"
            );
            return;
        }
        debug!(
            event = %event.event_type,
            key,
            from = %event.context.name(),
            to = %self.name(),
            "Re-emitting event"
        );
        self.emit_event(event);
    }

    pub(crate) fn emit_event(&self, event: &ContextEvent) {
        let observers: Vec<Arc<dyn ContextEventObserver>> = self
            .inner
            .subscriptions
            .observers
            .lock()
            .as_ref()
            .map(|list| list.iter().map(|(_, o)| o.clone()).collect())
            .unwrap_or_default();
        for observer in observers {
            if observer.filter(&event.binding) {
                observer.observe(event);
            }
        }

        let listeners: Vec<EventListener> = self
            .inner
            .subscriptions
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}
