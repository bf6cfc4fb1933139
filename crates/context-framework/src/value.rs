//! # Values and Deferred Values
//!
//! Resolution in a context may complete immediately (a constant, a sync factory) or only
//! after an asynchronous step (an async factory, an async provider, a class whose
//! constructor arguments are async). [`ValueOrPromise`] makes that duality explicit:
//!
//! - [`ValueOrPromise::Ready`] carries a value that is available right now.
//! - [`ValueOrPromise::Pending`] carries a boxed future that produces it later.
//!
//! Synchronous accessors (`get_sync`) only accept `Ready`; async accessors accept both.
//! Chaining with [`ValueOrPromise::map`] and [`ValueOrPromise::and_then`] keeps a ready
//! value ready, so purely synchronous dependency graphs never touch an executor.

use crate::error::{ContextError, ContextResult};
use futures::future::{BoxFuture, FutureExt};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A type-erased resolved value.
pub type BoxedValue = Arc<dyn Any + Send + Sync>;

/// A boxed future yielding a resolution result.
pub type PendingValue<T> = BoxFuture<'static, ContextResult<T>>;

/// Either a value available now or a future producing it.
pub enum ValueOrPromise<T> {
    Ready(T),
    Pending(PendingValue<T>),
}

impl<T: Send + 'static> ValueOrPromise<T> {
    /// Wraps a future as a pending value.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = ContextResult<T>> + Send + 'static,
    {
        ValueOrPromise::Pending(future.boxed())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ValueOrPromise::Pending(_))
    }

    /// Returns the value if it is ready.
    pub fn ready(self) -> Option<T> {
        match self {
            ValueOrPromise::Ready(value) => Some(value),
            ValueOrPromise::Pending(_) => None,
        }
    }

    pub fn map<U, F>(self, f: F) -> ValueOrPromise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            ValueOrPromise::Ready(value) => ValueOrPromise::Ready(f(value)),
            ValueOrPromise::Pending(future) => {
                ValueOrPromise::Pending(async move { future.await.map(f) }.boxed())
            }
        }
    }

    /// Chains a fallible, possibly asynchronous step.
    ///
    /// A ready input runs `f` immediately and returns its result as is; a pending input
    /// defers `f` until the future completes.
    pub fn and_then<U, F>(self, f: F) -> ContextResult<ValueOrPromise<U>>
    where
        U: Send + 'static,
        F: FnOnce(T) -> ContextResult<ValueOrPromise<U>> + Send + 'static,
    {
        match self {
            ValueOrPromise::Ready(value) => f(value),
            ValueOrPromise::Pending(future) => Ok(ValueOrPromise::Pending(
                async move {
                    let value = future.await?;
                    f(value)?.resolve().await
                }
                .boxed(),
            )),
        }
    }

    /// Waits for the value.
    pub async fn resolve(self) -> ContextResult<T> {
        match self {
            ValueOrPromise::Ready(value) => Ok(value),
            ValueOrPromise::Pending(future) => future.await,
        }
    }

    pub fn into_future(self) -> PendingValue<T> {
        match self {
            ValueOrPromise::Ready(value) => futures::future::ready(Ok(value)).boxed(),
            ValueOrPromise::Pending(future) => future,
        }
    }

    /// Returns the ready value or fails with [`ContextError::AsyncResolution`].
    pub fn into_sync(self, key: &str) -> ContextResult<T> {
        match self {
            ValueOrPromise::Ready(value) => Ok(value),
            ValueOrPromise::Pending(_) => Err(ContextError::AsyncResolution {
                key: key.to_string(),
            }),
        }
    }
}

impl<T> From<T> for ValueOrPromise<T> {
    fn from(value: T) -> Self {
        ValueOrPromise::Ready(value)
    }
}

impl<T> fmt::Debug for ValueOrPromise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueOrPromise::Ready(_) => f.write_str("ValueOrPromise::Ready(..)"),
            ValueOrPromise::Pending(_) => f.write_str("ValueOrPromise::Pending(..)"),
        }
    }
}

/// Resolves a list of entries into a list of values with the same indexes.
///
/// The result is ready when every entry is ready; otherwise all entries are awaited
/// concurrently and the result is pending.
pub fn resolve_list<T: Send + 'static>(items: Vec<ValueOrPromise<T>>) -> ValueOrPromise<Vec<T>> {
    if items.iter().all(|item| !item.is_pending()) {
        let values = items.into_iter().filter_map(ValueOrPromise::ready).collect();
        return ValueOrPromise::Ready(values);
    }
    let futures: Vec<_> = items.into_iter().map(ValueOrPromise::into_future).collect();
    ValueOrPromise::pending(futures::future::try_join_all(futures))
}

/// A zero-argument async accessor, e.g. for values injected lazily.
pub struct Getter<T> {
    f: Arc<dyn Fn() -> PendingValue<T> + Send + Sync>,
}

impl<T> Clone for Getter<T> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone() }
    }
}

impl<T: Send + 'static> Getter<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> PendingValue<T> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// Builds a getter that always returns the same value.
    pub fn from_value(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::new(move || futures::future::ready(Ok(value.clone())).boxed())
    }

    pub async fn get(&self) -> ContextResult<T> {
        (self.f)().await
    }
}

impl<T> fmt::Debug for Getter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Getter")
    }
}

/// Downcasts a resolved value, reporting the key on mismatch.
pub(crate) fn downcast_value<T: Any + Send + Sync>(key: &str, value: BoxedValue) -> ContextResult<Arc<T>> {
    value.downcast::<T>().map_err(|_| ContextError::TypeMismatch {
        key: key.to_string(),
        expected: std::any::type_name::<T>(),
    })
}
