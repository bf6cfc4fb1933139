//! # Context Errors
//!
//! This module defines the error type shared by every part of the context framework.
//! Configuration and usage mistakes (bad keys, locked bindings, missing bindings) and
//! resolution failures (async values read synchronously, dependency cycles) all surface
//! as a [`ContextError`] to the immediate caller. Nothing is retried and nothing is
//! logged-and-swallowed.

/// Boxed error used for failures that come from user code (observers, providers, interceptors).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used across the framework.
pub type ContextResult<T> = Result<T, ContextError>;

/// Errors that can occur while registering or resolving bindings.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("{reason}")]
    InvalidBindingKey { key: String, reason: String },
    #[error("Cannot rebind key \"{0}\" to a locked binding")]
    LockedBindingRebind(String),
    #[error("Cannot unbind key \"{0}\" of a locked binding")]
    LockedBindingUnbind(String),
    #[error("The key '{key}' is not bound to any value in context {context}")]
    BindingNotFound { key: String, context: String },
    #[error("Cannot get {key} synchronously: the value is a promise")]
    AsyncResolution { key: String },
    #[error("The ContextView has more than one value. Use values() to access them.")]
    MultipleValues,
    #[error("Binding '{key}' ({binding_type}) does not support 'asProxyWithInterceptors'")]
    UnsupportedProxyTarget { key: String, binding_type: String },
    #[error("Cyclic dependency, node was: \"{0}\"")]
    CyclicGroupOrder(String),
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),
    #[error("The value of '{key}' is not of type {expected}")]
    TypeMismatch { key: String, expected: &'static str },
    #[error("Cannot resolve property path '{path}' of '{key}': the value is not a JSON document")]
    InvalidPropertyPath { key: String, path: String },
    #[error("The value of '{0}' is undefined")]
    UndefinedValue(String),
    #[error("No value was configured for binding {0}.")]
    NoValue(String),
    #[error("Cannot find a context with scope '{scope}' for binding '{key}'")]
    ScopedContextNotFound { key: String, scope: String },
    #[error("Injection error: {0}")]
    Injection(String),
    #[error("Method '{method}' is not found on {target}")]
    MethodNotFound { target: String, method: String },
    #[error("The value of '{0}' is not an interceptor")]
    NotAnInterceptor(String),
    #[error("Life cycle observer '{key}' failed to {event}: {source}")]
    LifeCycle {
        key: String,
        event: &'static str,
        source: BoxError,
    },
}

impl ContextError {
    pub(crate) fn invalid_key(key: &str, reason: impl Into<String>) -> Self {
        ContextError::InvalidBindingKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error means a key could not be found in the context chain.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContextError::BindingNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_messages() {
        assert_eq!(
            ContextError::LockedBindingRebind("foo".into()).to_string(),
            "Cannot rebind key \"foo\" to a locked binding"
        );
        assert_eq!(
            ContextError::LockedBindingUnbind("foo".into()).to_string(),
            "Cannot unbind key \"foo\" of a locked binding"
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = ContextError::BindingNotFound {
            key: "a-new-key".into(),
            context: "app".into(),
        };
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "The key 'a-new-key' is not bound to any value in context app"
        );
    }
}
