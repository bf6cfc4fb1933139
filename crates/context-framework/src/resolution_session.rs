//! # Resolution Sessions
//!
//! A [`ResolutionSession`] records the chain of bindings and injections currently being
//! resolved. Each step of resolution works on its own copy of the session, so parallel
//! branches (two constructor arguments) never see each other's entries.
//!
//! The session serves two purposes:
//!
//! 1. **Cycle detection**: entering a binding that is already on the stack fails with
//!    [`ContextError::CircularDependency`] and the full path, e.g. `a --> b --> a`.
//! 2. **Diagnostics**: binding and injection paths are used in error messages and as the
//!    source of intercepted invocations.

use crate::binding::Binding;
use crate::error::{ContextError, ContextResult};
use std::fmt;

/// One frame of a resolution stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolutionElement {
    Binding { id: u64, key: String },
    Injection { target_name: String },
}

/// The stack of bindings and injections being resolved.
#[derive(Clone, Debug, Default)]
pub struct ResolutionSession {
    stack: Vec<ResolutionElement>,
}

impl ResolutionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a session with `binding` pushed, or fails if it is already being resolved.
    pub fn enter_binding(&self, binding: &Binding) -> ContextResult<ResolutionSession> {
        let id = binding.id();
        let cyclic = self
            .stack
            .iter()
            .any(|e| matches!(e, ResolutionElement::Binding { id: existing, .. } if *existing == id));
        let mut next = self.clone();
        next.stack.push(ResolutionElement::Binding {
            id,
            key: binding.key().to_string(),
        });
        if cyclic {
            return Err(ContextError::CircularDependency(next.binding_path()));
        }
        Ok(next)
    }

    /// Returns a session with an injection frame pushed.
    pub fn enter_injection(&self, target_name: impl Into<String>) -> ResolutionSession {
        let mut next = self.clone();
        next.stack.push(ResolutionElement::Injection {
            target_name: target_name.into(),
        });
        next
    }

    /// Returns a session with `binding` pushed without checking for cycles.
    pub(crate) fn with_binding(&self, binding: &Binding) -> ResolutionSession {
        let mut next = self.clone();
        next.stack.push(ResolutionElement::Binding {
            id: binding.id(),
            key: binding.key().to_string(),
        });
        next
    }

    pub fn current_binding(&self) -> Option<&str> {
        self.stack.iter().rev().find_map(|e| match e {
            ResolutionElement::Binding { key, .. } => Some(key.as_str()),
            _ => None,
        })
    }

    pub fn current_injection(&self) -> Option<&str> {
        self.stack.iter().rev().find_map(|e| match e {
            ResolutionElement::Injection { target_name } => Some(target_name.as_str()),
            _ => None,
        })
    }

    pub fn binding_path(&self) -> String {
        self.stack
            .iter()
            .filter_map(|e| match e {
                ResolutionElement::Binding { key, .. } => Some(key.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" --> ")
    }

    pub fn injection_path(&self) -> String {
        self.stack
            .iter()
            .filter_map(|e| match e {
                ResolutionElement::Injection { target_name } => Some(target_name.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" --> ")
    }

    /// Full path with both bindings and injections.
    pub fn resolution_path(&self) -> String {
        self.stack
            .iter()
            .map(|e| match e {
                ResolutionElement::Binding { key, .. } => format!("binding:{key}"),
                ResolutionElement::Injection { target_name } => format!("injection:{target_name}"),
            })
            .collect::<Vec<_>>()
            .join(" --> ")
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

impl fmt::Display for ResolutionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.binding_path())
    }
}

/// Options for `Context::get_value_or_promise` and friends.
#[derive(Clone, Debug, Default)]
pub struct ResolutionOptions {
    /// Return `None` instead of failing when the key is not bound.
    pub optional: bool,
    /// Wrap the resolved class instance in an `InterceptionProxy`.
    pub as_proxy_with_interceptors: bool,
    pub session: Option<ResolutionSession>,
}

impl ResolutionOptions {
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Self::default()
        }
    }

    pub fn proxy() -> Self {
        Self {
            as_proxy_with_interceptors: true,
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session: ResolutionSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn with_proxy(mut self, as_proxy: bool) -> Self {
        self.as_proxy_with_interceptors = as_proxy;
        self
    }
}
