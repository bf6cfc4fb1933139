//! # Context Framework
//!
//! This crate provides an **inversion-of-control container** for Rust applications: a
//! hierarchy of [`Context`]s holding named [`Binding`]s that resolve to values on demand.
//! Components declare what they need; the context finds, constructs, caches and wires it.
//!
//! ## Why a Context Hierarchy?
//!
//! - **Decoupling**: components depend on binding keys, not on concrete constructors
//! - **Scoping**: an application context holds long-lived services, a per-request child
//!   context holds request data and anything that must not outlive the request
//! - **Late binding**: a binding can be replaced, reconfigured or added while the
//!   application runs, and [`ContextView`]s follow along
//!
//! ## Core Abstractions
//!
//! | Type | Role |
//! |------|------|
//! | [`BindingKey`] | `key` or `key#deep.property.path` |
//! | [`Binding`] | source of a value (constant, factory, class, provider, alias) plus scope, tags and lock |
//! | [`Context`] | registry of bindings with a parent chain, resolution and events |
//! | [`ContextView`] | live, cached, filtered and sorted set of bindings |
//! | [`ResolutionSession`] | stack of bindings/injections being resolved, cycle detection |
//! | [`InterceptionProxy`] | wraps a class instance, runs interceptor chains around method calls |
//! | [`LifeCycleObserverRegistry`] | starts and stops observers group by group |
//!
//! ## Quick Start
//!
//! ```rust
//! use context_framework::{BindingScope, Context, ContextResult, Injectable, Injection, ResolvedArgs};
//! use std::sync::Arc;
//!
//! struct Greeter {
//!     greeting: Arc<String>,
//! }
//!
//! impl Injectable for Greeter {
//!     fn injections() -> Vec<Injection> {
//!         vec![Injection::key("config.greeting")]
//!     }
//!
//!     fn construct(args: ResolvedArgs) -> ContextResult<Self> {
//!         Ok(Greeter { greeting: args.value::<String>(0)? })
//!     }
//! }
//!
//! fn main() -> ContextResult<()> {
//!     let app = Context::named("app");
//!     app.bind("config.greeting")?.to("Hello".to_string());
//!     app.bind("services.greeter")?
//!         .to_class::<Greeter>()
//!         .in_scope(BindingScope::Singleton);
//!
//!     let request = Context::child_of(&app);
//!     let greeter = request.get_sync::<Greeter>("services.greeter")?;
//!     assert_eq!(greeter.greeting.as_str(), "Hello");
//!     Ok(())
//! }
//! ```
//!
//! ## Scopes
//!
//! | Scope | Cached at | Typical use |
//! |-------|-----------|-------------|
//! | `Transient` | nowhere, new value per resolution | stateless helpers |
//! | `Context` | the requesting context | per-request state |
//! | `Singleton` | the context owning the binding | shared services |
//! | `Application` / `Server` / `Request` | nearest context created with that scope | explicit tiers |
//!
//! ## Sync and Async
//!
//! Resolution produces a [`ValueOrPromise`]. As long as every value in a dependency graph
//! is available synchronously, [`Context::get_sync`] works; one async factory anywhere
//! makes the result pending and only [`Context::get`] can read it.
//!
//! ## Logging
//!
//! All modules log through `tracing`; see [`tracing::setup_tracing`].

pub mod binding;
pub mod binding_filter;
pub mod binding_inspector;
pub mod binding_key;
pub mod binding_sorter;
pub mod context;
pub mod context_view;
pub mod error;
pub mod injection;
pub mod inspect;
pub mod interceptor;
pub mod keys;
pub mod lifecycle;
pub mod resolution_session;
pub mod subscription;
pub mod tags;
pub mod testing;
pub mod tracing;
pub mod value;

// Re-export core types for convenience
pub use binding::{Binding, BindingChange, BindingScope, BindingType};
pub use binding_filter::{
    all_bindings, binding_filter, filter_by_key, filter_by_tag, BindingFilter, BindingPattern, TagMatch,
    TagPattern,
};
pub use binding_inspector::{create_binding_from_class, create_binding_from_provider, BindingSpec, ClassBindingOptions};
pub use binding_key::BindingKey;
pub use binding_sorter::{
    binding_comparator, compare_bindings_by_tag, compare_by_order, sort_bindings_by_phase, sort_list_of_groups,
    BindingComparator,
};
pub use context::{BindingCreationPolicy, Context, ContextBuilder};
pub use context_view::{create_view_getter, ContextView, ViewEvent, ViewEventType};
pub use error::{BoxError, ContextError, ContextResult};
pub use injection::{Injectable, Injected, Injection, InjectionKind, Provider, ResolvedArgs};
pub use inspect::InspectionOptions;
pub use interceptor::{
    create_proxy_with_interceptors, InterceptionProxy, Interceptor, InterceptorRef, InvocationContext, Next,
};
pub use lifecycle::{LifeCycleObserver, LifeCycleObserverOptions, LifeCycleObserverRegistry};
pub use resolution_session::{ResolutionOptions, ResolutionSession};
pub use subscription::{ContextEvent, ContextEventObserver, ContextEventType, Subscription};
pub use tags::{BindingTag, Symbol, TagMap, TagValue};
pub use value::{BoxedValue, Getter, ValueOrPromise};
