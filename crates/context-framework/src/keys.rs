//! Well-known tag names and binding keys.

/// Tags understood by the context itself.
pub mod context_tags {
    /// Explicit binding key for classes bound with `create_binding_from_class`.
    pub const KEY: &str = "key";
    pub const NAMESPACE: &str = "namespace";
    pub const NAME: &str = "name";
    pub const TYPE: &str = "type";
    pub const CLASS: &str = "class";
    pub const PROVIDER: &str = "provider";
    pub const DYNAMIC_VALUE_PROVIDER: &str = "dynamicValueProvider";

    pub const GLOBAL_INTERCEPTOR: &str = "globalInterceptor";
    /// Group of a global interceptor, ordered by `globalInterceptor.orderedGroups`.
    pub const GLOBAL_INTERCEPTOR_GROUP: &str = "globalInterceptorGroup";
}

/// Keys the context looks up.
pub mod context_bindings {
    /// `Vec<String>` with the order of global interceptor groups.
    pub const GLOBAL_INTERCEPTOR_ORDERED_GROUPS: &str = "globalInterceptor.orderedGroups";
    pub const GLOBAL_INTERCEPTOR_NAMESPACE: &str = "globalInterceptors";
    pub const INTERCEPTOR_NAMESPACE: &str = "interceptors";
}

/// Tags for life cycle observers.
pub mod core_tags {
    pub const LIFE_CYCLE_OBSERVER: &str = "lifeCycleObserver";
    pub const LIFE_CYCLE_OBSERVER_GROUP: &str = "lifeCycleObserverGroup";
}

/// Keys for the life cycle registry and its configuration.
pub mod core_bindings {
    pub const LIFE_CYCLE_OBSERVER_REGISTRY: &str = "lifeCycleObserver.registry";
    /// `LifeCycleObserverOptions` picked up by the registry.
    pub const LIFE_CYCLE_OBSERVER_OPTIONS: &str = "lifeCycleObserver.options";
    pub const LIFE_CYCLE_OBSERVERS: &str = "lifeCycleObservers";
}
