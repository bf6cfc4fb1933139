//! # Bindings From Types
//!
//! [`create_binding_from_class`] turns an [`Injectable`] type into a ready-to-add
//! [`Binding`], applying the scope and tags the type declares in
//! [`Injectable::binding_spec`] and deriving the key:
//!
//! 1. `options.key`, else the `key` tag;
//! 2. otherwise `namespace.name`, where
//!    - the namespace is `options.namespace`, the `namespace` tag, or the one mapped from
//!      the binding type (`class -> classes`, `provider -> providers`, any other `t -> ts`),
//!      falling back to `options.default_namespace`;
//!    - the name is `options.name`, the `name` tag, or the short type name.

use crate::binding::{Binding, BindingScope};
use crate::injection::{short_type_name, Injectable, Provider};
use crate::keys::context_tags;
use crate::tags::{BindingTag, TagValue};
use std::collections::HashMap;

/// Scope and tags a type declares for its bindings.
#[derive(Clone, Debug, Default)]
pub struct BindingSpec {
    pub scope: Option<BindingScope>,
    pub tags: Vec<BindingTag>,
}

impl BindingSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(mut self, scope: BindingScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn tag(mut self, tag: impl Into<BindingTag>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Options for [`create_binding_from_class`].
#[derive(Clone, Debug, Default)]
pub struct ClassBindingOptions {
    pub key: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
    /// Binding type used for the namespace mapping (`class`, `provider`, ...).
    pub type_: Option<String>,
    /// Replaces the default type-to-namespace mapping.
    pub type_namespace_mapping: Option<HashMap<String, String>>,
    pub default_namespace: Option<String>,
    /// Applied only if the type does not declare a scope.
    pub default_scope: Option<BindingScope>,
}

impl ClassBindingOptions {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = Some(namespace.into());
        self
    }

    pub fn with_default_scope(mut self, scope: BindingScope) -> Self {
        self.default_scope = Some(scope);
        self
    }
}

/// The default mapping from binding type to namespace.
pub fn default_type_namespace_mapping() -> HashMap<String, String> {
    [
        (context_tags::CLASS, "classes"),
        (context_tags::PROVIDER, "providers"),
        (context_tags::DYNAMIC_VALUE_PROVIDER, "dynamicValueProviders"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Creates a class binding for `T` with a derived key.
pub fn create_binding_from_class<T: Injectable>(options: &ClassBindingOptions) -> Binding {
    let spec = T::binding_spec();
    let template = Binding::bind("").tag((context_tags::TYPE, context_tags::CLASS));
    let key = build_key(&template, &spec, short_type_name::<T>(), options);
    finish(Binding::bind(key).to_class::<T>(), spec, options, context_tags::CLASS)
}

/// Creates a provider binding for `P` with a derived key.
pub fn create_binding_from_provider<P: Provider>(options: &ClassBindingOptions) -> Binding {
    let spec = P::binding_spec();
    let template = Binding::bind("").tag((context_tags::TYPE, context_tags::PROVIDER));
    let key = build_key(&template, &spec, short_type_name::<P>(), options);
    finish(
        Binding::bind(key).to_provider::<P>().tag(context_tags::PROVIDER),
        spec,
        options,
        context_tags::PROVIDER,
    )
}

fn finish(binding: Binding, spec: BindingSpec, options: &ClassBindingOptions, type_: &str) -> Binding {
    let binding = binding
        .tag((context_tags::TYPE, type_))
        .tags(spec.tags);
    if let Some(name) = &options.name {
        binding.tag((context_tags::NAME, name.as_str()));
    }
    if let Some(scope) = spec.scope {
        binding.in_scope(scope);
    }
    if let Some(scope) = options.default_scope {
        binding.apply_default_scope(scope);
    }
    binding
}

fn build_key(template: &Binding, spec: &BindingSpec, type_name: &str, options: &ClassBindingOptions) -> String {
    // Declared tags win over the template's type tag, e.g. `type: dynamicValueProvider`.
    template.tags(spec.tags.clone());
    let text = |name: &str| template.tag_value(name).and_then(|v| v.as_str().map(str::to_string));

    if let Some(key) = options.key.clone().or_else(|| text(context_tags::KEY)) {
        return key;
    }

    let namespace = options
        .namespace
        .clone()
        .or_else(|| text(context_tags::NAMESPACE))
        .or_else(|| namespace_for_type(template, options))
        .or_else(|| options.default_namespace.clone());
    let name = options
        .name
        .clone()
        .or_else(|| text(context_tags::NAME))
        .unwrap_or_else(|| type_name.to_string());

    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}.{name}"),
        _ => name,
    }
}

fn namespace_for_type(template: &Binding, options: &ClassBindingOptions) -> Option<String> {
    let mapping = options
        .type_namespace_mapping
        .clone()
        .unwrap_or_else(default_type_namespace_mapping);
    let type_ = options.type_.clone().or_else(|| {
        match template.tag_value(context_tags::TYPE) {
            Some(TagValue::Text(t)) => Some(t),
            _ => template
                .tag_names()
                .into_iter()
                .find(|t| mapping.contains_key(t)),
        }
    })?;
    Some(
        mapping
            .get(&type_)
            .cloned()
            .unwrap_or_else(|| format!("{type_}s")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContextResult;
    use crate::injection::ResolvedArgs;
    use crate::value::ValueOrPromise;

    struct MyService;

    impl Injectable for MyService {
        fn construct(_args: ResolvedArgs) -> ContextResult<Self> {
            Ok(MyService)
        }
    }

    struct MyController;

    impl Injectable for MyController {
        fn construct(_args: ResolvedArgs) -> ContextResult<Self> {
            Ok(MyController)
        }

        fn binding_spec() -> BindingSpec {
            BindingSpec::new()
                .scope(BindingScope::Singleton)
                .tag(("namespace", "controllers"))
                .tag(("name", "my-controller"))
                .tag("rest")
        }
    }

    struct DateProvider;

    impl Injectable for DateProvider {
        fn construct(_args: ResolvedArgs) -> ContextResult<Self> {
            Ok(DateProvider)
        }
    }

    impl Provider for DateProvider {
        type Value = String;

        fn value(&self) -> ValueOrPromise<String> {
            ValueOrPromise::Ready("2020-01-01".to_string())
        }
    }

    #[test]
    fn test_default_key_uses_type_namespace() {
        let binding = create_binding_from_class::<MyService>(&ClassBindingOptions::default());
        assert_eq!(binding.key(), "classes.MyService");
        assert_eq!(binding.tag_value("type"), Some(TagValue::from("class")));
        assert_eq!(binding.scope(), BindingScope::Transient);
    }

    #[test]
    fn test_spec_tags_and_scope() {
        let binding = create_binding_from_class::<MyController>(
            &ClassBindingOptions::default().with_default_scope(BindingScope::Context),
        );
        assert_eq!(binding.key(), "controllers.my-controller");
        assert!(binding.has_tag("rest"));
        assert_eq!(binding.scope(), BindingScope::Singleton);
    }

    #[test]
    fn test_options_override_tags() {
        let binding = create_binding_from_class::<MyController>(
            &ClassBindingOptions::default()
                .with_namespace("api")
                .with_name("ctrl"),
        );
        assert_eq!(binding.key(), "api.ctrl");
        assert_eq!(binding.tag_value("name"), Some(TagValue::from("ctrl")));

        let explicit = create_binding_from_class::<MyService>(&ClassBindingOptions::default().with_key("svc"));
        assert_eq!(explicit.key(), "svc");
    }

    #[test]
    fn test_default_scope_applies_without_declared_scope() {
        let binding = create_binding_from_class::<MyService>(
            &ClassBindingOptions::default().with_default_scope(BindingScope::Singleton),
        );
        assert_eq!(binding.scope(), BindingScope::Singleton);
    }

    #[test]
    fn test_provider_binding() {
        let binding = create_binding_from_provider::<DateProvider>(&ClassBindingOptions::default());
        assert_eq!(binding.key(), "providers.DateProvider");
        assert!(binding.has_tag("provider"));
        assert_eq!(binding.tag_value("type"), Some(TagValue::from("provider")));

        let ctx = crate::context::Context::new();
        ctx.add(binding).unwrap();
        assert_eq!(*ctx.get_sync::<String>("providers.DateProvider").unwrap(), "2020-01-01");
    }

    #[test]
    fn test_custom_type_mapping() {
        let mut options = ClassBindingOptions::default();
        options.type_ = Some("repository".to_string());
        let binding = create_binding_from_class::<MyService>(&options);
        assert_eq!(binding.key(), "repositorys.MyService");

        options.type_namespace_mapping = Some(HashMap::from([(
            "repository".to_string(),
            "repositories".to_string(),
        )]));
        let binding = create_binding_from_class::<MyService>(&options);
        assert_eq!(binding.key(), "repositories.MyService");
    }
}
