//! JSON snapshots of contexts and bindings for diagnostics.

use crate::binding::{Binding, ValueSource};
use crate::context::Context;
use serde_json::{json, Map, Value};
use std::any::TypeId;
use std::collections::HashMap;

/// Options for [`Context::inspect`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InspectionOptions {
    /// Render the parent chain under `parent`.
    pub include_parent: bool,
    /// Render constructor injections of class and provider bindings.
    pub include_injections: bool,
}

impl Default for InspectionOptions {
    fn default() -> Self {
        Self {
            include_parent: true,
            include_injections: false,
        }
    }
}

/// Gives distinct types sharing a short name distinct labels (`Name`, `Name #1`, ...).
#[derive(Default)]
struct ClassNames {
    seen: HashMap<&'static str, Vec<TypeId>>,
}

impl ClassNames {
    fn label(&mut self, name: &'static str, id: TypeId) -> String {
        let ids = self.seen.entry(name).or_default();
        let index = match ids.iter().position(|t| *t == id) {
            Some(index) => index,
            None => {
                ids.push(id);
                ids.len() - 1
            }
        };
        if index == 0 {
            name.to_string()
        } else {
            format!("{name} #{index}")
        }
    }
}

impl Binding {
    /// Plain JSON description of this binding.
    pub fn to_json(&self) -> Value {
        self.render(InspectionOptions::default(), None)
    }

    /// Like [`Binding::to_json`], optionally with injection metadata.
    pub fn inspect(&self, options: InspectionOptions) -> Value {
        self.render(options, None)
    }

    fn render(&self, options: InspectionOptions, names: Option<&mut ClassNames>) -> Value {
        let mut json = Map::new();
        json.insert("key".into(), json!(self.key()));
        json.insert("scope".into(), json!(self.scope().as_str()));
        json.insert("tags".into(), self.tag_map().to_json());
        json.insert("isLocked".into(), json!(self.is_locked()));
        if let Some(binding_type) = self.binding_type() {
            json.insert("type".into(), json!(binding_type.as_str()));
        }

        let (field, factory) = match self.source() {
            Some(ValueSource::Class(factory)) => ("valueConstructor", factory),
            Some(ValueSource::Provider(factory)) => ("providerConstructor", factory),
            Some(ValueSource::Alias(target)) => {
                json.insert("alias".into(), json!(target.to_string()));
                return Value::Object(json);
            }
            _ => return Value::Object(json),
        };

        let name = match names {
            Some(names) => names.label(factory.type_name, factory.type_id),
            None => factory.type_name.to_string(),
        };
        json.insert(field.into(), json!(name));

        if options.include_injections && !factory.injections.is_empty() {
            let args: Vec<Value> = factory
                .injections
                .iter()
                .enumerate()
                .map(|(i, injection)| injection.describe(&format!("{name}.constructor[{i}]")))
                .collect();
            json.insert("injections".into(), json!({ "constructorArguments": args }));
        }
        Value::Object(json)
    }
}

impl Context {
    /// Own bindings as a JSON object keyed by binding key.
    pub fn to_json(&self) -> Value {
        let bindings: Map<String, Value> = self
            .bindings()
            .iter()
            .map(|b| (b.key().to_string(), b.to_json()))
            .collect();
        Value::Object(bindings)
    }

    /// `{name, bindings, parent?}` snapshot of this context and, optionally, its ancestors.
    pub fn inspect(&self, options: InspectionOptions) -> Value {
        self.inspect_with(options, &mut ClassNames::default())
    }

    fn inspect_with(&self, options: InspectionOptions, names: &mut ClassNames) -> Value {
        let bindings: Map<String, Value> = self
            .bindings()
            .iter()
            .map(|b| (b.key().to_string(), b.render(options, Some(&mut *names))))
            .collect();
        let mut json = Map::new();
        json.insert("name".into(), json!(self.name()));
        json.insert("bindings".into(), Value::Object(bindings));
        if options.include_parent {
            if let Some(parent) = self.parent() {
                json.insert("parent".into(), parent.inspect_with(options, names));
            }
        }
        Value::Object(json)
    }
}
