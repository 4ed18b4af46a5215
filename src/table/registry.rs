//! Host registry: the host library's own name-indexed capabilities.
//!
//! The registry is filled by the host during its initialization: every
//! function, type descriptor and static datum it intends to export is
//! registered under its manifest name. The builder then places each one at
//! the ordinal the manifest assigns. Names only matter on the host side;
//! clients never see them.

use std::any::Any;
use std::collections::HashMap;

use super::slot::{Payload, SlotKind};

/// A registered capability awaiting placement.
#[derive(Debug, Clone)]
pub struct Registered {
    pub kind: SlotKind,
    pub payload: Payload,
}

/// Name-indexed registry of host capabilities.
#[derive(Debug, Default)]
pub struct HostRegistry {
    entries: HashMap<String, Registered>,
}

impl HostRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callable. Pass function pointers with their exact
    /// signature, e.g. `my_fn as fn(&[f64]) -> f64`.
    pub fn register_function<F: Any + Send + Sync>(&mut self, name: &str, function: F) {
        self.register(name, SlotKind::Function, Payload::new(function));
    }

    /// Register a type descriptor, usually a `&'static` reference.
    pub fn register_type_object<T: Any + Send + Sync>(&mut self, name: &str, descriptor: T) {
        self.register(name, SlotKind::TypeObject, Payload::new(descriptor));
    }

    /// Register a static datum.
    pub fn register_static<T: Any + Send + Sync>(&mut self, name: &str, value: T) {
        self.register(name, SlotKind::StaticData, Payload::new(value));
    }

    /// Register an already-wrapped payload. Replaces any earlier entry
    /// with the same name.
    pub fn register(&mut self, name: &str, kind: SlotKind, payload: Payload) {
        if self
            .entries
            .insert(name.to_string(), Registered { kind, payload })
            .is_some()
        {
            log::debug!("Replaced registered capability `{}`", name);
        }
    }

    /// Look a capability up by name.
    pub fn get(&self, name: &str) -> Option<&Registered> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Get the total number of registered capabilities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
