//! Class registry.
//!
//! Maps class names to factories so that records decoded from server
//! responses (pointers, embedded objects, query results) are constructed the
//! same way application code constructs them.

use crate::Record;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds an empty record for a class name.
pub type RecordFactory = Arc<dyn Fn(&str) -> Record + Send + Sync>;

/// Built-in classes served from their own endpoints.
pub const USER_CLASS: &str = "_User";
pub const ROLE_CLASS: &str = "_Role";
pub const INSTALLATION_CLASS: &str = "_Installation";

#[derive(Clone, Default)]
pub struct Registry {
    factories: HashMap<String, RecordFactory>,
}

impl Registry {
    /// An empty registry; every class maps to a plain record.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in user, role and installation classes.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_endpoint(USER_CLASS, "users")
            .with_endpoint(ROLE_CLASS, "roles")
            .with_endpoint(INSTALLATION_CLASS, "installations")
    }

    /// Register a class whose records live under a custom endpoint.
    pub fn with_endpoint(mut self, class_name: &str, endpoint: &str) -> Self {
        let endpoint = endpoint.to_string();
        self.register(
            class_name,
            Arc::new(move |class: &str| Record::new(class).with_endpoint(endpoint.clone())),
        );
        self
    }

    /// Register a factory, replacing any previous one for the class.
    pub fn register(&mut self, class_name: &str, factory: RecordFactory) {
        self.factories.insert(class_name.to_string(), factory);
    }

    pub fn is_registered(&self, class_name: &str) -> bool {
        self.factories.contains_key(class_name)
    }

    /// A new record for `class_name`.
    pub fn create(&self, class_name: &str) -> Record {
        match self.factories.get(class_name) {
            Some(factory) => factory(class_name),
            None => Record::new(class_name),
        }
    }

    /// A clean reference to an existing object of `class_name`.
    pub fn create_without_data(&self, class_name: &str, object_id: &str) -> Record {
        let template = self.create(class_name);
        Record::without_data(class_name, object_id).with_endpoint(template.endpoint())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut classes: Vec<_> = self.factories.keys().collect();
        classes.sort();
        f.debug_struct("Registry").field("classes", &classes).finish()
    }
}
