use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::method::ServerMethod;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Method already registered")]
    AlreadyRegistered,

    #[error("Method not registered")]
    NotRegistered,
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Method name to prototype. Safe to mutate while requests are being
/// dispatched.
#[derive(Default)]
pub struct MethodRegistry {
    methods: DashMap<String, Arc<dyn ServerMethod>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, method: Arc<dyn ServerMethod>) -> Result<()> {
        match self.methods.entry(method.method_name().to_string()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered),
            Entry::Vacant(slot) => {
                tracing::debug!("Registered method {}", method.method_name());
                slot.insert(method);
                Ok(())
            }
        }
    }

    pub fn unregister_by_name(&self, name: &str) -> Result<()> {
        match self.methods.remove(name) {
            Some(_) => {
                tracing::debug!("Unregistered method {}", name);
                Ok(())
            }
            None => Err(RegistryError::NotRegistered),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ServerMethod>> {
        self.methods.get(name).map(|entry| entry.value().clone())
    }

    pub fn methods(&self) -> Vec<Arc<dyn ServerMethod>> {
        self.methods
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
