//! Estimator registry for resolving method names to estimator factories.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConnectivityError, ConnectivityResult};
use crate::estimators::{register_builtin_estimators, EstimatorFactory};

/// A requested connectivity method: a registry name or a caller-supplied factory.
#[derive(Clone)]
pub enum Method {
    Named(String),
    Custom(Arc<dyn EstimatorFactory>),
}

impl Method {
    pub fn custom<F>(factory: F) -> Self
    where
        F: EstimatorFactory + 'static,
    {
        Method::Custom(Arc::new(factory))
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Method::Custom(factory) => f.debug_tuple("Custom").field(&factory.name()).finish(),
        }
    }
}

impl From<&str> for Method {
    fn from(name: &str) -> Self {
        Method::Named(name.to_string())
    }
}

impl From<String> for Method {
    fn from(name: String) -> Self {
        Method::Named(name)
    }
}

/// A registry for estimator factories.
#[derive(Default, Clone)]
pub struct EstimatorRegistry {
    factories: HashMap<String, Arc<dyn EstimatorFactory>>,
}

impl EstimatorRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in methods.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        register_builtin_estimators(&mut registry);
        registry
    }

    /// Registers a factory under its own name, replacing any previous one.
    pub fn register(&mut self, factory: Arc<dyn EstimatorFactory>) {
        self.factories.insert(factory.name().to_string(), factory);
    }

    /// Registered method names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn EstimatorFactory>> {
        self.factories.get(name).cloned()
    }

    /// Resolves a requested method to the factory that builds its accumulators.
    pub fn resolve(&self, method: &Method) -> ConnectivityResult<Arc<dyn EstimatorFactory>> {
        match method {
            Method::Custom(factory) => Ok(Arc::clone(factory)),
            Method::Named(name) => self.get(name).ok_or_else(|| {
                ConnectivityError::invalid(format!(
                    "unknown connectivity method '{}', expected one of {:?} or a custom estimator",
                    name,
                    self.names()
                ))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::{CoherencyFactory, CoherencyKind};

    #[test]
    fn builtin_registry_knows_every_method() {
        let registry = EstimatorRegistry::builtin();
        assert_eq!(
            registry.names(),
            vec!["coh", "cohy", "imcoh", "pli", "pli2_unbiased", "wpli", "wpli2_debiased"]
        );
        for name in registry.names() {
            let factory = registry.resolve(&Method::from(name)).unwrap();
            assert_eq!(factory.name(), name);
        }
    }

    #[test]
    fn unknown_names_are_invalid() {
        let registry = EstimatorRegistry::builtin();
        let err = registry.resolve(&"notamethod".into()).err().unwrap();
        assert!(matches!(err, ConnectivityError::InvalidParameter { .. }));
        assert!(err.to_string().contains("notamethod"));
    }

    #[test]
    fn custom_methods_bypass_the_registry() {
        let registry = EstimatorRegistry::new();
        let method = Method::custom(CoherencyFactory::new(CoherencyKind::Coh));
        assert_eq!(registry.resolve(&method).unwrap().name(), "coh");
        assert_eq!(format!("{method:?}"), "Custom(\"coh\")");
    }
}
