use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::KeyError;
use crate::key::KeyDescriptor;

/// Named collection of [`KeyDescriptor`]s.
///
/// Deserializes from a plain table so descriptors can live in configuration:
///
/// ```toml
/// [order_detail]
/// template = "order:%s:detail"
/// ttl_millis = 60000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyRegistry {
    entries: BTreeMap<String, KeyDescriptor>,
}

impl KeyRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under `name`. Names are unique.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        descriptor: KeyDescriptor,
    ) -> Result<(), KeyError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(KeyError::DuplicateName(name));
        }
        self.entries.insert(name, descriptor);
        Ok(())
    }

    /// Look up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&KeyDescriptor> {
        self.entries.get(name)
    }

    /// Look up a descriptor by name, failing if it was never registered.
    pub fn require(&self, name: &str) -> Result<&KeyDescriptor, KeyError> {
        self.get(name)
            .ok_or_else(|| KeyError::UnknownName(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate descriptors in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyDescriptor)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeySpec;

    #[test]
    fn register_and_lookup() {
        let mut registry = KeyRegistry::new();
        registry
            .register("order_lock", KeyDescriptor::new("order:%s:lock", 1000))
            .unwrap();

        let d = registry.require("order_lock").unwrap();
        assert_eq!(d.template(), "order:%s:lock");
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("order_lock"));
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut registry = KeyRegistry::new();
        registry
            .register("a", KeyDescriptor::persistent("a"))
            .unwrap();
        let err = registry
            .register("a", KeyDescriptor::persistent("b"))
            .unwrap_err();
        assert_eq!(err, KeyError::DuplicateName("a".into()));
        assert_eq!(registry.require("a").unwrap().template(), "a");
    }

    #[test]
    fn unknown_name() {
        let registry = KeyRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(
            registry.require("missing").unwrap_err(),
            KeyError::UnknownName("missing".into())
        );
    }

    #[test]
    fn deserialize_from_toml() {
        let toml = r#"
            [order_detail]
            template = "order:%s:detail"
            ttl_millis = 60000

            [feature_flags]
            template = "flags"
        "#;
        let registry: KeyRegistry = toml::from_str(toml).unwrap();
        assert_eq!(registry.len(), 2);

        let detail = registry.require("order_detail").unwrap();
        assert_eq!(detail.ttl_millis(), 60_000);
        assert!(registry.require("feature_flags").unwrap().never_expires());

        let names: Vec<&str> = registry.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["feature_flags", "order_detail"]);
    }
}
