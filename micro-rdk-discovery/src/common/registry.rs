use std::collections::HashMap as Map;
use thiserror::Error;

use super::{
    config::ConfigType,
    discovery::{DiscoveryError, DiscoveryType},
    robot::Resource,
};
use crate::proto::common::v1::ResourceName;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum RegistryError {
    #[error("RegistryError : Model '{0}' not found")]
    ModelNotFound(String),
    #[error("RegistryError : model '{0}' already exists")]
    ModelAlreadyRegistered(&'static str),
    #[error("RegistryError : service type '{0}' not supported")]
    ServiceTypeNotSupported(String),
}

// ResourceKey is an identifier for a service hosted by a robot. The first element is the
// service subtype (discovery, ...) and the second element is its name.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct ResourceKey(pub &'static str, pub String);

impl ResourceKey {
    pub fn new(subtype: &str, name: String) -> Result<Self, RegistryError> {
        let subtype_str = match subtype {
            "discovery" => crate::common::discovery::COMPONENT_NAME,
            &_ => {
                return Err(RegistryError::ServiceTypeNotSupported(subtype.to_string()));
            }
        };
        Ok(Self(subtype_str, name))
    }
}

impl TryFrom<ResourceName> for ResourceKey {
    type Error = RegistryError;
    fn try_from(value: ResourceName) -> Result<Self, Self::Error> {
        Self::new(&value.subtype, value.name)
    }
}

pub struct Dependency(pub ResourceKey, pub Resource);

/// Fn that returns a `DiscoveryType`, `Arc<Mutex<dyn Discovery>>`
type DiscoveryConstructor =
    dyn Fn(ConfigType, Vec<Dependency>) -> Result<DiscoveryType, DiscoveryError>;

// Builtin models are configured either bare (`fake`) or fully qualified (`rdk:builtin:fake`).
fn strip_builtin_prefix(model: &str) -> &str {
    model.strip_prefix("rdk:builtin:").unwrap_or(model)
}

#[derive(Clone)]
pub struct ServiceRegistry {
    discoveries: Map<&'static str, &'static DiscoveryConstructor>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        #[allow(unused_mut)]
        let mut r = Self::new();
        #[cfg(feature = "builtin-components")]
        {
            crate::common::discovery::register_models(&mut r);
        }
        r
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            discoveries: Map::new(),
        }
    }

    pub fn register_discovery(
        &mut self,
        model: &'static str,
        constructor: &'static DiscoveryConstructor,
    ) -> Result<(), RegistryError> {
        let model = strip_builtin_prefix(model);
        if self.discoveries.contains_key(model) {
            return Err(RegistryError::ModelAlreadyRegistered(model));
        }
        let _ = self.discoveries.insert(model, constructor);
        Ok(())
    }

    pub fn get_discovery_constructor(
        &self,
        model: String,
    ) -> Result<&'static DiscoveryConstructor, RegistryError> {
        if let Some(ctor) = self.discoveries.get(strip_builtin_prefix(&model)) {
            return Ok(*ctor);
        }
        Err(RegistryError::ModelNotFound(model))
    }

    pub fn models(&self) -> impl Iterator<Item = &&'static str> {
        self.discoveries.keys()
    }
}
