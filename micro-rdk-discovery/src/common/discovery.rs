//! The discovery service enumerates components a machine can detect and reports each one as a
//! `ComponentConfig` ready to be added to a robot configuration.
use std::sync::{Arc, Mutex};

use thiserror::Error;

use super::{config::AttributeError, generic::DoCommand};
use crate::{google::protobuf::Struct, proto::app::v1::ComponentConfig};

#[cfg(feature = "builtin-components")]
use {
    super::{
        config::{ConfigType, Kind},
        generic::GenericError,
        registry::{Dependency, ServiceRegistry},
    },
    crate::google::protobuf::{value, Value},
    std::collections::HashMap,
};

pub static COMPONENT_NAME: &str = "discovery";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    DiscoveryConfigError(#[from] AttributeError),
    #[error("Discovery: method {0} unimplemented")]
    DiscoveryMethodUnimplemented(&'static str),
    #[error("Discovery: failed to discover resources: {0}")]
    DiscoveryFailed(String),
    #[error("Discovery: poisoned lock")]
    DiscoveryLockPoisoned,
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "builtin-components")]
pub(crate) fn register_models(registry: &mut ServiceRegistry) {
    if registry
        .register_discovery("fake", &FakeDiscovery::from_config)
        .is_err()
    {
        log::error!("model fake is already registered")
    }
}

pub trait Discovery: DoCommand {
    /// Returns the components this service can detect, in a stable order. `extra` carries
    /// implementation specific options.
    fn discover_resources(
        &mut self,
        extra: Option<Struct>,
    ) -> Result<Vec<ComponentConfig>, DiscoveryError>;
}

pub type DiscoveryType = Arc<Mutex<dyn Discovery>>;

impl<L> Discovery for Mutex<L>
where
    L: ?Sized + Discovery,
{
    fn discover_resources(
        &mut self,
        extra: Option<Struct>,
    ) -> Result<Vec<ComponentConfig>, DiscoveryError> {
        self.get_mut()
            .map_err(|_| DiscoveryError::DiscoveryLockPoisoned)?
            .discover_resources(extra)
    }
}

impl<A> Discovery for Arc<Mutex<A>>
where
    A: ?Sized + Discovery,
{
    fn discover_resources(
        &mut self,
        extra: Option<Struct>,
    ) -> Result<Vec<ComponentConfig>, DiscoveryError> {
        self.lock()
            .map_err(|_| DiscoveryError::DiscoveryLockPoisoned)?
            .discover_resources(extra)
    }
}

/// Reports the components listed in its `discoveries` attribute.
#[cfg(feature = "builtin-components")]
pub struct FakeDiscovery {
    discoveries: Vec<ComponentConfig>,
}

#[cfg(feature = "builtin-components")]
impl FakeDiscovery {
    pub fn new(discoveries: Vec<ComponentConfig>) -> Self {
        Self { discoveries }
    }

    pub(crate) fn from_config(
        cfg: ConfigType,
        _: Vec<Dependency>,
    ) -> Result<DiscoveryType, DiscoveryError> {
        let entries: Vec<Kind> = match cfg.get_attribute::<Vec<Kind>>("discoveries") {
            Ok(entries) => entries,
            Err(AttributeError::KeyNotFound(_)) => vec![],
            Err(err) => return Err(err.into()),
        };
        let discoveries = entries
            .iter()
            .map(component_config_from_kind)
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!(
            "fake discovery `{}` configured with {} component(s)",
            cfg.get_name(),
            discoveries.len()
        );
        Ok(Arc::new(Mutex::new(Self::new(discoveries))))
    }
}

#[cfg(feature = "builtin-components")]
fn optional_string(entry: &Kind, key: &str) -> Result<String, AttributeError> {
    match entry.get(key)? {
        Some(v) => v.try_into(),
        None => Ok(String::new()),
    }
}

#[cfg(feature = "builtin-components")]
fn component_config_from_kind(entry: &Kind) -> Result<ComponentConfig, AttributeError> {
    let api = optional_string(entry, "api")?;
    let mut r#type = optional_string(entry, "type")?;
    if r#type.is_empty() {
        r#type = api.rsplit(':').next().unwrap_or_default().to_string();
    }
    if r#type.is_empty() {
        return Err(AttributeError::ValidationError(
            "discovered component needs a `type` or an `api`".to_string(),
        ));
    }
    let model: String = entry.get_required("model")?;
    let attributes = match entry.get("attributes")? {
        Some(attrs) => Some(Struct::try_from(attrs)?),
        None => None,
    };
    Ok(ComponentConfig {
        name: optional_string(entry, "name")?,
        namespace: optional_string(entry, "namespace")?,
        r#type,
        model,
        api,
        attributes,
        ..Default::default()
    })
}

#[cfg(feature = "builtin-components")]
impl Discovery for FakeDiscovery {
    fn discover_resources(
        &mut self,
        extra: Option<Struct>,
    ) -> Result<Vec<ComponentConfig>, DiscoveryError> {
        let wanted = extra.as_ref().and_then(|extra| {
            extra.fields.get("type").and_then(|v| match &v.kind {
                Some(value::Kind::StringValue(s)) => Some(s.clone()),
                _ => None,
            })
        });
        Ok(self
            .discoveries
            .iter()
            .filter(|cfg| wanted.as_ref().is_none_or(|t| &cfg.r#type == t))
            .cloned()
            .collect())
    }
}

#[cfg(feature = "builtin-components")]
impl DoCommand for FakeDiscovery {
    fn do_command(
        &mut self,
        command_struct: Option<Struct>,
    ) -> Result<Option<Struct>, GenericError> {
        let mut res = HashMap::new();
        if let Some(command_struct) = command_struct.as_ref() {
            for (key, val) in &command_struct.fields {
                match key.as_str() {
                    "ping" => {
                        res.insert(
                            "ping".to_string(),
                            Value {
                                kind: Some(value::Kind::StringValue("pinged".to_string())),
                            },
                        );
                    }
                    "echo" => {
                        res.insert("echoed".to_string(), val.to_owned());
                    }
                    "count" => {
                        res.insert(
                            "count".to_string(),
                            Value {
                                kind: Some(value::Kind::NumberValue(
                                    self.discoveries.len() as f64,
                                )),
                            },
                        );
                    }
                    _ => return Err(GenericError::InvalidCommand(key.to_string())),
                };
            }
        }
        Ok(Some(Struct { fields: res }))
    }
}
