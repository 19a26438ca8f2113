use std::collections::BTreeMap;

use log::*;
use thiserror::Error;

use super::{
    config::{AttributeError, ConfigType, DynamicServiceConfig, ResourceConfig},
    discovery::{DiscoveryError, DiscoveryType},
    registry::{Dependency, RegistryError, ResourceKey, ServiceRegistry},
};
use crate::proto::{app::v1::ServiceConfig, common::v1::ResourceName};

#[derive(Clone)]
pub enum Resource {
    Discovery(DiscoveryType),
}

#[derive(Error, Debug)]
pub enum RobotError {
    #[error(transparent)]
    RobotConfigError(#[from] AttributeError),
    #[error(transparent)]
    RobotRegistryError(#[from] RegistryError),
    #[error("failed to build service `{0}`: {1}")]
    RobotServiceBuildError(String, DiscoveryError),
    #[error("service name `{0}` is used more than once")]
    RobotDuplicateName(String),
    #[error("service `{0}` depends on `{1}` which is not configured before it")]
    RobotMissingDependency(String, String),
}

/// A robot hosting named discovery services.
#[derive(Default)]
pub struct LocalRobot {
    resources: BTreeMap<ResourceKey, Resource>,
}

impl LocalRobot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every discovery service in `configs`, in order. Services of other subtypes are
    /// skipped. A service may depend on services configured before it.
    pub fn from_service_configs(
        configs: &[ServiceConfig],
        registry: &ServiceRegistry,
    ) -> Result<Self, RobotError> {
        let mut robot = Self::new();
        for cfg in configs {
            let dynamic = DynamicServiceConfig::try_from(cfg)?;
            let key = match ResourceKey::new(dynamic.get_type(), dynamic.get_name().to_string()) {
                Ok(key) => key,
                Err(RegistryError::ServiceTypeNotSupported(subtype)) => {
                    warn!(
                        "skipping service `{}` of unsupported type `{}`",
                        dynamic.get_name(),
                        subtype
                    );
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            if robot.resources.contains_key(&key) {
                return Err(RobotError::RobotDuplicateName(key.1));
            }
            let deps = robot.resolve_dependencies(&dynamic)?;
            let ctor = registry.get_discovery_constructor(dynamic.get_model().to_string())?;
            let service = ctor(ConfigType::Dynamic(&dynamic), deps)
                .map_err(|err| RobotError::RobotServiceBuildError(key.1.clone(), err))?;
            info!(
                "built {} service `{}` with model `{}`",
                key.0,
                key.1,
                dynamic.get_model()
            );
            robot.insert_discovery(key.1, service);
        }
        Ok(robot)
    }

    fn resolve_dependencies(
        &self,
        cfg: &DynamicServiceConfig,
    ) -> Result<Vec<Dependency>, RobotError> {
        cfg.depends_on
            .iter()
            .map(|name| {
                self.resources
                    .iter()
                    .find(|(key, _)| &key.1 == name)
                    .map(|(key, res)| Dependency(key.clone(), res.clone()))
                    .ok_or_else(|| {
                        RobotError::RobotMissingDependency(cfg.name.clone(), name.clone())
                    })
            })
            .collect()
    }

    pub fn insert_discovery(&mut self, name: String, service: DiscoveryType) {
        let _ = self.resources.insert(
            ResourceKey(crate::common::discovery::COMPONENT_NAME, name),
            Resource::Discovery(service),
        );
    }

    pub fn get_discovery_by_name(&self, name: String) -> Option<DiscoveryType> {
        let key = ResourceKey(crate::common::discovery::COMPONENT_NAME, name);
        match self.resources.get(&key) {
            Some(Resource::Discovery(r)) => Some(r.clone()),
            None => None,
        }
    }

    pub fn get_resource_names(&self) -> Vec<ResourceName> {
        self.resources
            .keys()
            .map(|key| ResourceName {
                namespace: "rdk".to_string(),
                r#type: "service".to_string(),
                subtype: key.0.to_string(),
                name: key.1.clone(),
            })
            .collect()
    }
}

#[cfg(all(test, feature = "builtin-components"))]
mod tests {
    use std::collections::HashMap;

    use crate::common::{
        registry::{RegistryError, ServiceRegistry},
        robot::{LocalRobot, RobotError},
    };
    use crate::google::protobuf::{value::Kind, ListValue, Struct, Value};
    use crate::proto::app::v1::ServiceConfig;

    fn string_value(s: &str) -> Value {
        Value {
            kind: Some(Kind::StringValue(s.to_owned())),
        }
    }

    fn fake_discovery(name: &str, model: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.to_owned(),
            namespace: "rdk".to_owned(),
            r#type: "discovery".to_owned(),
            model: model.to_owned(),
            attributes: Some(Struct {
                fields: HashMap::from([(
                    "discoveries".to_owned(),
                    Value {
                        kind: Some(Kind::ListValue(ListValue {
                            values: vec![Value {
                                kind: Some(Kind::StructValue(Struct {
                                    fields: HashMap::from([
                                        ("type".to_owned(), string_value("camera")),
                                        ("model".to_owned(), string_value("webcam")),
                                    ]),
                                })),
                            }],
                        })),
                    },
                )]),
            }),
            ..Default::default()
        }
    }

    #[test_log::test]
    fn test_robot_from_configs() {
        let configs = vec![
            fake_discovery("discovery2", "rdk:builtin:fake"),
            ServiceConfig {
                name: "motion".to_owned(),
                api: "rdk:service:motion".to_owned(),
                model: "builtin".to_owned(),
                ..Default::default()
            },
            fake_discovery("discovery1", "fake"),
        ];
        let registry = ServiceRegistry::default();
        let robot = LocalRobot::from_service_configs(&configs, &registry).unwrap();

        let names = robot.get_resource_names();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].name, "discovery1");
        assert_eq!(names[1].name, "discovery2");
        assert_eq!(names[0].subtype, "discovery");
        assert_eq!(names[0].r#type, "service");

        let service = robot.get_discovery_by_name("discovery1".to_owned());
        assert!(service.is_some());
        let found = service
            .unwrap()
            .lock()
            .unwrap()
            .discover_resources(None)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].model, "webcam");

        assert!(robot.get_discovery_by_name("motion".to_owned()).is_none());
    }

    #[test_log::test]
    fn test_robot_rejects_bad_configs() {
        let registry = ServiceRegistry::default();

        let configs = vec![
            fake_discovery("discovery1", "fake"),
            fake_discovery("discovery1", "fake"),
        ];
        assert!(matches!(
            LocalRobot::from_service_configs(&configs, &registry),
            Err(RobotError::RobotDuplicateName(name)) if name == "discovery1"
        ));

        let configs = vec![fake_discovery("discovery1", "mdns")];
        assert!(matches!(
            LocalRobot::from_service_configs(&configs, &registry),
            Err(RobotError::RobotRegistryError(RegistryError::ModelNotFound(_)))
        ));

        let mut dependent = fake_discovery("discovery2", "fake");
        dependent.depends_on = vec!["discovery1".to_owned()];
        assert!(matches!(
            LocalRobot::from_service_configs(&[dependent.clone()], &registry),
            Err(RobotError::RobotMissingDependency(_, dep)) if dep == "discovery1"
        ));
        let configs = vec![fake_discovery("discovery1", "fake"), dependent];
        assert!(LocalRobot::from_service_configs(&configs, &registry).is_ok());
    }
}
