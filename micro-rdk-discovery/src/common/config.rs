use crate::google;
use crate::proto::app::v1::ServiceConfig;

use std::collections::HashMap;
use std::num::{ParseFloatError, ParseIntError};
use thiserror::Error;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum AttributeError {
    #[error("failed to parse number")]
    ParseNumError,
    #[error("value not possible")]
    ConversionImpossibleError,
    #[error("attribute `{0}` was not found")]
    KeyNotFound(String),
    #[error("{0}")]
    ValidationError(String),
}

impl From<ParseIntError> for AttributeError {
    fn from(_: ParseIntError) -> AttributeError {
        AttributeError::ParseNumError
    }
}

impl From<ParseFloatError> for AttributeError {
    fn from(_: ParseFloatError) -> AttributeError {
        AttributeError::ParseNumError
    }
}

macro_rules! primitives
{
    ( $($t:ty),* ) =>
    {
        $(
          impl TryFrom<&Kind> for $t
          {
              type Error = AttributeError;
              fn try_from(value: &Kind) -> Result<Self, Self::Error> {
                  match value {
                      Kind::NullValue(v) => Ok(*v as $t),
                      Kind::NumberValue(v) => Ok(*v as $t),
                      Kind::BoolValue(v) => Ok(*v as $t),
                      Kind::StringValue(v) => Ok(v.parse::<$t>()?),
                      _ => Err(AttributeError::ConversionImpossibleError),
                  }
              }
          }
        )*
    }
}
primitives!(u32, i32, u8, u16, i16, i8, usize);

macro_rules! floats
{
    ( $($t:ty),* ) =>
    {
        $(
          impl TryFrom<&Kind> for $t
          {
              type Error = AttributeError;
              fn try_from(value: &Kind) -> Result<Self, Self::Error> {
                  match value {
                      Kind::NullValue(v) => Ok(*v as $t),
                      Kind::NumberValue(v) => Ok(*v as $t),
                      Kind::StringValue(v) => Ok(v.parse::<$t>()?),
                      _ => Err(AttributeError::ConversionImpossibleError),
                  }
              }
          }
        )*
    }
}

floats!(f64, f32);

impl<'b, V> TryFrom<&'b Kind> for HashMap<&'b str, V>
where
    V: std::convert::TryFrom<&'b Kind, Error = AttributeError>,
{
    type Error = AttributeError;
    fn try_from(value: &'b Kind) -> Result<Self, Self::Error> {
        match value {
            Kind::StructValue(v) => v
                .iter()
                .map(|(k, v)| (Ok((k.as_str(), v.try_into()?))))
                .collect(),
            _ => Err(AttributeError::ConversionImpossibleError),
        }
    }
}

impl<'a, T> TryFrom<&'a Kind> for Vec<T>
where
    T: std::convert::TryFrom<&'a Kind, Error = AttributeError>,
{
    type Error = AttributeError;
    fn try_from(value: &'a Kind) -> Result<Self, Self::Error> {
        match value {
            Kind::VecValue(v) => v.iter().map(|v| v.try_into()).collect(),
            _ => Err(AttributeError::ConversionImpossibleError),
        }
    }
}

impl<'b> TryFrom<&'b Kind> for &'b str {
    type Error = AttributeError;
    fn try_from(value: &'b Kind) -> Result<Self, Self::Error> {
        match value {
            Kind::StringValue(v) => Ok(v.as_str()),
            _ => Err(AttributeError::ConversionImpossibleError),
        }
    }
}

impl TryFrom<&Kind> for String {
    type Error = AttributeError;
    fn try_from(value: &Kind) -> Result<Self, Self::Error> {
        match value {
            Kind::StringValue(v) => Ok(v.to_string()),
            _ => Err(AttributeError::ConversionImpossibleError),
        }
    }
}

impl TryFrom<&Kind> for bool {
    type Error = AttributeError;
    fn try_from(value: &Kind) -> Result<Self, Self::Error> {
        match value {
            Kind::BoolValue(v) => Ok(*v),
            _ => Err(AttributeError::ConversionImpossibleError),
        }
    }
}

impl TryFrom<&Kind> for Kind {
    type Error = AttributeError;
    fn try_from(value: &Kind) -> Result<Self, Self::Error> {
        Ok(value.clone())
    }
}

/// In-memory attribute tree decoded from a `google.protobuf.Value`.
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    NullValue(i32),
    NumberValue(f64),
    StringValue(String),
    BoolValue(bool),
    VecValue(Vec<Kind>),
    StructValue(HashMap<String, Kind>),
}

impl Kind {
    pub fn get(&self, key: &str) -> Result<Option<&Kind>, AttributeError> {
        match self {
            Self::StructValue(v) => Ok(v.get(key)),
            _ => Err(AttributeError::KeyNotFound(key.to_string())),
        }
    }

    /// Fetch `key` from a struct value and convert it, failing when the key is absent.
    pub fn get_required<'a, T>(&'a self, key: &str) -> Result<T, AttributeError>
    where
        T: std::convert::TryFrom<&'a Kind, Error = AttributeError>,
    {
        self.get(key)?
            .ok_or_else(|| AttributeError::KeyNotFound(key.to_string()))?
            .try_into()
    }
}

impl TryFrom<&google::protobuf::value::Kind> for Kind {
    type Error = AttributeError;
    fn try_from(value: &google::protobuf::value::Kind) -> Result<Self, Self::Error> {
        match value {
            google::protobuf::value::Kind::BoolValue(v) => Ok(Kind::BoolValue(*v)),
            google::protobuf::value::Kind::NullValue(v) => Ok(Kind::NullValue(*v)),
            google::protobuf::value::Kind::StringValue(v) => Ok(Kind::StringValue(v.to_string())),
            google::protobuf::value::Kind::NumberValue(v) => Ok(Kind::NumberValue(*v)),
            google::protobuf::value::Kind::StructValue(v) => Kind::try_from(v),
            google::protobuf::value::Kind::ListValue(v) => {
                let mapped = v
                    .values
                    .iter()
                    .map(|val| match &val.kind {
                        None => Ok::<Kind, AttributeError>(Kind::NullValue(0)),
                        Some(unwrapped) => Kind::try_from(unwrapped),
                    })
                    .collect::<Result<Vec<Kind>, AttributeError>>()?;
                Ok(Kind::VecValue(mapped))
            }
        }
    }
}

impl TryFrom<&google::protobuf::Struct> for Kind {
    type Error = AttributeError;
    fn try_from(value: &google::protobuf::Struct) -> Result<Self, Self::Error> {
        let mut attr_map = HashMap::new();
        for (k, val) in value.fields.iter() {
            match &val.kind {
                Some(unwrapped) => {
                    attr_map.insert(k.to_string(), unwrapped.try_into()?);
                }
                None => continue,
            };
        }
        Ok(Kind::StructValue(attr_map))
    }
}

impl From<&Kind> for google::protobuf::Value {
    fn from(value: &Kind) -> Self {
        let kind = match value {
            Kind::NullValue(v) => google::protobuf::value::Kind::NullValue(*v),
            Kind::NumberValue(v) => google::protobuf::value::Kind::NumberValue(*v),
            Kind::StringValue(v) => google::protobuf::value::Kind::StringValue(v.clone()),
            Kind::BoolValue(v) => google::protobuf::value::Kind::BoolValue(*v),
            Kind::VecValue(v) => {
                google::protobuf::value::Kind::ListValue(google::protobuf::ListValue {
                    values: v.iter().map(google::protobuf::Value::from).collect(),
                })
            }
            Kind::StructValue(v) => google::protobuf::value::Kind::StructValue(struct_from_map(v)),
        };
        google::protobuf::Value { kind: Some(kind) }
    }
}

pub(crate) fn struct_from_map(map: &HashMap<String, Kind>) -> google::protobuf::Struct {
    google::protobuf::Struct {
        fields: map
            .iter()
            .map(|(k, v)| (k.clone(), google::protobuf::Value::from(v)))
            .collect(),
    }
}

impl TryFrom<&Kind> for google::protobuf::Struct {
    type Error = AttributeError;
    fn try_from(value: &Kind) -> Result<Self, Self::Error> {
        match value {
            Kind::StructValue(v) => Ok(struct_from_map(v)),
            _ => Err(AttributeError::ConversionImpossibleError),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct DynamicServiceConfig {
    pub name: String,
    pub namespace: String,
    pub r#type: String,
    pub api: String,
    pub model: String,
    pub depends_on: Vec<String>,
    pub attributes: Option<HashMap<String, Kind>>,
}

impl TryFrom<&ServiceConfig> for DynamicServiceConfig {
    type Error = AttributeError;
    fn try_from(value: &ServiceConfig) -> Result<Self, Self::Error> {
        let mut attrs_opt: Option<HashMap<String, Kind>> = None;
        if let Some(cfg_attrs) = value.attributes.as_ref() {
            let mut attrs = HashMap::new();
            for (k, v) in cfg_attrs.fields.iter() {
                let val: Kind = match &v.kind {
                    None => return Err(AttributeError::KeyNotFound(k.to_string())),
                    Some(inner_v) => inner_v.try_into()?,
                };
                attrs.insert(k.to_string(), val);
            }
            attrs_opt = Some(attrs);
        }
        Ok(Self {
            name: value.name.to_string(),
            namespace: value.namespace.to_string(),
            r#type: value.r#type.to_string(),
            api: value.api.to_string(),
            model: value.model.to_string(),
            depends_on: value.depends_on.clone(),
            attributes: attrs_opt,
        })
    }
}

#[derive(Debug)]
pub enum ConfigType<'a> {
    Dynamic(&'a DynamicServiceConfig),
}

impl<'a> ConfigType<'a> {
    pub fn get_attribute<T>(&'a self, key: &str) -> Result<T, AttributeError>
    where
        T: std::convert::TryFrom<&'a Kind, Error = AttributeError>,
    {
        match self {
            Self::Dynamic(cfg) => cfg.get_attribute::<T>(key),
        }
    }
    pub fn get_name(&self) -> &str {
        match self {
            Self::Dynamic(cfg) => cfg.get_name(),
        }
    }
}

pub trait ResourceConfig {
    fn get_name(&self) -> &str;
    fn get_model(&self) -> &str;
    /// Service subtype, e.g. `discovery`.
    fn get_type(&self) -> &str;
    fn get_attribute<'a, T>(&'a self, key: &str) -> Result<T, AttributeError>
    where
        T: std::convert::TryFrom<&'a Kind, Error = AttributeError>;
}

impl ResourceConfig for DynamicServiceConfig {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn get_model(&self) -> &str {
        &self.model
    }

    // An api triplet such as `rdk:service:discovery` takes precedence over the legacy type field.
    fn get_type(&self) -> &str {
        match self.api.rsplit(':').next() {
            Some(subtype) if !self.api.is_empty() => subtype,
            _ => &self.r#type,
        }
    }

    fn get_attribute<'a, T>(&'a self, key: &str) -> Result<T, AttributeError>
    where
        T: std::convert::TryFrom<&'a Kind, Error = AttributeError>,
    {
        if let Some(v) = self.attributes.as_ref() {
            if let Some(v) = v.get(key) {
                return v.try_into();
            }
        }
        Err(AttributeError::KeyNotFound(key.to_string()))
    }
}
