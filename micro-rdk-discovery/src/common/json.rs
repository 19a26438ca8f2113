//! Proto3 JSON mapping for the messages served by the discovery service.
//!
//! Field names are written in lowerCamelCase and read in either lowerCamelCase or their original
//! proto spelling. Default scalars and empty repeated fields are omitted on output. Unknown
//! fields are ignored on input.
use serde_json::{Map, Number, Value as JsonValue};
use thiserror::Error;

use crate::google::protobuf::{value::Kind, ListValue, NullValue, Struct, Value};
use crate::google::rpc::Status;
use crate::proto::{
    app::v1::{ComponentConfig, ResourceLevelServiceConfig, ServiceConfig},
    common::v1::{DoCommandRequest, DoCommandResponse},
    service::discovery::v1::{DiscoverResourcesRequest, DiscoverResourcesResponse},
};

#[derive(Debug, Error, PartialEq)]
pub enum JsonError {
    #[error("malformed json: {0}")]
    Syntax(String),
    #[error("expected a json object")]
    ExpectedObject,
    #[error("field `{0}` has an invalid type, expected {1}")]
    InvalidField(String, &'static str),
    #[error("number {0} cannot be represented in json")]
    NonFiniteNumber(f64),
}

impl From<serde_json::Error> for JsonError {
    fn from(value: serde_json::Error) -> Self {
        JsonError::Syntax(value.to_string())
    }
}

/// A message with a proto3 JSON representation.
pub trait JsonMessage: Sized {
    fn to_json(&self) -> Result<JsonValue, JsonError>;
    fn from_json(value: &JsonValue) -> Result<Self, JsonError>;

    fn to_json_string(&self) -> Result<String, JsonError> {
        Ok(serde_json::to_string(&self.to_json()?)?)
    }

    fn from_json_slice(bytes: &[u8]) -> Result<Self, JsonError> {
        let value: JsonValue = serde_json::from_slice(bytes)?;
        Self::from_json(&value)
    }
}

pub fn value_to_json(value: &Value) -> Result<JsonValue, JsonError> {
    Ok(match &value.kind {
        None | Some(Kind::NullValue(_)) => JsonValue::Null,
        Some(Kind::NumberValue(n)) => {
            JsonValue::Number(Number::from_f64(*n).ok_or(JsonError::NonFiniteNumber(*n))?)
        }
        Some(Kind::StringValue(s)) => JsonValue::String(s.clone()),
        Some(Kind::BoolValue(b)) => JsonValue::Bool(*b),
        Some(Kind::StructValue(s)) => struct_to_json(s)?,
        Some(Kind::ListValue(l)) => JsonValue::Array(
            l.values
                .iter()
                .map(value_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
    })
}

pub fn value_from_json(value: &JsonValue) -> Value {
    let kind = match value {
        JsonValue::Null => Kind::NullValue(NullValue::NullValue as i32),
        // serde_json numbers always fit an f64, possibly with precision loss for large integers
        JsonValue::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or_default()),
        JsonValue::String(s) => Kind::StringValue(s.clone()),
        JsonValue::Bool(b) => Kind::BoolValue(*b),
        JsonValue::Array(a) => Kind::ListValue(ListValue {
            values: a.iter().map(value_from_json).collect(),
        }),
        JsonValue::Object(o) => Kind::StructValue(struct_from_json_map(o)),
    };
    Value { kind: Some(kind) }
}

pub fn struct_to_json(value: &Struct) -> Result<JsonValue, JsonError> {
    let mut map = Map::new();
    for (k, v) in value.fields.iter() {
        map.insert(k.clone(), value_to_json(v)?);
    }
    Ok(JsonValue::Object(map))
}

fn struct_from_json_map(map: &Map<String, JsonValue>) -> Struct {
    Struct {
        fields: map
            .iter()
            .map(|(k, v)| (k.clone(), value_from_json(v)))
            .collect(),
    }
}

pub fn struct_from_json(value: &JsonValue) -> Result<Struct, JsonError> {
    match value {
        JsonValue::Object(o) => Ok(struct_from_json_map(o)),
        _ => Err(JsonError::ExpectedObject),
    }
}

/// Reads the fields of a JSON object accepting both spellings of a field name.
struct FieldReader<'a>(&'a Map<String, JsonValue>);

impl<'a> FieldReader<'a> {
    fn new(value: &'a JsonValue) -> Result<Self, JsonError> {
        match value {
            JsonValue::Object(o) => Ok(Self(o)),
            _ => Err(JsonError::ExpectedObject),
        }
    }

    fn field(&self, json_name: &str, proto_name: &str) -> Option<&'a JsonValue> {
        self.0
            .get(json_name)
            .or_else(|| self.0.get(proto_name))
            .filter(|v| !v.is_null())
    }

    fn string(&self, json_name: &str, proto_name: &str) -> Result<String, JsonError> {
        match self.field(json_name, proto_name) {
            None => Ok(String::new()),
            Some(JsonValue::String(s)) => Ok(s.clone()),
            Some(_) => Err(JsonError::InvalidField(json_name.to_string(), "a string")),
        }
    }

    fn strings(&self, json_name: &str, proto_name: &str) -> Result<Vec<String>, JsonError> {
        match self.field(json_name, proto_name) {
            None => Ok(vec![]),
            Some(JsonValue::Array(a)) => a
                .iter()
                .map(|v| match v {
                    JsonValue::String(s) => Ok(s.clone()),
                    _ => Err(JsonError::InvalidField(
                        json_name.to_string(),
                        "a list of strings",
                    )),
                })
                .collect(),
            Some(_) => Err(JsonError::InvalidField(
                json_name.to_string(),
                "a list of strings",
            )),
        }
    }

    fn structure(&self, json_name: &str, proto_name: &str) -> Result<Option<Struct>, JsonError> {
        self.field(json_name, proto_name)
            .map(|v| {
                struct_from_json(v)
                    .map_err(|_| JsonError::InvalidField(json_name.to_string(), "an object"))
            })
            .transpose()
    }

    fn messages<T: JsonMessage>(
        &self,
        json_name: &str,
        proto_name: &str,
    ) -> Result<Vec<T>, JsonError> {
        match self.field(json_name, proto_name) {
            None => Ok(vec![]),
            Some(JsonValue::Array(a)) => a.iter().map(T::from_json).collect(),
            Some(_) => Err(JsonError::InvalidField(json_name.to_string(), "a list")),
        }
    }
}

/// Builds a JSON object, leaving out default values.
#[derive(Default)]
struct FieldWriter(Map<String, JsonValue>);

impl FieldWriter {
    fn string(mut self, name: &str, value: &str) -> Self {
        if !value.is_empty() {
            self.0
                .insert(name.to_string(), JsonValue::String(value.to_string()));
        }
        self
    }

    fn strings(mut self, name: &str, value: &[String]) -> Self {
        if !value.is_empty() {
            self.0.insert(
                name.to_string(),
                JsonValue::Array(value.iter().cloned().map(JsonValue::String).collect()),
            );
        }
        self
    }

    fn structure(mut self, name: &str, value: &Option<Struct>) -> Result<Self, JsonError> {
        if let Some(value) = value {
            self.0.insert(name.to_string(), struct_to_json(value)?);
        }
        Ok(self)
    }

    fn messages<T: JsonMessage>(mut self, name: &str, value: &[T]) -> Result<Self, JsonError> {
        if !value.is_empty() {
            let values = value
                .iter()
                .map(T::to_json)
                .collect::<Result<Vec<_>, _>>()?;
            self.0.insert(name.to_string(), JsonValue::Array(values));
        }
        Ok(self)
    }

    fn build(self) -> JsonValue {
        JsonValue::Object(self.0)
    }
}

impl JsonMessage for ResourceLevelServiceConfig {
    fn to_json(&self) -> Result<JsonValue, JsonError> {
        Ok(FieldWriter::default()
            .string("type", &self.r#type)
            .structure("attributes", &self.attributes)?
            .build())
    }

    fn from_json(value: &JsonValue) -> Result<Self, JsonError> {
        let r = FieldReader::new(value)?;
        Ok(Self {
            r#type: r.string("type", "type")?,
            attributes: r.structure("attributes", "attributes")?,
        })
    }
}

impl JsonMessage for ComponentConfig {
    fn to_json(&self) -> Result<JsonValue, JsonError> {
        Ok(FieldWriter::default()
            .string("name", &self.name)
            .string("namespace", &self.namespace)
            .string("type", &self.r#type)
            .string("model", &self.model)
            .strings("dependsOn", &self.depends_on)
            .messages("serviceConfigs", &self.service_configs)?
            .structure("attributes", &self.attributes)?
            .string("api", &self.api)
            .build())
    }

    fn from_json(value: &JsonValue) -> Result<Self, JsonError> {
        let r = FieldReader::new(value)?;
        Ok(Self {
            name: r.string("name", "name")?,
            namespace: r.string("namespace", "namespace")?,
            r#type: r.string("type", "type")?,
            model: r.string("model", "model")?,
            depends_on: r.strings("dependsOn", "depends_on")?,
            service_configs: r.messages("serviceConfigs", "service_configs")?,
            attributes: r.structure("attributes", "attributes")?,
            api: r.string("api", "api")?,
        })
    }
}

impl JsonMessage for ServiceConfig {
    fn to_json(&self) -> Result<JsonValue, JsonError> {
        Ok(FieldWriter::default()
            .string("name", &self.name)
            .string("namespace", &self.namespace)
            .string("type", &self.r#type)
            .structure("attributes", &self.attributes)?
            .strings("dependsOn", &self.depends_on)
            .string("model", &self.model)
            .string("api", &self.api)
            .build())
    }

    fn from_json(value: &JsonValue) -> Result<Self, JsonError> {
        let r = FieldReader::new(value)?;
        Ok(Self {
            name: r.string("name", "name")?,
            namespace: r.string("namespace", "namespace")?,
            r#type: r.string("type", "type")?,
            attributes: r.structure("attributes", "attributes")?,
            depends_on: r.strings("dependsOn", "depends_on")?,
            model: r.string("model", "model")?,
            api: r.string("api", "api")?,
        })
    }
}

impl JsonMessage for DiscoverResourcesRequest {
    fn to_json(&self) -> Result<JsonValue, JsonError> {
        Ok(FieldWriter::default()
            .string("name", &self.name)
            .structure("extra", &self.extra)?
            .build())
    }

    fn from_json(value: &JsonValue) -> Result<Self, JsonError> {
        let r = FieldReader::new(value)?;
        Ok(Self {
            name: r.string("name", "name")?,
            extra: r.structure("extra", "extra")?,
        })
    }
}

impl JsonMessage for DiscoverResourcesResponse {
    fn to_json(&self) -> Result<JsonValue, JsonError> {
        Ok(FieldWriter::default()
            .messages("discoveries", &self.discoveries)?
            .build())
    }

    fn from_json(value: &JsonValue) -> Result<Self, JsonError> {
        let r = FieldReader::new(value)?;
        Ok(Self {
            discoveries: r.messages("discoveries", "discoveries")?,
        })
    }
}

impl JsonMessage for DoCommandRequest {
    fn to_json(&self) -> Result<JsonValue, JsonError> {
        Ok(FieldWriter::default()
            .string("name", &self.name)
            .structure("command", &self.command)?
            .build())
    }

    fn from_json(value: &JsonValue) -> Result<Self, JsonError> {
        let r = FieldReader::new(value)?;
        Ok(Self {
            name: r.string("name", "name")?,
            command: r.structure("command", "command")?,
        })
    }
}

impl JsonMessage for DoCommandResponse {
    fn to_json(&self) -> Result<JsonValue, JsonError> {
        Ok(FieldWriter::default()
            .structure("result", &self.result)?
            .build())
    }

    fn from_json(value: &JsonValue) -> Result<Self, JsonError> {
        let r = FieldReader::new(value)?;
        Ok(Self {
            result: r.structure("result", "result")?,
        })
    }
}

// Error bodies always carry every field, matching what REST gateways emit.
impl JsonMessage for Status {
    fn to_json(&self) -> Result<JsonValue, JsonError> {
        let mut map = Map::new();
        map.insert("code".to_string(), JsonValue::from(self.code));
        map.insert(
            "message".to_string(),
            JsonValue::String(self.message.clone()),
        );
        map.insert("details".to_string(), JsonValue::Array(vec![]));
        Ok(JsonValue::Object(map))
    }

    fn from_json(value: &JsonValue) -> Result<Self, JsonError> {
        let r = FieldReader::new(value)?;
        let code = match r.field("code", "code") {
            None => 0,
            Some(v) => v
                .as_i64()
                .and_then(|c| i32::try_from(c).ok())
                .ok_or_else(|| JsonError::InvalidField("code".to_string(), "an int32"))?,
        };
        Ok(Self {
            code,
            message: r.string("message", "message")?,
            details: vec![],
        })
    }
}
