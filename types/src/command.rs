//! Command requests and values exchanged with the device manager.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Attribute naming the command a resource dispatches to.
pub const COMMAND_ATTRIBUTE: &str = "command";
/// Attribute carrying the raw query string of the request.
pub const URL_RAW_QUERY: &str = "urlRawQuery";

/// Value type of a device resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub enum ValueType {
    String,
    Bool,
    Int32,
    Uint32,
    Object,
}

/// One command to execute against a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct CommandRequest {
    pub resource_name: String,
    /// Resource attributes, including the `command` name and the raw query.
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub attributes: Map<String, Value>,
    pub value_type: ValueType,
}

impl CommandRequest {
    pub fn new(resource_name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            resource_name: resource_name.into(),
            attributes: Map::new(),
            value_type,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Command name declared in the `command` attribute.
    pub fn command(&self) -> Option<&str> {
        self.attributes.get(COMMAND_ATTRIBUTE).and_then(Value::as_str)
    }

    /// Raw query string attached to the request, if any.
    pub fn raw_query(&self) -> Option<&str> {
        self.attributes.get(URL_RAW_QUERY).and_then(Value::as_str)
    }
}

/// Result of a read command, or the parameter of a write command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct CommandValue {
    pub resource_name: String,
    pub value_type: ValueType,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub value: Value,
}

impl CommandValue {
    /// Build a value by serializing `value`.
    pub fn new(
        resource_name: impl Into<String>,
        value_type: ValueType,
        value: impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            resource_name: resource_name.into(),
            value_type,
            value: serde_json::to_value(value)?,
        })
    }

    pub fn string(resource_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            value_type: ValueType::String,
            value: Value::String(value.into()),
        }
    }

    /// Object payload of a write command, if the value is an object.
    pub fn object(&self) -> Option<&Map<String, Value>> {
        self.value.as_object()
    }
}
