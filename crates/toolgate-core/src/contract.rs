use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Keyword arguments passed to a tool invocation.
pub type Arguments = Map<String, Value>;

/// Semantic type of a single tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    Sequence,
    Mapping,
    /// Schema `any` or no declared type: accepts every JSON value.
    Any,
}

impl ParamType {
    /// Map a JSON schema `type` keyword to a semantic type.
    #[must_use]
    pub fn from_schema_type(schema_type: Option<&str>) -> Self {
        match schema_type {
            Some("string") => Self::String,
            Some("integer") => Self::Integer,
            Some("number") => Self::Float,
            Some("boolean") => Self::Boolean,
            Some("array") => Self::Sequence,
            Some("object") => Self::Mapping,
            _ => Self::Any,
        }
    }

    /// The JSON schema `type` keyword for this type, if it has one.
    #[must_use]
    pub fn schema_type(self) -> Option<&'static str> {
        match self {
            Self::String => Some("string"),
            Self::Integer => Some("integer"),
            Self::Float => Some("number"),
            Self::Boolean => Some("boolean"),
            Self::Sequence => Some("array"),
            Self::Mapping => Some("object"),
            Self::Any => None,
        }
    }

    /// Whether `value` is acceptable for a parameter of this type.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Sequence => value.is_array(),
            Self::Mapping => value.is_object(),
            Self::Any => true,
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Sequence => "sequence",
            Self::Mapping => "mapping",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// A named parameter in a tool contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: ParamType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Typed call contract of a tool: parameter name to type and required flag.
///
/// Parameters keep their declaration order. Invocation is by name, so the
/// order only matters for display and for the published schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolContract {
    params: Vec<Param>,
}

impl ToolContract {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required parameter.
    #[must_use]
    pub fn required(self, name: impl Into<String>, kind: ParamType) -> Self {
        self.with_param(Param {
            name: name.into(),
            kind,
            required: true,
            description: None,
        })
    }

    /// Add an optional parameter. Callers may omit it entirely.
    #[must_use]
    pub fn optional(self, name: impl Into<String>, kind: ParamType) -> Self {
        self.with_param(Param {
            name: name.into(),
            kind,
            required: false,
            description: None,
        })
    }

    /// Add a parameter, replacing any earlier one with the same name.
    #[must_use]
    pub fn with_param(mut self, param: Param) -> Self {
        if let Some(existing) = self.params.iter_mut().find(|p| p.name == param.name) {
            *existing = param;
        } else {
            self.params.push(param);
        }
        self
    }

    /// Attach a description to an already declared parameter.
    #[must_use]
    pub fn describe(mut self, name: &str, description: impl Into<String>) -> Self {
        if let Some(param) = self.params.iter_mut().find(|p| p.name == name) {
            param.description = Some(description.into());
        }
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Translate a declarative input schema into a contract.
    ///
    /// Each entry of `properties` becomes a parameter; names listed in
    /// `required` are required, every other parameter is optional with an
    /// absent default. A missing or non-object `properties` yields an empty
    /// contract.
    #[must_use]
    pub fn from_input_schema(schema: &Value) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
            return Self::new();
        };

        properties
            .iter()
            .fold(Self::new(), |contract, (name, property)| {
                contract.with_param(Param {
                    name: name.clone(),
                    kind: ParamType::from_schema_type(
                        property.get("type").and_then(Value::as_str),
                    ),
                    required: required.contains(&name.as_str()),
                    description: property
                        .get("description")
                        .and_then(Value::as_str)
                        .map(ToString::to_string),
                })
            })
    }

    /// Render the contract as a JSON schema object, the inverse of
    /// [`ToolContract::from_input_schema`].
    #[must_use]
    pub fn to_input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let mut property = Map::new();
            if let Some(schema_type) = param.kind.schema_type() {
                property.insert("type".to_string(), Value::from(schema_type));
            }
            if let Some(description) = &param.description {
                property.insert("description".to_string(), Value::from(description.as_str()));
            }
            properties.insert(param.name.clone(), Value::Object(property));
        }

        let required: Vec<Value> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| Value::from(p.name.as_str()))
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check `arguments` against the contract and return the marshalled
    /// argument map.
    ///
    /// Optional parameters passed as `null` are treated as absent and
    /// dropped, as are arguments the contract does not declare.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] when a required parameter is
    /// missing or a value does not match its declared type.
    pub fn validate(&self, arguments: &Arguments) -> Result<Arguments, Error> {
        let mut marshalled = Arguments::new();

        for param in &self.params {
            let value = match arguments.get(&param.name) {
                Some(Value::Null) if param.kind != ParamType::Any || !param.required => None,
                other => other,
            };

            match value {
                None if param.required => {
                    return Err(Error::InvalidArguments(format!(
                        "missing required parameter '{}'",
                        param.name
                    )));
                }
                None => {}
                Some(value) if !param.kind.accepts(value) => {
                    return Err(Error::InvalidArguments(format!(
                        "parameter '{}' expects {}, got {}",
                        param.name,
                        param.kind,
                        json_kind(value)
                    )));
                }
                Some(value) => {
                    marshalled.insert(param.name.clone(), value.clone());
                }
            }
        }

        Ok(marshalled)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
