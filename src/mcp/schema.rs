//! Declared tool argument schemas and their validation
//!
//! A schema is a flat list of named parameters. Validation runs before any
//! handler is invoked and fills in defaults for omitted optional parameters.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::errors::{AppError, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamKind {
    pub fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
    pub allowed: Vec<Value>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind,
            required: true,
            default: None,
            allowed: Vec::new(),
            minimum: None,
            maximum: None,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn range(mut self, minimum: i64, maximum: i64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    fn check(&self, value: &Value) -> Result<(), ToolError> {
        if !self.kind.matches(value) {
            return Err(ToolError::invalid_arguments(
                self.name,
                format!("expected {}", self.kind.json_type()),
            ));
        }

        if !self.allowed.is_empty() && !self.allowed.contains(value) {
            let allowed = self
                .allowed
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ToolError::invalid_arguments(
                self.name,
                format!("must be one of: {allowed}"),
            ));
        }

        if self.kind == ParamKind::Integer {
            let in_range = match value.as_i64() {
                Some(number) => {
                    self.minimum.map_or(true, |min| number >= min)
                        && self.maximum.map_or(true, |max| number <= max)
                }
                None => self.maximum.is_none(),
            };
            if !in_range {
                return Err(ToolError::invalid_arguments(
                    self.name,
                    format!(
                        "must be between {} and {}",
                        self.minimum.map_or("-inf".to_string(), |min| min.to_string()),
                        self.maximum.map_or("inf".to_string(), |max| max.to_string()),
                    ),
                ));
            }
        }

        Ok(())
    }

    fn to_json_schema(&self) -> Value {
        let mut property = Map::new();
        property.insert("type".to_string(), json!(self.kind.json_type()));
        property.insert("description".to_string(), json!(self.description));
        if let Some(default) = &self.default {
            property.insert("default".to_string(), default.clone());
        }
        if !self.allowed.is_empty() {
            property.insert("enum".to_string(), Value::Array(self.allowed.clone()));
        }
        if let Some(minimum) = self.minimum {
            property.insert("minimum".to_string(), json!(minimum));
        }
        if let Some(maximum) = self.maximum {
            property.insert("maximum".to_string(), json!(maximum));
        }
        Value::Object(property)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArgumentSchema {
    params: Vec<ParamSpec>,
}

impl ArgumentSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Checks raw call arguments and returns them with defaults applied.
    pub fn validate(&self, raw: Option<Value>) -> Result<ToolArguments, ToolError> {
        let mut provided = match raw {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(ToolError::invalid_arguments(
                    "arguments",
                    "arguments must be an object",
                ))
            }
        };

        if let Some(unknown) = provided
            .keys()
            .find(|key| !self.params.iter().any(|spec| spec.name == key.as_str()))
        {
            return Err(ToolError::invalid_arguments(
                unknown.clone(),
                "unknown argument",
            ));
        }

        let mut values = Map::new();
        for spec in &self.params {
            match provided.remove(spec.name) {
                Some(Value::Null) | None if spec.required => {
                    return Err(ToolError::invalid_arguments(spec.name, "is required"));
                }
                Some(Value::Null) | None => {
                    if let Some(default) = &spec.default {
                        values.insert(spec.name.to_string(), default.clone());
                    }
                }
                Some(value) => {
                    spec.check(&value)?;
                    values.insert(spec.name.to_string(), value);
                }
            }
        }

        Ok(ToolArguments { values })
    }

    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|spec| (spec.name.to_string(), spec.to_json_schema()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// Arguments that passed schema validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    values: Map<String, Value>,
}

impl ToolArguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    /// Deserializes the validated arguments into a typed parameter struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_value(Value::Object(self.values.clone()))
            .map_err(|err| AppError::internal(format!("validated arguments did not parse: {err}")))
    }
}
