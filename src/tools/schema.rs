//! Tool input schemas: primitive type tags, compilation, and argument validation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::KeelError;

/// Primitive type tag for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[strum(to_string = "string", serialize = "str")]
    String,
    #[strum(to_string = "number", serialize = "float")]
    Number,
    #[strum(to_string = "integer", serialize = "int")]
    Integer,
    #[strum(to_string = "boolean", serialize = "bool")]
    Boolean,
    #[strum(to_string = "object", serialize = "dict")]
    Object,
    #[strum(to_string = "array", serialize = "list")]
    Array,
}

impl FieldType {
    /// Whether a JSON value satisfies this type.
    pub fn matches(self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// One declared input field, with its type tag as written by the tool author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_required() -> bool {
    true
}

/// Declared input schema of a tool: field name to primitive type tag.
///
/// Tags are kept as strings until the registry is built so that an unknown
/// tag is reported as a [`KeelError::SchemaValidation`] at build time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSchema {
    pub fields: Vec<SchemaField>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required field.
    pub fn field(mut self, name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            type_tag: type_tag.into(),
            required: true,
            description: None,
        });
        self
    }

    /// Add an optional field.
    pub fn optional_field(mut self, name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            type_tag: type_tag.into(),
            required: false,
            description: None,
        });
        self
    }

    /// Read a top-level JSON Schema object (`properties` + `required`).
    pub fn from_json_schema(schema: &serde_json::Value) -> Result<Self, KeelError> {
        let properties = match schema.get("properties") {
            None => return Ok(Self::default()),
            Some(value) => value.as_object().ok_or_else(|| {
                KeelError::SchemaValidation("'properties' must be an object".to_string())
            })?,
        };
        let required: HashSet<&str> = schema
            .get("required")
            .and_then(|v| v.as_array())
            .map(|names| names.iter().filter_map(|n| n.as_str()).collect())
            .unwrap_or_default();

        let mut fields = Vec::with_capacity(properties.len());
        for (name, property) in properties {
            let type_tag = property
                .get("type")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    KeelError::SchemaValidation(format!("field '{name}' has no type tag"))
                })?;
            fields.push(SchemaField {
                name: name.clone(),
                type_tag: type_tag.to_string(),
                required: required.contains(name.as_str()),
                description: property
                    .get("description")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            });
        }
        Ok(Self { fields })
    }

    /// Resolve every type tag. Fails on unknown tags and duplicate or empty names.
    pub fn compile(&self) -> Result<CompiledSchema, KeelError> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(KeelError::SchemaValidation(
                    "schema field name must not be empty".to_string(),
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(KeelError::SchemaValidation(format!(
                    "duplicate schema field '{}'",
                    field.name
                )));
            }
            let field_type = field.type_tag.parse::<FieldType>().map_err(|_| {
                KeelError::SchemaValidation(format!(
                    "field '{}' has unknown type tag '{}'",
                    field.name, field.type_tag
                ))
            })?;
            fields.push(CompiledField {
                name: field.name.clone(),
                field_type,
                required: field.required,
                description: field.description.clone(),
            });
        }
        Ok(CompiledSchema { fields })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledField {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub description: Option<String>,
}

/// A schema whose type tags have all been resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledSchema {
    fields: Vec<CompiledField>,
}

impl CompiledSchema {
    pub fn fields(&self) -> &[CompiledField] {
        &self.fields
    }

    /// Check required field presence and declared types.
    ///
    /// Fields not declared in the schema are accepted.
    pub fn validate(
        &self,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), KeelError> {
        for field in &self.fields {
            match args.get(&field.name) {
                None if field.required => {
                    return Err(KeelError::SchemaValidation(format!(
                        "missing required field '{}'",
                        field.name
                    )));
                }
                None => {}
                Some(value) if !field.field_type.matches(value) => {
                    return Err(KeelError::SchemaValidation(format!(
                        "field '{}' expected type '{}', got {}",
                        field.name,
                        field.field_type,
                        json_type_name(value)
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Render as a JSON Schema object for the model transport.
    pub fn to_json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            let mut property = serde_json::json!({ "type": field.field_type.to_string() });
            if let Some(description) = &field.description {
                property["description"] = serde_json::Value::String(description.clone());
            }
            properties.insert(field.name.clone(), property);
            if field.required {
                required.push(field.name.clone());
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
