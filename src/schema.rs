use crate::error::{Result, UploadError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One field of a user-declared schema, as stored and edited outside this
/// pipeline. Everything defaults so that incomplete definitions parse and
/// then fail validation with a real message instead of a serde error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub is_primary: bool,
    pub is_vector: bool,
    pub dim: Option<i64>,
    pub max_length: Option<i64>,
    pub element_type: Option<String>,
    pub auto_generate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl SchemaDescriptor {
    pub fn validate(&self) -> Result<()> {
        validate_fields(&self.fields)
    }
}

/// Canonical field types. Validation and mapping both go through
/// [`TypeToken::parse`], so a type cannot pass validation and then fail to
/// map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeToken {
    Str,
    Int,
    Float,
    Bool,
    FloatVector,
    Array,
}

impl TypeToken {
    pub fn parse(raw: &str) -> Option<TypeToken> {
        match raw {
            "str" | "string" | "varchar" => Some(TypeToken::Str),
            "int" | "int64" => Some(TypeToken::Int),
            "float" | "float32" => Some(TypeToken::Float),
            "bool" | "boolean" => Some(TypeToken::Bool),
            "vector<float>" => Some(TypeToken::FloatVector),
            "array" => Some(TypeToken::Array),
            _ => None,
        }
    }

    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            TypeToken::Str | TypeToken::Int | TypeToken::Float | TypeToken::Bool
        )
    }
}

/// Validates a candidate field list. Checks run in a fixed order and stop at
/// the first failure; the error names the offending field. Purely
/// structural, no side effects.
pub fn validate_fields(fields: &[FieldDescriptor]) -> Result<()> {
    if fields.is_empty() {
        return Err(UploadError::Validation(
            "schema must declare at least one field".to_string(),
        ));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut primary_count = 0usize;

    for field in fields {
        let name = field.name.trim();
        if name.is_empty() {
            return Err(UploadError::Validation(
                "field name cannot be empty".to_string(),
            ));
        }
        if field.field_type.trim().is_empty() {
            return Err(UploadError::Validation(format!(
                "field '{}' is missing a type",
                name
            )));
        }
        if !seen.insert(name) {
            return Err(UploadError::Validation(format!(
                "duplicate field name '{}'",
                name
            )));
        }

        let token = TypeToken::parse(&field.field_type).ok_or_else(|| {
            UploadError::Validation(format!(
                "field '{}' has unknown type '{}'",
                name, field.field_type
            ))
        })?;

        if field.is_primary {
            if !matches!(token, TypeToken::Int | TypeToken::Str) {
                return Err(UploadError::Validation(format!(
                    "primary key field '{}' must be an int or str type, got '{}'",
                    name, field.field_type
                )));
            }
            primary_count += 1;
            if primary_count > 1 {
                return Err(UploadError::Validation(format!(
                    "field '{}' declares a second primary key; only one is allowed",
                    name
                )));
            }
        }

        if field.is_vector {
            if token != TypeToken::FloatVector {
                return Err(UploadError::Validation(format!(
                    "field '{}' is marked is_vector but has type '{}', expected 'vector<float>'",
                    name, field.field_type
                )));
            }
            match field.dim {
                Some(d) if d > 0 => {}
                Some(d) => {
                    return Err(UploadError::Validation(format!(
                        "vector field '{}' has non-positive dim {}",
                        name, d
                    )));
                }
                None => {
                    return Err(UploadError::Validation(format!(
                        "vector field '{}' must declare a positive dim",
                        name
                    )));
                }
            }
        } else if token == TypeToken::FloatVector {
            // Vector intent must be explicit, never inferred from the type.
            return Err(UploadError::Validation(format!(
                "field '{}' has type 'vector<float>' but is_vector is not set",
                name
            )));
        } else if field.dim.is_some() {
            return Err(UploadError::Validation(format!(
                "field '{}' declares dim but is not a vector field",
                name
            )));
        }

        match (token, field.element_type.as_deref()) {
            (TypeToken::Array, None) => {
                return Err(UploadError::Validation(format!(
                    "array field '{}' must declare element_type",
                    name
                )));
            }
            (TypeToken::Array, Some(element)) => match TypeToken::parse(element) {
                Some(et) if et.is_scalar() => {}
                _ => {
                    return Err(UploadError::Validation(format!(
                        "array field '{}' has invalid element_type '{}'",
                        name, element
                    )));
                }
            },
            (_, Some(_)) => {
                return Err(UploadError::Validation(format!(
                    "field '{}' declares element_type but is not an array",
                    name
                )));
            }
            (_, None) => {}
        }

        if let Some(len) = field.max_length {
            if len <= 0 {
                return Err(UploadError::Validation(format!(
                    "field '{}' has non-positive max_length {}",
                    name, len
                )));
            }
        }

        if field.auto_generate && !(field.is_primary && token == TypeToken::Int) {
            return Err(UploadError::Validation(format!(
                "field '{}' sets auto_generate, which is only valid on an int primary key",
                name
            )));
        }
    }

    if primary_count == 0 {
        return Err(UploadError::Validation(
            "schema must declare exactly one primary key field".to_string(),
        ));
    }

    Ok(())
}
