use crate::error::{Result, UploadError};
use crate::schema::{SchemaDescriptor, TypeToken};
use std::fmt;
use tracing::warn;

pub const DEFAULT_VARCHAR_LENGTH: i64 = 65535;
pub const DEFAULT_ARRAY_CAPACITY: i64 = 4096;

/// Element type of an array field. Kept separate from [`EngineType`] so
/// nested arrays and array-of-vector cannot be expressed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Varchar { max_length: i64 },
    Int64,
    Float,
    Bool,
}

/// Engine-native field type. Dimension and length constraints live inside
/// the variant that needs them, so a vector without a dim or a varchar
/// without a length cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineType {
    Varchar { max_length: i64 },
    Int64,
    Float,
    Bool,
    FloatVector { dim: i64 },
    Array { element: ScalarType, capacity: i64 },
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::Varchar { max_length } => write!(f, "VARCHAR({})", max_length),
            ScalarType::Int64 => write!(f, "INT64"),
            ScalarType::Float => write!(f, "FLOAT"),
            ScalarType::Bool => write!(f, "BOOL"),
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineType::Varchar { max_length } => write!(f, "VARCHAR({})", max_length),
            EngineType::Int64 => write!(f, "INT64"),
            EngineType::Float => write!(f, "FLOAT"),
            EngineType::Bool => write!(f, "BOOL"),
            EngineType::FloatVector { dim } => write!(f, "FLOAT_VECTOR({})", dim),
            EngineType::Array { element, capacity } => {
                write!(f, "ARRAY<{}>({})", element, capacity)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineField {
    pub name: String,
    pub engine_type: EngineType,
    pub is_primary: bool,
    pub auto_id: bool,
}

impl EngineField {
    pub fn is_vector(&self) -> bool {
        matches!(self.engine_type, EngineType::FloatVector { .. })
    }
}

/// The mapped, engine-ready form of a schema: ordered fields plus the
/// primary-key name and whether the engine generates key values itself.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSchema {
    pub description: String,
    pub fields: Vec<EngineField>,
    pub primary_field: String,
    pub auto_id: bool,
}

impl EngineSchema {
    /// Fields a source record must supply. An auto-generated primary key is
    /// produced by the engine and must not appear in the input.
    pub fn input_fields(&self) -> impl Iterator<Item = &EngineField> {
        self.fields.iter().filter(|f| !f.auto_id)
    }

    pub fn vector_fields(&self) -> impl Iterator<Item = &EngineField> {
        self.fields.iter().filter(|f| f.is_vector())
    }
}

/// Translates a validated schema into the engine model. The primary key is
/// re-derived here rather than trusted from the caller, so a mapper invoked
/// on an unvalidated definition still refuses zero or duplicate keys.
pub fn map_schema(descriptor: &SchemaDescriptor) -> Result<EngineSchema> {
    let mut fields = Vec::with_capacity(descriptor.fields.len());
    let mut primary_field: Option<String> = None;
    let mut auto_id = false;

    for field in &descriptor.fields {
        let token = TypeToken::parse(&field.field_type).ok_or_else(|| {
            UploadError::Mapping(format!(
                "field '{}' has unmappable type '{}'",
                field.name, field.field_type
            ))
        })?;

        let engine_type = match token {
            TypeToken::Str => EngineType::Varchar {
                max_length: field.max_length.unwrap_or(DEFAULT_VARCHAR_LENGTH),
            },
            TypeToken::Int => EngineType::Int64,
            TypeToken::Float => EngineType::Float,
            TypeToken::Bool => EngineType::Bool,
            TypeToken::FloatVector => {
                let dim = match field.dim {
                    Some(d) if d > 0 => d,
                    _ => {
                        return Err(UploadError::Mapping(format!(
                            "vector field '{}' has no positive dim",
                            field.name
                        )));
                    }
                };
                EngineType::FloatVector { dim }
            }
            TypeToken::Array => {
                let element_raw = field.element_type.as_deref().ok_or_else(|| {
                    UploadError::Mapping(format!(
                        "array field '{}' has no element_type",
                        field.name
                    ))
                })?;
                let element = match TypeToken::parse(element_raw) {
                    Some(TypeToken::Str) => ScalarType::Varchar {
                        max_length: DEFAULT_VARCHAR_LENGTH,
                    },
                    Some(TypeToken::Int) => ScalarType::Int64,
                    Some(TypeToken::Float) => ScalarType::Float,
                    Some(TypeToken::Bool) => ScalarType::Bool,
                    _ => {
                        return Err(UploadError::Mapping(format!(
                            "array field '{}' has unmappable element_type '{}'",
                            field.name, element_raw
                        )));
                    }
                };
                EngineType::Array {
                    element,
                    capacity: field.max_length.unwrap_or(DEFAULT_ARRAY_CAPACITY),
                }
            }
        };

        let field_auto_id =
            field.is_primary && field.auto_generate && engine_type == EngineType::Int64;
        if field.is_primary {
            if primary_field.is_some() {
                return Err(UploadError::Mapping(format!(
                    "field '{}' declares a second primary key",
                    field.name
                )));
            }
            primary_field = Some(field.name.clone());
            auto_id = field_auto_id;
        }

        fields.push(EngineField {
            name: field.name.clone(),
            engine_type,
            is_primary: field.is_primary,
            auto_id: field_auto_id,
        });
    }

    let primary_field = primary_field.ok_or_else(|| {
        UploadError::Mapping("schema has no primary key field".to_string())
    })?;

    // A schema whose only field is an auto-generated key leaves nothing for
    // a record to supply; ingestion against it could consume lines without
    // ever committing a row.
    if fields.iter().all(|f| f.auto_id) {
        return Err(UploadError::Mapping(format!(
            "schema '{}' has no input fields; every field is auto-generated",
            descriptor.name
        )));
    }

    if !fields.iter().any(|f| f.is_vector()) {
        warn!(
            "schema '{}' has no vector field; no vector index will be created",
            descriptor.name
        );
    }

    Ok(EngineSchema {
        description: descriptor.description.clone().unwrap_or_default(),
        fields,
        primary_field,
        auto_id,
    })
}
