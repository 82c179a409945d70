use crate::engine::{
    ArrayValue, CellValue, Column, ColumnData, Container, InsertBatch, VectorEngine,
};
use crate::error::UploadError;
use crate::mapping::{EngineField, EngineType, ScalarType};
use serde_json::Value;
use std::io::BufRead;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Aggregate counts for one ingestion run. Absent a fatal error,
/// `committed + skipped() == lines_seen`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub committed: usize,
    pub malformed_lines: usize,
    pub invalid_records: usize,
    pub lines_seen: usize,
    pub batches_committed: usize,
}

impl IngestReport {
    pub fn skipped(&self) -> usize {
        self.malformed_lines + self.invalid_records
    }
}

/// A fatal ingestion error. Carries the progress made before the failure so
/// already-committed counts are never lost.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct IngestFailure {
    pub report: IngestReport,
    pub error: UploadError,
}

/// Why a single record was dropped. Absorbed into the skip counters; never
/// escapes the ingestion loop.
#[derive(Debug, Error)]
enum RecordError {
    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("field '{field}': {reason}")]
    Coercion { field: String, reason: String },
}

/// Streams JSON Lines from `reader` into `container`, committing every
/// `batch_size` coerced records plus a final partial batch. Bad records are
/// skipped and counted; a failed commit aborts the run.
pub async fn ingest<R: BufRead>(
    engine: &dyn VectorEngine,
    container: &Container,
    reader: R,
    batch_size: usize,
) -> std::result::Result<IngestReport, IngestFailure> {
    let batch_size = batch_size.max(1);
    let fields: Vec<EngineField> = container.schema.input_fields().cloned().collect();

    let mut report = IngestReport::default();
    let mut columns = new_columns(&fields);
    let mut buffered = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                return Err(IngestFailure {
                    report,
                    error: UploadError::Io(e),
                })
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        report.lines_seen += 1;

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                report.malformed_lines += 1;
                warn!("line {}: skipping malformed JSON: {}", line_no + 1, e);
                continue;
            }
        };
        let record = match value.as_object() {
            Some(o) => o,
            None => {
                report.malformed_lines += 1;
                warn!("line {}: skipping non-object JSON value", line_no + 1);
                continue;
            }
        };

        match coerce_record(record, &fields) {
            Ok(row) => {
                for (column, cell) in columns.iter_mut().zip(row) {
                    column.data.push_cell(cell);
                }
                buffered += 1;
            }
            Err(err) => {
                report.invalid_records += 1;
                warn!("line {}: skipping record: {}", line_no + 1, err);
                continue;
            }
        }

        if buffered >= batch_size {
            if let Err(error) =
                submit(engine, &container.name, &mut columns, &fields, &mut report).await
            {
                return Err(IngestFailure { report, error });
            }
            buffered = 0;
        }
    }

    if buffered > 0 {
        if let Err(error) =
            submit(engine, &container.name, &mut columns, &fields, &mut report).await
        {
            return Err(IngestFailure { report, error });
        }
    }

    // Durability is best-effort here; the committed counts stand either way.
    if let Err(e) = engine.flush(&container.name).await {
        warn!("flush of '{}' failed: {}", container.name, e);
    }

    Ok(report)
}

fn new_columns(fields: &[EngineField]) -> Vec<Column> {
    fields
        .iter()
        .map(|f| Column {
            name: f.name.clone(),
            data: ColumnData::for_type(&f.engine_type),
        })
        .collect()
}

async fn submit(
    engine: &dyn VectorEngine,
    container: &str,
    columns: &mut Vec<Column>,
    fields: &[EngineField],
    report: &mut IngestReport,
) -> crate::error::Result<()> {
    let batch = InsertBatch {
        columns: std::mem::replace(columns, new_columns(fields)),
    };
    let rows = batch.rows();
    let count = engine.insert(container, batch).await?;
    report.committed += count;
    report.batches_committed += 1;
    debug!("committed batch of {} records into '{}'", rows, container);
    Ok(())
}

/// Coerces a whole record into a row before anything touches the columns, so
/// a failure partway through a record cannot leave columns at uneven
/// lengths.
fn coerce_record(
    record: &serde_json::Map<String, Value>,
    fields: &[EngineField],
) -> std::result::Result<Vec<CellValue>, RecordError> {
    let mut row = Vec::with_capacity(fields.len());
    for field in fields {
        let value = record
            .get(&field.name)
            .ok_or_else(|| RecordError::MissingField(field.name.clone()))?;
        let cell = coerce_value(value, &field.engine_type).map_err(|reason| {
            RecordError::Coercion {
                field: field.name.clone(),
                reason,
            }
        })?;
        row.push(cell);
    }
    Ok(row)
}

fn coerce_value(
    value: &Value,
    engine_type: &EngineType,
) -> std::result::Result<CellValue, String> {
    match engine_type {
        EngineType::Varchar { .. } => coerce_string(value).map(CellValue::Varchar),
        EngineType::Int64 => coerce_int(value).map(CellValue::Int64),
        EngineType::Float => coerce_float(value).map(CellValue::Float),
        EngineType::Bool => coerce_bool(value).map(CellValue::Bool),
        EngineType::FloatVector { dim } => coerce_vector(value, *dim).map(CellValue::FloatVector),
        EngineType::Array { element, capacity } => {
            coerce_array(value, element, *capacity).map(CellValue::Array)
        }
    }
}

fn coerce_string(value: &Value) -> std::result::Result<String, String> {
    match value {
        Value::Null => Err("null is not allowed".to_string()),
        Value::String(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}

fn coerce_int(value: &Value) -> std::result::Result<i64, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if n.is_u64() {
                Err(format!("integer {} out of range for int64", n))
            } else if let Some(f) = n.as_f64() {
                // Fractional values truncate toward zero. -2^63 is exactly
                // i64::MIN; 2^63 is the first f64 past i64::MAX.
                if (-9_223_372_036_854_775_808.0..9_223_372_036_854_775_808.0).contains(&f) {
                    Ok(f as i64)
                } else {
                    Err(format!("number {} out of range for int64", n))
                }
            } else {
                Err(format!("cannot represent {} as int64", n))
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("cannot parse '{}' as int64", s)),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(format!("expected an integer, got {}", type_name(other))),
    }
}

fn coerce_float(value: &Value) -> std::result::Result<f32, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(|f| f as f32)
            .ok_or_else(|| format!("cannot represent {} as float", n)),
        Value::String(s) => s
            .trim()
            .parse::<f32>()
            .map_err(|_| format!("cannot parse '{}' as float", s)),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(format!("expected a number, got {}", type_name(other))),
    }
}

fn coerce_bool(value: &Value) -> std::result::Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(format!("cannot interpret {} as bool", n)),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(format!("cannot parse '{}' as bool", s)),
        },
        other => Err(format!("expected a boolean, got {}", type_name(other))),
    }
}

fn coerce_vector(value: &Value, dim: i64) -> std::result::Result<Vec<f32>, String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("expected an array of numbers, got {}", type_name(value)))?;
    if items.len() != dim as usize {
        return Err(format!(
            "dimension mismatch: expected {}, got {}",
            dim,
            items.len()
        ));
    }
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let f = item
            .as_f64()
            .ok_or_else(|| format!("element {} is not a number", i))?;
        out.push(f as f32);
    }
    Ok(out)
}

fn coerce_array(
    value: &Value,
    element: &ScalarType,
    capacity: i64,
) -> std::result::Result<ArrayValue, String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("expected an array, got {}", type_name(value)))?;
    if items.len() > capacity as usize {
        return Err(format!(
            "array length {} exceeds capacity {}",
            items.len(),
            capacity
        ));
    }
    match element {
        ScalarType::Varchar { .. } => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(coerce_string(item).map_err(|e| format!("element {}: {}", i, e))?);
            }
            Ok(ArrayValue::Varchar(out))
        }
        ScalarType::Int64 => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(coerce_int(item).map_err(|e| format!("element {}: {}", i, e))?);
            }
            Ok(ArrayValue::Int64(out))
        }
        ScalarType::Float => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(coerce_float(item).map_err(|e| format!("element {}: {}", i, e))?);
            }
            Ok(ArrayValue::Float(out))
        }
        ScalarType::Bool => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(coerce_bool(item).map_err(|e| format!("element {}: {}", i, e))?);
            }
            Ok(ArrayValue::Bool(out))
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
