pub mod http;
pub mod memory;

use crate::error::{Result, UploadError};
use crate::mapping::{EngineSchema, EngineType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Read-after-write consistency requested at container creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    Strong,
    #[default]
    Bounded,
    Session,
    Eventually,
}

impl ConsistencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::Strong => "Strong",
            ConsistencyLevel::Bounded => "Bounded",
            ConsistencyLevel::Session => "Session",
            ConsistencyLevel::Eventually => "Eventually",
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsistencyLevel {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strong" => Ok(ConsistencyLevel::Strong),
            "bounded" => Ok(ConsistencyLevel::Bounded),
            "session" => Ok(ConsistencyLevel::Session),
            "eventually" => Ok(ConsistencyLevel::Eventually),
            other => Err(UploadError::Config(format!(
                "unknown consistency level '{}'",
                other
            ))),
        }
    }
}

/// Parameters for one vector index. `params` stays open because each index
/// type takes its own tuning knobs; the default is HNSW with the stock
/// build parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub index_type: String,
    pub metric_type: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl Default for IndexSpec {
    fn default() -> Self {
        let mut params = serde_json::Map::new();
        params.insert("M".to_string(), 16.into());
        params.insert("efConstruction".to_string(), 200.into());
        IndexSpec {
            index_type: "HNSW".to_string(),
            metric_type: "L2".to_string(),
            params,
        }
    }
}

/// One cell of an array-typed column.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    Varchar(Vec<String>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Bool(Vec<bool>),
}

/// A single coerced value, produced record-by-record before anything is
/// appended to a column.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Varchar(String),
    Int64(i64),
    Float(f32),
    Bool(bool),
    FloatVector(Vec<f32>),
    Array(ArrayValue),
}

/// Column-oriented value storage, one variant per engine type.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Varchar(Vec<String>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Bool(Vec<bool>),
    FloatVector(Vec<Vec<f32>>),
    Array(Vec<ArrayValue>),
}

impl ColumnData {
    /// Empty column of the right variant for an engine type.
    pub fn for_type(engine_type: &EngineType) -> ColumnData {
        match engine_type {
            EngineType::Varchar { .. } => ColumnData::Varchar(Vec::new()),
            EngineType::Int64 => ColumnData::Int64(Vec::new()),
            EngineType::Float => ColumnData::Float(Vec::new()),
            EngineType::Bool => ColumnData::Bool(Vec::new()),
            EngineType::FloatVector { .. } => ColumnData::FloatVector(Vec::new()),
            EngineType::Array { .. } => ColumnData::Array(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Varchar(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::FloatVector(v) => v.len(),
            ColumnData::Array(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a cell that was coerced for this column's engine type. The
    /// coercion path derives both sides from the same field list, so a
    /// variant mismatch cannot occur.
    pub fn push_cell(&mut self, cell: CellValue) {
        match (self, cell) {
            (ColumnData::Varchar(v), CellValue::Varchar(s)) => v.push(s),
            (ColumnData::Int64(v), CellValue::Int64(i)) => v.push(i),
            (ColumnData::Float(v), CellValue::Float(f)) => v.push(f),
            (ColumnData::Bool(v), CellValue::Bool(b)) => v.push(b),
            (ColumnData::FloatVector(v), CellValue::FloatVector(e)) => v.push(e),
            (ColumnData::Array(v), CellValue::Array(a)) => v.push(a),
            _ => unreachable!("cell variant does not match column variant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// One insert call's worth of records, stored column-wise. All columns hold
/// the same number of rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertBatch {
    pub columns: Vec<Column>,
}

impl InsertBatch {
    pub fn rows(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }
}

/// Handle to a provisioned container.
#[derive(Debug, Clone)]
pub struct Container {
    pub name: String,
    pub schema: EngineSchema,
}

/// The storage engine seam. Everything the pipeline needs from an engine
/// goes through this trait, so tests and dry runs swap in the in-memory
/// implementation.
#[async_trait]
pub trait VectorEngine: Send + Sync {
    async fn connect(&self) -> Result<()>;

    async fn has_container(&self, name: &str) -> Result<bool>;

    async fn create_container(
        &self,
        name: &str,
        schema: &EngineSchema,
        consistency: ConsistencyLevel,
    ) -> Result<()>;

    async fn create_index(&self, container: &str, field: &str, spec: &IndexSpec) -> Result<()>;

    /// Inserts a batch and returns the number of rows the engine accepted.
    async fn insert(&self, container: &str, batch: InsertBatch) -> Result<usize>;

    async fn flush(&self, container: &str) -> Result<()>;
}

/// Alias-keyed connection reuse. Owned by the caller and passed by
/// reference; the first request for an alias connects, later requests get
/// the live handle back. Each alias holds its own init cell, so the map
/// lock only covers the lookup and a slow connect on one alias does not
/// stall callers on another.
pub struct ConnectionPool {
    connections: Mutex<HashMap<String, Arc<OnceCell<Arc<dyn VectorEngine>>>>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        ConnectionPool {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Concurrent callers for the same alias share a single connect
    /// attempt; a failed attempt leaves the cell empty so the next call
    /// retries.
    pub async fn get_or_connect(
        &self,
        alias: &str,
        engine: Arc<dyn VectorEngine>,
    ) -> Result<Arc<dyn VectorEngine>> {
        let cell = {
            let mut connections = self.connections.lock().await;
            Arc::clone(
                connections
                    .entry(alias.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };
        let connected = cell
            .get_or_try_init(|| async {
                engine.connect().await?;
                Ok::<_, UploadError>(Arc::clone(&engine))
            })
            .await?;
        Ok(Arc::clone(connected))
    }

    /// Drops the connection registered under `alias`. Returns whether a
    /// connected engine was present.
    pub async fn disconnect(&self, alias: &str) -> bool {
        self.connections
            .lock()
            .await
            .remove(alias)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }

    pub async fn aliases(&self) -> Vec<String> {
        self.connections
            .lock()
            .await
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(alias, _)| alias.clone())
            .collect()
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}
