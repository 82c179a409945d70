//! Schema and audit persistence seams.
//!
//! The pipeline only ever talks to the two traits here; the file-backed
//! implementations make the binary usable standalone and the in-memory ones
//! back the tests.

use crate::error::{Result, UploadError};
use crate::schema::SchemaDescriptor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    Success,
    Failed,
}

/// One audit entry per ingestion run, success or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub schema_name: String,
    pub filename: String,
    pub record_count: usize,
    pub status: UploadStatus,
    pub message: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// A missing schema is `Ok(None)`; `Err` means the store itself failed.
    async fn get_schema(&self, name: &str) -> Result<Option<SchemaDescriptor>>;
}

#[async_trait]
pub trait UploadLog: Send + Sync {
    async fn record_upload(&self, record: &UploadRecord) -> Result<()>;
}

/// Directory of `<name>.json` schema definition files.
pub struct DirSchemaStore {
    dir: PathBuf,
}

impl DirSchemaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirSchemaStore { dir: dir.into() }
    }
}

#[async_trait]
impl SchemaStore for DirSchemaStore {
    async fn get_schema(&self, name: &str) -> Result<Option<SchemaDescriptor>> {
        // The name becomes a file name; refuse anything that could walk out
        // of the store directory.
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(UploadError::Store(format!("invalid schema name '{name}'")));
        }
        let path = self.dir.join(format!("{name}.json"));
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| UploadError::Store(format!("failed to read {}: {}", path.display(), e)))?;
        let schema: SchemaDescriptor = serde_json::from_str(&content)
            .map_err(|e| UploadError::Store(format!("failed to parse {}: {}", path.display(), e)))?;
        Ok(Some(schema))
    }
}

#[derive(Default)]
pub struct MemorySchemaStore {
    schemas: Mutex<HashMap<String, SchemaDescriptor>>,
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, schema: SchemaDescriptor) {
        self.schemas
            .lock()
            .await
            .insert(schema.name.clone(), schema);
    }
}

#[async_trait]
impl SchemaStore for MemorySchemaStore {
    async fn get_schema(&self, name: &str) -> Result<Option<SchemaDescriptor>> {
        Ok(self.schemas.lock().await.get(name).cloned())
    }
}

/// Appends one JSON object per line to a log file.
pub struct JsonlUploadLog {
    path: PathBuf,
}

impl JsonlUploadLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonlUploadLog { path: path.into() }
    }
}

#[async_trait]
impl UploadLog for JsonlUploadLog {
    async fn record_upload(&self, record: &UploadRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    UploadError::Store(format!(
                        "failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                UploadError::Store(format!("failed to open {}: {}", self.path.display(), e))
            })?;
        let json = serde_json::to_string(record)
            .map_err(|e| UploadError::Store(format!("failed to serialize upload record: {e}")))?;
        writeln!(file, "{}", json).map_err(|e| {
            UploadError::Store(format!("failed to write {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryUploadLog {
    records: Mutex<Vec<UploadRecord>>,
}

impl MemoryUploadLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<UploadRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl UploadLog for MemoryUploadLog {
    async fn record_upload(&self, record: &UploadRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor;

    fn sample_schema() -> SchemaDescriptor {
        SchemaDescriptor {
            name: "docs".to_string(),
            description: Some("test schema".to_string()),
            fields: vec![FieldDescriptor {
                name: "id".to_string(),
                field_type: "int".to_string(),
                is_primary: true,
                ..FieldDescriptor::default()
            }],
        }
    }

    #[tokio::test]
    async fn dir_store_loads_by_name() {
        let dir = std::env::temp_dir().join("vectorload_store_load");
        std::fs::create_dir_all(&dir).unwrap();
        let schema = sample_schema();
        std::fs::write(
            dir.join("docs.json"),
            serde_json::to_string(&schema).unwrap(),
        )
        .unwrap();

        let store = DirSchemaStore::new(&dir);
        let loaded = store.get_schema("docs").await.unwrap().unwrap();
        assert_eq!(loaded.name, "docs");
        assert_eq!(loaded.fields.len(), 1);

        assert!(store.get_schema("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dir_store_rejects_path_escapes() {
        let store = DirSchemaStore::new(std::env::temp_dir());
        assert!(store.get_schema("../passwd").await.is_err());
        assert!(store.get_schema("a/b").await.is_err());
        assert!(store.get_schema("").await.is_err());
    }

    #[tokio::test]
    async fn dir_store_surfaces_parse_errors() {
        let dir = std::env::temp_dir().join("vectorload_store_parse");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("broken.json"), "{not json").unwrap();

        let store = DirSchemaStore::new(&dir);
        let err = store.get_schema("broken").await.unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[tokio::test]
    async fn jsonl_log_appends_one_line_per_record() {
        let dir = std::env::temp_dir().join("vectorload_store_log");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("uploads.log");
        let _ = std::fs::remove_file(&path);

        let log = JsonlUploadLog::new(&path);
        for (count, status) in [(5usize, UploadStatus::Success), (0, UploadStatus::Failed)] {
            log.record_upload(&UploadRecord {
                schema_name: "docs".to_string(),
                filename: "data.jsonl".to_string(),
                record_count: count,
                status,
                message: None,
                uploaded_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: UploadRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.record_count, 5);
        assert_eq!(first.status, UploadStatus::Success);
    }
}
