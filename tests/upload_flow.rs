use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vectorload::engine::memory::MemoryEngine;
use vectorload::engine::{
    ConnectionPool, ConsistencyLevel, IndexSpec, InsertBatch, VectorEngine,
};
use vectorload::error::{Result as LoadResult, UploadError};
use vectorload::mapping::EngineSchema;
use vectorload::provision::ProvisionOptions;
use vectorload::schema::{FieldDescriptor, SchemaDescriptor};
use vectorload::store::{
    DirSchemaStore, JsonlUploadLog, MemorySchemaStore, MemoryUploadLog, UploadRecord, UploadStatus,
};
use vectorload::upload::{UploadRequest, Uploader};

fn docs_schema() -> SchemaDescriptor {
    SchemaDescriptor {
        name: "docs".to_string(),
        description: Some("document embeddings".to_string()),
        fields: vec![
            FieldDescriptor {
                name: "id".to_string(),
                field_type: "int".to_string(),
                is_primary: true,
                ..FieldDescriptor::default()
            },
            FieldDescriptor {
                name: "title".to_string(),
                field_type: "str".to_string(),
                max_length: Some(256),
                ..FieldDescriptor::default()
            },
            FieldDescriptor {
                name: "vec".to_string(),
                field_type: "vector<float>".to_string(),
                is_vector: true,
                dim: Some(2),
                ..FieldDescriptor::default()
            },
        ],
    }
}

fn request(source: PathBuf) -> UploadRequest {
    UploadRequest {
        schema_name: "docs".to_string(),
        source,
        alias: "default".to_string(),
        batch_size: 2,
        provision: ProvisionOptions::default(),
    }
}

fn write_lines(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

#[tokio::test]
async fn test_full_upload_flow_with_file_backed_stores(
) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n🧪 Full upload flow against file-backed stores\n");

    let test_dir = std::env::temp_dir().join("vectorload_flow_full");
    let schema_dir = test_dir.join("schemas");
    std::fs::create_dir_all(&schema_dir)?;
    std::fs::write(
        schema_dir.join("docs.json"),
        serde_json::to_string_pretty(&docs_schema())?,
    )?;

    let audit_path = test_dir.join("uploads.log");
    let _ = std::fs::remove_file(&audit_path);

    let source = write_lines(
        &test_dir,
        "data.jsonl",
        &[
            r#"{"id": 1, "title": "first", "vec": [0.1, 0.2]}"#,
            r#"{"id": 2, "title": "second", "vec": [0.3, 0.4]}"#,
            r#"{"id": 3, "title": "third", "vec": [0.5, 0.6]}"#,
        ],
    );

    let engine = Arc::new(MemoryEngine::new());
    let uploader = Uploader::new(
        Arc::new(ConnectionPool::new()),
        Arc::new(DirSchemaStore::new(&schema_dir)),
        Arc::new(JsonlUploadLog::new(&audit_path)),
    );

    let report = uploader.run(engine.clone(), &request(source)).await?;
    assert_eq!(report.committed, 3);
    assert_eq!(report.batches_committed, 2);

    assert_eq!(engine.row_count("docs").await, 3);
    let specs = engine.index_specs("docs").await;
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].0, "vec");
    assert_eq!(specs[0].1.index_type, "HNSW");
    assert_eq!(
        engine.consistency("docs").await,
        Some(ConsistencyLevel::Bounded)
    );
    let stored = engine.container_schema("docs").await.unwrap();
    assert_eq!(stored.primary_field, "id");
    assert!(!stored.auto_id);

    let audit_content = std::fs::read_to_string(&audit_path)?;
    let lines: Vec<_> = audit_content.lines().collect();
    assert_eq!(lines.len(), 1);
    let record: UploadRecord = serde_json::from_str(lines[0])?;
    assert_eq!(record.status, UploadStatus::Success);
    assert_eq!(record.record_count, 3);
    assert_eq!(record.schema_name, "docs");
    assert_eq!(record.filename, "data.jsonl");

    println!("✅ committed {} records, audit written", report.committed);
    Ok(())
}

#[tokio::test]
async fn test_repeat_uploads_reuse_container_and_connection(
) -> Result<(), Box<dyn std::error::Error>> {
    let test_dir = std::env::temp_dir().join("vectorload_flow_repeat");
    let source = write_lines(
        &test_dir,
        "data.jsonl",
        &[r#"{"id": 1, "title": "a", "vec": [0.1, 0.2]}"#],
    );

    let pool = Arc::new(ConnectionPool::new());
    let schemas = Arc::new(MemorySchemaStore::new());
    schemas.put(docs_schema()).await;
    let audit = Arc::new(MemoryUploadLog::new());
    let uploader = Uploader::new(pool.clone(), schemas, audit.clone());
    let engine = Arc::new(MemoryEngine::new());

    uploader.run(engine.clone(), &request(source.clone())).await?;
    uploader.run(engine.clone(), &request(source)).await?;

    // One container, one index set, rows from both runs.
    assert_eq!(engine.container_names().await, vec!["docs"]);
    assert_eq!(engine.index_specs("docs").await.len(), 1);
    assert_eq!(engine.row_count("docs").await, 2);
    assert_eq!(pool.aliases().await, vec!["default"]);

    let records = audit.records().await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.status == UploadStatus::Success));
    Ok(())
}

/// Fails the Nth insert call; everything else passes through.
struct FailingInsertEngine {
    inner: MemoryEngine,
    fail_on_call: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl VectorEngine for FailingInsertEngine {
    async fn connect(&self) -> LoadResult<()> {
        self.inner.connect().await
    }

    async fn has_container(&self, name: &str) -> LoadResult<bool> {
        self.inner.has_container(name).await
    }

    async fn create_container(
        &self,
        name: &str,
        schema: &EngineSchema,
        consistency: ConsistencyLevel,
    ) -> LoadResult<()> {
        self.inner.create_container(name, schema, consistency).await
    }

    async fn create_index(&self, container: &str, field: &str, spec: &IndexSpec) -> LoadResult<()> {
        self.inner.create_index(container, field, spec).await
    }

    async fn insert(&self, container: &str, batch: InsertBatch) -> LoadResult<usize> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on_call {
            return Err(UploadError::Commit(format!(
                "insert into '{container}' rejected: node down"
            )));
        }
        self.inner.insert(container, batch).await
    }

    async fn flush(&self, container: &str) -> LoadResult<()> {
        self.inner.flush(container).await
    }
}

#[tokio::test]
async fn test_failed_commit_audits_partial_progress() -> Result<(), Box<dyn std::error::Error>> {
    let test_dir = std::env::temp_dir().join("vectorload_flow_partial");
    let source = write_lines(
        &test_dir,
        "data.jsonl",
        &[
            r#"{"id": 1, "title": "a", "vec": [0.1, 0.2]}"#,
            r#"{"id": 2, "title": "b", "vec": [0.3, 0.4]}"#,
            r#"{"id": 3, "title": "c", "vec": [0.5, 0.6]}"#,
            r#"{"id": 4, "title": "d", "vec": [0.7, 0.8]}"#,
        ],
    );

    let schemas = Arc::new(MemorySchemaStore::new());
    schemas.put(docs_schema()).await;
    let audit = Arc::new(MemoryUploadLog::new());
    let uploader = Uploader::new(Arc::new(ConnectionPool::new()), schemas, audit.clone());
    let engine = Arc::new(FailingInsertEngine {
        inner: MemoryEngine::new(),
        fail_on_call: 2,
        calls: AtomicUsize::new(0),
    });

    let failure = uploader
        .run(engine.clone(), &request(source))
        .await
        .unwrap_err();

    // The first batch of two was committed before the failure.
    assert_eq!(failure.committed, 2);
    assert_eq!(engine.inner.row_count("docs").await, 2);

    let records = audit.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, UploadStatus::Failed);
    assert_eq!(records[0].record_count, 2);
    let message = records[0].message.as_deref().unwrap();
    assert!(message.contains("insert"));
    Ok(())
}

#[tokio::test]
async fn test_schema_store_miss_surfaces_not_found() -> Result<(), Box<dyn std::error::Error>> {
    let test_dir = std::env::temp_dir().join("vectorload_flow_missing");
    let source = write_lines(&test_dir, "data.jsonl", &[r#"{"id": 1}"#]);

    let uploader = Uploader::new(
        Arc::new(ConnectionPool::new()),
        Arc::new(MemorySchemaStore::new()),
        Arc::new(MemoryUploadLog::new()),
    );

    let failure = uploader
        .run(Arc::new(MemoryEngine::new()), &request(source))
        .await
        .unwrap_err();
    assert!(matches!(failure.error, UploadError::SchemaNotFound(_)));
    assert_eq!(failure.committed, 0);
    Ok(())
}
