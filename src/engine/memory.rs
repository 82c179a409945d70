use crate::engine::{ConsistencyLevel, IndexSpec, InsertBatch, VectorEngine};
use crate::error::{Result, UploadError};
use crate::mapping::EngineSchema;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredContainer {
    schema: EngineSchema,
    consistency: ConsistencyLevel,
    indexes: Vec<(String, IndexSpec)>,
    batches: Vec<InsertBatch>,
    flushes: usize,
}

/// In-memory engine used by tests and dry runs. Every insert call is kept
/// whole so callers can assert batch boundaries, not just totals.
#[derive(Default)]
pub struct MemoryEngine {
    containers: Mutex<HashMap<String, StoredContainer>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn container_names(&self) -> Vec<String> {
        self.containers.lock().await.keys().cloned().collect()
    }

    pub async fn row_count(&self, name: &str) -> usize {
        self.containers
            .lock()
            .await
            .get(name)
            .map(|c| c.batches.iter().map(InsertBatch::rows).sum())
            .unwrap_or(0)
    }

    /// Row counts of the individual insert calls, in call order.
    pub async fn insert_batch_sizes(&self, name: &str) -> Vec<usize> {
        self.containers
            .lock()
            .await
            .get(name)
            .map(|c| c.batches.iter().map(InsertBatch::rows).collect())
            .unwrap_or_default()
    }

    /// Indexes created so far, as (field name, spec) pairs in call order.
    pub async fn index_specs(&self, name: &str) -> Vec<(String, IndexSpec)> {
        self.containers
            .lock()
            .await
            .get(name)
            .map(|c| c.indexes.clone())
            .unwrap_or_default()
    }

    pub async fn flush_count(&self, name: &str) -> usize {
        self.containers
            .lock()
            .await
            .get(name)
            .map(|c| c.flushes)
            .unwrap_or(0)
    }

    pub async fn consistency(&self, name: &str) -> Option<ConsistencyLevel> {
        self.containers.lock().await.get(name).map(|c| c.consistency)
    }

    /// Schema the container was created with.
    pub async fn container_schema(&self, name: &str) -> Option<EngineSchema> {
        self.containers.lock().await.get(name).map(|c| c.schema.clone())
    }
}

#[async_trait]
impl VectorEngine for MemoryEngine {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn has_container(&self, name: &str) -> Result<bool> {
        Ok(self.containers.lock().await.contains_key(name))
    }

    async fn create_container(
        &self,
        name: &str,
        schema: &EngineSchema,
        consistency: ConsistencyLevel,
    ) -> Result<()> {
        let mut containers = self.containers.lock().await;
        if containers.contains_key(name) {
            // Same uniqueness behavior a real engine enforces.
            return Err(UploadError::Provision(format!(
                "container '{name}' already exists"
            )));
        }
        containers.insert(
            name.to_string(),
            StoredContainer {
                schema: schema.clone(),
                consistency,
                indexes: Vec::new(),
                batches: Vec::new(),
                flushes: 0,
            },
        );
        Ok(())
    }

    async fn create_index(&self, container: &str, field: &str, spec: &IndexSpec) -> Result<()> {
        let mut containers = self.containers.lock().await;
        let stored = containers.get_mut(container).ok_or_else(|| {
            UploadError::Provision(format!("container '{container}' does not exist"))
        })?;
        stored.indexes.push((field.to_string(), spec.clone()));
        Ok(())
    }

    async fn insert(&self, container: &str, batch: InsertBatch) -> Result<usize> {
        let mut containers = self.containers.lock().await;
        let stored = containers.get_mut(container).ok_or_else(|| {
            UploadError::Commit(format!("container '{container}' does not exist"))
        })?;
        let rows = batch.rows();
        stored.batches.push(batch);
        Ok(rows)
    }

    async fn flush(&self, container: &str) -> Result<()> {
        let mut containers = self.containers.lock().await;
        let stored = containers.get_mut(container).ok_or_else(|| {
            UploadError::Commit(format!("container '{container}' does not exist"))
        })?;
        stored.flushes += 1;
        Ok(())
    }
}
