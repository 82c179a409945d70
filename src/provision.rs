use crate::engine::{ConsistencyLevel, Container, IndexSpec, VectorEngine};
use crate::error::Result;
use crate::mapping::EngineSchema;
use std::collections::HashMap;
use tracing::info;

/// Creation-time options. `index_overrides` swaps in custom index
/// parameters for the named vector fields; everything else gets
/// `default_index`.
#[derive(Debug, Clone, Default)]
pub struct ProvisionOptions {
    pub consistency: ConsistencyLevel,
    pub default_index: IndexSpec,
    pub index_overrides: HashMap<String, IndexSpec>,
}

/// Makes sure a container for `schema` exists, creating it and its vector
/// indexes on first use. An existing container is returned as-is, whatever
/// its actual shape; nothing is reconciled against the supplied schema.
pub async fn ensure(
    engine: &dyn VectorEngine,
    name: &str,
    schema: &EngineSchema,
    options: &ProvisionOptions,
) -> Result<Container> {
    let handle = Container {
        name: name.to_string(),
        schema: schema.clone(),
    };

    if engine.has_container(name).await? {
        info!("container '{}' already exists, using it as-is", name);
        return Ok(handle);
    }

    if let Err(create_err) = engine
        .create_container(name, schema, options.consistency)
        .await
    {
        // A concurrent writer may have won the creation race; the engine's
        // uniqueness constraint is the arbiter.
        if engine.has_container(name).await.unwrap_or(false) {
            info!("container '{}' appeared concurrently, using it as-is", name);
            return Ok(handle);
        }
        return Err(create_err);
    }
    info!(
        "created container '{}' with consistency {}",
        name, options.consistency
    );

    for field in schema.vector_fields() {
        let spec = options
            .index_overrides
            .get(&field.name)
            .unwrap_or(&options.default_index);
        // On failure the container is left behind without this index; it
        // has to be dropped out-of-band before a retry can build one.
        engine.create_index(name, &field.name, spec).await?;
        info!(
            "created {} index on '{}.{}'",
            spec.index_type, name, field.name
        );
    }

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryEngine;
    use crate::engine::InsertBatch;
    use crate::error::UploadError;
    use crate::mapping::{EngineField, EngineType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn schema() -> EngineSchema {
        EngineSchema {
            description: String::new(),
            fields: vec![
                EngineField {
                    name: "id".to_string(),
                    engine_type: EngineType::Int64,
                    is_primary: true,
                    auto_id: false,
                },
                EngineField {
                    name: "embedding".to_string(),
                    engine_type: EngineType::FloatVector { dim: 4 },
                    is_primary: false,
                    auto_id: false,
                },
                EngineField {
                    name: "summary_vec".to_string(),
                    engine_type: EngineType::FloatVector { dim: 8 },
                    is_primary: false,
                    auto_id: false,
                },
            ],
            primary_field: "id".to_string(),
            auto_id: false,
        }
    }

    #[tokio::test]
    async fn creates_container_and_one_index_per_vector_field() {
        let engine = MemoryEngine::new();
        let options = ProvisionOptions::default();

        let container = ensure(&engine, "docs", &schema(), &options).await.unwrap();
        assert_eq!(container.name, "docs");

        let specs = engine.index_specs("docs").await;
        let fields: Vec<_> = specs.iter().map(|(f, _)| f.clone()).collect();
        assert_eq!(fields, vec!["embedding", "summary_vec"]);
        assert!(specs.iter().all(|(_, s)| s.index_type == "HNSW"));
        assert_eq!(
            engine.consistency("docs").await,
            Some(ConsistencyLevel::Bounded)
        );
    }

    #[tokio::test]
    async fn second_ensure_reuses_without_new_indexes() {
        let engine = MemoryEngine::new();
        let options = ProvisionOptions::default();

        ensure(&engine, "docs", &schema(), &options).await.unwrap();
        ensure(&engine, "docs", &schema(), &options).await.unwrap();

        assert_eq!(engine.index_specs("docs").await.len(), 2);
        assert_eq!(engine.container_names().await, vec!["docs"]);
    }

    #[tokio::test]
    async fn index_overrides_replace_the_default() {
        let engine = MemoryEngine::new();
        let mut options = ProvisionOptions::default();
        let mut flat = IndexSpec::default();
        flat.index_type = "FLAT".to_string();
        flat.params.clear();
        options
            .index_overrides
            .insert("summary_vec".to_string(), flat);

        ensure(&engine, "docs", &schema(), &options).await.unwrap();

        let specs = engine.index_specs("docs").await;
        let by_field: std::collections::HashMap<_, _> = specs.into_iter().collect();
        assert_eq!(by_field["embedding"].index_type, "HNSW");
        assert_eq!(by_field["summary_vec"].index_type, "FLAT");
    }

    /// Engine where creation always loses to a concurrent writer.
    struct RacingEngine {
        created: AtomicBool,
    }

    #[async_trait]
    impl VectorEngine for RacingEngine {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn has_container(&self, _name: &str) -> Result<bool> {
            Ok(self.created.load(Ordering::SeqCst))
        }

        async fn create_container(
            &self,
            name: &str,
            _schema: &EngineSchema,
            _consistency: ConsistencyLevel,
        ) -> Result<()> {
            self.created.store(true, Ordering::SeqCst);
            Err(UploadError::Provision(format!(
                "container '{name}' already exists"
            )))
        }

        async fn create_index(
            &self,
            _container: &str,
            _field: &str,
            _spec: &IndexSpec,
        ) -> Result<()> {
            Ok(())
        }

        async fn insert(&self, _container: &str, batch: InsertBatch) -> Result<usize> {
            Ok(batch.rows())
        }

        async fn flush(&self, _container: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn losing_a_creation_race_counts_as_existing() {
        let engine = RacingEngine {
            created: AtomicBool::new(false),
        };
        let container = ensure(&engine, "docs", &schema(), &ProvisionOptions::default())
            .await
            .unwrap();
        assert_eq!(container.name, "docs");
    }

    /// Delegates to a real in-memory engine but fails every index build.
    struct FailingIndexEngine {
        inner: MemoryEngine,
    }

    #[async_trait]
    impl VectorEngine for FailingIndexEngine {
        async fn connect(&self) -> Result<()> {
            self.inner.connect().await
        }

        async fn has_container(&self, name: &str) -> Result<bool> {
            self.inner.has_container(name).await
        }

        async fn create_container(
            &self,
            name: &str,
            schema: &EngineSchema,
            consistency: ConsistencyLevel,
        ) -> Result<()> {
            self.inner.create_container(name, schema, consistency).await
        }

        async fn create_index(
            &self,
            container: &str,
            field: &str,
            _spec: &IndexSpec,
        ) -> Result<()> {
            Err(UploadError::Provision(format!(
                "index on '{container}.{field}' rejected: quota exceeded"
            )))
        }

        async fn insert(&self, container: &str, batch: InsertBatch) -> Result<usize> {
            self.inner.insert(container, batch).await
        }

        async fn flush(&self, container: &str) -> Result<()> {
            self.inner.flush(container).await
        }
    }

    #[tokio::test]
    async fn index_failure_aborts_but_container_remains() {
        let engine = FailingIndexEngine {
            inner: MemoryEngine::new(),
        };

        let err = ensure(&engine, "docs", &schema(), &ProvisionOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("index"));

        // The half-provisioned container is intentionally not rolled back.
        assert!(engine.inner.has_container("docs").await.unwrap());
        assert!(engine.inner.index_specs("docs").await.is_empty());
    }
}
