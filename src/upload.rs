use crate::engine::{ConnectionPool, VectorEngine};
use crate::error::{truncate_message, UploadError};
use crate::ingest::{self, IngestReport};
use crate::mapping::map_schema;
use crate::provision::{self, ProvisionOptions};
use crate::store::{SchemaStore, UploadLog, UploadRecord, UploadStatus};
use chrono::Utc;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Everything one ingestion run needs to know.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub schema_name: String,
    pub source: PathBuf,
    pub alias: String,
    pub batch_size: usize,
    pub provision: ProvisionOptions,
}

/// A failed run, with however many records were committed before the
/// failure.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct UploadFailure {
    pub committed: usize,
    pub error: UploadError,
}

fn pre(error: UploadError) -> UploadFailure {
    UploadFailure {
        committed: 0,
        error,
    }
}

/// Sequences a full run: resolve the schema, validate it, connect, provision
/// the container, ingest the file. Exactly one audit record is written per
/// run, whatever the outcome.
pub struct Uploader {
    pool: Arc<ConnectionPool>,
    schemas: Arc<dyn SchemaStore>,
    audit: Arc<dyn UploadLog>,
}

impl Uploader {
    pub fn new(
        pool: Arc<ConnectionPool>,
        schemas: Arc<dyn SchemaStore>,
        audit: Arc<dyn UploadLog>,
    ) -> Self {
        Uploader {
            pool,
            schemas,
            audit,
        }
    }

    pub async fn run(
        &self,
        engine: Arc<dyn VectorEngine>,
        request: &UploadRequest,
    ) -> std::result::Result<IngestReport, UploadFailure> {
        let outcome = self.run_inner(engine, request).await;

        let (record_count, status, message) = match &outcome {
            Ok(report) => (report.committed, UploadStatus::Success, None),
            Err(failure) => (
                failure.committed,
                UploadStatus::Failed,
                Some(truncate_message(&failure.error.to_string())),
            ),
        };
        let record = UploadRecord {
            schema_name: request.schema_name.clone(),
            filename: source_name(&request.source),
            record_count,
            status,
            message,
            uploaded_at: Utc::now(),
        };
        // The audit write must not mask the run's outcome.
        if let Err(e) = self.audit.record_upload(&record).await {
            error!("failed to write upload audit record: {}", e);
        }

        outcome
    }

    async fn run_inner(
        &self,
        engine: Arc<dyn VectorEngine>,
        request: &UploadRequest,
    ) -> std::result::Result<IngestReport, UploadFailure> {
        let schema = self
            .schemas
            .get_schema(&request.schema_name)
            .await
            .map_err(pre)?
            .ok_or_else(|| pre(UploadError::SchemaNotFound(request.schema_name.clone())))?;

        // Definition problems and a missing source are caught before any
        // connection is opened.
        schema.validate().map_err(pre)?;
        if !request.source.exists() {
            return Err(pre(UploadError::Config(format!(
                "source file {} does not exist",
                request.source.display()
            ))));
        }

        let engine = self
            .pool
            .get_or_connect(&request.alias, engine)
            .await
            .map_err(pre)?;

        let mapped = map_schema(&schema).map_err(pre)?;
        let container = provision::ensure(
            engine.as_ref(),
            &schema.name,
            &mapped,
            &request.provision,
        )
        .await
        .map_err(pre)?;

        info!(
            "ingesting {} into container '{}' (batch size {})",
            request.source.display(),
            container.name,
            request.batch_size
        );
        let file = File::open(&request.source).map_err(|e| pre(UploadError::Io(e)))?;
        match ingest::ingest(
            engine.as_ref(),
            &container,
            BufReader::new(file),
            request.batch_size,
        )
        .await
        {
            Ok(report) => {
                info!(
                    "committed {} records into '{}' ({} skipped: {} malformed, {} invalid)",
                    report.committed,
                    container.name,
                    report.skipped(),
                    report.malformed_lines,
                    report.invalid_records
                );
                Ok(report)
            }
            Err(failure) => Err(UploadFailure {
                committed: failure.report.committed,
                error: failure.error,
            }),
        }
    }
}

fn source_name(source: &Path) -> String {
    source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string())
}
