use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use vectorload::config::{parse_index_override, Settings};
use vectorload::engine::http::HttpEngine;
use vectorload::engine::ConnectionPool;
use vectorload::error::UploadError;
use vectorload::mapping::map_schema;
use vectorload::provision::ProvisionOptions;
use vectorload::schema::SchemaDescriptor;
use vectorload::store::{DirSchemaStore, JsonlUploadLog};
use vectorload::upload::{UploadRequest, Uploader};

#[derive(Parser)]
#[command(name = "vectorload")]
#[command(about = "Schema-governed JSON Lines ingestion into a vector storage engine")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a JSON Lines file into the container for a stored schema
    Upload {
        /// Name of the stored schema (and of the target container)
        schema: String,

        /// Path to the JSON Lines source file
        file: PathBuf,

        /// Engine host (or set VECTORLOAD_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Engine port (or set VECTORLOAD_PORT)
        #[arg(long)]
        port: Option<u16>,

        /// Connection alias to reuse (or set VECTORLOAD_ALIAS)
        #[arg(long)]
        alias: Option<String>,

        /// Records per insert call (or set VECTORLOAD_BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Consistency level for a newly created container
        /// (Strong|Bounded|Session|Eventually)
        #[arg(long)]
        consistency: Option<String>,

        /// Index override for a vector field, as FIELD=JSON (repeatable)
        #[arg(long = "index-override")]
        index_overrides: Vec<String>,

        /// Directory of schema definition files (or set VECTORLOAD_SCHEMA_DIR)
        #[arg(long)]
        schema_dir: Option<PathBuf>,

        /// Upload audit log path (or set VECTORLOAD_UPLOAD_LOG)
        #[arg(long)]
        upload_log: Option<PathBuf>,
    },

    /// Validate a schema definition file and print its engine mapping
    Validate {
        /// Path to a schema definition JSON file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    match args.command {
        Command::Upload {
            schema,
            file,
            host,
            port,
            alias,
            batch_size,
            consistency,
            index_overrides,
            schema_dir,
            upload_log,
        } => {
            let mut settings = Settings::from_env()?;
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            if let Some(alias) = alias {
                settings.alias = alias;
            }
            if let Some(size) = batch_size {
                if size == 0 {
                    return Err(
                        UploadError::Config("batch size must be at least 1".to_string()).into(),
                    );
                }
                settings.batch_size = size;
            }
            if let Some(level) = consistency {
                settings.consistency = level.parse()?;
            }
            if let Some(dir) = schema_dir {
                settings.schema_dir = dir;
            }
            if let Some(path) = upload_log {
                settings.upload_log = path;
            }
            run_upload(settings, schema, file, &index_overrides).await
        }
        Command::Validate { file } => run_validate(&file),
    }
}

async fn run_upload(
    settings: Settings,
    schema: String,
    file: PathBuf,
    index_overrides: &[String],
) -> Result<()> {
    let mut provision = ProvisionOptions {
        consistency: settings.consistency,
        ..ProvisionOptions::default()
    };
    for raw in index_overrides {
        let (field, spec) = parse_index_override(raw)?;
        provision.index_overrides.insert(field, spec);
    }

    let engine = Arc::new(HttpEngine::new(
        &settings.host,
        settings.port,
        settings.connect_timeout,
    )?);
    let pool = Arc::new(ConnectionPool::new());
    let schemas = Arc::new(DirSchemaStore::new(&settings.schema_dir));
    let audit = Arc::new(JsonlUploadLog::new(&settings.upload_log));
    let uploader = Uploader::new(pool, schemas, audit);

    let request = UploadRequest {
        schema_name: schema,
        source: file,
        alias: settings.alias.clone(),
        batch_size: settings.batch_size,
        provision,
    };

    info!(
        "uploading {} into schema '{}' at {}:{}",
        request.source.display(),
        request.schema_name,
        settings.host,
        settings.port
    );
    match uploader.run(engine, &request).await {
        Ok(report) => {
            println!(
                "Committed {} records in {} batches ({} skipped: {} malformed, {} invalid)",
                report.committed,
                report.batches_committed,
                report.skipped(),
                report.malformed_lines,
                report.invalid_records
            );
            Ok(())
        }
        Err(failure) => {
            error!(
                "upload failed after {} committed records: {}",
                failure.committed, failure.error
            );
            Err(failure.into())
        }
    }
}

fn run_validate(file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)?;
    let schema: SchemaDescriptor = serde_json::from_str(&content)?;
    schema.validate()?;
    let mapped = map_schema(&schema)?;

    println!(
        "Schema '{}' is valid: {} fields, primary key '{}', auto_id {}",
        schema.name,
        mapped.fields.len(),
        mapped.primary_field,
        mapped.auto_id
    );
    for field in &mapped.fields {
        let marker = if field.is_primary { "  [primary]" } else { "" };
        println!("  {} -> {}{}", field.name, field.engine_type, marker);
    }
    Ok(())
}
