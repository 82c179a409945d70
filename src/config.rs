use crate::engine::{ConsistencyLevel, IndexSpec};
use crate::error::{Result, UploadError};
use crate::ingest::DEFAULT_BATCH_SIZE;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings. Defaults target a local engine; `VECTORLOAD_*`
/// environment variables override them, CLI flags override both.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub alias: String,
    pub batch_size: usize,
    pub connect_timeout: Duration,
    pub consistency: ConsistencyLevel,
    pub schema_dir: PathBuf,
    pub upload_log: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: "localhost".to_string(),
            port: 19530,
            alias: "default".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            connect_timeout: Duration::from_secs(10),
            consistency: ConsistencyLevel::Bounded,
            schema_dir: PathBuf::from("schemas"),
            upload_log: PathBuf::from("uploads.log"),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Settings> {
        let mut settings = Settings::default();
        if let Ok(host) = std::env::var("VECTORLOAD_HOST") {
            settings.host = host;
        }
        if let Ok(port) = std::env::var("VECTORLOAD_PORT") {
            settings.port = port
                .parse()
                .map_err(|_| UploadError::Config(format!("invalid VECTORLOAD_PORT '{port}'")))?;
        }
        if let Ok(alias) = std::env::var("VECTORLOAD_ALIAS") {
            settings.alias = alias;
        }
        if let Ok(batch) = std::env::var("VECTORLOAD_BATCH_SIZE") {
            settings.batch_size = parse_batch_size(&batch)?;
        }
        if let Ok(secs) = std::env::var("VECTORLOAD_CONNECT_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                UploadError::Config(format!("invalid VECTORLOAD_CONNECT_TIMEOUT_SECS '{secs}'"))
            })?;
            settings.connect_timeout = Duration::from_secs(secs);
        }
        if let Ok(level) = std::env::var("VECTORLOAD_CONSISTENCY") {
            settings.consistency = level.parse()?;
        }
        if let Ok(dir) = std::env::var("VECTORLOAD_SCHEMA_DIR") {
            settings.schema_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("VECTORLOAD_UPLOAD_LOG") {
            settings.upload_log = PathBuf::from(path);
        }
        Ok(settings)
    }
}

pub fn parse_batch_size(raw: &str) -> Result<usize> {
    let size: usize = raw
        .parse()
        .map_err(|_| UploadError::Config(format!("invalid batch size '{raw}'")))?;
    if size == 0 {
        return Err(UploadError::Config(
            "batch size must be at least 1".to_string(),
        ));
    }
    Ok(size)
}

/// Parses a `FIELD=JSON` index override, e.g.
/// `embedding={"index_type":"IVF_FLAT","metric_type":"IP","params":{"nlist":128}}`.
pub fn parse_index_override(raw: &str) -> Result<(String, IndexSpec)> {
    let (field, json) = raw.split_once('=').ok_or_else(|| {
        UploadError::Config(format!("invalid index override '{raw}', expected FIELD=JSON"))
    })?;
    let spec: IndexSpec = serde_json::from_str(json).map_err(|e| {
        UploadError::Config(format!("invalid index override for '{field}': {e}"))
    })?;
    Ok((field.to_string(), spec))
}
