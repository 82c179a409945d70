use crate::engine::{
    ArrayValue, ColumnData, ConsistencyLevel, IndexSpec, InsertBatch, VectorEngine,
};
use crate::error::{Result, UploadError};
use crate::mapping::{EngineSchema, EngineType, ScalarType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP/JSON client for engines exposing the v2 vectordb REST surface.
pub struct HttpEngine {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEngine {
    pub fn new(host: &str, port: u16, connect_timeout: Duration) -> Result<HttpEngine> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| UploadError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpEngine {
            client,
            base_url: format!("http://{}:{}", host, port),
        })
    }
}

#[derive(Deserialize, Debug)]
struct ApiResponse<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    // No `default` attribute here: serde already treats Option fields as
    // optional, and the attribute would demand `T: Default`.
    data: Option<T>,
}

#[derive(Deserialize, Debug)]
struct HasData {
    #[serde(default)]
    has: bool,
}

#[derive(Deserialize, Debug)]
struct InsertData {
    #[serde(rename = "insertCount", default)]
    insert_count: u64,
}

#[derive(Serialize)]
struct CollectionNameRequest<'a> {
    #[serde(rename = "collectionName")]
    collection_name: &'a str,
}

#[derive(Serialize)]
struct CreateCollectionRequest<'a> {
    #[serde(rename = "collectionName")]
    collection_name: &'a str,
    schema: WireSchema,
    params: CreateParams,
}

#[derive(Serialize)]
struct CreateParams {
    #[serde(rename = "consistencyLevel")]
    consistency_level: &'static str,
}

#[derive(Serialize)]
struct WireSchema {
    #[serde(rename = "autoID")]
    auto_id: bool,
    description: String,
    fields: Vec<WireField>,
}

#[derive(Serialize, Debug, PartialEq)]
struct WireField {
    #[serde(rename = "fieldName")]
    field_name: String,
    #[serde(rename = "dataType")]
    data_type: &'static str,
    #[serde(rename = "isPrimary")]
    is_primary: bool,
    #[serde(rename = "elementDataType", skip_serializing_if = "Option::is_none")]
    element_data_type: Option<&'static str>,
    #[serde(rename = "elementTypeParams", skip_serializing_if = "Option::is_none")]
    element_type_params: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    #[serde(rename = "collectionName")]
    collection_name: &'a str,
    #[serde(rename = "indexParams")]
    index_params: Vec<WireIndexParam<'a>>,
}

#[derive(Serialize)]
struct WireIndexParam<'a> {
    #[serde(rename = "fieldName")]
    field_name: &'a str,
    #[serde(rename = "indexName")]
    index_name: String,
    #[serde(rename = "metricType")]
    metric_type: &'a str,
    params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize)]
struct InsertRequest<'a> {
    #[serde(rename = "collectionName")]
    collection_name: &'a str,
    data: Vec<serde_json::Map<String, serde_json::Value>>,
}

fn wire_fields(schema: &EngineSchema) -> Vec<WireField> {
    schema
        .fields
        .iter()
        .map(|field| {
            let mut params = serde_json::Map::new();
            let (data_type, element_data_type) = match field.engine_type {
                EngineType::Varchar { max_length } => {
                    params.insert("max_length".to_string(), max_length.into());
                    ("VarChar", None)
                }
                EngineType::Int64 => ("Int64", None),
                EngineType::Float => ("Float", None),
                EngineType::Bool => ("Bool", None),
                EngineType::FloatVector { dim } => {
                    params.insert("dim".to_string(), dim.into());
                    ("FloatVector", None)
                }
                EngineType::Array { element, capacity } => {
                    params.insert("max_capacity".to_string(), capacity.into());
                    let element_name = match element {
                        ScalarType::Varchar { max_length } => {
                            params.insert("max_length".to_string(), max_length.into());
                            "VarChar"
                        }
                        ScalarType::Int64 => "Int64",
                        ScalarType::Float => "Float",
                        ScalarType::Bool => "Bool",
                    };
                    ("Array", Some(element_name))
                }
            };
            WireField {
                field_name: field.name.clone(),
                data_type,
                is_primary: field.is_primary,
                element_data_type,
                element_type_params: if params.is_empty() { None } else { Some(params) },
            }
        })
        .collect()
}

fn cell_json(data: &ColumnData, row: usize) -> serde_json::Value {
    match data {
        ColumnData::Varchar(v) => serde_json::Value::String(v[row].clone()),
        ColumnData::Int64(v) => v[row].into(),
        ColumnData::Float(v) => serde_json::json!(v[row]),
        ColumnData::Bool(v) => v[row].into(),
        ColumnData::FloatVector(v) => serde_json::json!(v[row]),
        ColumnData::Array(v) => match &v[row] {
            ArrayValue::Varchar(e) => serde_json::json!(e),
            ArrayValue::Int64(e) => serde_json::json!(e),
            ArrayValue::Float(e) => serde_json::json!(e),
            ArrayValue::Bool(e) => serde_json::json!(e),
        },
    }
}

/// Re-expresses a column-wise batch as the row objects the insert endpoint
/// takes.
fn rows_payload(batch: &InsertBatch) -> Vec<serde_json::Map<String, serde_json::Value>> {
    let rows = batch.rows();
    let mut payload = Vec::with_capacity(rows);
    for row in 0..rows {
        let mut object = serde_json::Map::new();
        for column in &batch.columns {
            object.insert(column.name.clone(), cell_json(&column.data, row));
        }
        payload.push(object);
    }
    payload
}

#[async_trait]
impl VectorEngine for HttpEngine {
    async fn connect(&self) -> Result<()> {
        let url = format!("{}/v2/vectordb/collections/list", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| {
                UploadError::Connection(format!("engine unreachable at {}: {e}", self.base_url))
            })?;
        if !resp.status().is_success() {
            return Err(UploadError::Connection(format!(
                "engine liveness check status: {}",
                resp.status()
            )));
        }
        let parsed: ApiResponse<serde_json::Value> = resp.json().await.map_err(|e| {
            UploadError::Connection(format!("engine liveness check parse error: {e}"))
        })?;
        if parsed.code != 0 {
            return Err(UploadError::Connection(format!(
                "engine liveness check rejected: {}",
                parsed.message
            )));
        }
        Ok(())
    }

    async fn has_container(&self, name: &str) -> Result<bool> {
        let url = format!("{}/v2/vectordb/collections/has", self.base_url);
        let body = CollectionNameRequest {
            collection_name: name,
        };
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                UploadError::Provision(format!("existence check for '{name}' failed: {e}"))
            })?;
        if !resp.status().is_success() {
            return Err(UploadError::Provision(format!(
                "existence check for '{name}' status: {}",
                resp.status()
            )));
        }
        let parsed: ApiResponse<HasData> = resp.json().await.map_err(|e| {
            UploadError::Provision(format!("existence check for '{name}' parse error: {e}"))
        })?;
        if parsed.code != 0 {
            return Err(UploadError::Provision(format!(
                "existence check for '{name}' rejected: {}",
                parsed.message
            )));
        }
        Ok(parsed.data.map(|d| d.has).unwrap_or(false))
    }

    async fn create_container(
        &self,
        name: &str,
        schema: &EngineSchema,
        consistency: ConsistencyLevel,
    ) -> Result<()> {
        let url = format!("{}/v2/vectordb/collections/create", self.base_url);
        let body = CreateCollectionRequest {
            collection_name: name,
            schema: WireSchema {
                auto_id: schema.auto_id,
                description: schema.description.clone(),
                fields: wire_fields(schema),
            },
            params: CreateParams {
                consistency_level: consistency.as_str(),
            },
        };
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| UploadError::Provision(format!("create '{name}' failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(UploadError::Provision(format!(
                "create '{name}' status: {}",
                resp.status()
            )));
        }
        let parsed: ApiResponse<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| UploadError::Provision(format!("create '{name}' parse error: {e}")))?;
        if parsed.code != 0 {
            return Err(UploadError::Provision(format!(
                "create '{name}' rejected: {}",
                parsed.message
            )));
        }
        Ok(())
    }

    async fn create_index(&self, container: &str, field: &str, spec: &IndexSpec) -> Result<()> {
        let url = format!("{}/v2/vectordb/indexes/create", self.base_url);
        let mut params = spec.params.clone();
        params.insert("index_type".to_string(), spec.index_type.clone().into());
        let body = CreateIndexRequest {
            collection_name: container,
            index_params: vec![WireIndexParam {
                field_name: field,
                index_name: format!("{field}_idx"),
                metric_type: &spec.metric_type,
                params,
            }],
        };
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                UploadError::Provision(format!("index on '{container}.{field}' failed: {e}"))
            })?;
        if !resp.status().is_success() {
            return Err(UploadError::Provision(format!(
                "index on '{container}.{field}' status: {}",
                resp.status()
            )));
        }
        let parsed: ApiResponse<serde_json::Value> = resp.json().await.map_err(|e| {
            UploadError::Provision(format!("index on '{container}.{field}' parse error: {e}"))
        })?;
        if parsed.code != 0 {
            return Err(UploadError::Provision(format!(
                "index on '{container}.{field}' rejected: {}",
                parsed.message
            )));
        }
        Ok(())
    }

    async fn insert(&self, container: &str, batch: InsertBatch) -> Result<usize> {
        let rows = batch.rows();
        let url = format!("{}/v2/vectordb/entities/insert", self.base_url);
        let body = InsertRequest {
            collection_name: container,
            data: rows_payload(&batch),
        };
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| UploadError::Commit(format!("insert into '{container}' failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(UploadError::Commit(format!(
                "insert into '{container}' status: {}",
                resp.status()
            )));
        }
        let parsed: ApiResponse<InsertData> = resp.json().await.map_err(|e| {
            UploadError::Commit(format!("insert into '{container}' parse error: {e}"))
        })?;
        if parsed.code != 0 {
            return Err(UploadError::Commit(format!(
                "insert into '{container}' rejected: {}",
                parsed.message
            )));
        }
        Ok(parsed
            .data
            .map(|d| d.insert_count as usize)
            .unwrap_or(rows))
    }

    async fn flush(&self, container: &str) -> Result<()> {
        let url = format!("{}/v2/vectordb/collections/flush", self.base_url);
        let body = CollectionNameRequest {
            collection_name: container,
        };
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| UploadError::Commit(format!("flush of '{container}' failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(UploadError::Commit(format!(
                "flush of '{container}' status: {}",
                resp.status()
            )));
        }
        let parsed: ApiResponse<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| UploadError::Commit(format!("flush of '{container}' parse error: {e}")))?;
        if parsed.code != 0 {
            return Err(UploadError::Commit(format!(
                "flush of '{container}' rejected: {}",
                parsed.message
            )));
        }
        Ok(())
    }
}
