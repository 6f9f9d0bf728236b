use crate::models::{DistanceMetric, IndexRecord, IndexStats, DEFAULT_EMBEDDING_DIMENSIONS};
use crate::traits::VectorIndex;
use crate::ServiceError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const PINECONE_CONTROL_PLANE: &str = "https://api.pinecone.io";
pub const PINECONE_API_VERSION: &str = "2024-07";

#[derive(Debug, Clone)]
pub struct PineconeConfig {
    pub api_key: String,
    pub index_name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub cloud: String,
    pub region: String,
    pub control_plane_url: String,
    pub readiness_poll: Duration,
    pub readiness_attempts: u32,
    pub timeout: Duration,
}

impl PineconeConfig {
    pub fn new(api_key: impl Into<String>, index_name: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            index_name: index_name.into(),
            dimension: DEFAULT_EMBEDDING_DIMENSIONS,
            metric: DistanceMetric::Dotproduct,
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            control_plane_url: PINECONE_CONTROL_PLANE.to_string(),
            readiness_poll: Duration::from_secs(1),
            readiness_attempts: 300,
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct PineconeIndex {
    client: Client,
    config: PineconeConfig,
    control_plane: Url,
    host: OnceLock<Url>,
}

impl PineconeIndex {
    pub fn new(config: PineconeConfig) -> Result<Self, ServiceError> {
        if config.api_key.trim().is_empty() {
            return Err(ServiceError::Request("missing Pinecone API key".to_string()));
        }
        let control_plane = Url::parse(&config.control_plane_url)?;
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            control_plane,
            host: OnceLock::new(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Api-Key", self.config.api_key.trim())
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
    }

    fn data_plane(&self, path: &str) -> Result<Url, ServiceError> {
        let host = self.host.get().ok_or_else(|| {
            ServiceError::NotReady(format!(
                "index {} has not been initialised",
                self.config.index_name
            ))
        })?;
        Ok(host.join(path)?)
    }

    async fn list_index_names(&self) -> Result<Vec<String>, ServiceError> {
        let response = self
            .authorized(self.client.get(self.control_plane.join("indexes")?))
            .send()
            .await?;
        let body = expect_success(response).await?;
        Ok(index_names(&body))
    }

    async fn create_index(&self) -> Result<(), ServiceError> {
        let response = self
            .authorized(self.client.post(self.control_plane.join("indexes")?))
            .json(&create_index_body(&self.config))
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            debug!(index = %self.config.index_name, "index created concurrently");
            return Ok(());
        }
        expect_success(response).await?;
        Ok(())
    }

    async fn describe_index(&self) -> Result<Value, ServiceError> {
        let url = self
            .control_plane
            .join(&format!("indexes/{}", self.config.index_name))?;
        let response = self.authorized(self.client.get(url)).send().await?;
        expect_success(response).await
    }
}

async fn expect_success(response: reqwest::Response) -> Result<Value, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::BackendResponse {
            backend: "pinecone".to_string(),
            details: format!("{status}: {body}"),
        });
    }

    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

fn index_names(body: &Value) -> Vec<String> {
    body.pointer("/indexes")
        .and_then(Value::as_array)
        .map(|indexes| {
            indexes
                .iter()
                .filter_map(|index| index.pointer("/name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn create_index_body(config: &PineconeConfig) -> Value {
    json!({
        "name": config.index_name,
        "dimension": config.dimension,
        "metric": config.metric.as_str(),
        "spec": {
            "serverless": {
                "cloud": config.cloud,
                "region": config.region,
            }
        }
    })
}

/// Returns the data-plane host once the description reports the index ready.
fn ready_host(description: &Value) -> Option<&str> {
    let ready = description
        .pointer("/status/ready")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !ready {
        return None;
    }
    description
        .pointer("/host")
        .and_then(Value::as_str)
        .filter(|host| !host.is_empty())
}

fn host_url(host: &str) -> Result<Url, ServiceError> {
    if host.starts_with("http://") || host.starts_with("https://") {
        Ok(Url::parse(host)?)
    } else {
        Ok(Url::parse(&format!("https://{host}"))?)
    }
}

fn stats_from_body(body: &Value) -> IndexStats {
    IndexStats {
        total_vector_count: body
            .pointer("/totalVectorCount")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        dimension: body
            .pointer("/dimension")
            .and_then(Value::as_u64)
            .map(|dimension| dimension as usize),
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn ensure_ready(&self) -> Result<(), ServiceError> {
        let existing = self.list_index_names().await?;
        if !existing.contains(&self.config.index_name) {
            info!(
                index = %self.config.index_name,
                dimension = self.config.dimension,
                metric = self.config.metric.as_str(),
                "creating pinecone index"
            );
            self.create_index().await?;
        }

        for attempt in 0..self.config.readiness_attempts.max(1) {
            let description = self.describe_index().await?;

            if let Some(dimension) = description.pointer("/dimension").and_then(Value::as_u64) {
                if dimension as usize != self.config.dimension {
                    return Err(ServiceError::DimensionMismatch {
                        expected: self.config.dimension,
                        actual: dimension as usize,
                    });
                }
            }

            if let Some(host) = ready_host(&description) {
                let url = host_url(host)?;
                info!(index = %self.config.index_name, host = %url, "pinecone index ready");
                let _ = self.host.set(url);
                return Ok(());
            }

            debug!(index = %self.config.index_name, attempt, "waiting for pinecone index");
            tokio::time::sleep(self.config.readiness_poll).await;
        }

        Err(ServiceError::NotReady(format!(
            "index {} did not become ready after {} checks",
            self.config.index_name, self.config.readiness_attempts
        )))
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), ServiceError> {
        if records.is_empty() {
            return Ok(());
        }

        for record in records {
            if record.values.len() != self.config.dimension {
                return Err(ServiceError::DimensionMismatch {
                    expected: self.config.dimension,
                    actual: record.values.len(),
                });
            }
        }

        let response = self
            .authorized(self.client.post(self.data_plane("vectors/upsert")?))
            .json(&json!({ "vectors": records }))
            .send()
            .await?;
        let body = expect_success(response).await?;

        let upserted = body.pointer("/upsertedCount").and_then(Value::as_u64);
        if let Some(count) = upserted {
            if count as usize != records.len() {
                return Err(ServiceError::BackendResponse {
                    backend: "pinecone".to_string(),
                    details: format!("upserted {count} of {} vectors", records.len()),
                });
            }
        }

        Ok(())
    }

    async fn describe_stats(&self) -> Result<IndexStats, ServiceError> {
        let response = self
            .authorized(self.client.post(self.data_plane("describe_index_stats")?))
            .json(&json!({}))
            .send()
            .await?;
        let body = expect_success(response).await?;
        Ok(stats_from_body(&body))
    }
}
