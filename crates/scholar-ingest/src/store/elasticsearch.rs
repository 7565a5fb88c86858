//! Elasticsearch REST backend
//!
//! Talks to the cluster over plain HTTP(S) with `reqwest`: `_bulk` for keyed
//! upserts, `_count` with a `term` query for ledger lookups, and index
//! HEAD/PUT/DELETE for lifecycle.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use scholar_common::{Result, ScholarError};

use super::{BulkDocument, BulkItemOutcome, DocumentStore};
use crate::config::StoreConfig;
use crate::schema::IndexSchema;

/// Timeout for everything except bulk requests, which carry their own
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Document store backed by an Elasticsearch cluster
#[derive(Clone)]
pub struct ElasticsearchStore {
    client: Client,
    base_url: String,
    username: String,
    password: Option<String>,
}

impl ElasticsearchStore {
    /// Build a client for the configured cluster
    ///
    /// When a CA directory is configured its `ca/ca.crt` is trusted in
    /// addition to the system roots.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let mut builder =
            Client::builder().timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));

        if let Some(ca_file) = config.ca_cert_file() {
            let pem = std::fs::read(&ca_file).map_err(|e| {
                ScholarError::Config(format!(
                    "Cannot read CA certificate {}: {}",
                    ca_file.display(),
                    e
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| ScholarError::Config(format!("Invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| ScholarError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, path));
        match &self.password {
            Some(password) => builder.basic_auth(&self.username, Some(password)),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder.send().await.map_err(transport_error)
    }
}

fn transport_error(err: reqwest::Error) -> ScholarError {
    if err.is_timeout() {
        ScholarError::Timeout(err.to_string())
    } else {
        ScholarError::Network(err.to_string())
    }
}

/// Turn a non-success response into a store error carrying the body
async fn store_error(context: &str, response: Response) -> ScholarError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    ScholarError::Store(format!("{} failed with {}: {}", context, status, body))
}

fn error_type(body: &Value) -> Option<&str> {
    body.pointer("/error/type").and_then(Value::as_str)
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    items: Vec<HashMap<String, BulkResponseItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkResponseItem {
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

fn describe_item_error(error: &Value) -> String {
    let kind = error.get("type").and_then(Value::as_str);
    let reason = error.get("reason").and_then(Value::as_str);
    match (kind, reason) {
        (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
        _ => error.to_string(),
    }
}

/// Newline-delimited body for `_bulk`, one action line per document
fn bulk_body(index: &str, documents: &[BulkDocument]) -> Result<String> {
    let mut body = String::new();
    for doc in documents {
        let action = json!({ "index": { "_index": index, "_id": doc.key } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&doc.document)?);
        body.push('\n');
    }
    Ok(body)
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self.send(self.request(Method::HEAD, index)).await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(store_error("Index existence check", response).await),
        }
    }

    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<()> {
        let response = self
            .send(self.request(Method::PUT, index).json(schema.body()))
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status == StatusCode::BAD_REQUEST
            && error_type(&body) == Some("resource_already_exists_exception")
        {
            debug!(index, "Index created concurrently");
            return Ok(());
        }

        Err(ScholarError::Store(format!(
            "Creating index '{}' failed with {}: {}",
            index, status, body
        )))
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let response = self.send(self.request(Method::DELETE, index)).await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!(index, "Index to delete does not exist");
                Ok(())
            },
            _ => Err(store_error("Index deletion", response).await),
        }
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        documents: Vec<BulkDocument>,
        timeout: Duration,
    ) -> Result<Vec<BulkItemOutcome>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let body = bulk_body(index, &documents)?;
        let response = self
            .send(
                self.request(Method::POST, "_bulk")
                    .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                    .timeout(timeout)
                    .body(body),
            )
            .await?;

        if !response.status().is_success() {
            return Err(store_error("Bulk request", response).await);
        }

        let parsed: BulkResponse = response.json().await.map_err(transport_error)?;
        if parsed.items.len() != documents.len() {
            return Err(ScholarError::Store(format!(
                "Bulk response has {} items for {} documents",
                parsed.items.len(),
                documents.len()
            )));
        }

        // Items come back in request order
        let outcomes = documents
            .into_iter()
            .zip(parsed.items)
            .map(|(doc, mut item)| match item.drain().next() {
                Some((_, result)) => match result.error {
                    Some(error) => BulkItemOutcome::failed(doc.key, describe_item_error(&error)),
                    None if result.status >= 300 => {
                        BulkItemOutcome::failed(doc.key, format!("status {}", result.status))
                    },
                    None => BulkItemOutcome::ok(doc.key),
                },
                None => BulkItemOutcome::failed(doc.key, "empty bulk item"),
            })
            .collect();

        Ok(outcomes)
    }

    async fn count_term(&self, index: &str, field: &str, value: &str) -> Result<u64> {
        let query = json!({ "query": { "term": { field: value } } });
        let response = self
            .send(
                self.request(Method::POST, &format!("{}/_count", index))
                    .json(&query),
            )
            .await?;

        match response.status() {
            status if status.is_success() => {
                let parsed: CountResponse = response.json().await.map_err(transport_error)?;
                Ok(parsed.count)
            },
            // Nothing has been recorded yet
            StatusCode::NOT_FOUND => Ok(0),
            _ => Err(store_error("Count query", response).await),
        }
    }

    async fn append(&self, index: &str, document: Value) -> Result<()> {
        let response = self
            .send(
                self.request(Method::POST, &format!("{}/_doc", index))
                    .query(&[("refresh", "wait_for")])
                    .json(&document),
            )
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(store_error("Document append", response).await)
        }
    }
}
