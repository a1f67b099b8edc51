mod client;
mod embed;

pub use client::{CollectionSpec, CreateOutcome, QdrantClient};
pub use embed::{Embedder, HashingEmbedder, SparseVector};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Settings;
use crate::logging::Transcript;
use crate::model::{ChunkRecord, MetaValue};
use crate::pipeline::{PipelineError, UploadSummary, Uploader};

const UPSERT_BATCH: usize = 64;

/// Errors returned while talking to Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error("dense vector size must be positive, got {0}")]
    InvalidDimension(i64),
}

/// Name of the dense vector derived from a model id, e.g. `fast-bge-small-en`.
pub fn dense_vector_name(model: &str) -> String {
    format!("fast-{}", model_tail(model))
}

/// Name of the sparse vector derived from a model id, e.g. `fast-sparse-bm25`.
pub fn sparse_vector_name(model: &str) -> String {
    format!("fast-sparse-{}", model_tail(model))
}

fn model_tail(model: &str) -> String {
    model
        .trim()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Default [`Uploader`]: ensures both collections, embeds and upserts.
pub struct QdrantUploader {
    http: reqwest::Client,
    transcript: Transcript,
}

impl QdrantUploader {
    pub fn new(transcript: Transcript) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("raggen-tui/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, transcript })
    }

    async fn ensure_collection(
        &self,
        client: &QdrantClient,
        name: &str,
        spec: &CollectionSpec,
    ) -> Result<(), QdrantError> {
        if client.collection_exists(name).await? {
            self.transcript
                .info(format!("Collection '{name}' already exists!"));
            return Ok(());
        }
        match client.create_collection(name, spec).await? {
            CreateOutcome::Created => self.transcript.info(format!("Collection '{name}' created")),
            CreateOutcome::AlreadyExists => self
                .transcript
                .info(format!("Collection '{name}' already exists!")),
        }
        Ok(())
    }
}

#[async_trait]
impl Uploader for QdrantUploader {
    async fn upload(
        &self,
        records: Vec<ChunkRecord>,
        settings: &Settings,
    ) -> Result<UploadSummary, PipelineError> {
        if settings.dense_dimension <= 0 {
            return Err(QdrantError::InvalidDimension(settings.dense_dimension).into());
        }
        let client = QdrantClient::new(self.http.clone(), &settings.qdrant_url, &settings.qdrant_key)?;
        let spec = CollectionSpec {
            dense_name: dense_vector_name(&settings.dense_model),
            sparse_name: sparse_vector_name(&settings.sparse_model),
            dimension: settings.dense_dimension as u64,
        };
        self.ensure_collection(&client, &settings.chunks_collection, &spec)
            .await?;
        self.ensure_collection(&client, &settings.docs_collection, &spec)
            .await?;

        if records.is_empty() {
            self.transcript.warn("No chunks to upload");
            return Ok(UploadSummary::default());
        }

        let embedder = HashingEmbedder::new(spec.dimension as usize);
        let points: Vec<Value> = records
            .iter()
            .map(|record| build_point(&embedder, &spec, &record.document, chunk_payload(record)))
            .collect();
        let mut chunks = 0;
        for batch in points.chunks(UPSERT_BATCH) {
            chunks += client
                .upsert_points(&settings.chunks_collection, batch.to_vec())
                .await?;
        }

        let document = records
            .iter()
            .map(|record| record.document.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let mut payload = Map::new();
        if let Some(title) = records.iter().find_map(ChunkRecord::title) {
            payload.insert("title".into(), Value::String(title.to_string()));
        }
        payload.insert("chunks".into(), json!(records.len()));
        let doc_point = build_point(&embedder, &spec, &document, payload);
        let documents = client
            .upsert_points(&settings.docs_collection, vec![doc_point])
            .await?;

        let summary = UploadSummary { chunks, documents };
        self.transcript.info(format!(
            "Uploaded {} chunks to '{}' and {} document to '{}'",
            summary.chunks,
            settings.chunks_collection,
            summary.documents,
            settings.docs_collection
        ));
        Ok(summary)
    }
}

fn chunk_payload(record: &ChunkRecord) -> Map<String, Value> {
    let mut payload = Map::new();
    for (key, value) in &record.metadata {
        let value = match value {
            MetaValue::Int(n) => json!(n),
            MetaValue::Text(s) => json!(s),
        };
        payload.insert(key.clone(), value);
    }
    payload
}

fn build_point(
    embedder: &dyn Embedder,
    spec: &CollectionSpec,
    text: &str,
    mut payload: Map<String, Value>,
) -> Value {
    let sparse = embedder.sparse(text);
    payload.insert("document".into(), Value::String(text.to_string()));
    json!({
        "id": Uuid::new_v4().to_string(),
        "vector": {
            spec.dense_name.as_str(): embedder.dense(text),
            spec.sparse_name.as_str(): {
                "indices": sparse.indices,
                "values": sparse.values,
            }
        },
        "payload": payload,
    })
}
