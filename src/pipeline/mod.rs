//! Document pipeline collaborators and the step actions built on them.
//!
//! The wizard only knows three text-to-text actions. Each one is built from a collaborator
//! trait so the default implementations (local conversion, Markdown splitting, Qdrant upload)
//! can be swapped for stubs in tests.

mod convert;
mod llm;
mod postprocess;
mod split;

pub(crate) use convert::extension_of;
pub use convert::{html_to_markdown, LocalConverter};
pub use postprocess::clean_markdown;
pub use split::{split_markdown, MarkdownSplitter};

use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::config::Settings;
use crate::logging::Transcript;
use crate::model::{decode_records, encode_chunks, Chunk, ChunkRecord, MetaValue, Metadata};
use crate::orchestrator::{step_action, StepAction, TaskContext};
use crate::upload::{QdrantError, QdrantUploader};

/// Errors raised by the pipeline collaborators.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("document not found: '{}'", path.display())]
    FileNotFound { path: PathBuf },

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("format '{extension}' needs an external converter; set 'converter_command'")]
    ConverterRequired { extension: String },

    #[error("failed to start converter '{command}': {source}")]
    ConverterSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("converter '{command}' exited with {status}: {stderr}")]
    ConverterFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("chunk size must be positive, got {0}")]
    InvalidChunkSize(i64),

    #[error("invalid chunk JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Upload(#[from] QdrantError),
}

/// Turns an input document into Markdown and cleans it up.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, path: &Path, settings: &Settings) -> Result<String, PipelineError>;

    async fn preprocess(&self, markdown: &str, settings: &Settings)
        -> Result<String, PipelineError>;
}

/// Splits Markdown into ordered chunks.
pub trait Splitter: Send + Sync {
    fn split(
        &self,
        markdown: &str,
        metadata: Metadata,
        settings: &Settings,
    ) -> Result<Vec<Chunk>, PipelineError>;
}

/// Counts reported by an upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub chunks: usize,
    pub documents: usize,
}

/// Pushes chunk records into the vector store.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        records: Vec<ChunkRecord>,
        settings: &Settings,
    ) -> Result<UploadSummary, PipelineError>;
}

/// The collaborators a wizard is assembled from.
#[derive(Clone)]
pub struct Collaborators {
    pub converter: Arc<dyn Converter>,
    pub splitter: Arc<dyn Splitter>,
    pub uploader: Arc<dyn Uploader>,
}

impl Collaborators {
    /// Default implementations: local conversion, Markdown splitting and Qdrant over HTTP.
    pub fn local(transcript: Transcript) -> anyhow::Result<Self> {
        Ok(Self {
            converter: Arc::new(LocalConverter::new().context("build HTTP client")?),
            splitter: Arc::new(MarkdownSplitter),
            uploader: Arc::new(QdrantUploader::new(transcript).context("build HTTP client")?),
        })
    }
}

/// Step 1: the input is the selected document path (as shown, possibly edited, in the preview).
pub fn convert_action(converter: Arc<dyn Converter>) -> StepAction {
    step_action(move |ctx, input| convert_document(converter.clone(), ctx, input))
}

async fn convert_document(
    converter: Arc<dyn Converter>,
    ctx: TaskContext,
    input: String,
) -> anyhow::Result<String> {
    let path = PathBuf::from(input.trim());
    let markdown = converter
        .convert(&path, &ctx.settings)
        .await
        .with_context(|| format!("failed to convert {}", path.display()))?;
    let cleaned = converter
        .preprocess(&markdown, &ctx.settings)
        .await
        .context("failed to preprocess markdown")?;
    Ok(cleaned)
}

/// Step 2: Markdown in, chunk JSON out.
pub fn split_action(splitter: Arc<dyn Splitter>) -> StepAction {
    step_action(move |ctx, input| split_document(splitter.clone(), ctx, input))
}

async fn split_document(
    splitter: Arc<dyn Splitter>,
    ctx: TaskContext,
    input: String,
) -> anyhow::Result<String> {
    let mut metadata = Metadata::new();
    if ctx.settings.include_title && !ctx.document_title.is_empty() {
        metadata.insert("title".into(), MetaValue::Text(ctx.document_title.clone()));
    }
    let settings = ctx.settings;
    let chunks = tokio::task::spawn_blocking(move || splitter.split(&input, metadata, &settings))
        .await
        .context("splitter task panicked")??;
    Ok(encode_chunks(chunks)?)
}

/// Step 3: chunk JSON in, the same JSON out once it is stored.
pub fn upload_action(uploader: Arc<dyn Uploader>) -> StepAction {
    step_action(move |ctx, input| upload_document(uploader.clone(), ctx, input))
}

async fn upload_document(
    uploader: Arc<dyn Uploader>,
    ctx: TaskContext,
    input: String,
) -> anyhow::Result<String> {
    let records = decode_records(&input).context("preview does not contain chunk JSON")?;
    uploader.upload(records, &ctx.settings).await?;
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(title: &str) -> TaskContext {
        TaskContext {
            settings: Settings::default(),
            document_title: title.to_string(),
        }
    }

    #[tokio::test]
    async fn split_action_adds_title_and_length() {
        let action = split_action(Arc::new(MarkdownSplitter));
        let output = action(ctx("report"), "# Intro\n\nHello world.".into())
            .await
            .unwrap();
        let records = decode_records(&output).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title(), Some("report"));
        assert_eq!(
            records[0].metadata.get("length"),
            Some(&MetaValue::Int(records[0].document.chars().count() as i64))
        );
    }

    #[tokio::test]
    async fn split_action_omits_title_when_disabled() {
        let action = split_action(Arc::new(MarkdownSplitter));
        let mut context = ctx("report");
        context.settings.include_title = false;
        let output = action(context, "Hello world.".into()).await.unwrap();
        let records = decode_records(&output).unwrap();
        assert_eq!(records[0].title(), None);
    }

    #[tokio::test]
    async fn upload_action_rejects_non_json_preview() {
        struct Never;
        #[async_trait]
        impl Uploader for Never {
            async fn upload(
                &self,
                _records: Vec<ChunkRecord>,
                _settings: &Settings,
            ) -> Result<UploadSummary, PipelineError> {
                panic!("must not be called");
            }
        }
        let action = upload_action(Arc::new(Never));
        let err = action(ctx(""), "# not json".into()).await.unwrap_err();
        assert!(format!("{err:#}").contains("chunk JSON"));
    }
}
