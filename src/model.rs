use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A metadata value attached to a chunk. Only strings and integers are produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Int(i64),
    Text(String),
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

pub type Metadata = BTreeMap<String, MetaValue>;

/// A contiguous slice of processed text produced by the splitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: Metadata,
    /// Character count of `text`, fixed at creation.
    pub length: usize,
}

impl Chunk {
    pub fn new(text: String, metadata: Metadata) -> Self {
        let length = text.chars().count();
        Self {
            text,
            metadata,
            length,
        }
    }
}

/// Exchange record of the chunking step: `{ "document": ..., "metadata": {...} }`.
///
/// This is the format the upload step consumes, so field names are fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub document: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl From<Chunk> for ChunkRecord {
    fn from(chunk: Chunk) -> Self {
        let mut metadata = chunk.metadata;
        metadata.insert("length".into(), MetaValue::Int(chunk.length as i64));
        Self {
            document: chunk.text,
            metadata,
        }
    }
}

impl ChunkRecord {
    pub fn title(&self) -> Option<&str> {
        match self.metadata.get("title") {
            Some(MetaValue::Text(title)) => Some(title),
            _ => None,
        }
    }
}

/// Encode chunks as the pretty-printed JSON array shown in the preview.
pub fn encode_chunks(chunks: Vec<Chunk>) -> serde_json::Result<String> {
    let records: Vec<ChunkRecord> = chunks.into_iter().map(ChunkRecord::from).collect();
    serde_json::to_string_pretty(&records)
}

/// Parse the (possibly hand-edited) preview text back into records.
pub fn decode_records(text: &str) -> serde_json::Result<Vec<ChunkRecord>> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_carries_length_and_exact_field_names() {
        let mut metadata = Metadata::new();
        metadata.insert("title".into(), "report".into());
        let chunk = Chunk::new("Привет мир".into(), metadata);
        assert_eq!(chunk.length, 10);

        let encoded = encode_chunks(vec![chunk]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(
            value,
            json!([{
                "document": "Привет мир",
                "metadata": { "length": 10, "title": "report" }
            }])
        );
    }

    #[test]
    fn decode_accepts_missing_metadata() {
        let records = decode_records(r#"[{"document": "a"}]"#).unwrap();
        assert_eq!(records[0].document, "a");
        assert!(records[0].metadata.is_empty());
        assert_eq!(records[0].title(), None);
    }
}
