use semchunk_rs::Chunker;

use super::postprocess::{heading_level, Fences};
use super::{PipelineError, Splitter};
use crate::config::Settings;
use crate::model::{Chunk, MetaValue, Metadata};

/// Default [`Splitter`]: chunks each run of paragraphs under the nearest headings.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownSplitter;

impl Splitter for MarkdownSplitter {
    fn split(
        &self,
        markdown: &str,
        metadata: Metadata,
        settings: &Settings,
    ) -> Result<Vec<Chunk>, PipelineError> {
        split_markdown(
            markdown,
            settings.chunk_size,
            settings.embed_metadata,
            &metadata,
        )
    }
}

#[derive(Debug, Default)]
struct Section {
    section: Option<String>,
    subsection: Option<String>,
    paragraphs: Vec<String>,
}

/// Split `markdown` into chunks of at most `chunk_size` body characters.
///
/// `base` is copied into every chunk's metadata before `section`, `subsection` and `paragraph`
/// are added. With `embed_metadata` the chunk text starts with a small header naming the title
/// and headings, so the limit applies to the body only.
pub fn split_markdown(
    markdown: &str,
    chunk_size: i64,
    embed_metadata: bool,
    base: &Metadata,
) -> Result<Vec<Chunk>, PipelineError> {
    if chunk_size <= 0 {
        return Err(PipelineError::InvalidChunkSize(chunk_size));
    }
    let limit = chunk_size as usize;

    let mut chunks = Vec::new();
    for section in sections(markdown) {
        for (first_paragraph, body) in pack(&section.paragraphs, limit) {
            let mut metadata = base.clone();
            if let Some(name) = &section.section {
                metadata.insert("section".into(), MetaValue::Text(name.clone()));
            }
            if let Some(name) = &section.subsection {
                metadata.insert("subsection".into(), MetaValue::Text(name.clone()));
            }
            metadata.insert("paragraph".into(), MetaValue::Int(first_paragraph as i64));

            let text = if embed_metadata {
                with_header(&metadata, body)
            } else {
                body
            };
            chunks.push(Chunk::new(text, metadata));
        }
    }
    Ok(chunks)
}

/// Group paragraphs by the headings above them. Heading lines are not part of any body.
fn sections(markdown: &str) -> Vec<Section> {
    let mut out = Vec::new();
    let mut current = Section::default();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut fences = Fences::default();

    fn flush(paragraph: &mut Vec<&str>, current: &mut Section) {
        let text = paragraph.join("\n");
        let text = text.trim();
        if !text.is_empty() {
            current.paragraphs.push(text.to_string());
        }
        paragraph.clear();
    }

    for line in markdown.lines() {
        if fences.feed(line) {
            paragraph.push(line);
            continue;
        }
        if line.trim().is_empty() {
            flush(&mut paragraph, &mut current);
            continue;
        }
        if let Some(level) = heading_level(line) {
            flush(&mut paragraph, &mut current);
            let title = line[level..].trim().trim_end_matches('#').trim().to_string();
            let title = (!title.is_empty()).then_some(title);
            let (section, subsection) = if level == 1 {
                (title, None)
            } else {
                (current.section.clone(), title)
            };
            let previous = std::mem::replace(
                &mut current,
                Section {
                    section,
                    subsection,
                    paragraphs: Vec::new(),
                },
            );
            if !previous.paragraphs.is_empty() {
                out.push(previous);
            }
            continue;
        }
        paragraph.push(line);
    }
    flush(&mut paragraph, &mut current);
    if !current.paragraphs.is_empty() {
        out.push(current);
    }
    out
}

/// Chunk one section body of at most `limit` characters per chunk.
///
/// Returns the 1-based index of the paragraph each chunk starts in alongside the chunk.
fn pack(paragraphs: &[String], limit: usize) -> Vec<(usize, String)> {
    let mut body = String::new();
    let mut starts = Vec::with_capacity(paragraphs.len());
    for paragraph in paragraphs {
        if !body.is_empty() {
            body.push_str("\n\n");
        }
        starts.push(body.len());
        body.push_str(paragraph);
    }

    let chunker = Chunker::new(limit, Box::new(|segment: &str| segment.chars().count()));
    let mut out = Vec::new();
    let mut cursor = 0usize;
    let mut last_paragraph = 1usize;
    for piece in chunker.chunk(&body) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if let Some(offset) = body[cursor..].find(piece) {
            let at = cursor + offset;
            last_paragraph = starts.partition_point(|&start| start <= at).max(1);
            cursor = at + piece.len();
        }
        out.push((last_paragraph, piece.to_string()));
    }
    out
}

fn with_header(metadata: &Metadata, body: String) -> String {
    let mut header = String::new();
    for (key, label) in [
        ("title", "Title"),
        ("section", "Section"),
        ("subsection", "Subsection"),
    ] {
        if let Some(MetaValue::Text(value)) = metadata.get(key) {
            header.push_str(&format!("{label}: {value}\n"));
        }
    }
    if header.is_empty() {
        body
    } else {
        format!("{header}\n{body}")
    }
}
