use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::Path;
use tokio::process::Command;

use super::{llm, postprocess, Converter, PipelineError};
use crate::config::Settings;

pub struct LocalConverter {
    http: reqwest::Client,
}

impl LocalConverter {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("raggen-tui/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Converter for LocalConverter {
    async fn convert(&self, path: &Path, settings: &Settings) -> Result<String, PipelineError> {
        if !path.is_file() {
            return Err(PipelineError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let extension = extension_of(path);
        match extension.as_str() {
            ".md" => read_text(path).await,
            ".html" => Ok(html_to_markdown(&read_text(path).await?)),
            _ => run_converter_command(path, &extension, settings).await,
        }
    }

    async fn preprocess(
        &self,
        markdown: &str,
        settings: &Settings,
    ) -> Result<String, PipelineError> {
        let cleaned = postprocess::clean_markdown(markdown);
        if !settings.use_llm {
            return Ok(cleaned);
        }
        let restored = llm::restore_headings(&self.http, &cleaned, settings).await?;
        Ok(postprocess::clean_markdown(&restored))
    }
}

pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

async fn read_text(path: &Path) -> Result<String, PipelineError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Run `converter_command` for `path`.
///
/// The command is split on whitespace; a `{input}` token is replaced by the document path,
/// otherwise the path is appended as the last argument. OCR preferences are exported through
/// the environment.
async fn run_converter_command(
    path: &Path,
    extension: &str,
    settings: &Settings,
) -> Result<String, PipelineError> {
    let template = settings.converter_command.trim();
    let mut parts = template.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(PipelineError::ConverterRequired {
            extension: extension.to_string(),
        });
    };

    let input = path.display().to_string();
    let mut args: Vec<String> = Vec::new();
    let mut substituted = false;
    for part in parts {
        if part.contains("{input}") {
            args.push(part.replace("{input}", &input));
            substituted = true;
        } else {
            args.push(part.to_string());
        }
    }
    if !substituted {
        args.push(input);
    }

    tracing::debug!(program, ?args, "Running converter command");
    let output = Command::new(program)
        .args(&args)
        .env("RAGGEN_LANGUAGES", &settings.languages)
        .env("RAGGEN_FORCE_OCR", if settings.force_ocr { "1" } else { "0" })
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| PipelineError::ConverterSpawn {
            command: template.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(PipelineError::ConverterFailed {
            command: template.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

static RE_DROP_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|head|noscript)\b[^>]*>.*?</(script|style|head|noscript)>")
        .expect("valid regex")
});
static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static RE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]>").expect("valid regex"));
static RE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a>"#).expect("valid regex")
});
static RE_STRONG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(strong|b)\b[^>]*>(.*?)</(strong|b)>").expect("valid regex"));
static RE_EMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(em|i)\b[^>]*>(.*?)</(em|i)>").expect("valid regex"));
static RE_LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<li\b[^>]*>(.*?)</li>").expect("valid regex"));
static RE_LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
static RE_BLOCK_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</(p|div|section|article|ul|ol|table|tr|blockquote|pre)>|<(p|div|tr)\b[^>]*>")
        .expect("valid regex")
});
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));
static RE_NUMERIC_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("valid regex"));
static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid regex"));

/// Reduce an HTML document to Markdown.
///
/// Covers headings, paragraphs, links, emphasis, list items and line breaks; everything else
/// is flattened to text. Output still goes through the Markdown cleanup afterwards.
pub fn html_to_markdown(html: &str) -> String {
    let s = RE_COMMENT.replace_all(html, "");
    let s = RE_DROP_BLOCKS.replace_all(&s, "");
    let s = RE_HEADING.replace_all(&s, |caps: &Captures<'_>| {
        let level: usize = caps[1].parse().unwrap_or(1);
        format!(
            "\n\n{} {}\n\n",
            "#".repeat(level),
            inline_text(&caps[2])
        )
    });
    let s = RE_LINK.replace_all(&s, |caps: &Captures<'_>| {
        format!("[{}]({})", inline_text(&caps[2]), &caps[1])
    });
    let s = RE_STRONG.replace_all(&s, "**$2**");
    let s = RE_EMPHASIS.replace_all(&s, "*$2*");
    let s = RE_LIST_ITEM.replace_all(&s, |caps: &Captures<'_>| {
        format!("\n- {}", inline_text(&caps[1]))
    });
    let s = RE_LINE_BREAK.replace_all(&s, "\n");
    let s = RE_BLOCK_END.replace_all(&s, "\n\n");
    let s = RE_TAG.replace_all(&s, "");
    let s = decode_entities(&s);

    s.lines()
        .map(|line| RE_SPACES.replace_all(line.trim(), " ").into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

fn inline_text(fragment: &str) -> String {
    let text = RE_TAG.replace_all(fragment, "");
    RE_SPACES
        .replace_all(text.replace('\n', " ").trim(), " ")
        .into_owned()
}

fn decode_entities(input: &str) -> String {
    let s = RE_NUMERIC_ENTITY.replace_all(input, |caps: &Captures<'_>| {
        let code = &caps[1];
        let parsed = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        parsed
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
