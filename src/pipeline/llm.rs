use serde::Deserialize;
use serde_json::json;

use super::PipelineError;
use crate::config::Settings;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const HEADINGS_PROMPT: &str = "You restore the heading structure of Markdown converted from a \
document. Mark section titles with '#', subsection titles with '##' and deeper levels with \
'###'. Do not rewrite, translate, summarise or drop any text. Reply with the Markdown only.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Ask the configured model to fix heading levels in `markdown`.
pub(crate) async fn restore_headings(
    client: &reqwest::Client,
    markdown: &str,
    settings: &Settings,
) -> Result<String, PipelineError> {
    let base = settings.llm_base_url.trim();
    let base = if base.is_empty() { DEFAULT_BASE_URL } else { base };
    let url = format!("{}/chat/completions", base.trim_end_matches('/'));

    let body = json!({
        "model": settings.llm_model,
        "temperature": 0,
        "messages": [
            { "role": "system", "content": HEADINGS_PROMPT },
            { "role": "user", "content": markdown },
        ],
    });

    let mut request = client.post(&url).json(&body);
    if !settings.llm_api_key.is_empty() {
        request = request.bearer_auth(&settings.llm_api_key);
    }
    tracing::debug!(url = %url, model = %settings.llm_model, "Requesting heading restoration");

    let response = request
        .send()
        .await
        .map_err(|err| PipelineError::Llm(err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(PipelineError::Llm(format!("HTTP {status}: {text}")));
    }
    let parsed: ChatResponse = response
        .json()
        .await
        .map_err(|err| PipelineError::Llm(err.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| PipelineError::Llm("response contained no text".into()))
}
