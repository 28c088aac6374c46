//! Built-in page fetcher returning cleaned text.
//!
//! HTML flattens in stages: script and style blocks drop first, then every
//! remaining tag, then the handful of entities that survive into text.
//! The result is whitespace-collapsed plain text capped at `max_chars`.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use braid_abstraction::Tool;

use super::{error_payload, integer_argument, REQUEST_TIMEOUT};
use crate::error::Result;
use crate::manager::{BuiltInTool, ToolParameters};

const DEFAULT_MAX_CHARS: i64 = 4_000;
const MIN_MAX_CHARS: i64 = 200;
const HARD_MAX_CHARS: i64 = 12_000;

// The regex crate has no backreferences, so script and style close-tags
// are matched separately.
static SCRIPT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("script regex should be valid")
});
static STYLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("style regex should be valid")
});
static TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<[^>]+>").expect("tag regex should be valid"));
static WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex should be valid"));

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    #[must_use]
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuiltInTool for WebFetchTool {
    fn name(&self) -> &'static str {
        "web_fetch"
    }

    fn definition(&self) -> Tool {
        Tool::new(
            "web_fetch",
            "Fetch a URL and return cleaned page text",
            ToolParameters::new()
                .add_property("url", "string", "HTTP or HTTPS URL", true)
                .add_property("max_chars", "integer", "Maximum characters returned", false)
                .build(),
        )
    }

    async fn execute(&self, arguments: &Value) -> Result<String> {
        let url = arguments.get("url").and_then(Value::as_str).map_or("", str::trim);
        if url.is_empty() {
            return Ok(error_payload("Missing url parameter"));
        }
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Ok(error_payload("Only http:// and https:// URLs are supported"));
        }

        let max_chars = integer_argument(arguments, "max_chars")
            .unwrap_or(DEFAULT_MAX_CHARS)
            .clamp(MIN_MAX_CHARS, HARD_MAX_CHARS) as usize;

        let response = match self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/html, text/plain, application/json")
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(error_payload(&format!("Fetch failed: {}", e))),
        };

        // Non-2xx pages still carry readable bodies; the status rides along
        // in the payload instead of failing the call.
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(text) => text,
            Err(e) => return Ok(error_payload(&format!("Failed to read page body: {}", e))),
        };

        let text = sanitize(&body);
        let truncated = text.chars().count() > max_chars;
        let content: String = text.chars().take(max_chars).collect();

        debug!(url = %url, status, truncated, "web fetch completed");
        Ok(json!({
            "url": url,
            "status": status,
            "content": content,
            "truncated": truncated,
        })
        .to_string())
    }
}

/// Strips markup and collapses the result to single-spaced text.
fn sanitize(input: &str) -> String {
    let text = SCRIPT_REGEX.replace_all(input, " ");
    let text = STYLE_REGEX.replace_all(&text, " ");
    let text = TAG_REGEX.replace_all(&text, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    WHITESPACE_REGEX.replace_all(&text, " ").trim().to_string()
}
