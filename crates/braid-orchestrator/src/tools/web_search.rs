//! Built-in web search over the DuckDuckGo instant-answer API.
//!
//! No API key required. The instant-answer endpoint returns one primary
//! abstract plus related topics, where topic groups nest one level of
//! sub-topics; both flatten into a single result list here.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use braid_abstraction::Tool;

use super::{error_payload, integer_argument, REQUEST_TIMEOUT};
use crate::error::Result;
use crate::manager::{BuiltInTool, ToolParameters};

const SEARCH_ENDPOINT: &str = "https://api.duckduckgo.com/";
const DEFAULT_COUNT: i64 = 5;
const MAX_RESULTS: i64 = 20;
const TITLE_CHARS: usize = 80;

pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
}

impl WebSearchTool {
    #[must_use]
    pub fn new() -> Self {
        Self::with_endpoint(SEARCH_ENDPOINT)
    }

    /// Points the tool at a different instant-answer-shaped endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into() }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuiltInTool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn definition(&self) -> Tool {
        Tool::new(
            "web_search",
            "Search the web and return concise result snippets",
            ToolParameters::new()
                .add_property("query", "string", "Search query", true)
                .add_property("count", "integer", "Number of results to return (1-20)", false)
                .build(),
        )
    }

    async fn execute(&self, arguments: &Value) -> Result<String> {
        let query = arguments.get("query").and_then(Value::as_str).map_or("", str::trim);
        if query.is_empty() {
            return Ok(error_payload("Missing query parameter"));
        }

        let count =
            integer_argument(arguments, "count").unwrap_or(DEFAULT_COUNT).clamp(1, MAX_RESULTS)
                as usize;

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await;
        let body = match response {
            Ok(response) => match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    return Ok(error_payload(&format!("Failed to read search response: {}", e)))
                }
            },
            Err(e) => return Ok(error_payload(&format!("Search request failed: {}", e))),
        };

        let answer: InstantAnswer = match serde_json::from_str(&body) {
            Ok(answer) => answer,
            Err(e) => return Ok(error_payload(&format!("Unexpected search response: {}", e))),
        };

        let mut results = Vec::new();
        append_primary(&answer, &mut results);
        append_related(&answer.related_topics, &mut results);
        results.truncate(count);

        debug!(query = %query, results = results.len(), "web search completed");
        Ok(json!({ "query": query, "results": results }).to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
struct InstantAnswer {
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "Heading", default)]
    heading: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<RelatedTopic>,
}

/// One related-topic entry. Leaves carry `Text`/`FirstURL`; topic groups
/// carry a nested `Topics` list instead.
#[derive(Debug, Deserialize)]
struct RelatedTopic {
    #[serde(rename = "Topics", default)]
    topics: Vec<RelatedTopic>,
    #[serde(rename = "Text", default)]
    text: String,
    #[serde(rename = "FirstURL", default)]
    first_url: String,
}

fn append_primary(answer: &InstantAnswer, results: &mut Vec<Value>) {
    let text = answer.abstract_text.trim();
    let url = answer.abstract_url.trim();
    let heading = answer.heading.trim();
    if text.is_empty() && url.is_empty() {
        return;
    }
    let title = if heading.is_empty() { url } else { heading };
    results.push(json!({ "title": title, "url": url, "snippet": text }));
}

fn append_related(topics: &[RelatedTopic], results: &mut Vec<Value>) {
    for topic in topics {
        if !topic.topics.is_empty() {
            append_related(&topic.topics, results);
            continue;
        }
        let text = topic.text.trim();
        let url = topic.first_url.trim();
        if text.is_empty() && url.is_empty() {
            continue;
        }
        let title: String = text.chars().take(TITLE_CHARS).collect();
        results.push(json!({ "title": title, "url": url, "snippet": text }));
    }
}
