// SPDX-License-Identifier: MIT

use crate::adk::error::FlowError;
use crate::adk::tool::Tool;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

/// Characters of page text returned for a fetched URL
pub const MAX_PAGE_CHARS: usize = 2000;

const TOOL_NAME: &str = "web_search";

// --- Static schema ---

static WEB_SEARCH_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "The search query"
            },
            "url": {
                "type": "string",
                "description": "A specific page to read instead of searching"
            },
            "count": {
                "type": "integer",
                "description": "Number of results to return (default 5, max 20)"
            }
        },
        "required": ["query"]
    })
});

static SCRIPT_OR_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>")
        .expect("script/style pattern is valid")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

#[derive(Debug, Serialize, Deserialize)]
pub struct WebSearchArgs {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub count: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub results: Vec<SearchResult>,
    pub query: String,
}

/// The research tool offered to every tool-enabled agent
///
/// With `url` it reads that page. Otherwise it searches with Brave when
/// `BRAVE_API_KEY` is set.
pub struct WebSearchTool {
    client: Client,
    api_key: Option<String>,
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self::with_api_key(env::var("BRAVE_API_KEY").ok().filter(|k| !k.is_empty()))
    }

    pub fn with_api_key(api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("flowkit/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client, api_key }
    }

    async fn fetch_page(&self, url: &str) -> Result<Value, FlowError> {
        log::debug!("Fetching {}", url);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FlowError::tool(TOOL_NAME, format!("Request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FlowError::tool(
                TOOL_NAME,
                format!("HTTP {} fetching {}", status.as_u16(), url),
            ));
        }

        let body = resp.text().await?;
        Ok(json!({
            "url": url,
            "content": page_text(&body, MAX_PAGE_CHARS),
        }))
    }

    async fn search(&self, query: &str, count: u32) -> Result<Value, FlowError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            FlowError::tool(
                TOOL_NAME,
                "web search is not configured (set BRAVE_API_KEY) and no url was given",
            )
        })?;

        let mut url = reqwest::Url::parse("https://api.search.brave.com/res/v1/web/search")
            .map_err(|e| FlowError::tool(TOOL_NAME, e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("count", &count.to_string());

        let resp = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(FlowError::tool(TOOL_NAME, format!("Brave API error: {}", text)));
        }

        let body: Value = resp.json().await?;
        let results_json = body
            .get("web")
            .and_then(|w| w.get("results"))
            .cloned()
            .unwrap_or_else(|| json!([]));
        let results: Vec<SearchResult> = serde_json::from_value(results_json)?;

        Ok(serde_json::to_value(WebSearchResult {
            results,
            query: query.to_string(),
        })?)
    }
}

/// Visible text of an HTML page, truncated to `max_chars`
pub fn page_text(html: &str, max_chars: usize) -> String {
    let without_code = SCRIPT_OR_STYLE.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_code, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    let text = WHITESPACE.replace_all(&decoded, " ");
    text.trim().chars().take(max_chars).collect()
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Searches the web for current information, or reads a specific page when a url is given."
    }

    fn schema(&self) -> &Value {
        &WEB_SEARCH_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value, FlowError> {
        let args: WebSearchArgs = serde_json::from_value(input)
            .map_err(|e| FlowError::tool(TOOL_NAME, format!("Invalid arguments: {}", e)))?;

        if let Some(url) = args.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return self.fetch_page(url).await;
        }
        if args.query.trim().is_empty() {
            return Err(FlowError::tool(TOOL_NAME, "query must not be empty"));
        }
        self.search(&args.query, args.count.unwrap_or(5).min(20)).await
    }
}
