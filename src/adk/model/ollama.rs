// SPDX-License-Identifier: MIT

//! Ollama provider - local model server implementation

use super::{
    ChatMessage, ChatResponse, GenerateRequest, GenerationConfig, LlmProvider, ModelInfo, Role,
    ToolCall,
};
use crate::adk::error::FlowError;
use crate::adk::tool::ToolDefinition;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const PROVIDER: &str = "ollama";

/// Default address of a local Ollama server
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Ollama model server client
pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

impl OllamaProvider {
    /// Create a provider for the server at `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FlowError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the Ollama server is reachable
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                log::warn!("Ollama server not available at {}: {}", self.base_url, e);
                false
            }
        }
    }

    /// Convert a message to Ollama's chat format
    fn message_to_ollama(message: &ChatMessage) -> Value {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let mut msg = json!({
            "role": role,
            "content": message.content,
        });

        if !message.tool_calls.is_empty() {
            let calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments
                        }
                    })
                })
                .collect();
            msg["tool_calls"] = json!(calls);
        }

        if let Some(name) = &message.tool_name {
            msg["tool_name"] = json!(name);
        }

        msg
    }

    /// Convert tool definitions to Ollama's function format
    fn tools_to_ollama(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters
                    }
                })
            })
            .collect()
    }

    fn options_from_config(config: &GenerationConfig) -> Option<Value> {
        let mut options = serde_json::Map::new();
        if let Some(temp) = config.temperature {
            options.insert("temperature".to_string(), json!(temp));
        }
        if let Some(max) = config.max_output_tokens {
            options.insert("num_predict".to_string(), json!(max));
        }
        if let Some(top_p) = config.top_p {
            options.insert("top_p".to_string(), json!(top_p));
        }
        if let Some(top_k) = config.top_k {
            options.insert("top_k".to_string(), json!(top_k));
        }
        if options.is_empty() {
            None
        } else {
            Some(Value::Object(options))
        }
    }

    /// Parse an `/api/chat` response body
    fn parse_chat_response(response: &Value) -> Result<ChatResponse, FlowError> {
        let message = response
            .get("message")
            .ok_or_else(|| FlowError::provider(PROVIDER, "No message in chat response"))?;

        let content = message["content"].as_str().unwrap_or_default().to_string();
        let thinking = message["thinking"]
            .as_str()
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for tc in calls {
                let name = tc["function"]["name"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                if name.is_empty() {
                    continue;
                }
                // Some models send arguments as a JSON-encoded string
                let arguments = match &tc["function"]["arguments"] {
                    Value::String(s) => serde_json::from_str(s).unwrap_or(json!({})),
                    Value::Null => json!({}),
                    other => other.clone(),
                };
                tool_calls.push(ToolCall { name, arguments });
            }
        }

        Ok(ChatResponse {
            content,
            tool_calls,
            thinking,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, FlowError> {
        let url = format!("{}{}", self.base_url, path);

        log::debug!(
            "Ollama request to {}: {}",
            url,
            serde_json::to_string_pretty(body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                FlowError::provider(
                    PROVIDER,
                    format!(
                        "Failed to connect to Ollama at {}: {}. Is Ollama running?",
                        self.base_url, e
                    ),
                )
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(FlowError::provider(
                PROVIDER,
                format!("{} failed ({}): {}", path, status, text),
            ));
        }

        resp.json()
            .await
            .map_err(|e| FlowError::provider(PROVIDER, format!("Invalid response body: {}", e)))
    }

    fn chat_body(
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        config: Option<&GenerationConfig>,
    ) -> Value {
        let messages: Vec<Value> = messages.iter().map(Self::message_to_ollama).collect();
        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": false
        });

        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            body["tools"] = json!(Self::tools_to_ollama(tools));
        }
        if let Some(options) = config.and_then(Self::options_from_config) {
            body["options"] = options;
        }
        body
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate(&self, model: &str, request: GenerateRequest) -> Result<String, FlowError> {
        let mut body = json!({
            "model": model,
            "prompt": request.prompt,
            "stream": false
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        if let Some(options) = Self::options_from_config(&request.config) {
            body["options"] = options;
        }

        let resp = self.post("/api/generate", &body).await?;
        Ok(resp["response"].as_str().unwrap_or_default().to_string())
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        config: Option<&GenerationConfig>,
    ) -> Result<String, FlowError> {
        let body = Self::chat_body(model, messages, None, config);
        let resp = self.post("/api/chat", &body).await?;
        Ok(Self::parse_chat_response(&resp)?.content)
    }

    async fn chat_with_tools(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        config: Option<&GenerationConfig>,
    ) -> Result<ChatResponse, FlowError> {
        let body = Self::chat_body(model, messages, tools, config);
        let resp = self.post("/api/chat", &body).await?;
        let parsed = Self::parse_chat_response(&resp)?;
        log::info!(
            "Ollama chat returned {} chars and {} tool call(s)",
            parsed.content.len(),
            parsed.tool_calls.len()
        );
        Ok(parsed)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, FlowError> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self.client.get(&url).send().await.map_err(|e| {
            FlowError::provider(PROVIDER, format!("Failed to fetch models: {}", e))
        })?;

        if !resp.status().is_success() {
            return Err(FlowError::provider(
                PROVIDER,
                format!("Failed to fetch models: {}", resp.status()),
            ));
        }

        let body: Value = resp.json().await?;
        let models = body
            .get("models")
            .cloned()
            .unwrap_or_else(|| Value::Array(vec![]));
        Ok(serde_json::from_value(models)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_to_ollama_user() {
        let msg = OllamaProvider::message_to_ollama(&ChatMessage::user("Hello"));
        assert_eq!(msg["role"], "user");
        assert_eq!(msg["content"], "Hello");
        assert!(msg.get("tool_calls").is_none());
    }

    #[test]
    fn test_message_to_ollama_tool_call_and_result() {
        let call = ChatMessage::assistant_tool_calls(
            "",
            vec![ToolCall {
                name: "web_search".to_string(),
                arguments: json!({"query": "rust"}),
            }],
        );
        let msg = OllamaProvider::message_to_ollama(&call);
        assert_eq!(msg["role"], "assistant");
        assert_eq!(msg["tool_calls"][0]["function"]["name"], "web_search");
        assert_eq!(msg["tool_calls"][0]["function"]["arguments"]["query"], "rust");

        let result = OllamaProvider::message_to_ollama(&ChatMessage::tool_result(
            "web_search",
            "found",
        ));
        assert_eq!(result["role"], "tool");
        assert_eq!(result["tool_name"], "web_search");
    }

    #[test]
    fn test_chat_body_includes_tools_and_options() {
        let tools = vec![ToolDefinition {
            name: "web_search".to_string(),
            description: "Search".to_string(),
            parameters: json!({"type": "object"}),
        }];
        let config = GenerationConfig {
            temperature: Some(0.5),
            ..Default::default()
        };
        let body = OllamaProvider::chat_body(
            "llama3.2:3b",
            &[ChatMessage::user("hi")],
            Some(&tools),
            Some(&config),
        );
        assert_eq!(body["model"], "llama3.2:3b");
        assert_eq!(body["stream"], false);
        assert_eq!(body["tools"][0]["function"]["name"], "web_search");
        assert_eq!(body["options"]["temperature"], 0.5);
    }

    #[test]
    fn test_chat_body_omits_empty_tools() {
        let body = OllamaProvider::chat_body("m", &[], Some(&[]), None);
        assert!(body.get("tools").is_none());
        assert!(body.get("options").is_none());
    }

    #[test]
    fn test_parse_text_response() {
        let resp = json!({
            "model": "llama3.2:3b",
            "message": {"role": "assistant", "content": "Hello there"},
            "done": true
        });
        let parsed = OllamaProvider::parse_chat_response(&resp).unwrap();
        assert_eq!(parsed.content, "Hello there");
        assert!(parsed.tool_calls.is_empty());
        assert!(parsed.thinking.is_none());
    }

    #[test]
    fn test_parse_tool_call_response() {
        let resp = json!({
            "message": {
                "role": "assistant",
                "content": "",
                "thinking": "I should search",
                "tool_calls": [
                    {"function": {"name": "web_search", "arguments": {"query": "weather"}}},
                    {"function": {"name": "search_knowledge_base", "arguments": "{\"query\": \"refunds\"}"}}
                ]
            }
        });
        let parsed = OllamaProvider::parse_chat_response(&resp).unwrap();
        assert_eq!(parsed.tool_calls.len(), 2);
        assert_eq!(parsed.tool_calls[0].arguments["query"], "weather");
        assert_eq!(parsed.tool_calls[1].arguments["query"], "refunds");
        assert_eq!(parsed.thinking.as_deref(), Some("I should search"));
    }

    #[test]
    fn test_parse_missing_message() {
        let result = OllamaProvider::parse_chat_response(&json!({"error": "model not found"}));
        assert!(matches!(result, Err(FlowError::Provider { .. })));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let provider =
            OllamaProvider::new("http://localhost:11434/", Duration::from_secs(1)).unwrap();
        assert_eq!(provider.base_url(), "http://localhost:11434");
    }
}
