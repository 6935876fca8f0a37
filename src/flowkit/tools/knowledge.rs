// SPDX-License-Identifier: MIT

use crate::adk::error::FlowError;
use crate::adk::tool::Tool;
use crate::flowkit::workflow::context::Document;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;

const TOOL_NAME: &str = "search_knowledge_base";

/// Longest passage kept whole; longer paragraphs are split on sentence ends
const MAX_PASSAGE_CHARS: usize = 800;

static KNOWLEDGE_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "What to look for in the attached documents"
            }
        },
        "required": ["query"]
    })
});

#[derive(Debug, Deserialize)]
struct KnowledgeArgs {
    query: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Passage {
    document: String,
    text: String,
}

/// Keyword search over the documents attached to an agent
pub struct KnowledgeSearchTool {
    passages: Vec<Passage>,
    max_results: usize,
}

impl KnowledgeSearchTool {
    pub fn new(documents: &[Document], max_results: usize) -> Self {
        let passages = documents
            .iter()
            .flat_map(|doc| {
                split_passages(&doc.content)
                    .into_iter()
                    .map(move |text| Passage {
                        document: doc.name.clone(),
                        text,
                    })
            })
            .collect();
        Self {
            passages,
            max_results: max_results.max(1),
        }
    }

    /// Passages ranked by how many query terms they mention
    fn search(&self, query: &str) -> Vec<(&Passage, usize)> {
        let terms = terms(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, &Passage, usize)> = self
            .passages
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                let words = p.text.to_lowercase();
                let score = terms
                    .iter()
                    .map(|t| words.matches(t.as_str()).count())
                    .sum::<usize>();
                (score > 0).then_some((i, p, score))
            })
            .collect();

        // Highest score first, document order breaks ties
        scored.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(self.max_results)
            .map(|(_, p, score)| (p, score))
            .collect()
    }
}

fn terms(query: &str) -> HashSet<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

fn split_passages(content: &str) -> Vec<String> {
    let mut passages = Vec::new();
    for paragraph in content.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if paragraph.chars().count() <= MAX_PASSAGE_CHARS {
            passages.push(paragraph.to_string());
            continue;
        }
        let mut current = String::new();
        for sentence in paragraph.split_inclusive(['.', '!', '?']) {
            if !current.is_empty()
                && current.chars().count() + sentence.chars().count() > MAX_PASSAGE_CHARS
            {
                passages.push(current.trim().to_string());
                current.clear();
            }
            current.push_str(sentence);
        }
        if !current.trim().is_empty() {
            passages.push(current.trim().to_string());
        }
    }
    passages
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Searches the documents attached to this agent and returns the most relevant passages."
    }

    fn schema(&self) -> &Value {
        &KNOWLEDGE_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value, FlowError> {
        let args: KnowledgeArgs = serde_json::from_value(input)
            .map_err(|e| FlowError::tool(TOOL_NAME, format!("Invalid arguments: {}", e)))?;

        let hits = self.search(&args.query);
        log::debug!("Knowledge search '{}' matched {} passage(s)", args.query, hits.len());

        if hits.is_empty() {
            return Ok(Value::String(format!(
                "No relevant passages found for '{}'.",
                args.query
            )));
        }

        let text = hits
            .iter()
            .map(|(p, _)| format!("[{}]\n{}", p.document, p.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(Value::String(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str, content: &str) -> Document {
        Document {
            name: name.to_string(),
            kind: None,
            path: None,
            content: content.to_string(),
        }
    }

    fn tool(max_results: usize) -> KnowledgeSearchTool {
        KnowledgeSearchTool::new(
            &[
                doc(
                    "returns.md",
                    "Returns are accepted within 30 days.\n\nRefunds go to the original payment method.",
                ),
                doc("shipping.md", "Shipping takes 3 days. Express shipping takes 1 day."),
            ],
            max_results,
        )
    }

    #[tokio::test]
    async fn test_best_passage_first() {
        let out = tool(5)
            .execute(json!({"query": "how long does shipping take"}))
            .await
            .unwrap();
        let text = out.as_str().unwrap();
        assert!(text.starts_with("[shipping.md]\nShipping takes 3 days."));
        assert!(!text.contains("Refunds"));
    }

    #[tokio::test]
    async fn test_max_results() {
        let out = tool(1)
            .execute(json!({"query": "returns refunds shipping"}))
            .await
            .unwrap();
        assert_eq!(out.as_str().unwrap().matches('[').count(), 1);
    }

    #[tokio::test]
    async fn test_no_match() {
        let out = tool(3).execute(json!({"query": "warranty"})).await.unwrap();
        assert_eq!(out, json!("No relevant passages found for 'warranty'."));
    }

    #[test]
    fn test_long_paragraphs_are_split() {
        let long = "This sentence is filler text. ".repeat(60);
        let passages = split_passages(&long);
        assert!(passages.len() > 1);
        assert!(passages.iter().all(|p| p.chars().count() <= MAX_PASSAGE_CHARS));
    }
}
