//! Web search tool backed by the DuckDuckGo Instant Answer API

use super::{Tool, ToolOutput};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const MAX_RELATED_TOPICS: usize = 5;

/// Web search tool
pub struct WebSearchTool {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct WebSearchInput {
    query: String,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self::with_base_url("https://api.duckduckgo.com")
    }

    /// Point the tool at a different host (tests)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn search(&self, query: &str) -> Result<String, String> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| format!("Search request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("Search API returned HTTP {status}"));
        }

        let body: InstantAnswer = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse search response: {e}"))?;

        let formatted = format_results(&body);
        if formatted.is_empty() {
            Err(format!("No results for \"{query}\""))
        } else {
            Ok(formatted)
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> String {
        "Search the web for current information. Returns a short abstract and related results for the query. Use for facts, news, and anything outside your built-in knowledge.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            }
        })
    }

    async fn run(&self, input: Value) -> ToolOutput {
        let input: WebSearchInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };

        if input.query.trim().is_empty() {
            return ToolOutput::error("Query must not be empty");
        }

        match self.search(input.query.trim()).await {
            Ok(results) => ToolOutput::success(results),
            Err(e) => ToolOutput::error(e),
        }
    }
}

// DuckDuckGo Instant Answer response (subset)

#[derive(Debug, Default, Deserialize)]
struct InstantAnswer {
    #[serde(default, rename = "Heading")]
    heading: String,
    #[serde(default, rename = "AbstractText")]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default, rename = "Answer")]
    answer: String,
    #[serde(default, rename = "RelatedTopics")]
    related_topics: Vec<RelatedTopic>,
}

/// Related topics are either plain results or nested groups
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Result {
        #[serde(rename = "Text")]
        text: String,
        #[serde(default, rename = "FirstURL")]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

fn format_results(answer: &InstantAnswer) -> String {
    let mut lines = Vec::new();

    if !answer.answer.is_empty() {
        lines.push(answer.answer.clone());
    }

    if !answer.abstract_text.is_empty() {
        if answer.heading.is_empty() {
            lines.push(answer.abstract_text.clone());
        } else {
            lines.push(format!("{}: {}", answer.heading, answer.abstract_text));
        }
        if !answer.abstract_url.is_empty() {
            lines.push(format!("Source: {}", answer.abstract_url));
        }
    }

    let related = flatten_topics(&answer.related_topics, MAX_RELATED_TOPICS);
    if !related.is_empty() {
        lines.push("Related:".to_string());
        lines.extend(related);
    }

    lines.join("\n")
}

fn flatten_topics(topics: &[RelatedTopic], limit: usize) -> Vec<String> {
    let mut out = Vec::new();
    collect_topics(topics, limit, &mut out);
    out
}

fn collect_topics(topics: &[RelatedTopic], limit: usize, out: &mut Vec<String>) {
    for topic in topics {
        if out.len() >= limit {
            return;
        }
        match topic {
            RelatedTopic::Result { text, first_url } => {
                if text.is_empty() {
                    continue;
                }
                if first_url.is_empty() {
                    out.push(format!("- {text}"));
                } else {
                    out.push(format!("- {text} ({first_url})"));
                }
            }
            RelatedTopic::Group { topics } => collect_topics(topics, limit, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Heading": "Rust (programming language)",
        "AbstractText": "Rust is a general-purpose programming language.",
        "AbstractURL": "https://en.wikipedia.org/wiki/Rust_(programming_language)",
        "Answer": "",
        "RelatedTopics": [
            {"Text": "Cargo - The Rust package manager", "FirstURL": "https://example.com/cargo"},
            {"Topics": [
                {"Text": "Ownership", "FirstURL": "https://example.com/ownership"}
            ]}
        ]
    }"#;

    #[test]
    fn formats_abstract_and_related() {
        let answer: InstantAnswer = serde_json::from_str(SAMPLE).unwrap();
        let formatted = format_results(&answer);

        assert!(formatted.starts_with("Rust (programming language): Rust is"));
        assert!(formatted.contains("Source: https://en.wikipedia.org"));
        assert!(formatted.contains("- Cargo - The Rust package manager"));
        // nested group got flattened
        assert!(formatted.contains("- Ownership"));
    }

    #[test]
    fn related_topics_are_capped() {
        let topics: Vec<RelatedTopic> = (0..10)
            .map(|i| RelatedTopic::Result {
                text: format!("topic {i}"),
                first_url: String::new(),
            })
            .collect();
        assert_eq!(flatten_topics(&topics, MAX_RELATED_TOPICS).len(), 5);
    }

    #[test]
    fn empty_answer_formats_to_empty() {
        let answer = InstantAnswer::default();
        assert!(format_results(&answer).is_empty());
    }

    #[tokio::test]
    async fn rejects_empty_query() {
        let tool = WebSearchTool::new();
        let result = tool.run(json!({"query": "   "})).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn rejects_malformed_input() {
        let tool = WebSearchTool::new();
        let result = tool.run(json!({"q": "rust"})).await;
        assert!(!result.success);
        assert!(result.output.contains("Invalid input"));
    }
}
