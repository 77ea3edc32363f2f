//! 知识搜索工具：调用 Perplexica 风格的 `/api/search`
//!
//! 请求体带 chatModel / embeddingModel / optimizationMode / focusMode / query / history，
//! 返回 `{answer, sources: [{title, url}]}`，由结果格式化器拆成正文与链接列表。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::SearchSection;
use crate::tools::{ParamSpec, ParameterSchema, Tool, ToolDescriptor};

pub const FOCUS_MODES: [(&str, &str); 6] = [
    ("webSearch", "WEB_SEARCH"),
    ("academicSearch", "ACADEMIC_SEARCH"),
    ("writingAssistant", "WRITING_ASSISTANT"),
    ("wolframAlphaSearch", "WOLFRAM_ALPHA"),
    ("youtubeSearch", "YOUTUBE_SEARCH"),
    ("redditSearch", "REDDIT_SEARCH"),
];

pub const OPTIMIZATION_MODES: [(&str, &str); 2] = [("speed", "SPEED"), ("balanced", "BALANCED")];

#[derive(Debug, Deserialize)]
struct SourceMetadata {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct Source {
    metadata: SourceMetadata,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    message: String,
    #[serde(default)]
    sources: Vec<Source>,
}

/// 把服务端响应整理为 `{answer, sources}`
fn to_result(body: SearchResponse) -> Value {
    json!({
        "answer": body.message,
        "sources": body
            .sources
            .into_iter()
            .map(|s| json!({"title": s.metadata.title, "url": s.metadata.url}))
            .collect::<Vec<_>>(),
    })
}

/// 搜索工具
pub struct SearchTool {
    client: Client,
    base_url: String,
    chat_model: String,
    embedding_model: String,
}

impl SearchTool {
    pub fn new(cfg: &SearchSection) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            chat_model: cfg.chat_model.clone(),
            embedding_model: cfg.embedding_model.clone(),
        }
    }

    fn payload(&self, args: &Value, query: &str) -> Value {
        let mode = |key: &str, default: &str| {
            args.get(key)
                .and_then(Value::as_str)
                .unwrap_or(default)
                .to_string()
        };
        let history: Vec<Value> = args
            .get("history")
            .and_then(Value::as_array)
            .map(|turns| {
                turns
                    .iter()
                    .flat_map(|t| {
                        [
                            json!(["human", t.get("query").and_then(Value::as_str).unwrap_or("")]),
                            json!(["assistant", t.get("response").and_then(Value::as_str).unwrap_or("")]),
                        ]
                    })
                    .collect()
            })
            .unwrap_or_default();
        json!({
            "chatModel": {"provider": "ollama", "model": self.chat_model},
            "embeddingModel": {"provider": "ollama", "model": self.embedding_model},
            "optimizationMode": mode("optimization_mode", "speed"),
            "focusMode": mode("focus_mode", "webSearch"),
            "query": query,
            "history": history,
        })
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "SearchTool",
            "知识搜索工具，支持多种搜索模式和优化选项",
            ParameterSchema::new()
                .param("query", ParamSpec::string("搜索查询内容").required())
                .param(
                    "focus_mode",
                    ParamSpec::string("搜索焦点模式")
                        .with_named_enum(FOCUS_MODES)
                        .default_value("webSearch"),
                )
                .param(
                    "optimization_mode",
                    ParamSpec::string("优化模式")
                        .with_named_enum(OPTIMIZATION_MODES)
                        .default_value("speed"),
                )
                .param("history", ParamSpec::array("对话历史")),
        )
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| "搜索查询不能为空".to_string())?;
        let url = format!("{}/api/search", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&self.payload(&args, query))
            .send()
            .await
            .map_err(|e| format!("搜索请求失败: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("搜索服务返回 {}", resp.status()));
        }
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| format!("搜索结果解析失败: {e}"))?;
        Ok(to_result(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> SearchTool {
        SearchTool::new(&SearchSection::default())
    }

    #[test]
    fn test_payload_defaults_and_history() {
        let p = tool().payload(
            &json!({"query": "rust", "history": [{"query": "a", "response": "b"}]}),
            "rust",
        );
        assert_eq!(p["focusMode"], "webSearch");
        assert_eq!(p["optimizationMode"], "speed");
        assert_eq!(p["history"][0], json!(["human", "a"]));
        assert_eq!(p["history"][1], json!(["assistant", "b"]));
    }

    #[test]
    fn test_to_result_shape() {
        let body: SearchResponse = serde_json::from_value(json!({
            "message": "answer text",
            "sources": [{"pageContent": "x", "metadata": {"title": "T", "url": "https://a.io"}}]
        }))
        .unwrap();
        let v = to_result(body);
        assert_eq!(v["answer"], "answer text");
        assert_eq!(v["sources"][0]["url"], "https://a.io");
    }

    #[test]
    fn test_focus_mode_enum_is_declared() {
        let desc = tool().describe();
        let spec = desc.parameters.get("focus_mode").unwrap();
        assert_eq!(spec.allowed_values().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_empty_query_is_error() {
        assert!(tool().execute(json!({"query": "  "})).await.is_err());
    }
}
