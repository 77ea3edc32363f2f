//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! - MockLlmClient：识别规划 / 参数优化两类提示词，给出可执行的最简 JSON
//! - ScriptedLlmClient：按顺序回放预置回复，并记录每次调用，便于断言

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::llm::{LlmClient, Message, Role};

/// Mock 客户端：规划时选择 ChatTool / EchoTool，参数优化时回显用户输入
#[derive(Debug, Default)]
pub struct MockLlmClient;

fn tool_names_in(prompt: &str) -> Vec<&str> {
    prompt
        .lines()
        .filter_map(|l| l.trim().strip_prefix("工具名称:"))
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect()
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        let names = tool_names_in(system);
        if system.contains("参数优化器") {
            let tool = names.first().copied().unwrap_or("EchoTool");
            let params = serde_json::json!({
                tool: {
                    "text": format!("Echo from Mock: {last_user}"),
                    "message": last_user,
                    "query": last_user,
                },
                "explanation": "mock parameters",
            });
            return Ok(params.to_string());
        }

        let chosen = ["ChatTool", "EchoTool"]
            .into_iter()
            .find(|n| names.contains(n))
            .or_else(|| names.first().copied());
        let plan = match chosen {
            Some(tool) => serde_json::json!({
                "tasks": [{
                    "id": "task_1",
                    "tool_name": tool,
                    "reason": "mock plan",
                    "order": 1,
                    "depends_on": []
                }],
                "execution_mode": "serial",
                "execution_strategy": { "parallel_groups": [], "reason": "mock" }
            }),
            None => serde_json::json!({ "tasks": [] }),
        };
        Ok(plan.to_string())
    }
}

/// 单次调用记录
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub user: String,
}

/// 脚本化客户端：依次返回预置回复；耗尽后返回 Err
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|s| Ok(s.into())).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 追加一条回复
    pub fn push(&self, response: impl Into<String>) {
        self.responses.lock().push_back(Ok(response.into()));
    }

    /// 追加一次后端错误
    pub fn push_error(&self, error: impl Into<String>) {
        self.responses.lock().push_back(Err(error.into()));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let pick = |role: Role| {
            messages
                .iter()
                .filter(|m| m.role == role)
                .map(|m| m.content.clone())
                .collect::<Vec<_>>()
                .join("\n")
        };
        self.calls.lock().push(RecordedCall {
            system: pick(Role::System),
            user: pick(Role::User),
        });
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()))
    }
}
