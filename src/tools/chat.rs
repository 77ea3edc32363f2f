//! 聊天工具：问候、闲聊、问答，直接交给 LLM 回复

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::LlmClient;
use crate::tools::{ParamSpec, ParameterSchema, Tool, ToolDescriptor};

const CHAT_SYSTEM_PROMPT: &str = "你是一个友好的智能助手，负责回复问候、进行日常对话与回答问题。\n\
请结合对话上下文与历史记录，用简洁自然的中文回答。\n\n\
对话上下文：{context}\n历史记录：{history}";

/// 聊天工具：参数 message（必需）、context（历史对话数组）
pub struct ChatTool {
    llm: Arc<dyn LlmClient>,
}

impl ChatTool {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

fn render_turns(v: Option<&Value>) -> String {
    match v.and_then(Value::as_array) {
        Some(turns) if !turns.is_empty() => turns
            .iter()
            .map(|t| {
                format!(
                    "用户: {}\n助手: {}",
                    t.get("query").and_then(Value::as_str).unwrap_or(""),
                    t.get("response").and_then(Value::as_str).unwrap_or("")
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => "无历史记录".to_string(),
    }
}

#[async_trait]
impl Tool for ChatTool {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "ChatTool",
            "处理用户聊天的工具，包括问候、闲聊、问答",
            ParameterSchema::new()
                .param("message", ParamSpec::string("用户的聊天内容").required())
                .param(
                    "context",
                    ParamSpec::array("对话上下文，包含历史消息（{query, response} 列表）")
                        .default_value(Value::Array(Vec::new())),
                ),
        )
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();
        if message.is_empty() {
            return Ok(Value::String("请输入您想说的话".to_string()));
        }
        let system = CHAT_SYSTEM_PROMPT
            .replace("{context}", &render_turns(args.get("context")))
            .replace("{history}", &render_turns(args.get("history")));
        let reply = self
            .llm
            .chat(&system, message)
            .await
            .map_err(|e| format!("对话失败: {e}"))?;
        Ok(Value::String(reply))
    }
}
