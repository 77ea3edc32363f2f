//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Ollama / Mock）实现 LlmClient；编排层只用单轮 chat(system, user)。

use std::time::Duration;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::Message;

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 单轮对话：system 提示词 + 一条用户消息
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, String> {
        self.complete(&[Message::system(system_prompt), Message::user(user_prompt)])
            .await
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 带超时的单轮调用；超时转为 AgentError::Timeout，后端错误转为 AgentError::Llm
pub async fn chat_with_timeout(
    llm: &dyn LlmClient,
    system_prompt: &str,
    user_prompt: &str,
    timeout: Duration,
) -> Result<String, AgentError> {
    match tokio::time::timeout(timeout, llm.chat(system_prompt, user_prompt)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(AgentError::Llm(e)),
        Err(_) => Err(AgentError::Timeout(format!(
            "llm call exceeded {}s",
            timeout.as_secs_f32()
        ))),
    }
}
