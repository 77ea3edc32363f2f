//! DeepSeek / Ollama 客户端（均为 OpenAI 兼容格式）
//!
//! - DeepSeek: https://api.deepseek.com，模型 deepseek-chat / deepseek-reasoner
//! - Ollama: 本地 http://localhost:11434/v1，模型如 qwen2.5（无需真实 Key）

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// 创建 DeepSeek 客户端
///
/// - 优先使用环境变量 `DEEPSEEK_API_KEY`
/// - 模型可通过 `model` 参数或 `DEEPSEEK_MODEL` 环境变量指定
pub fn create_deepseek_client(model: Option<&str>) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_else(|| "sk-placeholder".to_string());

    let model = model
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());

    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), &model, Some(api_key.as_str()))
}

/// 创建 Ollama 客户端（OpenAI 兼容端点，Key 固定为 EMPTY）
pub fn create_ollama_client(base_url: Option<&str>, model: &str) -> OpenAiClient {
    OpenAiClient::new(Some(base_url.unwrap_or(OLLAMA_BASE_URL)), model, Some("EMPTY"))
}
