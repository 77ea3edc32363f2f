//! Hive - 工具编排智能体
//!
//! 一条自然语言查询经 LLM 规划为有序工具任务，逐个补全参数、执行并汇总结果；
//! 并发请求经资源准入控制（信号量 + 系统负载阈值）后再执行。
//!
//! 模块划分：
//! - **agent**: 无界面入口（单次查询 / 带进度事件的查询）
//! - **config**: 应用配置加载（TOML + 环境变量）与提示词模板
//! - **core**: 错误类型、资源准入、负载监控、请求调度、装配与优雅关闭
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Ollama / Mock）
//! - **observability**: tracing 日志初始化
//! - **orchestrator**: 意图解析、参数优化、计划执行、结果格式化
//! - **tools**: 工具 trait、参数 schema、注册表、执行器与内置工具（天气 / 聊天 / 搜索 / Echo）

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod orchestrator;
pub mod tools;

pub use crate::core::{create_agent, AgentBuilder, AgentError, HiveRuntime};
pub use crate::orchestrator::{PlanOutcome, ProgressEvent, UserQuery};
