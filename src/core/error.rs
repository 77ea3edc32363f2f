//! Agent 错误类型
//!
//! 规划、参数、工具、准入、超时五类失败统一为 AgentError；编排层按 ErrorKind 决定是重试、降级还是跳过。

use thiserror::Error;

/// 错误大类（决定编排层的处理策略）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 意图解析得到空计划
    Planning,
    /// 参数优化耗尽重试
    Parameter,
    /// 工具抛错 / 空结果 / 格式化失败
    Tool,
    /// 系统过载或并发已满
    Admission,
    /// 模型或工具调用超时
    Timeout,
    /// 模型后端错误
    Llm,
    Cancelled,
    Config,
}

/// 准入被拒的原因
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionRefusal {
    /// 负载超过阈值（附带超限项，如 "cpu 92.3% > 80%"）
    Overloaded(String),
    /// 并发槽位已满（仅非阻塞获取时出现）
    Saturated,
    /// 调度器已关闭
    Closed,
}

impl std::fmt::Display for AdmissionRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdmissionRefusal::Overloaded(detail) => write!(f, "system overloaded ({detail})"),
            AdmissionRefusal::Saturated => write!(f, "concurrency limit reached, try again later"),
            AdmissionRefusal::Closed => write!(f, "dispatcher closed"),
        }
    }
}

/// 编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("No suitable tool found: {0}")]
    Planning(String),

    #[error("Parameter optimization failed for {tool}: {reason}")]
    Parameter { tool: String, reason: String },

    #[error("Tool {tool} failed: {reason}")]
    Tool { tool: String, reason: String },

    #[error("Admission refused: {0}")]
    Admission(AdmissionRefusal),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    pub fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Planning(_) => ErrorKind::Planning,
            AgentError::Parameter { .. } => ErrorKind::Parameter,
            AgentError::Tool { .. } => ErrorKind::Tool,
            AgentError::Admission(_) => ErrorKind::Admission,
            AgentError::Timeout(_) => ErrorKind::Timeout,
            AgentError::Llm(_) => ErrorKind::Llm,
            AgentError::Cancelled => ErrorKind::Cancelled,
            AgentError::Config(_) => ErrorKind::Config,
        }
    }

    /// 是否计入单任务的重试预算
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Tool | ErrorKind::Timeout | ErrorKind::Llm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(AgentError::Planning("x".into()).kind(), ErrorKind::Planning);
        assert_eq!(AgentError::tool("WeatherTool", "boom").kind(), ErrorKind::Tool);
        assert_eq!(
            AgentError::Admission(AdmissionRefusal::Saturated).kind(),
            ErrorKind::Admission
        );
        assert_eq!(AgentError::Timeout("llm".into()).kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_retryable() {
        assert!(AgentError::tool("a", "b").is_retryable());
        assert!(AgentError::Timeout("a".into()).is_retryable());
        assert!(!AgentError::Cancelled.is_retryable());
        assert!(!AgentError::Admission(AdmissionRefusal::Closed).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = AgentError::Admission(AdmissionRefusal::Overloaded("cpu 95.0% > 80.0%".into()));
        assert!(err.to_string().contains("cpu 95.0%"));
    }
}
