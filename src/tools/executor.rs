//! 工具执行器
//!
//! 持有共享的 ToolRegistry 与单次调用超时，execute(tool_name, args) 在超时内调用工具，
//! 未注册 / 失败 / 超时 / panic 统一转为 AgentError；每次调用输出结构化审计日志（JSON）。
//! 工具在独立任务中运行，panic 不会波及调用方。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::task::AbortHandle;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{ToolDescriptor, ToolRegistry};

/// 工具执行器：对每次调用施加超时，并将结果映射为 AgentError
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn describe(&self, name: &str) -> Option<&ToolDescriptor> {
        self.registry.get(name)
    }

    /// 执行指定工具；超时返回 Timeout，工具返回 Err 转为 Tool 错误；输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<Value, AgentError> {
        let Some(tool) = self.registry.tool(tool_name) else {
            tracing::warn!(tool = %tool_name, "tool not registered");
            return Err(AgentError::tool(tool_name, "tool not registered"));
        };

        let start = Instant::now();
        let preview = args_preview(&args);
        let mut handle = tokio::spawn(async move { tool.execute(args).await });
        let _guard = AbortOnDrop(handle.abort_handle());

        let (outcome, result) = match timeout(self.timeout, &mut handle).await {
            Ok(Ok(Ok(value))) => ("ok", Ok(value)),
            Ok(Ok(Err(e))) => ("error", Err(AgentError::tool(tool_name, e))),
            Ok(Err(join)) if join.is_panic() => {
                ("panic", Err(AgentError::tool(tool_name, "tool panicked")))
            }
            Ok(Err(join)) => ("error", Err(AgentError::tool(tool_name, join.to_string()))),
            Err(_) => (
                "timeout",
                Err(AgentError::Timeout(format!(
                    "tool {tool_name} exceeded {}s",
                    self.timeout.as_secs_f32()
                ))),
            ),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit, "tool");
        result
    }
}

/// 调用方放弃（超时 / 请求取消）时终止仍在运行的工具任务
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use crate::tools::{EchoTool, ParameterSchema, Tool};
    use async_trait::async_trait;
    use serde_json::json;

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn describe(&self) -> ToolDescriptor {
            ToolDescriptor::new("Slow", "sleeps", ParameterSchema::new())
        }

        async fn execute(&self, _args: Value) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Value::Null)
        }
    }

    struct Panicky;

    #[async_trait]
    impl Tool for Panicky {
        fn describe(&self) -> ToolDescriptor {
            ToolDescriptor::new("Panicky", "panics", ParameterSchema::new())
        }

        async fn execute(&self, _args: Value) -> Result<Value, String> {
            panic!("boom");
        }
    }

    fn executor() -> ToolExecutor {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        reg.register(Slow);
        reg.register(Panicky);
        ToolExecutor::new(Arc::new(reg), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_execute_ok() {
        let out = executor().execute("EchoTool", json!({"text": "hi"})).await.unwrap();
        assert_eq!(out, json!("hi"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_tool_error() {
        let err = executor().execute("FooTool", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Tool);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let err = executor().execute("Slow", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_panic_becomes_tool_error() {
        let exec = executor();
        let err = exec.execute("Panicky", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Tool);
        assert!(err.to_string().contains("panicked"));
        // 执行器在 panic 之后仍可继续使用
        assert_eq!(exec.execute("EchoTool", json!({"text": "ok"})).await.unwrap(), json!("ok"));
    }

    #[test]
    fn test_args_preview_truncates_on_char_boundary() {
        let long = json!({"text": "天".repeat(300)});
        let p = args_preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), 203);
    }
}
