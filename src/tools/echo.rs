//! Echo 工具（测试与离线演示用）

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{ParamSpec, ParameterSchema, Tool, ToolDescriptor};

/// Echo 工具：原样返回 text 参数
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "EchoTool",
            "回显文本（测试用），原样返回输入内容",
            ParameterSchema::new().param("text", ParamSpec::string("需要回显的文本").required()),
        )
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        args.get("text")
            .and_then(Value::as_str)
            .map(|t| Value::String(t.to_string()))
            .ok_or_else(|| "missing text".to_string())
    }
}
