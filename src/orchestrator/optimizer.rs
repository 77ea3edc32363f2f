//! 参数优化：按工具 schema、执行上下文与意图结果让模型生成参数，并做校验
//!
//! 每次尝试一次模型调用；解析、校验、模型错误或超时都计入重试，共 3 次，
//! 耗尽后返回空参数对象。优化器本身无状态。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::llm::{chat_with_timeout, LlmClient};
use crate::orchestrator::json::parse_lenient;
use crate::orchestrator::prompts::{render, PARAMETER_OPTIMIZER_PROMPT};
use crate::orchestrator::{EventSink, Plan, TaskContext, MAX_ATTEMPTS};
use crate::tools::{display_value, EnumOption, ToolDescriptor};

/// 一次参数优化的输入
pub struct OptimizeRequest<'a> {
    pub tool: &'a ToolDescriptor,
    pub context: &'a TaskContext,
    pub query: &'a str,
    pub plan: &'a Plan,
}

pub struct ParameterOptimizer {
    llm: Arc<dyn LlmClient>,
    template: String,
    timeout: Duration,
    retry_delay: Duration,
    verbose: bool,
}

impl ParameterOptimizer {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration, retry_delay: Duration) -> Self {
        Self {
            llm,
            template: PARAMETER_OPTIMIZER_PROMPT.to_string(),
            timeout,
            retry_delay,
            verbose: false,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn render_prompt(&self, req: &OptimizeRequest<'_>) -> String {
        let description = format_tool_description(req.tool);
        let context = serde_json::json!({
            "history": req.context.history,
            "current_task": req.context.current_task,
        })
        .to_string();
        let intent = serde_json::to_string(req.plan).unwrap_or_default();
        render(
            &self.template,
            &[
                ("tool_name", req.tool.name.as_str()),
                ("tool_description", description.as_str()),
                ("context", context.as_str()),
                ("intent_result", intent.as_str()),
                ("query", req.query),
            ],
        )
    }

    /// 单次尝试：调用模型、解析、取出工具名下的参数并校验
    async fn attempt(
        &self,
        system: &str,
        req: &OptimizeRequest<'_>,
        events: &EventSink,
    ) -> Result<Map<String, Value>, AgentError> {
        let start = Instant::now();
        let raw = chat_with_timeout(self.llm.as_ref(), system, req.query, self.timeout).await?;
        let parsed = parse_lenient(&raw).map_err(|e| AgentError::Parameter {
            tool: req.tool.name.clone(),
            reason: format!("invalid JSON: {e}"),
        })?;

        if self.verbose {
            tracing::info!(
                tool = %req.tool.name,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "parameter optimization done"
            );
            if let Some(explanation) = parsed.get("explanation") {
                events.thinking(format!("[Debug] 参数优化说明: {}", display_value(explanation)));
            }
        }

        let params = parsed
            .get(&req.tool.name)
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| AgentError::Parameter {
                tool: req.tool.name.clone(),
                reason: "no parameter object under tool name".to_string(),
            })?;
        req.tool
            .parameters
            .validate(&Value::Object(params.clone()))
            .map_err(|e| AgentError::Parameter {
                tool: req.tool.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(params)
    }

    /// 生成并校验参数；3 次都失败时返回空对象
    pub async fn optimize(&self, req: OptimizeRequest<'_>, events: &EventSink) -> Map<String, Value> {
        let system = self.render_prompt(&req);
        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(&system, &req, events).await {
                Ok(params) => {
                    tracing::debug!(tool = %req.tool.name, attempt, "parameters accepted");
                    return params;
                }
                Err(e) => {
                    tracing::warn!(
                        tool = %req.tool.name,
                        "parameter optimization failed ({}/{}): {}",
                        attempt,
                        MAX_ATTEMPTS,
                        e
                    );
                    events.thinking(format!(
                        "参数优化失败，正在重试... ({attempt}/{MAX_ATTEMPTS})"
                    ));
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        tracing::warn!(tool = %req.tool.name, "parameter optimization exhausted, using empty parameters");
        events.thinking("达到最大重试次数，返回空参数...");
        Map::new()
    }
}

fn format_enum(options: &[EnumOption]) -> String {
    let items: Vec<String> = options
        .iter()
        .map(|o| match o {
            EnumOption::Named {
                name,
                description: Some(d),
            } => format!("{}({})", display_value(name), d),
            other => display_value(other.value()),
        })
        .collect();
    format!("[{}]", items.join(", "))
}

/// 把参数 schema 整理成人可读的约束说明
pub fn format_tool_description(tool: &ToolDescriptor) -> String {
    let desc = if tool.description.is_empty() {
        "无描述"
    } else {
        tool.description.as_str()
    };
    let mut sections = vec![format!("【工具描述】\n{desc}\n"), "【参数要求】".to_string()];
    if tool.parameters.is_empty() {
        sections.push("无参数要求".to_string());
    }
    for (name, spec) in tool.parameters.iter() {
        let mut header = format!("\n■ {name}");
        if spec.required {
            header.push_str(" (必需)");
        }
        let mut details = vec![format!("类型: {}", spec.kind)];
        if let Some(options) = &spec.enum_values {
            details.push(format!("有效值: {}", format_enum(options)));
        }
        if !spec.description.is_empty() {
            details.push(format!("说明: {}", spec.description));
        }
        if spec.minimum.is_some() || spec.maximum.is_some() {
            let mut bounds = Vec::new();
            if let Some(min) = spec.minimum {
                bounds.push(format!("最小值: {min}"));
            }
            if let Some(max) = spec.maximum {
                bounds.push(format!("最大值: {max}"));
            }
            details.push(format!("取值范围: {}", bounds.join(", ")));
        }
        if let Some(default) = &spec.default {
            details.push(format!("默认值: {}", display_value(default)));
        }
        sections.push(header);
        sections.push(format!("  {}", details.join("\n  ")));
    }
    sections.join("\n")
}
