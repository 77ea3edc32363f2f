//! 意图解析：一次模型调用把用户请求拆成有序的工具任务列表
//!
//! 模型失败、超时、输出无法解析时一律降级为空计划，不向上抛错；
//! 未注册的工具在此处被过滤，后续阶段不会见到未知工具名。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::llm::{chat_with_timeout, LlmClient};
use crate::orchestrator::json::clean_response;
use crate::orchestrator::plan::plan_schema_json;
use crate::orchestrator::prompts::{render, INTENT_PARSER_PROMPT};
use crate::orchestrator::{ExecutionStrategy, Plan, Task};
use crate::tools::{ToolDescriptor, ToolRegistry};

pub struct IntentParser {
    llm: Arc<dyn LlmClient>,
    template: String,
    timeout: Duration,
}

impl IntentParser {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self {
            llm,
            template: INTENT_PARSER_PROMPT.to_string(),
            timeout,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// 工具列表：只含名称与描述
    pub fn format_tool_list(tools: &[&ToolDescriptor]) -> String {
        tools
            .iter()
            .map(|t| {
                let desc = if t.description.is_empty() {
                    "无描述"
                } else {
                    t.description.as_str()
                };
                format!("工具名称: {}\n描述: {}\n", t.name, desc)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn render_prompt(&self, registry: &ToolRegistry, query: &str) -> String {
        let tool_list = Self::format_tool_list(&registry.list());
        let schema = plan_schema_json();
        render(
            &self.template,
            &[
                ("tool_list", tool_list.as_str()),
                ("plan_schema", schema.as_str()),
                ("query", query),
            ],
        )
    }

    /// 解析用户意图；任何失败都返回空计划
    pub async fn parse(&self, query: &str, registry: &ToolRegistry) -> Plan {
        let start = Instant::now();
        let system = self.render_prompt(registry, query);
        let raw = match chat_with_timeout(self.llm.as_ref(), &system, query, self.timeout).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!("intent parsing failed: {}", e);
                return Plan::empty();
            }
        };
        tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "intent model call done");
        parse_response(&raw, registry)
    }
}

fn order_of(v: Option<&Value>) -> Option<i64> {
    match v? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|i| match i {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn given_id(obj: &Map<String, Value>) -> Option<String> {
    obj.get("id").and_then(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    })
}

fn fresh_id(start: usize, reserved: &HashSet<&str>, used: &mut HashSet<String>) -> String {
    let mut k = start;
    loop {
        let id = format!("task_{k}");
        if !reserved.contains(id.as_str()) && used.insert(id.clone()) {
            return id;
        }
        k += 1;
    }
}

/// 把模型原始输出转成计划：清洗、解析、过滤未知工具并补齐缺省字段
pub fn parse_response(raw: &str, registry: &ToolRegistry) -> Plan {
    let parsed: Value = match serde_json::from_str(&clean_response(raw)) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("intent output is not valid JSON: {}", e);
            return Plan::empty();
        }
    };

    let candidates: Vec<(&Map<String, Value>, &str)> = parsed
        .get("tasks")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(|candidate| {
            let obj = candidate.as_object()?;
            let tool_name = obj.get("tool_name").and_then(Value::as_str)?;
            if !registry.contains(tool_name) {
                tracing::warn!(tool = %tool_name, "plan references unregistered tool, dropped");
                return None;
            }
            Some((obj, tool_name))
        })
        .collect();

    // 模型给出的 id 优先保留；缺省或重复的 id 改用未被占用的 task_<n>
    let given: Vec<Option<String>> = candidates.iter().map(|(obj, _)| given_id(obj)).collect();
    let reserved: HashSet<&str> = given.iter().flatten().map(String::as_str).collect();
    let mut used: HashSet<String> = HashSet::new();

    let mut tasks: Vec<Task> = Vec::with_capacity(candidates.len());
    for (i, ((obj, tool_name), given)) in candidates.iter().zip(&given).enumerate() {
        let n = i + 1;
        let id = match given {
            Some(id) if used.insert(id.clone()) => id.clone(),
            _ => {
                if let Some(dup) = given {
                    tracing::warn!(task = %dup, "duplicate task id in plan, renamed");
                }
                fresh_id(n, &reserved, &mut used)
            }
        };
        tasks.push(Task {
            id,
            tool_name: tool_name.to_string(),
            reason: obj
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            order: order_of(obj.get("order")).unwrap_or(n as i64),
            depends_on: string_list(obj.get("depends_on")),
        });
    }

    let execution_mode = parsed
        .get("execution_mode")
        .and_then(Value::as_str)
        .unwrap_or("串行")
        .to_string();
    let execution_strategy = parsed
        .get("execution_strategy")
        .cloned()
        .and_then(|v| serde_json::from_value::<ExecutionStrategy>(v).ok())
        .unwrap_or_default();

    Plan {
        tasks,
        execution_mode,
        execution_strategy,
    }
}
