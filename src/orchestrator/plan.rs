//! 执行计划：Task / Plan 与模型输出格式的 JSON Schema
//!
//! execution_mode 与 execution_strategy 只作为诊断信息保留，执行永远串行。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 计划中的单个工具任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    /// 计划内唯一 id，如 task_1
    pub id: String,
    /// 已注册的工具名
    pub tool_name: String,
    /// 选择该工具的原因
    #[serde(default)]
    pub reason: String,
    /// 执行顺序（小者先执行，相同时按原列表位置）
    pub order: i64,
    /// 依赖的任务 id（仅供参考，不参与调度）
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// 模型声明的执行模式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    Serial,
    Parallel,
    Other(String),
}

impl ExecutionMode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "serial" | "串行" | "" => ExecutionMode::Serial,
            "parallel" | "并行" => ExecutionMode::Parallel,
            other => ExecutionMode::Other(other.to_string()),
        }
    }
}

/// 执行策略（诊断信息）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionStrategy {
    #[serde(default)]
    pub parallel_groups: Vec<Value>,
    #[serde(default)]
    pub reason: String,
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        Self {
            parallel_groups: Vec::new(),
            reason: "默认串行执行".to_string(),
        }
    }
}

/// 意图解析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    pub tasks: Vec<Task>,
    #[serde(default = "default_mode")]
    pub execution_mode: String,
    #[serde(default)]
    pub execution_strategy: ExecutionStrategy,
}

fn default_mode() -> String {
    "串行".to_string()
}

impl Default for Plan {
    fn default() -> Self {
        Self::empty()
    }
}

impl Plan {
    pub fn empty() -> Self {
        Self {
            tasks: Vec::new(),
            execution_mode: default_mode(),
            execution_strategy: ExecutionStrategy::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn mode(&self) -> ExecutionMode {
        ExecutionMode::parse(&self.execution_mode)
    }

    /// 按 order 稳定排序后的任务
    pub fn ordered_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.iter().collect();
        tasks.sort_by_key(|t| t.order);
        tasks
    }
}

/// 计划格式的 JSON Schema，拼入规划提示词
pub fn plan_schema_json() -> String {
    let schema = schema_for!(Plan);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
