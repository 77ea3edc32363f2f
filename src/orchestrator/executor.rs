//! 计划执行器
//!
//! PENDING → PARSING_INTENT → EXECUTING(i) → DONE | FAILED。
//! 任务严格按 order 串行执行：构建上下文 → 参数优化 → 注入历史 → 带重试调用工具 → 格式化并记录。
//! 单个任务耗尽重试只影响它自己，后续任务照常执行。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::orchestrator::{
    EventSink, ExecutionContext, ExecutionMode, FormattedResult, IntentParser, OptimizeRequest,
    ParameterOptimizer, Plan, ProgressEvent, ResultFormatter, Task, UserQuery, MAX_ATTEMPTS,
};
use crate::tools::ToolExecutor;

pub const NO_SUITABLE_TOOL: &str = "未找到合适的工具";

/// 计划执行阶段（仅用于日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanPhase {
    Pending,
    ParsingIntent,
    Executing(usize),
    Done,
    Failed,
}

/// 单个任务的最终记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub tool_name: String,
    pub reason: String,
    pub result: String,
}

/// 任务 id → 记录，保持执行顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskResults {
    entries: Vec<(String, TaskRecord)>,
}

impl TaskResults {
    /// 追加记录；id 已存在时保留原记录并返回 false
    pub fn insert(&mut self, task_id: &str, record: TaskRecord) -> bool {
        if self.get(task_id).is_some() {
            return false;
        }
        self.entries.push((task_id.to_string(), record));
        true
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskRecord> {
        self.entries.iter().find(|(id, _)| id == task_id).map(|(_, r)| r)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskRecord)> {
        self.entries.iter().map(|(id, r)| (id.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for TaskResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, record) in &self.entries {
            map.serialize_entry(id, record)?;
        }
        map.end()
    }
}

/// 一次请求的最终结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanOutcome {
    Success { result: TaskResults, link: String },
    Error { message: String },
}

impl PlanOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        PlanOutcome::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PlanOutcome::Success { .. })
    }
}

impl From<AgentError> for PlanOutcome {
    fn from(e: AgentError) -> Self {
        PlanOutcome::error(e.to_string())
    }
}

pub struct PlanExecutor {
    intent: IntentParser,
    optimizer: ParameterOptimizer,
    tools: ToolExecutor,
    formatter: ResultFormatter,
    retry_delay: Duration,
    verbose: bool,
}

impl PlanExecutor {
    pub fn new(
        intent: IntentParser,
        optimizer: ParameterOptimizer,
        tools: ToolExecutor,
        formatter: ResultFormatter,
    ) -> Self {
        Self {
            intent,
            optimizer,
            tools,
            formatter,
            retry_delay: Duration::from_secs(1),
            verbose: false,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn tools(&self) -> &ToolExecutor {
        &self.tools
    }

    /// 执行一次请求；取消时在当前挂起点中断
    pub async fn run(
        &self,
        query: &UserQuery,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> PlanOutcome {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!("request cancelled");
                events.error("请求已取消");
                PlanOutcome::from(AgentError::Cancelled)
            }
            outcome = self.run_plan(query, events) => outcome,
        }
    }

    async fn run_plan(&self, query: &UserQuery, events: &EventSink) -> PlanOutcome {
        let mut phase = PlanPhase::Pending;
        let text = query.render();
        transition(&mut phase, PlanPhase::ParsingIntent);

        let start = Instant::now();
        let plan = self.intent.parse(&text, self.tools.registry()).await;
        if self.verbose {
            tracing::info!("意图推理用时: {:.3} 秒", start.elapsed().as_secs_f64());
            if let Ok(pretty) = serde_json::to_string_pretty(&plan) {
                events.thinking(format!("任务规划方案:\n{pretty}"));
            }
        }

        if plan.is_empty() {
            transition(&mut phase, PlanPhase::Failed);
            let err = AgentError::Planning(text.clone());
            tracing::warn!("{}", err);
            events.error(NO_SUITABLE_TOOL);
            return PlanOutcome::error(NO_SUITABLE_TOOL);
        }

        if plan.mode() != ExecutionMode::Serial {
            tracing::info!(mode = %plan.execution_mode, "plan requested non-serial mode, running serially");
        }

        let mut context = ExecutionContext::new();
        let mut results = TaskResults::default();
        let mut links: Vec<String> = Vec::new();

        for (i, task) in plan.ordered_tasks().into_iter().enumerate() {
            transition(&mut phase, PlanPhase::Executing(i));
            match self.run_task(task, &plan, &context, query, &text, events).await {
                Ok(formatted) => {
                    context.record(&task.id, &task.tool_name, &formatted.text);
                    let record = TaskRecord {
                        tool_name: task.tool_name.clone(),
                        reason: task.reason.clone(),
                        result: formatted.text,
                    };
                    let mut update = serde_json::Map::new();
                    update.insert(
                        task.id.clone(),
                        serde_json::to_value(&record).unwrap_or(Value::Null),
                    );
                    events.emit(ProgressEvent::Result(Value::Object(update)));
                    if !results.insert(&task.id, record) {
                        tracing::warn!(task = %task.id, "duplicate task id, later result discarded");
                    }
                    links.extend(formatted.links);
                }
                Err(e) => {
                    tracing::error!(task = %task.id, tool = %task.tool_name, "task failed: {}", e);
                    events.error(format!("工具 {} 执行失败: {}", task.tool_name, e));
                }
            }
        }

        transition(&mut phase, PlanPhase::Done);
        PlanOutcome::Success {
            result: results,
            link: links.join("\n"),
        }
    }

    async fn run_task(
        &self,
        task: &Task,
        plan: &Plan,
        context: &ExecutionContext,
        query: &UserQuery,
        text: &str,
        events: &EventSink,
    ) -> Result<FormattedResult, AgentError> {
        let descriptor = self
            .tools
            .describe(&task.tool_name)
            .ok_or_else(|| AgentError::tool(&task.tool_name, "tool not registered"))?;

        let view = context.view_for(task);
        let params = self
            .optimizer
            .optimize(
                OptimizeRequest {
                    tool: descriptor,
                    context: &view,
                    query: text,
                    plan,
                },
                events,
            )
            .await;

        let mut args = params;
        if !query.history.is_empty() {
            args.insert(
                "history".to_string(),
                serde_json::to_value(&query.history).unwrap_or(Value::Null),
            );
        }
        let args = Value::Object(args);

        let mut last_err = AgentError::tool(&task.tool_name, "not attempted");
        for attempt in 1..=MAX_ATTEMPTS {
            match self.invoke(&task.tool_name, args.clone()).await {
                Ok(formatted) => return Ok(formatted),
                Err(e) => {
                    tracing::warn!(
                        task = %task.id,
                        tool = %task.tool_name,
                        "attempt {}/{} failed: {}",
                        attempt,
                        MAX_ATTEMPTS,
                        e
                    );
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_err = e;
                    if attempt < MAX_ATTEMPTS {
                        events.thinking(format!(
                            "工具 {} 执行失败，正在重试... ({}/{})",
                            task.tool_name, attempt, MAX_ATTEMPTS
                        ));
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        Err(last_err)
    }

    /// 调用工具并格式化；空结果与格式化失败都算失败
    async fn invoke(&self, tool_name: &str, args: Value) -> Result<FormattedResult, AgentError> {
        let raw = self.tools.execute(tool_name, args).await?;
        if is_empty_result(&raw) {
            return Err(AgentError::tool(tool_name, "empty result"));
        }
        self.formatter
            .format(tool_name, &raw)
            .map_err(|e| AgentError::tool(tool_name, e))
    }
}

fn is_empty_result(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn transition(phase: &mut PlanPhase, next: PlanPhase) {
    tracing::debug!("plan phase {:?} -> {:?}", phase, next);
    *phase = next;
}

/// 由各组件拼装执行器的便捷函数
pub fn plan_executor(
    llm: Arc<dyn crate::llm::LlmClient>,
    tools: ToolExecutor,
    llm_timeout: Duration,
) -> PlanExecutor {
    PlanExecutor::new(
        IntentParser::new(llm.clone(), llm_timeout),
        ParameterOptimizer::new(llm, llm_timeout, Duration::from_millis(100)),
        tools,
        ResultFormatter::default(),
    )
}
