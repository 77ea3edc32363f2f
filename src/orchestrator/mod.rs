//! 工具编排：意图解析 → 参数优化 → 串行执行 → 结果格式化与汇总

pub mod context;
pub mod events;
pub mod executor;
pub mod formatter;
pub mod intent;
pub mod json;
pub mod optimizer;
pub mod plan;
pub mod prompts;
pub mod query;

/// 参数优化与工具调用的最大尝试次数
pub const MAX_ATTEMPTS: u32 = 3;

pub use context::{ContextEntry, CurrentTask, ExecutionContext, TaskContext};
pub use events::{EventSink, ProgressEvent};
pub use executor::{
    plan_executor, PlanExecutor, PlanOutcome, PlanPhase, TaskRecord, TaskResults, NO_SUITABLE_TOOL,
};
pub use formatter::{FormattedResult, ResultFormatter};
pub use intent::{parse_response, IntentParser};
pub use optimizer::{format_tool_description, OptimizeRequest, ParameterOptimizer};
pub use plan::{plan_schema_json, ExecutionMode, ExecutionStrategy, Plan, Task};
pub use query::{Attachment, AttachmentKind, HistoryTurn, UserQuery};
