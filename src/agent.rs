//! 无界面 Agent 入口
//!
//! 供 CLI 或其它接入层调用：process_message 提交一条查询并等待最终结果，
//! process_message_stream 同时把进度事件转发给调用方提供的通道。

use tokio::sync::mpsc;

use crate::core::DispatcherHandle;
use crate::orchestrator::{EventSink, PlanOutcome, ProgressEvent, UserQuery};

/// 提交一条查询并等待结果
pub async fn process_message(handle: &DispatcherHandle, query: impl Into<UserQuery>) -> PlanOutcome {
    handle.submit(query.into(), EventSink::none()).await
}

/// 提交一条查询；思考过程、单任务结果与错误依次推送到 event_tx
///
/// 事件通道满或接收端关闭时丢弃事件，不影响请求本身。
pub async fn process_message_stream(
    handle: &DispatcherHandle,
    query: impl Into<UserQuery>,
    event_tx: mpsc::Sender<ProgressEvent>,
) -> PlanOutcome {
    handle.submit(query.into(), EventSink::from(event_tx)).await
}
