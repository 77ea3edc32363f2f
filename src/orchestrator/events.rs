//! 进度事件：思考过程、阶段结果与错误，经有界通道推送给前端
//!
//! 通道满或接收端已关闭时直接丢弃，编排结果不依赖事件是否送达。

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// 单条进度事件，序列化为 `{"type": ..., "content": ...}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum ProgressEvent {
    ThinkingProcess(String),
    Result(Value),
    Error(String),
}

/// 事件发送端；None 表示调用方不关心进度
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl EventSink {
    pub fn none() -> Self {
        Self { tx: None }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, event: ProgressEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            tracing::debug!("progress event dropped: {}", e);
        }
    }

    pub fn thinking(&self, text: impl Into<String>) {
        self.emit(ProgressEvent::ThinkingProcess(text.into()));
    }

    pub fn error(&self, text: impl Into<String>) {
        self.emit(ProgressEvent::Error(text.into()));
    }
}

impl From<mpsc::Sender<ProgressEvent>> for EventSink {
    fn from(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }
}
