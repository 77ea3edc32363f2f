//! 请求队列与调度器
//!
//! 单个后台消费者从 FIFO 队列取请求，经 ResourceManager 准入后派生任务执行计划；
//! 信号量满时在此等待（背压），过载被拒时把请求放回队尾并退避一段时间。
//! 每个请求带一个子 CancellationToken，取消时在当前挂起点中断。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{AdmissionRefusal, AgentError, ResourceManager};
use crate::orchestrator::{EventSink, PlanExecutor, PlanOutcome, UserQuery};

/// 队列中的请求
pub struct QueuedRequest {
    pub id: String,
    pub query: UserQuery,
    pub events: EventSink,
    pub cancel: CancellationToken,
    /// 因过载被放回队尾的次数
    pub requeues: u32,
    reply: oneshot::Sender<PlanOutcome>,
}

/// 已入队请求的句柄：可等待结果或取消
pub struct PendingRequest {
    pub id: String,
    cancel: CancellationToken,
    reply: oneshot::Receiver<PlanOutcome>,
}

impl PendingRequest {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 等待结果；调度器关闭导致请求被丢弃时返回错误结果
    pub async fn outcome(self) -> PlanOutcome {
        self.reply
            .await
            .unwrap_or_else(|_| AgentError::Admission(AdmissionRefusal::Closed).into())
    }
}

/// 提交端，可克隆后分发给各接入层
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<QueuedRequest>,
    root: CancellationToken,
    resources: ResourceManager,
}

impl DispatcherHandle {
    /// 入队，不等待结果
    pub fn enqueue(&self, query: UserQuery, events: EventSink) -> Result<PendingRequest, AgentError> {
        let id = uuid::Uuid::new_v4().to_string();
        let cancel = self.root.child_token();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueuedRequest {
                id: id.clone(),
                query,
                events,
                cancel: cancel.clone(),
                requeues: 0,
                reply: reply_tx,
            })
            .map_err(|_| AgentError::Admission(AdmissionRefusal::Closed))?;
        tracing::debug!(request = %id, "request queued");
        Ok(PendingRequest {
            id,
            cancel,
            reply: reply_rx,
        })
    }

    /// 入队并等待最终结果
    pub async fn submit(&self, query: UserQuery, events: EventSink) -> PlanOutcome {
        match self.enqueue(query, events) {
            Ok(pending) => pending.outcome().await,
            Err(e) => e.into(),
        }
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }
}

pub struct Dispatcher {
    executor: Arc<PlanExecutor>,
    resources: ResourceManager,
    backoff: Duration,
    requeue_tx: mpsc::WeakUnboundedSender<QueuedRequest>,
    rx: mpsc::UnboundedReceiver<QueuedRequest>,
}

impl Dispatcher {
    /// 创建调度器与提交句柄；root 是所有请求取消令牌的父令牌
    pub fn new(
        executor: Arc<PlanExecutor>,
        resources: ResourceManager,
        backoff: Duration,
        root: CancellationToken,
    ) -> (Self, DispatcherHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            executor,
            resources: resources.clone(),
            backoff,
            requeue_tx: tx.downgrade(),
            rx,
        };
        let handle = DispatcherHandle {
            tx,
            root,
            resources,
        };
        (dispatcher, handle)
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// 主循环：直到 cancel 触发或所有提交端都已释放
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("dispatcher started");
        loop {
            let req = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(req) => req,
                    None => break,
                },
            };

            if req.reply.is_closed() {
                tracing::debug!(request = %req.id, "caller gone before admission");
                continue;
            }
            if req.cancel.is_cancelled() {
                tracing::debug!(request = %req.id, "request cancelled before admission");
                let _ = req.reply.send(AgentError::Cancelled.into());
                continue;
            }

            let admitted = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = req.cancel.cancelled() => {
                    let _ = req.reply.send(AgentError::Cancelled.into());
                    continue;
                }
                r = self.resources.acquire(&req.id) => r,
            };

            match admitted {
                Ok(ticket) => {
                    let executor = self.executor.clone();
                    tokio::spawn(async move {
                        let _ticket = ticket;
                        tracing::info!(request = %req.id, "request admitted");
                        let outcome = executor.run(&req.query, &req.events, &req.cancel).await;
                        if req.reply.send(outcome).is_err() {
                            tracing::debug!(request = %req.id, "caller dropped before completion");
                        }
                    });
                }
                Err(AgentError::Admission(AdmissionRefusal::Overloaded(detail))) => {
                    let mut req = req;
                    req.requeues += 1;
                    tracing::warn!(
                        request = %req.id,
                        requeues = req.requeues,
                        "admission refused ({}), requeued",
                        detail
                    );
                    req.events.thinking("系统负载过高，请求已重新排队...");
                    self.requeue(req);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.backoff) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(request = %req.id, "admission failed: {}", e);
                    let _ = req.reply.send(e.into());
                }
            }
        }
        tracing::info!("dispatcher stopped");
    }

    fn requeue(&self, req: QueuedRequest) {
        match self.requeue_tx.upgrade() {
            Some(tx) => {
                if let Err(mpsc::error::SendError(req)) = tx.send(req) {
                    let _ = req.reply.send(AgentError::Admission(AdmissionRefusal::Closed).into());
                }
            }
            None => {
                let _ = req.reply.send(AgentError::Admission(AdmissionRefusal::Closed).into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SystemLoad, Thresholds};
    use crate::llm::MockLlmClient;
    use crate::orchestrator::plan_executor;
    use crate::tools::{EchoTool, ToolExecutor, ToolRegistry};

    fn setup(max: usize) -> (Dispatcher, DispatcherHandle, ResourceManager) {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        let tools = ToolExecutor::new(Arc::new(reg), Duration::from_secs(5));
        let executor = Arc::new(plan_executor(
            Arc::new(MockLlmClient),
            tools,
            Duration::from_secs(5),
        ));
        let rm = ResourceManager::new(max, Thresholds::default());
        let (d, h) = Dispatcher::new(
            executor,
            rm.clone(),
            Duration::from_millis(50),
            CancellationToken::new(),
        );
        (d, h, rm)
    }

    #[tokio::test]
    async fn test_submit_runs_plan_with_mock() {
        let (d, h, rm) = setup(2);
        let cancel = CancellationToken::new();
        let join = d.spawn(cancel.clone());
        let out = h.submit(UserQuery::new("hello"), EventSink::none()).await;
        assert!(out.is_success(), "{out:?}");
        assert_eq!(rm.stats().active, 0);
        cancel.cancel();
        join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_overloaded_request_is_requeued_until_load_drops() {
        let (d, h, rm) = setup(2);
        rm.update_load(SystemLoad::new(99.0, 10.0, 10.0));
        let cancel = CancellationToken::new();
        let join = d.spawn(cancel.clone());

        let pending = h.enqueue(UserQuery::new("hello"), EventSink::none()).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rm.stats().active, 0);

        rm.update_load(SystemLoad::new(10.0, 10.0, 10.0));
        let out = pending.outcome().await;
        assert!(out.is_success());
        cancel.cancel();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_before_admission() {
        let (d, h, rm) = setup(1);
        let _held = rm.acquire("blocker").await.unwrap();
        let cancel = CancellationToken::new();
        let join = d.spawn(cancel.clone());

        let pending = h.enqueue(UserQuery::new("hello"), EventSink::none()).unwrap();
        pending.cancel();
        let out = pending.outcome().await;
        assert!(!out.is_success());
        cancel.cancel();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_fails_pending_requests() {
        let (d, h, _rm) = setup(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        d.spawn(cancel).await.unwrap();
        let out = h.submit(UserQuery::new("hello"), EventSink::none()).await;
        assert_eq!(
            out,
            PlanOutcome::from(AgentError::Admission(AdmissionRefusal::Closed))
        );
    }
}
