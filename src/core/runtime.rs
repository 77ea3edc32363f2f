//! Agent 运行时：启动监控与调度器，提供请求入口并负责关闭

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::load_config;
use crate::core::builder::{AgentBuilder, AgentComponents};
use crate::core::{
    AgentError, BackgroundTaskCleanup, Dispatcher, DispatcherHandle, PendingRequest,
    ResourceCleanup, ResourceStats, ShutdownCoordinator, ShutdownManager, ShutdownReason,
    SystemMonitor,
};
use crate::orchestrator::{EventSink, PlanOutcome, ProgressEvent, UserQuery};
use crate::tools::ToolRegistry;

pub struct HiveRuntime {
    handle: DispatcherHandle,
    registry: Arc<ToolRegistry>,
    coordinator: ShutdownCoordinator,
    event_buffer: usize,
}

impl HiveRuntime {
    /// 启动后台监控与调度器；二者都挂在 shutdown 的根令牌下
    pub fn start(components: AgentComponents, shutdown: Arc<ShutdownManager>) -> Self {
        let root = shutdown.token();
        let cfg = &components.config;

        let monitor = SystemMonitor::new(
            components.probe.clone(),
            components.resources.clone(),
            cfg.resource.monitor_interval(),
        )
        .spawn(root.clone());

        let (dispatcher, handle) = Dispatcher::new(
            components.executor.clone(),
            components.resources.clone(),
            cfg.resource.requeue_backoff(),
            root.clone(),
        );
        let dispatcher = dispatcher.spawn(root);

        let mut coordinator = ShutdownCoordinator::new(shutdown);
        coordinator.register(BackgroundTaskCleanup::new("Dispatcher", dispatcher));
        coordinator.register(BackgroundTaskCleanup::new("SystemMonitor", monitor));
        coordinator.register(ResourceCleanup::new(components.resources.clone()));

        tracing::info!(
            max_concurrent = cfg.resource.max_concurrent,
            tools = components.registry.len(),
            "runtime started"
        );

        Self {
            handle,
            registry: components.registry,
            coordinator,
            event_buffer: cfg.orchestrator.event_buffer,
        }
    }

    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> ResourceStats {
        self.handle.resources().stats()
    }

    pub async fn process(&self, query: impl Into<UserQuery>) -> PlanOutcome {
        self.handle.submit(query.into(), EventSink::none()).await
    }

    /// 入队并返回进度事件接收端与请求句柄
    pub fn process_stream(
        &self,
        query: impl Into<UserQuery>,
    ) -> Result<(mpsc::Receiver<ProgressEvent>, PendingRequest), AgentError> {
        let (sink, rx) = EventSink::channel(self.event_buffer);
        let pending = self.handle.enqueue(query.into(), sink)?;
        Ok((rx, pending))
    }

    pub fn is_shutdown(&self) -> bool {
        self.coordinator.manager().is_shutdown()
    }

    /// 取消所有请求、停止后台任务并关闭准入
    pub async fn shutdown(self, reason: ShutdownReason) {
        self.coordinator.shutdown(reason).await;
        tracing::info!("runtime stopped");
    }
}

/// 从配置创建并启动运行时；配置文件存在但无法解析时返回 Config 错误
pub async fn create_agent(
    config_path: Option<PathBuf>,
    shutdown: Arc<ShutdownManager>,
) -> anyhow::Result<HiveRuntime> {
    let config = load_config(config_path).map_err(|e| AgentError::Config(e.to_string()))?;
    let components = AgentBuilder::new(config).build_components();
    Ok(HiveRuntime::start(components, shutdown))
}
