//! 核心层：错误类型、资源准入与负载监控、请求调度、组件装配、运行时与关闭

pub mod builder;
pub mod dispatcher;
pub mod error;
pub mod monitor;
pub mod resource;
pub mod runtime;
pub mod shutdown;

pub use builder::{create_llm_from_config, AgentBuilder, AgentComponents};
pub use dispatcher::{Dispatcher, DispatcherHandle, PendingRequest, QueuedRequest};
pub use error::{AdmissionRefusal, AgentError, ErrorKind};
pub use monitor::{LoadProbe, StaticProbe, SysinfoProbe, SystemMonitor};
pub use resource::{AdmissionTicket, ResourceManager, ResourceStats, SystemLoad, Thresholds};
pub use runtime::{create_agent, HiveRuntime};
pub use shutdown::{
    BackgroundTaskCleanup, ResourceCleanup, ShutdownCleanup, ShutdownCoordinator, ShutdownManager,
    ShutdownReason,
};
