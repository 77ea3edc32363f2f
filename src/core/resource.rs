//! 资源管理：并发上限 + 系统负载准入
//!
//! 信号量限制同时执行的请求数；监控任务定期写入负载快照，任一项超过阈值即视为过载。
//! 过载时 acquire 立即拒绝（不等待信号量）；准入票据在 Drop 时归还槽位并移出活跃集合。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::config::ResourceSection;
use crate::core::{AdmissionRefusal, AgentError};

/// 系统负载快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemLoad {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub disk_percent: f32,
    pub thread_count: usize,
    pub process_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl SystemLoad {
    pub fn new(cpu_percent: f32, memory_percent: f32, disk_percent: f32) -> Self {
        Self {
            cpu_percent,
            memory_percent,
            disk_percent,
            thread_count: 0,
            process_count: 0,
            timestamp: Utc::now(),
        }
    }
}

/// 过载阈值（百分比）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub cpu: f32,
    pub memory: f32,
    pub disk: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: 80.0,
            memory: 85.0,
            disk: 90.0,
        }
    }
}

impl From<&ResourceSection> for Thresholds {
    fn from(cfg: &ResourceSection) -> Self {
        Self {
            cpu: cfg.cpu_threshold,
            memory: cfg.memory_threshold,
            disk: cfg.disk_threshold,
        }
    }
}

impl Thresholds {
    /// 超限项说明；未超限返回 None
    pub fn exceeded(&self, load: &SystemLoad) -> Option<String> {
        let over: Vec<String> = [
            ("cpu", load.cpu_percent, self.cpu),
            ("memory", load.memory_percent, self.memory),
            ("disk", load.disk_percent, self.disk),
        ]
        .into_iter()
        .filter(|(_, value, limit)| value > limit)
        .map(|(name, value, limit)| format!("{name} {value:.1}% > {limit:.1}%"))
        .collect();
        if over.is_empty() {
            None
        } else {
            Some(over.join(", "))
        }
    }
}

#[derive(Debug, Default)]
struct SharedState {
    /// ticket id → request id
    active: HashMap<u64, String>,
    load: Option<SystemLoad>,
    overloaded: Option<String>,
}

/// 资源使用统计
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStats {
    pub max_concurrent: usize,
    pub available: usize,
    pub active: usize,
    pub overloaded: bool,
    pub load: Option<SystemLoad>,
}

/// 资源管理器（可廉价克隆，内部共享）
#[derive(Clone)]
pub struct ResourceManager {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    thresholds: Thresholds,
    state: Arc<Mutex<SharedState>>,
    next_ticket: Arc<AtomicU64>,
}

impl ResourceManager {
    pub fn new(max_concurrent: usize, thresholds: Thresholds) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            thresholds,
            state: Arc::new(Mutex::new(SharedState::default())),
            next_ticket: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn from_config(cfg: &ResourceSection) -> Self {
        Self::new(cfg.max_concurrent, Thresholds::from(cfg))
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// 当前是否过载（返回超限说明）
    pub fn is_overloaded(&self) -> Option<String> {
        self.state.lock().overloaded.clone()
    }

    /// 写入新的负载快照，旧快照丢弃
    pub fn update_load(&self, load: SystemLoad) {
        let verdict = self.thresholds.exceeded(&load);
        let mut state = self.state.lock();
        match (&state.overloaded, &verdict) {
            (None, Some(detail)) => tracing::warn!("system overloaded: {}", detail),
            (Some(_), None) => tracing::info!("system load back to normal"),
            _ => {}
        }
        tracing::debug!(
            cpu = load.cpu_percent,
            memory = load.memory_percent,
            disk = load.disk_percent,
            threads = load.thread_count,
            processes = load.process_count,
            "load snapshot"
        );
        state.overloaded = verdict;
        state.load = Some(load);
    }

    fn check_load(&self) -> Result<(), AgentError> {
        match self.is_overloaded() {
            Some(detail) => Err(AgentError::Admission(AdmissionRefusal::Overloaded(detail))),
            None => Ok(()),
        }
    }

    fn issue(&self, permit: OwnedSemaphorePermit, request_id: &str) -> AdmissionTicket {
        let id = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.state.lock().active.insert(id, request_id.to_string());
        tracing::debug!(request = %request_id, "admitted");
        AdmissionTicket {
            id,
            request_id: request_id.to_string(),
            state: self.state.clone(),
            _permit: permit,
        }
    }

    /// 获取准入：过载时立即拒绝，否则等待空闲槽位
    pub async fn acquire(&self, request_id: &str) -> Result<AdmissionTicket, AgentError> {
        self.check_load()?;
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AgentError::Admission(AdmissionRefusal::Closed))?;
        Ok(self.issue(permit, request_id))
    }

    /// 非阻塞获取：无空闲槽位时返回 Saturated
    pub fn try_acquire(&self, request_id: &str) -> Result<AdmissionTicket, AgentError> {
        self.check_load()?;
        let permit = self.semaphore.clone().try_acquire_owned().map_err(|e| match e {
            TryAcquireError::NoPermits => AgentError::Admission(AdmissionRefusal::Saturated),
            TryAcquireError::Closed => AgentError::Admission(AdmissionRefusal::Closed),
        })?;
        Ok(self.issue(permit, request_id))
    }

    /// 关闭：之后的 acquire 返回 Closed
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn active_requests(&self) -> Vec<String> {
        self.state.lock().active.values().cloned().collect()
    }

    pub fn stats(&self) -> ResourceStats {
        let state = self.state.lock();
        ResourceStats {
            max_concurrent: self.max_concurrent,
            available: self.semaphore.available_permits(),
            active: state.active.len(),
            overloaded: state.overloaded.is_some(),
            load: state.load.clone(),
        }
    }
}

/// 准入票据：持有一个并发槽位，Drop 时归还
pub struct AdmissionTicket {
    id: u64,
    request_id: String,
    state: Arc<Mutex<SharedState>>,
    _permit: OwnedSemaphorePermit,
}

impl AdmissionTicket {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl std::fmt::Debug for AdmissionTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionTicket")
            .field("id", &self.id)
            .field("request_id", &self.request_id)
            .finish()
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        self.state.lock().active.remove(&self.id);
        tracing::debug!(request = %self.request_id, "released");
    }
}
