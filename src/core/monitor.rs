//! 系统负载监控：后台定时采样 CPU / 内存 / 磁盘，写入 ResourceManager
//!
//! 采样通过 LoadProbe 抽象，生产环境用 sysinfo，测试中可注入固定值。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sysinfo::{Disks, System};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{ResourceManager, SystemLoad};

/// 负载采样源
#[async_trait]
pub trait LoadProbe: Send + Sync {
    async fn sample(&self) -> Result<SystemLoad, String>;
}

/// 基于 sysinfo 的采样；保留同一个 System 以便 CPU 使用率有参照
pub struct SysinfoProbe {
    system: Arc<Mutex<System>>,
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        Self {
            system: Arc::new(Mutex::new(sys)),
        }
    }
}

/// 始终返回同一负载；用于关闭真实采样的部署和测试
pub struct StaticProbe {
    load: SystemLoad,
}

impl StaticProbe {
    pub fn new(load: SystemLoad) -> Self {
        Self { load }
    }

    pub fn idle() -> Self {
        Self::new(SystemLoad::new(0.0, 0.0, 0.0))
    }
}

#[async_trait]
impl LoadProbe for StaticProbe {
    async fn sample(&self) -> Result<SystemLoad, String> {
        let mut load = self.load.clone();
        load.timestamp = Utc::now();
        Ok(load)
    }
}

fn percent(used: u64, total: u64) -> f32 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64 * 100.0) as f32
    }
}

/// 根分区磁盘使用率；找不到 "/" 时取第一块磁盘
fn disk_percent() -> f32 {
    let disks = Disks::new_with_refreshed_list();
    let list = disks.list();
    list.iter()
        .find(|d| d.mount_point() == std::path::Path::new("/"))
        .or_else(|| list.first())
        .map(|d| percent(d.total_space().saturating_sub(d.available_space()), d.total_space()))
        .unwrap_or(0.0)
}

/// 运行时工作线程数（不在 tokio 运行时内时为 0）
fn thread_count() -> usize {
    tokio::runtime::Handle::try_current()
        .map(|h| h.metrics().num_workers())
        .unwrap_or(0)
}

#[async_trait]
impl LoadProbe for SysinfoProbe {
    async fn sample(&self) -> Result<SystemLoad, String> {
        let system = self.system.clone();
        let threads = thread_count();
        tokio::task::spawn_blocking(move || {
            let mut sys = system.lock();
            sys.refresh_all();
            SystemLoad {
                cpu_percent: sys.global_cpu_usage(),
                memory_percent: percent(sys.used_memory(), sys.total_memory()),
                disk_percent: disk_percent(),
                thread_count: threads,
                process_count: sys.processes().len(),
                timestamp: Utc::now(),
            }
        })
        .await
        .map_err(|e| format!("load sampling task failed: {e}"))
    }
}

/// 后台监控：每个 interval 采样一次并更新 ResourceManager
pub struct SystemMonitor {
    probe: Arc<dyn LoadProbe>,
    manager: ResourceManager,
    interval: Duration,
}

impl SystemMonitor {
    pub fn new(probe: Arc<dyn LoadProbe>, manager: ResourceManager, interval: Duration) -> Self {
        Self {
            probe,
            manager,
            interval,
        }
    }

    /// 采样一次；失败只记日志，保留上一次的判断
    pub async fn tick(&self) {
        match self.probe.sample().await {
            Ok(load) => self.manager.update_load(load),
            Err(e) => tracing::warn!("load sampling failed: {}", e),
        }
    }

    /// 启动后台采样，直到 cancel 被触发
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(interval_secs = self.interval.as_secs(), "system monitor started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.tick().await,
                }
            }
            tracing::info!("system monitor stopped");
        })
    }
}
