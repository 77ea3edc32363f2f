//! 可观测性：tracing 日志初始化
//!
//! 默认 info 级别，RUST_LOG 可覆盖（如 `RUST_LOG=hive=debug`）。
//! 每次工具调用输出一行 `audit` 字段为 JSON 的日志（event = tool_audit）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// verbose 模式：未设置 RUST_LOG 时提升到 debug
pub fn init_verbose(verbose: bool) {
    if !verbose || std::env::var("RUST_LOG").is_ok() {
        return init();
    }
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("info,hive=debug"))
        .with(fmt::layer().with_target(true))
        .try_init();
}
