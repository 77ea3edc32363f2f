//! Hive CLI
//!
//! 入口：初始化日志、加载配置并启动运行时，执行命令行给出的查询，
//! 打印进度事件与最终结果后关闭。用法：`hive [--config PATH] [查询...]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use hive::config::{load_config, AppConfig};
use hive::core::{AgentBuilder, HiveRuntime, ShutdownManager, ShutdownReason};
use hive::observability;
use hive::orchestrator::ProgressEvent;

const DEFAULT_QUERY: &str = "武汉天气";

fn parse_args() -> (Option<PathBuf>, String) {
    let mut config_path = None;
    let mut words = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            config_path = args.next().map(PathBuf::from);
        } else {
            words.push(arg);
        }
    }
    let query = if words.is_empty() {
        DEFAULT_QUERY.to_string()
    } else {
        words.join(" ")
    };
    (config_path, query)
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::ThinkingProcess(text) => println!("[思考] {text}"),
        ProgressEvent::Result(value) => println!(
            "[结果] {}",
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        ),
        ProgressEvent::Error(text) => eprintln!("[错误] {text}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config_path, query) = parse_args();

    let loaded = load_config(config_path);
    let verbose = loaded.as_ref().map(|cfg| cfg.app.verbose).unwrap_or(false);
    observability::init_verbose(verbose);
    let cfg = loaded.unwrap_or_else(|e| {
        tracing::warn!("配置加载失败（{}），使用默认配置", e);
        AppConfig::default()
    });

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let runtime = HiveRuntime::start(AgentBuilder::new(cfg).build_components(), shutdown.clone());

    println!("查询: {query}");
    let (mut events, pending) = runtime
        .process_stream(query.as_str())
        .context("Failed to submit query")?;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let outcome = tokio::select! {
        outcome = pending.outcome() => outcome,
        _ = shutdown.wait_for_shutdown() => {
            tracing::warn!("interrupted before the query finished");
            runtime.shutdown(ShutdownReason::UserInitiated).await;
            return Ok(());
        }
    };

    // 结果已返回，执行器持有的事件发送端随之释放
    let _ = printer.await;
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?
    );

    runtime.shutdown(ShutdownReason::Completed).await;
    Ok(())
}
