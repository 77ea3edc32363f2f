//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__RESOURCE__MAX_CONCURRENT=2`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub resource: ResourceSection,
}

/// [app] 段：应用名、详细日志、前端模式
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 打印规划方案、耗时与参数说明
    #[serde(default)]
    pub verbose: bool,
    /// 结果供 Web 前端展示（输出路径保留相对形式）
    #[serde(default)]
    pub chat_ui: bool,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：ollama / deepseek / openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "qwen2.5".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次模型调用超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [tools] 段：工具超时与各内置工具的端点
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub weather: WeatherSection,
    #[serde(default)]
    pub search: SearchSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            weather: WeatherSection::default(),
            search: SearchSection::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [tools.weather] 段：高德天气 API
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherSection {
    /// 未设置时读取环境变量 GAODE_WEATHER_API_KEY
    pub api_key: Option<String>,
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
    #[serde(default = "default_weather_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WeatherSection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_weather_base_url(),
            timeout_secs: default_weather_timeout_secs(),
        }
    }
}

fn default_weather_base_url() -> String {
    "https://restapi.amap.com/v3/weather/weatherInfo".to_string()
}

fn default_weather_timeout_secs() -> u64 {
    10
}

/// [tools.search] 段：Perplexica 风格搜索服务
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
    #[serde(default = "default_search_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_search_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            base_url: default_search_base_url(),
            chat_model: default_search_chat_model(),
            embedding_model: default_search_embedding_model(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

fn default_search_base_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_search_chat_model() -> String {
    "qwen2.5:latest".to_string()
}

fn default_search_embedding_model() -> String {
    "bge-m3:latest".to_string()
}

fn default_search_timeout_secs() -> u64 {
    60
}

/// [orchestrator] 段：重试间隔与进度事件缓冲
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    /// 工具重试前的等待（毫秒）
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// 参数优化重试前的等待（毫秒）
    #[serde(default = "default_optimizer_retry_delay_ms")]
    pub optimizer_retry_delay_ms: u64,
    /// 进度事件通道容量
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            optimizer_retry_delay_ms: default_optimizer_retry_delay_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_optimizer_retry_delay_ms() -> u64 {
    100
}

fn default_event_buffer() -> usize {
    64
}

/// [resource] 段：并发上限、负载阈值、采样与退避
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceSection {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// CPU 使用率阈值（百分比）
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold: f32,
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f32,
    #[serde(default = "default_disk_threshold")]
    pub disk_threshold: f32,
    /// 负载采样间隔（秒）
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    /// 准入被拒后重新入队的等待（毫秒）
    #[serde(default = "default_requeue_backoff_ms")]
    pub requeue_backoff_ms: u64,
}

impl Default for ResourceSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            cpu_threshold: default_cpu_threshold(),
            memory_threshold: default_memory_threshold(),
            disk_threshold: default_disk_threshold(),
            monitor_interval_secs: default_monitor_interval_secs(),
            requeue_backoff_ms: default_requeue_backoff_ms(),
        }
    }
}

impl ResourceSection {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }

    pub fn requeue_backoff(&self) -> Duration {
        Duration::from_millis(self.requeue_backoff_ms)
    }
}

fn default_max_concurrent() -> usize {
    4
}

fn default_cpu_threshold() -> f32 {
    80.0
}

fn default_memory_threshold() -> f32 {
    85.0
}

fn default_disk_threshold() -> f32 {
    90.0
}

fn default_monitor_interval_secs() -> u64 {
    5
}

fn default_requeue_backoff_ms() -> u64 {
    1000
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 读取提示词模板：依次尝试 config/prompts 与 ../config/prompts，均不存在时用内置默认
pub fn load_prompt(file_name: &str, fallback: &str) -> String {
    [
        format!("config/prompts/{file_name}"),
        format!("../config/prompts/{file_name}"),
    ]
    .into_iter()
    .find_map(|p| std::fs::read_to_string(p).ok())
    .unwrap_or_else(|| fallback.to_string())
}
