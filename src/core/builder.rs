//! Agent 构建器：按配置组装 LLM、工具注册表、计划执行器与资源管理器
//!
//! CLI 与测试走同一套装配逻辑；测试可注入脚本化 LLM、自定义工具与固定负载采样。

use std::sync::Arc;
use std::time::Duration;

use crate::config::{load_prompt, AppConfig};
use crate::core::{LoadProbe, ResourceManager, SysinfoProbe};
use crate::llm::{
    create_deepseek_client, create_ollama_client, LlmClient, MockLlmClient, OpenAiClient,
    DEEPSEEK_CHAT,
};
use crate::orchestrator::prompts::{
    INTENT_PARSER_FILE, INTENT_PARSER_PROMPT, PARAMETER_OPTIMIZER_FILE, PARAMETER_OPTIMIZER_PROMPT,
};
use crate::orchestrator::{IntentParser, ParameterOptimizer, PlanExecutor, ResultFormatter};
use crate::tools::{
    ChatTool, EchoTool, SearchTool, Tool, ToolExecutor, ToolRegistry, WeatherTool,
};

/// 根据配置选择 LLM 后端（Ollama / DeepSeek / OpenAI 兼容 / Mock）
///
/// deepseek、openai 缺少 API Key 时退回 Mock，便于离线运行。
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let model = cfg.llm.model.as_str();
    match provider.as_str() {
        "ollama" => {
            tracing::info!("Using Ollama LLM ({})", model);
            Arc::new(create_ollama_client(cfg.llm.base_url.as_deref(), model))
        }
        "deepseek"
            if std::env::var("DEEPSEEK_API_KEY").is_ok()
                || std::env::var("OPENAI_API_KEY").is_ok() =>
        {
            let model = deepseek_model(model);
            tracing::info!("Using DeepSeek LLM ({})", model);
            Arc::new(create_deepseek_client(Some(model)))
        }
        "openai" if std::env::var("OPENAI_API_KEY").is_ok() => {
            tracing::info!("Using OpenAI LLM ({})", model);
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                model,
                std::env::var("OPENAI_API_KEY").ok().as_deref(),
            ))
        }
        "mock" => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient)
        }
        other => {
            tracing::warn!("No API key set or provider '{}' unknown, using Mock LLM", other);
            Arc::new(MockLlmClient)
        }
    }
}

/// 配置里的模型名不属于 DeepSeek 时（如默认的 Ollama 模型）改用 deepseek-chat
fn deepseek_model(model: &str) -> &str {
    if model.starts_with("deepseek") {
        model
    } else {
        DEEPSEEK_CHAT
    }
}

/// 构建 Agent 的各组件
pub struct AgentBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    probe: Option<Arc<dyn LoadProbe>>,
    extra_tools: Vec<Arc<dyn Tool>>,
    builtin_tools: bool,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            probe: None,
            extra_tools: Vec::new(),
            builtin_tools: true,
        }
    }

    /// 指定 LLM（不再按配置创建）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 指定负载采样源（默认 sysinfo）
    pub fn with_probe(mut self, probe: Arc<dyn LoadProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// 追加工具；与内置工具同名时替换内置实现
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.extra_tools.push(Arc::new(tool));
        self
    }

    /// 不注册内置工具（Weather / Chat / Search / Echo）
    pub fn without_builtin_tools(mut self) -> Self {
        self.builtin_tools = false;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build_llm(&self) -> Arc<dyn LlmClient> {
        match &self.llm {
            Some(llm) => llm.clone(),
            None => create_llm_from_config(&self.config),
        }
    }

    pub fn build_tool_registry(&self, llm: Arc<dyn LlmClient>) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        if self.builtin_tools {
            tools.register(WeatherTool::from_config(&self.config.tools.weather));
            tools.register(ChatTool::new(llm));
            tools.register(SearchTool::new(&self.config.tools.search));
            tools.register(EchoTool);
        }
        for tool in &self.extra_tools {
            tools.register_arc(tool.clone());
        }
        tracing::info!(tools = ?tools.tool_names(), "tool registry ready");
        tools
    }

    pub fn build_plan_executor(&self, llm: Arc<dyn LlmClient>, tools: ToolExecutor) -> PlanExecutor {
        let cfg = &self.config;
        let llm_timeout = Duration::from_secs(cfg.llm.timeouts.request);
        let intent = IntentParser::new(llm.clone(), llm_timeout)
            .with_template(load_prompt(INTENT_PARSER_FILE, INTENT_PARSER_PROMPT));
        let optimizer = ParameterOptimizer::new(
            llm,
            llm_timeout,
            Duration::from_millis(cfg.orchestrator.optimizer_retry_delay_ms),
        )
        .with_template(load_prompt(PARAMETER_OPTIMIZER_FILE, PARAMETER_OPTIMIZER_PROMPT))
        .verbose(cfg.app.verbose);

        PlanExecutor::new(intent, optimizer, tools, ResultFormatter::new(cfg.app.chat_ui))
            .with_retry_delay(Duration::from_millis(cfg.orchestrator.retry_delay_ms))
            .verbose(cfg.app.verbose)
    }

    pub fn build_components(self) -> AgentComponents {
        let llm = self.build_llm();
        let registry = Arc::new(self.build_tool_registry(llm.clone()));
        let tools = ToolExecutor::new(
            registry.clone(),
            Duration::from_secs(self.config.tools.tool_timeout_secs),
        );
        let executor = Arc::new(self.build_plan_executor(llm.clone(), tools));
        let resources = ResourceManager::from_config(&self.config.resource);
        let probe: Arc<dyn LoadProbe> = match &self.probe {
            Some(probe) => probe.clone(),
            None => Arc::new(SysinfoProbe::new()),
        };

        AgentComponents {
            llm,
            registry,
            executor,
            resources,
            probe,
            config: self.config,
        }
    }
}

/// 预构建的组件，可被多个接入层共享
pub struct AgentComponents {
    pub llm: Arc<dyn LlmClient>,
    pub registry: Arc<ToolRegistry>,
    pub executor: Arc<PlanExecutor>,
    pub resources: ResourceManager,
    pub probe: Arc<dyn LoadProbe>,
    pub config: AppConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_provider() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        let llm = create_llm_from_config(&cfg);
        assert_eq!(llm.token_usage(), (0, 0, 0));
    }

    #[test]
    fn test_deepseek_model_falls_back_to_chat() {
        assert_eq!(deepseek_model(&AppConfig::default().llm.model), DEEPSEEK_CHAT);
        assert_eq!(deepseek_model("deepseek-reasoner"), "deepseek-reasoner");
    }

    #[tokio::test]
    async fn test_builtin_tools_registered_in_order() {
        let builder = AgentBuilder::new(AppConfig::default()).with_llm(Arc::new(MockLlmClient));
        let reg = builder.build_tool_registry(builder.build_llm());
        assert_eq!(
            reg.tool_names(),
            vec!["WeatherTool", "ChatTool", "SearchTool", "EchoTool"]
        );
    }

    #[tokio::test]
    async fn test_without_builtin_tools() {
        let builder = AgentBuilder::new(AppConfig::default())
            .with_llm(Arc::new(MockLlmClient))
            .without_builtin_tools()
            .with_tool(EchoTool);
        let components = builder.build_components();
        assert_eq!(components.registry.tool_names(), vec!["EchoTool"]);
        assert_eq!(components.resources.stats().max_concurrent, 4);
    }
}
