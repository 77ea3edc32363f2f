//! 编排与调度集成测试：脚本化 LLM + 假工具，覆盖规划、参数优化、重试、上下文与准入控制

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tokio::sync::Semaphore;
    use tokio_util::sync::CancellationToken;

    use hive::config::AppConfig;
    use hive::core::{
        AdmissionRefusal, AgentBuilder, AgentError, HiveRuntime, ResourceManager, ShutdownManager,
        ShutdownReason, StaticProbe, SystemLoad, Thresholds,
    };
    use hive::llm::{MockLlmClient, ScriptedLlmClient};
    use hive::orchestrator::{
        plan_executor, EventSink, HistoryTurn, PlanExecutor, PlanOutcome, ProgressEvent, UserQuery,
        NO_SUITABLE_TOOL,
    };
    use hive::tools::{
        EchoTool, ParamSpec, ParameterSchema, Tool, ToolDescriptor, ToolExecutor, ToolRegistry,
    };

    /// 记录每次调用参数的假工具；fail 为 true 时总是失败
    struct RecordingTool {
        name: &'static str,
        schema: ParameterSchema,
        output: Value,
        fail: bool,
        calls: Arc<Mutex<Vec<Value>>>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingTool {
        fn new(name: &'static str, output: Value, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                schema: ParameterSchema::new(),
                output,
                fail: false,
                calls: Arc::new(Mutex::new(Vec::new())),
                log,
            }
        }

        fn with_schema(mut self, schema: ParameterSchema) -> Self {
            self.schema = schema;
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    #[async_trait]
    impl Tool for RecordingTool {
        fn describe(&self) -> ToolDescriptor {
            ToolDescriptor::new(self.name, format!("{} for tests", self.name), self.schema.clone())
        }

        async fn execute(&self, args: Value) -> Result<Value, String> {
            self.calls.lock().push(args);
            self.log.lock().push(self.name.to_string());
            if self.fail {
                return Err(format!("{} unavailable", self.name));
            }
            Ok(self.output.clone())
        }
    }

    fn executor(llm: Arc<ScriptedLlmClient>, tools: Vec<Arc<dyn Tool>>) -> PlanExecutor {
        executor_with_timeout(llm, tools, Duration::from_secs(5))
    }

    fn executor_with_timeout(
        llm: Arc<ScriptedLlmClient>,
        tools: Vec<Arc<dyn Tool>>,
        tool_timeout: Duration,
    ) -> PlanExecutor {
        let mut reg = ToolRegistry::new();
        for tool in tools {
            reg.register_arc(tool);
        }
        let tools = ToolExecutor::new(Arc::new(reg), tool_timeout);
        plan_executor(llm, tools, Duration::from_secs(5)).with_retry_delay(Duration::from_millis(10))
    }

    fn drain(rx: &mut tokio::sync::mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_weather_query_end_to_end() {
        let weather = Arc::new(
            RecordingTool::new("WeatherTool", json!("武汉: 晴 25℃"), log()).with_schema(
                ParameterSchema::new().param("location", ParamSpec::string("地区名").required()),
            ),
        );
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"```json
{"tasks":[{"id":"task_1","tool_name":"WeatherTool","reason":"查询天气","order":1,"depends_on":[]}],
 "execution_mode":"串行"}
```"#,
            r#"{"WeatherTool": {"location": "武汉"}, "explanation": "地区取自问题"}"#,
        ]));
        let exec = executor(llm.clone(), vec![weather.clone()]);
        let (sink, mut rx) = EventSink::channel(32);

        let out = exec
            .run(&UserQuery::new("武汉天气"), &sink, &CancellationToken::new())
            .await;

        let PlanOutcome::Success { result, link } = out else {
            panic!("expected success");
        };
        let record = result.get("task_1").unwrap();
        assert_eq!(record.tool_name, "WeatherTool");
        assert_eq!(record.reason, "查询天气");
        assert_eq!(record.result, "武汉: 晴 25℃");
        assert!(link.is_empty());

        // 无历史时不注入 history
        assert_eq!(weather.calls.lock().clone(), vec![json!({"location": "武汉"})]);

        let calls = llm.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].system.contains("工具名称: WeatherTool"));
        assert_eq!(calls[0].user, "武汉天气");
        assert!(calls[1].system.contains("工具名称: WeatherTool"));
        assert!(calls[1].system.contains("location"));

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ProgressEvent::Result(v) if v["task_1"]["result"] == json!("武汉: 晴 25℃")
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_tools_are_filtered_into_planning_failure() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tasks":[{"id":"task_1","tool_name":"FooTool","order":1}]}"#,
        ]));
        let exec = executor(llm.clone(), vec![Arc::new(EchoTool)]);
        let (sink, mut rx) = EventSink::channel(8);

        let out = exec
            .run(&UserQuery::new("做点什么"), &sink, &CancellationToken::new())
            .await;

        assert_eq!(out, PlanOutcome::error(NO_SUITABLE_TOOL));
        assert_eq!(llm.call_count(), 1);
        assert!(drain(&mut rx).contains(&ProgressEvent::Error(NO_SUITABLE_TOOL.to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_enum_exhausts_optimizer_and_other_tasks_complete() {
        let unit = Arc::new(
            RecordingTool::new("UnitTool", json!("ok"), log())
                .with_schema(
                    ParameterSchema::new().param(
                        "unit",
                        ParamSpec::string("温度单位").required().with_enum(["c", "f"]),
                    ),
                )
                .failing(),
        );
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tasks":[
                {"id":"task_1","tool_name":"UnitTool","order":1},
                {"id":"task_2","tool_name":"EchoTool","order":2}]}"#,
            r#"{"UnitTool": {"unit": "kelvin"}}"#,
            r#"{"UnitTool": {"unit": "kelvin"}}"#,
            r#"{"UnitTool": {"unit": "kelvin"}}"#,
            r#"{"EchoTool": {"text": "still here"}}"#,
        ]));
        let exec = executor(llm.clone(), vec![unit.clone(), Arc::new(EchoTool)]);
        let (sink, mut rx) = EventSink::channel(64);

        let out = exec
            .run(&UserQuery::new("换算温度"), &sink, &CancellationToken::new())
            .await;

        let PlanOutcome::Success { result, .. } = out else {
            panic!("expected success");
        };
        assert_eq!(result.ids(), vec!["task_2"]);
        assert!(result.get("task_2").unwrap().result.contains("still here"));

        // 参数优化耗尽后以空参数调用，工具失败同样重试 3 次
        assert_eq!(unit.calls.lock().clone(), vec![json!({}); 3]);
        assert_eq!(llm.call_count(), 5);

        let events = drain(&mut rx);
        assert!(events.contains(&ProgressEvent::ThinkingProcess(
            "达到最大重试次数，返回空参数...".to_string()
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ProgressEvent::Error(msg) if msg.starts_with("工具 UnitTool 执行失败")
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_run_in_order_and_share_context() {
        let order = log();
        let a = Arc::new(RecordingTool::new("ToolA", json!("from A"), order.clone()));
        let b = Arc::new(RecordingTool::new("ToolB", json!("from B"), order.clone()));
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tasks":[
                {"id":"a","tool_name":"ToolA","order":2,"depends_on":["b"]},
                {"id":"b","tool_name":"ToolB","order":1}]}"#,
            r#"{"ToolB": {}}"#,
            r#"{"ToolA": {}}"#,
        ]));
        let exec = executor(llm.clone(), vec![a, b]);

        let out = exec
            .run(&UserQuery::new("先 B 后 A"), &EventSink::none(), &CancellationToken::new())
            .await;

        let PlanOutcome::Success { result, .. } = out else {
            panic!("expected success");
        };
        assert_eq!(order.lock().clone(), vec!["ToolB", "ToolA"]);
        assert_eq!(result.ids(), vec!["b", "a"]);

        let calls = llm.calls();
        assert!(!calls[1].system.contains("from B"));
        assert!(calls[2].system.contains("from B"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_do_not_share_context() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tasks":[{"id":"task_1","tool_name":"EchoTool","order":1}]}"#,
            r#"{"EchoTool": {"text": "first-secret"}}"#,
            r#"{"tasks":[{"id":"task_1","tool_name":"EchoTool","order":1}]}"#,
            r#"{"EchoTool": {"text": "second"}}"#,
        ]));
        let exec = executor(llm.clone(), vec![Arc::new(EchoTool)]);
        let cancel = CancellationToken::new();

        assert!(exec.run(&"一".into(), &EventSink::none(), &cancel).await.is_success());
        assert!(exec.run(&"二".into(), &EventSink::none(), &cancel).await.is_success());

        let calls = llm.calls();
        assert_eq!(calls.len(), 4);
        assert!(!calls[3].system.contains("first-secret"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_retry_is_bounded_to_three_attempts() {
        let flaky = Arc::new(RecordingTool::new("CountingTool", json!("never"), log()).failing());
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tasks":[{"id":"task_1","tool_name":"CountingTool","order":1}]}"#,
            r#"{"CountingTool": {"n": 1}}"#,
        ]));
        let exec = executor(llm.clone(), vec![flaky.clone()]);
        let (sink, mut rx) = EventSink::channel(32);

        let out = exec
            .run(&UserQuery::new("数数"), &sink, &CancellationToken::new())
            .await;

        let PlanOutcome::Success { result, .. } = out else {
            panic!("expected success with no completed tasks");
        };
        assert!(result.is_empty());
        assert_eq!(flaky.calls.lock().len(), 3);
        assert_eq!(llm.call_count(), 2);

        let events = drain(&mut rx);
        let retries: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::ThinkingProcess(t) if t.contains("正在重试") => Some(t.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            retries,
            vec![
                "工具 CountingTool 执行失败，正在重试... (1/3)".to_string(),
                "工具 CountingTool 执行失败，正在重试... (2/3)".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_injected_into_tool_arguments() {
        let chat = Arc::new(RecordingTool::new("ChatTool", json!("你好呀"), log()));
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tasks":[{"id":"task_1","tool_name":"ChatTool","order":1}]}"#,
            r#"{"ChatTool": {"message": "还记得我吗"}}"#,
        ]));
        let exec = executor(llm, vec![chat.clone()]);
        let query = UserQuery::new("还记得我吗").with_history(vec![HistoryTurn {
            query: "我叫小明".into(),
            response: "你好小明".into(),
        }]);

        let out = exec.run(&query, &EventSink::none(), &CancellationToken::new()).await;
        assert!(out.is_success());

        let args = chat.calls.lock()[0].clone();
        assert_eq!(args["message"], json!("还记得我吗"));
        assert_eq!(
            args["history"],
            json!([{"query": "我叫小明", "response": "你好小明"}])
        );
    }

    /// 单任务计划：工具失败 3 次后该任务不出现在结果中
    async fn run_single_failing_task(exec: &PlanExecutor) -> PlanOutcome {
        exec.run(&UserQuery::new("查一下"), &EventSink::none(), &CancellationToken::new())
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_null_or_blank_result_counts_as_failure() {
        for output in [Value::Null, json!("   ")] {
            let blank = Arc::new(RecordingTool::new("BlankTool", output, log()));
            let llm = Arc::new(ScriptedLlmClient::new([
                r#"{"tasks":[{"id":"task_1","tool_name":"BlankTool","order":1}]}"#,
                r#"{"BlankTool": {}}"#,
            ]));
            let exec = executor(llm, vec![blank.clone()]);

            let PlanOutcome::Success { result, .. } = run_single_failing_task(&exec).await else {
                panic!("expected success with no completed tasks");
            };
            assert!(result.is_empty());
            assert_eq!(blank.calls.lock().len(), 3);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_error_payload_counts_as_failure() {
        let search = Arc::new(RecordingTool::new(
            "SearchTool",
            json!({"error": "quota exceeded"}),
            log(),
        ));
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tasks":[{"id":"task_1","tool_name":"SearchTool","order":1}]}"#,
            r#"{"SearchTool": {}}"#,
        ]));
        let exec = executor(llm, vec![search.clone()]);
        let (sink, mut rx) = EventSink::channel(32);

        let out = exec
            .run(&UserQuery::new("搜索一下"), &sink, &CancellationToken::new())
            .await;

        let PlanOutcome::Success { result, .. } = out else {
            panic!("expected success with no completed tasks");
        };
        assert!(result.get("task_1").is_none());
        assert_eq!(search.calls.lock().len(), 3);
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            ProgressEvent::Error(msg) if msg.contains("quota exceeded")
        )));
    }

    /// 每次调用都超过执行器超时的工具
    struct SlowTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for SlowTool {
        fn describe(&self) -> ToolDescriptor {
            ToolDescriptor::new("SlowTool", "never answers in time", ParameterSchema::new())
        }

        async fn execute(&self, _args: Value) -> Result<Value, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!("too late"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_timeout_is_retried_then_dropped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let slow = Arc::new(SlowTool {
            calls: calls.clone(),
        });
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tasks":[{"id":"task_1","tool_name":"SlowTool","order":1}]}"#,
            r#"{"SlowTool": {}}"#,
        ]));
        let exec = executor_with_timeout(llm, vec![slow], Duration::from_secs(1));

        let PlanOutcome::Success { result, .. } = run_single_failing_task(&exec).await else {
            panic!("expected success with no completed tasks");
        };
        assert!(result.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    /// 每次调用都 panic 的工具
    struct PanicTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for PanicTool {
        fn describe(&self) -> ToolDescriptor {
            ToolDescriptor::new("PanicTool", "always panics", ParameterSchema::new())
        }

        async fn execute(&self, _args: Value) -> Result<Value, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("PanicTool exploded");
        }
    }

    #[tokio::test]
    async fn test_panicking_tool_does_not_abort_the_request() {
        let mut config = AppConfig::default();
        config.orchestrator.retry_delay_ms = 10;
        let calls = Arc::new(AtomicUsize::new(0));
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tasks":[
                {"id":"task_1","tool_name":"PanicTool","order":1},
                {"id":"task_2","tool_name":"EchoTool","order":2}]}"#,
            r#"{"PanicTool": {}}"#,
            r#"{"EchoTool": {"text": "after the panic"}}"#,
        ]));
        let components = AgentBuilder::new(config)
            .with_llm(llm.clone())
            .without_builtin_tools()
            .with_tool(PanicTool {
                calls: calls.clone(),
            })
            .with_tool(EchoTool)
            .with_probe(Arc::new(StaticProbe::idle()))
            .build_components();
        let rt = HiveRuntime::start(components, Arc::new(ShutdownManager::new()));

        let out = rt.process("先炸再回声").await;

        let PlanOutcome::Success { result, .. } = out else {
            panic!("expected success");
        };
        assert_eq!(result.ids(), vec!["task_2"]);
        assert!(result.get("task_2").unwrap().result.contains("after the panic"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(llm.call_count(), 3);
        assert_eq!(rt.stats().active, 0);

        rt.shutdown(ShutdownReason::Completed).await;
    }

    /// 在 gate 放行前挂起的工具，用来观察同时执行的请求数
    struct GateTool {
        gate: Arc<Semaphore>,
        started: Arc<AtomicUsize>,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for GateTool {
        fn describe(&self) -> ToolDescriptor {
            ToolDescriptor::new("GateTool", "waits for the gate", ParameterSchema::new())
        }

        async fn execute(&self, _args: Value) -> Result<Value, String> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let permit = self.gate.acquire().await.map_err(|e| e.to_string())?;
            permit.forget();
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(json!("done"))
        }
    }

    fn runtime_with(config: AppConfig, probe: StaticProbe, tool: impl Tool + 'static) -> HiveRuntime {
        let components = AgentBuilder::new(config)
            .with_llm(Arc::new(MockLlmClient))
            .without_builtin_tools()
            .with_tool(tool)
            .with_probe(Arc::new(probe))
            .build_components();
        HiveRuntime::start(components, Arc::new(ShutdownManager::new()))
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..300 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_admission_bounds_concurrent_requests() {
        let mut config = AppConfig::default();
        config.resource.max_concurrent = 2;
        let gate = Arc::new(Semaphore::new(0));
        let started = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tool = GateTool {
            gate: gate.clone(),
            started: started.clone(),
            running: Arc::new(AtomicUsize::new(0)),
            peak: peak.clone(),
        };
        let rt = runtime_with(config, StaticProbe::idle(), tool);

        let pending: Vec<_> = (0..3)
            .map(|i| rt.process_stream(format!("请求 {i}")).unwrap().1)
            .collect();

        wait_until(|| started.load(Ordering::SeqCst) == 2).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(rt.stats().active, 2);
        assert_eq!(rt.stats().available, 0);

        gate.add_permits(3);
        for p in pending {
            assert!(p.outcome().await.is_success());
        }
        assert_eq!(started.load(Ordering::SeqCst), 3);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(rt.stats().active, 0);

        rt.shutdown(ShutdownReason::Completed).await;
    }

    #[tokio::test]
    async fn test_overload_refuses_without_blocking() {
        let rm = ResourceManager::new(2, Thresholds::default());
        rm.update_load(SystemLoad::new(10.0, 99.0, 10.0));

        let refused = tokio::time::timeout(Duration::from_millis(100), rm.acquire("r1"))
            .await
            .expect("overloaded acquire must return immediately");
        assert!(matches!(
            refused,
            Err(AgentError::Admission(AdmissionRefusal::Overloaded(_)))
        ));
        assert_eq!(rm.stats().available, 2);
    }

    #[tokio::test]
    async fn test_overloaded_runtime_requeues_until_cancelled() {
        let mut config = AppConfig::default();
        config.resource.requeue_backoff_ms = 20;
        let started = Arc::new(AtomicUsize::new(0));
        let tool = GateTool {
            gate: Arc::new(Semaphore::new(10)),
            started: started.clone(),
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        };
        let rt = runtime_with(
            config,
            StaticProbe::new(SystemLoad::new(99.0, 10.0, 10.0)),
            tool,
        );
        wait_until(|| rt.stats().overloaded).await;

        let (mut events, pending) = rt.process_stream("高负载下的请求").unwrap();
        let first = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap();
        assert_eq!(
            first,
            Some(ProgressEvent::ThinkingProcess(
                "系统负载过高，请求已重新排队...".to_string()
            ))
        );
        assert_eq!(rt.stats().active, 0);
        assert_eq!(started.load(Ordering::SeqCst), 0);

        pending.cancel();
        let out = tokio::time::timeout(Duration::from_secs(2), pending.outcome())
            .await
            .unwrap();
        assert_eq!(out, PlanOutcome::from(AgentError::Cancelled));

        rt.shutdown(ShutdownReason::Completed).await;
    }
}
