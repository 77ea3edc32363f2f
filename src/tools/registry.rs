//! 工具注册表
//!
//! 所有工具实现 Tool trait（describe / execute），由 ToolRegistry 按名注册与查找；
//! 描述在注册时缓存一次，之后只读。ToolExecutor 在调用时加超时并统一转 AgentError。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::tools::ParameterSchema;

/// 工具描述：名称、功能描述（供意图解析）、参数 schema（供参数优化）
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// 工具 trait：描述 + 异步执行（args 为 JSON 对象，结果为任意 JSON，交给格式化器展示）
#[async_trait]
pub trait Tool: Send + Sync {
    fn describe(&self) -> ToolDescriptor;

    /// 执行工具；Err 表示工具级失败，由编排层计入重试
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

struct Entry {
    descriptor: ToolDescriptor,
    tool: Arc<dyn Tool>,
}

/// 工具注册表：保持注册顺序，按名称 O(1) 查找
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    /// 同名工具替换原实现，位置不变
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let descriptor = tool.describe();
        let name = descriptor.name.clone();
        match self.index.get(&name) {
            Some(&i) => {
                tracing::warn!(tool = %name, "tool registered twice, replacing");
                self.entries[i] = Entry { descriptor, tool };
            }
            None => {
                tracing::debug!(tool = %name, "registered tool");
                self.index.insert(name, self.entries.len());
                self.entries.push(Entry { descriptor, tool });
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.entries[i].descriptor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| self.entries[i].tool.clone())
    }

    /// 按注册顺序返回全部描述
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        self.entries.iter().map(|e| &e.descriptor).collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.descriptor.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
