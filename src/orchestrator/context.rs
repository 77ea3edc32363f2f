//! 执行上下文：一次计划内已完成任务的格式化结果（只追加）

use serde::Serialize;

use crate::orchestrator::Task;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextEntry {
    pub task_id: String,
    pub tool_name: String,
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentTask {
    pub id: String,
    pub tool_name: String,
    pub reason: String,
}

/// 交给参数优化器的视图：当前任务 + 之前全部结果
#[derive(Debug, Clone, Serialize)]
pub struct TaskContext {
    pub current_task: CurrentTask,
    pub history: Vec<ContextEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    entries: Vec<ContextEntry>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, task_id: &str, tool_name: &str, formatted: &str) {
        self.entries.push(ContextEntry {
            task_id: task_id.to_string(),
            tool_name: tool_name.to_string(),
            result: formatted.trim().to_string(),
        });
    }

    pub fn view_for(&self, task: &Task) -> TaskContext {
        TaskContext {
            current_task: CurrentTask {
                id: task.id.clone(),
                tool_name: task.tool_name.clone(),
                reason: task.reason.clone(),
            },
            history: self.entries.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
