//! 结果格式化：按工具名把原始结果转成展示文本与链接列表
//!
//! 返回 Err 视为格式化失败，由执行器计入该任务的重试次数。

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::tools::display_value;

/// 格式化后的单个工具结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormattedResult {
    pub text: String,
    pub links: Vec<String>,
}

impl FormattedResult {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            links: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResultFormatter {
    chat_ui: bool,
    base_dir: PathBuf,
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ResultFormatter {
    pub fn new(chat_ui: bool) -> Self {
        Self {
            chat_ui,
            base_dir: std::env::current_dir().unwrap_or_default(),
        }
    }

    /// 相对输出路径的拼接基准（默认当前目录）
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn format(&self, tool_name: &str, raw: &Value) -> Result<FormattedResult, String> {
        match tool_name {
            "SearchTool" => format_search(raw),
            "WeatherTool" | "ChatTool" => Ok(FormattedResult::text(display_value(raw))),
            "DescriptionImageTool" => Ok(FormattedResult::text(format!(
                "图像分析结果：\n{}",
                display_value(raw)
            ))),
            "ImageGeneratorTool" => format_generated_image(raw),
            "FileConverterTool" => Ok(FormattedResult::text(self.format_converted_file(raw))),
            "AudioTool" => Ok(FormattedResult::text(self.format_audio(raw))),
            other => Ok(FormattedResult::text(format!(
                "----------{other}----------\n{}",
                display_value(raw)
            ))),
        }
    }

    fn format_converted_file(&self, raw: &Value) -> String {
        let path = raw.as_str().unwrap_or_default();
        if self.chat_ui {
            return format!("\n输出路径：{path}\n");
        }
        let full = if path.is_empty() {
            "未生成".to_string()
        } else {
            self.base_dir.join(path).display().to_string()
        };
        format!("\n输出路径：{full}\n")
    }

    fn format_audio(&self, raw: &Value) -> String {
        let path = raw.as_str().unwrap_or_default();
        if self.chat_ui {
            let shown = path.find("output").map(|i| &path[i..]).unwrap_or(path);
            return format!("输出路径：{shown}\n");
        }
        let shown = if path.is_empty() { "未生成" } else { path };
        format!("输出路径：{shown}\n")
    }
}

fn format_search(raw: &Value) -> Result<FormattedResult, String> {
    if let Some(err) = raw.get("error") {
        return Err(format!("搜索结果包含错误: {}", display_value(err)));
    }
    let Some(obj) = raw.as_object() else {
        return Err("搜索结果不是对象".to_string());
    };
    let answer = obj.get("answer").map(display_value).unwrap_or_default();
    let links = obj
        .get("sources")
        .and_then(Value::as_array)
        .map(|sources| {
            sources
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let url = s.get("url").and_then(Value::as_str).unwrap_or("无链接");
                    format!("{}. {}", i + 1, url)
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(FormattedResult {
        text: answer,
        links,
    })
}

fn format_generated_image(raw: &Value) -> Result<FormattedResult, String> {
    let path = match raw {
        Value::String(s) if !s.trim().is_empty() => s.trim(),
        Value::String(_) | Value::Null => return Err("生成结果为空".to_string()),
        other => return Err(format!("无效的结果类型: {other}")),
    };
    if !Path::new(path).exists() {
        return Err(format!("输出路径不存在: {path}"));
    }
    Ok(FormattedResult::text(format!("输出路径：{path}\n")))
}
