//! 用户请求：文本 + 附件 + 聊天历史

use serde::{Deserialize, Serialize};

/// 附件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    File,
    Audio,
    Url,
    Text,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Image => "image",
            AttachmentKind::File => "file",
            AttachmentKind::Audio => "audio",
            AttachmentKind::Url => "url",
            AttachmentKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub content: String,
}

/// 一轮历史对话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub query: String,
    pub response: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserQuery {
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
}

impl UserQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_attachment(mut self, kind: AttachmentKind, content: impl Into<String>) -> Self {
        self.attachments.push(Attachment {
            kind,
            content: content.into(),
        });
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.history = history;
        self
    }

    /// 交给模型的完整文本：附件逐条追加在原文之后
    pub fn render(&self) -> String {
        let mut out = self.text.clone();
        for a in &self.attachments {
            out.push_str(&format!("\n附加信息:\n{}: {}", a.kind.as_str(), a.content));
        }
        out
    }
}

impl From<&str> for UserQuery {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for UserQuery {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
