//! 模型输出清洗：去掉 ```json 围栏与 `#` / `//` 注释（字符串字面量内的保留）

use std::sync::OnceLock;

use regex::Regex;

static FENCE_RE: OnceLock<Regex> = OnceLock::new();

/// 去掉代码围栏
pub fn strip_fences(content: &str) -> &str {
    let re = FENCE_RE
        .get_or_init(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*\n?(.*?)\s*```\s*$").unwrap());
    match re.captures(content).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => content.trim(),
    }
}

/// 行内注释起点（忽略 JSON 字符串里的 # 与 //）
fn comment_start(line: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'#' => return Some(i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => return Some(i),
            _ => {}
        }
    }
    None
}

/// 清洗模型输出：去围栏、去整行与行尾注释、去空行
pub fn clean_response(content: &str) -> String {
    strip_fences(content)
        .lines()
        .map(|line| match comment_start(line) {
            Some(i) => &line[..i],
            None => line,
        })
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 先按原文解析，失败再清洗后解析
pub fn parse_lenient(content: &str) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_str(content.trim()).or_else(|_| serde_json::from_str(&clean_response(content)))
}
