//! 工具参数 schema：有序参数表、枚举约束与校验
//!
//! 枚举既可以是普通值列表，也可以是 `{name, description}` 对象列表（校验时比对 name）。

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// 枚举候选值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumOption {
    /// `{"name": "webSearch", "description": "WEB_SEARCH"}`
    Named {
        name: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Plain(Value),
}

impl EnumOption {
    /// 参与校验的值
    pub fn value(&self) -> &Value {
        match self {
            EnumOption::Named { name, .. } => name,
            EnumOption::Plain(v) => v,
        }
    }
}

/// 单个参数的约束
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub required: bool,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<EnumOption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    fn of(kind: &str, description: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::of("string", description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::of("integer", description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::of("number", description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::of("boolean", description)
    }

    pub fn array(description: impl Into<String>) -> Self {
        Self::of("array", description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_enum<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.enum_values = Some(
            values
                .into_iter()
                .map(|v| EnumOption::Plain(v.into()))
                .collect(),
        );
        self
    }

    /// `{name, description}` 形式的枚举
    pub fn with_named_enum<I, N, D>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<Value>,
        D: Into<String>,
    {
        self.enum_values = Some(
            values
                .into_iter()
                .map(|(name, desc)| EnumOption::Named {
                    name: name.into(),
                    description: Some(desc.into()),
                })
                .collect(),
        );
        self
    }

    pub fn range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// 枚举允许值（无枚举时为 None）
    pub fn allowed_values(&self) -> Option<Vec<&Value>> {
        self.enum_values
            .as_ref()
            .map(|opts| opts.iter().map(EnumOption::value).collect())
    }
}

/// 参数校验失败
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("参数不是 JSON 对象")]
    NotAnObject,
    #[error("缺少必需参数: {0}")]
    MissingRequired(String),
    #[error("参数 {param} 的值 '{value}' 不在允许范围内，有效值: {allowed:?}")]
    NotInEnum {
        param: String,
        value: String,
        allowed: Vec<String>,
    },
}

/// 有序参数表：name -> ParamSpec（保持声明顺序）
#[derive(Debug, Clone, Default)]
pub struct ParameterSchema {
    params: Vec<(String, ParamSpec)>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加参数；同名参数覆盖原约束但保留位置
    pub fn param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        let name = name.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = spec,
            None => self.params.push((name, spec)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamSpec)> {
        self.params.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// 校验：必需参数齐全、枚举值合法；未声明的参数放行
    pub fn validate(&self, params: &Value) -> Result<(), ValidationError> {
        let obj: &Map<String, Value> = params.as_object().ok_or(ValidationError::NotAnObject)?;

        for (name, spec) in self.iter() {
            if spec.required && !obj.contains_key(name) {
                return Err(ValidationError::MissingRequired(name.to_string()));
            }
        }

        for (name, value) in obj {
            let Some(spec) = self.get(name) else {
                continue;
            };
            if let Some(allowed) = spec.allowed_values() {
                if !allowed.iter().any(|a| *a == value) {
                    return Err(ValidationError::NotInEnum {
                        param: name.clone(),
                        value: display_value(value),
                        allowed: allowed.iter().map(|v| display_value(v)).collect(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Serialize for ParameterSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.params.iter().map(|(n, s)| (n, s)))
    }
}

/// 字符串原样输出，其它值输出 JSON 文本
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn search_schema() -> ParameterSchema {
        ParameterSchema::new()
            .param("query", ParamSpec::string("搜索查询内容").required())
            .param(
                "focus_mode",
                ParamSpec::string("搜索焦点模式")
                    .with_named_enum([("webSearch", "WEB_SEARCH"), ("academicSearch", "ACADEMIC")]),
            )
            .param("size", ParamSpec::string("尺寸").with_enum(["small", "large"]))
    }

    #[test]
    fn test_missing_required() {
        let err = search_schema().validate(&json!({"focus_mode": "webSearch"})).unwrap_err();
        assert_eq!(err, ValidationError::MissingRequired("query".into()));
    }

    #[test]
    fn test_named_enum_membership() {
        let schema = search_schema();
        assert!(schema
            .validate(&json!({"query": "q", "focus_mode": "academicSearch"}))
            .is_ok());
        let err = schema
            .validate(&json!({"query": "q", "focus_mode": "bingSearch"}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::NotInEnum { ref param, .. } if param == "focus_mode"));
    }

    #[test]
    fn test_plain_enum_membership() {
        let schema = search_schema();
        assert!(schema.validate(&json!({"query": "q", "size": "large"})).is_ok());
        assert!(schema.validate(&json!({"query": "q", "size": "huge"})).is_err());
    }

    #[test]
    fn test_unknown_params_pass_and_non_object_fails() {
        let schema = search_schema();
        assert!(schema.validate(&json!({"query": "q", "extra": 1})).is_ok());
        assert_eq!(schema.validate(&json!("q")), Err(ValidationError::NotAnObject));
    }

    #[test]
    fn test_serialize_keeps_declaration_order() {
        let text = serde_json::to_string(&search_schema()).unwrap();
        let q = text.find("\"query\"").unwrap();
        let f = text.find("\"focus_mode\"").unwrap();
        let s = text.find("\"size\"").unwrap();
        assert!(q < f && f < s);
    }
}
