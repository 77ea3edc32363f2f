//! 天气工具：高德天气 API（实况天气）
//!
//! 地区名先经行政区划查询（/v3/config/district）换成 adcode，再请求 weatherInfo；
//! 已是 6 位 adcode 时直接查询。结果整理为多行文本。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::WeatherSection;
use crate::tools::{ParamSpec, ParameterSchema, Tool, ToolDescriptor};

const DISTRICT_URL: &str = "https://restapi.amap.com/v3/config/district";

/// 实况天气（高德 lives[0]）
#[derive(Debug, Clone, Deserialize)]
pub struct LiveWeather {
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub adcode: String,
    #[serde(default)]
    pub weather: String,
    #[serde(default)]
    pub temperature: String,
    #[serde(default)]
    pub winddirection: String,
    #[serde(default)]
    pub windpower: String,
    #[serde(default)]
    pub humidity: String,
    #[serde(default)]
    pub reporttime: String,
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    status: String,
    #[serde(default)]
    info: String,
    #[serde(default)]
    lives: Vec<LiveWeather>,
}

#[derive(Debug, Deserialize)]
struct District {
    adcode: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DistrictResponse {
    status: String,
    #[serde(default)]
    districts: Vec<District>,
}

/// 行政级别：省 / 市 / 区县（按 adcode 尾数判断）
pub fn administrative_level(adcode: &str) -> &'static str {
    if adcode.ends_with("0000") {
        "province"
    } else if adcode.ends_with("00") {
        "city"
    } else {
        "district"
    }
}

/// 整理为展示文本
pub fn format_weather(live: &LiveWeather, region: &str) -> String {
    let border = "=".repeat(20);
    format!(
        "{border}\n{region}天气信息\n{border}\n\
         📍 位置: {} {} ({})\n\
         🌤 天气: {}\n\
         🌡 温度: {}℃\n\
         💨 风向: {}\n\
         💪 风力: {}\n\
         💧 湿度: {}%\n\
         🕒 发布时间: {}\n{border}",
        live.province,
        live.city,
        administrative_level(&live.adcode),
        live.weather,
        live.temperature,
        live.winddirection,
        live.windpower,
        live.humidity,
        live.reporttime,
    )
}

/// 天气工具：参数 location（城市或区县名，也可直接给 adcode）
pub struct WeatherTool {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl WeatherTool {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key,
            base_url: base_url.into(),
        }
    }

    /// 按配置创建；api_key 未配置时读取 GAODE_WEATHER_API_KEY
    pub fn from_config(cfg: &WeatherSection) -> Self {
        let api_key = cfg
            .api_key
            .clone()
            .or_else(|| std::env::var("GAODE_WEATHER_API_KEY").ok());
        Self::new(api_key, cfg.base_url.clone(), Duration::from_secs(cfg.timeout_secs))
    }

    async fn resolve_adcode(&self, key: &str, location: &str) -> Result<(String, String), String> {
        if location.len() == 6 && location.chars().all(|c| c.is_ascii_digit()) {
            return Ok((location.to_string(), location.to_string()));
        }
        let resp: DistrictResponse = self
            .client
            .get(DISTRICT_URL)
            .query(&[("keywords", location), ("subdistrict", "0"), ("key", key)])
            .send()
            .await
            .map_err(|e| format!("区域编码查询失败: {e}"))?
            .json()
            .await
            .map_err(|e| format!("区域编码解析失败: {e}"))?;
        if resp.status != "1" {
            return Err(format!("区域编码查询失败: {location}"));
        }
        resp.districts
            .into_iter()
            .next()
            .map(|d| (d.adcode, d.name))
            .ok_or_else(|| format!("未找到{location}的区域编码"))
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "WeatherTool",
            "查询天气的工具",
            ParameterSchema::new()
                .param(
                    "location",
                    ParamSpec::string("需要查询天气的城市，从用户查询中提取城市名，包括可能的区县名（如 \"武汉\"）")
                        .required(),
                )
                .param("date", ParamSpec::string("查询天气的日期")),
        )
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let location = args
            .get("location")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "错误：未提供位置参数".to_string())?;
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| "未配置高德天气 API Key（GAODE_WEATHER_API_KEY）".to_string())?;

        let (adcode, region) = self.resolve_adcode(key, location).await?;
        tracing::debug!(location, adcode = %adcode, "weather lookup");

        let resp: WeatherResponse = self
            .client
            .get(&self.base_url)
            .query(&[("city", adcode.as_str()), ("key", key)])
            .send()
            .await
            .map_err(|e| format!("天气查询失败：{e}"))?
            .json()
            .await
            .map_err(|e| format!("天气查询失败：{e}"))?;

        match resp.lives.first() {
            Some(live) if resp.status == "1" => Ok(Value::String(format_weather(live, &region))),
            _ => Err(format!("获取天气信息失败: {}", resp.info)),
        }
    }
}
