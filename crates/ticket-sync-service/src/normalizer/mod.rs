//! 平台载荷归一化
//!
//! 每个平台实现一个 [`PlatformNormalizer`]，把平台特有的载荷转换为 [`NormalizedOrder`]。
//! 归一化是纯函数：不访问存储，也不发起网络请求。订单未内嵌在 webhook 中时，
//! 由 [`PlatformNormalizer::locate_order`] 返回订单地址，由调用方负责拉取。

pub mod eventbrite;
pub mod humanitix;
pub mod registry;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{IngestError, Result};
use crate::models::{EventKind, LineItem, NormalizedOrder, Platform};

pub use eventbrite::EventbriteNormalizer;
pub use humanitix::HumanitixNormalizer;
pub use registry::NormalizerRegistry;

pub const DEFAULT_CURRENCY: &str = "AUD";
pub const DEFAULT_TICKET_LABEL: &str = "General Admission";

/// 订单数据来源
#[derive(Debug, Clone, PartialEq)]
pub enum OrderSource {
    /// 订单完整内嵌在 webhook 载荷中
    Embedded(Value),
    /// 只给了订单 API 地址，需要回源拉取
    Remote(String),
}

/// 载荷外层提供的、订单本身可能缺失的关联信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderHint {
    pub external_event_id: Option<String>,
    pub source_url: Option<String>,
}

impl OrderHint {
    pub fn for_event(external_event_id: impl Into<String>) -> Self {
        Self {
            external_event_id: Some(external_event_id.into()),
            source_url: None,
        }
    }
}

/// 平台归一化策略
pub trait PlatformNormalizer: Send + Sync {
    fn platform(&self) -> Platform;

    /// 携带签名的请求头名称（小写）
    fn signature_header(&self) -> &'static str;

    /// 从载荷中取出平台事件类型
    fn event_type(&self, payload: &Value) -> Option<String>;

    /// 平台事件类型 → 对销售记录的作用
    fn classify(&self, event_type: &str) -> EventKind;

    /// 定位订单数据
    fn locate_order(&self, payload: &Value) -> Result<(OrderSource, OrderHint)>;

    /// 订单 JSON → 归一化订单；缺少订单号或活动 ID 时返回校验错误
    fn normalize_order(&self, order: &Value, hint: &OrderHint) -> Result<NormalizedOrder>;
}

// ==================== 载荷解析辅助 ====================

/// 依次尝试多个字段名，返回第一个非空的字符串；数字会被转为字符串
pub(crate) fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// 读取主货币单位金额（如 50.00），转为分；四舍五入远离零
pub(crate) fn major_to_cents(value: Option<&Value>) -> Option<i64> {
    let amount = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !amount.is_finite() {
        return None;
    }
    Some((amount * 100.0).round() as i64)
}

pub(crate) fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = value?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// 客户姓名：优先 first/last（两种命名风格均可），否则取完整 name
pub(crate) fn customer_name(value: &Value) -> String {
    let first = first_string(value, &["firstName", "first_name"]).unwrap_or_default();
    let last = first_string(value, &["lastName", "last_name"]).unwrap_or_default();
    let joined = format!("{} {}", first, last).trim().to_string();
    if !joined.is_empty() {
        return joined;
    }
    first_string(value, &["name", "fullName", "full_name"]).unwrap_or_default()
}

pub(crate) fn default_line_items(gross_cents: i64) -> Vec<LineItem> {
    vec![LineItem {
        label: DEFAULT_TICKET_LABEL.to_string(),
        quantity: 1,
        unit_price_cents: gross_cents,
    }]
}

/// 明细票数：缺失按 1 张计，否则必须是 i32 范围内的非负整数
pub(crate) fn ticket_count(item: &Value) -> Result<i32> {
    match item.get("quantity") {
        None | Some(Value::Null) => Ok(1),
        Some(raw) => raw
            .as_i64()
            .or_else(|| raw.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
            .and_then(|q| i32::try_from(q).ok())
            .filter(|q| *q >= 0)
            .ok_or_else(|| IngestError::Validation(format!("票数无效: {}", raw))),
    }
}

/// 各明细票数之和不能溢出
pub(crate) fn check_ticket_total(items: &[LineItem]) -> Result<()> {
    items
        .iter()
        .try_fold(0i32, |total, item| total.checked_add(item.quantity))
        .map(|_| ())
        .ok_or_else(|| IngestError::Validation("票数合计超出范围".to_string()))
}

pub(crate) fn require(value: Option<String>, what: &str) -> Result<String> {
    value.ok_or_else(|| IngestError::Validation(format!("缺少{}", what)))
}
