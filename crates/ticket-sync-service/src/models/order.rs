//! 归一化后的订单与订单事件
//!
//! 平台载荷经 Normalizer 转换后的统一结构，只在处理链路中流转，不直接落库。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::Platform;

/// 事件对销售记录的作用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// 创建 / 支付 / 更新
    Paid,
    Refunded,
    Cancelled,
    /// 不关心的事件类型，只记审计
    Ignored,
}

/// 平台侧的订单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderLifecycle {
    Paid,
    /// 尚未完成支付（pending、awaiting payment 等）
    Unpaid,
    Refunded,
    /// 部分退款，金额只能取自载荷中的退款信息
    PartiallyRefunded,
    Cancelled,
}

impl OrderLifecycle {
    /// 轮询时没有事件类型，直接按订单状态推断作用
    pub fn as_event_kind(&self) -> EventKind {
        match self {
            Self::Paid | Self::Unpaid => EventKind::Paid,
            Self::Refunded | Self::PartiallyRefunded => EventKind::Refunded,
            Self::Cancelled => EventKind::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub label: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

/// 订单金额，缺失的可选项按 0 处理
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub gross_cents: i64,
    pub fees_cents: i64,
    pub net_cents: i64,
    pub tax_cents: i64,
}

/// 载荷中携带的退款信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundInfo {
    /// 平台退款 / 交易 ID；缺失时金额按累计退款总额处理
    pub refund_id: Option<String>,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOrder {
    pub platform: Platform,
    pub external_event_id: String,
    pub external_order_id: String,
    pub lifecycle: OrderLifecycle,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub line_items: Vec<LineItem>,
    pub totals: OrderTotals,
    pub currency: String,
    pub purchase_date: Option<DateTime<Utc>>,
    pub source_updated_at: Option<DateTime<Utc>>,
    pub refund: Option<RefundInfo>,
    pub raw: serde_json::Value,
}

impl NormalizedOrder {
    /// 票数为各明细数量之和；归一化阶段已拒绝溢出的合计，这里饱和到上限
    pub fn ticket_quantity(&self) -> i32 {
        self.line_items
            .iter()
            .fold(0i32, |total, item| total.saturating_add(item.quantity))
    }

    /// 去重后的票种名称，按首次出现顺序以 ", " 连接
    pub fn ticket_type(&self) -> String {
        let mut labels: Vec<&str> = Vec::new();
        for item in &self.line_items {
            if !labels.contains(&item.label.as_str()) {
                labels.push(item.label.as_str());
            }
        }
        labels.join(", ")
    }
}
