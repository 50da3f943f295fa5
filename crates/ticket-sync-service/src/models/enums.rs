//! 枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 票务平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum Platform {
    Humanitix,
    Eventbrite,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Humanitix, Platform::Eventbrite];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Humanitix => "humanitix",
            Self::Eventbrite => "eventbrite",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    /// 大小写不敏感，忽略首尾空白
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "humanitix" => Ok(Self::Humanitix),
            "eventbrite" => Ok(Self::Eventbrite),
            other => Err(other.to_string()),
        }
    }
}

/// 销售记录状态
///
/// paid → partial_refund → refunded；任何非终态都可以 → cancelled。
/// refunded 与 cancelled 为终态，之后到达的付款类事件不会改变状态。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum SaleStatus {
    #[default]
    Paid,
    PartialRefund,
    Refunded,
    Cancelled,
}

impl SaleStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Refunded | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::PartialRefund => "partial_refund",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Webhook 处理结果（写入审计日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// 新建或更新了销售记录
    Applied,
    /// 与已存储状态一致，未写入
    Unchanged,
    /// 有意跳过（订单未支付、事件过期等）
    Skipped,
    /// 平台活动未关联本地活动，可在补充关联后重放
    MappingNotFound,
    /// 不关心的事件类型
    Ignored,
    /// 平台未知或签名错误
    Rejected,
    /// 校验、存储或上游失败
    Failed,
}

impl WebhookOutcome {
    /// 是否视为已处理完成
    pub fn is_processed(&self) -> bool {
        matches!(
            self,
            Self::Applied | Self::Unchanged | Self::Skipped | Self::Ignored
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Unchanged => "unchanged",
            Self::Skipped => "skipped",
            Self::MappingNotFound => "mapping_not_found",
            Self::Ignored => "ignored",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WebhookOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
