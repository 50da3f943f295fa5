//! Webhook 审计日志模型
//!
//! 每次入站请求写入且仅写入一条，写入后不再修改。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::WebhookOutcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookLog {
    pub id: i64,
    /// 平台标识原文，未知平台也照实记录
    pub platform: String,
    pub event_type: Option<String>,
    /// 能解析为 JSON 时为原 JSON，否则为原始请求体字符串
    pub payload: serde_json::Value,
    pub signature: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    pub outcome: WebhookOutcome,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// 重放时指向原始日志
    pub replay_of: Option<i64>,
}

/// 待写入的审计日志
#[derive(Debug, Clone, PartialEq)]
pub struct NewWebhookLog {
    pub platform: String,
    pub event_type: Option<String>,
    pub payload: serde_json::Value,
    pub signature: Option<String>,
    pub received_at: DateTime<Utc>,
    pub outcome: WebhookOutcome,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub replay_of: Option<i64>,
}

impl NewWebhookLog {
    pub fn processed(&self) -> bool {
        self.outcome.is_processed()
    }
}

/// 审计日志查询条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookLogFilter {
    pub platform: Option<String>,
    pub outcome: Option<WebhookOutcome>,
    pub processed: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}
