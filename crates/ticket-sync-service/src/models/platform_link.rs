//! 平台活动关联与同步断点

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Platform;

/// 平台活动 → 本地活动的关联
///
/// 由活动管理模块维护，本服务只读取并更新同步时间戳。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlatformLink {
    pub id: i64,
    pub internal_event_id: Uuid,
    pub platform: Platform,
    pub external_event_id: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub webhook_last_received: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 轮询对账的分页断点
///
/// 每完成一页写入下一页页码，整次运行结束后清除；运行被取消时下次从断点继续。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncCheckpoint {
    pub platform: Platform,
    pub external_event_id: String,
    pub next_page: i32,
    pub updated_at: DateTime<Utc>,
}
