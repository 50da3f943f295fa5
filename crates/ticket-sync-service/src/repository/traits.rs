//! 仓储 Trait 定义
//!
//! 服务层只依赖这些抽象。Postgres 与内存两套实现语义一致：
//! 插入以唯一键判重，更新以版本号做条件写入。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    NewWebhookLog, Platform, PlatformLink, SalesAggregate, SyncCheckpoint, TicketSale, WebhookLog,
    WebhookLogFilter,
};

/// 销售记录仓储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TicketSaleRepositoryTrait: Send + Sync {
    async fn find_by_key(&self, platform: Platform, order_id: &str) -> Result<Option<TicketSale>>;

    /// 唯一键不存在时插入，返回落库后的记录（version = 1）；已存在时返回 None
    async fn insert_if_absent(&self, sale: &TicketSale) -> Result<Option<TicketSale>>;

    /// 仅当存储中的版本等于 `sale.version` 时写入，写入后版本 +1；版本不符返回 None
    async fn update_if_version(&self, sale: &TicketSale) -> Result<Option<TicketSale>>;

    async fn list_by_event(&self, internal_event_id: Uuid) -> Result<Vec<TicketSale>>;

    /// 按平台、状态分组统计某本地活动的销售
    async fn aggregate_for_event(&self, internal_event_id: Uuid) -> Result<Vec<SalesAggregate>>;
}

/// 平台活动关联仓储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformLinkRepositoryTrait: Send + Sync {
    async fn find(&self, platform: Platform, external_event_id: &str)
    -> Result<Option<PlatformLink>>;

    async fn list_by_platform(&self, platform: Platform) -> Result<Vec<PlatformLink>>;

    async fn mark_webhook_received(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn mark_synced(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
}

/// Webhook 审计日志仓储（只追加）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebhookLogRepositoryTrait: Send + Sync {
    async fn append(&self, log: &NewWebhookLog) -> Result<WebhookLog>;

    async fn get(&self, id: i64) -> Result<Option<WebhookLog>>;

    /// 按接收时间倒序
    async fn list(&self, filter: &WebhookLogFilter) -> Result<Vec<WebhookLog>>;

    async fn count(&self, filter: &WebhookLogFilter) -> Result<i64>;
}

/// 轮询断点仓储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckpointRepositoryTrait: Send + Sync {
    async fn get(&self, platform: Platform, external_event_id: &str)
    -> Result<Option<SyncCheckpoint>>;

    async fn save(&self, platform: Platform, external_event_id: &str, next_page: i32) -> Result<()>;

    async fn clear(&self, platform: Platform, external_event_id: &str) -> Result<()>;
}
