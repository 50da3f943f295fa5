//! 内存存储
//!
//! 基于 DashMap 的仓储实现，语义与 Postgres 版一致（唯一键判重、版本号 CAS），
//! 用于本地运行和端到端测试。

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use uuid::Uuid;

use super::traits::{
    CheckpointRepositoryTrait, PlatformLinkRepositoryTrait, TicketSaleRepositoryTrait,
    WebhookLogRepositoryTrait,
};
use crate::error::{IngestError, Result};
use crate::models::{
    NewWebhookLog, Platform, PlatformLink, SalesAggregate, SyncCheckpoint, TicketSale, WebhookLog,
    WebhookLogFilter,
};

type Key = (Platform, String);

#[derive(Debug, Default)]
pub struct InMemoryStore {
    sales: DashMap<Key, TicketSale>,
    links: DashMap<Key, PlatformLink>,
    checkpoints: DashMap<Key, SyncCheckpoint>,
    logs: RwLock<Vec<WebhookLog>>,
    next_sale_id: AtomicI64,
    next_link_id: AtomicI64,
    /// 打开后销售记录的读写都返回 TransientStore
    fail_sales: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记平台活动关联（生产环境由活动管理模块写入）
    pub fn link(
        &self,
        platform: Platform,
        external_event_id: &str,
        internal_event_id: Uuid,
    ) -> PlatformLink {
        let link = PlatformLink {
            id: self.next_link_id.fetch_add(1, Ordering::SeqCst) + 1,
            internal_event_id,
            platform,
            external_event_id: external_event_id.to_string(),
            last_sync_at: None,
            webhook_last_received: None,
            created_at: Utc::now(),
        };
        self.links
            .insert((platform, external_event_id.to_string()), link.clone());
        link
    }

    pub fn set_fail_sales(&self, fail: bool) {
        self.fail_sales.store(fail, Ordering::SeqCst);
    }

    pub fn sales(&self) -> Vec<TicketSale> {
        let mut sales: Vec<TicketSale> = self.sales.iter().map(|e| e.value().clone()).collect();
        sales.sort_by_key(|s| s.id);
        sales
    }

    /// 按写入顺序返回全部审计日志
    pub fn logs(&self) -> Vec<WebhookLog> {
        self.logs.read().clone()
    }

    pub fn link_for(&self, platform: Platform, external_event_id: &str) -> Option<PlatformLink> {
        self.links
            .get(&(platform, external_event_id.to_string()))
            .map(|e| e.value().clone())
    }

    fn check_sales_available(&self) -> Result<()> {
        if self.fail_sales.load(Ordering::SeqCst) {
            return Err(IngestError::TransientStore("内存存储已被置为不可用".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TicketSaleRepositoryTrait for InMemoryStore {
    async fn find_by_key(&self, platform: Platform, order_id: &str) -> Result<Option<TicketSale>> {
        self.check_sales_available()?;
        Ok(self
            .sales
            .get(&(platform, order_id.to_string()))
            .map(|e| e.value().clone()))
    }

    async fn insert_if_absent(&self, sale: &TicketSale) -> Result<Option<TicketSale>> {
        self.check_sales_available()?;
        match self
            .sales
            .entry((sale.platform, sale.platform_order_id.clone()))
        {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let mut stored = sale.clone();
                stored.id = self.next_sale_id.fetch_add(1, Ordering::SeqCst) + 1;
                stored.version = 1;
                stored.created_at = now;
                stored.updated_at = now;
                slot.insert(stored.clone());
                Ok(Some(stored))
            }
        }
    }

    async fn update_if_version(&self, sale: &TicketSale) -> Result<Option<TicketSale>> {
        self.check_sales_available()?;
        let Some(mut current) = self
            .sales
            .get_mut(&(sale.platform, sale.platform_order_id.clone()))
        else {
            return Ok(None);
        };

        if current.id != sale.id || current.version != sale.version {
            return Ok(None);
        }

        let created_at = current.created_at;
        let mut stored = sale.clone();
        stored.version = current.version + 1;
        stored.created_at = created_at;
        stored.updated_at = Utc::now();
        *current = stored.clone();
        Ok(Some(stored))
    }

    async fn list_by_event(&self, internal_event_id: Uuid) -> Result<Vec<TicketSale>> {
        self.check_sales_available()?;
        Ok(self
            .sales()
            .into_iter()
            .filter(|s| s.internal_event_id == internal_event_id)
            .collect())
    }

    async fn aggregate_for_event(&self, internal_event_id: Uuid) -> Result<Vec<SalesAggregate>> {
        self.check_sales_available()?;
        let mut groups: Vec<SalesAggregate> = Vec::new();
        for sale in self.list_by_event(internal_event_id).await? {
            let idx = match groups
                .iter()
                .position(|g| g.platform == sale.platform && g.status == sale.status)
            {
                Some(idx) => idx,
                None => {
                    groups.push(SalesAggregate {
                        platform: sale.platform,
                        status: sale.status,
                        orders: 0,
                        tickets: 0,
                        gross_cents: 0,
                        fees_cents: 0,
                        refund_cents: 0,
                    });
                    groups.len() - 1
                }
            };
            let group = &mut groups[idx];
            group.orders += 1;
            group.tickets += i64::from(sale.ticket_quantity);
            group.gross_cents += sale.total_amount_cents;
            group.fees_cents += sale.fees_cents;
            group.refund_cents += sale.refund_amount_cents;
        }
        groups.sort_by(|a, b| {
            (a.platform.as_str(), a.status.as_str()).cmp(&(b.platform.as_str(), b.status.as_str()))
        });
        Ok(groups)
    }
}

#[async_trait]
impl PlatformLinkRepositoryTrait for InMemoryStore {
    async fn find(
        &self,
        platform: Platform,
        external_event_id: &str,
    ) -> Result<Option<PlatformLink>> {
        Ok(self.link_for(platform, external_event_id))
    }

    async fn list_by_platform(&self, platform: Platform) -> Result<Vec<PlatformLink>> {
        let mut links: Vec<PlatformLink> = self
            .links
            .iter()
            .filter(|e| e.value().platform == platform)
            .map(|e| e.value().clone())
            .collect();
        links.sort_by_key(|l| l.id);
        Ok(links)
    }

    async fn mark_webhook_received(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut link) = self.links.iter_mut().find(|e| e.value().id == id) {
            link.webhook_last_received = Some(at);
        }
        Ok(())
    }

    async fn mark_synced(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut link) = self.links.iter_mut().find(|e| e.value().id == id) {
            link.last_sync_at = Some(at);
        }
        Ok(())
    }
}

fn matches_filter(log: &WebhookLog, filter: &WebhookLogFilter) -> bool {
    filter.platform.as_ref().is_none_or(|p| &log.platform == p)
        && filter.outcome.is_none_or(|o| log.outcome == o)
        && filter.processed.is_none_or(|p| log.processed == p)
}

#[async_trait]
impl WebhookLogRepositoryTrait for InMemoryStore {
    async fn append(&self, log: &NewWebhookLog) -> Result<WebhookLog> {
        let mut logs = self.logs.write();
        let row = WebhookLog {
            id: logs.len() as i64 + 1,
            platform: log.platform.clone(),
            event_type: log.event_type.clone(),
            payload: log.payload.clone(),
            signature: log.signature.clone(),
            received_at: log.received_at,
            processed: log.processed(),
            outcome: log.outcome,
            error_code: log.error_code.clone(),
            error_message: log.error_message.clone(),
            replay_of: log.replay_of,
        };
        logs.push(row.clone());
        Ok(row)
    }

    async fn get(&self, id: i64) -> Result<Option<WebhookLog>> {
        Ok(self.logs.read().iter().find(|l| l.id == id).cloned())
    }

    async fn list(&self, filter: &WebhookLogFilter) -> Result<Vec<WebhookLog>> {
        let logs = self.logs.read();
        let mut rows: Vec<WebhookLog> = logs
            .iter()
            .filter(|l| matches_filter(l, filter))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.received_at.cmp(&a.received_at).then(b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn count(&self, filter: &WebhookLogFilter) -> Result<i64> {
        Ok(self
            .logs
            .read()
            .iter()
            .filter(|l| matches_filter(l, filter))
            .count() as i64)
    }
}

#[async_trait]
impl CheckpointRepositoryTrait for InMemoryStore {
    async fn get(
        &self,
        platform: Platform,
        external_event_id: &str,
    ) -> Result<Option<SyncCheckpoint>> {
        Ok(self
            .checkpoints
            .get(&(platform, external_event_id.to_string()))
            .map(|e| e.value().clone()))
    }

    async fn save(&self, platform: Platform, external_event_id: &str, next_page: i32) -> Result<()> {
        self.checkpoints.insert(
            (platform, external_event_id.to_string()),
            SyncCheckpoint {
                platform,
                external_event_id: external_event_id.to_string(),
                next_page,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn clear(&self, platform: Platform, external_event_id: &str) -> Result<()> {
        self.checkpoints
            .remove(&(platform, external_event_id.to_string()));
        Ok(())
    }
}
