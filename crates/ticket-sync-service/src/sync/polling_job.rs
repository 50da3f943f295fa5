//! 轮询对账任务
//!
//! 对每个已关联的平台活动分页拉取完整订单列表，经同一条 归一化 → 幂等写入
//! 链路写回，用于修复丢失或失败的 webhook 造成的偏差。
//!
//! - 每完成一页写入断点，运行被取消或出错后下次从断点继续
//! - 单个订单失败只计数，不中断本页
//! - 完成后对比本地与平台的订单数 / 票数，只报告不自动修正

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use ticket_shared::observability::metrics;

use super::client::{ExternalEvent, PlatformApiClient};
use crate::error::{IngestError, Result};
use crate::models::{Platform, PlatformLink};
use crate::normalizer::{NormalizerRegistry, OrderHint, PlatformNormalizer};
use crate::repository::{CheckpointRepositoryTrait, TicketSaleRepositoryTrait};
use crate::service::{MappingResolver, UpsertEngine, WriteOutcome};

pub const DEFAULT_MAX_PAGES: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// 收到停机信号，断点保留
    Cancelled,
    /// 达到单次运行页数上限，断点保留
    PageLimit,
}

/// 本地与平台统计不一致
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub local_orders: i64,
    /// 断点续跑且平台未报告总数时无法得知
    pub remote_orders: Option<i64>,
    /// 平台列出但归一化或写入失败的订单数
    pub failed_orders: u32,
    /// 仅在本次运行覆盖了完整列表时比较票数
    pub local_tickets: Option<i64>,
    pub remote_tickets: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub platform: Platform,
    pub external_event_id: String,
    pub internal_event_id: Uuid,
    pub status: RunStatus,
    /// 断点续跑时的起始页
    pub resumed_from: Option<u32>,
    pub pages: u32,
    pub created: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub skipped: u32,
    pub failed: u32,
    pub discrepancy: Option<Discrepancy>,
}

impl SyncReport {
    fn new(link: &PlatformLink) -> Self {
        Self {
            platform: link.platform,
            external_event_id: link.external_event_id.clone(),
            internal_event_id: link.internal_event_id,
            status: RunStatus::Completed,
            resumed_from: None,
            pages: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            failed: 0,
            discrepancy: None,
        }
    }

    fn count(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Created => self.created += 1,
            WriteOutcome::Updated => self.updated += 1,
            WriteOutcome::Unchanged => self.unchanged += 1,
            WriteOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// 一轮全量运行的汇总
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncRun {
    pub reports: Vec<SyncReport>,
    pub failed_links: Vec<String>,
    /// 平台上存在但尚未关联本地活动的活动
    pub unlinked_events: Vec<(Platform, ExternalEvent)>,
}

pub struct PollingJob {
    registry: Arc<NormalizerRegistry>,
    resolver: Arc<MappingResolver>,
    engine: Arc<UpsertEngine>,
    sales: Arc<dyn TicketSaleRepositoryTrait>,
    checkpoints: Arc<dyn CheckpointRepositoryTrait>,
    clients: HashMap<Platform, Arc<dyn PlatformApiClient>>,
    max_pages: u32,
}

impl PollingJob {
    pub fn new(
        registry: Arc<NormalizerRegistry>,
        resolver: Arc<MappingResolver>,
        engine: Arc<UpsertEngine>,
        sales: Arc<dyn TicketSaleRepositoryTrait>,
        checkpoints: Arc<dyn CheckpointRepositoryTrait>,
    ) -> Self {
        Self {
            registry,
            resolver,
            engine,
            sales,
            checkpoints,
            clients: HashMap::new(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_client(mut self, client: Arc<dyn PlatformApiClient>) -> Self {
        self.clients.insert(client.platform(), client);
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.clients.keys().copied().collect();
        platforms.sort_by_key(|p| p.as_str());
        platforms
    }

    fn client(&self, platform: Platform) -> Result<&Arc<dyn PlatformApiClient>> {
        self.clients.get(&platform).ok_or_else(|| IngestError::Upstream {
            platform: platform.to_string(),
            message: "未配置平台 API 客户端".to_string(),
        })
    }

    /// 运维触发的单个平台活动重新同步
    pub async fn resync(&self, platform: Platform, external_event_id: &str) -> Result<SyncReport> {
        let link = self
            .resolver
            .find(platform, external_event_id)
            .await?
            .ok_or_else(|| IngestError::MappingNotFound {
                platform: platform.to_string(),
                external_event_id: external_event_id.to_string(),
            })?;

        // 不会被取消的运行
        let (_tx, shutdown) = watch::channel(false);
        self.run_link(&link, &shutdown).await
    }

    /// 对全部已配置平台的全部关联运行一轮
    pub async fn run_all(&self, shutdown: &watch::Receiver<bool>) -> SyncRun {
        let mut run = SyncRun::default();

        for platform in self.platforms() {
            match self.discover_unlinked(platform).await {
                Ok(events) => run
                    .unlinked_events
                    .extend(events.into_iter().map(|e| (platform, e))),
                Err(e) => warn!(platform = %platform, error = %e, "拉取平台活动列表失败"),
            }

            let links = match self.resolver.list(platform).await {
                Ok(links) => links,
                Err(e) => {
                    error!(platform = %platform, error = %e, "读取平台活动关联失败");
                    continue;
                }
            };

            for link in links {
                if *shutdown.borrow() {
                    info!("收到停机信号，停止本轮同步");
                    return run;
                }
                match self.run_link(&link, shutdown).await {
                    Ok(report) => run.reports.push(report),
                    Err(e) => {
                        error!(
                            platform = %platform,
                            external_event_id = %link.external_event_id,
                            error = %e,
                            "平台活动同步失败，断点保留"
                        );
                        run.failed_links
                            .push(format!("{}/{}", platform, link.external_event_id));
                    }
                }
            }
        }

        run
    }

    /// 同步单个平台活动
    #[instrument(
        skip(self, link, shutdown),
        fields(platform = %link.platform, external_event_id = %link.external_event_id)
    )]
    pub async fn run_link(
        &self,
        link: &PlatformLink,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<SyncReport> {
        let platform = link.platform;
        let external_event_id = link.external_event_id.as_str();
        let client = self.client(platform)?;
        let normalizer = self
            .registry
            .get(platform)
            .ok_or_else(|| IngestError::UnknownPlatform(platform.to_string()))?;

        let start_page = self
            .checkpoints
            .get(platform, external_event_id)
            .await?
            .map(|c| c.next_page.max(1) as u32)
            .unwrap_or(1);

        let mut report = SyncReport::new(link);
        if start_page > 1 {
            info!(start_page, "从断点继续同步");
            report.resumed_from = Some(start_page);
        }

        let mut page = start_page;
        let mut remote_total: Option<u64> = None;
        let mut remote_tickets: i64 = 0;

        loop {
            if *shutdown.borrow() {
                report.status = RunStatus::Cancelled;
                break;
            }
            if report.pages >= self.max_pages {
                warn!(max_pages = self.max_pages, "达到单次运行页数上限");
                report.status = RunStatus::PageLimit;
                break;
            }

            let batch = client.list_orders(external_event_id, page).await?;
            remote_total = batch.total.or(remote_total);

            for order in &batch.items {
                match self.apply_order(normalizer.as_ref(), link, order).await {
                    Ok((outcome, tickets)) => {
                        report.count(outcome);
                        if outcome != WriteOutcome::Skipped {
                            remote_tickets += i64::from(tickets);
                        }
                    }
                    Err(e) => {
                        report.failed += 1;
                        warn!(page, code = e.code(), error = %e, "订单同步失败，继续处理本页其余订单");
                    }
                }
            }

            metrics::record_sync_page(platform.as_str(), batch.items.len());
            report.pages += 1;

            if !batch.has_more {
                break;
            }
            page += 1;
            self.checkpoints
                .save(platform, external_event_id, page as i32)
                .await?;
        }

        if report.status == RunStatus::Completed {
            self.checkpoints.clear(platform, external_event_id).await?;
            self.resolver.mark_synced(link).await;
            report.discrepancy = self
                .compare(link, &report, remote_total, remote_tickets)
                .await?;
        }

        info!(
            status = ?report.status,
            pages = report.pages,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            failed = report.failed,
            "平台活动同步结束"
        );
        Ok(report)
    }

    /// 返回写入结果与订单票数
    async fn apply_order(
        &self,
        normalizer: &dyn PlatformNormalizer,
        link: &PlatformLink,
        order: &Value,
    ) -> Result<(WriteOutcome, i32)> {
        let hint = OrderHint::for_event(link.external_event_id.clone());
        let order = normalizer.normalize_order(order, &hint)?;
        let kind = order.lifecycle.as_event_kind();
        let written = self
            .engine
            .apply(&order, kind, link.internal_event_id)
            .await?;
        Ok((written.outcome, order.ticket_quantity()))
    }

    async fn compare(
        &self,
        link: &PlatformLink,
        report: &SyncReport,
        remote_total: Option<u64>,
        remote_tickets: i64,
    ) -> Result<Option<Discrepancy>> {
        let (local_orders, local_tickets) = self
            .sales
            .aggregate_for_event(link.internal_event_id)
            .await?
            .iter()
            .filter(|g| g.platform == link.platform)
            .fold((0i64, 0i64), |(orders, tickets), g| {
                (orders + g.orders, tickets + g.tickets)
            });

        let full_listing = report.resumed_from.is_none();
        // 平台未报告总数时，以本次列出的订单数作为平台侧订单数；写入失败的订单同样计入
        let remote_orders = match remote_total {
            Some(total) => Some(total as i64),
            None if full_listing => Some(i64::from(
                report.created + report.updated + report.unchanged + report.failed,
            )),
            None => None,
        };

        let orders_match = remote_orders.is_none_or(|remote| remote == local_orders);
        let tickets_match = !full_listing || local_tickets == remote_tickets;
        if report.failed == 0 && orders_match && tickets_match {
            return Ok(None);
        }

        let discrepancy = Discrepancy {
            local_orders,
            remote_orders,
            failed_orders: report.failed,
            local_tickets: full_listing.then_some(local_tickets),
            remote_tickets: full_listing.then_some(remote_tickets),
        };
        metrics::record_sync_discrepancy(link.platform.as_str());
        warn!(
            local_orders,
            remote_orders = ?remote_orders,
            failed_orders = report.failed,
            local_tickets,
            remote_tickets,
            "本地销售统计与平台不一致"
        );
        Ok(Some(discrepancy))
    }

    /// 平台上尚未关联本地活动的活动
    async fn discover_unlinked(&self, platform: Platform) -> Result<Vec<ExternalEvent>> {
        let client = self.client(platform)?;
        let linked: Vec<String> = self
            .resolver
            .list(platform)
            .await?
            .into_iter()
            .map(|l| l.external_event_id)
            .collect();

        let mut unlinked = Vec::new();
        let mut page = 1;
        loop {
            let batch = client.list_events(page).await?;
            unlinked.extend(
                batch
                    .items
                    .into_iter()
                    .filter(|event| !linked.contains(&event.id)),
            );
            if !batch.has_more || page >= self.max_pages {
                break;
            }
            page += 1;
        }

        for event in &unlinked {
            info!(
                platform = %platform,
                external_event_id = %event.id,
                name = event.name.as_deref().unwrap_or(""),
                "发现未关联的平台活动"
            );
        }
        Ok(unlinked)
    }
}
