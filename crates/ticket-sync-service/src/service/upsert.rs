//! 幂等写入引擎
//!
//! 读取 → `decide` → 条件写入。写入冲突（唯一键已存在或版本号不符）时
//! 重新读取并重新决策，超过上限返回可重试的 `ConcurrencyConflict`。

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use ticket_shared::observability::metrics;

use super::state_machine::{Decision, decide};
use crate::error::{IngestError, Result};
use crate::models::{EventKind, NormalizedOrder, TicketSale};
use crate::repository::TicketSaleRepositoryTrait;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Created,
    Updated,
    Unchanged,
    Skipped,
}

impl WriteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WriteResult {
    pub outcome: WriteOutcome,
    /// 写入后的记录；未写入时为已存储的记录（若存在）
    pub sale: Option<TicketSale>,
    /// 未写入的原因
    pub reason: Option<&'static str>,
}

pub struct UpsertEngine {
    sales: Arc<dyn TicketSaleRepositoryTrait>,
    max_attempts: u32,
}

impl UpsertEngine {
    pub fn new(sales: Arc<dyn TicketSaleRepositoryTrait>) -> Self {
        Self {
            sales,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[instrument(
        skip(self, order),
        fields(platform = %order.platform, order_id = %order.external_order_id)
    )]
    pub async fn apply(
        &self,
        order: &NormalizedOrder,
        kind: EventKind,
        internal_event_id: Uuid,
    ) -> Result<WriteResult> {
        let platform = order.platform.as_str();

        for attempt in 1..=self.max_attempts {
            let existing = self
                .sales
                .find_by_key(order.platform, &order.external_order_id)
                .await?;

            let decision = decide(existing.as_ref(), order, kind, internal_event_id, Utc::now());
            let result = match decision {
                Decision::Insert(sale) => self.sales.insert_if_absent(&sale).await?.map(|saved| {
                    info!(sale_id = saved.id, status = %saved.status.as_str(), "销售记录已创建");
                    WriteResult {
                        outcome: WriteOutcome::Created,
                        sale: Some(saved),
                        reason: None,
                    }
                }),
                Decision::Update(sale) => self.sales.update_if_version(&sale).await?.map(|saved| {
                    info!(
                        sale_id = saved.id,
                        status = %saved.status.as_str(),
                        version = saved.version,
                        "销售记录已更新"
                    );
                    WriteResult {
                        outcome: WriteOutcome::Updated,
                        sale: Some(saved),
                        reason: None,
                    }
                }),
                Decision::Unchanged(reason) => {
                    debug!(reason = reason.as_str(), "销售记录无变化");
                    Some(WriteResult {
                        outcome: WriteOutcome::Unchanged,
                        sale: existing,
                        reason: Some(reason.as_str()),
                    })
                }
                Decision::Skip(reason) => {
                    info!(reason = reason.as_str(), "跳过写入");
                    Some(WriteResult {
                        outcome: WriteOutcome::Skipped,
                        sale: existing,
                        reason: Some(reason.as_str()),
                    })
                }
            };

            if let Some(result) = result {
                metrics::record_sale_write(platform, result.outcome.as_str());
                return Ok(result);
            }

            metrics::record_write_conflict(platform);
            warn!(attempt, "写入冲突，重新读取后重试");
        }

        Err(IngestError::ConcurrencyConflict {
            platform: platform.to_string(),
            order_id: order.external_order_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SaleStatus;
    use crate::repository::MockTicketSaleRepositoryTrait;
    use crate::test_support::{EVENT_ID, sample_order, sample_sale};

    fn stored_sale() -> TicketSale {
        let mut sale = sample_sale("o1");
        sale.id = 7;
        sale.version = 3;
        sale
    }

    #[tokio::test]
    async fn test_insert_when_absent() {
        let mut repo = MockTicketSaleRepositoryTrait::new();
        repo.expect_find_by_key().returning(|_, _| Ok(None));
        repo.expect_insert_if_absent().times(1).returning(|sale| {
            let mut saved = sale.clone();
            saved.id = 1;
            saved.version = 1;
            Ok(Some(saved))
        });

        let engine = UpsertEngine::new(Arc::new(repo));
        let result = engine
            .apply(&sample_order("o1"), EventKind::Paid, EVENT_ID)
            .await
            .unwrap();

        assert_eq!(result.outcome, WriteOutcome::Created);
        assert_eq!(result.sale.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_unchanged_performs_no_write() {
        let mut repo = MockTicketSaleRepositoryTrait::new();
        repo.expect_find_by_key()
            .returning(|_, _| Ok(Some(stored_sale())));
        repo.expect_insert_if_absent().never();
        repo.expect_update_if_version().never();

        let engine = UpsertEngine::new(Arc::new(repo));
        let result = engine
            .apply(&sample_order("o1"), EventKind::Paid, EVENT_ID)
            .await
            .unwrap();

        assert_eq!(result.outcome, WriteOutcome::Unchanged);
        assert_eq!(result.reason, Some("same_state"));
    }

    #[tokio::test]
    async fn test_lost_insert_race_becomes_update() {
        let mut repo = MockTicketSaleRepositoryTrait::new();
        let mut seq = mockall::Sequence::new();
        repo.expect_find_by_key()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(None));
        repo.expect_insert_if_absent()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        repo.expect_find_by_key()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Some(stored_sale())));
        repo.expect_update_if_version()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|sale| sale.version == 3 && sale.status == SaleStatus::Refunded)
            .returning(|sale| {
                let mut saved = sale.clone();
                saved.version += 1;
                Ok(Some(saved))
            });

        let engine = UpsertEngine::new(Arc::new(repo));
        let result = engine
            .apply(&sample_order("o1"), EventKind::Refunded, EVENT_ID)
            .await
            .unwrap();

        assert_eq!(result.outcome, WriteOutcome::Updated);
        assert_eq!(result.sale.unwrap().version, 4);
    }

    #[tokio::test]
    async fn test_conflict_exhaustion_is_retryable() {
        let mut repo = MockTicketSaleRepositoryTrait::new();
        repo.expect_find_by_key()
            .times(3)
            .returning(|_, _| Ok(Some(stored_sale())));
        repo.expect_update_if_version()
            .times(3)
            .returning(|_| Ok(None));

        let engine = UpsertEngine::new(Arc::new(repo)).with_max_attempts(3);
        let err = engine
            .apply(&sample_order("o1"), EventKind::Cancelled, EVENT_ID)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::ConcurrencyConflict { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let mut repo = MockTicketSaleRepositoryTrait::new();
        repo.expect_find_by_key()
            .returning(|_, _| Err(IngestError::TransientStore("down".into())));

        let engine = UpsertEngine::new(Arc::new(repo));
        let err = engine
            .apply(&sample_order("o1"), EventKind::Paid, EVENT_ID)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::TransientStore(_)));
    }
}
