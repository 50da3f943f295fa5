//! 销售记录状态机
//!
//! `decide` 根据已存储记录与归一化订单决定本次写入，纯函数。
//!
//! ```text
//! (无) ──付款──▶ paid ──退款──▶ partial_refund ──退款──▶ refunded
//!                 │                   │
//!                 └──────取消─────────┴──────────▶ cancelled
//! ```
//!
//! refunded / cancelled 为终态，之后的付款类事件不再改变记录。

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use super::reconciler::{apply_cancel, apply_refund, clamp_refund};
use crate::models::{EventKind, NormalizedOrder, OrderLifecycle, RefundInfo, SaleStatus, TicketSale};

/// 本次事件对存储的操作
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Insert(TicketSale),
    /// 携带读取时的 version，由存储层做 CAS
    Update(TicketSale),
    Unchanged(UnchangedReason),
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnchangedReason {
    SameState,
    /// 平台修改时间早于已存储的版本
    Stale,
    /// 记录已处于终态
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 订单尚未支付
    NotPaid,
    Ignored,
}

impl UnchangedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SameState => "same_state",
            Self::Stale => "stale",
            Self::Terminal => "terminal",
        }
    }
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotPaid => "not_paid",
            Self::Ignored => "ignored",
        }
    }
}

/// 订单本身已是退款 / 取消状态时，以订单状态为准
///
/// 部分退款只有在载荷带有金额时才按退款处理，否则仍走付款类更新。
fn effective_kind(kind: EventKind, order: &NormalizedOrder) -> EventKind {
    match (kind, order.lifecycle) {
        (EventKind::Paid, OrderLifecycle::Refunded) => EventKind::Refunded,
        (EventKind::Paid, OrderLifecycle::PartiallyRefunded) if order.refund.is_some() => {
            EventKind::Refunded
        }
        (EventKind::Paid, OrderLifecycle::Cancelled) => EventKind::Cancelled,
        _ => kind,
    }
}

/// 由订单构造一条全新的销售记录（未落库，id/version 为 0）
pub fn sale_from_order(
    order: &NormalizedOrder,
    internal_event_id: Uuid,
    now: DateTime<Utc>,
) -> TicketSale {
    TicketSale {
        id: 0,
        internal_event_id,
        platform: order.platform,
        platform_order_id: order.external_order_id.clone(),
        customer_name: order.customer_name.clone(),
        customer_email: order.customer_email.clone(),
        ticket_quantity: order.ticket_quantity(),
        ticket_type: order.ticket_type(),
        total_amount_cents: order.totals.gross_cents,
        fees_cents: order.totals.fees_cents,
        net_amount_cents: order.totals.net_cents,
        tax_cents: order.totals.tax_cents,
        currency: order.currency.clone(),
        status: SaleStatus::Paid,
        refund_amount_cents: 0,
        refund_date: None,
        purchase_date: order.purchase_date,
        raw_data: order.raw.clone(),
        applied_refund_ids: Vec::new(),
        source_updated_at: order.source_updated_at,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}

fn is_stale(existing: &TicketSale, order: &NormalizedOrder) -> bool {
    matches!(
        (order.source_updated_at, existing.source_updated_at),
        (Some(incoming), Some(stored)) if incoming < stored
    )
}

/// 退款金额：未携带金额的全额退款按订单总额计；部分退款金额未知时返回 None
fn refund_amount(order: &NormalizedOrder, total_cents: i64) -> Option<RefundInfo> {
    match (&order.refund, order.lifecycle) {
        (Some(refund), _) => Some(refund.clone()),
        (None, OrderLifecycle::PartiallyRefunded) => None,
        (None, _) => Some(RefundInfo {
            refund_id: None,
            amount_cents: total_cents,
        }),
    }
}

pub fn decide(
    existing: Option<&TicketSale>,
    order: &NormalizedOrder,
    kind: EventKind,
    internal_event_id: Uuid,
    now: DateTime<Utc>,
) -> Decision {
    match effective_kind(kind, order) {
        EventKind::Ignored => Decision::Skip(SkipReason::Ignored),
        EventKind::Paid => decide_paid(existing, order, internal_event_id, now),
        EventKind::Refunded => decide_adjustment(existing, order, internal_event_id, now, |sale| {
            match refund_amount(order, sale.total_amount_cents) {
                Some(refund) => apply_refund(sale, &refund, now),
                None => warn!(
                    platform = %order.platform,
                    order_id = %order.external_order_id,
                    "部分退款未携带金额，跳过退款"
                ),
            }
        }),
        EventKind::Cancelled => decide_adjustment(existing, order, internal_event_id, now, |sale| {
            apply_cancel(sale, order.refund.as_ref(), now);
        }),
    }
}

fn decide_paid(
    existing: Option<&TicketSale>,
    order: &NormalizedOrder,
    internal_event_id: Uuid,
    now: DateTime<Utc>,
) -> Decision {
    if order.lifecycle == OrderLifecycle::Unpaid {
        return Decision::Skip(SkipReason::NotPaid);
    }

    let fresh = sale_from_order(order, internal_event_id, now);
    let Some(existing) = existing else {
        return Decision::Insert(fresh);
    };

    if existing.status.is_terminal() {
        return Decision::Unchanged(UnchangedReason::Terminal);
    }
    if is_stale(existing, order) {
        return Decision::Unchanged(UnchangedReason::Stale);
    }

    // 票数、金额整体替换为最新事件的值；退款相关字段沿用已存储记录
    let mut next = TicketSale {
        id: existing.id,
        version: existing.version,
        created_at: existing.created_at,
        updated_at: existing.updated_at,
        status: existing.status,
        refund_amount_cents: existing.refund_amount_cents,
        refund_date: existing.refund_date,
        applied_refund_ids: existing.applied_refund_ids.clone(),
        source_updated_at: order.source_updated_at.or(existing.source_updated_at),
        ..fresh
    };
    clamp_refund(&mut next);

    if next.same_state(existing) {
        Decision::Unchanged(UnchangedReason::SameState)
    } else {
        Decision::Update(next)
    }
}

fn decide_adjustment(
    existing: Option<&TicketSale>,
    order: &NormalizedOrder,
    internal_event_id: Uuid,
    now: DateTime<Utc>,
    adjust: impl FnOnce(&mut TicketSale),
) -> Decision {
    // 退款 / 取消先于付款事件到达时，按订单内容直接建档
    let Some(existing) = existing else {
        let mut sale = sale_from_order(order, internal_event_id, now);
        adjust(&mut sale);
        return Decision::Insert(sale);
    };

    // 全额退款后重复退款不会产生变化，取消也不再生效
    if existing.status == SaleStatus::Refunded {
        return Decision::Unchanged(UnchangedReason::Terminal);
    }

    let mut next = existing.clone();
    adjust(&mut next);
    if next.same_state(existing) {
        return Decision::Unchanged(UnchangedReason::SameState);
    }
    Decision::Update(finish_adjustment(next, existing, order))
}

fn finish_adjustment(
    mut next: TicketSale,
    existing: &TicketSale,
    order: &NormalizedOrder,
) -> TicketSale {
    next.raw_data = order.raw.clone();
    next.source_updated_at = match (existing.source_updated_at, order.source_updated_at) {
        (Some(stored), Some(incoming)) => Some(stored.max(incoming)),
        (stored, incoming) => incoming.or(stored),
    };
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::test_support::{EVENT_ID, sample_order};

    fn stored(decision: Decision) -> TicketSale {
        match decision {
            Decision::Insert(mut sale) | Decision::Update(mut sale) => {
                sale.id = sale.id.max(1);
                sale.version += 1;
                sale
            }
            other => panic!("expected a write, got {:?}", other),
        }
    }

    #[test]
    fn test_first_paid_event_inserts() {
        let order = sample_order("o1");
        let decision = decide(None, &order, EventKind::Paid, EVENT_ID, Utc::now());

        let Decision::Insert(sale) = decision else {
            panic!("expected insert");
        };
        assert_eq!(sale.platform_order_id, "o1");
        assert_eq!(sale.ticket_quantity, 2);
        assert_eq!(sale.total_amount_cents, 5000);
        assert_eq!(sale.status, SaleStatus::Paid);
        assert_eq!(sale.internal_event_id, EVENT_ID);
    }

    #[test]
    fn test_identical_event_is_unchanged() {
        let order = sample_order("o1");
        let sale = stored(decide(None, &order, EventKind::Paid, EVENT_ID, Utc::now()));

        let decision = decide(Some(&sale), &order, EventKind::Paid, EVENT_ID, Utc::now());
        assert_eq!(decision, Decision::Unchanged(UnchangedReason::SameState));
    }

    #[test]
    fn test_quantity_is_replaced_not_accumulated() {
        let order = sample_order("o1");
        let sale = stored(decide(None, &order, EventKind::Paid, EVENT_ID, Utc::now()));

        let mut updated = sample_order("o1");
        updated.line_items[0].quantity = 3;
        let Decision::Update(next) =
            decide(Some(&sale), &updated, EventKind::Paid, EVENT_ID, Utc::now())
        else {
            panic!("expected update");
        };
        assert_eq!(next.ticket_quantity, 3);
        assert_eq!(next.version, sale.version);
        assert_eq!(next.created_at, sale.created_at);
    }

    #[test]
    fn test_unpaid_order_is_skipped() {
        let mut order = sample_order("o1");
        order.lifecycle = OrderLifecycle::Unpaid;
        assert_eq!(
            decide(None, &order, EventKind::Paid, EVENT_ID, Utc::now()),
            Decision::Skip(SkipReason::NotPaid)
        );
    }

    #[test]
    fn test_terminal_state_ignores_paid_events() {
        let order = sample_order("o1");
        let mut sale = stored(decide(None, &order, EventKind::Paid, EVENT_ID, Utc::now()));

        for status in [SaleStatus::Refunded, SaleStatus::Cancelled] {
            sale.status = status;
            let mut late = sample_order("o1");
            late.line_items[0].quantity = 9;
            assert_eq!(
                decide(Some(&sale), &late, EventKind::Paid, EVENT_ID, Utc::now()),
                Decision::Unchanged(UnchangedReason::Terminal)
            );
        }
    }

    #[test]
    fn test_stale_event_is_ignored() {
        let now = Utc::now();
        let mut order = sample_order("o1");
        order.source_updated_at = Some(now);
        let sale = stored(decide(None, &order, EventKind::Paid, EVENT_ID, now));

        let mut older = sample_order("o1");
        older.source_updated_at = Some(now - Duration::minutes(5));
        older.line_items[0].quantity = 1;
        assert_eq!(
            decide(Some(&sale), &older, EventKind::Paid, EVENT_ID, now),
            Decision::Unchanged(UnchangedReason::Stale)
        );
    }

    #[test]
    fn test_paid_update_keeps_partial_refund() {
        let order = sample_order("o1");
        let mut sale = stored(decide(None, &order, EventKind::Paid, EVENT_ID, Utc::now()));
        sale.status = SaleStatus::PartialRefund;
        sale.refund_amount_cents = 1000;
        sale.applied_refund_ids = vec!["r1".into()];

        let mut updated = sample_order("o1");
        updated.customer_name = "Grace Hopper".into();
        let Decision::Update(next) =
            decide(Some(&sale), &updated, EventKind::Paid, EVENT_ID, Utc::now())
        else {
            panic!("expected update");
        };
        assert_eq!(next.status, SaleStatus::PartialRefund);
        assert_eq!(next.refund_amount_cents, 1000);
        assert_eq!(next.applied_refund_ids, vec!["r1"]);
    }

    #[test]
    fn test_refund_event_without_amount_is_full_refund() {
        let order = sample_order("o1");
        let sale = stored(decide(None, &order, EventKind::Paid, EVENT_ID, Utc::now()));

        let Decision::Update(next) =
            decide(Some(&sale), &order, EventKind::Refunded, EVENT_ID, Utc::now())
        else {
            panic!("expected update");
        };
        assert_eq!(next.status, SaleStatus::Refunded);
        assert_eq!(next.refund_amount_cents, 5000);

        let again = stored(Decision::Update(next));
        assert_eq!(
            decide(Some(&again), &order, EventKind::Refunded, EVENT_ID, Utc::now()),
            Decision::Unchanged(UnchangedReason::Terminal)
        );
    }

    #[test]
    fn test_refund_before_paid_inserts_refunded_row() {
        let mut order = sample_order("o1");
        order.refund = Some(RefundInfo {
            refund_id: Some("r1".into()),
            amount_cents: 2000,
        });
        let Decision::Insert(sale) = decide(None, &order, EventKind::Refunded, EVENT_ID, Utc::now())
        else {
            panic!("expected insert");
        };
        assert_eq!(sale.status, SaleStatus::PartialRefund);
        assert_eq!(sale.refund_amount_cents, 2000);
    }

    #[test]
    fn test_cancel_then_cancel_again_is_unchanged() {
        let order = sample_order("o1");
        let sale = stored(decide(None, &order, EventKind::Paid, EVENT_ID, Utc::now()));

        let cancelled = stored(decide(
            Some(&sale),
            &order,
            EventKind::Cancelled,
            EVENT_ID,
            Utc::now(),
        ));
        assert_eq!(cancelled.status, SaleStatus::Cancelled);
        assert_eq!(
            decide(Some(&cancelled), &order, EventKind::Cancelled, EVENT_ID, Utc::now()),
            Decision::Unchanged(UnchangedReason::SameState)
        );
    }

    #[test]
    fn test_refunded_order_cannot_be_cancelled() {
        let order = sample_order("o1");
        let sale = stored(decide(None, &order, EventKind::Paid, EVENT_ID, Utc::now()));
        let refunded = stored(decide(
            Some(&sale),
            &order,
            EventKind::Refunded,
            EVENT_ID,
            Utc::now(),
        ));

        assert_eq!(
            decide(Some(&refunded), &order, EventKind::Cancelled, EVENT_ID, Utc::now()),
            Decision::Unchanged(UnchangedReason::Terminal)
        );
    }

    #[test]
    fn test_paid_event_with_refunded_order_applies_refund() {
        let order = sample_order("o1");
        let sale = stored(decide(None, &order, EventKind::Paid, EVENT_ID, Utc::now()));

        let mut refunded = sample_order("o1");
        refunded.lifecycle = OrderLifecycle::Refunded;
        let Decision::Update(next) =
            decide(Some(&sale), &refunded, EventKind::Paid, EVENT_ID, Utc::now())
        else {
            panic!("expected update");
        };
        assert_eq!(next.status, SaleStatus::Refunded);
    }

    #[test]
    fn test_partial_refund_without_amount_is_not_full_refund() {
        let order = sample_order("o1");
        let sale = stored(decide(None, &order, EventKind::Paid, EVENT_ID, Utc::now()));

        let mut partial = sample_order("o1");
        partial.lifecycle = OrderLifecycle::PartiallyRefunded;
        for kind in [EventKind::Refunded, EventKind::Paid] {
            assert_eq!(
                decide(Some(&sale), &partial, kind, EVENT_ID, Utc::now()),
                Decision::Unchanged(UnchangedReason::SameState)
            );
        }

        // 先于付款事件到达时按已付款建档，不记退款
        let Decision::Insert(inserted) =
            decide(None, &partial, EventKind::Refunded, EVENT_ID, Utc::now())
        else {
            panic!("expected insert");
        };
        assert_eq!(inserted.status, SaleStatus::Paid);
        assert_eq!(inserted.refund_amount_cents, 0);
        assert!(inserted.refund_date.is_none());
    }

    #[test]
    fn test_partial_refund_with_amount() {
        let order = sample_order("o1");
        let sale = stored(decide(None, &order, EventKind::Paid, EVENT_ID, Utc::now()));

        let mut partial = sample_order("o1");
        partial.lifecycle = OrderLifecycle::PartiallyRefunded;
        partial.refund = Some(RefundInfo {
            refund_id: None,
            amount_cents: 2000,
        });
        let Decision::Update(next) =
            decide(Some(&sale), &partial, EventKind::Paid, EVENT_ID, Utc::now())
        else {
            panic!("expected update");
        };
        assert_eq!(next.status, SaleStatus::PartialRefund);
        assert_eq!(next.refund_amount_cents, 2000);
    }
}
