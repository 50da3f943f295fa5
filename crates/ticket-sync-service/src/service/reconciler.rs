//! 退款与取消对账
//!
//! 在已有销售记录之上叠加退款 / 取消，纯函数，不访问存储。
//!
//! ## 退款幂等
//!
//! - 带平台退款 ID：同一 ID 只生效一次，增量为 min(申请金额, 剩余可退金额)
//! - 不带 ID：申请金额视为累计退款总额，截断到订单总额，且只增不减
//!
//! 因此 `refund_amount_cents <= total_amount_cents` 始终成立。

use chrono::{DateTime, Utc};

use crate::models::{RefundInfo, SaleStatus, TicketSale};

/// 按退款金额推导状态
///
/// 零金额订单的退款直接视为全额退款。
pub fn refund_status(sale: &TicketSale) -> SaleStatus {
    if sale.total_amount_cents <= 0 || sale.refund_amount_cents >= sale.total_amount_cents {
        SaleStatus::Refunded
    } else if sale.refund_amount_cents > 0 {
        SaleStatus::PartialRefund
    } else {
        SaleStatus::Paid
    }
}

/// 在记录上叠加一次退款
///
/// 已取消的记录保持 cancelled，只记录退款金额。
pub fn apply_refund(sale: &mut TicketSale, refund: &RefundInfo, now: DateTime<Utc>) {
    let before_amount = sale.refund_amount_cents;
    let before_status = sale.status;
    let requested = refund.amount_cents.max(0);

    match &refund.refund_id {
        Some(refund_id) => {
            if !sale.applied_refund_ids.contains(refund_id) {
                let increment = requested.min(sale.refundable_cents());
                if increment > 0 {
                    sale.refund_amount_cents += increment;
                    sale.applied_refund_ids.push(refund_id.clone());
                }
            }
        }
        None => {
            let cumulative = requested.min(sale.total_amount_cents.max(0));
            sale.refund_amount_cents = sale.refund_amount_cents.max(cumulative);
        }
    }

    if sale.status != SaleStatus::Cancelled {
        sale.status = refund_status(sale);
    }

    if sale.refund_amount_cents != before_amount || sale.status != before_status {
        sale.refund_date = Some(now);
    }
}

/// 取消订单；载荷同时携带退款时先记退款
pub fn apply_cancel(sale: &mut TicketSale, refund: Option<&RefundInfo>, now: DateTime<Utc>) {
    if let Some(refund) = refund {
        apply_refund(sale, refund, now);
    }
    sale.status = SaleStatus::Cancelled;
}

/// 付款类更新改变了订单总额时，已有退款截断到新总额并重算状态
pub fn clamp_refund(sale: &mut TicketSale) {
    if sale.refund_amount_cents > sale.total_amount_cents {
        sale.refund_amount_cents = sale.total_amount_cents.max(0);
    }
    if sale.refund_amount_cents > 0 && sale.status != SaleStatus::Cancelled {
        sale.status = refund_status(sale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_sale;

    fn refund(id: Option<&str>, amount_cents: i64) -> RefundInfo {
        RefundInfo {
            refund_id: id.map(str::to_string),
            amount_cents,
        }
    }

    #[test]
    fn test_full_refund_without_id() {
        let mut sale = sample_sale("o1");
        let now = Utc::now();

        apply_refund(&mut sale, &refund(None, 5000), now);
        assert_eq!(sale.status, SaleStatus::Refunded);
        assert_eq!(sale.refund_amount_cents, 5000);
        assert_eq!(sale.refund_date, Some(now));

        // 重复应用不会叠加
        let again = sale.clone();
        apply_refund(&mut sale, &refund(None, 5000), Utc::now());
        assert!(sale.same_state(&again));
    }

    #[test]
    fn test_partial_refunds_by_id() {
        let mut sale = sample_sale("o1");
        let now = Utc::now();

        apply_refund(&mut sale, &refund(Some("r1"), 1000), now);
        assert_eq!(sale.status, SaleStatus::PartialRefund);
        assert_eq!(sale.refund_amount_cents, 1000);

        apply_refund(&mut sale, &refund(Some("r1"), 1000), now);
        assert_eq!(sale.refund_amount_cents, 1000);

        apply_refund(&mut sale, &refund(Some("r2"), 1500), now);
        assert_eq!(sale.refund_amount_cents, 2500);
        assert_eq!(sale.applied_refund_ids, vec!["r1", "r2"]);
    }

    #[test]
    fn test_refund_never_exceeds_total() {
        let mut sale = sample_sale("o1");
        let now = Utc::now();

        apply_refund(&mut sale, &refund(Some("r1"), 4000), now);
        apply_refund(&mut sale, &refund(Some("r2"), 4000), now);
        assert_eq!(sale.refund_amount_cents, 5000);
        assert_eq!(sale.status, SaleStatus::Refunded);

        let mut other = sample_sale("o2");
        apply_refund(&mut other, &refund(None, 999_999), now);
        assert_eq!(other.refund_amount_cents, other.total_amount_cents);
    }

    #[test]
    fn test_cumulative_refund_never_decreases() {
        let mut sale = sample_sale("o1");
        let now = Utc::now();

        apply_refund(&mut sale, &refund(None, 3000), now);
        apply_refund(&mut sale, &refund(None, 1000), now);
        assert_eq!(sale.refund_amount_cents, 3000);
        assert_eq!(sale.status, SaleStatus::PartialRefund);
    }

    #[test]
    fn test_zero_total_refund_is_full() {
        let mut sale = sample_sale("o1");
        sale.total_amount_cents = 0;
        apply_refund(&mut sale, &refund(None, 0), Utc::now());
        assert_eq!(sale.status, SaleStatus::Refunded);
        assert!(sale.refund_date.is_some());
    }

    #[test]
    fn test_cancel_with_and_without_refund() {
        let now = Utc::now();

        let mut plain = sample_sale("o1");
        apply_cancel(&mut plain, None, now);
        assert_eq!(plain.status, SaleStatus::Cancelled);
        assert_eq!(plain.refund_amount_cents, 0);
        assert!(plain.refund_date.is_none());

        let mut refunded = sample_sale("o2");
        apply_cancel(&mut refunded, Some(&refund(Some("r1"), 2000)), now);
        assert_eq!(refunded.status, SaleStatus::Cancelled);
        assert_eq!(refunded.refund_amount_cents, 2000);
    }

    #[test]
    fn test_refund_on_cancelled_keeps_status() {
        let mut sale = sample_sale("o1");
        sale.status = SaleStatus::Cancelled;
        apply_refund(&mut sale, &refund(None, 5000), Utc::now());
        assert_eq!(sale.status, SaleStatus::Cancelled);
        assert_eq!(sale.refund_amount_cents, 5000);
    }

    #[test]
    fn test_clamp_after_total_shrinks() {
        let mut sale = sample_sale("o1");
        sale.status = SaleStatus::PartialRefund;
        sale.refund_amount_cents = 3000;
        sale.total_amount_cents = 2000;
        clamp_refund(&mut sale);
        assert_eq!(sale.refund_amount_cents, 2000);
        assert_eq!(sale.status, SaleStatus::Refunded);
    }
}
