//! 销售记录模型
//!
//! 每个平台订单对应一条记录，以 (platform, platform_order_id) 唯一标识。
//! 金额均为最小货币单位（分）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Platform, SaleStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TicketSale {
    /// 未落库的记录为 0
    pub id: i64,
    pub internal_event_id: Uuid,
    pub platform: Platform,
    pub platform_order_id: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub ticket_quantity: i32,
    pub ticket_type: String,
    pub total_amount_cents: i64,
    pub fees_cents: i64,
    pub net_amount_cents: i64,
    pub tax_cents: i64,
    pub currency: String,
    pub status: SaleStatus,
    pub refund_amount_cents: i64,
    pub refund_date: Option<DateTime<Utc>>,
    pub purchase_date: Option<DateTime<Utc>>,
    /// 最近一次生效事件的原始订单快照
    pub raw_data: serde_json::Value,
    /// 已生效的平台退款 ID，用于退款幂等
    pub applied_refund_ids: Vec<String>,
    /// 平台侧的最后修改时间，用于识别过期事件
    pub source_updated_at: Option<DateTime<Utc>>,
    /// 乐观锁版本号，从 1 开始，每次写入 +1
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketSale {
    /// 剩余可退金额
    pub fn refundable_cents(&self) -> i64 {
        (self.total_amount_cents - self.refund_amount_cents).max(0)
    }

    /// 业务状态是否一致
    ///
    /// 忽略主键、版本、时间戳以及原始快照；相同状态的事件不产生写入。
    pub fn same_state(&self, other: &TicketSale) -> bool {
        self.internal_event_id == other.internal_event_id
            && self.platform == other.platform
            && self.platform_order_id == other.platform_order_id
            && self.customer_name == other.customer_name
            && self.customer_email == other.customer_email
            && self.ticket_quantity == other.ticket_quantity
            && self.ticket_type == other.ticket_type
            && self.total_amount_cents == other.total_amount_cents
            && self.fees_cents == other.fees_cents
            && self.net_amount_cents == other.net_amount_cents
            && self.tax_cents == other.tax_cents
            && self.currency == other.currency
            && self.status == other.status
            && self.refund_amount_cents == other.refund_amount_cents
            && self.refund_date == other.refund_date
            && self.purchase_date == other.purchase_date
            && self.applied_refund_ids == other.applied_refund_ids
            && self.source_updated_at == other.source_updated_at
    }
}

/// 按平台和状态聚合的销售统计，在查询时由存储层计算
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SalesAggregate {
    pub platform: Platform,
    pub status: SaleStatus,
    pub orders: i64,
    pub tickets: i64,
    pub gross_cents: i64,
    pub fees_cents: i64,
    pub refund_cents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_sale;

    #[test]
    fn test_refundable_cents() {
        let mut sale = sample_sale("o1");
        sale.total_amount_cents = 5000;
        sale.refund_amount_cents = 1500;
        assert_eq!(sale.refundable_cents(), 3500);

        sale.refund_amount_cents = 5000;
        assert_eq!(sale.refundable_cents(), 0);
    }

    #[test]
    fn test_same_state_ignores_bookkeeping_fields() {
        let a = sample_sale("o1");
        let mut b = a.clone();
        b.id = 42;
        b.version = 7;
        b.updated_at = Utc::now();
        b.raw_data = serde_json::json!({"different": true});
        assert!(a.same_state(&b));

        b.ticket_quantity += 1;
        assert!(!a.same_state(&b));
    }
}
