//! 销售记录仓储（Postgres）
//!
//! 插入依赖 (platform, platform_order_id) 唯一索引，更新以 version 做 CAS。

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::traits::TicketSaleRepositoryTrait;
use crate::error::Result;
use crate::models::{Platform, SalesAggregate, TicketSale};

const SALE_COLUMNS: &str = r#"
    id, internal_event_id, platform, platform_order_id, customer_name, customer_email,
    ticket_quantity, ticket_type, total_amount_cents, fees_cents, net_amount_cents, tax_cents,
    currency, status, refund_amount_cents, refund_date, purchase_date, raw_data,
    applied_refund_ids, source_updated_at, version, created_at, updated_at
"#;

pub struct TicketSaleRepository {
    pool: PgPool,
}

impl TicketSaleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TicketSaleRepositoryTrait for TicketSaleRepository {
    async fn find_by_key(&self, platform: Platform, order_id: &str) -> Result<Option<TicketSale>> {
        let sql = format!(
            "SELECT {} FROM ticket_sales WHERE platform = $1 AND platform_order_id = $2",
            SALE_COLUMNS
        );
        let sale = sqlx::query_as::<_, TicketSale>(&sql)
            .bind(platform)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    async fn insert_if_absent(&self, sale: &TicketSale) -> Result<Option<TicketSale>> {
        let sql = format!(
            r#"
            INSERT INTO ticket_sales (
                internal_event_id, platform, platform_order_id, customer_name, customer_email,
                ticket_quantity, ticket_type, total_amount_cents, fees_cents, net_amount_cents,
                tax_cents, currency, status, refund_amount_cents, refund_date, purchase_date,
                raw_data, applied_refund_ids, source_updated_at, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, 1, NOW(), NOW())
            ON CONFLICT (platform, platform_order_id) DO NOTHING
            RETURNING {}
            "#,
            SALE_COLUMNS
        );

        let inserted = sqlx::query_as::<_, TicketSale>(&sql)
            .bind(sale.internal_event_id)
            .bind(sale.platform)
            .bind(&sale.platform_order_id)
            .bind(&sale.customer_name)
            .bind(&sale.customer_email)
            .bind(sale.ticket_quantity)
            .bind(&sale.ticket_type)
            .bind(sale.total_amount_cents)
            .bind(sale.fees_cents)
            .bind(sale.net_amount_cents)
            .bind(sale.tax_cents)
            .bind(&sale.currency)
            .bind(sale.status)
            .bind(sale.refund_amount_cents)
            .bind(sale.refund_date)
            .bind(sale.purchase_date)
            .bind(&sale.raw_data)
            .bind(&sale.applied_refund_ids)
            .bind(sale.source_updated_at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(inserted)
    }

    async fn update_if_version(&self, sale: &TicketSale) -> Result<Option<TicketSale>> {
        // created_at 与唯一键不参与更新
        let sql = format!(
            r#"
            UPDATE ticket_sales
            SET internal_event_id = $3,
                customer_name = $4,
                customer_email = $5,
                ticket_quantity = $6,
                ticket_type = $7,
                total_amount_cents = $8,
                fees_cents = $9,
                net_amount_cents = $10,
                tax_cents = $11,
                currency = $12,
                status = $13,
                refund_amount_cents = $14,
                refund_date = $15,
                purchase_date = $16,
                raw_data = $17,
                applied_refund_ids = $18,
                source_updated_at = $19,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            SALE_COLUMNS
        );

        let updated = sqlx::query_as::<_, TicketSale>(&sql)
            .bind(sale.id)
            .bind(sale.version)
            .bind(sale.internal_event_id)
            .bind(&sale.customer_name)
            .bind(&sale.customer_email)
            .bind(sale.ticket_quantity)
            .bind(&sale.ticket_type)
            .bind(sale.total_amount_cents)
            .bind(sale.fees_cents)
            .bind(sale.net_amount_cents)
            .bind(sale.tax_cents)
            .bind(&sale.currency)
            .bind(sale.status)
            .bind(sale.refund_amount_cents)
            .bind(sale.refund_date)
            .bind(sale.purchase_date)
            .bind(&sale.raw_data)
            .bind(&sale.applied_refund_ids)
            .bind(sale.source_updated_at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(updated)
    }

    async fn list_by_event(&self, internal_event_id: Uuid) -> Result<Vec<TicketSale>> {
        let sql = format!(
            "SELECT {} FROM ticket_sales WHERE internal_event_id = $1 ORDER BY id ASC",
            SALE_COLUMNS
        );
        let sales = sqlx::query_as::<_, TicketSale>(&sql)
            .bind(internal_event_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(sales)
    }

    async fn aggregate_for_event(&self, internal_event_id: Uuid) -> Result<Vec<SalesAggregate>> {
        // SUM(bigint) 在 Postgres 中返回 numeric，需显式转回 BIGINT
        let rows = sqlx::query_as::<_, SalesAggregate>(
            r#"
            SELECT platform,
                   status,
                   COUNT(*)::BIGINT AS orders,
                   COALESCE(SUM(ticket_quantity), 0)::BIGINT AS tickets,
                   COALESCE(SUM(total_amount_cents), 0)::BIGINT AS gross_cents,
                   COALESCE(SUM(fees_cents), 0)::BIGINT AS fees_cents,
                   COALESCE(SUM(refund_amount_cents), 0)::BIGINT AS refund_cents
            FROM ticket_sales
            WHERE internal_event_id = $1
            GROUP BY platform, status
            ORDER BY platform, status
            "#,
        )
        .bind(internal_event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_sale;

    async fn repo() -> TicketSaleRepository {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPool::connect(&url).await.unwrap();
        TicketSaleRepository::new(pool)
    }

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_insert_then_conflict() {
        let repo = repo().await;
        let order_id = format!("pg-{}", Uuid::new_v4());
        let sale = sample_sale(&order_id);

        let inserted = repo.insert_if_absent(&sale).await.unwrap().unwrap();
        assert_eq!(inserted.version, 1);
        assert!(repo.insert_if_absent(&sale).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_update_requires_matching_version() {
        let repo = repo().await;
        let order_id = format!("pg-{}", Uuid::new_v4());
        let inserted = repo
            .insert_if_absent(&sample_sale(&order_id))
            .await
            .unwrap()
            .unwrap();

        let mut change = inserted.clone();
        change.ticket_quantity = 5;
        let updated = repo.update_if_version(&change).await.unwrap().unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.created_at, inserted.created_at);

        // 基于旧版本的写入被拒绝
        assert!(repo.update_if_version(&change).await.unwrap().is_none());
    }
}
