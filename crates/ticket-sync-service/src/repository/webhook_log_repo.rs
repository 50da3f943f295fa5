//! Webhook 审计日志仓储（Postgres）
//!
//! 只提供追加与查询，没有更新或删除接口。

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::WebhookLogRepositoryTrait;
use crate::error::Result;
use crate::models::{NewWebhookLog, WebhookLog, WebhookLogFilter};

pub struct WebhookLogRepository {
    pool: PgPool,
}

impl WebhookLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookLogRepositoryTrait for WebhookLogRepository {
    async fn append(&self, log: &NewWebhookLog) -> Result<WebhookLog> {
        let row = sqlx::query_as::<_, WebhookLog>(
            r#"
            INSERT INTO webhook_logs (
                platform, event_type, payload, signature, received_at, processed,
                outcome, error_code, error_message, replay_of
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, platform, event_type, payload, signature, received_at, processed,
                      outcome, error_code, error_message, replay_of
            "#,
        )
        .bind(&log.platform)
        .bind(&log.event_type)
        .bind(&log.payload)
        .bind(&log.signature)
        .bind(log.received_at)
        .bind(log.processed())
        .bind(log.outcome)
        .bind(&log.error_code)
        .bind(&log.error_message)
        .bind(log.replay_of)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get(&self, id: i64) -> Result<Option<WebhookLog>> {
        let row = sqlx::query_as::<_, WebhookLog>(
            r#"
            SELECT id, platform, event_type, payload, signature, received_at, processed,
                   outcome, error_code, error_message, replay_of
            FROM webhook_logs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list(&self, filter: &WebhookLogFilter) -> Result<Vec<WebhookLog>> {
        let rows = sqlx::query_as::<_, WebhookLog>(
            r#"
            SELECT id, platform, event_type, payload, signature, received_at, processed,
                   outcome, error_code, error_message, replay_of
            FROM webhook_logs
            WHERE ($1::text IS NULL OR platform = $1)
              AND ($2::text IS NULL OR outcome = $2)
              AND ($3::boolean IS NULL OR processed = $3)
            ORDER BY received_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(&filter.platform)
        .bind(filter.outcome.map(|o| o.as_str()))
        .bind(filter.processed)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count(&self, filter: &WebhookLogFilter) -> Result<i64> {
        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM webhook_logs
            WHERE ($1::text IS NULL OR platform = $1)
              AND ($2::text IS NULL OR outcome = $2)
              AND ($3::boolean IS NULL OR processed = $3)
            "#,
        )
        .bind(&filter.platform)
        .bind(filter.outcome.map(|o| o.as_str()))
        .bind(filter.processed)
        .fetch_one(&self.pool)
        .await?;

        Ok(total.0)
    }
}
