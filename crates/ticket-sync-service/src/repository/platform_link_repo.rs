//! 平台活动关联与同步断点仓储（Postgres）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::traits::{CheckpointRepositoryTrait, PlatformLinkRepositoryTrait};
use crate::error::Result;
use crate::models::{Platform, PlatformLink, SyncCheckpoint};

pub struct PlatformLinkRepository {
    pool: PgPool,
}

impl PlatformLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlatformLinkRepositoryTrait for PlatformLinkRepository {
    async fn find(
        &self,
        platform: Platform,
        external_event_id: &str,
    ) -> Result<Option<PlatformLink>> {
        let link = sqlx::query_as::<_, PlatformLink>(
            r#"
            SELECT id, internal_event_id, platform, external_event_id,
                   last_sync_at, webhook_last_received, created_at
            FROM platform_links
            WHERE platform = $1 AND external_event_id = $2
            "#,
        )
        .bind(platform)
        .bind(external_event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(link)
    }

    async fn list_by_platform(&self, platform: Platform) -> Result<Vec<PlatformLink>> {
        let links = sqlx::query_as::<_, PlatformLink>(
            r#"
            SELECT id, internal_event_id, platform, external_event_id,
                   last_sync_at, webhook_last_received, created_at
            FROM platform_links
            WHERE platform = $1
            ORDER BY id ASC
            "#,
        )
        .bind(platform)
        .fetch_all(&self.pool)
        .await?;

        Ok(links)
    }

    async fn mark_webhook_received(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE platform_links SET webhook_last_received = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_synced(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE platform_links SET last_sync_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

pub struct CheckpointRepository {
    pool: PgPool,
}

impl CheckpointRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointRepositoryTrait for CheckpointRepository {
    async fn get(
        &self,
        platform: Platform,
        external_event_id: &str,
    ) -> Result<Option<SyncCheckpoint>> {
        let checkpoint = sqlx::query_as::<_, SyncCheckpoint>(
            r#"
            SELECT platform, external_event_id, next_page, updated_at
            FROM sync_checkpoints
            WHERE platform = $1 AND external_event_id = $2
            "#,
        )
        .bind(platform)
        .bind(external_event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(checkpoint)
    }

    async fn save(&self, platform: Platform, external_event_id: &str, next_page: i32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_checkpoints (platform, external_event_id, next_page, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (platform, external_event_id)
            DO UPDATE SET next_page = EXCLUDED.next_page, updated_at = NOW()
            "#,
        )
        .bind(platform)
        .bind(external_event_id)
        .bind(next_page)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self, platform: Platform, external_event_id: &str) -> Result<()> {
        sqlx::query(
            "DELETE FROM sync_checkpoints WHERE platform = $1 AND external_event_id = $2",
        )
        .bind(platform)
        .bind(external_event_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
