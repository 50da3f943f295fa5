//! 平台活动 → 本地活动映射解析

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{Platform, PlatformLink};
use crate::repository::PlatformLinkRepositoryTrait;

/// 解析来源，决定更新关联上的哪个时间戳
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touch {
    Webhook,
    Sync,
}

pub struct MappingResolver {
    links: Arc<dyn PlatformLinkRepositoryTrait>,
}

impl MappingResolver {
    pub fn new(links: Arc<dyn PlatformLinkRepositoryTrait>) -> Self {
        Self { links }
    }

    /// 查找关联；未关联返回 `Ok(None)` 而不是错误
    ///
    /// 找到后更新时间戳，更新失败只记日志。
    pub async fn resolve(
        &self,
        platform: Platform,
        external_event_id: &str,
        touch: Touch,
    ) -> Result<Option<PlatformLink>> {
        let Some(link) = self.links.find(platform, external_event_id).await? else {
            debug!(platform = %platform, external_event_id, "平台活动未关联");
            return Ok(None);
        };

        let now = Utc::now();
        let stamped = match touch {
            Touch::Webhook => self.links.mark_webhook_received(link.id, now).await,
            Touch::Sync => self.links.mark_synced(link.id, now).await,
        };
        if let Err(e) = stamped {
            warn!(link_id = link.id, error = %e, "更新关联时间戳失败");
        }

        Ok(Some(link))
    }

    /// 只查找，不更新时间戳
    pub async fn find(
        &self,
        platform: Platform,
        external_event_id: &str,
    ) -> Result<Option<PlatformLink>> {
        self.links.find(platform, external_event_id).await
    }

    pub async fn list(&self, platform: Platform) -> Result<Vec<PlatformLink>> {
        self.links.list_by_platform(platform).await
    }

    /// 轮询完成后更新 last_sync_at，失败只记日志
    pub async fn mark_synced(&self, link: &PlatformLink) {
        if let Err(e) = self.links.mark_synced(link.id, Utc::now()).await {
            warn!(link_id = link.id, error = %e, "更新同步时间失败");
        }
    }
}
