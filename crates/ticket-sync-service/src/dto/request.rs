//! 请求 DTO 定义

use serde::Deserialize;
use validator::Validate;

use crate::models::{WebhookLogFilter, WebhookOutcome};

/// 分页参数
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "页码必须从 1 开始"))]
    pub page: i64,
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100, message = "每页条数必须在 1-100 之间"))]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl PaginationParams {
    /// 计算数据库查询的 offset
    pub fn offset(&self) -> i64 {
        (self.page - 1).max(0) * self.limit()
    }

    /// 获取限制条数（最大100）
    pub fn limit(&self) -> i64 {
        self.page_size.clamp(1, 100)
    }
}

/// Webhook 日志查询过滤
///
/// 未指定 outcome 和 processed 时只返回未处理完成的日志，便于排查与重放。
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WebhookLogQuery {
    #[validate(length(min = 1, max = 32, message = "平台标识长度必须在1-32个字符之间"))]
    pub platform: Option<String>,
    pub outcome: Option<WebhookOutcome>,
    pub processed: Option<bool>,
}

impl WebhookLogQuery {
    pub fn into_filter(self, pagination: &PaginationParams) -> WebhookLogFilter {
        let processed = match (self.processed, self.outcome) {
            (Some(processed), _) => Some(processed),
            (None, Some(_)) => None,
            (None, None) => Some(false),
        };
        WebhookLogFilter {
            platform: self.platform.map(|p| p.trim().to_ascii_lowercase()),
            outcome: self.outcome,
            processed,
            limit: pagination.limit(),
            offset: pagination.offset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_offset() {
        let params = PaginationParams {
            page: 3,
            page_size: 20,
        };
        assert_eq!(params.offset(), 40);
        assert_eq!(params.limit(), 20);

        let params = PaginationParams {
            page: 0,
            page_size: 500,
        };
        assert_eq!(params.offset(), 0);
        assert_eq!(params.limit(), 100);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_default_query_lists_unprocessed() {
        let filter = WebhookLogQuery::default().into_filter(&PaginationParams::default());
        assert_eq!(filter.processed, Some(false));
        assert_eq!(filter.limit, 20);
    }

    #[test]
    fn test_outcome_filter_drops_processed_default() {
        let query = WebhookLogQuery {
            platform: Some(" Humanitix ".into()),
            outcome: Some(WebhookOutcome::Applied),
            processed: None,
        };
        let filter = query.into_filter(&PaginationParams::default());
        assert_eq!(filter.processed, None);
        assert_eq!(filter.platform.as_deref(), Some("humanitix"));
    }
}
