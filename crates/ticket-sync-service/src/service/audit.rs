//! Webhook 审计日志
//!
//! 每次分发（包括重放）恰好写入一条，写入后不修改。

use std::sync::Arc;

use serde_json::Value;
use tracing::error;

use crate::error::{IngestError, Result};
use crate::models::{NewWebhookLog, WebhookLog, WebhookLogFilter};
use crate::repository::WebhookLogRepositoryTrait;

/// 请求体能解析为 JSON 时原样保存，否则保存为 JSON 字符串
pub fn payload_value(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

pub struct AuditLogger {
    logs: Arc<dyn WebhookLogRepositoryTrait>,
}

impl AuditLogger {
    pub fn new(logs: Arc<dyn WebhookLogRepositoryTrait>) -> Self {
        Self { logs }
    }

    /// 审计写入失败时请求整体按存储不可用处理，让平台重投
    pub async fn record(&self, entry: &NewWebhookLog) -> Result<WebhookLog> {
        self.logs.append(entry).await.map_err(|e| {
            error!(
                platform = %entry.platform,
                outcome = %entry.outcome,
                error = %e,
                "写入审计日志失败"
            );
            IngestError::TransientStore(format!("审计日志写入失败: {}", e))
        })
    }

    pub async fn get(&self, id: i64) -> Result<Option<WebhookLog>> {
        self.logs.get(id).await
    }

    pub async fn list(&self, filter: &WebhookLogFilter) -> Result<(Vec<WebhookLog>, i64)> {
        let rows = self.logs.list(filter).await?;
        let total = self.logs.count(filter).await?;
        Ok((rows, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use crate::models::WebhookOutcome;
    use crate::repository::MockWebhookLogRepositoryTrait;

    #[test]
    fn test_payload_value() {
        assert_eq!(payload_value(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(payload_value(b"not json"), json!("not json"));
    }

    #[tokio::test]
    async fn test_append_failure_is_transient() {
        let mut repo = MockWebhookLogRepositoryTrait::new();
        repo.expect_append()
            .returning(|_| Err(IngestError::Internal("disk full".into())));

        let audit = AuditLogger::new(Arc::new(repo));
        let err = audit
            .record(&NewWebhookLog {
                platform: "humanitix".into(),
                event_type: None,
                payload: json!({}),
                signature: None,
                received_at: Utc::now(),
                outcome: WebhookOutcome::Applied,
                error_code: None,
                error_message: None,
                replay_of: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::TransientStore(_)));
    }
}
