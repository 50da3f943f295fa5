//! 票务同步服务错误类型定义
//!
//! 错误分为三类：
//! - 请求方问题（平台未知、签名错误、载荷校验失败），不可重试
//! - 存储或并发问题，可重试，对外返回 503 让平台重投
//! - 上游平台 API 问题，可重试，对外返回 502

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use ticket_shared::error::SharedError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    // 请求方错误
    #[error("未知的票务平台: {0}")]
    UnknownPlatform(String),
    #[error("载荷校验失败: {0}")]
    Validation(String),
    #[error("签名校验失败: {0}")]
    Signature(String),

    // 资源
    #[error("平台活动未关联本地活动: {platform}/{external_event_id}")]
    MappingNotFound {
        platform: String,
        external_event_id: String,
    },
    #[error("资源不存在: {0}")]
    NotFound(String),
    #[error("该记录不可重放: {0}")]
    NotReplayable(String),

    // 可重试错误
    #[error("并发写入冲突，重试次数已用尽: {platform}/{order_id}")]
    ConcurrencyConflict { platform: String, order_id: String },
    #[error("存储暂不可用: {0}")]
    TransientStore(String),
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("上游平台请求失败: {platform} - {message}")]
    Upstream { platform: String, message: String },

    #[error("内部错误: {0}")]
    Internal(String),
}

impl IngestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownPlatform(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Signature(_) => StatusCode::UNAUTHORIZED,
            Self::MappingNotFound { .. } | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotReplayable(_) => StatusCode::CONFLICT,
            Self::ConcurrencyConflict { .. } | Self::TransientStore(_) | Self::Database(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownPlatform(_) => "UNKNOWN_PLATFORM",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Signature(_) => "INVALID_SIGNATURE",
            Self::MappingNotFound { .. } => "MAPPING_NOT_FOUND",
            Self::NotFound(_) => "NOT_FOUND",
            Self::NotReplayable(_) => "NOT_REPLAYABLE",
            Self::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            Self::TransientStore(_) => "TRANSIENT_STORE_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 平台重投或轮询下次运行可能成功的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. }
                | Self::TransientStore(_)
                | Self::Database(_)
                | Self::Upstream { .. }
        )
    }

    /// 请求方造成的拒绝，审计结果记为 rejected 而非 failed
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::UnknownPlatform(_) | Self::Signature(_))
    }

    /// 对外可见的错误信息，系统错误只返回通用提示
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(_) | Self::TransientStore(_) | Self::Internal(_) => {
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        match &self {
            Self::Database(e) => tracing::error!(error = %e, "数据库操作失败"),
            Self::TransientStore(e) => tracing::error!(error = %e, "存储暂不可用"),
            Self::Internal(e) => tracing::error!(error = %e, "内部错误"),
            _ => {}
        }

        let body = json!({
            "success": false,
            "code": self.code(),
            "error": self.public_message(),
        });

        (self.status_code(), axum::Json(body)).into_response()
    }
}

impl From<SharedError> for IngestError {
    fn from(err: SharedError) -> Self {
        match err {
            SharedError::Database(e) => Self::Database(e),
            SharedError::ExternalService { service, message } => Self::Upstream {
                platform: service,
                message,
            },
            SharedError::ExternalServiceTimeout { service } => Self::Upstream {
                platform: service,
                message: "请求超时".to_string(),
            },
            SharedError::ExternalServiceUnavailable { service, status } => Self::Upstream {
                platform: service,
                message: format!("HTTP {}", status),
            },
            SharedError::RateLimitExceeded { operation } => Self::Upstream {
                platform: operation,
                message: "请求频率超限".to_string(),
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for IngestError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            IngestError::UnknownPlatform("ticketek".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            IngestError::Signature("mismatch".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            IngestError::ConcurrencyConflict {
                platform: "humanitix".into(),
                order_id: "o1".into()
            }
            .status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            IngestError::Upstream {
                platform: "eventbrite".into(),
                message: "timeout".into()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(IngestError::TransientStore("down".into()).is_retryable());
        assert!(IngestError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!IngestError::Validation("missing order id".into()).is_retryable());
        assert!(!IngestError::Signature("bad".into()).is_retryable());
    }

    #[test]
    fn test_system_errors_hide_details() {
        let err = IngestError::Internal("connection string leaked".into());
        assert!(!err.public_message().contains("connection string"));
        let err = IngestError::Validation("缺少订单号".into());
        assert!(err.public_message().contains("缺少订单号"));
    }

    #[test]
    fn test_from_shared_timeout() {
        let err: IngestError = SharedError::ExternalServiceTimeout {
            service: "eventbrite".into(),
        }
        .into();
        assert_eq!(err.code(), "UPSTREAM_ERROR");
        assert!(err.is_retryable());
    }
}
