//! 统一错误处理模块
//!
//! 定义基础设施层共享的错误类型，使用 thiserror 提供良好的错误信息。
//! 业务错误（签名、映射、校验等）由各服务自行定义。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum SharedError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库迁移失败: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // ==================== 配置错误 ====================
    #[error("配置加载失败: {0}")]
    Config(#[from] config::ConfigError),

    // ==================== 外部服务错误 ====================
    #[error("外部服务错误: {service} - {message}")]
    ExternalService { service: String, message: String },

    #[error("外部服务超时: {service}")]
    ExternalServiceTimeout { service: String },

    #[error("外部服务暂不可用: {service} (HTTP {status})")]
    ExternalServiceUnavailable { service: String, status: u16 },

    #[error("操作频率超限: {operation}")]
    RateLimitExceeded { operation: String },

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, SharedError>;

impl SharedError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::Migration(_) => "MIGRATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::ExternalServiceTimeout { .. } => "EXTERNAL_SERVICE_TIMEOUT",
            Self::ExternalServiceUnavailable { .. } => "EXTERNAL_SERVICE_UNAVAILABLE",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::ExternalServiceTimeout { .. }
                | Self::ExternalServiceUnavailable { .. }
                | Self::RateLimitExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = SharedError::ExternalService {
            service: "humanitix".to_string(),
            message: "502".to_string(),
        };
        assert_eq!(err.code(), "EXTERNAL_SERVICE_ERROR");
        assert_eq!(err.to_string(), "外部服务错误: humanitix - 502");
    }

    #[test]
    fn test_is_retryable() {
        let db_err = SharedError::Database(sqlx::Error::PoolTimedOut);
        assert!(db_err.is_retryable());

        let timeout = SharedError::ExternalServiceTimeout {
            service: "eventbrite".to_string(),
        };
        assert!(timeout.is_retryable());

        let unavailable = SharedError::ExternalServiceUnavailable {
            service: "eventbrite".to_string(),
            status: 503,
        };
        assert!(unavailable.is_retryable());

        assert!(!SharedError::Internal("bug".to_string()).is_retryable());
    }
}
