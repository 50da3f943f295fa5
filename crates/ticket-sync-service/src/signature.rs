//! Webhook 签名校验
//!
//! 两个平台都使用 HMAC-SHA256 对原始请求体签名，十六进制编码。
//! 仅对配置了密钥的平台强制校验；未配置时放行并记录日志。

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::models::Platform;

type HmacSha256 = Hmac<Sha256>;

/// 校验结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Verified,
    /// 该平台未配置密钥
    NotConfigured,
}

#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    secrets: HashMap<Platform, String>,
}

impl SignatureVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, platform: Platform, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.insert(platform, secret);
        }
        self
    }

    pub fn verify(
        &self,
        platform: Platform,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<SignatureCheck> {
        let Some(secret) = self.secrets.get(&platform) else {
            debug!(platform = %platform, "未配置签名密钥，跳过校验");
            return Ok(SignatureCheck::NotConfigured);
        };

        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| IngestError::Signature("缺少签名".to_string()))?;

        // 兼容 "sha256=<hex>" 形式
        let hex_digest = signature.strip_prefix("sha256=").unwrap_or(signature);
        let expected = hex::decode(hex_digest)
            .map_err(|_| IngestError::Signature("签名格式无效".to_string()))?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| IngestError::Internal(format!("HMAC 初始化失败: {}", e)))?;
        mac.update(body);
        // verify_slice 为常量时间比较
        mac.verify_slice(&expected)
            .map_err(|_| IngestError::Signature("签名不匹配".to_string()))?;

        Ok(SignatureCheck::Verified)
    }
}

/// 计算签名，供测试和本地调试工具使用
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| IngestError::Internal(format!("HMAC 初始化失败: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
