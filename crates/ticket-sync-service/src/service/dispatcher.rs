//! Webhook 分发器
//!
//! 入站 webhook 与运维重放的统一入口。处理流程：
//!
//! 1. 识别平台 -> 2. 校验签名 -> 3. 解析事件类型 -> 4. 定位 / 拉取订单
//!    -> 5. 归一化 -> 6. 解析活动映射 -> 7. 幂等写入 -> 8. 写审计日志
//!
//! 无论在哪一步失败，都只写入一条审计日志，且只有在写入（或有意跳过）
//! 完成后才向调用方返回成功。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, instrument, warn};

use ticket_shared::observability::metrics;

use super::audit::{AuditLogger, payload_value};
use super::mapping_resolver::{MappingResolver, Touch};
use super::upsert::{UpsertEngine, WriteOutcome};
use crate::error::{IngestError, Result};
use crate::models::{EventKind, NewWebhookLog, Platform, WebhookOutcome};
use crate::normalizer::{NormalizerRegistry, OrderSource, PlatformNormalizer};
use crate::signature::SignatureVerifier;
use crate::sync::PlatformApiClient;

/// 携带平台标识的请求头
pub const PLATFORM_HEADER: &str = "x-ticket-platform";

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// 一次入站 webhook 请求
#[derive(Debug, Clone)]
pub struct InboundWebhook {
    /// 平台标识原文
    pub platform: Option<String>,
    /// 签名类请求头，键为小写请求头名
    pub signatures: HashMap<String, String>,
    pub body: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

/// 分发结果
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub log_id: i64,
    pub outcome: WebhookOutcome,
    pub message: String,
    pub sale_id: Option<i64>,
}

/// 处理链路的成功结果（写审计前）
struct Handled {
    outcome: WebhookOutcome,
    message: String,
    sale_id: Option<i64>,
}

impl Handled {
    fn new(outcome: WebhookOutcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
            sale_id: None,
        }
    }
}

/// 处理过程中逐步补全、最终写入审计日志的上下文
struct Delivery {
    platform: String,
    payload: Value,
    body: Vec<u8>,
    signatures: HashMap<String, String>,
    event_type: Option<String>,
    signature: Option<String>,
    received_at: DateTime<Utc>,
    replay_of: Option<i64>,
}

impl Delivery {
    fn into_log(self, outcome: WebhookOutcome, error: Option<&IngestError>) -> NewWebhookLog {
        NewWebhookLog {
            platform: self.platform,
            event_type: self.event_type,
            payload: self.payload,
            signature: self.signature,
            received_at: self.received_at,
            outcome,
            error_code: error.map(|e| e.code().to_string()),
            error_message: error.map(|e| e.to_string()),
            replay_of: self.replay_of,
        }
    }
}

pub struct WebhookDispatcher {
    registry: Arc<NormalizerRegistry>,
    verifier: Arc<SignatureVerifier>,
    resolver: Arc<MappingResolver>,
    engine: Arc<UpsertEngine>,
    audit: Arc<AuditLogger>,
    clients: HashMap<Platform, Arc<dyn PlatformApiClient>>,
    fetch_timeout: Duration,
}

impl WebhookDispatcher {
    pub fn new(
        registry: Arc<NormalizerRegistry>,
        verifier: Arc<SignatureVerifier>,
        resolver: Arc<MappingResolver>,
        engine: Arc<UpsertEngine>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            registry,
            verifier,
            resolver,
            engine,
            audit,
            clients: HashMap::new(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// 注册回源拉取订单用的平台客户端
    pub fn with_client(mut self, client: Arc<dyn PlatformApiClient>) -> Self {
        self.clients.insert(client.platform(), client);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// 处理一次入站 webhook
    #[instrument(skip(self, inbound), fields(platform = inbound.platform.as_deref().unwrap_or("")))]
    pub async fn handle(&self, inbound: InboundWebhook) -> Result<DispatchReport> {
        let delivery = Delivery {
            platform: inbound
                .platform
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            payload: payload_value(&inbound.body),
            body: inbound.body,
            // 平台确定后才知道取哪个签名头
            signature: None,
            signatures: inbound.signatures,
            event_type: None,
            received_at: inbound.received_at,
            replay_of: None,
        };
        self.dispatch(delivery, true).await
    }

    /// 重放一条审计日志
    ///
    /// 重放不再校验签名（原始请求已在接收时校验或被拒绝），并写入一条新的审计日志。
    #[instrument(skip(self))]
    pub async fn replay(&self, log_id: i64) -> Result<DispatchReport> {
        let original = self
            .audit
            .get(log_id)
            .await?
            .ok_or_else(|| IngestError::NotFound(format!("webhook 日志 {}", log_id)))?;

        if original.outcome == WebhookOutcome::Rejected {
            return Err(IngestError::NotReplayable(format!(
                "日志 {} 在接收时已被拒绝",
                log_id
            )));
        }

        info!(log_id, platform = %original.platform, "重放 webhook");
        let delivery = Delivery {
            platform: original.platform,
            body: Vec::new(),
            payload: original.payload,
            signatures: HashMap::new(),
            event_type: None,
            signature: original.signature,
            received_at: Utc::now(),
            replay_of: Some(log_id),
        };
        self.dispatch(delivery, false).await
    }

    async fn dispatch(&self, mut delivery: Delivery, verify: bool) -> Result<DispatchReport> {
        let started = Instant::now();
        let result = self.process(&mut delivery, verify).await;

        let metric_platform = delivery
            .platform
            .parse::<Platform>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        match result {
            Ok(handled) => {
                let entry = delivery.into_log(handled.outcome, None);
                let entry = match handled.outcome {
                    // 未关联的活动不算处理完成，留待补充关联后重放
                    WebhookOutcome::MappingNotFound => NewWebhookLog {
                        error_code: Some("MAPPING_NOT_FOUND".to_string()),
                        error_message: Some(handled.message.clone()),
                        ..entry
                    },
                    _ => entry,
                };
                let log = self.audit.record(&entry).await?;

                metrics::record_webhook(
                    &metric_platform,
                    handled.outcome.as_str(),
                    started.elapsed().as_secs_f64(),
                );
                info!(
                    log_id = log.id,
                    outcome = %handled.outcome,
                    sale_id = ?handled.sale_id,
                    "webhook 处理完成"
                );

                Ok(DispatchReport {
                    log_id: log.id,
                    outcome: handled.outcome,
                    message: handled.message,
                    sale_id: handled.sale_id,
                })
            }
            Err(err) => {
                let outcome = if err.is_rejection() {
                    WebhookOutcome::Rejected
                } else {
                    WebhookOutcome::Failed
                };
                let entry = delivery.into_log(outcome, Some(&err));
                // 审计写入失败时返回存储错误，平台会重投
                let log = self.audit.record(&entry).await?;

                metrics::record_webhook(
                    &metric_platform,
                    outcome.as_str(),
                    started.elapsed().as_secs_f64(),
                );
                warn!(
                    log_id = log.id,
                    outcome = %outcome,
                    code = err.code(),
                    error = %err,
                    "webhook 处理失败"
                );

                Err(err)
            }
        }
    }

    async fn process(&self, delivery: &mut Delivery, verify: bool) -> Result<Handled> {
        let platform = delivery
            .platform
            .parse::<Platform>()
            .map_err(IngestError::UnknownPlatform)?;
        let normalizer = self
            .registry
            .get(platform)
            .ok_or_else(|| IngestError::UnknownPlatform(platform.to_string()))?;

        // 平台确定后只保留该平台的签名头，统一记录小写平台名
        delivery.platform = platform.as_str().to_string();
        if verify {
            delivery.signature = delivery
                .signatures
                .get(normalizer.signature_header())
                .cloned();
            self.verifier
                .verify(platform, &delivery.body, delivery.signature.as_deref())?;
        }

        if !delivery.payload.is_object() {
            return Err(IngestError::Validation("请求体必须是 JSON 对象".to_string()));
        }
        delivery.event_type = normalizer.event_type(&delivery.payload);
        let event_type = delivery
            .event_type
            .clone()
            .ok_or_else(|| IngestError::Validation("缺少事件类型".to_string()))?;

        let kind = normalizer.classify(&event_type);
        if kind == EventKind::Ignored {
            return Ok(Handled::new(
                WebhookOutcome::Ignored,
                format!("忽略事件类型 {}", event_type),
            ));
        }

        self.apply(normalizer.as_ref(), platform, &delivery.payload, kind)
            .await
    }

    async fn apply(
        &self,
        normalizer: &dyn PlatformNormalizer,
        platform: Platform,
        payload: &Value,
        kind: EventKind,
    ) -> Result<Handled> {
        let (source, hint) = normalizer.locate_order(payload)?;
        let order_json = match source {
            OrderSource::Embedded(order) => order,
            OrderSource::Remote(url) => self.fetch_order(platform, &url).await?,
        };
        let order = normalizer.normalize_order(&order_json, &hint)?;

        let Some(link) = self
            .resolver
            .resolve(platform, &order.external_event_id, Touch::Webhook)
            .await?
        else {
            warn!(
                platform = %platform,
                external_event_id = %order.external_event_id,
                order_id = %order.external_order_id,
                "平台活动未关联本地活动，跳过写入"
            );
            return Ok(Handled::new(
                WebhookOutcome::MappingNotFound,
                format!(
                    "平台活动 {}/{} 未关联本地活动",
                    platform, order.external_event_id
                ),
            ));
        };

        let written = self
            .engine
            .apply(&order, kind, link.internal_event_id)
            .await?;

        let (outcome, message) = match written.outcome {
            WriteOutcome::Created => (WebhookOutcome::Applied, "销售记录已创建".to_string()),
            WriteOutcome::Updated => (WebhookOutcome::Applied, "销售记录已更新".to_string()),
            WriteOutcome::Unchanged => (
                WebhookOutcome::Unchanged,
                format!("销售记录无变化（{}）", written.reason.unwrap_or("same_state")),
            ),
            WriteOutcome::Skipped => (
                WebhookOutcome::Skipped,
                format!("跳过写入（{}）", written.reason.unwrap_or("skipped")),
            ),
        };

        Ok(Handled {
            outcome,
            message,
            sale_id: written.sale.map(|s| s.id),
        })
    }

    /// 在限定时间内回源拉取订单
    async fn fetch_order(&self, platform: Platform, url: &str) -> Result<Value> {
        let client = self.clients.get(&platform).ok_or_else(|| IngestError::Upstream {
            platform: platform.to_string(),
            message: "未配置平台 API 客户端，无法拉取订单".to_string(),
        })?;

        tokio::time::timeout(self.fetch_timeout, client.fetch_order(url))
            .await
            .map_err(|_| IngestError::Upstream {
                platform: platform.to_string(),
                message: format!("拉取订单超时（{}ms）", self.fetch_timeout.as_millis()),
            })?
    }
}
