//! 票务平台 API 客户端
//!
//! 轮询对账拉取活动与订单列表，Eventbrite webhook 未内嵌订单时按 api_url 拉取订单。
//! 每个客户端内置最小请求间隔限流，瞬时错误（超时、429、5xx）按共享重试策略退避重试。

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use ticket_shared::config::PlatformApiConfig;
use ticket_shared::error::SharedError;
use ticket_shared::retry::{RetryPolicy, retry_with_policy};

use crate::error::{IngestError, Result};
use crate::models::Platform;
use crate::normalizer::{first_string, parse_timestamp};

/// 一页数据
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    /// 平台报告的总条数（若提供）
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            has_more: false,
            total: None,
        }
    }
}

/// 平台侧的活动
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub id: String,
    pub name: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformApiClient: Send + Sync {
    fn platform(&self) -> Platform;

    /// 页码从 1 开始
    async fn list_events(&self, page: u32) -> Result<Page<ExternalEvent>>;

    async fn list_orders(&self, external_event_id: &str, page: u32) -> Result<Page<Value>>;

    async fn fetch_order(&self, url: &str) -> Result<Value>;
}

// ==================== HTTP 传输 ====================

/// 两个平台共用的 HTTP 传输：Bearer 认证、限流、重试
struct ApiTransport {
    platform: Platform,
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
    retry: RetryPolicy,
}

impl ApiTransport {
    fn new(platform: Platform, config: &PlatformApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            platform,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone().filter(|t| !t.is_empty()),
            client,
            min_interval: Duration::from_millis(config.min_request_interval_ms),
            last_request: Mutex::new(None),
            retry: RetryPolicy::default(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 载荷给出的订单地址必须与 base_url 同源（协议、主机、端口），否则不携带令牌发起请求
    fn ensure_same_origin(&self, url: &str) -> Result<()> {
        let target = reqwest::Url::parse(url)
            .map_err(|e| IngestError::Validation(format!("订单地址无效: {}", e)))?;
        let same_origin = reqwest::Url::parse(&self.base_url).is_ok_and(|base| {
            base.scheme() == target.scheme()
                && base.host_str() == target.host_str()
                && base.port_or_known_default() == target.port_or_known_default()
        });

        if !same_origin {
            return Err(IngestError::Validation(format!(
                "订单地址不属于 {} API: {}",
                self.platform, url
            )));
        }
        Ok(())
    }

    /// 串行化请求并保证相邻两次请求的最小间隔
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let operation = format!("{}.get", self.platform);
        let value = retry_with_policy(&self.retry, &operation, SharedError::is_retryable, || {
            self.get_once(url, query)
        })
        .await?;
        Ok(value)
    }

    async fn get_once(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<Value, SharedError> {
        self.throttle().await;
        let service = self.platform.to_string();
        debug!(platform = %self.platform, url, "请求平台 API");

        let mut request = self.client.get(url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SharedError::ExternalServiceTimeout {
                    service: service.clone(),
                }
            } else {
                SharedError::ExternalService {
                    service: service.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SharedError::RateLimitExceeded { operation: service });
        }
        if status.is_server_error() {
            return Err(SharedError::ExternalServiceUnavailable {
                service,
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(SharedError::ExternalService {
                service,
                message: format!("HTTP {}", status),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SharedError::ExternalService {
                service,
                message: format!("响应不是合法的 JSON: {}", e),
            })
    }
}

fn array_at(value: &Value, key: &str) -> Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

// ==================== Humanitix ====================

pub struct HumanitixClient {
    transport: ApiTransport,
    page_size: u32,
}

impl HumanitixClient {
    pub fn new(config: &PlatformApiConfig) -> Self {
        Self {
            transport: ApiTransport::new(Platform::Humanitix, config),
            page_size: config.page_size.max(1),
        }
    }

    /// Humanitix 只返回总数，按 页码 × 页大小 与总数比较判断是否还有下一页；
    /// 未返回总数时以整页作为还有下一页的信号
    fn page_of<T>(&self, items: Vec<T>, body: &Value, page: u32) -> Page<T> {
        let total = body.get("total").and_then(Value::as_u64);
        let has_more = match total {
            Some(total) => u64::from(page) * u64::from(self.page_size) < total,
            None => items.len() as u64 >= u64::from(self.page_size),
        };
        Page {
            items,
            has_more,
            total,
        }
    }

    fn paging(&self, page: u32) -> Vec<(&'static str, String)> {
        vec![
            ("page", page.to_string()),
            ("pageSize", self.page_size.to_string()),
        ]
    }
}

#[async_trait]
impl PlatformApiClient for HumanitixClient {
    fn platform(&self) -> Platform {
        Platform::Humanitix
    }

    async fn list_events(&self, page: u32) -> Result<Page<ExternalEvent>> {
        let body = self
            .transport
            .get_json(&self.transport.url("/events"), &self.paging(page))
            .await?;

        let events = array_at(&body, "events")
            .iter()
            .filter_map(|event| {
                Some(ExternalEvent {
                    id: first_string(event, &["_id", "id"])?,
                    name: first_string(event, &["name"]),
                    starts_at: parse_timestamp(event.get("startDate")),
                })
            })
            .collect();
        Ok(self.page_of(events, &body, page))
    }

    async fn list_orders(&self, external_event_id: &str, page: u32) -> Result<Page<Value>> {
        let path = format!("/events/{}/orders", external_event_id);
        let body = self
            .transport
            .get_json(&self.transport.url(&path), &self.paging(page))
            .await?;

        let orders = array_at(&body, "orders");
        Ok(self.page_of(orders, &body, page))
    }

    async fn fetch_order(&self, url: &str) -> Result<Value> {
        self.transport.ensure_same_origin(url)?;
        self.transport.get_json(url, &[]).await
    }
}

// ==================== Eventbrite ====================

pub struct EventbriteClient {
    transport: ApiTransport,
}

impl EventbriteClient {
    pub fn new(config: &PlatformApiConfig) -> Self {
        Self {
            transport: ApiTransport::new(Platform::Eventbrite, config),
        }
    }

    fn page_of<T>(items: Vec<T>, body: &Value) -> Page<T> {
        let pagination = body.get("pagination");
        Page {
            items,
            has_more: pagination
                .and_then(|p| p.get("has_more_items"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            total: pagination
                .and_then(|p| p.get("object_count"))
                .and_then(Value::as_u64),
        }
    }
}

#[async_trait]
impl PlatformApiClient for EventbriteClient {
    fn platform(&self) -> Platform {
        Platform::Eventbrite
    }

    async fn list_events(&self, page: u32) -> Result<Page<ExternalEvent>> {
        let body = self
            .transport
            .get_json(
                &self.transport.url("/users/me/owned_events/"),
                &[("page", page.to_string())],
            )
            .await?;

        let events = array_at(&body, "events")
            .iter()
            .filter_map(|event| {
                Some(ExternalEvent {
                    id: first_string(event, &["id"])?,
                    name: event
                        .get("name")
                        .and_then(|n| first_string(n, &["text"]))
                        .or_else(|| first_string(event, &["name"])),
                    starts_at: event
                        .get("start")
                        .and_then(|s| parse_timestamp(s.get("utc"))),
                })
            })
            .collect();
        Ok(Self::page_of(events, &body))
    }

    async fn list_orders(&self, external_event_id: &str, page: u32) -> Result<Page<Value>> {
        let path = format!("/events/{}/orders/", external_event_id);
        let body = self
            .transport
            .get_json(
                &self.transport.url(&path),
                &[("page", page.to_string()), ("expand", "attendees".to_string())],
            )
            .await?;

        let orders = array_at(&body, "orders");
        Ok(Self::page_of(orders, &body))
    }

    async fn fetch_order(&self, url: &str) -> Result<Value> {
        self.transport.ensure_same_origin(url)?;
        self.transport
            .get_json(url, &[("expand", "attendees".to_string())])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> PlatformApiConfig {
        PlatformApiConfig {
            base_url: "https://api.example.com/v1/".into(),
            page_size: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_humanitix_paging_by_total() {
        let client = HumanitixClient::new(&config());
        let body = json!({"total": 3});

        let first = client.page_of(vec![1, 2], &body, 1);
        assert!(first.has_more);
        assert_eq!(first.total, Some(3));

        let second = client.page_of(vec![3], &body, 2);
        assert!(!second.has_more);
    }

    #[test]
    fn test_humanitix_paging_without_total() {
        let client = HumanitixClient::new(&config());
        assert!(client.page_of(vec![1, 2], &json!({}), 1).has_more);
        assert!(!client.page_of(vec![1], &json!({}), 2).has_more);
    }

    #[test]
    fn test_eventbrite_pagination_block() {
        let body = json!({"pagination": {"has_more_items": true, "object_count": 120}});
        let page = EventbriteClient::page_of(vec!["a"], &body);
        assert!(page.has_more);
        assert_eq!(page.total, Some(120));

        assert!(!EventbriteClient::page_of(vec!["a"], &json!({})).has_more);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let transport = ApiTransport::new(Platform::Humanitix, &config());
        assert_eq!(
            transport.url("/events"),
            "https://api.example.com/v1/events"
        );
    }

    fn eventbrite_config() -> PlatformApiConfig {
        PlatformApiConfig {
            base_url: "https://www.eventbriteapi.com/v3".into(),
            api_token: Some("eb-token".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_same_origin_order_url_allowed() {
        let transport = ApiTransport::new(Platform::Eventbrite, &eventbrite_config());
        assert!(
            transport
                .ensure_same_origin("https://www.eventbriteapi.com/v3/events/1/orders/2/")
                .is_ok()
        );
        assert!(
            transport
                .ensure_same_origin("https://www.eventbriteapi.com:443/v3/events/1/orders/2/")
                .is_ok()
        );
    }

    #[test]
    fn test_foreign_order_url_rejected() {
        let transport = ApiTransport::new(Platform::Eventbrite, &eventbrite_config());
        for url in [
            "http://127.0.0.1:8080/events/1/orders/2/",
            "http://www.eventbriteapi.com/v3/events/1/orders/2/",
            "https://www.eventbriteapi.com.attacker.test/v3/events/1/orders/2/",
            "https://www.eventbriteapi.com:8443/v3/events/1/orders/2/",
            "not a url",
        ] {
            let err = transport.ensure_same_origin(url).unwrap_err();
            assert!(matches!(err, IngestError::Validation(_)), "{url}");
        }
    }

    #[tokio::test]
    async fn test_fetch_order_refuses_foreign_host_without_request() {
        // 地址校验在发请求之前，不可达的主机也会立即返回校验错误
        let client = EventbriteClient::new(&eventbrite_config());
        let err = client
            .fetch_order("http://127.0.0.1:9/events/1/orders/2/")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(!err.is_retryable());

        let client = HumanitixClient::new(&config());
        let err = client
            .fetch_order("https://evil.example.net/v1/orders/1")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_enforces_min_interval() {
        let mut cfg = config();
        cfg.min_request_interval_ms = 250;
        let transport = ApiTransport::new(Platform::Eventbrite, &cfg);

        let start = Instant::now();
        transport.throttle().await;
        transport.throttle().await;
        transport.throttle().await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }
}
