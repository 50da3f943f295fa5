//! 集成测试公共设施：内存存储 + 可编排的平台客户端 + HTTP 请求辅助

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::watch;
use tower::ServiceExt;
use uuid::Uuid;

use ticket_sync::{
    IngestError, Result,
    models::Platform,
    repository::InMemoryStore,
    routes,
    signature::SignatureVerifier,
    state::{AppState, StateOptions, Storage},
    sync::{ExternalEvent, Page, PlatformApiClient},
};

pub const EVENT_ID: Uuid = Uuid::from_u128(0x0b5e_77a1_4c2d_4f00_9a3b_1e2f_3a4b_5c6d);
pub const EXTERNAL_EVENT: &str = "evt_1";
pub const SECRET: &str = "whsec_test";

// ==================== 平台载荷 ====================

/// Humanitix 订单：每张票 25.00 AUD
pub fn humanitix_order(order_id: &str, status: &str, quantity: i64) -> Value {
    let total = 25.0 * quantity as f64;
    json!({
        "_id": order_id,
        "eventId": EXTERNAL_EVENT,
        "status": status,
        "currency": "AUD",
        "customer": { "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com" },
        "tickets": [
            { "ticketTypeName": "General Admission", "quantity": quantity, "price": 25.0 }
        ],
        "totals": { "total": total, "bookingFee": 1.5, "gst": 4.55 },
        "createdAt": "2024-03-01T09:30:00Z"
    })
}

pub fn humanitix_webhook(event_type: &str, event_id: &str, order: Value) -> Value {
    json!({
        "event_type": event_type,
        "data": { "event": { "id": event_id }, "order": order },
        "timestamp": "2024-03-01T09:30:05Z"
    })
}

pub fn refunded_order(order_id: &str, refund_id: &str, amount: f64) -> Value {
    let mut order = humanitix_order(order_id, "refunded", 2);
    order["refund"] = json!({ "id": refund_id, "amount": amount });
    order
}

// ==================== 平台客户端 ====================

/// 按页返回预置订单的平台客户端
///
/// `cancel_after` 指定页拉取后发送停机信号，用于模拟运行中途停机。
pub struct FakePlatformClient {
    platform: Platform,
    pages: Vec<Vec<Value>>,
    events: Vec<ExternalEvent>,
    orders_by_url: HashMap<String, Value>,
    cancel_after: Mutex<Option<(u32, watch::Sender<bool>)>>,
    requested_pages: Mutex<Vec<u32>>,
}

impl FakePlatformClient {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            pages: Vec::new(),
            events: Vec::new(),
            orders_by_url: HashMap::new(),
            cancel_after: Mutex::new(None),
            requested_pages: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pages(mut self, pages: Vec<Vec<Value>>) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_events(mut self, ids: &[&str]) -> Self {
        self.events = ids
            .iter()
            .map(|id| ExternalEvent {
                id: id.to_string(),
                name: Some(format!("Event {}", id)),
                starts_at: None,
            })
            .collect();
        self
    }

    pub fn with_order_at(mut self, url: &str, order: Value) -> Self {
        self.orders_by_url.insert(url.to_string(), order);
        self
    }

    pub fn cancel_after(&self, page: u32, tx: watch::Sender<bool>) {
        *self.cancel_after.lock() = Some((page, tx));
    }

    pub fn requested_pages(&self) -> Vec<u32> {
        self.requested_pages.lock().clone()
    }
}

#[async_trait]
impl PlatformApiClient for FakePlatformClient {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn list_events(&self, _page: u32) -> Result<Page<ExternalEvent>> {
        Ok(Page::last(self.events.clone()))
    }

    async fn list_orders(&self, _external_event_id: &str, page: u32) -> Result<Page<Value>> {
        self.requested_pages.lock().push(page);
        if let Some((at, tx)) = self.cancel_after.lock().as_ref() {
            if *at == page {
                let _ = tx.send(true);
            }
        }

        let index = page.saturating_sub(1) as usize;
        let items = self.pages.get(index).cloned().unwrap_or_default();
        Ok(Page {
            items,
            has_more: index + 1 < self.pages.len(),
            total: None,
        })
    }

    async fn fetch_order(&self, url: &str) -> Result<Value> {
        self.orders_by_url
            .get(url)
            .cloned()
            .ok_or_else(|| IngestError::Upstream {
                platform: self.platform.to_string(),
                message: format!("HTTP 404 {}", url),
            })
    }
}

// ==================== 测试应用 ====================

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub state: AppState,
    router: Router,
}

impl TestApp {
    /// 预置 humanitix/evt_1 → EVENT_ID 的关联，不校验签名
    pub fn new() -> Self {
        Self::build(StateOptions::default())
    }

    pub fn with_options(options: StateOptions) -> Self {
        Self::build(options)
    }

    pub fn with_secret() -> Self {
        Self::build(StateOptions {
            verifier: SignatureVerifier::new().with_secret(Platform::Humanitix, SECRET),
            ..StateOptions::default()
        })
    }

    pub fn with_client(client: Arc<FakePlatformClient>) -> Self {
        Self::build(StateOptions {
            clients: vec![client as Arc<dyn PlatformApiClient>],
            ..StateOptions::default()
        })
    }

    fn build(options: StateOptions) -> Self {
        let store = Arc::new(InMemoryStore::new());
        store.link(Platform::Humanitix, EXTERNAL_EVENT, EVENT_ID);
        let state = AppState::new(Storage::memory(store.clone()), options);
        let router = routes::router(state.clone());
        Self {
            store,
            state,
            router,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body collects")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    pub async fn post_webhook(&self, platform: &str, body: &Value) -> (StatusCode, Value) {
        self.post_raw(platform, serde_json::to_vec(body).unwrap(), None)
            .await
    }

    pub async fn post_raw(
        &self,
        platform: &str,
        body: Vec<u8>,
        signature: Option<(&str, String)>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks")
            .header("content-type", "application/json")
            .header("x-ticket-platform", platform);
        if let Some((header, value)) = signature {
            builder = builder.header(header, value);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}
