//! Webhook 接收处理器

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use chrono::Utc;
use std::collections::HashMap;
use tracing::instrument;

use crate::{
    dto::WebhookAck,
    error::IngestError,
    service::{InboundWebhook, PLATFORM_HEADER},
    state::AppState,
};

/// 接收平台 webhook
///
/// POST /webhooks
///
/// 平台由 `x-ticket-platform` 请求头指定，请求体按原始字节保留用于验签。
/// 只有在写入（或有意跳过）完成并记录审计日志后才返回 200。
#[instrument(skip(state, headers, body), fields(body_len = body.len()))]
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, IngestError> {
    let inbound = InboundWebhook {
        platform: headers
            .get(PLATFORM_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        signatures: signature_headers(&headers),
        body: body.to_vec(),
        received_at: Utc::now(),
    };

    let report = state.dispatcher.handle(inbound).await?;
    Ok(Json(report.into()))
}

/// 收集所有以 `-signature` 结尾的请求头，由分发器按平台选用
fn signature_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| name.as_str().ends_with("-signature"))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
