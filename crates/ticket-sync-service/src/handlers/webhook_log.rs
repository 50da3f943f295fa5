//! Webhook 日志 API 处理器
//!
//! 提供审计日志查询与重放。默认只列出未处理完成的日志（未关联、失败、被拒绝），
//! 运维补充活动关联后可逐条重放。

use axum::{
    Json,
    extract::{Path, Query, State},
};
use tracing::instrument;
use validator::Validate;

use crate::{
    dto::{ApiResponse, DispatchDto, PageResponse, PaginationParams, WebhookLogDto, WebhookLogQuery},
    error::IngestError,
    state::AppState,
};

/// 查询 webhook 日志（分页 + 过滤）
///
/// GET /api/webhook-logs
#[instrument(skip(state))]
pub async fn list_webhook_logs(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<WebhookLogQuery>,
) -> Result<Json<ApiResponse<PageResponse<WebhookLogDto>>>, IngestError> {
    pagination.validate()?;
    query.validate()?;

    let filter = query.into_filter(&pagination);
    let (logs, total) = state.audit.list(&filter).await?;
    let items = logs.into_iter().map(WebhookLogDto::from).collect();

    Ok(Json(ApiResponse::success(PageResponse::new(
        items,
        total,
        pagination.page,
        filter.limit,
    ))))
}

/// 获取单条 webhook 日志
///
/// GET /api/webhook-logs/{id}
#[instrument(skip(state))]
pub async fn get_webhook_log(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<WebhookLogDto>>, IngestError> {
    let log = state
        .audit
        .get(id)
        .await?
        .ok_or_else(|| IngestError::NotFound(format!("webhook 日志 {}", id)))?;

    Ok(Json(ApiResponse::success(log.into())))
}

/// 重放 webhook 日志
///
/// POST /api/webhook-logs/{id}/replay
///
/// 重放会写入一条新的审计日志（replay_of 指向原日志），原日志保持不变。
#[instrument(skip(state))]
pub async fn replay_webhook_log(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<DispatchDto>>, IngestError> {
    let report = state.dispatcher.replay(id).await?;
    let message = report.message.clone();
    Ok(Json(ApiResponse::success_with_message(report.into(), message)))
}
