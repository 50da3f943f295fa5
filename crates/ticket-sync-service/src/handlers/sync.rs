//! 轮询对账 API 处理器

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::{info, instrument};

use crate::{
    dto::ApiResponse, error::IngestError, models::Platform, state::AppState, sync::SyncReport,
};

/// 立即对一个平台活动执行一次对账
///
/// POST /api/sync/{platform}/{external_event_id}
///
/// 与后台 Worker 共用断点，上次中断的运行会从断点页继续。
#[instrument(skip(state))]
pub async fn resync_event(
    State(state): State<AppState>,
    Path((platform, external_event_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<SyncReport>>, IngestError> {
    let platform = platform
        .parse::<Platform>()
        .map_err(IngestError::UnknownPlatform)?;

    let report = state.polling.resync(platform, &external_event_id).await?;
    info!(
        platform = %platform,
        external_event_id = %external_event_id,
        created = report.created,
        updated = report.updated,
        failed = report.failed,
        "手动对账完成"
    );

    Ok(Json(ApiResponse::success(report)))
}
