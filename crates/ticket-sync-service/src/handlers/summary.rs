//! 销售汇总 API 处理器

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    dto::{ApiResponse, SalesSummaryDto},
    error::IngestError,
    state::AppState,
};

/// 获取本地活动的销售汇总
///
/// GET /api/events/{id}/sales-summary
///
/// 每次请求都从存储聚合计算，不读取任何进程内计数。
#[instrument(skip(state))]
pub async fn get_sales_summary(
    State(state): State<AppState>,
    Path(internal_event_id): Path<Uuid>,
) -> Result<Json<ApiResponse<SalesSummaryDto>>, IngestError> {
    let rows = state.sales.aggregate_for_event(internal_event_id).await?;
    Ok(Json(ApiResponse::success(SalesSummaryDto::from_aggregates(
        internal_event_id,
        &rows,
    ))))
}
