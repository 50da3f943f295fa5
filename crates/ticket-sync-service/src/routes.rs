//! 路由配置模块

use axum::{
    Router,
    routing::{get, post},
};

use crate::{handlers, state::AppState};

/// 平台 webhook 接收路由
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhooks", post(handlers::webhook::receive_webhook))
}

/// 运维路由：日志查询与重放、手动对账、销售汇总
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/webhook-logs",
            get(handlers::webhook_log::list_webhook_logs),
        )
        .route(
            "/webhook-logs/{id}",
            get(handlers::webhook_log::get_webhook_log),
        )
        .route(
            "/webhook-logs/{id}/replay",
            post(handlers::webhook_log::replay_webhook_log),
        )
        .route(
            "/sync/{platform}/{external_event_id}",
            post(handlers::sync::resync_event),
        )
        .route(
            "/events/{id}/sales-summary",
            get(handlers::summary::get_sales_summary),
        )
}

/// 组装完整路由（不含中间件）
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(webhook_routes())
        .nest("/api", api_routes())
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .with_state(state)
}
