//! 健康检查处理器

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use tracing::warn;

use crate::state::AppState;

/// 存活探针：服务进程正常即返回 ok
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "ticket-sync-service"
    }))
}

/// 就绪探针：Postgres 后端需数据库可连通，内存后端直接就绪
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let Some(db) = &state.database else {
        return (
            StatusCode::OK,
            Json(json!({ "status": "ready", "storage": "memory" })),
        );
    };

    match db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ready", "database": "ok" })),
        ),
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "not_ready", "database": "unavailable" })),
            )
        }
    }
}
