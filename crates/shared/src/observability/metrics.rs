//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出，在 `metrics_port` 上暴露 `/metrics`
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

fn describe_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "webhooks_received_total",
        "Webhook deliveries by platform and outcome"
    );
    metrics::describe_histogram!(
        "webhook_processing_duration_seconds",
        "Webhook handling duration in seconds"
    );

    metrics::describe_counter!("sale_writes_total", "Ticket sale writes by result");
    metrics::describe_counter!(
        "sale_write_conflicts_total",
        "Optimistic concurrency conflicts on ticket sale writes"
    );

    metrics::describe_counter!("sync_pages_total", "Order pages fetched by the poller");
    metrics::describe_counter!("sync_orders_total", "Orders processed by the poller");
    metrics::describe_counter!(
        "sync_discrepancies_total",
        "Events whose stored totals differ from the platform"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 指标记录函数
// ============================================================================

#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录一次 webhook 处理结果
#[inline]
pub fn record_webhook(platform: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "webhooks_received_total",
        "platform" => platform.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "webhook_processing_duration_seconds",
        "platform" => platform.to_string()
    )
    .record(duration_secs);
}

/// 记录销售记录写入（created / updated / unchanged）
#[inline]
pub fn record_sale_write(platform: &str, result: &str) {
    metrics::counter!(
        "sale_writes_total",
        "platform" => platform.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_write_conflict(platform: &str) {
    metrics::counter!(
        "sale_write_conflicts_total",
        "platform" => platform.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_sync_page(platform: &str, orders: usize) {
    metrics::counter!("sync_pages_total", "platform" => platform.to_string()).increment(1);
    metrics::counter!("sync_orders_total", "platform" => platform.to_string())
        .increment(orders as u64);
}

#[inline]
pub fn record_sync_discrepancy(platform: &str) {
    metrics::counter!(
        "sync_discrepancies_total",
        "platform" => platform.to_string()
    )
    .increment(1);
}
