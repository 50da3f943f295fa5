//! 票务销售同步服务
//!
//! 接收票务平台 webhook 并写入销售记录，后台轮询平台 API 做对账。

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::DefaultBodyLimit, http::StatusCode, middleware};
use ticket_shared::{
    config::{AppConfig, PlatformApiConfig, StorageBackend},
    database::Database,
    observability::{self, middleware as obs_middleware},
};
use ticket_sync::{
    models::Platform,
    repository::InMemoryStore,
    routes,
    signature::SignatureVerifier,
    state::{AppState, StateOptions, Storage},
    sync::{EventbriteClient, HumanitixClient, PlatformApiClient},
    worker::SyncWorker,
};
use tokio::{net::TcpListener, sync::watch};
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};
use uuid::Uuid;

const SERVICE_NAME: &str = "ticket-sync-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_default();

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(
        storage = ?config.storage,
        environment = %config.environment,
        "Starting {} on {}",
        SERVICE_NAME,
        config.server_addr()
    );

    let storage = match config.storage {
        StorageBackend::Postgres => {
            let db = Database::connect(&config.database).await?;
            if config.database.run_migrations {
                db.run_migrations(&config.database.migrations_dir).await?;
            }
            Storage::postgres(db)
        }
        StorageBackend::Memory => {
            if config.is_production() {
                warn!("生产环境使用内存存储，重启后数据将丢失");
            }
            Storage::memory(seed_memory_store(&config))
        }
    };

    let database = storage.database.clone();
    let state = AppState::new(storage, state_options(&config));

    // 后台轮询对账
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = if config.sync.enabled {
        let worker = SyncWorker::new(state.polling.clone(), config.sync.poll_interval_secs);
        Some(tokio::spawn(worker.run(shutdown_rx)))
    } else {
        info!("轮询对账未启用");
        None
    };

    let app = routes::router(state)
        .layer(DefaultBodyLimit::max(config.webhook.max_body_bytes))
        // 单请求处理上限，需明显短于平台重投超时
        .layer(TimeoutLayer::with_status_code(
            StatusCode::SERVICE_UNAVAILABLE,
            Duration::from_secs(config.server.request_timeout_secs),
        ))
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id));

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // HTTP 停止后通知 Worker，在当前页处理完成时退出
    let _ = shutdown_tx.send(true);
    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "SyncWorker 异常退出");
        }
    }

    // Worker 退出后不再有写入，关闭连接池
    if let Some(db) = database {
        db.close().await;
    }

    info!("Server shutdown complete");

    Ok(())
}

/// 根据平台配置装配签名密钥与 API 客户端
fn state_options(config: &AppConfig) -> StateOptions {
    let platforms: [(Platform, &PlatformApiConfig); 2] = [
        (Platform::Humanitix, &config.platforms.humanitix),
        (Platform::Eventbrite, &config.platforms.eventbrite),
    ];

    let mut verifier = SignatureVerifier::new();
    let mut clients: Vec<Arc<dyn PlatformApiClient>> = Vec::new();

    for (platform, api) in platforms {
        match api.webhook_secret.as_deref() {
            Some(secret) => verifier = verifier.with_secret(platform, secret),
            None => warn!(platform = %platform, "未配置 webhook 签名密钥，将不校验签名"),
        }

        // 没有令牌时不访问平台 API：回源拉取与轮询对账都会跳过该平台
        if api.api_token.as_deref().is_none_or(str::is_empty) {
            info!(platform = %platform, "未配置 API 令牌，跳过平台客户端");
            continue;
        }
        let client: Arc<dyn PlatformApiClient> = match platform {
            Platform::Humanitix => Arc::new(HumanitixClient::new(api)),
            Platform::Eventbrite => Arc::new(EventbriteClient::new(api)),
        };
        clients.push(client);
    }

    StateOptions {
        verifier,
        clients,
        fetch_timeout: Duration::from_millis(config.webhook.order_fetch_timeout_ms),
        max_pages_per_run: config.sync.max_pages_per_run,
    }
}

/// 内存存储按配置预置平台活动关联
fn seed_memory_store(config: &AppConfig) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for seed in &config.links {
        let platform = seed.platform.parse::<Platform>();
        let internal_event_id = Uuid::parse_str(&seed.internal_event_id);
        match (platform, internal_event_id) {
            (Ok(platform), Ok(internal_event_id)) => {
                store.link(platform, &seed.external_event_id, internal_event_id);
            }
            _ => warn!(
                platform = %seed.platform,
                external_event_id = %seed.external_event_id,
                "忽略无效的预置关联"
            ),
        }
    }
    info!(links = config.links.len(), "内存存储已初始化");
    store
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
