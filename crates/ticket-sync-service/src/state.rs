//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态以及各组件的装配

use std::sync::Arc;
use std::time::Duration;

use ticket_shared::database::Database;

use crate::normalizer::NormalizerRegistry;
use crate::repository::{
    CheckpointRepository, CheckpointRepositoryTrait, InMemoryStore, PlatformLinkRepository,
    PlatformLinkRepositoryTrait, TicketSaleRepository, TicketSaleRepositoryTrait,
    WebhookLogRepository, WebhookLogRepositoryTrait,
};
use crate::service::{AuditLogger, MappingResolver, UpsertEngine, WebhookDispatcher};
use crate::signature::SignatureVerifier;
use crate::sync::{PlatformApiClient, PollingJob};

/// 存储后端的一组仓储
#[derive(Clone)]
pub struct Storage {
    pub sales: Arc<dyn TicketSaleRepositoryTrait>,
    pub links: Arc<dyn PlatformLinkRepositoryTrait>,
    pub logs: Arc<dyn WebhookLogRepositoryTrait>,
    pub checkpoints: Arc<dyn CheckpointRepositoryTrait>,
    /// 仅 Postgres 后端存在，用于就绪检查
    pub database: Option<Database>,
}

impl Storage {
    pub fn postgres(db: Database) -> Self {
        let pool = db.pool().clone();
        Self {
            sales: Arc::new(TicketSaleRepository::new(pool.clone())),
            links: Arc::new(PlatformLinkRepository::new(pool.clone())),
            logs: Arc::new(WebhookLogRepository::new(pool.clone())),
            checkpoints: Arc::new(CheckpointRepository::new(pool)),
            database: Some(db),
        }
    }

    pub fn memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            sales: store.clone(),
            links: store.clone(),
            logs: store.clone(),
            checkpoints: store,
            database: None,
        }
    }
}

/// 组件装配参数
#[derive(Clone)]
pub struct StateOptions {
    pub verifier: SignatureVerifier,
    pub clients: Vec<Arc<dyn PlatformApiClient>>,
    pub fetch_timeout: Duration,
    pub max_pages_per_run: u32,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            verifier: SignatureVerifier::new(),
            clients: Vec::new(),
            fetch_timeout: crate::service::dispatcher::DEFAULT_FETCH_TIMEOUT,
            max_pages_per_run: crate::sync::polling_job::DEFAULT_MAX_PAGES,
        }
    }
}

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<WebhookDispatcher>,
    pub polling: Arc<PollingJob>,
    pub audit: Arc<AuditLogger>,
    pub sales: Arc<dyn TicketSaleRepositoryTrait>,
    pub database: Option<Database>,
}

impl AppState {
    /// 装配分发器、轮询任务等组件，webhook 与轮询共用同一写入引擎
    pub fn new(storage: Storage, options: StateOptions) -> Self {
        let registry = Arc::new(NormalizerRegistry::with_defaults());
        let resolver = Arc::new(MappingResolver::new(storage.links.clone()));
        let engine = Arc::new(UpsertEngine::new(storage.sales.clone()));
        let audit = Arc::new(AuditLogger::new(storage.logs.clone()));

        let mut dispatcher = WebhookDispatcher::new(
            registry.clone(),
            Arc::new(options.verifier),
            resolver.clone(),
            engine.clone(),
            audit.clone(),
        )
        .with_fetch_timeout(options.fetch_timeout);

        let mut polling = PollingJob::new(
            registry,
            resolver,
            engine,
            storage.sales.clone(),
            storage.checkpoints.clone(),
        )
        .with_max_pages(options.max_pages_per_run);

        for client in options.clients {
            dispatcher = dispatcher.with_client(client.clone());
            polling = polling.with_client(client);
        }

        Self {
            dispatcher: Arc::new(dispatcher),
            polling: Arc::new(polling),
            audit,
            sales: storage.sales,
            database: storage.database,
        }
    }
}
