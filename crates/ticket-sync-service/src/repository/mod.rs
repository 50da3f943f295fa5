//! 数据访问层
//!
//! Postgres 实现用于生产，内存实现用于本地运行和测试。

mod memory;
mod platform_link_repo;
mod ticket_sale_repo;
mod traits;
mod webhook_log_repo;

pub use memory::InMemoryStore;
pub use platform_link_repo::{CheckpointRepository, PlatformLinkRepository};
pub use ticket_sale_repo::TicketSaleRepository;
pub use traits::{
    CheckpointRepositoryTrait, PlatformLinkRepositoryTrait, TicketSaleRepositoryTrait,
    WebhookLogRepositoryTrait,
};
pub use webhook_log_repo::WebhookLogRepository;

#[cfg(test)]
pub use traits::{
    MockCheckpointRepositoryTrait, MockPlatformLinkRepositoryTrait,
    MockTicketSaleRepositoryTrait, MockWebhookLogRepositoryTrait,
};
