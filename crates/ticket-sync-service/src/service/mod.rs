//! 业务服务层

pub mod audit;
pub mod dispatcher;
pub mod mapping_resolver;
pub mod reconciler;
pub mod state_machine;
pub mod upsert;

pub use audit::AuditLogger;
pub use dispatcher::{DispatchReport, InboundWebhook, PLATFORM_HEADER, WebhookDispatcher};
pub use mapping_resolver::{MappingResolver, Touch};
pub use state_machine::{Decision, SkipReason, UnchangedReason, decide};
pub use upsert::{UpsertEngine, WriteOutcome, WriteResult};
