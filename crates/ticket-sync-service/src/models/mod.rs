//! 数据模型

pub mod enums;
pub mod order;
pub mod platform_link;
pub mod ticket_sale;
pub mod webhook_log;

pub use enums::{Platform, SaleStatus, WebhookOutcome};
pub use order::{EventKind, LineItem, NormalizedOrder, OrderLifecycle, OrderTotals, RefundInfo};
pub use platform_link::{PlatformLink, SyncCheckpoint};
pub use ticket_sale::{SalesAggregate, TicketSale};
pub use webhook_log::{NewWebhookLog, WebhookLog, WebhookLogFilter};
