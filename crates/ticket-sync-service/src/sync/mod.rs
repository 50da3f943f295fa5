//! 平台 API 客户端与轮询对账

pub mod client;
pub mod polling_job;

pub use client::{EventbriteClient, ExternalEvent, HumanitixClient, Page, PlatformApiClient};
pub use polling_job::{Discrepancy, PollingJob, RunStatus, SyncReport, SyncRun};

#[cfg(test)]
pub use client::MockPlatformApiClient;
