//! 票务销售同步服务
//!
//! 接收 Humanitix / Eventbrite 的订单 webhook，归一化为统一的销售记录并幂等写入；
//! 后台轮询平台 API 补齐遗漏的 webhook，并与本地统计做对账。
//!
//! ## 模块
//!
//! - `normalizer`: 各平台载荷到统一订单结构的转换
//! - `service`: 分发、活动映射、状态机与幂等写入、审计
//! - `sync`: 平台 API 客户端与轮询对账
//! - `repository`: Postgres 与内存两套存储实现
//! - `handlers` / `routes`: webhook 接收与运维 HTTP 接口

pub mod dto;
pub mod error;
pub mod handlers;
pub mod models;
pub mod normalizer;
pub mod repository;
pub mod routes;
pub mod service;
pub mod signature;
pub mod state;
pub mod sync;
pub mod worker;

pub use error::{IngestError, Result};
pub use state::{AppState, StateOptions, Storage};
