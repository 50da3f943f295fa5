//! HTTP 请求处理器模块

pub mod health;
pub mod summary;
pub mod sync;
pub mod webhook;
pub mod webhook_log;
