//! 运维接口 DTO
//!
//! 包含请求参数与响应体结构

pub mod request;
pub mod response;

pub use request::{PaginationParams, WebhookLogQuery};
pub use response::{
    ApiResponse, DispatchDto, PageResponse, PlatformBreakdownDto, PlatformSummaryDto,
    SalesSummaryDto, StatusCountDto, WebhookAck, WebhookLogDto,
};
