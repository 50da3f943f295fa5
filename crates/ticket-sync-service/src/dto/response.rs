//! 响应 DTO 定义

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Platform, SaleStatus, SalesAggregate, WebhookLog, WebhookOutcome};
use crate::service::DispatchReport;

/// 分页响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> PageResponse<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, page_size: i64) -> Self {
        let total_pages = if page_size > 0 {
            (total + page_size - 1) / page_size
        } else {
            0
        };

        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

/// 分发结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchDto {
    pub outcome: WebhookOutcome,
    pub message: String,
    pub log_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_id: Option<i64>,
}

impl From<DispatchReport> for DispatchDto {
    fn from(report: DispatchReport) -> Self {
        Self {
            outcome: report.outcome,
            message: report.message,
            log_id: report.log_id,
            sale_id: report.sale_id,
        }
    }
}

/// Webhook 接收应答
///
/// 平台只关心状态码；`outcome` 区分已写入、未变化、未关联等情况。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub success: bool,
    #[serde(flatten)]
    pub result: DispatchDto,
}

impl From<DispatchReport> for WebhookAck {
    fn from(report: DispatchReport) -> Self {
        Self {
            success: true,
            result: report.into(),
        }
    }
}

/// Webhook 日志响应 DTO
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookLogDto {
    pub id: i64,
    pub platform: String,
    pub event_type: Option<String>,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    pub outcome: WebhookOutcome,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub replay_of: Option<i64>,
}

impl From<WebhookLog> for WebhookLogDto {
    fn from(log: WebhookLog) -> Self {
        Self {
            id: log.id,
            platform: log.platform,
            event_type: log.event_type,
            payload: log.payload,
            received_at: log.received_at,
            processed: log.processed,
            outcome: log.outcome,
            error_code: log.error_code,
            error_message: log.error_message,
            replay_of: log.replay_of,
        }
    }
}

/// 单个平台的销售统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSummaryDto {
    pub orders: i64,
    /// 仍有效（未全额退款、未取消）订单的票数
    pub active_tickets: i64,
    pub gross_cents: i64,
    pub fees_cents: i64,
    pub refund_cents: i64,
    pub net_revenue_cents: i64,
}

impl PlatformSummaryDto {
    fn add(&mut self, row: &SalesAggregate) {
        self.orders += row.orders;
        if !row.status.is_terminal() {
            self.active_tickets += row.tickets;
        }
        self.gross_cents += row.gross_cents;
        self.fees_cents += row.fees_cents;
        self.refund_cents += row.refund_cents;
        self.net_revenue_cents = self.gross_cents - self.refund_cents;
    }
}

/// 按平台拆分的统计
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformBreakdownDto {
    pub platform: Platform,
    #[serde(flatten)]
    pub summary: PlatformSummaryDto,
}

/// 各状态订单数
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCountDto {
    pub status: SaleStatus,
    pub orders: i64,
}

/// 本地活动销售汇总，每次请求时从存储计算
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummaryDto {
    pub internal_event_id: Uuid,
    pub total: PlatformSummaryDto,
    pub by_platform: Vec<PlatformBreakdownDto>,
    pub by_status: Vec<StatusCountDto>,
}

impl SalesSummaryDto {
    pub fn from_aggregates(internal_event_id: Uuid, rows: &[SalesAggregate]) -> Self {
        let mut total = PlatformSummaryDto::default();
        let mut by_platform: Vec<PlatformBreakdownDto> = Vec::new();
        let mut by_status: Vec<StatusCountDto> = Vec::new();

        for row in rows {
            total.add(row);

            match by_platform.iter_mut().find(|b| b.platform == row.platform) {
                Some(breakdown) => breakdown.summary.add(row),
                None => {
                    let mut summary = PlatformSummaryDto::default();
                    summary.add(row);
                    by_platform.push(PlatformBreakdownDto {
                        platform: row.platform,
                        summary,
                    });
                }
            }

            match by_status.iter_mut().find(|c| c.status == row.status) {
                Some(count) => count.orders += row.orders,
                None => by_status.push(StatusCountDto {
                    status: row.status,
                    orders: row.orders,
                }),
            }
        }

        Self {
            internal_event_id,
            total,
            by_platform,
            by_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EVENT_ID;

    fn row(platform: Platform, status: SaleStatus, orders: i64, tickets: i64) -> SalesAggregate {
        SalesAggregate {
            platform,
            status,
            orders,
            tickets,
            gross_cents: orders * 5000,
            fees_cents: orders * 300,
            refund_cents: if status == SaleStatus::Refunded {
                orders * 5000
            } else {
                0
            },
        }
    }

    #[test]
    fn test_page_response_total_pages() {
        let page = PageResponse::new(vec![1, 2, 3], 41, 1, 20);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn test_summary_excludes_terminal_tickets() {
        let rows = vec![
            row(Platform::Humanitix, SaleStatus::Paid, 3, 6),
            row(Platform::Humanitix, SaleStatus::Refunded, 1, 2),
            row(Platform::Eventbrite, SaleStatus::Paid, 2, 2),
        ];
        let summary = SalesSummaryDto::from_aggregates(EVENT_ID, &rows);

        assert_eq!(summary.total.orders, 6);
        assert_eq!(summary.total.active_tickets, 8);
        assert_eq!(summary.total.gross_cents, 30_000);
        assert_eq!(summary.total.refund_cents, 5_000);
        assert_eq!(summary.total.net_revenue_cents, 25_000);
        assert_eq!(summary.by_platform.len(), 2);
        assert_eq!(summary.by_platform[0].summary.orders, 4);
        assert_eq!(summary.by_status[0].orders, 5);
        assert_eq!(summary.by_status[1].status, SaleStatus::Refunded);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["byPlatform"][1]["platform"], "eventbrite");
        assert_eq!(json["byPlatform"][1]["activeTickets"], 2);
    }

    #[test]
    fn test_webhook_ack_shape() {
        let ack = WebhookAck::from(DispatchReport {
            log_id: 7,
            outcome: WebhookOutcome::MappingNotFound,
            message: "未关联".into(),
            sale_id: None,
        });
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["outcome"], "mapping_not_found");
        assert_eq!(json["logId"], 7);
        assert!(json.get("saleId").is_none());
    }
}
