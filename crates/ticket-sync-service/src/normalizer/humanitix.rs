//! Humanitix 归一化
//!
//! Webhook 载荷：`{event_type, data: {event: {id}, order: {...}}, timestamp}`，订单总是内嵌。
//! 金额为主货币单位（如 50.00）。

use serde_json::Value;

use super::{
    DEFAULT_CURRENCY, OrderHint, OrderSource, PlatformNormalizer, check_ticket_total,
    customer_name, default_line_items, first_string, major_to_cents, parse_timestamp, require,
    ticket_count,
};
use crate::error::{IngestError, Result};
use crate::models::{
    EventKind, LineItem, NormalizedOrder, OrderLifecycle, OrderTotals, Platform, RefundInfo,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct HumanitixNormalizer;

impl HumanitixNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// status 与 financialStatus 任一表明退款 / 取消 / 支付即按此处理，退款优先
    fn lifecycle(order: &Value) -> OrderLifecycle {
        let statuses: Vec<String> = ["financialStatus", "financial_status", "status"]
            .iter()
            .filter_map(|key| order.get(*key).and_then(Value::as_str))
            .map(|s| s.trim().to_ascii_lowercase())
            .collect();
        let any = |candidates: &[&str]| statuses.iter().any(|s| candidates.contains(&s.as_str()));

        if any(&["refunded"]) {
            OrderLifecycle::Refunded
        } else if any(&["partially_refunded", "partial_refund"]) {
            OrderLifecycle::PartiallyRefunded
        } else if any(&["cancelled", "canceled", "void"]) {
            OrderLifecycle::Cancelled
        } else if any(&["paid", "complete", "completed"]) {
            OrderLifecycle::Paid
        } else {
            OrderLifecycle::Unpaid
        }
    }

    fn line_items(order: &Value) -> Result<Vec<LineItem>> {
        let Some(tickets) = order.get("tickets").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };

        let items = tickets
            .iter()
            .map(|ticket| {
                Ok(LineItem {
                    label: first_string(ticket, &["ticket_type_name", "ticketTypeName", "name"])
                        .unwrap_or_else(|| super::DEFAULT_TICKET_LABEL.to_string()),
                    quantity: ticket_count(ticket)?,
                    unit_price_cents: major_to_cents(ticket.get("price")).unwrap_or(0),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        check_ticket_total(&items)?;
        Ok(items)
    }

    fn totals(order: &Value) -> OrderTotals {
        let breakdown = order.get("totals");
        let from_breakdown =
            |key: &str| breakdown.and_then(|t| major_to_cents(t.get(key))).unwrap_or(0);

        let gross_cents = breakdown
            .and_then(|t| major_to_cents(t.get("total")))
            .or_else(|| major_to_cents(order.get("total_amount")))
            .or_else(|| major_to_cents(order.get("totalAmount")))
            .unwrap_or(0);

        let fees_cents = match breakdown {
            Some(_) => {
                from_breakdown("humanitixFee") + from_breakdown("bookingFee")
                    + from_breakdown("passedOnFee")
            }
            None => major_to_cents(order.get("fees")).unwrap_or(0),
        };

        let tax_cents = breakdown
            .and_then(|t| major_to_cents(t.get("gst")).or_else(|| major_to_cents(t.get("tax"))))
            .unwrap_or(0);

        let net_cents = major_to_cents(order.get("net_amount"))
            .or_else(|| major_to_cents(order.get("netAmount")))
            .unwrap_or(gross_cents - fees_cents);

        OrderTotals {
            gross_cents,
            fees_cents,
            net_cents,
            tax_cents,
        }
    }

    fn refund(order: &Value) -> Option<RefundInfo> {
        if let Some(refund) = order.get("refund").filter(|r| r.is_object()) {
            let amount_cents = major_to_cents(refund.get("amount"))?;
            return Some(RefundInfo {
                refund_id: first_string(refund, &["id", "refundId"]),
                amount_cents,
            });
        }

        order
            .get("totals")
            .and_then(|t| major_to_cents(t.get("refunds")))
            .filter(|amount| *amount > 0)
            .map(|amount_cents| RefundInfo {
                refund_id: None,
                amount_cents,
            })
    }
}

impl PlatformNormalizer for HumanitixNormalizer {
    fn platform(&self) -> Platform {
        Platform::Humanitix
    }

    fn signature_header(&self) -> &'static str {
        "x-humanitix-signature"
    }

    fn event_type(&self, payload: &Value) -> Option<String> {
        first_string(payload, &["event_type", "eventType"])
    }

    fn classify(&self, event_type: &str) -> EventKind {
        match event_type {
            "order.created" | "order.updated" | "order.paid" => EventKind::Paid,
            "order.refunded" => EventKind::Refunded,
            "order.cancelled" => EventKind::Cancelled,
            _ => EventKind::Ignored,
        }
    }

    fn locate_order(&self, payload: &Value) -> Result<(OrderSource, OrderHint)> {
        let data = payload.get("data").unwrap_or(&Value::Null);
        let order = data
            .get("order")
            .filter(|o| o.is_object())
            .ok_or_else(|| IngestError::Validation("缺少 data.order".to_string()))?;

        let hint = OrderHint {
            external_event_id: data.get("event").and_then(|e| first_string(e, &["id"])),
            source_url: None,
        };

        Ok((OrderSource::Embedded(order.clone()), hint))
    }

    fn normalize_order(&self, order: &Value, hint: &OrderHint) -> Result<NormalizedOrder> {
        let external_order_id = require(first_string(order, &["id", "_id"]), "订单号")?;
        let external_event_id = require(
            hint.external_event_id
                .clone()
                .or_else(|| first_string(order, &["event_id", "eventId"])),
            "平台活动 ID",
        )?;

        let totals = Self::totals(order);
        let mut line_items = Self::line_items(order)?;
        if line_items.is_empty() {
            line_items = default_line_items(totals.gross_cents);
        }

        let customer = order.get("customer").unwrap_or(&Value::Null);

        Ok(NormalizedOrder {
            platform: Platform::Humanitix,
            external_event_id,
            external_order_id,
            lifecycle: Self::lifecycle(order),
            customer_name: customer_name(customer),
            customer_email: first_string(customer, &["email"]),
            line_items,
            totals,
            currency: first_string(order, &["currency"])
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            purchase_date: parse_timestamp(order.get("created_at"))
                .or_else(|| parse_timestamp(order.get("createdAt"))),
            source_updated_at: parse_timestamp(order.get("updated_at"))
                .or_else(|| parse_timestamp(order.get("updatedAt"))),
            refund: Self::refund(order),
            raw: order.clone(),
        })
    }
}
