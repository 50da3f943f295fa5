//! Eventbrite 归一化
//!
//! Webhook 载荷：`{config: {action}, api_url, order?}`。通常只给出订单的 `api_url`，
//! 需要回源拉取订单详情。金额字段 `costs.*.value` 已经是分。

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{
    DEFAULT_CURRENCY, OrderHint, OrderSource, PlatformNormalizer, check_ticket_total,
    customer_name, default_line_items, first_string, parse_timestamp, require, ticket_count,
};
use crate::error::{IngestError, Result};
use crate::models::{
    EventKind, LineItem, NormalizedOrder, OrderLifecycle, OrderTotals, Platform, RefundInfo,
};

static EVENT_ID_IN_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/events/(\d+)/").expect("event id pattern is valid"));

#[derive(Debug, Default, Clone, Copy)]
pub struct EventbriteNormalizer;

impl EventbriteNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// 从 API 地址中提取活动 ID，如 `.../v3/events/123/orders/456/`
    pub fn event_id_from_url(url: &str) -> Option<String> {
        EVENT_ID_IN_URL
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// 金额对象 `{value, currency, major_value}`，优先取 value（分）
    fn money(costs: Option<&Value>, key: &str) -> Option<i64> {
        let money = costs?.get(key)?;
        money.get("value").and_then(Value::as_i64).or_else(|| {
            money
                .get("major_value")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<f64>().ok())
                .map(|v| (v * 100.0).round() as i64)
        })
    }

    fn lifecycle(order: &Value) -> OrderLifecycle {
        if order.get("refunded").and_then(Value::as_bool) == Some(true) {
            return OrderLifecycle::Refunded;
        }
        match order
            .get("status")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("placed") | Some("paid") | Some("completed") => OrderLifecycle::Paid,
            Some("refunded") => OrderLifecycle::Refunded,
            Some("cancelled") | Some("canceled") | Some("deleted") => OrderLifecycle::Cancelled,
            _ => OrderLifecycle::Unpaid,
        }
    }

    fn totals(order: &Value) -> OrderTotals {
        let costs = order.get("costs");
        let gross_cents = Self::money(costs, "gross").unwrap_or(0);
        let fees_cents = Self::money(costs, "eventbrite_fee").unwrap_or(0)
            + Self::money(costs, "payment_fee").unwrap_or(0);
        let tax_cents = Self::money(costs, "tax").unwrap_or(0);
        let net_cents = Self::money(costs, "base_price")
            .unwrap_or(gross_cents - fees_cents - tax_cents);

        OrderTotals {
            gross_cents,
            fees_cents,
            net_cents,
            tax_cents,
        }
    }

    fn line_items(order: &Value) -> Result<Vec<LineItem>> {
        let Some(attendees) = order.get("attendees").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };

        let items = attendees
            .iter()
            .map(|attendee| {
                Ok(LineItem {
                    label: first_string(attendee, &["ticket_class_name"])
                        .unwrap_or_else(|| super::DEFAULT_TICKET_LABEL.to_string()),
                    quantity: ticket_count(attendee)?,
                    unit_price_cents: Self::money(attendee.get("costs"), "gross").unwrap_or(0),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        check_ticket_total(&items)?;
        Ok(items)
    }
}

impl PlatformNormalizer for EventbriteNormalizer {
    fn platform(&self) -> Platform {
        Platform::Eventbrite
    }

    fn signature_header(&self) -> &'static str {
        "x-eventbrite-signature"
    }

    fn event_type(&self, payload: &Value) -> Option<String> {
        payload
            .get("config")
            .and_then(|config| first_string(config, &["action"]))
    }

    fn classify(&self, event_type: &str) -> EventKind {
        match event_type {
            "order.placed" | "order.updated" => EventKind::Paid,
            "order.refunded" => EventKind::Refunded,
            _ => EventKind::Ignored,
        }
    }

    fn locate_order(&self, payload: &Value) -> Result<(OrderSource, OrderHint)> {
        let api_url = first_string(payload, &["api_url"]);
        let hint = OrderHint {
            external_event_id: api_url.as_deref().and_then(Self::event_id_from_url),
            source_url: api_url.clone(),
        };

        if let Some(order) = payload.get("order").filter(|o| o.is_object()) {
            return Ok((OrderSource::Embedded(order.clone()), hint));
        }

        match api_url {
            Some(url) => Ok((OrderSource::Remote(url), hint)),
            None => Err(IngestError::Validation(
                "缺少 api_url 且未内嵌订单".to_string(),
            )),
        }
    }

    fn normalize_order(&self, order: &Value, hint: &OrderHint) -> Result<NormalizedOrder> {
        let external_order_id = require(first_string(order, &["id"]), "订单号")?;
        let external_event_id = require(
            first_string(order, &["event_id"])
                .or_else(|| hint.external_event_id.clone())
                .or_else(|| {
                    first_string(order, &["resource_uri"])
                        .as_deref()
                        .and_then(Self::event_id_from_url)
                }),
            "平台活动 ID",
        )?;

        let totals = Self::totals(order);
        let mut line_items = Self::line_items(order)?;
        if line_items.is_empty() {
            line_items = default_line_items(totals.gross_cents);
        }

        let lifecycle = Self::lifecycle(order);
        // Eventbrite 只提供退款标记，按全额退款处理
        let refund = (lifecycle == OrderLifecycle::Refunded).then_some(RefundInfo {
            refund_id: None,
            amount_cents: totals.gross_cents,
        });

        let currency = order
            .get("costs")
            .and_then(|c| c.get("gross"))
            .and_then(|g| first_string(g, &["currency"]))
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        Ok(NormalizedOrder {
            platform: Platform::Eventbrite,
            external_event_id,
            external_order_id,
            lifecycle,
            customer_name: customer_name(order),
            customer_email: first_string(order, &["email"]),
            line_items,
            totals,
            currency,
            purchase_date: parse_timestamp(order.get("created")),
            source_updated_at: parse_timestamp(order.get("changed")),
            refund,
            raw: order.clone(),
        })
    }
}
