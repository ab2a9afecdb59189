//! Past-order parsing and per-restaurant spend aggregation.

use std::collections::HashMap;

use chrono::{DateTime, Datelike};
use serde_json::Value;

use crate::models::order::UNKNOWN;
use crate::models::stats::{OrderStatistics, PastOrder, RestaurantStat};

const TOP_RESTAURANT_COUNT: usize = 3;

/// Parse one entry of the past-orders map. Returns `None` for orders
/// outside `current_year`.
pub fn parse_past_order(order_uuid: &str, raw: &Value, current_year: i32) -> Option<PastOrder> {
    let base = raw.get("baseEaterOrder").cloned().unwrap_or(Value::Null);
    let store_info = raw.get("storeInfo").cloned().unwrap_or(Value::Null);
    let fare_info = raw.get("fareInfo").cloned().unwrap_or(Value::Null);

    let mut subtotal = 0.0;
    let mut delivery_fee = 0.0;
    let mut tax = 0.0;
    let mut promotions = 0.0;
    let mut total = fare_info
        .get("totalPrice")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        / 100.0;

    if let Some(rows) = fare_info.get("checkoutInfo").and_then(Value::as_array) {
        for row in rows {
            let key = row.get("key").and_then(Value::as_str).unwrap_or_default();
            let row_type = row.get("type").and_then(Value::as_str).unwrap_or_default();
            let raw_value = row.get("rawValue").and_then(Value::as_f64).unwrap_or(0.0);

            if key == "eats_fare.subtotal" {
                subtotal = raw_value;
            } else if key.contains("booking_fee") {
                delivery_fee = raw_value;
            } else if key == "eats.tax.base" {
                tax = raw_value;
            } else if row_type == "debit" && raw_value < 0.0 {
                promotions += raw_value;
            } else if key == "eats_fare.total" {
                total = raw_value;
            }
        }
    }

    let completed_at = base
        .get("completedAt")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| base.get("lastStateChangeAt").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    let (order_year, date) = match DateTime::parse_from_rfc3339(&completed_at) {
        Ok(parsed) => (Some(parsed.year()), parsed.format("%b %d, %Y").to_string()),
        Err(_) => (None, completed_at.chars().take(10).collect()),
    };

    if order_year != Some(current_year) {
        return None;
    }

    Some(PastOrder {
        uuid: order_uuid.to_string(),
        store_uuid: store_info
            .get("uuid")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        restaurant_name: store_info
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN)
            .to_string(),
        hero_image_url: store_info
            .get("heroImageUrl")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        date,
        completed_at,
        subtotal,
        delivery_fee,
        tax,
        promotions,
        total,
        store_address: store_info
            .pointer("/location/address/eaterFormattedAddress")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        store_rating: store_info.get("rating").and_then(Value::as_f64),
        is_cancelled: base
            .get("isCancelled")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

/// Aggregate the year's orders: totals plus the top-3 restaurants by
/// order count. Cancelled orders are excluded.
pub fn compute_statistics(orders: &[PastOrder], year: i32) -> OrderStatistics {
    if orders.is_empty() {
        return OrderStatistics::empty(year);
    }

    let mut by_store: HashMap<&str, RestaurantStat> = HashMap::new();
    let mut total_orders = 0u32;
    let mut total_spent = 0.0;
    let mut total_delivery_fees = 0.0;

    for order in orders {
        if order.is_cancelled {
            continue;
        }

        total_orders += 1;
        total_spent += order.total;
        total_delivery_fees += order.delivery_fee;

        if order.store_uuid.is_empty() {
            continue;
        }
        let stat = by_store
            .entry(order.store_uuid.as_str())
            .or_insert_with(|| RestaurantStat {
                name: order.restaurant_name.clone(),
                order_count: 0,
                total_spent: 0.0,
            });
        stat.order_count += 1;
        stat.total_spent += order.total;
    }

    let mut top_restaurants: Vec<RestaurantStat> = by_store.into_values().collect();
    top_restaurants.sort_by(|a, b| b.order_count.cmp(&a.order_count));
    top_restaurants.truncate(TOP_RESTAURANT_COUNT);

    OrderStatistics {
        year,
        total_orders,
        total_spent: round_cents(total_spent),
        total_delivery_fees: round_cents(total_delivery_fees),
        top_restaurants,
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
