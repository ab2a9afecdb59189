//! The single normalization boundary: untyped upstream JSON goes in,
//! fully-sentineled [`OrderRecord`]s come out. Downstream code never
//! touches raw JSON.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde_json::Value;
use tracing::warn;

use crate::geo::Geocoder;
use crate::models::order::{
    GeoPoint, NO_LATEST_ARRIVAL, NO_MAP, OrderRecord, OrderSnapshot, OrderStage, UNKNOWN,
};

/// Normalize a batch of raw order objects into a snapshot, resolving the
/// reverse-geocoded address per order. `now` is the local wall-clock time
/// used for ETA math.
pub async fn normalize(
    raw_orders: &[Value],
    geocoder: &Geocoder,
    home: Option<GeoPoint>,
    now: NaiveDateTime,
) -> OrderSnapshot {
    let mut orders = Vec::with_capacity(raw_orders.len());
    for raw in raw_orders {
        let mut record = normalize_order(raw, home, now);
        if let Some(point) = record.display_coords() {
            record.address = geocoder.reverse(point).await;
        }
        orders.push(record);
    }
    OrderSnapshot::from_orders(orders)
}

/// Normalize one raw order object. Pure; tolerates any missing key, wrong
/// type, or empty array by falling back to the documented sentinel.
pub fn normalize_order(raw: &Value, home: Option<GeoPoint>, now: NaiveDateTime) -> OrderRecord {
    let feed_cards = raw.get("feedCards").and_then(Value::as_array);
    let status = raw.pointer("/feedCards/0/status");

    // Any feed card at all means an order in progress; a missing progress
    // code reads as the initial "preparing" stage, not as no order.
    let stage = match feed_cards {
        Some(cards) if !cards.is_empty() => OrderStage::from_progress(
            status
                .and_then(|s| s.get("currentProgress"))
                .and_then(Value::as_i64)
                .unwrap_or(0),
        ),
        _ => OrderStage::NoActiveOrder,
    };

    let status_text = status.map_or_else(|| UNKNOWN.to_string(), status_summary);

    let eta_label = status
        .and_then(|s| s.get("title"))
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN)
        .to_string();
    let eta_timestamp = parse_eta(&eta_label, now);
    let minutes = eta_timestamp.map(|eta| minutes_remaining(eta, now));

    let latest_arrival = status
        .and_then(|s| s.pointer("/statusSummary/text"))
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN)
        .to_string();

    let (eater, store, courier) = map_entities(raw);
    let home_coords = eater.or(home);

    let restaurant_name = raw
        .pointer("/activeOrderOverview/title")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN)
        .to_string();

    let driver_name = raw
        .pointer("/contacts/0/title")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN)
        .to_string();

    let driver_picture_url = raw
        .pointer("/feedCards")
        .and_then(Value::as_array)
        .and_then(|cards| {
            cards
                .iter()
                .find(|c| c.get("type").and_then(Value::as_str) == Some("courier"))
        })
        .and_then(|card| card.pointer("/courier/0/iconUrl"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let driver_phone = driver_contact(raw)
        .map(|contact| {
            contact
                .get("formattedPhoneNumber")
                .or_else(|| contact.get("phoneNumber"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        })
        .unwrap_or_default();

    let display = courier.or(store).or(home_coords);
    let map_url = display.map_or_else(|| NO_MAP.to_string(), embed_map_url);

    OrderRecord {
        order_id: raw
            .get("uuid")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN)
            .to_string(),
        stage,
        status_text,
        restaurant_name,
        driver_name,
        driver_picture_url,
        driver_phone,
        eta_label,
        eta_timestamp,
        minutes_remaining: minutes,
        driver_coords: courier,
        store_coords: store,
        home_coords,
        address: Default::default(),
        map_url,
        latest_arrival: if latest_arrival.is_empty() {
            NO_LATEST_ARRIVAL.to_string()
        } else {
            latest_arrival
        },
    }
}

/// Timeline text with its two fallback paths: `timelineSummary` as either
/// a bare string or `{text}`, then `titleSummary.summary.text`.
fn status_summary(status: &Value) -> String {
    let timeline = match status.get("timelineSummary") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(_)) => status
            .pointer("/timelineSummary/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    };

    let text = if timeline.trim().is_empty() {
        status
            .pointer("/titleSummary/summary/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    } else {
        timeline
    };

    let text = text.trim();
    if text.is_empty() {
        UNKNOWN.to_string()
    } else {
        text.to_string()
    }
}

/// Scan the map-entity list for EATER (home), STORE (restaurant) and
/// COURIER (driver) positions; the store has a secondary source under
/// `orderInfo.storeInfo.location`.
fn map_entities(raw: &Value) -> (Option<GeoPoint>, Option<GeoPoint>, Option<GeoPoint>) {
    let mut eater = None;
    let mut store = None;
    let mut courier = None;

    if let Some(entities) = raw
        .pointer("/backgroundFeedCards/0/mapEntity")
        .and_then(Value::as_array)
    {
        for entity in entities {
            let lat = entity.get("latitude").and_then(Value::as_f64);
            let lon = entity.get("longitude").and_then(Value::as_f64);
            let (Some(lat), Some(lon)) = (lat, lon) else {
                continue;
            };
            let point = Some(GeoPoint { lat, lon });
            match entity.get("type").and_then(Value::as_str) {
                Some("EATER") => eater = point,
                Some("STORE") => store = point,
                Some("COURIER") => courier = point,
                _ => {}
            }
        }
    }

    if store.is_none() {
        let lat = raw
            .pointer("/orderInfo/storeInfo/location/latitude")
            .and_then(Value::as_f64);
        let lon = raw
            .pointer("/orderInfo/storeInfo/location/longitude")
            .and_then(Value::as_f64);
        if let (Some(lat), Some(lon)) = (lat, lon) {
            store = Some(GeoPoint { lat, lon });
        }
    }

    (eater, store, courier)
}

fn driver_contact(raw: &Value) -> Option<&Value> {
    let contacts = raw.get("contacts").and_then(Value::as_array)?;
    contacts
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some("COURIER"))
        .or_else(|| contacts.first())
}

fn embed_map_url(point: GeoPoint) -> String {
    let (min_lon, min_lat) = (point.lon - 0.001, point.lat - 0.001);
    let (max_lon, max_lat) = (point.lon + 0.001, point.lat + 0.001);
    format!(
        "https://www.openstreetmap.org/export/embed.html?bbox={min_lon}%2C{min_lat}%2C{max_lon}%2C{max_lat}&layer=mapnik&marker={}%2C{}",
        point.lat, point.lon
    )
}

/// Parse an `HH:MM AM/PM` ETA label into an absolute wall-clock time.
/// A clock time already in the past rolls to the next calendar day. Any
/// other format fails closed.
pub fn parse_eta(label: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let label = label.trim();
    if label.is_empty() || label == "N/A" || label == UNKNOWN {
        return None;
    }

    let time = match NaiveTime::parse_from_str(label, "%I:%M %p") {
        Ok(time) => time,
        Err(_) => {
            warn!(eta = %label, "unparseable eta label");
            return None;
        }
    };

    let mut eta = now.date().and_time(time);
    if eta < now {
        eta += Duration::days(1);
    }
    Some(eta)
}

/// Whole minutes until `eta`, clamped to zero; no wraparound.
pub fn minutes_remaining(eta: NaiveDateTime, now: NaiveDateTime) -> i64 {
    let secs = (eta - now).num_seconds();
    if secs <= 0 { 0 } else { secs / 60 }
}
