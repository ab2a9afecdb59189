use serde::{Deserialize, Serialize};

/// Sentinel values published instead of nulls so the presentation layer
/// never has to branch on missing data.
pub const NO_ACTIVE_ORDER: &str = "No Active Order";
pub const NO_DRIVER: &str = "No Driver Assigned";
pub const NO_ETA: &str = "No ETA Available";
pub const NO_RESTAURANT: &str = "No Restaurant";
pub const NO_MAP: &str = "No Map Available";
pub const NO_LATEST_ARRIVAL: &str = "No Latest Arrival";
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Delivery progress derived from the platform's integer progress code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStage {
    Preparing,
    PickedUp,
    EnRoute,
    Arriving,
    Delivered,
    Complete,
    Unknown,
    NoActiveOrder,
}

impl OrderStage {
    pub fn from_progress(code: i64) -> Self {
        match code {
            0 => OrderStage::Preparing,
            1 => OrderStage::PickedUp,
            2 => OrderStage::EnRoute,
            3 => OrderStage::Arriving,
            4 => OrderStage::Delivered,
            5 => OrderStage::Complete,
            _ => OrderStage::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderStage::Preparing => "preparing",
            OrderStage::PickedUp => "picked up",
            OrderStage::EnRoute => "en route",
            OrderStage::Arriving => "arriving",
            OrderStage::Delivered => "delivered",
            OrderStage::Complete => "complete",
            OrderStage::Unknown => "unknown",
            OrderStage::NoActiveOrder => NO_ACTIVE_ORDER,
        }
    }
}

/// Reverse-geocoded address components for the order's display location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub road: String,
    pub suburb: String,
    pub quarter: String,
    pub county: String,
    pub display: String,
}

impl Address {
    /// The all-sentinel address used whenever geocoding is skipped or fails.
    pub fn unresolved() -> Self {
        Self {
            road: NO_DRIVER.to_string(),
            suburb: NO_DRIVER.to_string(),
            quarter: NO_DRIVER.to_string(),
            county: NO_DRIVER.to_string(),
            display: NO_DRIVER.to_string(),
        }
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::unresolved()
    }
}

/// One fully-normalized in-flight order. Every field holds a documented
/// sentinel when the upstream payload omits it; nothing here is ever absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub stage: OrderStage,
    pub status_text: String,
    pub restaurant_name: String,
    pub driver_name: String,
    pub driver_picture_url: Option<String>,
    pub driver_phone: String,
    pub eta_label: String,
    pub eta_timestamp: Option<chrono::NaiveDateTime>,
    pub minutes_remaining: Option<i64>,
    pub driver_coords: Option<GeoPoint>,
    pub store_coords: Option<GeoPoint>,
    pub home_coords: Option<GeoPoint>,
    pub address: Address,
    pub map_url: String,
    pub latest_arrival: String,
}

impl OrderRecord {
    /// Effective display location: driver first, then store, then home.
    pub fn display_coords(&self) -> Option<GeoPoint> {
        self.driver_coords.or(self.store_coords).or(self.home_coords)
    }
}

/// True when the name denotes an actual courier rather than one of the
/// "no driver" sentinels.
pub fn is_driver_assigned(name: &str) -> bool {
    !matches!(name.trim(), "" | NO_DRIVER | UNKNOWN)
}

/// The normalized state of zero-or-more concurrently active orders at one
/// point in time. Rebuilt from scratch every poll cycle, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub active: bool,
    pub orders: Vec<OrderRecord>,
}

impl OrderSnapshot {
    pub fn empty() -> Self {
        Self {
            active: false,
            orders: Vec::new(),
        }
    }

    pub fn from_orders(orders: Vec<OrderRecord>) -> Self {
        Self {
            active: !orders.is_empty(),
            orders,
        }
    }

    pub fn first(&self) -> Option<&OrderRecord> {
        self.orders.first()
    }

    pub fn order_id(&self) -> &str {
        self.first().map_or(NO_ACTIVE_ORDER, |o| o.order_id.as_str())
    }

    pub fn status_text(&self) -> &str {
        self.first().map_or(NO_ACTIVE_ORDER, |o| o.status_text.as_str())
    }

    pub fn restaurant_name(&self) -> &str {
        self.first().map_or(NO_RESTAURANT, |o| o.restaurant_name.as_str())
    }

    pub fn driver_name(&self) -> &str {
        self.first().map_or(NO_DRIVER, |o| o.driver_name.as_str())
    }

    pub fn has_driver(&self) -> bool {
        self.orders
            .iter()
            .any(|o| is_driver_assigned(&o.driver_name))
    }

    /// Generic projection over the first order. Always yields a
    /// displayable string.
    pub fn field(&self, field: Field) -> String {
        let first = self.first();
        match field {
            Field::Stage => {
                first.map_or(NO_ACTIVE_ORDER.to_string(), |o| o.stage.label().to_string())
            }
            Field::Status => self.status_text().to_string(),
            Field::Restaurant => self.restaurant_name().to_string(),
            Field::DriverName => self.driver_name().to_string(),
            Field::DriverPhone => first.map_or(String::new(), |o| o.driver_phone.clone()),
            Field::EtaLabel => first.map_or(NO_ETA.to_string(), |o| o.eta_label.clone()),
            Field::MinutesRemaining => first
                .and_then(|o| o.minutes_remaining)
                .map_or(NO_ETA.to_string(), |m| m.to_string()),
            Field::Latitude => first
                .and_then(OrderRecord::display_coords)
                .map_or(NO_ACTIVE_ORDER.to_string(), |p| p.lat.to_string()),
            Field::Longitude => first
                .and_then(OrderRecord::display_coords)
                .map_or(NO_ACTIVE_ORDER.to_string(), |p| p.lon.to_string()),
            Field::Street => first.map_or(NO_DRIVER.to_string(), |o| o.address.road.clone()),
            Field::Suburb => first.map_or(NO_DRIVER.to_string(), |o| o.address.suburb.clone()),
            Field::Quarter => first.map_or(NO_DRIVER.to_string(), |o| o.address.quarter.clone()),
            Field::County => first.map_or(NO_DRIVER.to_string(), |o| o.address.county.clone()),
            Field::Address => first.map_or(NO_DRIVER.to_string(), |o| o.address.display.clone()),
            Field::MapUrl => first.map_or(NO_MAP.to_string(), |o| o.map_url.clone()),
            Field::LatestArrival => {
                first.map_or(NO_LATEST_ARRIVAL.to_string(), |o| o.latest_arrival.clone())
            }
            Field::OrderId => self.order_id().to_string(),
        }
    }
}

/// Selector for the flat scalar fields mirrored from `orders[0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Stage,
    Status,
    Restaurant,
    DriverName,
    DriverPhone,
    EtaLabel,
    MinutesRemaining,
    Latitude,
    Longitude,
    Street,
    Suburb,
    Quarter,
    County,
    Address,
    MapUrl,
    LatestArrival,
    OrderId,
}

impl Field {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "stage" => Some(Field::Stage),
            "status" => Some(Field::Status),
            "restaurant" => Some(Field::Restaurant),
            "driver_name" => Some(Field::DriverName),
            "driver_phone" => Some(Field::DriverPhone),
            "eta_label" => Some(Field::EtaLabel),
            "minutes_remaining" => Some(Field::MinutesRemaining),
            "latitude" => Some(Field::Latitude),
            "longitude" => Some(Field::Longitude),
            "street" => Some(Field::Street),
            "suburb" => Some(Field::Suburb),
            "quarter" => Some(Field::Quarter),
            "county" => Some(Field::County),
            "address" => Some(Field::Address),
            "map_url" => Some(Field::MapUrl),
            "latest_arrival" => Some(Field::LatestArrival),
            "order_id" => Some(Field::OrderId),
            _ => None,
        }
    }
}
