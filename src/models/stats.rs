use serde::{Deserialize, Serialize};

/// One completed order from the past-orders endpoint, already filtered to
/// the current calendar year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PastOrder {
    pub uuid: String,
    pub store_uuid: String,
    pub restaurant_name: String,
    pub hero_image_url: String,
    pub date: String,
    pub completed_at: String,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub tax: f64,
    /// Sum of all discounts and credits; negative by convention.
    pub promotions: f64,
    pub total: f64,
    pub store_address: String,
    pub store_rating: Option<f64>,
    pub is_cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantStat {
    pub name: String,
    pub order_count: u32,
    pub total_spent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatistics {
    pub year: i32,
    pub total_orders: u32,
    pub total_spent: f64,
    pub total_delivery_fees: f64,
    pub top_restaurants: Vec<RestaurantStat>,
}

impl OrderStatistics {
    pub fn empty(year: i32) -> Self {
        Self {
            year,
            total_orders: 0,
            total_spent: 0.0,
            total_delivery_fees: 0.0,
            top_restaurants: Vec::new(),
        }
    }
}

/// The JSON mirror written to the on-disk cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PastOrdersData {
    pub orders: Vec<PastOrder>,
    pub statistics: OrderStatistics,
}
