//! Snapshot diffing: compares the previous poll's snapshot against the
//! current one and classifies transition events, with per-event re-arm
//! bookkeeping. Owned exclusively by one poll loop; never errors.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::config::Config;
use crate::geo::haversine_feet;
use crate::models::event::{Event, EventKind};
use crate::models::order::{
    GeoPoint, NO_RESTAURANT, OrderSnapshot, UNKNOWN, is_driver_assigned,
};

/// Feet the driver must move back out past the threshold before the
/// proximity trigger re-arms, to absorb GPS jitter at the boundary.
const NEARBY_RESET_MARGIN_FEET: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub interval_updates: bool,
    pub interval: Duration,
    pub nearby_threshold_feet: f64,
    /// Fallback home position when an order carries no EATER entity.
    pub home: Option<GeoPoint>,
}

impl DetectorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval_updates: config.interval_updates,
            interval: Duration::minutes(config.interval_minutes as i64),
            nearby_threshold_feet: config.nearby_distance_feet,
            home: config.home,
        }
    }
}

/// Re-arm bookkeeping carried between poll cycles.
#[derive(Debug, Default)]
pub struct DetectorState {
    previous: Option<OrderSnapshot>,
    last_interval_fire: Option<DateTime<Utc>>,
    nearby_fired: HashSet<String>,
}

impl DetectorState {
    /// Diff `current` against the previous snapshot and return the events
    /// that fired. The first call only establishes the baseline.
    pub fn detect(
        &mut self,
        current: &OrderSnapshot,
        settings: &DetectorSettings,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let Some(prev) = self.previous.replace(current.clone()) else {
            return Vec::new();
        };

        let mut events = Vec::new();
        let snapshot_event =
            |kind: EventKind| Event { kind, order_id: current.order_id().to_string() };

        if !prev.active && current.active {
            let restaurant = current.restaurant_name().trim();
            if !restaurant.is_empty() && restaurant != NO_RESTAURANT && restaurant != UNKNOWN {
                events.push(snapshot_event(EventKind::NewOrder));
            }
        }

        let had_driver = prev.has_driver();
        let has_driver = current.has_driver();
        if !had_driver && has_driver {
            events.push(snapshot_event(EventKind::DriverAssigned));
            if settings.interval_updates {
                self.last_interval_fire = Some(now);
            }
        }
        if had_driver && !has_driver {
            events.push(snapshot_event(EventKind::DriverUnassigned));
            self.last_interval_fire = None;
            self.nearby_fired.clear();
        }

        let status = current.status_text();
        if current.active && !status.is_empty() && status != prev.status_text() {
            events.push(snapshot_event(EventKind::StatusChange));
        }

        if settings.interval_updates
            && has_driver
            && let Some(last) = self.last_interval_fire
            && now - last >= settings.interval
        {
            events.push(snapshot_event(EventKind::IntervalUpdate));
            self.last_interval_fire = Some(now);
        }

        self.detect_nearby(current, settings, &mut events);

        events
    }

    /// Proximity trigger, keyed per order id so concurrent orders arm and
    /// disarm independently. Fires once at or below the threshold; re-arms
    /// only past threshold + margin.
    fn detect_nearby(
        &mut self,
        current: &OrderSnapshot,
        settings: &DetectorSettings,
        events: &mut Vec<Event>,
    ) {
        let reset_feet = settings.nearby_threshold_feet + NEARBY_RESET_MARGIN_FEET;
        let mut current_ids = HashSet::new();

        for order in &current.orders {
            if order.order_id.is_empty() {
                continue;
            }
            current_ids.insert(order.order_id.clone());

            if !is_driver_assigned(&order.driver_name) {
                continue;
            }
            let Some(driver) = order.driver_coords else {
                continue;
            };
            let Some(home) = order.home_coords.or(settings.home) else {
                continue;
            };

            let distance = haversine_feet(driver, home);
            if distance > reset_feet {
                self.nearby_fired.remove(&order.order_id);
            } else if distance <= settings.nearby_threshold_feet
                && !self.nearby_fired.contains(&order.order_id)
            {
                self.nearby_fired.insert(order.order_id.clone());
                events.push(Event {
                    kind: EventKind::DriverNearby,
                    order_id: order.order_id.clone(),
                });
            }
        }

        // Ids that left the active set no longer hold trigger state.
        self.nearby_fired.retain(|id| current_ids.contains(id));
    }
}
