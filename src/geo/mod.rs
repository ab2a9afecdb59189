use serde_json::Value;
use tracing::debug;

use crate::error::AppError;
use crate::models::order::{Address, GeoPoint, NO_DRIVER};

const EARTH_RADIUS_M: f64 = 6_371_000.0;
const FEET_PER_METER: f64 = 3.28084;

/// Great-circle distance in feet between two points.
pub fn haversine_feet(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lon = (delta_lon / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lon * sin_lon;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_M * central_angle * FEET_PER_METER
}

/// Reverse-geocoding client. Failures are local and silent: the caller
/// always gets an address, possibly the all-sentinel one.
pub struct Geocoder {
    http: reqwest::Client,
    base_url: String,
}

impl Geocoder {
    pub fn new(base_url: String) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent(concat!("eats-tracker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| AppError::Internal(format!("failed to create geocoder client: {err}")))?;

        Ok(Self { http, base_url })
    }

    pub async fn reverse(&self, point: GeoPoint) -> Address {
        match self.try_reverse(point).await {
            Ok(address) => address,
            Err(err) => {
                debug!(error = %err, lat = point.lat, lon = point.lon, "reverse geocode failed");
                Address::unresolved()
            }
        }
    }

    async fn try_reverse(&self, point: GeoPoint) -> Result<Address, AppError> {
        let url = format!(
            "{}?format=json&lat={}&lon={}&zoom=17&addressdetails=1&accept-language=en",
            self.base_url, point.lat, point.lon
        );

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| AppError::Upstream(format!("geocoder request failed: {err}")))?;

        if !resp.status().is_success() {
            return Err(AppError::Upstream(format!(
                "geocoder returned {}",
                resp.status()
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|err| AppError::Upstream(format!("geocoder returned malformed json: {err}")))?;

        Ok(parse_address(&body))
    }
}

pub(crate) fn parse_address(body: &Value) -> Address {
    let addr = body.get("address").cloned().unwrap_or(Value::Null);
    let component = |keys: &[&str]| -> String {
        keys.iter()
            .filter_map(|k| addr.get(k).and_then(Value::as_str))
            .find(|s| !s.is_empty())
            .unwrap_or(NO_DRIVER)
            .to_string()
    };

    Address {
        road: component(&["road", "pedestrian", "footway"]),
        suburb: component(&["suburb"]),
        quarter: component(&["quarter"]),
        county: component(&["county"]),
        display: body
            .get("display_name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(NO_DRIVER)
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 40.7128,
            lon: -74.0060,
        };
        assert!(haversine_feet(p, p) < 1e-6);
    }

    #[test]
    fn london_to_paris_is_around_343_km_in_feet() {
        let london = GeoPoint {
            lat: 51.5074,
            lon: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lon: 2.3522,
        };
        let feet = haversine_feet(london, paris);
        let km = feet / FEET_PER_METER / 1000.0;
        assert!((km - 343.0).abs() < 5.0);
    }

    #[test]
    fn address_falls_back_through_road_aliases() {
        let body = json!({
            "address": { "pedestrian": "Market Walk", "suburb": "Astoria" },
            "display_name": "Market Walk, Astoria"
        });
        let address = parse_address(&body);
        assert_eq!(address.road, "Market Walk");
        assert_eq!(address.suburb, "Astoria");
        assert_eq!(address.quarter, NO_DRIVER);
        assert_eq!(address.display, "Market Walk, Astoria");
    }

    #[test]
    fn malformed_geocoder_body_yields_sentinels() {
        let address = parse_address(&json!({"unexpected": true}));
        assert_eq!(address, Address::unresolved());
    }
}
