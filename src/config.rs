use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::notify::Sink;
use crate::error::AppError;
use crate::models::order::GeoPoint;

pub const DEFAULT_API_BASE_URL: &str = "https://www.ubereats.com/api";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/reverse";
pub const DEFAULT_MESSAGE_PREFIX: &str = "Message from Uber Eats";

/// Credentials for an account registered at startup rather than over the
/// REST surface.
#[derive(Debug, Clone)]
pub struct BootstrapAccount {
    pub cookie: String,
    pub account_name: String,
    pub time_zone: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub api_base_url: String,
    pub geocoder_url: String,
    pub poll_interval: Duration,
    pub event_buffer_size: usize,
    pub message_prefix: String,
    pub interval_updates: bool,
    /// Minutes between interval updates while a driver is assigned; 5-15.
    pub interval_minutes: u64,
    /// Proximity trigger threshold in feet; 50-2000.
    pub nearby_distance_feet: f64,
    pub nearby_trigger_url: Option<String>,
    pub home: Option<GeoPoint>,
    pub cache_dir: PathBuf,
    pub sinks: Vec<Sink>,
    pub bootstrap: Option<BootstrapAccount>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let sinks = match env::var("NOTIFY_SINKS") {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|err| AppError::Internal(format!("invalid NOTIFY_SINKS: {err}")))?,
            Err(_) => Vec::new(),
        };

        let home = match (env::var("HOME_LAT"), env::var("HOME_LON")) {
            (Ok(lat), Ok(lon)) => Some(GeoPoint {
                lat: lat
                    .parse()
                    .map_err(|err| AppError::Internal(format!("invalid HOME_LAT: {err}")))?,
                lon: lon
                    .parse()
                    .map_err(|err| AppError::Internal(format!("invalid HOME_LON: {err}")))?,
            }),
            _ => None,
        };

        let bootstrap = env::var("COOKIE").ok().map(|cookie| BootstrapAccount {
            cookie,
            account_name: env::var("ACCOUNT_NAME").unwrap_or_default(),
            time_zone: env::var("TIME_ZONE").unwrap_or_else(|_| "UTC".to_string()),
        });

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()),
            geocoder_url: env::var("GEOCODER_URL")
                .unwrap_or_else(|_| DEFAULT_GEOCODER_URL.to_string()),
            poll_interval: Duration::from_secs(parse_or_default("POLL_INTERVAL_SECS", 15)?),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 256)?,
            message_prefix: env::var("MESSAGE_PREFIX")
                .unwrap_or_else(|_| DEFAULT_MESSAGE_PREFIX.to_string()),
            interval_updates: parse_or_default("INTERVAL_UPDATES_ENABLED", false)?,
            interval_minutes: parse_or_default("INTERVAL_MINUTES", 10u64)?.clamp(5, 15),
            nearby_distance_feet: parse_or_default("NEARBY_DISTANCE_FEET", 200.0f64)?
                .clamp(50.0, 2000.0),
            nearby_trigger_url: env::var("NEARBY_TRIGGER_URL").ok(),
            home,
            cache_dir: PathBuf::from(
                env::var("CACHE_DIR").unwrap_or_else(|_| ".cache".to_string()),
            ),
            sinks,
            bootstrap,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
