//! Message rendering and sink fan-out. Delivery is fire-and-forget: a
//! failing sink is logged and never feeds back into poll-owned state.

use std::sync::Arc;

use futures::future::join_all;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::models::event::{Event, EventEnvelope, EventKind};
use crate::models::order::{NO_ACTIVE_ORDER, NO_DRIVER, OrderSnapshot, UNKNOWN};
use crate::observability::metrics::Metrics;

fn default_volume() -> f64 {
    0.5
}

/// One configured notification output. Parsed from the `NOTIFY_SINKS`
/// JSON array.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Sink {
    /// Speech-synthesis bridge: receives the message and a volume level.
    Speech {
        url: String,
        #[serde(default = "default_volume")]
        volume: f64,
    },
    /// Generic webhook: receives the full event envelope.
    Webhook { url: String },
    /// Structured log line only.
    Log,
}

impl Sink {
    pub fn display_name(&self) -> String {
        match self {
            Sink::Speech { url, .. } => format!("speech({url})"),
            Sink::Webhook { url } => format!("webhook({url})"),
            Sink::Log => "log".to_string(),
        }
    }

    async fn deliver(
        &self,
        http: &reqwest::Client,
        envelope: &EventEnvelope,
    ) -> Result<(), AppError> {
        match self {
            Sink::Speech { url, volume } => {
                let payload = json!({
                    "message": envelope.event.message,
                    "volume_level": volume.clamp(0.0, 1.0),
                });
                post_json(http, url, &payload).await
            }
            Sink::Webhook { url } => {
                let payload = serde_json::to_value(envelope).map_err(|err| {
                    AppError::Internal(format!("failed to serialize event: {err}"))
                })?;
                post_json(http, url, &payload).await
            }
            Sink::Log => {
                info!(
                    account = %envelope.account_name,
                    kind = envelope.event.kind.as_str(),
                    order_id = %envelope.event.order_id,
                    message = %envelope.event.message,
                    "order event"
                );
                Ok(())
            }
        }
    }
}

async fn post_json(
    http: &reqwest::Client,
    url: &str,
    payload: &serde_json::Value,
) -> Result<(), AppError> {
    let resp = http
        .post(url)
        .json(payload)
        .send()
        .await
        .map_err(|err| AppError::Upstream(format!("sink request failed: {err}")))?;

    if !resp.status().is_success() {
        return Err(AppError::Upstream(format!(
            "sink returned {}",
            resp.status()
        )));
    }
    Ok(())
}

/// Render the notification message for one event. An empty result
/// suppresses message dispatch for that event.
pub fn build_message(
    prefix: &str,
    account_name: &str,
    snapshot: &OrderSnapshot,
    event: &Event,
) -> String {
    let record = snapshot
        .orders
        .iter()
        .find(|o| o.order_id == event.order_id)
        .or_else(|| snapshot.first());

    let restaurant = record
        .map(|o| o.restaurant_name.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN);
    let driver = record
        .map(|o| o.driver_name.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(NO_DRIVER);
    let user = if account_name.trim().is_empty() {
        "you"
    } else {
        account_name.trim()
    };

    match event.kind {
        EventKind::NewOrder => {
            format!("{prefix}, a new {restaurant} order received for {user}.")
        }
        EventKind::DriverAssigned => {
            format!("{prefix}, {user}, {driver} has been assigned to your {restaurant} order.")
        }
        EventKind::DriverUnassigned => {
            format!("{prefix}, {user}, your {restaurant} order no longer has a driver assigned.")
        }
        EventKind::StatusChange => {
            let status = record.map(|o| o.status_text.trim()).unwrap_or_default();
            if status.is_empty() || status == UNKNOWN || status == NO_ACTIVE_ORDER {
                return String::new();
            }
            format!("{prefix}, regarding {user}'s {restaurant} order, {status}.")
        }
        EventKind::IntervalUpdate => {
            let Some(record) = record else {
                return String::new();
            };
            let street = match record.address.road.trim() {
                "" | NO_DRIVER | UNKNOWN => "unknown street",
                road => road,
            };
            let county = non_sentinel(&record.address.county);
            let suburb = non_sentinel(&record.address.suburb);
            // New York counties read oddly in speech; prefer the suburb there.
            let place = if county.is_some_and(|c| c.to_lowercase().contains("new york")) {
                suburb.or(county)
            } else {
                county.or(suburb)
            }
            .unwrap_or("unknown area");
            let eta = match record.eta_label.trim() {
                "" | UNKNOWN => "soon",
                label => label,
            };
            let minutes = record
                .minutes_remaining
                .map_or_else(|| "a while".to_string(), |m| format!("{m} minutes"));
            format!(
                "{prefix}, {driver} was last seen near {street} in {place}, \
                 expected to arrive at {eta} in {minutes}."
            )
        }
        EventKind::DriverNearby => {
            format!("{prefix}, {driver} is nearby with {user}'s {restaurant} order.")
        }
    }
}

fn non_sentinel(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty() && value != NO_DRIVER && value != UNKNOWN).then_some(value)
}

/// Fan an event out to every sink in parallel, detached from the poll
/// cycle. A proximity event additionally fires the automation trigger
/// URL, independent of message delivery.
pub fn dispatch(
    http: reqwest::Client,
    sinks: Arc<Vec<Sink>>,
    trigger_url: Option<String>,
    envelope: EventEnvelope,
    metrics: Metrics,
) {
    if envelope.event.kind == EventKind::DriverNearby
        && let Some(url) = trigger_url
    {
        let trigger_http = http.clone();
        tokio::spawn(async move {
            if let Err(err) = post_json(&trigger_http, &url, &json!({"skip_condition": false})).await
            {
                error!(error = %err, "driver nearby trigger failed");
            }
        });
    }

    if envelope.event.message.trim().is_empty() {
        return;
    }

    tokio::spawn(async move {
        let deliveries = sinks.iter().map(|sink| {
            let http = http.clone();
            let envelope = envelope.clone();
            let metrics = metrics.clone();
            async move {
                let outcome = match sink.deliver(&http, &envelope).await {
                    Ok(()) => "success",
                    Err(err) => {
                        warn!(sink = %sink.display_name(), error = %err, "sink delivery failed");
                        "error"
                    }
                };
                metrics
                    .notifications_total
                    .with_label_values(&[&sink.display_name(), outcome])
                    .inc();
            }
        });
        join_all(deliveries).await;
    });
}
