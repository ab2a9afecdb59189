//! The per-account poll loop: fetch, normalize, diff, fan out, publish.
//! One cycle runs to completion before the next tick; all cross-cycle
//! state (baseline snapshot, re-arm sets, interval timer) lives in the
//! local [`DetectorState`] and is touched from nowhere else.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::engine::detect::{DetectorSettings, DetectorState};
use crate::engine::{normalize, notify};
use crate::error::AppError;
use crate::models::event::{EventEnvelope, EventRecord};
use crate::models::history::HistoryEntry;
use crate::models::order::OrderSnapshot;
use crate::state::{AccountContext, AppState};

pub async fn run_poll_loop(state: Arc<AppState>, account: Arc<AccountContext>) {
    let mut ticker = tokio::time::interval(state.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut detector = DetectorState::default();
    let settings = DetectorSettings::from_config(&state.config);

    let account_name = account.name().await;
    info!(account = %account_name, account_id = %account.id, "poll loop started");

    loop {
        ticker.tick().await;
        run_cycle(&state, &account, &mut detector, &settings).await;
    }
}

async fn run_cycle(
    state: &Arc<AppState>,
    account: &Arc<AccountContext>,
    detector: &mut DetectorState,
    settings: &DetectorSettings,
) {
    let start = Instant::now();
    let outcome = match poll_once(state, account, detector, settings).await {
        Ok(()) => "success",
        Err(AppError::AuthExpired) => {
            warn!(account_id = %account.id, "session expired; account needs reconfiguration");
            account
                .publish_cycle(OrderSnapshot::empty(), None, false, true, None, Utc::now())
                .await;
            "auth"
        }
        Err(err) => {
            error!(account_id = %account.id, error = %err, "poll cycle failed");
            account
                .publish_cycle(OrderSnapshot::empty(), None, false, false, None, Utc::now())
                .await;
            "transient"
        }
    };

    let elapsed = start.elapsed().as_secs_f64();
    state
        .metrics
        .poll_latency_seconds
        .with_label_values(&[outcome])
        .observe(elapsed);
    state
        .metrics
        .poll_cycles_total
        .with_label_values(&[outcome])
        .inc();
}

async fn poll_once(
    state: &Arc<AppState>,
    account: &Arc<AccountContext>,
    detector: &mut DetectorState,
    settings: &DetectorSettings,
) -> Result<(), AppError> {
    let tokens = account.session().await;
    let account_name = account.name().await;

    // The profile doubles as a display-name source; a failed fetch is not
    // a failed cycle.
    let profile = match state.gateway.user_profile(&tokens, &account.time_zone).await {
        Ok(profile) => {
            if let Some(name) = profile.display_name()
                && name != account_name
            {
                info!(old = %account_name, new = %name, "account name changed upstream");
                account.set_name(name).await;
            }
            Some(profile)
        }
        Err(err) => {
            debug!(account_id = %account.id, error = %err, "user profile fetch failed");
            None
        }
    };

    let raw_orders = state
        .gateway
        .active_orders(&tokens, &account.time_zone)
        .await?;

    let snapshot = normalize::normalize(
        &raw_orders,
        &state.geocoder,
        state.config.home,
        Local::now().naive_local(),
    )
    .await;

    let now = Utc::now();
    let events = detector.detect(&snapshot, settings, now);
    let account_name = account.name().await;

    for event in &events {
        state
            .metrics
            .events_total
            .with_label_values(&[event.kind.as_str()])
            .inc();

        let message = notify::build_message(
            &state.config.message_prefix,
            &account_name,
            &snapshot,
            event,
        );
        let envelope = EventEnvelope {
            account_id: account.id,
            account_name: account_name.clone(),
            at: now,
            event: EventRecord {
                kind: event.kind,
                order_id: event.order_id.clone(),
                message,
            },
        };

        // Receivers come and go with websocket clients; no subscriber is fine.
        let _ = state.events_tx.send(envelope.clone());

        notify::dispatch(
            state.notify_http.clone(),
            state.sinks.clone(),
            state.config.nearby_trigger_url.clone(),
            envelope,
            state.metrics.clone(),
        );
    }

    state
        .metrics
        .active_orders
        .with_label_values(&[&account.id.to_string()])
        .set(snapshot.orders.len() as i64);

    let entry = HistoryEntry::summarize(&snapshot, now);
    account
        .publish_cycle(snapshot, entry, true, false, profile, now)
        .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use axum::Router;
    use axum::http::StatusCode;

    use super::*;
    use crate::config::Config;
    use crate::gateway::session::SessionTokens;
    use crate::models::order::{Address, NO_LATEST_ARRIVAL, NO_MAP, OrderRecord, OrderStage};

    fn test_config(base_url: &str) -> Config {
        Config {
            http_port: 0,
            log_level: "info".to_string(),
            api_base_url: base_url.to_string(),
            geocoder_url: "http://127.0.0.1:9".to_string(),
            poll_interval: Duration::from_secs(3600),
            event_buffer_size: 16,
            message_prefix: "Message from Uber Eats".to_string(),
            interval_updates: false,
            interval_minutes: 10,
            nearby_distance_feet: 200.0,
            nearby_trigger_url: None,
            home: None,
            cache_dir: PathBuf::from(".cache-test"),
            sinks: Vec::new(),
            bootstrap: None,
        }
    }

    fn tokens() -> SessionTokens {
        SessionTokens {
            sid: "QA.fedcba9876543210fedcba9876543210".to_string(),
            session_id: "1234abcd-5678-90ef-aaaa-bbbbccccdddd".to_string(),
            full_cookie: String::new(),
        }
    }

    fn account() -> Arc<AccountContext> {
        Arc::new(AccountContext::new(
            "Alex".to_string(),
            "America/New_York".to_string(),
            tokens(),
        ))
    }

    fn assigned_snapshot() -> OrderSnapshot {
        OrderSnapshot::from_orders(vec![OrderRecord {
            order_id: "order-1".to_string(),
            stage: OrderStage::EnRoute,
            status_text: "On the way".to_string(),
            restaurant_name: "Roma Pizza".to_string(),
            driver_name: "Dana".to_string(),
            driver_picture_url: None,
            driver_phone: String::new(),
            eta_label: "7:45 PM".to_string(),
            eta_timestamp: None,
            minutes_remaining: Some(12),
            driver_coords: None,
            store_coords: None,
            home_coords: None,
            address: Address::unresolved(),
            map_url: NO_MAP.to_string(),
            latest_arrival: NO_LATEST_ARRIVAL.to_string(),
        }])
    }

    /// Loopback server that answers everything with 401.
    async fn serve_unauthorized() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(|| async { StatusCode::UNAUTHORIZED });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn transient_failure_publishes_sentinel_snapshot() {
        // port 9 refuses connections; the fetch errors without auth meaning
        let state = Arc::new(AppState::new(test_config("http://127.0.0.1:9")).unwrap());
        let account = account();
        let mut detector = DetectorState::default();
        let settings = DetectorSettings::from_config(&state.config);

        run_cycle(&state, &account, &mut detector, &settings).await;

        let snapshot = account.snapshot().await;
        assert!(!snapshot.active);
        assert!(snapshot.orders.is_empty());

        let view = account.view().await;
        assert!(!view.last_success);
        assert!(!view.needs_reauth);
        assert!(view.last_polled.is_some());
        assert!(account.history().await.is_empty());
    }

    #[tokio::test]
    async fn auth_failure_sets_needs_reauth() {
        let base = serve_unauthorized().await;
        let state = Arc::new(AppState::new(test_config(&base)).unwrap());
        let account = account();
        let mut detector = DetectorState::default();
        let settings = DetectorSettings::from_config(&state.config);

        run_cycle(&state, &account, &mut detector, &settings).await;

        let view = account.view().await;
        assert!(!view.last_success);
        assert!(view.needs_reauth);
        assert!(!account.snapshot().await.active);
    }

    #[tokio::test]
    async fn failed_cycle_leaves_the_detector_baseline_untouched() {
        let state = Arc::new(AppState::new(test_config("http://127.0.0.1:9")).unwrap());
        let account = account();
        let mut detector = DetectorState::default();
        let settings = DetectorSettings::from_config(&state.config);

        let current = assigned_snapshot();
        detector.detect(&current, &settings, Utc::now());

        run_cycle(&state, &account, &mut detector, &settings).await;

        // A one-cycle blip must not read as the driver disappearing: the
        // next healthy cycle with the same order diffs against the blip's
        // predecessor and stays silent.
        let events = detector.detect(&current, &settings, Utc::now());
        assert!(events.is_empty(), "unexpected events: {events:?}");
    }
}
