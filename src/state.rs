use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::gateway::ApiClient;
use crate::gateway::session::SessionTokens;
use crate::geo::Geocoder;
use crate::models::event::EventEnvelope;
use crate::models::history::{HistoryEntry, OrderHistory};
use crate::models::order::OrderSnapshot;
use crate::models::profile::UserProfile;
use crate::models::stats::PastOrdersData;
use crate::observability::metrics::Metrics;

/// Everything the poll loop publishes for readers. Replaced as a whole
/// each cycle; readers see either the old state or the new one.
#[derive(Debug)]
pub struct AccountData {
    pub snapshot: OrderSnapshot,
    pub history: OrderHistory,
    pub profile: UserProfile,
    pub last_success: bool,
    pub needs_reauth: bool,
    pub last_polled: Option<DateTime<Utc>>,
}

impl Default for AccountData {
    fn default() -> Self {
        Self {
            snapshot: OrderSnapshot::empty(),
            history: OrderHistory::default(),
            profile: UserProfile::default(),
            last_success: false,
            needs_reauth: false,
            last_polled: None,
        }
    }
}

/// In-memory side of the past-orders cache.
#[derive(Debug, Default)]
pub struct PastOrdersCache {
    pub loaded_from_disk: bool,
    pub data: Option<PastOrdersData>,
}

/// Explicit per-account context: one per configured account, passed to
/// every component that needs it and torn down on removal.
pub struct AccountContext {
    pub id: Uuid,
    pub time_zone: String,
    session: RwLock<SessionTokens>,
    name: RwLock<String>,
    data: RwLock<AccountData>,
    pub past_orders: Mutex<PastOrdersCache>,
}

impl AccountContext {
    pub fn new(name: String, time_zone: String, session: SessionTokens) -> Self {
        Self {
            id: Uuid::new_v4(),
            time_zone,
            session: RwLock::new(session),
            name: RwLock::new(name),
            data: RwLock::new(AccountData::default()),
            past_orders: Mutex::new(PastOrdersCache::default()),
        }
    }

    pub async fn session(&self) -> SessionTokens {
        self.session.read().await.clone()
    }

    /// Swap in fresh session tokens after reconfiguration and clear the
    /// reauth flag.
    pub async fn replace_session(&self, tokens: SessionTokens) {
        *self.session.write().await = tokens;
        self.data.write().await.needs_reauth = false;
    }

    pub async fn name(&self) -> String {
        self.name.read().await.clone()
    }

    pub async fn set_name(&self, name: String) {
        *self.name.write().await = name;
    }

    pub async fn snapshot(&self) -> OrderSnapshot {
        self.data.read().await.snapshot.clone()
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.data.read().await.history.entries()
    }

    /// Atomically publish the result of one poll cycle.
    pub async fn publish_cycle(
        &self,
        snapshot: OrderSnapshot,
        entry: Option<HistoryEntry>,
        last_success: bool,
        needs_reauth: bool,
        profile: Option<UserProfile>,
        at: DateTime<Utc>,
    ) {
        let mut data = self.data.write().await;
        data.snapshot = snapshot;
        if let Some(entry) = entry {
            data.history.push(entry);
        }
        data.last_success = last_success;
        data.needs_reauth = needs_reauth;
        if let Some(profile) = profile {
            data.profile = profile;
        }
        data.last_polled = Some(at);
    }

    pub async fn view(&self) -> AccountView {
        let name = self.name().await;
        let data = self.data.read().await;
        AccountView {
            id: self.id,
            name,
            time_zone: self.time_zone.clone(),
            active: data.snapshot.active,
            orders_count: data.snapshot.orders.len(),
            last_success: data.last_success,
            needs_reauth: data.needs_reauth,
            last_polled: data.last_polled,
            picture_url: data.profile.picture_url.clone(),
        }
    }
}

/// Read-only account summary for the panel API.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub id: Uuid,
    pub name: String,
    pub time_zone: String,
    pub active: bool,
    pub orders_count: usize,
    pub last_success: bool,
    pub needs_reauth: bool,
    pub last_polled: Option<DateTime<Utc>>,
    pub picture_url: Option<String>,
}

pub struct AccountHandle {
    pub context: Arc<AccountContext>,
    poll_task: JoinHandle<()>,
}

pub struct AppState {
    pub config: Config,
    pub gateway: ApiClient,
    pub geocoder: Geocoder,
    pub accounts: DashMap<Uuid, AccountHandle>,
    pub events_tx: broadcast::Sender<EventEnvelope>,
    pub metrics: Metrics,
    pub sinks: Arc<Vec<crate::engine::notify::Sink>>,
    pub notify_http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let gateway = ApiClient::new(config.api_base_url.clone())?;
        let geocoder = Geocoder::new(config.geocoder_url.clone())?;
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let notify_http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|err| AppError::Internal(format!("failed to create notify client: {err}")))?;
        let sinks = Arc::new(config.sinks.clone());

        Ok(Self {
            config,
            gateway,
            geocoder,
            accounts: DashMap::new(),
            events_tx,
            metrics: Metrics::new(),
            sinks,
            notify_http,
        })
    }

    pub fn account(&self, id: Uuid) -> Result<Arc<AccountContext>, AppError> {
        self.accounts
            .get(&id)
            .map(|handle| handle.context.clone())
            .ok_or_else(|| AppError::NotFound(format!("account {id} not found")))
    }
}

/// Register an account and start its poll loop.
pub fn register_account(state: &Arc<AppState>, context: AccountContext) -> Arc<AccountContext> {
    let context = Arc::new(context);
    let poll_task = tokio::spawn(crate::engine::poller::run_poll_loop(
        state.clone(),
        context.clone(),
    ));
    state.accounts.insert(
        context.id,
        AccountHandle {
            context: context.clone(),
            poll_task,
        },
    );
    context
}

/// Tear an account down: abort its poll loop and drop its state. In-flight
/// requests are simply abandoned; no partial state was ever committed.
pub fn remove_account(state: &AppState, id: Uuid) -> Result<(), AppError> {
    let (_, handle) = state
        .accounts
        .remove(&id)
        .ok_or_else(|| AppError::NotFound(format!("account {id} not found")))?;
    handle.poll_task.abort();
    // A removed account must not linger as a stale gauge series.
    let _ = state
        .metrics
        .active_orders
        .remove_label_values(&[&id.to_string()]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::config::Config;

    fn test_config() -> Config {
        Config {
            http_port: 0,
            log_level: "info".to_string(),
            api_base_url: "http://127.0.0.1:9".to_string(),
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

    #[tokio::test]
    async fn removing_an_account_clears_its_gauge_series() {
        let state = Arc::new(AppState::new(test_config()).unwrap());
        let context = register_account(
            &state,
            AccountContext::new("Alex".to_string(), "America/New_York".to_string(), tokens()),
        );
        let id = context.id;

        state
            .metrics
            .active_orders
            .with_label_values(&[&id.to_string()])
            .set(2);
        assert!(state.metrics.encode().unwrap().contains(&id.to_string()));

        remove_account(&state, id).unwrap();
        assert!(!state.metrics.encode().unwrap().contains(&id.to_string()));
    }

    #[tokio::test]
    async fn replacing_the_session_clears_the_reauth_flag() {
        let context = AccountContext::new(
            "Alex".to_string(),
            "America/New_York".to_string(),
            tokens(),
        );
        context
            .publish_cycle(OrderSnapshot::empty(), None, false, true, None, Utc::now())
            .await;
        assert!(context.view().await.needs_reauth);

        context.replace_session(tokens()).await;
        assert!(!context.view().await.needs_reauth);
    }
}
