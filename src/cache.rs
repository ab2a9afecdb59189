//! On-disk cache of the past-orders response. Low-value data: every
//! failure here degrades to a cache-miss and the primary fetch path is
//! never blocked. Writes happen from detached tasks after each
//! successful fetch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::stats::PastOrdersData;
use crate::state::{AccountContext, AppState};

pub fn cache_path(dir: &Path, account_id: Uuid) -> PathBuf {
    dir.join(format!("past_orders_{account_id}.json"))
}

pub async fn load(path: &Path) -> Option<PastOrdersData> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read past orders cache");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(data) => {
            debug!(path = %path.display(), "loaded past orders cache");
            Some(data)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "past orders cache is corrupt");
            None
        }
    }
}

pub async fn save(path: &Path, data: &PastOrdersData) {
    let raw = match serde_json::to_string(data) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "failed to serialize past orders cache");
            return;
        }
    };

    if let Some(parent) = path.parent()
        && let Err(err) = tokio::fs::create_dir_all(parent).await
    {
        warn!(path = %path.display(), error = %err, "failed to create cache dir");
        return;
    }

    if let Err(err) = tokio::fs::write(path, raw).await {
        warn!(path = %path.display(), error = %err, "failed to write past orders cache");
    } else {
        debug!(path = %path.display(), "saved past orders cache");
    }
}

/// Serve past orders with caching. Cached data is returned immediately
/// (flagged `from_cache`) while a detached task refreshes it; with no
/// cache the fetch happens inline.
pub async fn past_orders_cached(
    state: &Arc<AppState>,
    account: &Arc<AccountContext>,
) -> Result<(PastOrdersData, bool), AppError> {
    let path = cache_path(&state.config.cache_dir, account.id);

    let mut cache = account.past_orders.lock().await;
    if !cache.loaded_from_disk {
        cache.data = load(&path).await;
        cache.loaded_from_disk = true;
    }

    if let Some(data) = cache.data.clone()
        && !data.orders.is_empty()
    {
        drop(cache);
        let state = state.clone();
        let account = account.clone();
        tokio::spawn(async move {
            refresh_in_background(&state, &account, &path).await;
        });
        return Ok((data, true));
    }
    drop(cache);

    let tokens = account.session().await;
    let fresh = state
        .gateway
        .past_orders(&tokens, &account.time_zone)
        .await?;

    account.past_orders.lock().await.data = Some(fresh.clone());
    let to_write = fresh.clone();
    tokio::spawn(async move {
        save(&path, &to_write).await;
    });

    Ok((fresh, false))
}

async fn refresh_in_background(state: &Arc<AppState>, account: &Arc<AccountContext>, path: &Path) {
    let tokens = account.session().await;
    match state.gateway.past_orders(&tokens, &account.time_zone).await {
        Ok(fresh) => {
            account.past_orders.lock().await.data = Some(fresh.clone());
            save(path, &fresh).await;
        }
        Err(err) => {
            debug!(account_id = %account.id, error = %err, "background past orders refresh failed");
        }
    }
}
