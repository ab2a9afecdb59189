use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use crate::cache;
use crate::error::AppError;
use crate::gateway::session;
use crate::models::history::HistoryEntry;
use crate::models::order::{Field, OrderSnapshot};
use crate::state::{AccountContext, AccountView, AppState, register_account, remove_account};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/accounts", post(create_account).get(list_accounts))
        .route("/accounts/:id", axum::routing::delete(delete_account))
        .route("/accounts/:id/session", put(replace_session))
        .route("/accounts/:id/snapshot", get(get_snapshot))
        .route("/accounts/:id/snapshot/:field", get(get_field))
        .route("/accounts/:id/history", get(get_history))
        .route("/accounts/:id/past-orders", get(get_past_orders))
}

#[derive(Deserialize)]
pub struct CreateAccountRequest {
    pub cookie: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

#[derive(Deserialize)]
pub struct ReplaceSessionRequest {
    pub cookie: String,
}

async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAccountRequest>,
) -> Result<Json<AccountView>, AppError> {
    let tokens = session::validate_cookie(&payload.cookie)?;

    // Live round trip before accepting: a cookie that parses but cannot
    // fetch the profile is rejected up front.
    let profile = state
        .gateway
        .user_profile(&tokens, &payload.time_zone)
        .await?;
    if !profile.logged_in {
        return Err(AppError::AuthExpired);
    }

    let name = if payload.account_name.trim().is_empty() {
        profile
            .display_name()
            .unwrap_or_else(|| "My Account".to_string())
    } else {
        payload.account_name.trim().to_string()
    };

    let context = register_account(
        &state,
        AccountContext::new(name, payload.time_zone, tokens),
    );
    info!(account_id = %context.id, "account registered");

    Ok(Json(context.view().await))
}

async fn list_accounts(State(state): State<Arc<AppState>>) -> Json<Vec<AccountView>> {
    let contexts: Vec<Arc<AccountContext>> = state
        .accounts
        .iter()
        .map(|entry| entry.value().context.clone())
        .collect();

    let mut views = Vec::with_capacity(contexts.len());
    for context in contexts {
        views.push(context.view().await);
    }
    Json(views)
}

async fn delete_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    remove_account(&state, id)?;
    info!(account_id = %id, "account removed");
    Ok(Json(json!({ "removed": id })))
}

async fn replace_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplaceSessionRequest>,
) -> Result<Json<AccountView>, AppError> {
    let account = state.account(id)?;
    let tokens = session::validate_cookie(&payload.cookie)?;

    let profile = state
        .gateway
        .user_profile(&tokens, &account.time_zone)
        .await?;
    if !profile.logged_in {
        return Err(AppError::AuthExpired);
    }

    account.replace_session(tokens).await;
    info!(account_id = %id, "session reconfigured");
    Ok(Json(account.view().await))
}

#[derive(Serialize)]
struct SnapshotResponse {
    #[serde(flatten)]
    snapshot: OrderSnapshot,
    last_success: bool,
    needs_reauth: bool,
}

async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SnapshotResponse>, AppError> {
    let account = state.account(id)?;
    let view = account.view().await;
    Ok(Json(SnapshotResponse {
        snapshot: account.snapshot().await,
        last_success: view.last_success,
        needs_reauth: view.needs_reauth,
    }))
}

async fn get_field(
    State(state): State<Arc<AppState>>,
    Path((id, field)): Path<(Uuid, String)>,
) -> Result<Json<Value>, AppError> {
    let account = state.account(id)?;
    let field = Field::parse(&field)
        .ok_or_else(|| AppError::BadRequest(format!("unknown field: {field}")))?;
    let value = account.snapshot().await.field(field);
    Ok(Json(json!({ "field": field, "value": value })))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    let account = state.account(id)?;
    Ok(Json(account.history().await))
}

async fn get_past_orders(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let account = state.account(id)?;
    let (data, from_cache) = cache::past_orders_cached(&state, &account).await?;
    let mut body = serde_json::to_value(&data)
        .map_err(|err| AppError::Internal(format!("failed to serialize past orders: {err}")))?;
    body["from_cache"] = Value::Bool(from_cache);
    Ok(Json(body))
}
