pub mod session;

use chrono::{Datelike, Utc};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::engine::stats;
use crate::error::AppError;
use crate::gateway::session::SessionTokens;
use crate::models::profile::UserProfile;
use crate::models::stats::{PastOrder, PastOrdersData};

const CSRF_TOKEN: &str = "x";
const AUTH_ERROR_CODES: [&str; 3] = ["UNAUTHORIZED", "SESSION_EXPIRED", "INVALID_TOKEN"];

/// Client for the platform's internal order endpoints. Never retries
/// within a poll cycle; auth failures are surfaced distinctly.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: String) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|err| AppError::Internal(format!("failed to create http client: {err}")))?;

        Ok(Self { http, base_url })
    }

    /// Fetch the raw active-order objects. Returns an empty vec when the
    /// response carries no orders; `AuthExpired` when the session is dead.
    pub async fn active_orders(
        &self,
        tokens: &SessionTokens,
        time_zone: &str,
    ) -> Result<Vec<Value>, AppError> {
        let url = format!(
            "{}/getActiveOrdersV1?localeCode={}",
            self.base_url,
            locale_code(time_zone)
        );
        let payload = json!({
            "orderUuid": null,
            "timezone": time_zone,
            "showAppUpsellIllustration": true,
        });

        let resp = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-CSRF-Token", CSRF_TOKEN)
            .header("Cookie", tokens.active_orders_cookie())
            .json(&payload)
            .send()
            .await
            .map_err(|err| AppError::Upstream(format!("active orders request failed: {err}")))?;

        let status = resp.status();
        debug!(status = %status, "active orders response");
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::AuthExpired);
        }
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "active orders returned {status}"
            )));
        }

        let body: Value = resp.json().await.map_err(|err| {
            AppError::Upstream(format!("active orders returned malformed json: {err}"))
        })?;

        if auth_error_code(&body).is_some() {
            return Err(AppError::AuthExpired);
        }

        Ok(body
            .pointer("/data/orders")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Fetch every past order for the current calendar year, following the
    /// `lastWorkflowUUID` pagination cursor, and aggregate statistics.
    /// A failing page ends pagination with whatever was collected so far.
    pub async fn past_orders(
        &self,
        tokens: &SessionTokens,
        time_zone: &str,
    ) -> Result<PastOrdersData, AppError> {
        let url = format!(
            "{}/getPastOrdersV1?localeCode={}",
            self.base_url,
            locale_code(time_zone)
        );
        let current_year = Utc::now().year();

        let mut all_orders = Vec::new();
        let mut cursor = String::new();

        loop {
            let resp = self
                .http
                .post(&url)
                .header("Content-Type", "application/json")
                .header("X-CSRF-Token", CSRF_TOKEN)
                .header("Cookie", tokens.full_or_sid_cookie())
                .json(&json!({ "lastWorkflowUUID": cursor }))
                .send()
                .await
                .map_err(|err| AppError::Upstream(format!("past orders request failed: {err}")))?;

            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(AppError::AuthExpired);
            }
            if !status.is_success() {
                error!(status = %status, "past orders page failed");
                break;
            }

            let body: Value = match resp.json().await {
                Ok(body) => body,
                Err(err) => {
                    error!(error = %err, "past orders page returned malformed json");
                    break;
                }
            };

            let page = parse_past_orders_page(&body, current_year);
            all_orders.extend(page.orders);

            match page.next_cursor {
                Some(next) => cursor = next,
                None => break,
            }
        }

        all_orders.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        let statistics = stats::compute_statistics(&all_orders, current_year);

        Ok(PastOrdersData {
            orders: all_orders,
            statistics,
        })
    }

    /// Fetch the account owner's profile; also serves as the auth
    /// liveness probe for cookie validation.
    pub async fn user_profile(
        &self,
        tokens: &SessionTokens,
        time_zone: &str,
    ) -> Result<UserProfile, AppError> {
        let url = format!(
            "{}/getUserV1?localeCode={}",
            self.base_url,
            locale_code(time_zone)
        );

        let resp = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-CSRF-Token", CSRF_TOKEN)
            .header("Cookie", tokens.full_or_sid_cookie())
            .json(&json!({}))
            .send()
            .await
            .map_err(|err| AppError::Upstream(format!("user profile request failed: {err}")))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::AuthExpired);
        }
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "user profile returned {status}"
            )));
        }

        let body: Value = resp.json().await.map_err(|err| {
            AppError::Upstream(format!("user profile returned malformed json: {err}"))
        })?;

        if auth_error_code(&body).is_some() {
            return Err(AppError::AuthExpired);
        }

        let data = body.get("data").cloned().unwrap_or(Value::Null);
        Ok(UserProfile {
            logged_in: data
                .get("isLoggedIn")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            first_name: data
                .get("firstName")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            last_name: data
                .get("lastName")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            picture_url: data
                .get("pictureUrl")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// One parsed page of the past-orders response.
#[derive(Debug)]
struct PastOrdersPage {
    orders: Vec<PastOrder>,
    /// Cursor for the next page; `None` ends pagination.
    next_cursor: Option<String>,
}

/// Parse a past-orders page body: the current year's orders plus the next
/// pagination cursor. The cursor is the workflow uuid of the *last* entry
/// of `ordersMap` (key order as sent by the server), and only exists while
/// `meta.hasMore` is set and that uuid is present.
fn parse_past_orders_page(body: &Value, current_year: i32) -> PastOrdersPage {
    let Some(orders_map) = body.pointer("/data/ordersMap").and_then(Value::as_object) else {
        return PastOrdersPage {
            orders: Vec::new(),
            next_cursor: None,
        };
    };

    let orders = orders_map
        .iter()
        .filter_map(|(order_uuid, raw)| stats::parse_past_order(order_uuid, raw, current_year))
        .collect();

    let has_more = body
        .pointer("/data/meta/hasMore")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let next_cursor = has_more
        .then(|| {
            orders_map
                .values()
                .next_back()
                .and_then(|o| o.pointer("/baseEaterOrder/uuid"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .flatten();

    PastOrdersPage {
        orders,
        next_cursor,
    }
}

/// Known auth error code in the response body, if any.
fn auth_error_code(body: &Value) -> Option<&str> {
    let code = body.pointer("/error/code").and_then(Value::as_str)?;
    AUTH_ERROR_CODES.contains(&code).then_some(code)
}

/// Locale for the query string, derived from the account's time zone.
pub fn locale_code(time_zone: &str) -> &'static str {
    if time_zone.starts_with("Australia/") {
        "au"
    } else {
        "us"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn locale_maps_australia_and_defaults_to_us() {
        assert_eq!(locale_code("Australia/Sydney"), "au");
        assert_eq!(locale_code("America/New_York"), "us");
        assert_eq!(locale_code("Europe/Berlin"), "us");
    }

    #[test]
    fn known_auth_codes_are_classified() {
        for code in AUTH_ERROR_CODES {
            let body = json!({"error": {"code": code}});
            assert_eq!(auth_error_code(&body), Some(code));
        }
    }

    #[test]
    fn other_errors_are_not_auth_failures() {
        assert!(auth_error_code(&json!({"error": {"code": "RATE_LIMITED"}})).is_none());
        assert!(auth_error_code(&json!({"data": {"orders": []}})).is_none());
    }

    fn past_order_entry(workflow_uuid: &str) -> Value {
        json!({
            "baseEaterOrder": {
                "uuid": workflow_uuid,
                "completedAt": "2026-03-14T18:30:00Z",
                "isCancelled": false
            },
            "storeInfo": { "uuid": "store-1", "title": "Roma Pizza" },
            "fareInfo": { "totalPrice": 2599 }
        })
    }

    fn page_body(has_more: bool) -> Value {
        json!({
            "data": {
                "meta": { "hasMore": has_more },
                "ordersMap": {
                    "order-a": past_order_entry("wf-1"),
                    "order-b": past_order_entry("wf-2")
                }
            }
        })
    }

    #[test]
    fn cursor_is_the_last_orders_map_entry() {
        let page = parse_past_orders_page(&page_body(true), 2026);
        assert_eq!(page.orders.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("wf-2"));
    }

    #[test]
    fn final_page_yields_no_cursor() {
        let page = parse_past_orders_page(&page_body(false), 2026);
        assert_eq!(page.orders.len(), 2);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn underivable_cursor_ends_pagination() {
        let body = json!({
            "data": {
                "meta": { "hasMore": true },
                "ordersMap": { "order-a": { "storeInfo": { "title": "Roma Pizza" } } }
            }
        });
        assert!(parse_past_orders_page(&body, 2026).next_cursor.is_none());
    }

    #[test]
    fn missing_orders_map_is_an_empty_final_page() {
        let page = parse_past_orders_page(&json!({"data": {"meta": {"hasMore": true}}}), 2026);
        assert!(page.orders.is_empty());
        assert!(page.next_cursor.is_none());
    }
}
