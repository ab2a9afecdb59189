use crate::error::AppError;

const MIN_COOKIE_LEN: usize = 50;

/// The two sub-tokens carved out of a raw session-cookie string.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub sid: String,
    pub session_id: String,
    /// The original cookie string; preferred by endpoints that want more
    /// than the sid.
    pub full_cookie: String,
}

impl SessionTokens {
    /// Cookie header for the active-orders endpoint.
    pub fn active_orders_cookie(&self) -> String {
        format!("sid={}; uev2.id.session={}", self.sid, self.session_id)
    }

    /// Cookie header for past-orders and user-profile calls.
    pub fn full_or_sid_cookie(&self) -> String {
        if self.full_cookie.is_empty() {
            format!("sid={}", self.sid)
        } else {
            self.full_cookie.clone()
        }
    }
}

/// Split a raw cookie string on `"; "` then `"="` and pull out the `sid`
/// and `uev2.id.session` values.
pub fn parse_cookie(raw: &str) -> (Option<String>, Option<String>) {
    let mut sid = None;
    let mut session_id = None;

    for part in raw.split("; ") {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim() {
            "sid" => sid = Some(value.trim().to_string()),
            "uev2.id.session" => session_id = Some(value.trim().to_string()),
            _ => {}
        }
    }

    (sid, session_id)
}

/// Validate a raw cookie string and extract its session tokens.
pub fn validate_cookie(raw: &str) -> Result<SessionTokens, AppError> {
    let raw = raw.trim();
    if raw.len() < MIN_COOKIE_LEN {
        return Err(AppError::BadRequest("cookie too short".to_string()));
    }

    let (sid, session_id) = parse_cookie(raw);

    let sid = sid.ok_or_else(|| AppError::BadRequest("sid not found in cookie".to_string()))?;
    if !sid.starts_with("QA.") {
        return Err(AppError::BadRequest("sid has unexpected format".to_string()));
    }

    let session_id = session_id
        .ok_or_else(|| AppError::BadRequest("uev2.id.session not found in cookie".to_string()))?;
    if !session_id.contains('-') {
        return Err(AppError::BadRequest(
            "session id has unexpected format".to_string(),
        ));
    }

    Ok(SessionTokens {
        sid,
        session_id,
        full_cookie: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "marketing=1; sid=QA.fedcba9876543210fedcba9876543210; \
                        uev2.id.session=1234abcd-5678-90ef-aaaa-bbbbccccdddd; theme=dark";

    #[test]
    fn valid_cookie_extracts_both_tokens() {
        let tokens = validate_cookie(GOOD).unwrap();
        assert_eq!(tokens.sid, "QA.fedcba9876543210fedcba9876543210");
        assert_eq!(tokens.session_id, "1234abcd-5678-90ef-aaaa-bbbbccccdddd");
        assert!(
            tokens
                .active_orders_cookie()
                .starts_with("sid=QA.fedcba9876543210")
        );
        assert_eq!(tokens.full_or_sid_cookie(), GOOD.trim());
    }

    #[test]
    fn too_short_cookie_is_rejected() {
        assert!(matches!(
            validate_cookie("sid=QA.x"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn missing_sid_is_rejected() {
        let raw = "uev2.id.session=1234abcd-5678-90ef-aaaa-bbbbccccdddd; other=value; pad=0000000000";
        assert!(matches!(validate_cookie(raw), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn sid_without_qa_prefix_is_rejected() {
        let raw = "sid=fedcba9876543210fedcba9876543210; uev2.id.session=1234abcd-5678-90ef";
        assert!(matches!(validate_cookie(raw), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn session_id_without_dash_is_rejected() {
        let raw = "sid=QA.fedcba9876543210fedcba9876543210; uev2.id.session=nodashes";
        assert!(matches!(validate_cookie(raw), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn parse_tolerates_garbage_segments() {
        let (sid, session) = parse_cookie("junk; =; sid=QA.abc; trailing");
        assert_eq!(sid.as_deref(), Some("QA.abc"));
        assert!(session.is_none());
    }
}
