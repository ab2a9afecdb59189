use serde::{Deserialize, Serialize};

/// Account owner details from the user-profile endpoint. Doubles as the
/// auth liveness probe: a session that cannot fetch this is expired.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub logged_in: bool,
    pub first_name: String,
    pub last_name: String,
    pub picture_url: Option<String>,
}

impl UserProfile {
    /// "First Last" when either part is present.
    pub fn display_name(&self) -> Option<String> {
        let name = format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string();
        if name.is_empty() { None } else { Some(name) }
    }
}
