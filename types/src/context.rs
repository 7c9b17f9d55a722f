//! The explicit caller context passed into every player-initiated operation.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Who is acting. Transports build one per request or connection; nothing
/// reads the acting user from process-wide state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: UserId,
    pub display_name: String,
}

impl UserContext {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        let display_name = if display_name.trim().is_empty() {
            user_id.to_string()
        } else {
            display_name
        };
        Self {
            user_id,
            display_name,
        }
    }
}
