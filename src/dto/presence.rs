use serde::{Deserialize, Serialize};

/// Per-member state published on the room's presence channel.
///
/// `track` replaces the previous record entirely, so every field is carried on
/// each update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Name shown in the lobby and on the leaderboard.
    pub display_name: String,
    /// Avatar image location.
    pub avatar_url: String,
    /// Whether the player marked themselves ready in the lobby.
    pub is_ready: bool,
    /// Whether this member is the room host. Exactly one per room.
    pub is_host: bool,
    /// Whether the player has answered the current question.
    pub has_answered: bool,
    /// Last known total score.
    pub score: u32,
}

impl PresenceRecord {
    /// Build the record a player publishes when first joining the lobby.
    pub fn joining(display_name: impl Into<String>, avatar_url: impl Into<String>, is_host: bool) -> Self {
        Self {
            display_name: display_name.into(),
            avatar_url: avatar_url.into(),
            is_ready: false,
            is_host,
            has_answered: false,
            score: 0,
        }
    }
}
