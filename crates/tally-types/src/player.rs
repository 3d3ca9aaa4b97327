use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable record of one player's cumulative lifetime statistics at a
/// point in time. Produced fresh on every fetch and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub name: String,
    pub guid: String,
    pub kills: u64,
    pub deaths: u64,
    pub headshots: u64,
    pub damage_dealt: f64,
    pub playtime_hours: f64,
    pub favorite_weapon: String,
}

/// The snapshot captured at the first observation of a calendar day,
/// stamped with its capture time. At most one exists per day per player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBaseline {
    pub captured_at: DateTime<Utc>,
    pub snapshot: PlayerSnapshot,
}

impl SessionBaseline {
    pub fn capture_now(snapshot: PlayerSnapshot) -> Self {
        Self {
            captured_at: Utc::now(),
            snapshot,
        }
    }
}

/// Per-counter change since the day's baseline. Ephemeral; recomputed on
/// every polling cycle and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDelta {
    pub kills: u64,
    pub deaths: u64,
    pub headshots: u64,
    pub damage_dealt: f64,
    pub playtime_hours: f64,
    /// Set when any cumulative counter moved backwards, which indicates a
    /// server-side reset of the player's lifetime stats. The affected
    /// counters are clamped to zero instead of going negative.
    pub counter_reset: bool,
}

impl SessionDelta {
    pub fn zero() -> Self {
        Self {
            kills: 0,
            deaths: 0,
            headshots: 0,
            damage_dealt: 0.0,
            playtime_hours: 0.0,
            counter_reset: false,
        }
    }
}
