use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::player::{PlayerSnapshot, SessionDelta};

/// What the tracker currently knows, as rendered by the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrackerState {
    /// No fetch has completed yet.
    Loading,
    /// Latest cumulative snapshot paired with its session delta.
    Live {
        snapshot: PlayerSnapshot,
        delta: SessionDelta,
    },
    /// The tracked player was absent from the latest successful fetch.
    /// Clears itself as soon as a later fetch contains the player again.
    PlayerMissing { player: String },
}

/// Aggregated polling counters, carried on every published update so the
/// presentation layer can show cycle health next to the stats.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerMetrics {
    pub successful_cycles: u64,
    pub failed_cycles: u64,
    /// Most recent cycle failure, if any. The state itself is left alone on
    /// failures so the last published pair stays visible.
    pub last_error: Option<String>,
}

/// Immutable envelope published to the presentation layer. Consumers only
/// ever care about the most recent one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerUpdate {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub state: TrackerState,
    pub metrics: TrackerMetrics,
}

impl TrackerUpdate {
    pub fn new(state: TrackerState, metrics: TrackerMetrics) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            state,
            metrics,
        }
    }
}
