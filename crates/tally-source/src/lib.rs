//! Remote stats retrieval: one HTTP GET, one JSON document, no retries.
//!
//! Retry policy belongs to the polling loop; a failed fetch here simply
//! surfaces as an error for the caller's next timer tick to recover from.

use std::{collections::VecDeque, sync::Mutex, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use tally_types::{config::SourceConfig, player::PlayerSnapshot, Result, TallyError};
use tracing::debug;

/// Community stats endpoint the tracker was originally built against.
pub const DEFAULT_STATS_ENDPOINT: &str = "https://gtg-arma.de/api/stats";

#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Fetches the full list of tracked players' cumulative statistics.
    async fn fetch(&self) -> Result<Vec<PlayerSnapshot>>;
}

// Wire schema of the stats endpoint. Kept private; callers only ever see
// the normalized PlayerSnapshot.
#[derive(Debug, Deserialize)]
struct StatsResponse {
    pvp: PvpSection,
}

#[derive(Debug, Deserialize)]
struct PvpSection {
    players: Vec<WirePlayer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePlayer {
    name: String,
    guid: String,
    kills: u64,
    deaths: u64,
    headshots: u64,
    damage_dealt: f64,
    playtime_hours: f64,
    favorite_weapon: String,
}

impl From<WirePlayer> for PlayerSnapshot {
    fn from(wire: WirePlayer) -> Self {
        Self {
            name: wire.name,
            guid: wire.guid,
            kills: wire.kills,
            deaths: wire.deaths,
            headshots: wire.headshots,
            damage_dealt: wire.damage_dealt,
            playtime_hours: wire.playtime_hours,
            favorite_weapon: wire.favorite_weapon,
        }
    }
}

/// Parses a raw response body into snapshots. Split out of the HTTP path so
/// schema handling is testable without a live endpoint.
pub fn parse_stats_body(body: &str) -> Result<Vec<PlayerSnapshot>> {
    let response: StatsResponse = serde_json::from_str(body)
        .map_err(|err| TallyError::Parse(format!("unexpected stats payload: {err}")))?;
    Ok(response.pvp.players.into_iter().map(Into::into).collect())
}

/// Production source performing a single blocking GET per fetch.
pub struct HttpStatsSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpStatsSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        // The timeout must be finite or a dead endpoint would stall the
        // polling loop forever.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| TallyError::Network(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl StatsSource for HttpStatsSource {
    async fn fetch(&self) -> Result<Vec<PlayerSnapshot>> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|err| {
                TallyError::Network(format!("stats request to {} failed: {err}", self.endpoint))
            })?
            .error_for_status()
            .map_err(|err| TallyError::Network(format!("stats endpoint rejected request: {err}")))?;

        let body = response
            .text()
            .await
            .map_err(|err| TallyError::Network(format!("failed to read stats body: {err}")))?;
        debug!(bytes = body.len(), "fetched stats payload");
        parse_stats_body(&body)
    }
}

/// Scripted source for tests and offline development: hands out the queued
/// outcomes in order and fails once the script runs dry.
#[derive(Default)]
pub struct StaticStatsSource {
    outcomes: Mutex<VecDeque<Result<Vec<PlayerSnapshot>>>>,
}

impl StaticStatsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_players(&self, players: Vec<PlayerSnapshot>) {
        self.push(Ok(players));
    }

    pub fn push_failure(&self, error: TallyError) {
        self.push(Err(error));
    }

    fn push(&self, outcome: Result<Vec<PlayerSnapshot>>) {
        self.outcomes
            .lock()
            .expect("scripted outcomes lock poisoned")
            .push_back(outcome);
    }
}

#[async_trait]
impl StatsSource for StaticStatsSource {
    async fn fetch(&self) -> Result<Vec<PlayerSnapshot>> {
        self.outcomes
            .lock()
            .expect("scripted outcomes lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(TallyError::Network("scripted fetches exhausted".into())))
    }
}
