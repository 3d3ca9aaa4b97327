//! Polling orchestrator turning cumulative remote stats into session deltas.
//!
//! A single background task drives fetch → match → baseline → diff →
//! publish. The task exclusively owns the cached baseline, so there is no
//! locking discipline beyond single-writer ownership, and cycles never
//! overlap because each one completes before the next tick is awaited.

use futures::{stream::BoxStream, StreamExt};
use tally_source::StatsSource;
use tally_store::{BaselineStore, DateKey, LoadOutcome};
use tally_types::{
    config::{PlayerConfig, TrackerConfig},
    player::{PlayerSnapshot, SessionBaseline},
    update::{TrackerMetrics, TrackerState, TrackerUpdate},
    Result,
};
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tracing::{info, warn};

struct CachedBaseline {
    key: DateKey,
    baseline: SessionBaseline,
    /// False when every persistence attempt so far has failed and the
    /// baseline lives in memory only. Retried on later cycles.
    persisted: bool,
}

pub struct SessionTracker<S: StatsSource> {
    source: S,
    store: BaselineStore,
    player: PlayerConfig,
    config: TrackerConfig,
    cached: Option<CachedBaseline>,
    metrics: TrackerMetrics,
    date_source: fn() -> DateKey,
    tx: watch::Sender<TrackerUpdate>,
}

impl<S: StatsSource> SessionTracker<S> {
    pub fn new(config: TrackerConfig, player: PlayerConfig, source: S, store: BaselineStore) -> Self {
        let (tx, _) = watch::channel(TrackerUpdate::new(
            TrackerState::Loading,
            TrackerMetrics::default(),
        ));
        Self {
            source,
            store,
            player,
            config,
            cached: None,
            metrics: TrackerMetrics::default(),
            date_source: DateKey::today,
            tx,
        }
    }

    /// Replaces the calendar-day lookup, letting callers drive the day
    /// boundary instead of the wall clock.
    pub fn set_date_source(&mut self, date_source: fn() -> DateKey) {
        self.date_source = date_source;
    }

    /// Latest-value receiver for the presentation layer. Subscribe before
    /// spawning `run`, which stops once every receiver is gone.
    pub fn watch(&self) -> watch::Receiver<TrackerUpdate> {
        self.tx.subscribe()
    }

    /// Stream view over the published updates, yielding the current value
    /// first and then every replacement.
    pub fn subscribe(&self) -> BoxStream<'static, TrackerUpdate> {
        WatchStream::new(self.tx.subscribe()).boxed()
    }

    pub fn metrics(&self) -> TrackerMetrics {
        self.metrics.clone()
    }

    /// Runs the polling loop until every subscriber has dropped. The first
    /// cycle starts immediately, not after the first delay.
    pub async fn run(&mut self) -> Result<()> {
        let mut ticker = interval(Duration::from_secs(self.config.poll_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_cycle().await;
            if self.tx.is_closed() {
                info!("all subscribers dropped, stopping the polling loop");
                return Ok(());
            }
        }
    }

    /// One fetch/compute/publish cycle. Failures only touch the error
    /// indicator; the last published pair and the cached baseline survive.
    pub async fn run_cycle(&mut self) {
        match self.source.fetch().await {
            Ok(players) => self.on_fetch(players),
            Err(err) => {
                warn!("stats fetch failed, keeping last published state: {err}");
                self.metrics.failed_cycles += 1;
                self.metrics.last_error = Some(err.to_string());
                let retained = self.tx.borrow().state.clone();
                self.publish(retained);
            }
        }
    }

    fn on_fetch(&mut self, players: Vec<PlayerSnapshot>) {
        self.metrics.successful_cycles += 1;
        let Some(snapshot) = players.into_iter().find(|p| self.player.matches(p)) else {
            warn!("player {:?} absent from fetched stats", self.player.name);
            self.metrics.last_error = None;
            self.publish(TrackerState::PlayerMissing {
                player: self.player.name.clone(),
            });
            return;
        };

        let (baseline, storage_issue) = self.resolve_baseline(&snapshot);
        let delta = tally_delta::diff(&baseline.snapshot, &snapshot);
        if delta.counter_reset {
            warn!(
                "cumulative counters moved backwards for {}; session delta clamped",
                snapshot.name
            );
        }

        self.metrics.last_error = storage_issue;
        self.publish(TrackerState::Live { snapshot, delta });
    }

    /// Returns today's baseline plus a storage complaint when persistence is
    /// unavailable. Storage is consulted at most once per day: afterwards the
    /// baseline comes from the in-memory cache, which is dropped as soon as
    /// the date key changes so an overnight process reseeds after midnight.
    fn resolve_baseline(&mut self, snapshot: &PlayerSnapshot) -> (SessionBaseline, Option<String>) {
        let today = (self.date_source)();
        if let Some(cached) = self.cached.as_mut() {
            if cached.key == today {
                if cached.persisted {
                    return (cached.baseline.clone(), None);
                }
                return match self.store.persist(&today, &cached.baseline) {
                    Ok(()) => {
                        cached.persisted = true;
                        info!("baseline for {today} persisted after earlier failure");
                        (cached.baseline.clone(), None)
                    }
                    Err(err) => {
                        warn!("baseline still memory-only: {err}");
                        (cached.baseline.clone(), Some(err.to_string()))
                    }
                };
            }
            info!("calendar day rolled over to {today}, discarding cached baseline");
        }

        let (baseline, persisted, issue) = match self.store.load(&today) {
            LoadOutcome::Found(baseline) => {
                info!(
                    "recovered baseline for {today} captured at {}",
                    baseline.captured_at
                );
                (baseline, true, None)
            }
            LoadOutcome::NotFound => match self.store.save(&today, snapshot) {
                Ok(baseline) => {
                    info!("seeded baseline for {today} from the current fetch");
                    (baseline, true, None)
                }
                Err(err) => {
                    warn!("failed to persist seeded baseline, keeping it in memory: {err}");
                    (
                        SessionBaseline::capture_now(snapshot.clone()),
                        false,
                        Some(err.to_string()),
                    )
                }
            },
        };

        self.cached = Some(CachedBaseline {
            key: today,
            baseline: baseline.clone(),
            persisted,
        });
        (baseline, issue)
    }

    fn publish(&self, state: TrackerState) {
        self.tx
            .send_replace(TrackerUpdate::new(state, self.metrics.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tally_source::StaticStatsSource;
    use tally_types::TallyError;

    fn snapshot(kills: u64, deaths: u64, headshots: u64) -> PlayerSnapshot {
        PlayerSnapshot {
            name: "Gianni".into(),
            guid: "a1b2c3".into(),
            kills,
            deaths,
            headshots,
            damage_dealt: kills as f64 * 150.0,
            playtime_hours: 312.25,
            favorite_weapon: "M16A2".into(),
        }
    }

    fn bystander() -> PlayerSnapshot {
        PlayerSnapshot {
            name: "Raven".into(),
            guid: "d4e5f6".into(),
            kills: 42,
            deaths: 7,
            headshots: 3,
            damage_dealt: 5_100.0,
            playtime_hours: 40.0,
            favorite_weapon: "AK-74".into(),
        }
    }

    fn tracker_with(
        source: StaticStatsSource,
        store: BaselineStore,
    ) -> SessionTracker<StaticStatsSource> {
        SessionTracker::new(
            TrackerConfig {
                poll_interval_secs: 300,
            },
            PlayerConfig {
                name: "Gianni".into(),
                guid: None,
            },
            source,
            store,
        )
    }

    fn live_kills_delta(update: &TrackerUpdate) -> (u64, u64, u64, u64) {
        match &update.state {
            TrackerState::Live { snapshot, delta } => {
                (snapshot.kills, delta.kills, delta.deaths, delta.headshots)
            }
            other => panic!("expected a live state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_session_scenario_with_a_mid_run_outage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = StaticStatsSource::new();
        source.push_players(vec![snapshot(100, 20, 10), bystander()]);
        source.push_players(vec![snapshot(107, 22, 11), bystander()]);
        source.push_failure(TallyError::Network("simulated outage".into()));
        source.push_players(vec![snapshot(110, 22, 13), bystander()]);

        let mut tracker = tracker_with(source, BaselineStore::new(dir.path()));
        let rx = tracker.watch();

        // Cycle 1 seeds the baseline; the delta of the seeding fetch is zero.
        tracker.run_cycle().await;
        assert_eq!(live_kills_delta(&rx.borrow()), (100, 0, 0, 0));
        assert!(matches!(
            BaselineStore::new(dir.path()).load(&DateKey::today()),
            LoadOutcome::Found(_)
        ));

        // Cycle 2 diffs against the cached baseline.
        tracker.run_cycle().await;
        assert_eq!(live_kills_delta(&rx.borrow()), (107, 7, 2, 1));
        assert!(rx.borrow().metrics.last_error.is_none());

        // Cycle 3 fails; the published pair is retained, only the error
        // indicator changes, and the cached baseline is untouched.
        tracker.run_cycle().await;
        assert_eq!(live_kills_delta(&rx.borrow()), (107, 7, 2, 1));
        let metrics = rx.borrow().metrics.clone();
        assert!(metrics.last_error.as_deref().unwrap().contains("simulated outage"));
        assert_eq!(metrics.failed_cycles, 1);

        // Cycle 4 resumes normal delta publication; the published metrics
        // keep counting so the presentation layer can show cycle health.
        tracker.run_cycle().await;
        assert_eq!(live_kills_delta(&rx.borrow()), (110, 10, 2, 3));
        let metrics = rx.borrow().metrics.clone();
        assert!(metrics.last_error.is_none());
        assert_eq!(metrics.successful_cycles, 3);
        assert_eq!(metrics.failed_cycles, 1);
        assert_eq!(tracker.metrics(), metrics);
    }

    #[tokio::test]
    async fn day_rollover_reseeds_without_a_restart() {
        fn sunday() -> DateKey {
            DateKey::from_date(NaiveDate::from_ymd_opt(2026, 8, 30).expect("valid date"))
        }
        fn monday() -> DateKey {
            DateKey::from_date(NaiveDate::from_ymd_opt(2026, 8, 31).expect("valid date"))
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let source = StaticStatsSource::new();
        source.push_players(vec![snapshot(100, 20, 10)]);
        source.push_players(vec![snapshot(107, 22, 11)]);
        source.push_players(vec![snapshot(109, 22, 11)]);

        let mut tracker = tracker_with(source, BaselineStore::new(dir.path()));
        tracker.set_date_source(sunday);
        let rx = tracker.watch();

        tracker.run_cycle().await;
        tracker.run_cycle().await;
        assert_eq!(live_kills_delta(&rx.borrow()), (107, 7, 2, 1));

        // Midnight passes; the cached baseline is stale, so the next cycle
        // reseeds under the new key and the session starts over.
        tracker.set_date_source(monday);
        tracker.run_cycle().await;
        assert_eq!(live_kills_delta(&rx.borrow()), (109, 0, 0, 0));

        let store = BaselineStore::new(dir.path());
        match store.load(&monday()) {
            LoadOutcome::Found(baseline) => assert_eq!(baseline.snapshot.kills, 109),
            LoadOutcome::NotFound => panic!("new day's baseline should be persisted"),
        }
        // The previous day's file is untouched.
        match store.load(&sunday()) {
            LoadOutcome::Found(baseline) => assert_eq!(baseline.snapshot.kills, 100),
            LoadOutcome::NotFound => panic!("previous day's baseline should remain"),
        }
    }

    #[tokio::test]
    async fn missing_player_is_a_sticky_display_state_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = StaticStatsSource::new();
        source.push_players(vec![bystander()]);
        source.push_failure(TallyError::Network("blip".into()));
        source.push_players(vec![snapshot(100, 20, 10)]);

        let mut tracker = tracker_with(source, BaselineStore::new(dir.path()));
        let rx = tracker.watch();

        tracker.run_cycle().await;
        assert!(matches!(
            rx.borrow().state,
            TrackerState::PlayerMissing { .. }
        ));

        // A failed fetch keeps the missing-player state on display.
        tracker.run_cycle().await;
        assert!(matches!(
            rx.borrow().state,
            TrackerState::PlayerMissing { .. }
        ));

        // The player reappearing resolves the state automatically.
        tracker.run_cycle().await;
        assert!(matches!(rx.borrow().state, TrackerState::Live { .. }));
    }

    #[tokio::test]
    async fn baseline_survives_a_restart_within_the_day() {
        let dir = tempfile::tempdir().expect("tempdir");

        let source = StaticStatsSource::new();
        source.push_players(vec![snapshot(100, 20, 10)]);
        let mut first_run = tracker_with(source, BaselineStore::new(dir.path()));
        let rx = first_run.watch();
        first_run.run_cycle().await;
        assert_eq!(live_kills_delta(&rx.borrow()), (100, 0, 0, 0));
        drop(first_run);

        // A fresh process later the same day recovers the persisted baseline
        // instead of reseeding from its own first fetch.
        let source = StaticStatsSource::new();
        source.push_players(vec![snapshot(107, 22, 11)]);
        let mut second_run = tracker_with(source, BaselineStore::new(dir.path()));
        let rx = second_run.watch();
        second_run.run_cycle().await;
        assert_eq!(live_kills_delta(&rx.borrow()), (107, 7, 2, 1));
    }

    #[tokio::test]
    async fn unavailable_storage_downgrades_to_a_memory_only_baseline() {
        // Root the store at a path occupied by a regular file so directory
        // creation can never succeed.
        let blocker = tempfile::NamedTempFile::new().expect("tempfile");
        let store = BaselineStore::new(blocker.path());

        let source = StaticStatsSource::new();
        source.push_players(vec![snapshot(100, 20, 10)]);
        source.push_players(vec![snapshot(104, 21, 10)]);

        let mut tracker = tracker_with(source, store);
        let rx = tracker.watch();

        // Tracking continues; the storage failure only shows up on the
        // error indicator.
        tracker.run_cycle().await;
        assert_eq!(live_kills_delta(&rx.borrow()), (100, 0, 0, 0));
        assert!(rx.borrow().metrics.last_error.is_some());

        tracker.run_cycle().await;
        assert_eq!(live_kills_delta(&rx.borrow()), (104, 4, 1, 0));
        assert!(rx.borrow().metrics.last_error.is_some());
    }

    #[tokio::test]
    async fn counter_reset_is_flagged_but_does_not_halt_tracking() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = StaticStatsSource::new();
        source.push_players(vec![snapshot(100, 20, 10)]);
        // Server-side wipe: lifetime counters restart near zero.
        source.push_players(vec![snapshot(2, 0, 0)]);

        let mut tracker = tracker_with(source, BaselineStore::new(dir.path()));
        let rx = tracker.watch();

        tracker.run_cycle().await;
        tracker.run_cycle().await;
        match &rx.borrow().state {
            TrackerState::Live { delta, .. } => {
                assert_eq!(delta.kills, 0);
                assert!(delta.counter_reset);
            }
            other => panic!("expected a live state, got {other:?}"),
        };
    }

    #[tokio::test]
    async fn subscribe_stream_yields_the_current_value_then_replacements() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = StaticStatsSource::new();
        source.push_players(vec![snapshot(100, 20, 10)]);

        let mut tracker = tracker_with(source, BaselineStore::new(dir.path()));
        let mut updates = tracker.subscribe();

        let first = updates.next().await.expect("initial value");
        assert!(matches!(first.state, TrackerState::Loading));

        tracker.run_cycle().await;
        let second = updates.next().await.expect("published update");
        assert_eq!(live_kills_delta(&second), (100, 0, 0, 0));
    }
}
