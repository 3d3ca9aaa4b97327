//! Date-keyed persistence for the daily session baseline.
//!
//! One JSON file per calendar day, named after the day it belongs to. Day
//! rollover needs no explicit check anywhere: asking for a new day's key
//! simply finds no file, and the caller reseeds.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDate};
use tally_types::{
    player::{PlayerSnapshot, SessionBaseline},
    Result, TallyError,
};
use tracing::{info, warn};

/// Identifier for one calendar day's baseline, formatted `%Y-%m-%d`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DateKey(String);

impl DateKey {
    /// Key for the current local calendar day.
    pub fn today() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format("%Y-%m-%d").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a baseline lookup. Corruption is folded into `NotFound` so
/// every caller handles exactly two cases.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Found(SessionBaseline),
    NotFound,
}

/// Reads and writes the single per-day baseline file.
pub struct BaselineStore {
    root: PathBuf,
}

impl BaselineStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted under the user's data directory.
    pub fn at_default_location() -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| TallyError::Storage("no user data directory available".into()))?;
        Ok(Self::new(base.join("tally")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|err| {
            TallyError::Storage(format!(
                "failed to create baseline dir {}: {err}",
                self.root.display()
            ))
        })
    }

    fn path_for(&self, key: &DateKey) -> PathBuf {
        self.root.join(format!("state-{key}.json"))
    }

    /// Loads the baseline persisted for the given day. A missing file and a
    /// corrupt or partially written one both come back as `NotFound`; the
    /// caller reseeds either way.
    pub fn load(&self, key: &DateKey) -> LoadOutcome {
        let path = self.path_for(key);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return LoadOutcome::NotFound,
            Err(err) => {
                warn!("unreadable baseline file {}: {err}", path.display());
                return LoadOutcome::NotFound;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(baseline) => LoadOutcome::Found(baseline),
            Err(err) => {
                warn!(
                    "corrupt baseline file {}, treating as absent: {err}",
                    path.display()
                );
                LoadOutcome::NotFound
            }
        }
    }

    /// Seeds the day's baseline from a fresh snapshot, stamping the capture
    /// time. Overwrites whatever was stored under the key before.
    pub fn save(&self, key: &DateKey, snapshot: &PlayerSnapshot) -> Result<SessionBaseline> {
        let baseline = SessionBaseline::capture_now(snapshot.clone());
        self.persist(key, &baseline)?;
        Ok(baseline)
    }

    /// Writes an already-captured baseline, e.g. when retrying after an
    /// earlier persistence failure left it memory-only.
    pub fn persist(&self, key: &DateKey, baseline: &SessionBaseline) -> Result<()> {
        self.ensure_root()?;
        let path = self.path_for(key);
        let body = serde_json::to_string_pretty(baseline)
            .map_err(|err| TallyError::Storage(format!("failed to encode baseline: {err}")))?;
        fs::write(&path, body).map_err(|err| {
            TallyError::Storage(format!(
                "failed to write baseline file {}: {err}",
                path.display()
            ))
        })?;
        info!("baseline for {key} persisted at {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot(kills: u64) -> PlayerSnapshot {
        PlayerSnapshot {
            name: "Gianni".into(),
            guid: "a1b2c3".into(),
            kills,
            deaths: 20,
            headshots: 10,
            damage_dealt: 15_400.5,
            playtime_hours: 312.25,
            favorite_weapon: "M16A2".into(),
        }
    }

    fn key(day: u32) -> DateKey {
        DateKey::from_date(NaiveDate::from_ymd_opt(2026, 8, day).expect("valid date"))
    }

    #[test]
    fn save_then_load_returns_the_saved_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BaselineStore::new(dir.path());

        let saved = store.save(&key(30), &sample_snapshot(100)).expect("save");
        match store.load(&key(30)) {
            LoadOutcome::Found(loaded) => assert_eq!(loaded, saved),
            LoadOutcome::NotFound => panic!("expected the persisted baseline"),
        }

        // A second load is unchanged; seeding is idempotent from the
        // caller's point of view.
        match store.load(&key(30)) {
            LoadOutcome::Found(loaded) => assert_eq!(loaded.snapshot.kills, 100),
            LoadOutcome::NotFound => panic!("expected the persisted baseline"),
        }
    }

    #[test]
    fn date_keys_isolate_days() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BaselineStore::new(dir.path());

        store.save(&key(29), &sample_snapshot(100)).expect("save");
        assert!(matches!(store.load(&key(30)), LoadOutcome::NotFound));
        assert!(matches!(store.load(&key(29)), LoadOutcome::Found(_)));
    }

    #[test]
    fn corrupt_file_reads_as_absent_and_can_be_reseeded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BaselineStore::new(dir.path());
        store.ensure_root().expect("create root");

        let path = dir.path().join(format!("state-{}.json", key(30)));
        fs::write(&path, "{ \"captured_at\": \"not even close").expect("write garbage");

        assert!(matches!(store.load(&key(30)), LoadOutcome::NotFound));

        store.save(&key(30), &sample_snapshot(107)).expect("reseed");
        match store.load(&key(30)) {
            LoadOutcome::Found(loaded) => assert_eq!(loaded.snapshot.kills, 107),
            LoadOutcome::NotFound => panic!("reseeded baseline should load"),
        }
    }

    #[test]
    fn save_overwrites_previous_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BaselineStore::new(dir.path());

        store.save(&key(30), &sample_snapshot(100)).expect("save");
        store.save(&key(30), &sample_snapshot(250)).expect("overwrite");
        match store.load(&key(30)) {
            LoadOutcome::Found(loaded) => assert_eq!(loaded.snapshot.kills, 250),
            LoadOutcome::NotFound => panic!("expected overwritten baseline"),
        }
    }

    #[test]
    fn persisted_file_is_human_readable_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BaselineStore::new(dir.path());

        store.save(&key(30), &sample_snapshot(100)).expect("save");
        let body = fs::read_to_string(dir.path().join(format!("state-{}.json", key(30))))
            .expect("read baseline file");
        assert!(body.contains("\"captured_at\""));
        assert!(body.contains("\"kills\": 100"));
        assert!(body.lines().count() > 1);
    }
}
