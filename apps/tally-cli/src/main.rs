use std::{env, sync::mpsc};

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use tally_ops::init_tracing;
use tally_source::{HttpStatsSource, DEFAULT_STATS_ENDPOINT};
use tally_store::BaselineStore;
use tally_tracker::SessionTracker;
use tally_types::config::{
    OpsConfig, PlayerConfig, SourceConfig, StoreConfig, TallyConfig, TrackerConfig,
};

mod ui;

#[derive(Debug, Parser)]
#[command(name = "tally", about = "Session stats tracker for community game servers")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<String>,
    /// Track this player name instead of the configured one.
    #[arg(long)]
    player: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config);
    if let Some(player) = args.player {
        config.player = PlayerConfig {
            name: player,
            guid: None,
        };
    }
    init_tracing(&config.ops)?;

    let store = match config.store.root_dir.as_deref() {
        Some(dir) => BaselineStore::new(dir),
        None => BaselineStore::at_default_location()?,
    };
    let source = HttpStatsSource::new(&config.source)?;
    let mut tracker = SessionTracker::new(
        config.tracker.clone(),
        config.player.clone(),
        source,
        store,
    );
    let mut updates = tracker.subscribe();

    let summary = format!(
        "{} | {} | every {}s",
        config.player.name, config.source.endpoint, config.tracker.poll_interval_secs
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.spawn(async move {
        if let Err(err) = tracker.run().await {
            tracing::error!("tracker stopped: {err}");
        }
    });

    let (tx, rx) = mpsc::channel();
    runtime.spawn(async move {
        // The stream opens with the current value, so the UI sees the
        // loading state before the first fetch completes.
        while let Some(update) = updates.next().await {
            if tx.send(ui::UiMessage::Update(update)).is_err() {
                break;
            }
        }
        let _ = tx.send(ui::UiMessage::Shutdown);
    });

    ui::run(rx, summary)?;
    runtime.shutdown_background();
    Ok(())
}

fn load_config(cli_path: Option<String>) -> TallyConfig {
    let from_env = env::var("TALLY_CONFIG").ok();
    let path = cli_path
        .or(from_env)
        .unwrap_or_else(|| "configs/tally.toml".into());
    match TallyConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path
                );
                default_config()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path
            );
            default_config()
        }
    }
}

fn default_config() -> TallyConfig {
    let config = TallyConfig {
        source: SourceConfig {
            endpoint: DEFAULT_STATS_ENDPOINT.into(),
            timeout_secs: 10,
        },
        player: PlayerConfig {
            name: "Gianni".into(),
            guid: None,
        },
        store: StoreConfig { root_dir: None },
        tracker: TrackerConfig {
            poll_interval_secs: 300,
        },
        ops: OpsConfig {
            log_level: "info".into(),
        },
    };
    debug_assert!(config.validate().is_ok());
    config
}
