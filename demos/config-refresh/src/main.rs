use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use serde::Serialize;
use snapcache::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Keep a few named configuration snapshots fresh and print their changes")]
struct Args {
    /// Scheduler config as JSON, e.g. {"tick_period_ms": 500}
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Refresh interval of the demo sources, in seconds
    #[arg(short, long, default_value = "2")]
    interval: String,

    /// Stop after this many seconds
    #[arg(short, long, default_value_t = 10)]
    duration: u64,

    /// Make every third refresh of the "flags" source fail
    #[arg(long, default_value_t = false)]
    flaky: bool,
}

#[derive(Debug, Clone, Serialize)]
struct FeatureFlags {
    generation: u64,
    dark_mode: bool,
    beta_users: Vec<String>,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<SchedulerConfig> {
    let Some(path) = path else {
        return Ok(SchedulerConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: SchedulerConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn register_sources(
    scheduler: &RefreshScheduler,
    interval: RefreshInterval,
    flaky: bool,
) -> SnapcacheResult<()> {
    let options = RegisterOptions::default().refresh_interval(interval);

    let generation = Arc::new(AtomicU64::new(0));
    scheduler.register(
        "flags",
        move || {
            let n = generation.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if flaky && n % 3 == 0 {
                    return Err(BoxError::from(format!("flag service timed out (call {n})")));
                }
                Ok(FeatureFlags {
                    generation: n / 2,
                    dark_mode: n % 4 < 2,
                    beta_users: vec!["alice".into(), "bob".into()],
                })
            }
        },
        options,
    )?;

    scheduler.register(
        "clock.minute",
        || async {
            let secs = SystemClock.now_secs();
            Ok::<_, BoxError>(secs / 60)
        },
        options,
    )?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if args.duration == 0 {
        bail!("--duration must be at least one second");
    }

    let config = load_config(args.config.as_ref())?;
    let interval = RefreshInterval::parse(&args.interval)?;
    let scheduler = RefreshScheduler::builder().config(config).build()?;
    register_sources(&scheduler, interval, args.flaky)?;

    let mut watches = Vec::new();
    for name in ["flags", "clock.minute"] {
        watches.push(scheduler.watch(name)?);
    }
    for mut watch in watches {
        tokio::spawn(async move {
            while let Some(update) = watch.recv().await {
                info!(
                    source = %update.source,
                    identity = %update.snapshot.identity().short(),
                    previous = %update.previous.short(),
                    "snapshot changed"
                );
            }
        });
    }

    let summary = scheduler.initialize_all().await;
    info!(%summary, "sources initialized");

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.duration)) => {}
        _ = tokio::signal::ctrl_c() => warn!("interrupted"),
    }

    if let Some(flags) = scheduler.get_data::<FeatureFlags>("flags")? {
        info!(generation = flags.generation, dark_mode = flags.dark_mode, "final flags");
    }
    let stats = scheduler.registry().stats();
    info!(
        started = stats.refreshes_started(),
        failed = stats.refreshes_failed(),
        ticks = stats.ticks(),
        "refresh stats"
    );

    scheduler.reset();
    Ok(())
}
