use anyhow::Result;
use bootkit::{Booted, Booter, LifecycleRunner, ShutdownSignal, SignalHandler, BOOTER_KEY};
use mimalloc::MiMalloc;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod units;

use units::{Jobs, JobsConfig, JobsUnit, KvConfig, KvStore, KvUnit, JOBS_SERVICE, KV_SERVICE};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Whole-document view of `config.yml`; only the `app` section matters here.
#[derive(Debug, Deserialize)]
struct DemoConfig {
    #[serde(default)]
    app: AppSection,
}

#[derive(Debug, Deserialize)]
struct AppSection {
    #[serde(default = "default_name")]
    name: String,
    #[serde(default = "default_heartbeat_secs")]
    heartbeat_secs: u64,
    #[serde(default = "ShutdownSignal::defaults")]
    shutdown_signals: Vec<ShutdownSignal>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            heartbeat_secs: default_heartbeat_secs(),
            shutdown_signals: ShutdownSignal::defaults(),
        }
    }
}

fn default_name() -> String {
    "bootkit-demo".to_string()
}

fn default_heartbeat_secs() -> u64 {
    30
}

#[tokio::main]
async fn main() -> Result<()> {
    // Flags: --rootDir, --configFileName, --debug, --testing
    let booter = Booter::new()
        .dotenv()
        .booter_config::<DemoConfig>()
        .config::<KvConfig>(units::KV_CONFIG_KEY)
        .config::<JobsConfig>(units::JOBS_CONFIG_KEY)
        .before_execute(|ctx| {
            tracing::info!(
                root_dir = %ctx.root_dir().display(),
                debug = ctx.is_debug(),
                testing = ctx.is_testing(),
                "bootstrapping"
            );
            Ok(())
        })
        .unit(KvUnit::default())
        .unit(JobsUnit::default())
        .after_execute(|ctx| {
            let mut keys: Vec<&str> = ctx.services().keys().collect();
            keys.sort_unstable();
            tracing::info!(services = ?keys, "services registered");
            Ok(())
        });

    let result = bootkit::run(booter, build_lifecycle).await;
    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "bootkit-demo exited with error");
    }
    result
}

fn build_lifecycle(booted: &Booted) -> Result<LifecycleRunner> {
    let app = booted.config::<DemoConfig>(BOOTER_KEY)?;
    let jobs = booted.service::<Jobs>(JOBS_SERVICE)?;
    let kv = booted.service::<KvStore>(KV_SERVICE)?;

    let cancel = CancellationToken::new();
    let name = app.app.name.clone();
    let heartbeat = Duration::from_secs(app.app.heartbeat_secs.max(1));
    let interval = jobs.interval();

    let main_cancel = cancel.clone();
    let signal_cancel = cancel.clone();
    let heartbeat_cancel = cancel;

    let runner = LifecycleRunner::new(move || async move { jobs.run(main_cancel).await })
        .on_starting(|| async {
            tracing::info!("starting");
            Ok(())
        })
        .on_started(move || async move {
            tracing::info!(app = %name, interval_ms = interval.as_millis() as u64, "started");
            Ok(())
        })
        .on_signal(SignalHandler::new(
            app.app.shutdown_signals.clone(),
            move |sig| async move {
                tracing::info!(signal = %sig, "shutdown requested");
                signal_cancel.cancel();
                Ok(())
            },
        ))
        .spawn_async(move || async move {
            let mut ticker = tokio::time::interval(heartbeat);
            while !heartbeat_cancel.is_cancelled() {
                ticker.tick().await;
                tracing::info!("heartbeat");
            }
            Ok(())
        })
        .on_terminated(move || async move {
            tracing::info!(entries = kv.len(), "terminated");
            Ok(())
        });

    Ok(runner)
}
