//! Demo initialization units: an in-memory key-value store and a job loop
//! that depends on it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bootkit::{async_trait, BootContext, InitUnit};
use parking_lot::RwLock;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

pub const KV_CONFIG_KEY: &str = "kv";
pub const JOBS_CONFIG_KEY: &str = "jobs";

pub const KV_SERVICE: &str = "kv";
pub const KV_KEY_FN: &str = "kv.key";
pub const JOBS_SERVICE: &str = "jobs";

#[derive(Debug, Clone, Deserialize)]
pub struct KvConfig {
    #[serde(default)]
    pub namespace: String,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

/// Bounded in-memory key-value store.
#[derive(Debug)]
pub struct KvStore {
    capacity: usize,
    entries: RwLock<HashMap<String, String>>,
}

impl KvStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace. Fails when a new key would exceed the capacity.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> anyhow::Result<()> {
        let key = key.into();
        let mut entries = self.entries.write();
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            anyhow::bail!("kv store full ({} entries)", self.capacity);
        }
        entries.insert(key, value.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Namespaced key builder published next to the store.
pub type KeyFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Builds the [`KvStore`] and publishes it with its key function.
#[derive(Default)]
pub struct KvUnit {
    store: Option<Arc<KvStore>>,
    namespace: String,
}

#[async_trait]
impl InitUnit for KvUnit {
    fn name(&self) -> &str {
        "kv"
    }

    async fn boot(&mut self, ctx: &BootContext) -> anyhow::Result<()> {
        let cfg = ctx
            .config::<KvConfig>(KV_CONFIG_KEY)
            .context("kv configuration missing")?;
        anyhow::ensure!(cfg.capacity > 0, "kv.capacity must be positive");

        self.namespace = if cfg.namespace.is_empty() {
            "default".to_string()
        } else {
            cfg.namespace.clone()
        };
        self.store = Some(Arc::new(KvStore::new(cfg.capacity)));
        tracing::info!(namespace = %self.namespace, capacity = cfg.capacity, "kv store ready");
        Ok(())
    }

    async fn register(&mut self, ctx: &mut BootContext) -> anyhow::Result<()> {
        let store = self.store.take().context("kv store was not booted")?;
        let namespace = std::mem::take(&mut self.namespace);
        let key_fn: KeyFn = Arc::new(move |key: &str| format!("{namespace}:{key}"));

        let services = ctx.services_mut();
        services.set(KV_SERVICE, store);
        services.set_fn(KV_KEY_FN, key_fn);
        Ok(())
    }
}

/// Periodic job that writes a tick counter into the kv store.
pub struct Jobs {
    kv: Arc<KvStore>,
    key: KeyFn,
    interval: Duration,
}

impl Jobs {
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record one tick; returns the stored counter.
    pub fn tick(&self) -> anyhow::Result<u64> {
        let key = (self.key)("ticks");
        let next = self
            .kv
            .get(&key)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        self.kv.put(key, next.to_string())?;
        Ok(next)
    }

    /// Tick until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("jobs loop stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let n = self.tick()?;
                    tracing::debug!(tick = n, "job tick");
                }
            }
        }
    }
}

/// Needs the services [`KvUnit`] registered, so it must come after it.
#[derive(Default)]
pub struct JobsUnit {
    interval: Duration,
}

#[async_trait]
impl InitUnit for JobsUnit {
    fn name(&self) -> &str {
        "jobs"
    }

    async fn boot(&mut self, ctx: &BootContext) -> anyhow::Result<()> {
        let cfg = ctx
            .config::<JobsConfig>(JOBS_CONFIG_KEY)
            .context("jobs configuration missing")?;
        anyhow::ensure!(cfg.interval_ms > 0, "jobs.interval_ms must be positive");
        self.interval = Duration::from_millis(cfg.interval_ms);
        Ok(())
    }

    async fn register(&mut self, ctx: &mut BootContext) -> anyhow::Result<()> {
        let kv = ctx.service::<KvStore>(KV_SERVICE)?;
        let key = ctx.services().get_fn::<KeyFn>(KV_KEY_FN)?;

        ctx.services_mut().set(
            JOBS_SERVICE,
            Arc::new(Jobs {
                kv,
                key,
                interval: self.interval,
            }),
        );
        Ok(())
    }
}
