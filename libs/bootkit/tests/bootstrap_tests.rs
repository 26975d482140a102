//! Integration tests for the bootstrap sequence: unit ordering, fail-fast
//! behavior and configuration decoding.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use bootkit::{
    async_trait, BootContext, BootError, BootOptions, Booter, InitUnit, StoreError, BOOTER_KEY,
};
use parking_lot::Mutex;
use serde::Deserialize;
use tempfile::{tempdir, TempDir};

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn options_for(dir: &Path) -> BootOptions {
    BootOptions::default().with_root_dir(dir).testing()
}

// Root dir holding an empty `config.yml`.
fn empty_root() -> TempDir {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("config.yml"), "").unwrap();
    tmp
}

// Records every call it receives.
struct Recorder {
    name: &'static str,
    log: Log,
}

#[async_trait]
impl InitUnit for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    async fn boot(&mut self, _ctx: &BootContext) -> anyhow::Result<()> {
        self.log.lock().push(format!("{}:boot", self.name));
        Ok(())
    }

    async fn register(&mut self, _ctx: &mut BootContext) -> anyhow::Result<()> {
        self.log.lock().push(format!("{}:register", self.name));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Counter {
    x: i32,
}

// Publishes "counter".
struct Publisher {
    built: Option<Arc<Counter>>,
}

#[async_trait]
impl InitUnit for Publisher {
    fn name(&self) -> &str {
        "publisher"
    }

    async fn boot(&mut self, _ctx: &BootContext) -> anyhow::Result<()> {
        self.built = Some(Arc::new(Counter { x: 21 }));
        Ok(())
    }

    async fn register(&mut self, ctx: &mut BootContext) -> anyhow::Result<()> {
        let counter = self
            .built
            .take()
            .ok_or_else(|| anyhow::anyhow!("boot did not run"))?;
        ctx.services_mut().set("counter", counter);
        Ok(())
    }
}

// Reads "counter" during register and publishes "doubled".
struct Consumer;

#[async_trait]
impl InitUnit for Consumer {
    fn name(&self) -> &str {
        "consumer"
    }

    async fn boot(&mut self, _ctx: &BootContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn register(&mut self, ctx: &mut BootContext) -> anyhow::Result<()> {
        let counter = ctx.service::<Counter>("counter")?;
        ctx.services_mut()
            .set("doubled", Arc::new(Counter { x: counter.x * 2 }));
        Ok(())
    }
}

struct FailingBoot;

#[async_trait]
impl InitUnit for FailingBoot {
    fn name(&self) -> &str {
        "failing"
    }

    async fn boot(&mut self, _ctx: &BootContext) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }

    async fn register(&mut self, _ctx: &mut BootContext) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn units_boot_then_register_in_list_order() {
    let tmp = empty_root();
    let log = new_log();

    let before_log = log.clone();
    let after_log = log.clone();
    Booter::new()
        .with_options(options_for(tmp.path()))
        .before_execute(move |_| {
            before_log.lock().push("before".into());
            Ok(())
        })
        .unit(Recorder {
            name: "a",
            log: log.clone(),
        })
        .unit(Recorder {
            name: "b",
            log: log.clone(),
        })
        .unit(Recorder {
            name: "c",
            log: log.clone(),
        })
        .after_execute(move |_| {
            after_log.lock().push("after".into());
            Ok(())
        })
        .execute()
        .await
        .unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "before",
            "a:boot",
            "a:register",
            "b:boot",
            "b:register",
            "c:boot",
            "c:register",
            "after"
        ]
    );
}

#[tokio::test]
async fn later_unit_sees_service_of_earlier_unit() {
    let tmp = empty_root();

    let booted = Booter::new()
        .with_options(options_for(tmp.path()))
        .unit(Publisher { built: None })
        .unit(Consumer)
        .execute()
        .await
        .unwrap();

    assert_eq!(booted.service::<Counter>("doubled").unwrap().x, 42);
    assert_eq!(booted.services().len(), 2);
}

#[tokio::test]
async fn earlier_unit_does_not_see_later_service() {
    let tmp = empty_root();

    let err = Booter::new()
        .with_options(options_for(tmp.path()))
        .unit(Consumer)
        .unit(Publisher { built: None })
        .execute()
        .await
        .unwrap_err();

    match err {
        BootError::Register {
            index,
            unit,
            source,
        } => {
            assert_eq!(index, 0);
            assert_eq!(unit, "consumer");
            assert_eq!(
                source.downcast_ref::<StoreError>(),
                Some(&StoreError::NotFound {
                    key: "counter".into()
                })
            );
        }
        other => panic!("expected Register failure, got {other:?}"),
    }
}

#[tokio::test]
async fn failing_unit_aborts_the_rest_of_bootstrap() {
    let tmp = empty_root();
    let log = new_log();

    let after_log = log.clone();
    let err = Booter::new()
        .with_options(options_for(tmp.path()))
        .unit(Recorder {
            name: "first",
            log: log.clone(),
        })
        .unit(FailingBoot)
        .unit(Recorder {
            name: "never",
            log: log.clone(),
        })
        .after_execute(move |_| {
            after_log.lock().push("after".into());
            Ok(())
        })
        .execute()
        .await
        .unwrap_err();

    assert!(
        matches!(&err, BootError::Boot { index: 1, unit, .. } if unit == "failing"),
        "got {err:?}"
    );
    // Diagnostic names the unit and keeps the cause.
    let rendered = format!("{:#}", anyhow::Error::from(err));
    assert!(rendered.contains("failing"), "{rendered}");
    assert!(rendered.contains("connection refused"), "{rendered}");

    assert_eq!(*log.lock(), vec!["first:boot", "first:register"]);
}

#[tokio::test]
async fn before_execute_failure_runs_no_unit() {
    let tmp = empty_root();
    let log = new_log();

    let err = Booter::new()
        .with_options(options_for(tmp.path()))
        .before_execute(|_| anyhow::bail!("not today"))
        .unit(Recorder {
            name: "a",
            log: log.clone(),
        })
        .execute()
        .await
        .unwrap_err();

    assert!(matches!(err, BootError::BeforeExecute { .. }), "got {err:?}");
    assert!(log.lock().is_empty());
}

#[derive(Debug, Deserialize)]
struct DbConfig {
    host: String,
    #[serde(default)]
    port: u16,
}

#[derive(Debug, Deserialize)]
struct AppConfig {
    name: String,
    db: DbConfig,
}

#[tokio::test]
async fn env_token_in_config_resolves_from_environment() {
    let tmp = tempdir().unwrap();
    fs::write(
        tmp.path().join("config.yml"),
        "db: {host: \"${BOOTKIT_IT_DB_HOST}\"}\n",
    )
    .unwrap();
    std::env::set_var("BOOTKIT_IT_DB_HOST", "localhost");

    let booted = Booter::new()
        .with_options(options_for(tmp.path()))
        .config::<DbConfig>("db")
        .execute()
        .await
        .unwrap();

    assert_eq!(booted.config::<DbConfig>("db").unwrap().host, "localhost");
}

#[tokio::test]
async fn unset_env_token_decodes_to_empty_string() {
    let tmp = tempdir().unwrap();
    fs::write(
        tmp.path().join("config.yml"),
        "db: {host: \"${BOOTKIT_IT_NEVER_SET_HOST}\"}\n",
    )
    .unwrap();

    let booted = Booter::new()
        .with_options(options_for(tmp.path()))
        .config::<DbConfig>("db")
        .execute()
        .await
        .unwrap();

    assert_eq!(booted.config::<DbConfig>("db").unwrap().host, "");
}

#[tokio::test]
async fn booter_config_holds_the_whole_document() {
    let tmp = tempdir().unwrap();
    fs::write(
        tmp.path().join("settings.yaml"),
        "name: orders\ndb:\n  host: db.internal\n  port: 5432\n",
    )
    .unwrap();

    let booted = Booter::new()
        .with_options(options_for(tmp.path()).with_config_file("settings.yaml"))
        .booter_config::<AppConfig>()
        .execute()
        .await
        .unwrap();

    let app = booted.config::<AppConfig>(BOOTER_KEY).unwrap();
    assert_eq!(app.name, "orders");
    assert_eq!(app.db.port, 5432);
}

#[tokio::test]
async fn prefixed_env_overrides_file_values() {
    let tmp = tempdir().unwrap();
    fs::write(
        tmp.path().join("config.yml"),
        "db: {host: from-file, port: 5432}\n",
    )
    .unwrap();
    std::env::set_var("BKIT_IT_OVR__DB__HOST", "from-env");

    let booted = Booter::new()
        .with_options(options_for(tmp.path()))
        .env_prefix("BKIT_IT_OVR__")
        .config::<DbConfig>("db")
        .execute()
        .await
        .unwrap();

    let db = booted.config::<DbConfig>("db").unwrap();
    assert_eq!(db.host, "from-env");
    assert_eq!(db.port, 5432);
}

#[tokio::test]
async fn malformed_config_aborts_before_units() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("config.yml"), "db: [unclosed\n").unwrap();
    let log = new_log();

    let err = Booter::new()
        .with_options(options_for(tmp.path()))
        .config::<DbConfig>("db")
        .unit(Recorder {
            name: "a",
            log: log.clone(),
        })
        .execute()
        .await
        .unwrap_err();

    assert!(matches!(err, BootError::Config(_)), "got {err:?}");
    assert!(log.lock().is_empty());
}

// Sees the testing flag and swaps in a fake.
struct FakeAware;

#[async_trait]
impl InitUnit for FakeAware {
    async fn boot(&mut self, _ctx: &BootContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn register(&mut self, ctx: &mut BootContext) -> anyhow::Result<()> {
        let mode = if ctx.is_testing() { "fake" } else { "real" };
        ctx.services_mut().set("mode", Arc::new(mode.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn units_observe_testing_flag_and_default_name() {
    let tmp = empty_root();

    let booted = Booter::new()
        .with_options(options_for(tmp.path()))
        .unit(FakeAware)
        .execute()
        .await
        .unwrap();

    assert_eq!(*booted.service::<String>("mode").unwrap(), "fake");
    assert!(FakeAware.name().ends_with("FakeAware"));
}
