//! # bootkit - ordered bootstrap and process lifecycle
//!
//! Two pieces, used one after the other:
//!
//! - [`Booter`] loads the environment and the YAML configuration, then runs a
//!   caller-ordered list of [`InitUnit`]s. Each unit boots and registers its
//!   services before the next one starts, so later units can depend on earlier ones.
//! - [`LifecycleRunner`] drives the main task through
//!   **starting → execution → started → signals + async → wait → terminated**.
//!
//! ```rust,ignore
//! use bootkit::{Booter, BootContext, InitUnit, LifecycleRunner, ShutdownSignal, SignalHandler};
//! use std::sync::Arc;
//!
//! struct DbUnit { pool: Option<Arc<Pool>> }
//!
//! #[bootkit::async_trait]
//! impl InitUnit for DbUnit {
//!     async fn boot(&mut self, ctx: &BootContext) -> anyhow::Result<()> {
//!         let cfg = ctx.config::<DbConfig>("db")?;
//!         self.pool = Some(Arc::new(Pool::connect(&cfg.host).await?));
//!         Ok(())
//!     }
//!
//!     async fn register(&mut self, ctx: &mut BootContext) -> anyhow::Result<()> {
//!         if let Some(pool) = self.pool.take() {
//!             ctx.services_mut().set("db", pool);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! bootkit::run(
//!     Booter::new().dotenv().config::<DbConfig>("db").unit(DbUnit { pool: None }),
//!     |booted| {
//!         let pool = booted.service::<Pool>("db")?;
//!         Ok(LifecycleRunner::new(move || serve(pool))
//!             .on_signal(SignalHandler::new(ShutdownSignal::defaults(), |_| async { Ok(()) })))
//!     },
//! )
//! .await
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;

pub mod booter;
pub mod context;
pub mod contracts;
pub mod runtime;
pub mod store;

pub use booter::{BootError, Booter};
pub use context::{BootContext, Booted};
pub use contracts::InitUnit;
pub use runtime::{
    run, BarrierGuard, CountdownBarrier, LifecycleError, LifecycleRunner, SignalHandler,
};
pub use store::{ConfigStore, Entry, ServiceRef, ServiceStore, StoreError};

// Host-side types units and runners need most often.
pub use bootkit_bootstrap::{
    signal_channel, BootOptions, ChannelSignalListener, ConfigDocument, ConfigError,
    OsSignalListener, ShutdownSignal, SignalListener, SignalTrigger, BOOTER_KEY,
};
