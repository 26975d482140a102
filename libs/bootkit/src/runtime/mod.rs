mod barrier;
mod lifecycle;
mod runner;

pub use barrier::{BarrierGuard, CountdownBarrier};
pub use lifecycle::{LifecycleError, LifecycleRunner, SignalHandler};
pub use runner::run;
