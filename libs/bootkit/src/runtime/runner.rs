//! One-call entry point: bootstrap, assemble the lifecycle, run it.

use anyhow::Context;

use crate::booter::Booter;
use crate::context::Booted;
use crate::runtime::LifecycleRunner;

/// Full cycle: env → config → units → (starting → execution → started →
/// signals + async → wait → terminated).
///
/// `build` receives the frozen stores and returns the runner to drive. A
/// bootstrap failure returns before any lifecycle phase starts.
pub async fn run<F>(booter: Booter, build: F) -> anyhow::Result<()>
where
    F: FnOnce(&Booted) -> anyhow::Result<LifecycleRunner>,
{
    let booted = booter.execute().await.context("bootstrap failed")?;
    let runner = build(&booted).context("failed to assemble lifecycle")?;
    runner.run().await?;
    Ok(())
}
