use async_trait::async_trait;

use crate::context::BootContext;

/// Initialization unit: one participant of the bootstrap sequence.
///
/// The [`Booter`](crate::Booter) calls `boot` then `register` on each unit, in
/// list order, before moving to the next unit. A unit therefore sees every
/// service published by the units before it, and none of the ones after it.
#[async_trait]
pub trait InitUnit: Send {
    /// Name used in logs and bootstrap diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Acquire or construct resources (open connections, build clients).
    async fn boot(&mut self, ctx: &BootContext) -> anyhow::Result<()>;

    /// Publish what `boot` produced into the service store.
    async fn register(&mut self, ctx: &mut BootContext) -> anyhow::Result<()>;
}
