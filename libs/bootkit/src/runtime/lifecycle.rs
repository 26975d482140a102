//! Lifecycle runner.
//!
//! Phase order: **starting → execution → started → signals + async → wait → terminated**.
//!
//! - The main task and every signal handler are *tracked*: each holds one
//!   count of the barrier, and `wait` only returns once all of them finished.
//! - Async tasks are *untracked*: spawned and never joined.
//! - `started` runs right after the main task is launched and does not wait for it.

use std::any::Any;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};

use bootkit_bootstrap::{OsSignalListener, ShutdownSignal, SignalListener};

use super::barrier::CountdownBarrier;

type TaskFn = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;
type SignalFn = Box<dyn FnOnce(ShutdownSignal) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

fn boxed_task<F, Fut>(f: F) -> TaskFn
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move || f().boxed())
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("starting callback #{index} failed")]
    Starting {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("started callback #{index} failed")]
    Started {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("main task failed")]
    Main {
        #[source]
        source: anyhow::Error,
    },
    #[error("main task panicked: {reason}")]
    MainPanicked { reason: String },
    #[error("signal handler #{index} failed")]
    Signal {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("signal handler #{index} panicked: {reason}")]
    SignalPanicked { index: usize, reason: String },
    #[error("terminated callback #{index} failed")]
    Terminated {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
}

/// A listener for a set of signals plus the cleanup to run on the first one.
///
/// A handler counts as done only after its cleanup returned, and the runner
/// waits for *every* handler, so with several handlers registered each one
/// must receive a signal before the process shuts down.
pub struct SignalHandler {
    listener: Box<dyn SignalListener>,
    handler: SignalFn,
}

impl SignalHandler {
    /// Listen for OS signals.
    pub fn new<F, Fut>(signals: impl IntoIterator<Item = ShutdownSignal>, handler: F) -> Self
    where
        F: FnOnce(ShutdownSignal) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::with_listener(OsSignalListener::new(signals), handler)
    }

    pub fn with_listener<L, F, Fut>(listener: L, handler: F) -> Self
    where
        L: SignalListener + 'static,
        F: FnOnce(ShutdownSignal) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            listener: Box::new(listener),
            handler: Box::new(move |sig| handler(sig).boxed()),
        }
    }

    async fn listen(mut self) -> anyhow::Result<()> {
        let sig = self.listener.recv().await?;
        tracing::info!(signal = %sig, "Running signal handler");
        (self.handler)(sig).await
    }
}

/// Drives one main task through the process lifecycle.
pub struct LifecycleRunner {
    main: TaskFn,
    starting: Vec<TaskFn>,
    started: Vec<TaskFn>,
    signals: Vec<SignalHandler>,
    asyncs: Vec<TaskFn>,
    terminated: Vec<TaskFn>,
}

impl LifecycleRunner {
    pub fn new<F, Fut>(main: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            main: boxed_task(main),
            starting: Vec::new(),
            started: Vec::new(),
            signals: Vec::new(),
            asyncs: Vec::new(),
            terminated: Vec::new(),
        }
    }

    /// Runs before the main task is launched; a failure aborts `run`.
    pub fn on_starting<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.starting.push(boxed_task(f));
        self
    }

    /// Runs right after the main task is launched, concurrently with it.
    pub fn on_started<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.started.push(boxed_task(f));
        self
    }

    pub fn on_signal(mut self, handler: SignalHandler) -> Self {
        self.signals.push(handler);
        self
    }

    /// Background task that is never awaited; shutdown does not wait for it.
    pub fn spawn_async<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.asyncs.push(boxed_task(f));
        self
    }

    /// Runs after the main task and every signal handler have finished.
    pub fn on_terminated<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.terminated.push(boxed_task(f));
        self
    }

    pub async fn run(self) -> Result<(), LifecycleError> {
        let LifecycleRunner {
            main,
            starting,
            started,
            signals,
            asyncs,
            terminated,
        } = self;

        // 1. Starting
        tracing::info!(callbacks = starting.len(), "Phase: starting");
        for (index, cb) in starting.into_iter().enumerate() {
            cb().await
                .map_err(|source| LifecycleError::Starting { index, source })?;
        }

        let barrier = CountdownBarrier::new(1 + signals.len());

        // 2. Execution
        tracing::info!("Phase: execution");
        let guard = barrier.guard();
        let main_task = tokio::spawn(async move {
            let _guard = guard;
            let res = main().await;
            if let Err(e) = &res {
                tracing::error!(error = %e, "Main task failed");
            }
            res
        });

        // 3. Started
        tracing::info!(callbacks = started.len(), "Phase: started");
        for (index, cb) in started.into_iter().enumerate() {
            if let Err(source) = cb().await {
                main_task.abort();
                return Err(LifecycleError::Started { index, source });
            }
        }

        // 4. Signals (tracked) and async (detached)
        tracing::info!(
            signal_handlers = signals.len(),
            async_tasks = asyncs.len(),
            "Phase: signals"
        );
        let signal_tasks: Vec<JoinHandle<anyhow::Result<()>>> = signals
            .into_iter()
            .enumerate()
            .map(|(index, handler)| {
                let guard = barrier.guard();
                tokio::spawn(async move {
                    let _guard = guard;
                    let res = handler.listen().await;
                    if let Err(e) = &res {
                        tracing::error!(index, error = %e, "Signal handler failed");
                    }
                    res
                })
            })
            .collect();

        for (index, task) in asyncs.into_iter().enumerate() {
            tokio::spawn(async move {
                if let Err(e) = task().await {
                    tracing::warn!(index, error = %e, "Async task failed");
                }
            });
        }

        // 5. Wait for every tracked task
        tracing::info!(tracked = barrier.remaining(), "Phase: wait");
        barrier.wait().await;

        let mut failure = None;
        match main_task.await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => record(&mut failure, LifecycleError::Main { source }),
            Err(e) => {
                let reason = join_reason(e);
                tracing::error!(%reason, "Main task panicked");
                record(&mut failure, LifecycleError::MainPanicked { reason });
            }
        }
        for (index, task) in signal_tasks.into_iter().enumerate() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(source)) => record(&mut failure, LifecycleError::Signal { index, source }),
                Err(e) => {
                    let reason = join_reason(e);
                    tracing::error!(index, %reason, "Signal handler panicked");
                    record(&mut failure, LifecycleError::SignalPanicked { index, reason });
                }
            }
        }

        // 6. Terminated
        tracing::info!(callbacks = terminated.len(), "Phase: terminated");
        let mut teardown_failure = None;
        for (index, cb) in terminated.into_iter().enumerate() {
            if let Err(source) = cb().await {
                tracing::error!(index, error = %source, "Terminated callback failed");
                record(
                    &mut teardown_failure,
                    LifecycleError::Terminated { index, source },
                );
            }
        }

        match failure.or(teardown_failure) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Keep the first failure.
fn record(slot: &mut Option<LifecycleError>, err: LifecycleError) {
    if slot.is_none() {
        *slot = Some(err);
    }
}

fn join_reason(err: JoinError) -> String {
    if err.is_cancelled() {
        return "cancelled".to_string();
    }
    panic_message(err.into_panic())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
