use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::mpsc;

/// Signals a shutdown handler can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl+C
    #[serde(alias = "sigint", alias = "int")]
    Interrupt,
    /// SIGTERM
    #[serde(alias = "sigterm", alias = "term")]
    Terminate,
    /// SIGHUP
    #[serde(alias = "sighup", alias = "hup")]
    Hangup,
    /// SIGQUIT
    #[serde(alias = "sigquit")]
    Quit,
    /// SIGUSR1
    #[serde(alias = "sigusr1", alias = "usr1")]
    User1,
    /// SIGUSR2
    #[serde(alias = "sigusr2", alias = "usr2")]
    User2,
}

impl ShutdownSignal {
    /// The conventional shutdown set: interrupt and terminate.
    pub fn defaults() -> Vec<ShutdownSignal> {
        vec![ShutdownSignal::Interrupt, ShutdownSignal::Terminate]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "interrupt",
            ShutdownSignal::Terminate => "terminate",
            ShutdownSignal::Hangup => "hangup",
            ShutdownSignal::Quit => "quit",
            ShutdownSignal::User1 => "user1",
            ShutdownSignal::User2 => "user2",
        }
    }

    #[cfg(unix)]
    fn kind(&self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;
        match self {
            ShutdownSignal::Interrupt => SignalKind::interrupt(),
            ShutdownSignal::Terminate => SignalKind::terminate(),
            ShutdownSignal::Hangup => SignalKind::hangup(),
            ShutdownSignal::Quit => SignalKind::quit(),
            ShutdownSignal::User1 => SignalKind::user_defined1(),
            ShutdownSignal::User2 => SignalKind::user_defined2(),
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown signal '{0}'")]
pub struct UnknownSignal(pub String);

impl FromStr for ShutdownSignal {
    type Err = UnknownSignal;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let name = lower.strip_prefix("sig").unwrap_or(&lower);
        match name {
            "interrupt" | "int" => Ok(ShutdownSignal::Interrupt),
            "terminate" | "term" => Ok(ShutdownSignal::Terminate),
            "hangup" | "hup" => Ok(ShutdownSignal::Hangup),
            "quit" => Ok(ShutdownSignal::Quit),
            "user1" | "usr1" => Ok(ShutdownSignal::User1),
            "user2" | "usr2" => Ok(ShutdownSignal::User2),
            _ => Err(UnknownSignal(s.to_string())),
        }
    }
}

/// Source of shutdown notifications for one signal handler.
///
/// `recv` suspends until one signal of the listener's set arrives and returns it.
#[async_trait]
pub trait SignalListener: Send {
    async fn recv(&mut self) -> Result<ShutdownSignal>;
}

/// Listens for OS signals. Handlers are installed on the first `recv`, not at
/// construction, so signals delivered earlier keep their default disposition.
#[derive(Debug, Clone)]
pub struct OsSignalListener {
    signals: Vec<ShutdownSignal>,
}

impl OsSignalListener {
    pub fn new(signals: impl IntoIterator<Item = ShutdownSignal>) -> Self {
        let mut set: Vec<ShutdownSignal> = Vec::new();
        for s in signals {
            if !set.contains(&s) {
                set.push(s);
            }
        }
        Self { signals: set }
    }

    pub fn signals(&self) -> &[ShutdownSignal] {
        &self.signals
    }
}

#[async_trait]
impl SignalListener for OsSignalListener {
    #[cfg(unix)]
    async fn recv(&mut self) -> Result<ShutdownSignal> {
        use futures::future::select_all;
        use tokio::signal::unix::signal;

        anyhow::ensure!(!self.signals.is_empty(), "empty signal set");

        let mut streams = Vec::with_capacity(self.signals.len());
        for &sig in &self.signals {
            let stream = signal(sig.kind())
                .with_context(|| format!("failed to install {sig} handler"))?;
            streams.push((sig, stream));
        }

        let waits = streams.iter_mut().map(|(sig, stream)| {
            let sig = *sig;
            Box::pin(async move {
                stream.recv().await;
                sig
            })
        });
        let (received, _, _) = select_all(waits).await;

        tracing::info!(signal = %received, "Received shutdown signal");
        Ok(received)
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Result<ShutdownSignal> {
        anyhow::ensure!(!self.signals.is_empty(), "empty signal set");

        if self.signals.contains(&ShutdownSignal::Interrupt) {
            tokio::signal::ctrl_c()
                .await
                .context("failed to install Ctrl+C handler")?;
            tracing::info!("Received Ctrl+C signal");
            return Ok(ShutdownSignal::Interrupt);
        }

        tracing::warn!(
            signals = ?self.signals,
            "signal set has no equivalent on this platform; waiting forever"
        );
        std::future::pending().await
    }
}

/// Sending half of an in-process signal channel.
#[derive(Debug, Clone)]
pub struct SignalTrigger {
    tx: mpsc::UnboundedSender<ShutdownSignal>,
}

impl SignalTrigger {
    /// Deliver `signal`. Returns false once the listener is gone.
    pub fn send(&self, signal: ShutdownSignal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

/// Receiving half of an in-process signal channel; only signals in its set
/// wake it, others are discarded.
#[derive(Debug)]
pub struct ChannelSignalListener {
    signals: Vec<ShutdownSignal>,
    rx: mpsc::UnboundedReceiver<ShutdownSignal>,
}

/// In-process signal delivery, for tests and programmatic shutdown.
pub fn signal_channel(
    signals: impl IntoIterator<Item = ShutdownSignal>,
) -> (SignalTrigger, ChannelSignalListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        SignalTrigger { tx },
        ChannelSignalListener {
            signals: signals.into_iter().collect(),
            rx,
        },
    )
}

#[async_trait]
impl SignalListener for ChannelSignalListener {
    async fn recv(&mut self) -> Result<ShutdownSignal> {
        while let Some(sig) = self.rx.recv().await {
            if self.signals.contains(&sig) {
                return Ok(sig);
            }
            tracing::debug!(signal = %sig, "ignoring signal outside the listener set");
        }
        anyhow::bail!("signal channel closed before a signal was delivered")
    }
}
