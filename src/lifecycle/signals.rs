//! Termination signal sources.
//!
//! The collector listens for interrupt and terminate on a [`SignalSource`]. Production uses the
//! OS; tests inject signals through a channel or disable them entirely.

use std::fmt;
use tokio::sync::mpsc;

/// A termination request from outside the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Interrupt => "interrupt",
            Signal::Terminate => "terminate",
        })
    }
}

/// Where the collector reads termination signals from.
#[derive(Debug, Default)]
pub enum SignalSource {
    /// SIGINT and SIGTERM (Ctrl-C outside unix).
    #[default]
    Os,
    /// Signals sent by the test or embedding application.
    Channel(mpsc::Receiver<Signal>),
    /// Never delivers a signal.
    Disabled,
}

impl SignalSource {
    /// A channel-backed source and the sender that feeds it.
    pub fn channel() -> (mpsc::Sender<Signal>, SignalSource) {
        let (tx, rx) = mpsc::channel(1);
        (tx, SignalSource::Channel(rx))
    }

    /// Waits for the next signal. Pends forever when none can arrive.
    pub async fn recv(&mut self) -> Signal {
        match self {
            SignalSource::Os => os_signal().await,
            SignalSource::Channel(rx) => match rx.recv().await {
                Some(signal) => signal,
                None => std::future::pending().await,
            },
            SignalSource::Disabled => std::future::pending().await,
        }
    }
}

#[cfg(unix)]
async fn os_signal() -> Signal {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut interrupt, mut terminate) =
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(i), Ok(t)) => (i, t),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                return std::future::pending().await;
            }
        };

    tokio::select! {
        _ = interrupt.recv() => Signal::Interrupt,
        _ = terminate.recv() => Signal::Terminate,
    }
}

#[cfg(not(unix))]
async fn os_signal() -> Signal {
    match tokio::signal::ctrl_c().await {
        Ok(()) => Signal::Interrupt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install signal handlers");
            std::future::pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_channel_delivers_signal() {
        let (tx, mut source) = SignalSource::channel();
        tx.send(Signal::Terminate).await.unwrap();
        assert_eq!(source.recv().await, Signal::Terminate);
    }

    #[tokio::test]
    async fn test_closed_channel_never_signals() {
        let (tx, mut source) = SignalSource::channel();
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_millis(20), source.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_disabled_never_signals() {
        let mut source = SignalSource::Disabled;
        let waited = tokio::time::timeout(Duration::from_millis(20), source.recv()).await;
        assert!(waited.is_err());
    }
}
