//! Fatal error reporting from any subsystem.
//!
//! Any component holding an [`AsyncErrorReporter`] can ask the collector to shut down. Only the
//! first report is acted on. Reporting never blocks: once a report is pending, or once the
//! collector has stopped listening, further reports are logged and dropped.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::error::BoxError;

/// Receiving half, read only by the collector's shutdown multiplexer.
pub type AsyncErrorReceiver = mpsc::Receiver<BoxError>;

/// Cloneable handle for reporting a fatal error.
#[derive(Debug, Clone)]
pub struct AsyncErrorReporter {
    sender: mpsc::Sender<BoxError>,
}

/// Creates a reporter and its receiver.
///
/// The channel holds a single pending report, which is all the collector ever consumes.
pub fn async_error_channel() -> (AsyncErrorReporter, AsyncErrorReceiver) {
    let (sender, receiver) = mpsc::channel(1);
    (AsyncErrorReporter { sender }, receiver)
}

impl AsyncErrorReporter {
    /// Reports a fatal error. Returns true if the report was queued for the collector.
    pub fn report(&self, err: impl Into<BoxError>) -> bool {
        match self.sender.try_send(err.into()) {
            Ok(()) => true,
            Err(TrySendError::Full(err)) => {
                warn!(error = %err, "Fatal error dropped, shutdown already requested");
                false
            }
            Err(TrySendError::Closed(err)) => {
                warn!(error = %err, "Fatal error dropped, collector no longer listening");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_first_report_is_queued() {
        let (reporter, mut errors) = async_error_channel();
        let other = reporter.clone();

        assert!(reporter.report("exporter crashed"));
        assert!(!other.report("receiver crashed"));

        let first = errors.recv().await.unwrap();
        assert_eq!(first.to_string(), "exporter crashed");
    }

    #[tokio::test]
    async fn test_report_after_receiver_dropped_does_not_block() {
        let (reporter, errors) = async_error_channel();
        drop(errors);
        assert!(!reporter.report("late failure"));
    }
}
