//! Lifecycle states and the state notification channel.
//!
//! The collector moves through `Starting → Running → Closing → Closed` exactly once. Observers
//! read the transitions from a bounded channel; after `Closed` is published the channel is closed.
//! A run that fails during setup publishes only `Starting` and leaves the channel open.

use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Buffer of the notification channel. Large enough for every state of one run.
pub const STATE_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Starting,
    Running,
    Closing,
    Closed,
}

impl State {
    /// The only state that may follow this one.
    pub fn next(self) -> Option<State> {
        match self {
            State::Starting => Some(State::Running),
            State::Running => Some(State::Closing),
            State::Closing => Some(State::Closed),
            State::Closed => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Starting => "Starting",
            State::Running => "Running",
            State::Closing => "Closing",
            State::Closed => "Closed",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("illegal state transition from {from:?} to {to}")]
    IllegalTransition { from: Option<State>, to: State },
}

/// Observer end of the notification channel.
pub type StateReceiver = mpsc::Receiver<State>;

/// Creates a publisher and its receiver.
pub fn state_channel() -> (StatePublisher, StateReceiver) {
    let (sender, receiver) = mpsc::channel(STATE_CHANNEL_CAPACITY);
    (
        StatePublisher {
            sender: Some(sender),
            current: None,
        },
        receiver,
    )
}

/// Publishing end. Enforces the transition order.
#[derive(Debug)]
pub struct StatePublisher {
    sender: Option<mpsc::Sender<State>>,
    current: Option<State>,
}

impl StatePublisher {
    pub fn current(&self) -> Option<State> {
        self.current
    }

    /// Records `state` and notifies observers.
    ///
    /// Never blocks. An observer that went away does not fail the transition.
    pub fn publish(&mut self, state: State) -> Result<(), StateError> {
        let legal = match self.current {
            None => state == State::Starting,
            Some(current) => current.next() == Some(state),
        };
        if !legal {
            return Err(StateError::IllegalTransition {
                from: self.current,
                to: state,
            });
        }
        self.current = Some(state);
        debug!(%state, "Collector state changed");

        if let Some(sender) = &self.sender {
            match sender.try_send(state) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(_)) => warn!(%state, "State notification dropped"),
            }
        }
        Ok(())
    }

    /// Closes the channel. Only allowed once `Closed` was published.
    pub fn close(&mut self) -> bool {
        if self.current == Some(State::Closed) {
            self.sender.take();
            true
        } else {
            false
        }
    }
}
