//! # Lifecycle
//!
//! Everything that moves a collector from `Starting` to `Closed`.
//!
//! - [`state`]: the state machine and its notification channel.
//! - [`signals`]: where termination signals come from.
//! - [`async_errors`]: fatal error reporting from any subsystem.
//! - [`service_slot`]: the actor owning the current service (apply, reload, shutdown).
//! - [`backoff`]: spacing between troubled reloads.
//! - [`collector`]: the orchestrator.
//! - [`tracing`](mod@tracing): logging setup for the binary.

pub mod async_errors;
pub mod backoff;
pub mod collector;
pub mod service_slot;
pub mod signals;
pub mod state;
pub mod tracing;

pub use async_errors::{async_error_channel, AsyncErrorReceiver, AsyncErrorReporter};
pub use backoff::ReloadBackoff;
pub use collector::{Collector, CollectorSettings, Parameters, StopHandle};
pub use service_slot::{Generation, ServiceSlot, ServiceSlotClient, SlotContext};
pub use signals::{Signal, SignalSource};
pub use state::{state_channel, State, StateError, StatePublisher, StateReceiver};
pub use self::tracing::setup_tracing;
