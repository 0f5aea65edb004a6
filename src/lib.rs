#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Collector Lifecycle
//!
//! > **The process-level orchestrator of a telemetry collector.**
//!
//! This crate does not receive, process or export telemetry itself. It owns everything *around*
//! the service that does: loading and validating configuration, starting the service, swapping it
//! on a configuration change, and shutting the whole process down in order when asked to.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### One Writer for the Running Service
//! The current service instance is read by shutdown and replaced by hot reload, which run on
//! different tasks. Instead of sharing it behind a lock, a single actor
//! ([`ServiceSlot`](lifecycle::ServiceSlot)) owns it and processes Apply, Reload, Current and
//! Shutdown requests one at a time. A retiring service is always fully shut down before its
//! replacement is built.
//!
//! ### Shutdown Never Stops Early
//! Every teardown step runs even if an earlier one failed. All failures are kept, each with the
//! step it came from, in a [`ShutdownError`](error::ShutdownError).
//!
//! ### Explicit Collaborators
//! The configuration source, the service runtime and the collector's own telemetry are traits
//! passed in through [`Parameters`](lifecycle::Parameters). Nothing is a process-wide singleton,
//! so tests swap every one of them for the doubles in [`mock`].
//!
//! ## 🚦 Lifecycle
//!
//! ```text
//! Starting ──► Running ──► Closing ──► Closed
//!    │
//!    └── setup failure: run() returns the error, nothing else is published
//! ```
//!
//! Observers read transitions from [`Collector::state_receiver`](lifecycle::Collector::state_receiver).
//! Shutdown is triggered by the first of: a fatal async error, SIGINT/SIGTERM, or
//! [`StopHandle::stop`](lifecycle::StopHandle::stop).
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Orchestrator ([`lifecycle`])
//! - **Role**: The state machine, trigger multiplexing, the service slot actor and the shutdown sequence.
//! - **Key items**: [`Collector`](lifecycle::Collector), [`ServiceSlot`](lifecycle::ServiceSlot),
//!   [`State`](lifecycle::State).
//!
//! ### 2. Configuration ([`config`], [`component`])
//! - **Role**: Providers, the TOML configuration model, loading and validation against the
//!   registered component factories.
//! - **Key items**: [`ParserProvider`](config::ParserProvider), [`FileProvider`](config::FileProvider),
//!   [`Config`](config::Config), [`Factories`](component::Factories).
//!
//! ### 3. Collaborator Seams ([`service`], [`telemetry`])
//! - **Role**: What the orchestrator starts and stops.
//! - **Key items**: [`ServiceFactory`](service::ServiceFactory), [`Telemetry`](telemetry::Telemetry).
//!
//! ### 4. Support ([`ballast`], [`error`], [`mock`])
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! RUST_LOG=info cargo run -- --config otelcol.toml
//! cargo run -- --config otelcol.toml --set "exporters::logging::loglevel=debug" --mem-ballast-size-mib 64
//! ```
//!
//! ### Running Tests
//!
//! ```bash
//! cargo test
//! ```

pub mod ballast;
pub mod component;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod mock;
pub mod service;
pub mod telemetry;

pub use error::{BoxError, CollectorError, ShutdownError};
pub use lifecycle::{Collector, CollectorSettings, Parameters, State, StopHandle};
