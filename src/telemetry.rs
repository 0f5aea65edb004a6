//! The collector's own telemetry.
//!
//! Telemetry about the collector itself (not the data it processes) is an explicit instance owned
//! by the [`Collector`](crate::lifecycle::Collector): initialized once at startup, shut down once
//! during teardown. There is no process-wide singleton.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{info, Span};

use crate::error::BoxError;
use crate::lifecycle::AsyncErrorReporter;

/// How much the collector reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryLevel {
    None,
    #[default]
    Basic,
    Normal,
    Detailed,
}

impl fmt::Display for TelemetryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TelemetryLevel::None => "none",
            TelemetryLevel::Basic => "basic",
            TelemetryLevel::Normal => "normal",
            TelemetryLevel::Detailed => "detailed",
        })
    }
}

impl FromStr for TelemetryLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(TelemetryLevel::None),
            "basic" => Ok(TelemetryLevel::Basic),
            "normal" => Ok(TelemetryLevel::Normal),
            "detailed" => Ok(TelemetryLevel::Detailed),
            other => Err(format!("unknown telemetry level {other:?}")),
        }
    }
}

/// The collector's own observability subsystem.
#[async_trait]
pub trait Telemetry: Send + Sync {
    /// Starts self-observation.
    ///
    /// `async_errors` lets the subsystem stop the collector on a fatal failure.
    async fn init(
        &self,
        async_errors: AsyncErrorReporter,
        ballast_size_bytes: u64,
        span: Span,
    ) -> Result<(), BoxError>;

    async fn shutdown(&self) -> Result<(), BoxError>;
}

#[derive(Debug)]
struct Active {
    // Held so the subsystem can report failures for as long as it is initialized.
    #[allow(dead_code)]
    async_errors: AsyncErrorReporter,
    ballast_size_bytes: u64,
}

/// Default telemetry: reports process facts through `tracing`.
#[derive(Debug, Default)]
pub struct ProcessTelemetry {
    level: TelemetryLevel,
    active: Mutex<Option<Active>>,
}

impl ProcessTelemetry {
    pub fn new(level: TelemetryLevel) -> Self {
        Self {
            level,
            active: Mutex::new(None),
        }
    }

    pub fn level(&self) -> TelemetryLevel {
        self.level
    }

    pub fn is_initialized(&self) -> bool {
        self.active.lock().map(|a| a.is_some()).unwrap_or(false)
    }
}

#[async_trait]
impl Telemetry for ProcessTelemetry {
    async fn init(
        &self,
        async_errors: AsyncErrorReporter,
        ballast_size_bytes: u64,
        span: Span,
    ) -> Result<(), BoxError> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| "telemetry state poisoned")?;
        if active.is_some() {
            return Err("telemetry already initialized".into());
        }

        let _entered = span.enter();
        if self.level > TelemetryLevel::None {
            let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
            info!(level = %self.level, cpus, ballast_size_bytes, "Own telemetry initialized");
        }
        *active = Some(Active {
            async_errors,
            ballast_size_bytes,
        });
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| "telemetry state poisoned")?;
        if let Some(state) = active.take() {
            if self.level > TelemetryLevel::None {
                info!(ballast_size_bytes = state.ballast_size_bytes, "Own telemetry stopped");
            }
        }
        Ok(())
    }
}
