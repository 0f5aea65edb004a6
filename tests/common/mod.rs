#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

use collector_lifecycle::ballast::BallastGauge;
use collector_lifecycle::lifecycle::{Signal, SignalSource, StateReceiver};
use collector_lifecycle::mock::{self, Journal, MockProvider, MockServiceFactory, MockTelemetry};
use collector_lifecycle::{Collector, CollectorError, CollectorSettings, Parameters, State, StopHandle};

const STATE_TIMEOUT: Duration = Duration::from_secs(5);

pub type RunHandle = JoinHandle<(Collector, Result<(), CollectorError>)>;

/// A collector wired to the mock collaborators.
pub struct Harness {
    pub journal: Journal,
    pub provider: Arc<MockProvider>,
    pub services: Arc<MockServiceFactory>,
    pub telemetry: Arc<MockTelemetry>,
    pub signals: mpsc::Sender<Signal>,
    pub states: StateReceiver,
    pub stop: StopHandle,
    pub ballast: BallastGauge,
    collector: Option<Collector>,
}

impl Harness {
    pub fn new(config: &str) -> Self {
        Self::with_settings(config, CollectorSettings::default())
    }

    pub fn with_settings(config: &str, settings: CollectorSettings) -> Self {
        let journal = Journal::default();
        let provider = MockProvider::new(&journal, config);
        Self::build(journal, provider, settings)
    }

    /// Uses a provider prepared by the test, which must share `journal`.
    pub fn with_provider(journal: Journal, provider: MockProvider, settings: CollectorSettings) -> Self {
        Self::build(journal, provider, settings)
    }

    fn build(journal: Journal, provider: MockProvider, settings: CollectorSettings) -> Self {
        let provider = Arc::new(provider);
        let services = Arc::new(MockServiceFactory::new(&journal));
        let telemetry = Arc::new(MockTelemetry::new(&journal));
        let (signals, source) = SignalSource::channel();

        let params = Parameters::new(mock::factories(), services.clone())
            .with_provider(provider.clone())
            .with_telemetry(telemetry.clone())
            .with_settings(settings)
            .with_signals(source);
        let mut collector = Collector::new(params).expect("collector should build");
        let states = collector.state_receiver().expect("state receiver");
        let stop = collector.stop_handle();
        let ballast = collector.ballast_gauge();

        Self {
            journal,
            provider,
            services,
            telemetry,
            signals,
            states,
            stop,
            ballast,
            collector: Some(collector),
        }
    }

    /// Runs the collector on its own task. The collector is handed back when the run ends.
    pub fn spawn(&mut self) -> RunHandle {
        let mut collector = self.collector.take().expect("collector already spawned");
        tokio::spawn(async move {
            let result = collector.run().await;
            (collector, result)
        })
    }

    /// Waits for the next published state.
    pub async fn next_state(&mut self) -> Option<State> {
        tokio::time::timeout(STATE_TIMEOUT, self.states.recv())
            .await
            .expect("timed out waiting for a state")
    }

    /// Spawns the collector and waits until it is `Running`.
    pub async fn start(&mut self) -> RunHandle {
        let handle = self.spawn();
        assert_eq!(self.next_state().await, Some(State::Starting));
        assert_eq!(self.next_state().await, Some(State::Running));
        handle
    }

    /// States still queued, and whether the channel was closed after them.
    pub fn drain_states(&mut self) -> (Vec<State>, bool) {
        let mut states = Vec::new();
        loop {
            match self.states.try_recv() {
                Ok(state) => states.push(state),
                Err(TryRecvError::Empty) => return (states, false),
                Err(TryRecvError::Disconnected) => return (states, true),
            }
        }
    }
}

pub async fn finish(handle: RunHandle) -> (Collector, Result<(), CollectorError>) {
    tokio::time::timeout(STATE_TIMEOUT, handle)
        .await
        .expect("collector did not stop")
        .expect("collector task panicked")
}
