mod common;

use common::{finish, Harness};

use collector_lifecycle::error::ShutdownStep;
use collector_lifecycle::lifecycle::Signal;
use collector_lifecycle::mock::{self, Event, Journal, MockProvider};
use collector_lifecycle::{CollectorError, CollectorSettings, State};

/// A terminate signal shuts down a healthy collector cleanly.
#[tokio::test]
async fn test_terminate_signal_runs_full_lifecycle() {
    let mut harness = Harness::new(mock::valid_config());
    let handle = harness.start().await;

    harness.signals.send(Signal::Terminate).await.unwrap();
    let (_, result) = finish(handle).await;
    assert!(result.is_ok(), "unexpected error: {result:?}");

    let (rest, closed) = harness.drain_states();
    assert_eq!(rest, vec![State::Closing, State::Closed]);
    assert!(closed, "state channel should be closed after Closed");

    assert_eq!(
        harness.journal.events(),
        vec![
            Event::TelemetryInit { ballast_size_bytes: 0 },
            Event::ProviderGet,
            Event::ServiceStart(1),
            Event::ProviderClose,
            Event::ServiceShutdown(1),
            Event::TelemetryShutdown,
        ]
    );
}

/// An invalid configuration aborts setup with only `Starting` published.
#[tokio::test]
async fn test_invalid_config_stops_after_starting() {
    let mut harness = Harness::new(mock::invalid_config());
    let (collector, result) = finish(harness.spawn()).await;

    let err = result.unwrap_err();
    assert!(matches!(err, CollectorError::InvalidConfig(_)));
    assert!(err.to_string().starts_with("invalid configuration"));

    let (states, closed) = harness.drain_states();
    assert_eq!(states, vec![State::Starting]);
    assert!(!closed, "a failed setup must not close the state channel");
    assert_eq!(collector.state(), Some(State::Starting));

    assert!(!harness.journal.contains(|e| matches!(e, Event::ServiceStart(_))));
    assert!(!harness.journal.contains(|e| *e == Event::ProviderClose));
    assert!(!harness.journal.contains(|e| *e == Event::TelemetryShutdown));
}

/// A fatal async error triggers shutdown; a failing service shutdown does not stop the sequence.
#[tokio::test]
async fn test_async_error_triggers_shutdown_and_reports_service_failure() {
    let mut harness = Harness::new(mock::valid_config());
    let handle = harness.start().await;

    harness.services.fail_shutdown("exporter stuck");
    let reporter = harness
        .services
        .last_settings()
        .expect("service settings")
        .async_errors;
    assert!(reporter.report("receiver lost its port"));

    assert_eq!(harness.next_state().await, Some(State::Closing));
    let (_, result) = finish(handle).await;

    match result {
        Err(CollectorError::Shutdown(err)) => {
            assert_eq!(err.failures().len(), 1);
            assert!(err.failed(ShutdownStep::ShutdownService));
            assert_eq!(err.to_string(), "failed to shutdown service: exporter stuck");
        }
        other => panic!("expected a shutdown error, got {other:?}"),
    }
    assert!(harness.journal.contains(|e| *e == Event::ProviderClose));
    assert!(harness.journal.contains(|e| *e == Event::TelemetryShutdown));
    assert_eq!(harness.next_state().await, Some(State::Closed));
}

/// Every failed teardown step is reported, in order.
#[tokio::test]
async fn test_aggregate_reports_close_and_service_failures() {
    let mut harness = Harness::new(mock::valid_config());
    let handle = harness.start().await;

    harness.provider.fail_close("disk gone");
    harness.services.fail_shutdown("exporter stuck");
    harness.telemetry.fail_shutdown("flush failed");
    harness.stop.stop();

    let (_, result) = finish(handle).await;
    let err = match result {
        Err(CollectorError::Shutdown(err)) => err,
        other => panic!("expected a shutdown error, got {other:?}"),
    };
    let steps: Vec<_> = err.failures().iter().map(|f| f.step).collect();
    assert_eq!(
        steps,
        vec![
            ShutdownStep::CloseProvider,
            ShutdownStep::ShutdownService,
            ShutdownStep::ShutdownTelemetry
        ]
    );
    let message = err.to_string();
    assert!(message.contains("failed to close config: disk gone"));
    assert!(message.contains("failed to shutdown service: exporter stuck"));

    let (rest, closed) = harness.drain_states();
    assert_eq!(rest, vec![State::Closing, State::Closed]);
    assert!(closed);
}

/// Only the first trigger counts; later stops and signals change nothing.
#[tokio::test]
async fn test_only_first_trigger_counts() {
    let mut harness = Harness::new(mock::valid_config());
    let handle = harness.start().await;

    harness.stop.stop();
    harness.stop.stop();
    let _ = harness.signals.try_send(Signal::Interrupt);

    let (_, result) = finish(handle).await;
    assert!(result.is_ok());
    assert!(harness.stop.is_stopped());

    let reporter = harness.telemetry.reporter().expect("telemetry got a reporter");
    assert!(!reporter.report("too late"));

    let (rest, closed) = harness.drain_states();
    assert_eq!(rest, vec![State::Closing, State::Closed]);
    assert!(closed);
    assert_eq!(harness.journal.count(|e| *e == Event::TelemetryShutdown), 1);
    assert_eq!(harness.journal.count(|e| *e == Event::ServiceShutdown(1)), 1);
}

/// A stop requested before the run still lets setup finish, then shuts down.
#[tokio::test]
async fn test_stop_before_run() {
    let mut harness = Harness::new(mock::valid_config());
    harness.stop.stop();

    let (_, result) = finish(harness.spawn()).await;
    assert!(result.is_ok());

    let (states, closed) = harness.drain_states();
    assert_eq!(
        states,
        vec![State::Starting, State::Running, State::Closing, State::Closed]
    );
    assert!(closed);
}

/// The ballast is held for the whole run and released by the shutdown sequence.
#[tokio::test]
async fn test_ballast_held_until_shutdown() {
    let settings = CollectorSettings {
        mem_ballast_size_mib: 2,
        ..Default::default()
    };
    let mut harness = Harness::with_settings(mock::valid_config(), settings);
    assert_eq!(harness.ballast.held_bytes(), 0);

    let handle = harness.start().await;
    assert_eq!(harness.ballast.held_bytes(), 2 * 1_048_576);
    assert!(harness.journal.contains(|e| *e
        == Event::TelemetryInit {
            ballast_size_bytes: 2 * 1_048_576
        }));

    harness.stop.stop();
    finish(handle).await.1.unwrap();
    assert_eq!(harness.ballast.held_bytes(), 0);
}

#[tokio::test]
async fn test_second_run_is_rejected() {
    let mut harness = Harness::new(mock::valid_config());
    let handle = harness.start().await;
    harness.stop.stop();

    let (mut collector, result) = finish(handle).await;
    result.unwrap();
    assert!(matches!(
        collector.run().await,
        Err(CollectorError::AlreadyStarted)
    ));
}

#[tokio::test]
async fn test_telemetry_init_failure_aborts_before_config() {
    let mut harness = Harness::new(mock::valid_config());
    harness.telemetry.fail_init("no exporter endpoint");

    let (_collector, result) = finish(harness.spawn()).await;
    assert!(matches!(result, Err(CollectorError::TelemetryInit(_))));
    assert!(!harness.journal.contains(|e| *e == Event::ProviderGet));
    assert_eq!(harness.drain_states(), (vec![State::Starting], false));
}

#[tokio::test]
async fn test_setup_errors_name_their_phase() {
    let mut harness = Harness::new(mock::valid_config());
    harness.provider.fail_get("config server unreachable");
    let (_, result) = finish(harness.spawn()).await;
    assert_eq!(
        result.unwrap_err().to_string(),
        "cannot load configuration's parser: config server unreachable"
    );

    let mut harness = Harness::new(mock::unloadable_config());
    let (_, result) = finish(harness.spawn()).await;
    let err = result.unwrap_err();
    assert!(matches!(err, CollectorError::ConfigLoad(_)));
    assert!(err.to_string().starts_with("cannot load configuration:"));

    let mut harness = Harness::new(mock::valid_config());
    harness.services.fail_start("port 4317 in use");
    let (_, result) = finish(harness.spawn()).await;
    assert_eq!(
        result.unwrap_err().to_string(),
        "failed to start service: port 4317 in use"
    );
}

/// By default a failed setup leaves telemetry running.
#[tokio::test]
async fn test_setup_failure_keeps_telemetry_by_default() {
    let mut harness = Harness::new(mock::valid_config());
    harness.services.fail_start("port 4317 in use");

    let (_, result) = finish(harness.spawn()).await;
    assert!(matches!(result, Err(CollectorError::ServiceStart(_))));
    assert!(!harness.journal.contains(|e| *e == Event::TelemetryShutdown));
    assert!(!harness.journal.contains(|e| *e == Event::ProviderClose));
}

#[tokio::test]
async fn test_setup_failure_keeps_ballast_by_default() {
    let settings = CollectorSettings {
        mem_ballast_size_mib: 1,
        ..Default::default()
    };
    let mut harness = Harness::with_settings(mock::valid_config(), settings);
    harness.services.fail_start("port 4317 in use");

    let (_, result) = finish(harness.spawn()).await;
    assert!(result.is_err());
    assert_eq!(harness.ballast.held_bytes(), 1_048_576);
}

#[tokio::test]
async fn test_setup_failure_teardown_when_enabled() {
    let settings = CollectorSettings {
        teardown_on_setup_failure: true,
        mem_ballast_size_mib: 1,
        ..Default::default()
    };
    let mut harness = Harness::with_settings(mock::valid_config(), settings);
    harness.services.fail_start("port 4317 in use");

    let (_collector, result) = finish(harness.spawn()).await;
    assert!(matches!(result, Err(CollectorError::ServiceStart(_))));

    let events = harness.journal.events();
    assert_eq!(
        &events[events.len() - 2..],
        &[Event::ProviderClose, Event::TelemetryShutdown]
    );
    assert_eq!(harness.ballast.held_bytes(), 0);
    // The state channel still reflects a failed setup.
    assert_eq!(harness.drain_states(), (vec![State::Starting], false));
}

#[tokio::test]
async fn test_plain_provider_is_never_closed() {
    let journal = Journal::default();
    let provider = MockProvider::new(&journal, mock::valid_config())
        .without_watch()
        .without_close();
    let mut harness = Harness::with_provider(journal, provider, CollectorSettings::default());

    let handle = harness.start().await;
    harness.stop.stop();
    finish(handle).await.1.unwrap();

    assert!(!harness.journal.contains(|e| *e == Event::ProviderClose));
    assert!(harness.journal.contains(|e| *e == Event::ServiceShutdown(1)));
}
