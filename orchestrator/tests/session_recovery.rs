//! Session lifecycle and send-with-recovery against the in-memory tmux.

use std::path::Path;
use std::time::Duration;

use orchestrator::core::classifier::{FailureKind, classify};
use orchestrator::deliver::deliver;
use orchestrator::error::{SettleError, StartupError, find_settle_error};
use orchestrator::session::{Session, SessionManager, SessionPhase};
use orchestrator::test_support::{
    FakeMux, FakeResponse, STARTUP_BANNER, fast_session_timing, fast_settle_timing,
};

const SESSION: &str = "agent";
const TIMEOUT: Duration = Duration::from_millis(150);

fn manager<'m>(mux: &'m FakeMux, dir: &Path) -> SessionManager<'m, FakeMux> {
    SessionManager::new(
        mux,
        Session {
            name: SESSION.to_string(),
            workdir: dir.to_path_buf(),
            command: "/usr/bin/agent --flag".to_string(),
        },
        fast_session_timing(),
        fast_settle_timing(),
    )
}

#[test]
fn ensure_ready_is_idempotent_on_a_healthy_session() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::new();
    let manager = manager(&mux, temp.path());

    manager.ensure_ready().expect("first");
    manager.ensure_ready().expect("second");

    assert_eq!(manager.phase(), SessionPhase::Ready);
    assert_eq!(mux.created(), 1);
    assert_eq!(mux.killed(), 0);
}

#[test]
fn existing_session_is_reused() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::new();
    mux.add_session(SESSION, "already running\n");
    let manager = manager(&mux, temp.path());

    manager.ensure_ready().expect("ready");

    assert_eq!(mux.created(), 0);
    assert_eq!(mux.pane(SESSION).as_deref(), Some("already running\n"));
}

#[test]
fn dead_pane_is_replaced_before_use() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::new();
    mux.add_session(SESSION, "old output\n");
    mux.kill_process(SESSION, 137);
    let manager = manager(&mux, temp.path());

    manager.ensure_ready().expect("ready");

    assert_eq!(manager.phase(), SessionPhase::Ready);
    assert_eq!(mux.killed(), 1);
    assert_eq!(mux.created(), 1);
    assert!(!mux.is_dead(SESSION));
    assert_eq!(mux.pane(SESSION).as_deref(), Some(STARTUP_BANNER));
}

#[test]
fn startup_crash_is_reported_with_pane_text() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::new();
    mux.fail_next_starts(1);
    let manager = manager(&mux, temp.path());

    let err = manager.ensure_ready().expect_err("crash");

    assert_eq!(manager.phase(), SessionPhase::Dead);
    assert_eq!(classify(&err), FailureKind::DeadProcess);
    let startup = err.downcast_ref::<StartupError>().expect("startup error");
    match startup {
        StartupError::ProcessExited { status, pane, .. } => {
            assert_eq!(*status, 1);
            assert!(pane.contains("failed to start"), "{pane}");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn readiness_timeout_reports_last_pane_text() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::new();
    mux.flap_new_sessions();
    let manager = manager(&mux, temp.path());

    let err = manager.ensure_ready().expect_err("never ready");

    assert_eq!(classify(&err), FailureKind::Timeout);
    match err.downcast_ref::<StartupError>().expect("startup error") {
        StartupError::NotReady {
            last_pane,
            last_error,
            ..
        } => {
            assert_eq!(last_pane, STARTUP_BANNER);
            let last_error = last_error.as_deref().expect("last error");
            assert!(last_error.contains("exited shortly after startup"), "{last_error}");
        }
        other => panic!("unexpected {other:?}"),
    }
    let text = format!("{err:#}");
    assert!(text.contains("not ready after"), "{text}");
    assert!(text.ends_with(&format!("\n{STARTUP_BANNER}")), "{text}");
    assert_eq!(mux.created(), 1);
}

#[test]
fn cleanup_kills_and_tolerates_missing_session() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::new();
    let manager = manager(&mux, temp.path());
    manager.ensure_ready().expect("ready");

    manager.cleanup();
    manager.cleanup();

    assert!(!mux.exists(SESSION));
    assert_eq!(mux.killed(), 1);
    assert_eq!(manager.phase(), SessionPhase::Absent);
}

#[test]
fn delivery_returns_settled_pane() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::new();
    let manager = manager(&mux, temp.path());

    let pane = deliver(&manager, "hello", "", TIMEOUT).expect("deliver");

    assert_eq!(pane, format!("{STARTUP_BANNER}> hello\n"));
    assert_eq!(mux.sent(), vec!["hello".to_string()]);
}

#[test]
fn crash_during_response_restarts_and_retries_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_responses([FakeResponse::Crash(2)]);
    let manager = manager(&mux, temp.path());
    manager.ensure_ready().expect("ready");
    let before = manager.capture().expect("capture");

    let pane = deliver(&manager, "make", &before, TIMEOUT).expect("recovered");

    assert_eq!(pane, format!("{STARTUP_BANNER}> make\n"));
    assert_eq!(mux.sent(), vec!["make".to_string(), "make".to_string()]);
    assert_eq!(mux.created(), 2);
    assert_eq!(mux.killed(), 1);
    assert_eq!(manager.phase(), SessionPhase::Ready);
}

#[test]
fn vanished_session_is_recreated() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_responses([FakeResponse::Vanish]);
    let manager = manager(&mux, temp.path());
    manager.ensure_ready().expect("ready");
    let before = manager.capture().expect("capture");

    let pane = deliver(&manager, "ls", &before, TIMEOUT).expect("recovered");

    assert!(pane.ends_with("> ls\n"), "{pane}");
    assert_eq!(mux.created(), 2);
    assert_eq!(mux.killed(), 0);
}

#[test]
fn agent_that_fails_to_start_once_is_recovered() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::new();
    mux.fail_next_starts(1);
    let manager = manager(&mux, temp.path());

    let pane = deliver(&manager, "hi", "", TIMEOUT).expect("recovered");

    assert!(pane.ends_with("> hi\n"), "{pane}");
    assert_eq!(mux.created(), 2);
    assert_eq!(mux.sent(), vec!["hi".to_string()]);
}

#[test]
fn persistent_startup_failure_is_returned_after_one_retry() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::new();
    mux.fail_next_starts(10);
    let manager = manager(&mux, temp.path());

    let err = deliver(&manager, "hi", "", TIMEOUT).expect_err("gives up");

    let text = format!("{err:#}");
    assert!(text.contains("after failed restart"), "{text}");
    assert_eq!(classify(&err), FailureKind::DeadProcess);
    assert!(mux.sent().is_empty());
    // First start, the restart, and the retry's own replacement.
    assert_eq!(mux.created(), 3);
}

#[test]
fn silent_agent_surfaces_still_working_without_restart() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_responses([FakeResponse::Silent]);
    let manager = manager(&mux, temp.path());
    manager.ensure_ready().expect("ready");
    let before = manager.capture().expect("capture");

    let err = deliver(&manager, "think", &before, TIMEOUT).expect_err("still working");

    assert_eq!(classify(&err), FailureKind::StillWorking);
    let settle = find_settle_error(&err).expect("settle error");
    assert!(matches!(settle, SettleError::StillWorking { .. }));
    assert_eq!(settle.last_pane(), before);
    assert_eq!(mux.created(), 1);
    assert_eq!(mux.sent().len(), 1);
}
