use std::io::Cursor;
use std::time::Duration;

use orchestrator::interactive::{ChatSummary, chat_loop};
use orchestrator::session::{Session, SessionManager};
use orchestrator::test_support::{FakeMux, FakeResponse, fast_session_timing, fast_settle_timing};

fn run_chat(mux: &FakeMux, input: &str) -> (ChatSummary, String) {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = SessionManager::new(
        mux,
        Session {
            name: "chat".to_string(),
            workdir: temp.path().to_path_buf(),
            command: "agent".to_string(),
        },
        fast_session_timing(),
        fast_settle_timing(),
    );
    manager.ensure_ready().expect("ready");

    let mut out = Vec::new();
    let summary = chat_loop(
        &manager,
        Cursor::new(input.to_string()),
        &mut out,
        Duration::from_millis(150),
    )
    .expect("chat");
    (summary, String::from_utf8(out).expect("utf8"))
}

#[test]
fn quit_stops_before_later_lines() {
    let mux = FakeMux::new();
    let (summary, out) = run_chat(&mux, "first\n\n   \n/quit\nnever sent\n");

    assert_eq!(mux.sent(), vec!["first".to_string()]);
    assert_eq!(summary.delivered, 1);
    assert!(!summary.input_closed);
    assert!(out.starts_with("you> "));
    assert!(out.contains("\n----- full pane output -----\nagent ready\n> first\n"));
    assert!(out.contains("----- end output -----\n"));
}

#[test]
fn closed_input_ends_the_loop() {
    let mux = FakeMux::new();
    let (summary, out) = run_chat(&mux, "one\ntwo");

    assert_eq!(mux.sent(), vec!["one".to_string(), "two".to_string()]);
    assert_eq!(summary.delivered, 2);
    assert!(summary.input_closed);
    assert!(out.ends_with("you> \ninput closed\n"), "{out}");
}

#[test]
fn failed_message_is_reported_and_loop_continues() {
    let mux = FakeMux::with_responses([FakeResponse::Echo, FakeResponse::Silent]);
    let (summary, out) = run_chat(&mux, "hello\nwait\nnext\n/quit\n");

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.delivered, 2);
    assert!(out.contains("message failed: "), "{out}");
    assert!(out.contains("still working"), "{out}");
    assert!(out.contains("> next\n"));
}
