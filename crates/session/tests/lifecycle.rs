//! Session lifecycle against a scripted transport.

use pretty_assertions::assert_eq;
use session::test_support::{
    eventually, test_deps, test_host, wait_for_event, wait_for_state, FakeConnectionFactory,
};
use session::{
    ConnectOutcome, MockHostStore, SessionController, SessionEvent, SessionEventKind, SessionState,
};
use ssh::ErrorKind;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn connected_session(
    factory: &Arc<FakeConnectionFactory>,
) -> (
    SessionController,
    Arc<terminal::test_support::FakeChannel>,
    std::sync::mpsc::Receiver<SessionEvent>,
) {
    let remote = factory.push_channel();
    let (deps, rx) = test_deps(factory.clone(), None);
    let session = SessionController::new(deps);
    let outcome = session.connect(test_host("web-1")).unwrap().wait();
    assert_eq!(outcome, ConnectOutcome::Connected);
    (session, remote, rx)
}

fn failed_events(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e.kind, SessionEventKind::Failed(_)))
        .count()
}

#[test]
fn disconnect_is_idempotent() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let (session, remote, rx) = connected_session(&factory);
    assert!(session.is_connected());

    session.disconnect();
    assert!(!session.is_connected());
    assert_eq!(session.state(), SessionState::Closed);

    session.disconnect();
    assert!(!session.is_connected());
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(remote.close_count(), 1);

    // The reader saw its read fail and stayed quiet about it.
    thread::sleep(Duration::from_millis(50));
    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(failed_events(&events), 0);
    let closed = events
        .iter()
        .filter(|e| matches!(e.kind, SessionEventKind::State(SessionState::Closed)))
        .count();
    assert_eq!(closed, 1);
}

#[test]
fn auth_failure_reports_exactly_once_and_never_connects() {
    let factory = Arc::new(FakeConnectionFactory::new());
    factory.push_error(ErrorKind::AuthenticationFailure, "authentication rejected");
    let (deps, rx) = test_deps(factory.clone(), None);
    let session = SessionController::new(deps);

    let outcome = session.connect(test_host("web-1")).unwrap().wait();
    let error = match outcome {
        ConnectOutcome::Failed(error) => error,
        other => panic!("expected failure, got {other:?}"),
    };
    assert_eq!(error.kind, ErrorKind::AuthenticationFailure);
    assert_eq!(session.state(), SessionState::Failed);

    session.disconnect();
    thread::sleep(Duration::from_millis(50));
    // No retry after a failed attempt.
    assert_eq!(factory.open_count(), 1);

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(failed_events(&events), 1);
    assert!(!events
        .iter()
        .any(|e| matches!(e.kind, SessionEventKind::State(SessionState::Connected))));
    assert!(events.iter().any(|e| matches!(
        &e.kind,
        SessionEventKind::Status(text) if text.starts_with("Authentication failed")
    )));
}

#[test]
fn execute_command_writes_line() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let (session, remote, _rx) = connected_session(&factory);

    session.execute_command("ls");
    assert_eq!(remote.written(), b"ls\n");
}

#[test]
fn resize_forwards_exact_values() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let (session, remote, _rx) = connected_session(&factory);

    session.resize(200, 50, 1600, 800);
    assert_eq!(remote.resizes(), vec![terminal::TermSize::new(200, 50, 1600, 800)]);
}

#[test]
fn resize_without_connection_is_noop() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let (deps, _rx) = test_deps(factory, None);
    let session = SessionController::new(deps);
    session.resize(200, 50, 1600, 800);
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn concurrent_writers_never_interleave() {
    const WRITERS: usize = 16;
    let factory = Arc::new(FakeConnectionFactory::new());
    let (session, remote, _rx) = connected_session(&factory);

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let session = session.clone();
            thread::spawn(move || {
                let byte = b'A' + i as u8;
                if i % 2 == 0 {
                    // Command injection: 99 bytes plus the newline.
                    let text = String::from_utf8(vec![byte; 99]).unwrap();
                    session.try_execute_command(&text).unwrap();
                } else {
                    session.write(&[byte; 100]).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let written = remote.written();
    assert_eq!(written.len(), WRITERS * 100);
    for chunk in written.chunks(100) {
        let byte = chunk[0];
        assert!(chunk[..99].iter().all(|b| *b == byte), "interleaved chunk {chunk:?}");
        assert!(chunk[99] == byte || chunk[99] == b'\n');
    }
}

#[test]
fn output_arrives_in_order() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let (session, remote, rx) = connected_session(&factory);

    for i in 0..50 {
        remote.feed(format!("line {i}\n").as_bytes());
    }
    remote.feed(b"END");

    let events = wait_for_event(&rx, Duration::from_secs(5), |e| {
        matches!(&e.kind, SessionEventKind::Output(text) if text.ends_with("END"))
    });
    let output: String = events
        .iter()
        .filter_map(|e| match &e.kind {
            SessionEventKind::Output(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    let expected: String = (0..50).map(|i| format!("line {i}\n")).collect::<String>() + "END";
    assert_eq!(output, expected);
    session.disconnect();
}

#[test]
fn remote_exit_closes_session() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let (session, remote, rx) = connected_session(&factory);

    remote.finish();
    let events = wait_for_state(&rx, session.id(), SessionState::Closed);
    assert_eq!(failed_events(&events), 0);
    assert!(!session.is_connected());
}

#[test]
fn transport_loss_fails_session_once() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let (session, remote, rx) = connected_session(&factory);

    remote.break_connection();
    let events = wait_for_event(&rx, Duration::from_secs(5), |e| {
        matches!(e.kind, SessionEventKind::Failed(_))
    });
    match &events.last().unwrap().kind {
        SessionEventKind::Failed(error) => {
            assert_eq!(error.kind, ErrorKind::TransportClosedUnexpectedly)
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Failed);

    session.disconnect();
    assert_eq!(session.state(), SessionState::Failed);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(failed_events(&rx.try_iter().collect::<Vec<_>>()), 0);
}

#[test]
fn write_failure_is_reported_not_fatal() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let (session, remote, _rx) = connected_session(&factory);

    remote.fail_writes(true);
    assert!(session.write(b"x").is_err());
    session.execute_command("still fine");
    assert_eq!(session.state(), SessionState::Connected);

    remote.fail_writes(false);
    session.execute_command("pwd");
    assert_eq!(remote.written(), b"pwd\n");
}

#[test]
fn disconnect_while_connecting_never_connects() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let remote = factory.push_delayed_channel(Duration::from_millis(100));
    let (deps, rx) = test_deps(factory.clone(), None);
    let session = SessionController::new(deps);

    let attempt = session.connect(test_host("web-1")).unwrap();
    assert_eq!(session.state(), SessionState::Connecting);
    session.disconnect();

    assert_eq!(attempt.wait(), ConnectOutcome::Cancelled);
    assert_eq!(session.state(), SessionState::Closed);
    eventually(|| remote.is_closed());
    let events: Vec<_> = rx.try_iter().collect();
    assert!(!events
        .iter()
        .any(|e| matches!(e.kind, SessionEventKind::State(SessionState::Connected))));
    assert_eq!(failed_events(&events), 0);
}

#[test]
fn connect_uses_configured_timeout() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let (_session, _remote, _rx) = connected_session(&factory);
    assert_eq!(factory.timeouts(), vec![Duration::from_millis(30_000)]);
}

#[test]
fn last_connected_is_recorded_once() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let _remote = factory.push_channel();
    let mut store = MockHostStore::new();
    store
        .expect_record_last_connected()
        .withf(|host_id, _| host_id.to_string() == "web-1")
        .times(1)
        .returning(|_, _| Ok(()));
    let (deps, _rx) = test_deps(factory.clone(), Some(Arc::new(store)));

    let session = SessionController::new(deps);
    assert_eq!(
        session.connect(test_host("web-1")).unwrap().wait(),
        ConnectOutcome::Connected
    );
    session.disconnect();
}

#[test]
fn store_failure_does_not_block_connect() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let _remote = factory.push_channel();
    let mut store = MockHostStore::new();
    store
        .expect_record_last_connected()
        .returning(|_, _| Err(anyhow::anyhow!("hosts file is read-only")));
    let (deps, _rx) = test_deps(factory.clone(), Some(Arc::new(store)));

    let session = SessionController::new(deps);
    let outcome = session.connect(test_host("web-1")).unwrap().wait();
    assert_eq!(outcome, ConnectOutcome::Connected);
}

#[test]
fn startup_command_follows_first_output_once() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let remote = factory.push_channel();
    let (deps, _rx) = test_deps(factory.clone(), None);
    let session = SessionController::new(deps);

    let host = test_host("web-1").with_startup_command("cd /srv/app");
    session.connect(host).unwrap().wait();
    assert!(remote.written().is_empty());

    remote.feed(b"Welcome\r\n$ ");
    eventually(|| remote.written_text() == "cd /srv/app\n");

    remote.feed(b"more output\r\n$ ");
    // Fallback timer fires later and must not send it again.
    thread::sleep(Duration::from_millis(1200));
    assert_eq!(remote.written_text(), "cd /srv/app\n");
}

#[test]
fn startup_command_falls_back_to_delay() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let remote = factory.push_channel();
    let (deps, _rx) = test_deps(factory.clone(), None);
    let session = SessionController::new(deps);

    session
        .connect(test_host("web-1").with_startup_command("tmux attach"))
        .unwrap()
        .wait();

    // Silent shell: nothing until the configured delay passes.
    thread::sleep(Duration::from_millis(200));
    assert!(remote.written().is_empty());
    eventually(|| remote.written_text() == "tmux attach\n");
}
