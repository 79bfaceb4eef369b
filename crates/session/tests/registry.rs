//! Registry fan-out and bookkeeping across sessions in mixed states.

use pretty_assertions::assert_eq;
use session::test_support::{test_host, wait_for_event, FakeConnectionFactory};
use session::{
    CommandError, ConnectOutcome, NoopHostStore, SessionEventKind, SessionRegistry, SessionState,
};
use ssh::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

fn registry(factory: &Arc<FakeConnectionFactory>) -> SessionRegistry {
    SessionRegistry::new(
        factory.clone(),
        Arc::new(NoopHostStore),
        Arc::new(settings::Config::default()),
    )
}

#[test]
fn broadcast_tolerates_mixed_states() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let mut registry = registry(&factory);

    let healthy = factory.push_channel();
    let ok = registry.open(test_host("ok")).unwrap();
    let ok_id = ok.session();
    assert_eq!(ok.wait(), ConnectOutcome::Connected);

    factory.push_error(ErrorKind::ConnectionRefused, "Connection refused");
    let refused = registry.open(test_host("refused")).unwrap();
    let refused_id = refused.session();
    assert!(matches!(refused.wait(), ConnectOutcome::Failed(_)));

    let broken = factory.push_channel();
    let flaky = registry.open(test_host("flaky")).unwrap();
    let flaky_id = flaky.session();
    assert_eq!(flaky.wait(), ConnectOutcome::Connected);
    broken.fail_writes(true);

    let report = registry.broadcast("uptime");

    assert_eq!(report.delivered, vec![ok_id]);
    assert_eq!(report.skipped, vec![refused_id]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, flaky_id);
    assert!(matches!(report.failed[0].1, CommandError::Write(_)));
    assert!(!report.is_complete());
    assert_eq!(healthy.written(), b"uptime\n");
}

#[test]
fn connected_lists_only_live_sessions() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let mut registry = registry(&factory);

    let _a = factory.push_channel();
    let a = registry.open(test_host("a")).unwrap();
    let a_id = a.session();
    a.wait();
    factory.push_error(ErrorKind::HostResolutionFailure, "failed to resolve b");
    registry.open(test_host("b")).unwrap().wait();

    let connected: Vec<_> = registry.connected().iter().map(|s| s.id()).collect();
    assert_eq!(connected, vec![a_id]);
    assert_eq!(registry.len(), 2);
}

#[test]
fn failed_session_is_removed_when_event_applied() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let mut registry = registry(&factory);
    let events = registry.take_events().unwrap();
    assert!(registry.take_events().is_none());

    let _a = factory.push_channel();
    let a = registry.open(test_host("a")).unwrap();
    let a_id = a.session();
    a.wait();

    factory.push_error(ErrorKind::AuthenticationFailure, "auth failed");
    let b = registry.open(test_host("b")).unwrap();
    let b_id = b.session();
    b.wait();
    assert_eq!(registry.active_id(), Some(b_id));

    let seen = wait_for_event(&events, Duration::from_secs(5), |e| {
        e.session == b_id && matches!(e.kind, SessionEventKind::Failed(_))
    });
    let mut retired = Vec::new();
    for event in &seen {
        if let Some(session) = registry.apply(event) {
            retired.push(session.id());
        }
    }

    assert_eq!(retired, vec![b_id]);
    assert!(registry.get(b_id).is_none());
    assert_eq!(registry.active_id(), Some(a_id));
    assert_eq!(registry.get(a_id).unwrap().state(), SessionState::Connected);
}

#[test]
fn remote_exit_is_removed_when_event_applied() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let mut registry = registry(&factory);
    let events = registry.take_events().unwrap();

    let remote = factory.push_channel();
    let a = registry.open(test_host("a")).unwrap();
    let a_id = a.session();
    a.wait();
    remote.finish();

    let seen = wait_for_event(&events, Duration::from_secs(5), |e| {
        matches!(e.kind, SessionEventKind::State(SessionState::Closed))
    });
    let retired: Vec<_> = seen.iter().filter_map(|e| registry.apply(e)).collect();
    assert_eq!(retired.len(), 1);
    assert_eq!(retired[0].id(), a_id);
    assert!(registry.is_empty());
    assert_eq!(registry.active_id(), None);
}

#[test]
fn commands_go_to_active_session_only() {
    let factory = Arc::new(FakeConnectionFactory::new());
    let mut registry = registry(&factory);

    let first = factory.push_channel();
    let a = registry.open(test_host("a")).unwrap();
    let a_id = a.session();
    a.wait();
    let second = factory.push_channel();
    registry.open(test_host("b")).unwrap().wait();

    registry.active().unwrap().execute_command("whoami");
    registry.activate(a_id).unwrap();
    registry.active().unwrap().execute_command("hostname");

    assert_eq!(first.written(), b"hostname\n");
    assert_eq!(second.written(), b"whoami\n");
}
