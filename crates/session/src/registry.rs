//! Session registry: the tab host.
//!
//! Sessions are kept in insertion order, which is also tab order. One of
//! them is active for interactive input. The registry only goes through
//! the public controller API; it never touches a bridge or channel.

use crate::controller::{ConnectAttempt, SessionController, SessionDeps};
use crate::error::{CommandError, SessionError};
use crate::event::{event_queue, SessionEvent, SessionEventKind, SessionId};
use crate::state::SessionState;
use crate::store::HostStore;
use collections::{CyclicKeys, IndexMap};
use ssh::{ConnectionFactory, HostDescriptor};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Per-session result of a broadcast.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Sessions that accepted the command.
    pub delivered: Vec<SessionId>,
    /// Sessions that were not connected and were skipped.
    pub skipped: Vec<SessionId>,
    /// Connected sessions whose write failed.
    pub failed: Vec<(SessionId, CommandError)>,
}

impl BroadcastReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct SessionRegistry {
    deps: SessionDeps,
    events: Option<Receiver<SessionEvent>>,
    sessions: IndexMap<SessionId, SessionController>,
    active: Option<SessionId>,
}

impl SessionRegistry {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        store: Arc<dyn HostStore>,
        config: Arc<settings::Config>,
    ) -> Self {
        let (events, rx) = event_queue();
        Self {
            deps: SessionDeps {
                factory,
                store,
                config,
                events,
            },
            events: Some(rx),
            sessions: IndexMap::default(),
            active: None,
        }
    }

    /// The receiving end of the event queue. Can be taken once; the taker
    /// should feed each event back through [`Self::apply`].
    pub fn take_events(&mut self) -> Option<Receiver<SessionEvent>> {
        self.events.take()
    }

    /// Open a new session to `host` and make it active.
    pub fn open(&mut self, host: HostDescriptor) -> Result<ConnectAttempt, SessionError> {
        let session = SessionController::new(self.deps.clone());
        let id = session.id();
        let attempt = session.connect(host)?;
        self.sessions.insert(id, session);
        self.active = Some(id);
        tracing::debug!(session = %id, total = self.sessions.len(), "Session opened");
        Ok(attempt)
    }

    /// Replace a session with a fresh one for the same host.
    pub fn reconnect(&mut self, id: SessionId) -> Result<ConnectAttempt, SessionError> {
        let host = self
            .sessions
            .get(&id)
            .and_then(SessionController::host)
            .ok_or(SessionError::NotFound(id))?;
        let previous_active = self.active.filter(|active| *active != id);
        let index = self.sessions.get_index_of(&id);

        self.close(id);
        let attempt = self.open(host)?;

        // Keep the replacement in the old tab position.
        if let Some(index) = index {
            let last = self.sessions.len() - 1;
            self.sessions.move_index(last, index.min(last));
        }
        if let Some(active) = previous_active {
            self.active = Some(active);
        }
        Ok(attempt)
    }

    pub fn get(&self, id: SessionId) -> Option<&SessionController> {
        self.sessions.get(&id)
    }

    pub fn active(&self) -> Option<&SessionController> {
        self.active.and_then(|id| self.sessions.get(&id))
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active
    }

    pub fn activate(&mut self, id: SessionId) -> Result<(), SessionError> {
        if !self.sessions.contains_key(&id) {
            return Err(SessionError::NotFound(id));
        }
        self.active = Some(id);
        Ok(())
    }

    /// Activate the next tab, wrapping around.
    pub fn activate_next(&mut self) -> Option<SessionId> {
        let next = match self.active {
            Some(id) => self.sessions.key_after(&id).copied(),
            None => self.sessions.keys().next().copied(),
        };
        self.active = next;
        next
    }

    /// Activate the previous tab, wrapping around.
    pub fn activate_previous(&mut self) -> Option<SessionId> {
        let prev = match self.active {
            Some(id) => self.sessions.key_before(&id).copied(),
            None => self.sessions.keys().last().copied(),
        };
        self.active = prev;
        prev
    }

    /// All sessions in tab order.
    pub fn sessions(&self) -> impl Iterator<Item = &SessionController> {
        self.sessions.values()
    }

    /// Position of `id` in tab order.
    pub fn position(&self, id: SessionId) -> Option<usize> {
        self.sessions.get_index_of(&id)
    }

    /// Session at a tab position.
    pub fn at(&self, index: usize) -> Option<&SessionController> {
        self.sessions.get_index(index).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions currently connected, in tab order.
    pub fn connected(&self) -> Vec<SessionController> {
        self.sessions
            .values()
            .filter(|session| session.state() == SessionState::Connected)
            .cloned()
            .collect()
    }

    /// Run `command` on every connected session. Each session is attempted
    /// independently; one failure never stops the rest.
    pub fn broadcast(&self, command: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for session in self.sessions.values() {
            if session.state() != SessionState::Connected {
                report.skipped.push(session.id());
                continue;
            }
            match session.try_execute_command(command) {
                Ok(()) => report.delivered.push(session.id()),
                Err(e) => {
                    tracing::warn!(session = %session.id(), "Broadcast not delivered: {}", e);
                    report.failed.push((session.id(), e));
                }
            }
        }
        tracing::info!(
            delivered = report.delivered.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Broadcast finished"
        );
        report
    }

    /// Update bookkeeping for an event. A session that reached a terminal
    /// state is removed and returned.
    pub fn apply(&mut self, event: &SessionEvent) -> Option<SessionController> {
        let finished = match &event.kind {
            SessionEventKind::State(state) => state.is_terminal(),
            SessionEventKind::Failed(_) => true,
            _ => false,
        };
        if !finished {
            return None;
        }
        // The controller's own state is authoritative over event order.
        let terminal = self
            .sessions
            .get(&event.session)
            .is_some_and(|session| session.state().is_terminal());
        if terminal {
            self.remove(event.session)
        } else {
            None
        }
    }

    /// Disconnect and remove a session.
    pub fn close(&mut self, id: SessionId) -> Option<SessionController> {
        let session = self.remove(id)?;
        session.disconnect();
        Some(session)
    }

    pub fn disconnect_all(&mut self) {
        for (_, session) in self.sessions.drain(..) {
            session.disconnect();
        }
        self.active = None;
    }

    fn remove(&mut self, id: SessionId) -> Option<SessionController> {
        let next = self.sessions.key_after(&id).copied().filter(|next| *next != id);
        let session = self.sessions.shift_remove(&id)?;
        if self.active == Some(id) {
            self.active = next;
        }
        tracing::debug!(session = %id, remaining = self.sessions.len(), "Session removed");
        Some(session)
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NoopHostStore;
    use crate::test_support::{test_host, FakeConnectionFactory};
    use pretty_assertions::assert_eq;

    fn registry(factory: Arc<FakeConnectionFactory>) -> SessionRegistry {
        SessionRegistry::new(
            factory,
            Arc::new(NoopHostStore),
            Arc::new(settings::Config::default()),
        )
    }

    fn open_connected(registry: &mut SessionRegistry, factory: &FakeConnectionFactory, name: &str) -> SessionId {
        let _remote = factory.push_channel();
        let attempt = registry.open(test_host(name)).unwrap();
        let id = attempt.session();
        attempt.wait();
        id
    }

    #[test]
    fn newest_session_becomes_active() {
        let factory = Arc::new(FakeConnectionFactory::new());
        let mut registry = registry(factory.clone());
        let a = open_connected(&mut registry, &factory, "a");
        let b = open_connected(&mut registry, &factory, "b");
        assert_eq!(registry.active_id(), Some(b));
        registry.activate(a).unwrap();
        assert_eq!(registry.active_id(), Some(a));
    }

    #[test]
    fn activate_unknown_is_not_found() {
        let mut registry = registry(Arc::new(FakeConnectionFactory::new()));
        assert!(matches!(
            registry.activate(SessionId::new()),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn activate_next_and_previous_wrap() {
        let factory = Arc::new(FakeConnectionFactory::new());
        let mut registry = registry(factory.clone());
        let a = open_connected(&mut registry, &factory, "a");
        let b = open_connected(&mut registry, &factory, "b");
        let c = open_connected(&mut registry, &factory, "c");

        assert_eq!(registry.activate_next(), Some(a));
        assert_eq!(registry.activate_next(), Some(b));
        assert_eq!(registry.activate_previous(), Some(a));
        assert_eq!(registry.activate_previous(), Some(c));
    }

    #[test]
    fn closing_active_moves_to_next_tab() {
        let factory = Arc::new(FakeConnectionFactory::new());
        let mut registry = registry(factory.clone());
        let a = open_connected(&mut registry, &factory, "a");
        let b = open_connected(&mut registry, &factory, "b");
        let c = open_connected(&mut registry, &factory, "c");

        registry.activate(b).unwrap();
        let closed = registry.close(b).unwrap();
        assert_eq!(closed.state(), SessionState::Closed);
        assert_eq!(registry.active_id(), Some(c));

        registry.close(c);
        assert_eq!(registry.active_id(), Some(a));
        registry.close(a);
        assert_eq!(registry.active_id(), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn reconnect_gets_new_id_in_same_position() {
        let factory = Arc::new(FakeConnectionFactory::new());
        let mut registry = registry(factory.clone());
        let a = open_connected(&mut registry, &factory, "a");
        let b = open_connected(&mut registry, &factory, "b");
        registry.activate(a).unwrap();

        let _remote = factory.push_channel();
        let attempt = registry.reconnect(a).unwrap();
        let a2 = attempt.session();
        attempt.wait();

        assert_ne!(a, a2);
        assert!(registry.get(a).is_none());
        assert_eq!(registry.position(a2), Some(0));
        assert_eq!(registry.position(b), Some(1));
        assert_eq!(registry.active_id(), Some(a2));
        assert_eq!(registry.get(a2).unwrap().host().unwrap().hostname, "a");
    }

    #[test]
    fn reconnect_unknown_session_fails() {
        let mut registry = registry(Arc::new(FakeConnectionFactory::new()));
        assert!(registry.reconnect(SessionId::new()).is_err());
    }

    #[test]
    fn disconnect_all_closes_everything() {
        let factory = Arc::new(FakeConnectionFactory::new());
        let mut registry = registry(factory.clone());
        let a = open_connected(&mut registry, &factory, "a");
        let session = registry.get(a).unwrap().clone();
        registry.disconnect_all();
        assert!(registry.is_empty());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.is_connected());
    }
}
