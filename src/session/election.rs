use crate::api::{ElectionId, ElectionStatus};
use std::cmp;
use tokio::sync::watch;

pub(crate) fn new(
    logger: slog::Logger,
    initial_election_id: ElectionId,
) -> (ElectionCoordinator, watch::Receiver<ElectionStatus>) {
    let initial_status = ElectionStatus {
        client_election_id: initial_election_id,
        server_election_id: None,
        is_primary: false,
    };
    let (notifier, listener) = watch::channel(initial_status);

    let coordinator = ElectionCoordinator {
        logger,
        client_election_id: initial_election_id,
        server_election_id: None,
        claims_primary: true,
        is_primary: false,
        notifier,
    };

    (coordinator, listener)
}

/// ElectionCoordinator tracks the election id this client last sent and the one the server last
/// echoed. The server only echoes the highest id it knows, so an echo equal to ours is not enough:
/// the client is primary when the echo matches an id that either raised the highest id this client
/// had seen, or was re-sent while already primary. Sending an id that only ties the current
/// highest never makes this client primary, because the server keeps the existing holder.
pub(crate) struct ElectionCoordinator {
    logger: slog::Logger,
    client_election_id: ElectionId,
    server_election_id: Option<ElectionId>,
    // Whether the last id sent may win the election once echoed.
    claims_primary: bool,
    is_primary: bool,
    notifier: watch::Sender<ElectionStatus>,
}

impl ElectionCoordinator {
    pub fn record_sent(&mut self, election_id: ElectionId) {
        slog::info!(self.logger, "Sending election id {}", election_id);
        let raises = self.server_election_id.map_or(true, |server| election_id > server);
        let keeps = self.is_primary && election_id == self.client_election_id;
        self.claims_primary = raises || keeps;
        self.client_election_id = election_id;
        self.is_primary = keeps;
        self.publish();
    }

    pub fn record_echo(&mut self, election_id: ElectionId) {
        if self.server_election_id != Some(election_id) {
            slog::info!(self.logger, "Server reports election id {}", election_id);
        }
        self.server_election_id = Some(election_id);
        self.is_primary = self.claims_primary && election_id == self.client_election_id;
        if !self.is_primary && election_id == self.client_election_id {
            slog::info!(self.logger, "Election id {} is held by another client", election_id);
        }
        self.publish();
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    pub fn status(&self) -> ElectionStatus {
        ElectionStatus {
            client_election_id: self.client_election_id,
            server_election_id: self.server_election_id,
            is_primary: self.is_primary(),
        }
    }

    // Only notify listeners on a real change, so they don't wake for repeated echoes.
    fn publish(&self) {
        let status = self.status();
        if *self.notifier.borrow() != status {
            let _ = self.notifier.send(status);
        }
    }
}

/// Picks the election id to request when taking over: strictly above everything this client has
/// seen, including what it just learned from the server.
pub(crate) fn next_leader_candidate(learned: ElectionId, previous: &ElectionStatus) -> ElectionId {
    let highest = cmp::max(learned, previous.client_election_id);
    let highest = cmp::max(highest, previous.server_election_id.unwrap_or_default());
    highest.increment()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn primary_only_when_echo_matches() {
        let (mut coordinator, listener) = new(test_logger(), ElectionId::from_low(10));
        assert!(!coordinator.is_primary());

        coordinator.record_echo(ElectionId::from_low(10));
        assert!(coordinator.is_primary());
        assert!(listener.borrow().is_primary);

        // Another client took over.
        coordinator.record_echo(ElectionId::from_low(11));
        assert!(!coordinator.is_primary());
        assert_eq!(listener.borrow().server_election_id, Some(ElectionId::from_low(11)));

        coordinator.record_sent(ElectionId::from_low(12));
        coordinator.record_echo(ElectionId::from_low(12));
        assert!(coordinator.is_primary());
        assert_eq!(listener.borrow().client_election_id, ElectionId::from_low(12));
    }

    #[test]
    fn tying_the_current_primary_does_not_win() {
        let (mut coordinator, listener) = new(test_logger(), ElectionId::from_low(5));

        // Someone else already holds 10.
        coordinator.record_echo(ElectionId::from_low(10));
        assert!(!coordinator.is_primary());

        coordinator.record_sent(ElectionId::from_low(10));
        coordinator.record_echo(ElectionId::from_low(10));
        assert!(!coordinator.is_primary());
        assert!(!listener.borrow().is_primary);

        // Re-sending the tie doesn't help either.
        coordinator.record_sent(ElectionId::from_low(10));
        coordinator.record_echo(ElectionId::from_low(10));
        assert!(!coordinator.is_primary());

        coordinator.record_sent(ElectionId::from_low(11));
        coordinator.record_echo(ElectionId::from_low(11));
        assert!(coordinator.is_primary());
    }

    #[test]
    fn primary_keeps_its_role_when_resending_its_id() {
        let (mut coordinator, _listener) = new(test_logger(), ElectionId::from_low(7));
        coordinator.record_echo(ElectionId::from_low(7));
        assert!(coordinator.is_primary());

        coordinator.record_sent(ElectionId::from_low(7));
        coordinator.record_echo(ElectionId::from_low(7));
        assert!(coordinator.is_primary());
    }

    #[test]
    fn candidate_is_above_everything_seen() {
        let previous = ElectionStatus {
            client_election_id: ElectionId::from_low(4),
            server_election_id: Some(ElectionId::from_low(7)),
            is_primary: false,
        };
        assert_eq!(
            next_leader_candidate(ElectionId::from_low(5), &previous),
            ElectionId::from_low(8)
        );
        assert_eq!(
            next_leader_candidate(ElectionId::new(1, 0), &previous),
            ElectionId::new(1, 1)
        );

        let fresh = ElectionStatus {
            client_election_id: ElectionId::from_low(1),
            server_election_id: None,
            is_primary: false,
        };
        assert_eq!(
            next_leader_candidate(ElectionId::from_low(1), &fresh),
            ElectionId::from_low(2)
        );
    }
}
