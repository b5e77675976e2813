use crate::api::types::ElectionId;
use tokio::sync::watch;

/// The election state of one client, as far as it has observed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ElectionStatus {
    /// The election id this client last sent.
    pub client_election_id: ElectionId,
    /// The highest election id the server last reported. `None` until the first echo.
    pub server_election_id: Option<ElectionId>,
    pub is_primary: bool,
}

/// ElectionEventListener observes changes to a client's `ElectionStatus`. Like any watch, it doesn't
/// queue intermediate states. If several changes happen between two calls to `next_event()`, only
/// the most recent one is returned.
#[derive(Clone)]
pub struct ElectionEventListener {
    rcv: watch::Receiver<ElectionStatus>,
}

impl ElectionEventListener {
    pub(crate) fn new(rcv: watch::Receiver<ElectionStatus>) -> Self {
        ElectionEventListener { rcv }
    }

    /// `next_event()` waits for the next change. Returns `None` once the session is gone.
    pub async fn next_event(&mut self) -> Option<ElectionStatus> {
        match self.rcv.changed().await {
            Ok(_) => Some(self.rcv.borrow().clone()),
            Err(_) => None,
        }
    }

    pub fn current(&self) -> ElectionStatus {
        self.rcv.borrow().clone()
    }
}
