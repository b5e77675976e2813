use crate::api::ElectionId;

pub(super) type SessionId = u64;

/// ElectionArbiter tracks which session is primary. The highest election id ever seen never goes
/// down, even after the session that presented it goes away.
#[derive(Default)]
pub(super) struct ElectionArbiter {
    highest: Option<ElectionId>,
    primary: Option<SessionId>,
}

impl ElectionArbiter {
    pub fn highest(&self) -> Option<ElectionId> {
        self.highest
    }

    /// Records an election id presented by `session`. Returns the id to echo back, the highest
    /// known after the update.
    pub fn update(&mut self, session: SessionId, election_id: ElectionId) -> ElectionId {
        match self.highest {
            Some(highest) if election_id < highest => highest,
            Some(highest) if election_id == highest => {
                // A primary that reconnects with the same id takes over again, but nobody can
                // steal it by tying while the primary is still connected.
                if self.primary.is_none() {
                    self.primary = Some(session);
                }
                highest
            }
            _ => {
                self.highest = Some(election_id);
                self.primary = Some(session);
                election_id
            }
        }
    }

    /// Whether an AFT operation from `session` may be applied. A per-operation election id must
    /// equal the highest one.
    pub fn may_program(&self, session: SessionId, op_election_id: Option<ElectionId>) -> bool {
        if self.primary != Some(session) {
            return false;
        }
        match op_election_id {
            Some(id) => Some(id) == self.highest,
            None => true,
        }
    }

    pub fn may_flush(&self, election_id: ElectionId) -> bool {
        match self.highest {
            Some(highest) => election_id >= highest,
            None => true,
        }
    }

    pub fn remove_session(&mut self, session: SessionId) {
        if self.primary == Some(session) {
            self.primary = None;
        }
    }
}
