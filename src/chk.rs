//! Assertions over `OperationResult`s.
use crate::api::{ElectionId, EntryKey, OperationId, OperationResult, OperationType, ProgrammingResult};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CheckOption {
    /// Match on content only. Use when the operation ids of a batch aren't known, or when the device
    /// may have coalesced acknowledgements.
    IgnoreOperationId,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum EntryMatch {
    NextHop(u64),
    NextHopGroup(u64),
    Ipv4(String),
}

/// ResultMatcher describes the result a test expects. Fields that aren't set match anything.
#[derive(Clone, Debug, Default)]
pub struct ResultMatcher {
    operation_id: Option<OperationId>,
    entry: Option<EntryMatch>,
    network_instance: Option<String>,
    op_type: Option<OperationType>,
    programming_result: Option<ProgrammingResult>,
    current_server_election_id: Option<ElectionId>,
    session_parameters_ok: bool,
}

impl ResultMatcher {
    pub fn new() -> Self {
        ResultMatcher::default()
    }

    pub fn with_operation_id(mut self, id: OperationId) -> Self {
        self.operation_id = Some(id);
        self
    }

    pub fn with_next_hop_operation(mut self, index: u64) -> Self {
        self.entry = Some(EntryMatch::NextHop(index));
        self
    }

    pub fn with_next_hop_group_operation(mut self, id: u64) -> Self {
        self.entry = Some(EntryMatch::NextHopGroup(id));
        self
    }

    pub fn with_ipv4_operation(mut self, prefix: impl Into<String>) -> Self {
        self.entry = Some(EntryMatch::Ipv4(prefix.into()));
        self
    }

    pub fn with_network_instance(mut self, network_instance: impl Into<String>) -> Self {
        self.network_instance = Some(network_instance.into());
        self
    }

    pub fn with_operation_type(mut self, op_type: OperationType) -> Self {
        self.op_type = Some(op_type);
        self
    }

    pub fn with_programming_result(mut self, programming_result: ProgrammingResult) -> Self {
        self.programming_result = Some(programming_result);
        self
    }

    pub fn with_current_server_election_id(mut self, election_id: ElectionId) -> Self {
        self.current_server_election_id = Some(election_id);
        self
    }

    pub fn with_session_parameters_ok(mut self) -> Self {
        self.session_parameters_ok = true;
        self
    }

    pub fn matches(&self, result: &OperationResult, options: &[CheckOption]) -> bool {
        let ignore_id = options.contains(&CheckOption::IgnoreOperationId);
        if !ignore_id && self.operation_id != result.operation_id {
            return false;
        }
        if self.programming_result.is_some() && self.programming_result != result.programming_result {
            return false;
        }
        if self.current_server_election_id.is_some()
            && self.current_server_election_id != result.current_server_election_id
        {
            return false;
        }
        if self.session_parameters_ok && !result.session_parameters_ok {
            return false;
        }

        let details = match (&result.details, self.needs_details()) {
            (_, false) => return true,
            (None, true) => return false,
            (Some(details), true) => details,
        };
        if let Some(op_type) = self.op_type {
            if details.op_type != op_type {
                return false;
            }
        }
        if let Some(network_instance) = &self.network_instance {
            if details.key.network_instance() != network_instance {
                return false;
            }
        }
        match (&self.entry, &details.key) {
            (None, _) => true,
            (Some(EntryMatch::NextHop(want)), EntryKey::NextHop { index, .. }) => want == index,
            (Some(EntryMatch::NextHopGroup(want)), EntryKey::NextHopGroup { id, .. }) => want == id,
            (Some(EntryMatch::Ipv4(want)), EntryKey::Ipv4 { prefix, .. }) => want == prefix,
            _ => false,
        }
    }

    fn needs_details(&self) -> bool {
        self.entry.is_some() || self.op_type.is_some() || self.network_instance.is_some()
    }
}

/// Returns true if any of `results` matches `matcher`. Without `IgnoreOperationId` the operation id
/// must match exactly, including "no id" for election echoes and the session parameters
/// acknowledgement.
pub fn has_result(results: &[OperationResult], matcher: &ResultMatcher, options: &[CheckOption]) -> bool {
    results.iter().any(|r| matcher.matches(r, options))
}
