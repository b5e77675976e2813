use crate::api::{
    AckType, AwaitError, ElectionId, OperationDetails, OperationId, OperationResult, ProgrammingResult,
};
use crate::entry::empty_to_none;
use crate::grpc;
use std::collections::{BTreeSet, HashMap, VecDeque};
use tokio::time::Instant;

/// What a waiter is waiting for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum WaitCondition {
    /// Every listed operation has a final result, and every election update numbered up to
    /// `control_through` has been echoed.
    Resolved {
        operations: BTreeSet<OperationId>,
        control_through: u64,
    },
    /// The server closed the Modify stream.
    Closed,
}

impl WaitCondition {
    pub fn operations(operations: impl IntoIterator<Item = OperationId>) -> Self {
        WaitCondition::Resolved {
            operations: operations.into_iter().collect(),
            control_through: 0,
        }
    }

    pub fn control(control_through: u64) -> Self {
        WaitCondition::Resolved {
            operations: BTreeSet::new(),
            control_through,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum StreamEnd {
    Clean,
    Error(String),
}

struct Submitted {
    details: OperationDetails,
    submitted_at: Instant,
}

/// ResultCorrelator matches results from the Modify stream to the operations and election updates
/// that were submitted. Matching is by operation id only, so results may arrive in any order.
/// Election echoes carry no id and are matched to updates first in, first out.
pub(crate) struct ResultCorrelator {
    logger: slog::Logger,
    done_level: AckType,
    submitted: HashMap<OperationId, Submitted>,
    outstanding: BTreeSet<OperationId>,
    last_control: u64,
    outstanding_control: VecDeque<u64>,
    results: Vec<OperationResult>,
    stream_end: Option<StreamEnd>,
}

impl ResultCorrelator {
    pub fn new(logger: slog::Logger, done_level: AckType) -> Self {
        ResultCorrelator {
            logger,
            done_level,
            submitted: HashMap::new(),
            outstanding: BTreeSet::new(),
            last_control: 0,
            outstanding_control: VecDeque::new(),
            results: Vec::new(),
            stream_end: None,
        }
    }

    pub fn register_operations(&mut self, operations: Vec<(OperationId, OperationDetails)>) {
        let submitted_at = Instant::now();
        for (id, details) in operations {
            self.outstanding.insert(id);
            self.submitted.insert(id, Submitted { details, submitted_at });
        }
    }

    /// Returns the sequence number of this election update.
    pub fn register_election_update(&mut self) -> u64 {
        self.last_control += 1;
        self.outstanding_control.push_back(self.last_control);
        self.last_control
    }

    pub fn on_session_parameters_ok(&mut self) {
        self.results.push(OperationResult::session_parameters_ok());
    }

    pub fn on_response(&mut self, response: grpc::ModifyResponse) {
        if response.session_params_result.is_some() {
            self.on_session_parameters_ok();
        }

        if let Some(election_id) = response.election_id {
            self.on_election_echo(ElectionId::from(election_id));
        }

        for aft_result in response.result {
            self.on_aft_result(aft_result);
        }
    }

    fn on_election_echo(&mut self, election_id: ElectionId) {
        if self.outstanding_control.pop_front().is_none() {
            slog::debug!(self.logger, "Unsolicited election id {}", election_id);
        }
        self.results.push(OperationResult::election_echo(election_id));
    }

    fn on_aft_result(&mut self, aft_result: grpc::AftResult) {
        let id = OperationId::new(aft_result.id);
        let programming_result = match grpc::aft_result::Status::from_i32(aft_result.status) {
            Some(status) => ProgrammingResult::from(status),
            None => {
                slog::warn!(self.logger, "Ignoring unknown status {} for {:?}", aft_result.status, id);
                return;
            }
        };

        let (details, latency) = match self.submitted.get(&id) {
            Some(submitted) => (Some(submitted.details.clone()), Some(submitted.submitted_at.elapsed())),
            None => {
                slog::warn!(self.logger, "Result for unknown operation {:?}", id);
                (None, None)
            }
        };

        if self.is_final(programming_result) && self.outstanding.remove(&id) && programming_result.is_failure() {
            slog::info!(self.logger, "{:?} failed: {:?}", id, details);
        }

        self.results.push(OperationResult {
            operation_id: Some(id),
            details,
            programming_result: Some(programming_result),
            current_server_election_id: None,
            session_parameters_ok: false,
            error_details: empty_to_none(aft_result.error_details),
            latency,
        });
    }

    fn is_final(&self, programming_result: ProgrammingResult) -> bool {
        match programming_result {
            ProgrammingResult::ProgrammingFailed => true,
            ProgrammingResult::InstalledInFib => true,
            ProgrammingResult::InstalledInRib => self.done_level == AckType::Rib,
            ProgrammingResult::Pending => false,
        }
    }

    pub fn on_stream_ended(&mut self, error: Option<String>) {
        if self.stream_end.is_some() {
            return;
        }
        match &error {
            None => slog::info!(
                self.logger,
                "Modify stream closed with {} operations outstanding",
                self.outstanding.len()
            ),
            Some(e) => slog::warn!(self.logger, "Modify stream failed: {}", e),
        }
        self.stream_end = Some(error.map(StreamEnd::Error).unwrap_or(StreamEnd::Clean));
    }

    /// The condition "everything submitted so far is resolved".
    pub fn outstanding_condition(&self) -> WaitCondition {
        WaitCondition::Resolved {
            operations: self.outstanding.clone(),
            control_through: self.last_control,
        }
    }

    /// Returns `None` while `condition` can still become true.
    pub fn check(&self, condition: &WaitCondition) -> Option<Result<Vec<OperationResult>, AwaitError>> {
        match condition {
            WaitCondition::Resolved {
                operations,
                control_through,
            } => {
                let pending_ops = operations.iter().filter(|id| self.outstanding.contains(*id)).count();
                let pending_control = self
                    .outstanding_control
                    .iter()
                    .filter(|seq| *seq <= control_through)
                    .count();

                if pending_ops == 0 && pending_control == 0 {
                    return Some(Ok(self.results.clone()));
                }
                match &self.stream_end {
                    None => None,
                    Some(StreamEnd::Clean) => Some(Err(AwaitError::StreamClosed {
                        outstanding: pending_ops + pending_control,
                    })),
                    Some(StreamEnd::Error(e)) => Some(Err(AwaitError::Transport(e.clone()))),
                }
            }
            WaitCondition::Closed => match &self.stream_end {
                None => None,
                Some(StreamEnd::Clean) => Some(Ok(self.results.clone())),
                Some(StreamEnd::Error(e)) => Some(Err(AwaitError::Transport(e.clone()))),
            },
        }
    }

    pub fn results(&self) -> Vec<OperationResult> {
        self.results.clone()
    }
}
