use crate::api::types::{ElectionId, OperationId};
use crate::entry::Entry;
use crate::grpc;
use std::fmt;
use tokio::time::Duration;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperationType {
    Add,
    Replace,
    Delete,
}

/// EntryKey is the natural key of an AFT entry, always qualified by its network instance.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum EntryKey {
    NextHop { network_instance: String, index: u64 },
    NextHopGroup { network_instance: String, id: u64 },
    Ipv4 { network_instance: String, prefix: String },
}

impl EntryKey {
    pub fn network_instance(&self) -> &str {
        match self {
            EntryKey::NextHop { network_instance, .. } => network_instance,
            EntryKey::NextHopGroup { network_instance, .. } => network_instance,
            EntryKey::Ipv4 { network_instance, .. } => network_instance,
        }
    }
}

impl fmt::Debug for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKey::NextHop { network_instance, index } => write!(f, "NH({}/{})", network_instance, index),
            EntryKey::NextHopGroup { network_instance, id } => write!(f, "NHG({}/{})", network_instance, id),
            EntryKey::Ipv4 {
                network_instance,
                prefix,
            } => write!(f, "IPv4({}/{})", network_instance, prefix),
        }
    }
}

/// OperationDetails describes what an operation id was submitted for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationDetails {
    pub op_type: OperationType,
    pub key: EntryKey,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProgrammingResult {
    /// The device reported the operation without a final status yet.
    Pending,
    InstalledInRib,
    InstalledInFib,
    ProgrammingFailed,
}

impl ProgrammingResult {
    /// A failure is final. Nothing further is awaited for that operation.
    pub fn is_failure(&self) -> bool {
        *self == ProgrammingResult::ProgrammingFailed
    }
}

/// OperationResult is one observation from the Modify stream. A single operation usually produces
/// several of these (RIB then FIB installation). Election id echoes and the session parameters
/// acknowledgement are recorded as results too, with no operation id.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationResult {
    pub operation_id: Option<OperationId>,
    pub details: Option<OperationDetails>,
    pub programming_result: Option<ProgrammingResult>,
    pub current_server_election_id: Option<ElectionId>,
    pub session_parameters_ok: bool,
    pub error_details: Option<String>,
    /// Time between submitting the operation and observing this result.
    pub latency: Option<Duration>,
}

impl OperationResult {
    pub(crate) fn election_echo(election_id: ElectionId) -> Self {
        OperationResult {
            operation_id: None,
            details: None,
            programming_result: None,
            current_server_election_id: Some(election_id),
            session_parameters_ok: false,
            error_details: None,
            latency: None,
        }
    }

    pub(crate) fn session_parameters_ok() -> Self {
        OperationResult {
            operation_id: None,
            details: None,
            programming_result: None,
            current_server_election_id: None,
            session_parameters_ok: true,
            error_details: None,
            latency: None,
        }
    }
}

/// ProgrammedEntry is one entry read back from the device with `Get`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgrammedEntry {
    pub network_instance: String,
    pub entry: Entry,
    pub rib_programmed: bool,
    pub fib_programmed: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkInstanceSelector {
    Named(String),
    All,
}

// ------- Conversions --------

impl From<grpc::aft_result::Status> for ProgrammingResult {
    fn from(status: grpc::aft_result::Status) -> Self {
        match status {
            grpc::aft_result::Status::Unset => ProgrammingResult::Pending,
            grpc::aft_result::Status::RibProgrammed => ProgrammingResult::InstalledInRib,
            grpc::aft_result::Status::FibProgrammed => ProgrammingResult::InstalledInFib,
            grpc::aft_result::Status::Failed => ProgrammingResult::ProgrammingFailed,
            grpc::aft_result::Status::FibFailed => ProgrammingResult::ProgrammingFailed,
        }
    }
}

impl From<OperationType> for grpc::aft_operation::Operation {
    fn from(op_type: OperationType) -> Self {
        match op_type {
            OperationType::Add => grpc::aft_operation::Operation::Add,
            OperationType::Replace => grpc::aft_operation::Operation::Replace,
            OperationType::Delete => grpc::aft_operation::Operation::Delete,
        }
    }
}

impl From<NetworkInstanceSelector> for grpc::get_request::NetworkInstance {
    fn from(selector: NetworkInstanceSelector) -> Self {
        match selector {
            NetworkInstanceSelector::Named(name) => grpc::get_request::NetworkInstance::Name(name),
            NetworkInstanceSelector::All => grpc::get_request::NetworkInstance::All(grpc::Empty {}),
        }
    }
}
