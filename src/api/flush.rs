use crate::api::types::ElectionId;
use crate::grpc;

/// Which network instances a flush removes entries from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FlushTarget {
    NetworkInstance(String),
    AllNetworkInstances,
}

/// The authority a flush is issued with. The device only honours a flush whose election id is at
/// least the current primary's, unless the election is explicitly overridden.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FlushAuthority {
    ElectionId(ElectionId),
    /// Use the election id this client last sent on its Modify stream.
    CurrentElectionId,
    /// Bypass the election check. Used for test cleanup.
    Override,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FlushOutcome {
    /// Every targeted entry was removed.
    Ok,
    /// Some entries are still referenced from another network instance and were kept.
    NonZeroReferenceRemain,
}

// ------- Conversions --------

impl From<FlushTarget> for grpc::flush_request::NetworkInstance {
    fn from(target: FlushTarget) -> Self {
        match target {
            FlushTarget::NetworkInstance(name) => grpc::flush_request::NetworkInstance::Name(name),
            FlushTarget::AllNetworkInstances => grpc::flush_request::NetworkInstance::All(grpc::Empty {}),
        }
    }
}
