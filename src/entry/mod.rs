//! Pure builders for the AFT entries a client programs. Nothing in here does I/O. Validation only
//! covers the local shape of an entry; whether referenced entries exist, or whether the client is
//! allowed to program at all, is for the device to decide.
mod batch;
mod ipv4;
mod next_hop;
mod next_hop_group;

pub use batch::Batch;
pub use ipv4::Ipv4Entry;
pub use next_hop::EncapsulationHeader;
pub use next_hop::NextHop;
pub use next_hop_group::NextHopGroup;

use crate::api::{ElectionId, EntryKey, OperationId, OperationType};
use crate::grpc;

#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    NextHop(NextHop),
    NextHopGroup(NextHopGroup),
    Ipv4(Ipv4Entry),
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum EntryError {
    #[error("Next hop index must be non-zero")]
    ZeroNextHopIndex,
    #[error("Next hop group id must be non-zero")]
    ZeroNextHopGroupId,
    #[error("Next hop group {id} has no next hops")]
    EmptyNextHopGroup { id: u64 },
    #[error("Next hop {index} in group {id} has zero weight")]
    ZeroWeight { id: u64, index: u64 },
    #[error("Next hop group {id} uses itself as backup")]
    SelfBackup { id: u64 },
    #[error("Malformed prefix '{0}'")]
    MalformedPrefix(String),
    #[error("Malformed IP address '{0}'")]
    MalformedIpAddress(String),
    #[error("Malformed MAC address '{0}'")]
    MalformedMacAddress(String),
    #[error("Next hop {0} both decapsulates and encapsulates")]
    ConflictingEncapsulation(u64),
    #[error("Network instance name must not be empty")]
    EmptyNetworkInstance,
    #[error("AFT message carries no entry")]
    MissingEntry,
}

/// Which AFT a `Get` reads.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AftType {
    All,
    Ipv4,
    NextHop,
    NextHopGroup,
}

impl Entry {
    /// The network instance the entry was explicitly placed in, if any.
    pub fn network_instance(&self) -> Option<&str> {
        match self {
            Entry::NextHop(nh) => nh.network_instance(),
            Entry::NextHopGroup(nhg) => nhg.network_instance(),
            Entry::Ipv4(ipv4) => ipv4.network_instance(),
        }
    }

    pub fn key(&self, default_network_instance: &str) -> EntryKey {
        let network_instance = self
            .network_instance()
            .unwrap_or(default_network_instance)
            .to_string();
        match self {
            Entry::NextHop(nh) => EntryKey::NextHop {
                network_instance,
                index: nh.index(),
            },
            Entry::NextHopGroup(nhg) => EntryKey::NextHopGroup {
                network_instance,
                id: nhg.id(),
            },
            Entry::Ipv4(ipv4) => EntryKey::Ipv4 {
                network_instance,
                prefix: ipv4.prefix().to_string(),
            },
        }
    }

    pub(crate) fn election_id(&self) -> Option<ElectionId> {
        match self {
            Entry::NextHop(nh) => nh.election_id(),
            Entry::NextHopGroup(nhg) => nhg.election_id(),
            Entry::Ipv4(ipv4) => ipv4.election_id(),
        }
    }

    /// Full shape validation, for ADD and REPLACE.
    pub(crate) fn validate(&self) -> Result<(), EntryError> {
        match self {
            Entry::NextHop(nh) => nh.validate(),
            Entry::NextHopGroup(nhg) => nhg.validate(),
            Entry::Ipv4(ipv4) => ipv4.validate(),
        }
    }

    /// DELETE only needs a well-formed natural key.
    pub(crate) fn validate_key(&self) -> Result<(), EntryError> {
        if let Some(ni) = self.network_instance() {
            if ni.is_empty() {
                return Err(EntryError::EmptyNetworkInstance);
            }
        }
        match self {
            Entry::NextHop(nh) if nh.index() == 0 => Err(EntryError::ZeroNextHopIndex),
            Entry::NextHopGroup(nhg) if nhg.id() == 0 => Err(EntryError::ZeroNextHopGroupId),
            Entry::Ipv4(ipv4) => ipv4::validate_prefix(ipv4.prefix()),
            _ => Ok(()),
        }
    }

    /// Returns a copy placed explicitly in `network_instance`, without the per-entry election id.
    /// Two entries that program the same thing compare equal once normalized.
    pub(crate) fn normalized(&self, network_instance: &str) -> Entry {
        match self {
            Entry::NextHop(nh) => Entry::NextHop(nh.normalized(network_instance)),
            Entry::NextHopGroup(nhg) => Entry::NextHopGroup(nhg.normalized(network_instance)),
            Entry::Ipv4(ipv4) => Entry::Ipv4(ipv4.normalized(network_instance)),
        }
    }

    pub(crate) fn to_operation(
        &self,
        id: OperationId,
        op_type: OperationType,
        default_network_instance: &str,
    ) -> grpc::AftOperation {
        let entry = match self {
            Entry::NextHop(nh) => grpc::aft_operation::Entry::NextHop(nh.to_proto()),
            Entry::NextHopGroup(nhg) => grpc::aft_operation::Entry::NextHopGroup(nhg.to_proto()),
            Entry::Ipv4(ipv4) => grpc::aft_operation::Entry::Ipv4(ipv4.to_proto()),
        };

        grpc::AftOperation {
            id: id.as_u64(),
            network_instance: self
                .network_instance()
                .unwrap_or(default_network_instance)
                .to_string(),
            op: grpc::aft_operation::Operation::from(op_type) as i32,
            election_id: self.election_id().map(grpc::Uint128::from),
            entry: Some(entry),
        }
    }

    /// Converts the entry of a received operation, placed in `network_instance`.
    pub(crate) fn from_operation_entry(entry: grpc::aft_operation::Entry, network_instance: &str) -> Entry {
        let entry = match entry {
            grpc::aft_operation::Entry::NextHop(nh) => Entry::NextHop(NextHop::from_proto(nh)),
            grpc::aft_operation::Entry::NextHopGroup(nhg) => Entry::NextHopGroup(NextHopGroup::from_proto(nhg)),
            grpc::aft_operation::Entry::Ipv4(ipv4) => Entry::Ipv4(Ipv4Entry::from_proto(ipv4)),
        };
        entry.normalized(network_instance)
    }

    pub(crate) fn to_aft_entry(
        &self,
        network_instance: &str,
        rib_programmed: bool,
        fib_programmed: bool,
    ) -> grpc::AftEntry {
        let entry = match self {
            Entry::NextHop(nh) => grpc::aft_entry::Entry::NextHop(nh.to_proto()),
            Entry::NextHopGroup(nhg) => grpc::aft_entry::Entry::NextHopGroup(nhg.to_proto()),
            Entry::Ipv4(ipv4) => grpc::aft_entry::Entry::Ipv4(ipv4.to_proto()),
        };

        grpc::AftEntry {
            network_instance: network_instance.to_string(),
            entry: Some(entry),
            rib_programmed,
            fib_programmed,
        }
    }

    /// Converts an entry read back from the device. Returns the entry's network instance too.
    pub(crate) fn from_aft_entry(aft_entry: grpc::AftEntry) -> Result<(String, Entry), EntryError> {
        let network_instance = aft_entry.network_instance;
        let entry = match aft_entry.entry {
            Some(grpc::aft_entry::Entry::NextHop(nh)) => Entry::NextHop(NextHop::from_proto(nh)),
            Some(grpc::aft_entry::Entry::NextHopGroup(nhg)) => Entry::NextHopGroup(NextHopGroup::from_proto(nhg)),
            Some(grpc::aft_entry::Entry::Ipv4(ipv4)) => Entry::Ipv4(Ipv4Entry::from_proto(ipv4)),
            None => return Err(EntryError::MissingEntry),
        };

        let entry = entry.normalized(&network_instance);
        Ok((network_instance, entry))
    }
}

impl From<NextHop> for Entry {
    fn from(nh: NextHop) -> Self {
        Entry::NextHop(nh)
    }
}

impl From<NextHopGroup> for Entry {
    fn from(nhg: NextHopGroup) -> Self {
        Entry::NextHopGroup(nhg)
    }
}

impl From<Ipv4Entry> for Entry {
    fn from(ipv4: Ipv4Entry) -> Self {
        Entry::Ipv4(ipv4)
    }
}

impl From<AftType> for grpc::AftType {
    fn from(aft: AftType) -> Self {
        match aft {
            AftType::All => grpc::AftType::All,
            AftType::Ipv4 => grpc::AftType::Ipv4,
            AftType::NextHop => grpc::AftType::Nexthop,
            AftType::NextHopGroup => grpc::AftType::NexthopGroup,
        }
    }
}

fn validate_network_instance(network_instance: Option<&str>) -> Result<(), EntryError> {
    match network_instance {
        Some("") => Err(EntryError::EmptyNetworkInstance),
        _ => Ok(()),
    }
}

pub(crate) fn empty_to_none(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_falls_back_to_default_network_instance() {
        let entry = Entry::from(NextHop::new(1));
        assert_eq!(
            entry.key("DEFAULT"),
            EntryKey::NextHop {
                network_instance: "DEFAULT".into(),
                index: 1
            }
        );

        let entry = Entry::from(Ipv4Entry::new("198.51.100.0/24", 42).with_network_instance("VRF-A"));
        assert_eq!(
            entry.key("DEFAULT"),
            EntryKey::Ipv4 {
                network_instance: "VRF-A".into(),
                prefix: "198.51.100.0/24".into()
            }
        );
    }

    #[test]
    fn operation_carries_election_override_and_network_instance() {
        let entry = Entry::from(
            NextHopGroup::new(42)
                .with_next_hop(1, 1)
                .with_election_id(ElectionId::from_low(12)),
        );
        let op = entry.to_operation(OperationId::new(7), OperationType::Replace, "DEFAULT");

        assert_eq!(op.id, 7);
        assert_eq!(op.network_instance, "DEFAULT");
        assert_eq!(op.op, grpc::aft_operation::Operation::Replace as i32);
        assert_eq!(op.election_id, Some(grpc::Uint128 { high: 0, low: 12 }));
        match op.entry {
            Some(grpc::aft_operation::Entry::NextHopGroup(nhg)) => {
                assert_eq!(nhg.id, 42);
                assert_eq!(nhg.next_hop.len(), 1);
            }
            other => panic!("Unexpected entry {:?}", other),
        }
    }

    #[test]
    fn delete_only_validates_key() {
        // A group with no next hops can't be added, but can be deleted by id.
        let entry = Entry::from(NextHopGroup::new(42));
        assert_eq!(entry.validate(), Err(EntryError::EmptyNextHopGroup { id: 42 }));
        assert_eq!(entry.validate_key(), Ok(()));

        assert_eq!(
            Entry::from(NextHopGroup::new(0)).validate_key(),
            Err(EntryError::ZeroNextHopGroupId)
        );
    }

    #[test]
    fn entry_read_back_is_normalized() {
        let aft_entry = grpc::AftEntry {
            network_instance: "DEFAULT".into(),
            entry: Some(grpc::aft_entry::Entry::Ipv4(grpc::Ipv4Entry {
                prefix: "198.51.100.0/24".into(),
                next_hop_group: 42,
                next_hop_group_network_instance: "DEFAULT".into(),
            })),
            rib_programmed: true,
            fib_programmed: true,
        };

        let (ni, entry) = Entry::from_aft_entry(aft_entry).unwrap();
        assert_eq!(ni, "DEFAULT");
        assert_eq!(
            entry,
            Entry::Ipv4(Ipv4Entry::new("198.51.100.0/24", 42).with_network_instance("DEFAULT"))
        );
    }
}
