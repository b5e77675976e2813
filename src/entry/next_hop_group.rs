use crate::api::ElectionId;
use crate::entry::{validate_network_instance, EntryError};
use crate::grpc;
use std::collections::BTreeMap;

/// NextHopGroup is a weighted set of next hop indices, with an optional backup group that the
/// device switches to when every primary next hop is unusable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NextHopGroup {
    id: u64,
    network_instance: Option<String>,
    election_id: Option<ElectionId>,
    // index -> weight
    next_hops: BTreeMap<u64, u64>,
    backup_next_hop_group: Option<u64>,
}

impl NextHopGroup {
    pub fn new(id: u64) -> Self {
        NextHopGroup {
            id,
            network_instance: None,
            election_id: None,
            next_hops: BTreeMap::new(),
            backup_next_hop_group: None,
        }
    }

    /// Adds next hop `index` with `weight`. Adding the same index twice keeps the last weight.
    pub fn with_next_hop(mut self, index: u64, weight: u64) -> Self {
        self.next_hops.insert(index, weight);
        self
    }

    pub fn with_backup_next_hop_group(mut self, id: u64) -> Self {
        self.backup_next_hop_group = Some(id);
        self
    }

    pub fn with_network_instance(mut self, network_instance: impl Into<String>) -> Self {
        self.network_instance = Some(network_instance.into());
        self
    }

    pub fn with_election_id(mut self, election_id: ElectionId) -> Self {
        self.election_id = Some(election_id);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn network_instance(&self) -> Option<&str> {
        self.network_instance.as_deref()
    }

    pub fn election_id(&self) -> Option<ElectionId> {
        self.election_id
    }

    /// Member next hops as `(index, weight)`, ordered by index.
    pub fn next_hops(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.next_hops.iter().map(|(index, weight)| (*index, *weight))
    }

    pub fn backup_next_hop_group(&self) -> Option<u64> {
        self.backup_next_hop_group
    }

    pub(crate) fn validate(&self) -> Result<(), EntryError> {
        if self.id == 0 {
            return Err(EntryError::ZeroNextHopGroupId);
        }
        validate_network_instance(self.network_instance.as_deref())?;
        if self.next_hops.is_empty() {
            return Err(EntryError::EmptyNextHopGroup { id: self.id });
        }
        for (index, weight) in self.next_hops() {
            if index == 0 {
                return Err(EntryError::ZeroNextHopIndex);
            }
            if weight == 0 {
                return Err(EntryError::ZeroWeight { id: self.id, index });
            }
        }
        match self.backup_next_hop_group {
            Some(0) => Err(EntryError::ZeroNextHopGroupId),
            Some(backup) if backup == self.id => Err(EntryError::SelfBackup { id: self.id }),
            _ => Ok(()),
        }
    }

    pub(crate) fn normalized(&self, network_instance: &str) -> Self {
        NextHopGroup {
            network_instance: Some(network_instance.to_string()),
            election_id: None,
            ..self.clone()
        }
    }

    pub(crate) fn to_proto(&self) -> grpc::NextHopGroup {
        grpc::NextHopGroup {
            id: self.id,
            next_hop: self
                .next_hops()
                .map(|(index, weight)| grpc::NextHopWeight { index, weight })
                .collect(),
            backup_next_hop_group: self.backup_next_hop_group.unwrap_or(0),
        }
    }

    pub(crate) fn from_proto(proto: grpc::NextHopGroup) -> Self {
        NextHopGroup {
            id: proto.id,
            network_instance: None,
            election_id: None,
            next_hops: proto.next_hop.into_iter().map(|nh| (nh.index, nh.weight)).collect(),
            backup_next_hop_group: match proto.backup_next_hop_group {
                0 => None,
                backup => Some(backup),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_weight_wins() {
        let nhg = NextHopGroup::new(42).with_next_hop(1, 1).with_next_hop(2, 3).with_next_hop(1, 7);
        assert_eq!(nhg.next_hops().collect::<Vec<_>>(), vec![(1, 7), (2, 3)]);
    }

    #[test]
    fn validate_next_hop_group() {
        assert_eq!(NextHopGroup::new(42).with_next_hop(1, 1).validate(), Ok(()));
        assert_eq!(
            NextHopGroup::new(0).with_next_hop(1, 1).validate(),
            Err(EntryError::ZeroNextHopGroupId)
        );
        assert_eq!(
            NextHopGroup::new(42).validate(),
            Err(EntryError::EmptyNextHopGroup { id: 42 })
        );
        assert_eq!(
            NextHopGroup::new(42).with_next_hop(3, 0).validate(),
            Err(EntryError::ZeroWeight { id: 42, index: 3 })
        );
        assert_eq!(
            NextHopGroup::new(42)
                .with_next_hop(1, 1)
                .with_backup_next_hop_group(42)
                .validate(),
            Err(EntryError::SelfBackup { id: 42 })
        );
    }

    #[test]
    fn backup_group_zero_means_none_on_the_wire() {
        let nhg = NextHopGroup::new(42).with_next_hop(1, 1);
        let proto = nhg.to_proto();
        assert_eq!(proto.backup_next_hop_group, 0);
        assert_eq!(NextHopGroup::from_proto(proto).backup_next_hop_group(), None);

        let nhg = nhg.with_backup_next_hop_group(101);
        assert_eq!(
            NextHopGroup::from_proto(nhg.to_proto()).backup_next_hop_group(),
            Some(101)
        );
    }
}
