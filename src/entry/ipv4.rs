use crate::api::ElectionId;
use crate::entry::{empty_to_none, validate_network_instance, EntryError};
use crate::grpc;
use ipnetwork::Ipv4Network;

/// Ipv4Entry routes a prefix to a next hop group. The group may live in a different network
/// instance than the prefix.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Ipv4Entry {
    prefix: String,
    network_instance: Option<String>,
    election_id: Option<ElectionId>,
    next_hop_group: u64,
    next_hop_group_network_instance: Option<String>,
}

impl Ipv4Entry {
    pub fn new(prefix: impl Into<String>, next_hop_group: u64) -> Self {
        Ipv4Entry {
            prefix: prefix.into(),
            network_instance: None,
            election_id: None,
            next_hop_group,
            next_hop_group_network_instance: None,
        }
    }

    pub fn with_next_hop_group_network_instance(mut self, network_instance: impl Into<String>) -> Self {
        self.next_hop_group_network_instance = Some(network_instance.into());
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

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn network_instance(&self) -> Option<&str> {
        self.network_instance.as_deref()
    }

    pub fn election_id(&self) -> Option<ElectionId> {
        self.election_id
    }

    pub fn next_hop_group(&self) -> u64 {
        self.next_hop_group
    }

    /// Network instance the next hop group is looked up in. `None` means the prefix's own.
    pub fn next_hop_group_network_instance(&self) -> Option<&str> {
        self.next_hop_group_network_instance.as_deref()
    }

    pub(crate) fn validate(&self) -> Result<(), EntryError> {
        validate_prefix(&self.prefix)?;
        validate_network_instance(self.network_instance.as_deref())?;
        validate_network_instance(self.next_hop_group_network_instance.as_deref())?;
        if self.next_hop_group == 0 {
            return Err(EntryError::ZeroNextHopGroupId);
        }
        Ok(())
    }

    pub(crate) fn normalized(&self, network_instance: &str) -> Self {
        let next_hop_group_network_instance = self
            .next_hop_group_network_instance
            .clone()
            .filter(|nhg_ni| nhg_ni != network_instance);

        Ipv4Entry {
            network_instance: Some(network_instance.to_string()),
            election_id: None,
            next_hop_group_network_instance,
            ..self.clone()
        }
    }

    pub(crate) fn to_proto(&self) -> grpc::Ipv4Entry {
        grpc::Ipv4Entry {
            prefix: self.prefix.clone(),
            next_hop_group: self.next_hop_group,
            next_hop_group_network_instance: self.next_hop_group_network_instance.clone().unwrap_or_default(),
        }
    }

    pub(crate) fn from_proto(proto: grpc::Ipv4Entry) -> Self {
        Ipv4Entry {
            prefix: proto.prefix,
            network_instance: None,
            election_id: None,
            next_hop_group: proto.next_hop_group,
            next_hop_group_network_instance: empty_to_none(proto.next_hop_group_network_instance),
        }
    }
}

/// Prefixes must be written in CIDR form, e.g. "198.51.100.0/24". Host bits are not checked.
pub(crate) fn validate_prefix(prefix: &str) -> Result<(), EntryError> {
    if !prefix.contains('/') {
        return Err(EntryError::MalformedPrefix(prefix.to_string()));
    }
    prefix
        .parse::<Ipv4Network>()
        .map(|_| ())
        .map_err(|_| EntryError::MalformedPrefix(prefix.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_must_be_cidr() {
        assert_eq!(validate_prefix("198.51.100.0/24"), Ok(()));
        assert_eq!(validate_prefix("198.51.100.1/32"), Ok(()));
        assert_eq!(
            validate_prefix("198.51.100.0"),
            Err(EntryError::MalformedPrefix("198.51.100.0".into()))
        );
        assert_eq!(
            validate_prefix("198.51.100.0/33"),
            Err(EntryError::MalformedPrefix("198.51.100.0/33".into()))
        );
        assert_eq!(
            validate_prefix("2001:db8::/32"),
            Err(EntryError::MalformedPrefix("2001:db8::/32".into()))
        );
    }

    #[test]
    fn validate_ipv4_entry() {
        assert_eq!(Ipv4Entry::new("198.51.100.0/24", 42).validate(), Ok(()));
        assert_eq!(
            Ipv4Entry::new("198.51.100.0/24", 0).validate(),
            Err(EntryError::ZeroNextHopGroupId)
        );
        assert_eq!(
            Ipv4Entry::new("198.51.100.0/24", 42)
                .with_next_hop_group_network_instance("")
                .validate(),
            Err(EntryError::EmptyNetworkInstance)
        );
    }

    #[test]
    fn normalized_keeps_foreign_next_hop_group_network_instance() {
        let entry = Ipv4Entry::new("198.51.100.0/24", 42)
            .with_network_instance("VRF-A")
            .with_next_hop_group_network_instance("DEFAULT")
            .with_election_id(ElectionId::from_low(3));

        let normalized = entry.normalized("VRF-A");
        assert_eq!(normalized.next_hop_group_network_instance(), Some("DEFAULT"));
        assert_eq!(normalized.election_id(), None);

        let normalized = entry.normalized("DEFAULT");
        assert_eq!(normalized.next_hop_group_network_instance(), None);
    }
}
