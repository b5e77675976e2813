use crate::api::ElectionId;
use crate::entry::{empty_to_none, validate_network_instance, EntryError};
use crate::grpc;
use std::net::IpAddr;

/// Header a next hop removes from (or pushes onto) matching packets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EncapsulationHeader {
    Gre,
    Ipv4,
    Ipv6,
    Mpls,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct InterfaceRef {
    interface: String,
    subinterface: Option<u32>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct IpInIp {
    src_ip: String,
    dst_ip: String,
}

/// NextHop is identified by its index within a network instance. Groups reference it by index,
/// they never own it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NextHop {
    index: u64,
    network_instance: Option<String>,
    election_id: Option<ElectionId>,
    ip_address: Option<String>,
    interface_ref: Option<InterfaceRef>,
    mac_address: Option<String>,
    next_hop_network_instance: Option<String>,
    decapsulate_header: Option<EncapsulationHeader>,
    ip_in_ip: Option<IpInIp>,
}

impl NextHop {
    pub fn new(index: u64) -> Self {
        NextHop {
            index,
            network_instance: None,
            election_id: None,
            ip_address: None,
            interface_ref: None,
            mac_address: None,
            next_hop_network_instance: None,
            decapsulate_header: None,
            ip_in_ip: None,
        }
    }

    pub fn with_network_instance(mut self, network_instance: impl Into<String>) -> Self {
        self.network_instance = Some(network_instance.into());
        self
    }

    /// Program this entry with `election_id` instead of the session's.
    pub fn with_election_id(mut self, election_id: ElectionId) -> Self {
        self.election_id = Some(election_id);
        self
    }

    pub fn with_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_interface_ref(mut self, interface: impl Into<String>) -> Self {
        self.interface_ref = Some(InterfaceRef {
            interface: interface.into(),
            subinterface: None,
        });
        self
    }

    pub fn with_subinterface_ref(mut self, interface: impl Into<String>, subinterface: u32) -> Self {
        self.interface_ref = Some(InterfaceRef {
            interface: interface.into(),
            subinterface: Some(subinterface),
        });
        self
    }

    pub fn with_mac_address(mut self, mac_address: impl Into<String>) -> Self {
        self.mac_address = Some(mac_address.into());
        self
    }

    /// Redirect matching packets to a lookup in another network instance (VRF).
    pub fn with_next_hop_network_instance(mut self, network_instance: impl Into<String>) -> Self {
        self.next_hop_network_instance = Some(network_instance.into());
        self
    }

    pub fn with_decapsulate_header(mut self, header: EncapsulationHeader) -> Self {
        self.decapsulate_header = Some(header);
        self
    }

    pub fn with_ip_in_ip(mut self, src_ip: impl Into<String>, dst_ip: impl Into<String>) -> Self {
        self.ip_in_ip = Some(IpInIp {
            src_ip: src_ip.into(),
            dst_ip: dst_ip.into(),
        });
        self
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn network_instance(&self) -> Option<&str> {
        self.network_instance.as_deref()
    }

    pub fn election_id(&self) -> Option<ElectionId> {
        self.election_id
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    pub fn interface_ref(&self) -> Option<&str> {
        self.interface_ref.as_ref().map(|r| r.interface.as_str())
    }

    pub fn next_hop_network_instance(&self) -> Option<&str> {
        self.next_hop_network_instance.as_deref()
    }

    pub fn decapsulate_header(&self) -> Option<EncapsulationHeader> {
        self.decapsulate_header
    }

    pub(crate) fn validate(&self) -> Result<(), EntryError> {
        if self.index == 0 {
            return Err(EntryError::ZeroNextHopIndex);
        }
        validate_network_instance(self.network_instance.as_deref())?;
        validate_network_instance(self.next_hop_network_instance.as_deref())?;

        if let Some(ip_address) = &self.ip_address {
            validate_ip_address(ip_address)?;
        }
        if let Some(mac_address) = &self.mac_address {
            validate_mac_address(mac_address)?;
        }
        if let Some(ip_in_ip) = &self.ip_in_ip {
            if self.decapsulate_header.is_some() {
                return Err(EntryError::ConflictingEncapsulation(self.index));
            }
            validate_ip_address(&ip_in_ip.src_ip)?;
            validate_ip_address(&ip_in_ip.dst_ip)?;
        }

        Ok(())
    }

    pub(crate) fn normalized(&self, network_instance: &str) -> Self {
        NextHop {
            network_instance: Some(network_instance.to_string()),
            election_id: None,
            ..self.clone()
        }
    }

    pub(crate) fn to_proto(&self) -> grpc::NextHop {
        let (interface_ref, subinterface, has_subinterface) = match &self.interface_ref {
            Some(InterfaceRef {
                interface,
                subinterface: Some(sub),
            }) => (interface.clone(), *sub, true),
            Some(InterfaceRef {
                interface,
                subinterface: None,
            }) => (interface.clone(), 0, false),
            None => (String::new(), 0, false),
        };

        grpc::NextHop {
            index: self.index,
            ip_address: self.ip_address.clone().unwrap_or_default(),
            interface_ref,
            subinterface,
            has_subinterface,
            mac_address: self.mac_address.clone().unwrap_or_default(),
            network_instance: self.next_hop_network_instance.clone().unwrap_or_default(),
            decapsulate_header: self
                .decapsulate_header
                .map(grpc::EncapsulationHeaderType::from)
                .unwrap_or(grpc::EncapsulationHeaderType::EncapNone) as i32,
            ip_in_ip: self.ip_in_ip.as_ref().map(|e| grpc::IpInIp {
                src_ip: e.src_ip.clone(),
                dst_ip: e.dst_ip.clone(),
            }),
        }
    }

    pub(crate) fn from_proto(proto: grpc::NextHop) -> Self {
        let decapsulate_header = grpc::EncapsulationHeaderType::from_i32(proto.decapsulate_header)
            .and_then(EncapsulationHeader::from_proto);
        let subinterface = if proto.has_subinterface {
            Some(proto.subinterface)
        } else {
            None
        };
        let interface_ref =
            empty_to_none(proto.interface_ref).map(|interface| InterfaceRef { interface, subinterface });

        NextHop {
            index: proto.index,
            network_instance: None,
            election_id: None,
            ip_address: empty_to_none(proto.ip_address),
            interface_ref,
            mac_address: empty_to_none(proto.mac_address),
            next_hop_network_instance: empty_to_none(proto.network_instance),
            decapsulate_header,
            ip_in_ip: proto.ip_in_ip.map(|e| IpInIp {
                src_ip: e.src_ip,
                dst_ip: e.dst_ip,
            }),
        }
    }
}

impl EncapsulationHeader {
    fn from_proto(header: grpc::EncapsulationHeaderType) -> Option<Self> {
        match header {
            grpc::EncapsulationHeaderType::EncapNone => None,
            grpc::EncapsulationHeaderType::EncapGre => Some(EncapsulationHeader::Gre),
            grpc::EncapsulationHeaderType::EncapIpv4 => Some(EncapsulationHeader::Ipv4),
            grpc::EncapsulationHeaderType::EncapIpv6 => Some(EncapsulationHeader::Ipv6),
            grpc::EncapsulationHeaderType::EncapMpls => Some(EncapsulationHeader::Mpls),
        }
    }
}

impl From<EncapsulationHeader> for grpc::EncapsulationHeaderType {
    fn from(header: EncapsulationHeader) -> Self {
        match header {
            EncapsulationHeader::Gre => grpc::EncapsulationHeaderType::EncapGre,
            EncapsulationHeader::Ipv4 => grpc::EncapsulationHeaderType::EncapIpv4,
            EncapsulationHeader::Ipv6 => grpc::EncapsulationHeaderType::EncapIpv6,
            EncapsulationHeader::Mpls => grpc::EncapsulationHeaderType::EncapMpls,
        }
    }
}

fn validate_ip_address(ip_address: &str) -> Result<(), EntryError> {
    ip_address
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| EntryError::MalformedIpAddress(ip_address.to_string()))
}

// Six colon separated hex octets, e.g. "02:00:00:00:00:01".
fn validate_mac_address(mac_address: &str) -> Result<(), EntryError> {
    let octets: Vec<&str> = mac_address.split(':').collect();
    let well_formed = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && u8::from_str_radix(o, 16).is_ok());

    if well_formed {
        Ok(())
    } else {
        Err(EntryError::MalformedMacAddress(mac_address.to_string()))
    }
}
