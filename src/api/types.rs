use crate::grpc;
use std::fmt;

/// ElectionId is the 128-bit value gRIBI servers use to pick the single primary client. The
/// client holding the numerically highest election id known to the server is the only one allowed
/// to program entries.
///
/// Field order matters: the derived `Ord` compares `high` first, then `low`.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ElectionId {
    pub high: u64,
    pub low: u64,
}

impl ElectionId {
    pub const fn new(high: u64, low: u64) -> Self {
        ElectionId { high, low }
    }

    pub const fn from_low(low: u64) -> Self {
        ElectionId { high: 0, low }
    }

    /// `increment()` returns the next election id, carrying into `high` when `low` overflows.
    /// Saturates at the maximum value.
    pub fn increment(self) -> Self {
        ElectionId::from(u128::from(self).saturating_add(1))
    }

    /// `decrement()` returns the previous election id, borrowing from `high` when `low` is 0.
    /// Saturates at zero. Only useful to build intentionally stale ids.
    pub fn decrement(self) -> Self {
        ElectionId::from(u128::from(self).saturating_sub(1))
    }

    pub fn is_zero(&self) -> bool {
        self.high == 0 && self.low == 0
    }
}

impl fmt::Debug for ElectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElectionId(high={}, low={})", self.high, self.low)
    }
}

impl fmt::Display for ElectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.high, self.low)
    }
}

impl From<u128> for ElectionId {
    fn from(value: u128) -> Self {
        ElectionId {
            high: (value >> 64) as u64,
            low: value as u64,
        }
    }
}

impl From<ElectionId> for u128 {
    fn from(id: ElectionId) -> Self {
        (u128::from(id.high) << 64) | u128::from(id.low)
    }
}

impl From<grpc::Uint128> for ElectionId {
    fn from(proto: grpc::Uint128) -> Self {
        ElectionId::new(proto.high, proto.low)
    }
}

impl From<ElectionId> for grpc::Uint128 {
    fn from(id: ElectionId) -> Self {
        grpc::Uint128 {
            high: id.high,
            low: id.low,
        }
    }
}

/// OperationId is assigned by the client to every AFT operation it submits. Ids are monotonic per
/// client and start at 1.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct OperationId(u64);

impl OperationId {
    pub fn new(id: u64) -> Self {
        OperationId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Op({})", self.0)
    }
}

/// Whether the device keeps this client's entries after the session ends.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Persistence {
    Delete,
    Preserve,
}

/// Which acknowledgement counts as "done" for a programming operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AckType {
    /// Done once the entry is installed in the device's RIB.
    Rib,
    /// Done once the entry is installed in the hardware FIB (FIB-ACK mode).
    RibAndFib,
}

/// DeviceProfile captures the few device-specific behaviours the client has to know about. It's
/// supplied by the caller, the client never guesses it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceProfile {
    /// Name the device uses for its default network instance.
    pub default_network_instance: String,
    /// The device only ever acknowledges RIB installation, even when FIB-ACK is requested.
    pub rib_ack_only: bool,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        DeviceProfile {
            default_network_instance: "DEFAULT".to_string(),
            rib_ack_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn election_id_orders_high_before_low() {
        assert!(ElectionId::new(1, 0) > ElectionId::new(0, u64::MAX));
        assert!(ElectionId::new(0, 11) > ElectionId::new(0, 10));
        assert_eq!(ElectionId::from_low(10), ElectionId::new(0, 10));
    }

    #[test]
    fn election_id_increment_carries() {
        assert_eq!(ElectionId::new(0, 10).increment(), ElectionId::new(0, 11));
        assert_eq!(ElectionId::new(0, u64::MAX).increment(), ElectionId::new(1, 0));
        assert_eq!(
            ElectionId::new(u64::MAX, u64::MAX).increment(),
            ElectionId::new(u64::MAX, u64::MAX)
        );
    }

    #[test]
    fn election_id_decrement_borrows() {
        assert_eq!(ElectionId::new(0, 10).decrement(), ElectionId::new(0, 9));
        assert_eq!(ElectionId::new(3, 0).decrement(), ElectionId::new(2, u64::MAX));
        assert_eq!(ElectionId::new(0, 0).decrement(), ElectionId::new(0, 0));
    }

    #[test]
    fn election_id_u128_conversions() {
        let id = ElectionId::new(7, 42);
        let raw = u128::from(id);
        assert_eq!(raw, (7u128 << 64) + 42);
        assert_eq!(ElectionId::from(raw), id);
    }
}
