use crate::api::OperationType;
use crate::entry::{Entry, EntryError, Ipv4Entry, NextHop, NextHopGroup};

/// Batch is an ordered list of AFT operations submitted together with `GribiClient::modify`. The
/// device receives them in one `ModifyRequest`, so entries in a batch may reference each other in
/// any order.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    operations: Vec<(OperationType, Entry)>,
}

impl Batch {
    pub fn new() -> Self {
        Batch::default()
    }

    pub fn add(&mut self, entry: impl Into<Entry>) -> Result<&mut Self, EntryError> {
        let entry = entry.into();
        entry.validate()?;
        self.operations.push((OperationType::Add, entry));
        Ok(self)
    }

    pub fn replace(&mut self, entry: impl Into<Entry>) -> Result<&mut Self, EntryError> {
        let entry = entry.into();
        entry.validate()?;
        self.operations.push((OperationType::Replace, entry));
        Ok(self)
    }

    /// Only the entry's key has to be valid. The rest of its content is sent but ignored by the
    /// device.
    pub fn delete(&mut self, entry: impl Into<Entry>) -> Result<&mut Self, EntryError> {
        let entry = entry.into();
        entry.validate_key()?;
        self.operations.push((OperationType::Delete, entry));
        Ok(self)
    }

    pub fn add_next_hop(&mut self, nh: NextHop) -> Result<&mut Self, EntryError> {
        self.add(nh)
    }

    pub fn add_next_hop_group(&mut self, nhg: NextHopGroup) -> Result<&mut Self, EntryError> {
        self.add(nhg)
    }

    pub fn add_ipv4(&mut self, ipv4: Ipv4Entry) -> Result<&mut Self, EntryError> {
        self.add(ipv4)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[(OperationType, Entry)] {
        &self.operations
    }

    pub(crate) fn into_operations(self) -> Vec<(OperationType, Entry)> {
        self.operations
    }
}
