use crate::api::{EntryKey, FlushOutcome, OperationType};
use crate::entry::{Entry, EntryError, Ipv4Entry, NextHop, NextHopGroup};
use crate::grpc;
use crate::server::arbiter::SessionId;
use std::collections::{BTreeMap, BTreeSet};

/// One decoded AFT operation, already cleared by the election arbiter.
pub(super) struct PendingOperation {
    pub id: u64,
    pub op_type: OperationType,
    pub network_instance: String,
    pub entry: Entry,
}

#[derive(Debug, thiserror::Error)]
pub(super) enum StoreError {
    #[error("Invalid entry: {0}")]
    Invalid(#[from] EntryError),
    #[error("{0:?} does not exist")]
    NotFound(EntryKey),
    #[error("{0:?} references missing {1:?}")]
    MissingReference(EntryKey, EntryKey),
    #[error("{0:?} is still referenced by {1:?}")]
    StillReferenced(EntryKey, EntryKey),
    #[error("{0:?} would be its own backup through {1:?}")]
    BackupCycle(EntryKey, EntryKey),
}

impl StoreError {
    /// Errors that another operation in the same batch may still clear up.
    fn is_retryable(&self) -> bool {
        !matches!(self, StoreError::Invalid(_))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("No such network instance '{0}'")]
pub(super) struct UnknownNetworkInstance(String);

/// What the device reports about a next hop group's forwarding state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NextHopGroupTelemetry {
    pub id: u64,
    pub backup_next_hop_group: Option<u64>,
    /// True when the group has a backup and every member next hop egresses through a disabled
    /// interface.
    pub backup_active: bool,
}

struct Owned<T> {
    value: T,
    owner: SessionId,
}

#[derive(Default)]
struct NetworkInstance {
    next_hops: BTreeMap<u64, Owned<NextHop>>,
    next_hop_groups: BTreeMap<u64, Owned<NextHopGroup>>,
    ipv4: BTreeMap<String, Owned<Ipv4Entry>>,
}

impl NetworkInstance {
    fn len(&self) -> usize {
        self.next_hops.len() + self.next_hop_groups.len() + self.ipv4.len()
    }
}

type References = BTreeMap<String, BTreeSet<u64>>;

fn is_referenced(references: &References, network_instance: &str, id: u64) -> bool {
    references
        .get(network_instance)
        .map_or(false, |ids| ids.contains(&id))
}

/// AftStore is the device's RIB: every network instance's next hops, next hop groups and IPv4
/// prefixes, with referential integrity enforced on every change.
pub(super) struct AftStore {
    instances: BTreeMap<String, NetworkInstance>,
    interfaces_down: BTreeSet<String>,
}

impl AftStore {
    pub fn new(default_network_instance: &str) -> Self {
        let mut instances = BTreeMap::new();
        instances.insert(default_network_instance.to_string(), NetworkInstance::default());

        AftStore {
            instances,
            interfaces_down: BTreeSet::new(),
        }
    }

    /// Applies a batch. Operations whose references aren't satisfied yet are retried for as long as
    /// the rest of the batch makes progress, so a batch may list entries in any order.
    pub fn apply_batch(
        &mut self,
        operations: Vec<PendingOperation>,
        owner: SessionId,
    ) -> Vec<(u64, Result<(), StoreError>)> {
        let mut outcomes = Vec::with_capacity(operations.len());
        let mut pending = operations;

        loop {
            let mut progressed = false;
            let mut deferred = Vec::new();
            for op in pending {
                match self.apply(&op, owner) {
                    Ok(()) => {
                        progressed = true;
                        outcomes.push((op.id, Ok(())));
                    }
                    Err(e) if e.is_retryable() => deferred.push((op, e)),
                    Err(e) => outcomes.push((op.id, Err(e))),
                }
            }

            if deferred.is_empty() || !progressed {
                outcomes.extend(deferred.into_iter().map(|(op, e)| (op.id, Err(e))));
                return outcomes;
            }
            pending = deferred.into_iter().map(|(op, _)| op).collect();
        }
    }

    fn apply(&mut self, op: &PendingOperation, owner: SessionId) -> Result<(), StoreError> {
        let key = op.entry.key(&op.network_instance);
        match op.op_type {
            OperationType::Add | OperationType::Replace => {
                op.entry.validate()?;
                // ADD of an existing entry replaces it.
                if op.op_type == OperationType::Replace && !self.contains(&key) {
                    return Err(StoreError::NotFound(key));
                }
                if let Some(missing) = self.missing_reference(&op.network_instance, &op.entry) {
                    return Err(StoreError::MissingReference(key, missing));
                }
                if let Entry::NextHopGroup(nhg) = &op.entry {
                    if let Some(through) = self.backup_cycle(&op.network_instance, nhg) {
                        return Err(StoreError::BackupCycle(key, through));
                    }
                }
                self.insert(&op.network_instance, op.entry.clone(), owner);
                Ok(())
            }
            OperationType::Delete => {
                if !self.contains(&key) {
                    return Err(StoreError::NotFound(key));
                }
                if let Some(by) = self.referenced_by(&key) {
                    return Err(StoreError::StillReferenced(key, by));
                }
                self.remove(&key);
                Ok(())
            }
        }
    }

    fn contains(&self, key: &EntryKey) -> bool {
        match key {
            EntryKey::NextHop {
                network_instance,
                index,
            } => self
                .instances
                .get(network_instance)
                .map_or(false, |i| i.next_hops.contains_key(index)),
            EntryKey::NextHopGroup { network_instance, id } => self
                .instances
                .get(network_instance)
                .map_or(false, |i| i.next_hop_groups.contains_key(id)),
            EntryKey::Ipv4 {
                network_instance,
                prefix,
            } => self
                .instances
                .get(network_instance)
                .map_or(false, |i| i.ipv4.contains_key(prefix)),
        }
    }

    fn missing_reference(&self, network_instance: &str, entry: &Entry) -> Option<EntryKey> {
        let required = match entry {
            Entry::NextHop(_) => Vec::new(),
            Entry::NextHopGroup(nhg) => {
                let mut required: Vec<EntryKey> = nhg
                    .next_hops()
                    .map(|(index, _)| EntryKey::NextHop {
                        network_instance: network_instance.to_string(),
                        index,
                    })
                    .collect();
                if let Some(backup) = nhg.backup_next_hop_group() {
                    required.push(EntryKey::NextHopGroup {
                        network_instance: network_instance.to_string(),
                        id: backup,
                    });
                }
                required
            }
            Entry::Ipv4(ipv4) => vec![EntryKey::NextHopGroup {
                network_instance: ipv4
                    .next_hop_group_network_instance()
                    .unwrap_or(network_instance)
                    .to_string(),
                id: ipv4.next_hop_group(),
            }],
        };

        required.into_iter().find(|key| !self.contains(key))
    }

    /// Follows the backup chain `nhg` would start once installed. Returns the group that leads back
    /// to it, if any.
    fn backup_cycle(&self, network_instance: &str, nhg: &NextHopGroup) -> Option<EntryKey> {
        let groups = &self.instances.get(network_instance)?.next_hop_groups;
        let mut seen = BTreeSet::new();
        let mut previous = nhg.id();
        let mut next = nhg.backup_next_hop_group();
        while let Some(id) = next {
            if id == nhg.id() || !seen.insert(id) {
                return Some(EntryKey::NextHopGroup {
                    network_instance: network_instance.to_string(),
                    id: previous,
                });
            }
            previous = id;
            next = groups.get(&id).and_then(|g| g.value.backup_next_hop_group());
        }
        None
    }

    fn referenced_by(&self, key: &EntryKey) -> Option<EntryKey> {
        match key {
            EntryKey::NextHop {
                network_instance,
                index,
            } => {
                let instance = self.instances.get(network_instance)?;
                instance
                    .next_hop_groups
                    .iter()
                    .find(|(_, nhg)| nhg.value.next_hops().any(|(member, _)| member == *index))
                    .map(|(id, _)| EntryKey::NextHopGroup {
                        network_instance: network_instance.clone(),
                        id: *id,
                    })
            }
            EntryKey::NextHopGroup { network_instance, id } => {
                if let Some(instance) = self.instances.get(network_instance) {
                    let backup_of = instance
                        .next_hop_groups
                        .iter()
                        .find(|(_, nhg)| nhg.value.backup_next_hop_group() == Some(*id));
                    if let Some((other, _)) = backup_of {
                        return Some(EntryKey::NextHopGroup {
                            network_instance: network_instance.clone(),
                            id: *other,
                        });
                    }
                }

                for (name, instance) in &self.instances {
                    for (prefix, ipv4) in &instance.ipv4 {
                        let nhg_instance = ipv4.value.next_hop_group_network_instance().unwrap_or(name);
                        if nhg_instance == network_instance.as_str() && ipv4.value.next_hop_group() == *id {
                            return Some(EntryKey::Ipv4 {
                                network_instance: name.clone(),
                                prefix: prefix.clone(),
                            });
                        }
                    }
                }
                None
            }
            EntryKey::Ipv4 { .. } => None,
        }
    }

    fn insert(&mut self, network_instance: &str, entry: Entry, owner: SessionId) {
        let instance = self.instances.entry(network_instance.to_string()).or_default();
        match entry {
            Entry::NextHop(nh) => {
                instance.next_hops.insert(nh.index(), Owned { value: nh, owner });
            }
            Entry::NextHopGroup(nhg) => {
                instance.next_hop_groups.insert(nhg.id(), Owned { value: nhg, owner });
            }
            Entry::Ipv4(ipv4) => {
                instance
                    .ipv4
                    .insert(ipv4.prefix().to_string(), Owned { value: ipv4, owner });
            }
        }
    }

    fn remove(&mut self, key: &EntryKey) {
        let instance = match self.instances.get_mut(key.network_instance()) {
            Some(instance) => instance,
            None => return,
        };
        match key {
            EntryKey::NextHop { index, .. } => {
                instance.next_hops.remove(index);
            }
            EntryKey::NextHopGroup { id, .. } => {
                instance.next_hop_groups.remove(id);
            }
            EntryKey::Ipv4 { prefix, .. } => {
                instance.ipv4.remove(prefix);
            }
        }
    }

    /// Removes every entry in `target` (or everywhere), prefixes first, then groups and next hops no
    /// longer referenced. Entries still referenced from outside the target are kept.
    pub fn flush(&mut self, target: Option<&str>) -> Result<FlushOutcome, UnknownNetworkInstance> {
        if let Some(name) = target {
            if !self.instances.contains_key(name) {
                return Err(UnknownNetworkInstance(name.to_string()));
            }
        }

        let (_, remaining) = self.remove_where(|network_instance, _| target.map_or(true, |t| t == network_instance));
        if remaining == 0 {
            Ok(FlushOutcome::Ok)
        } else {
            Ok(FlushOutcome::NonZeroReferenceRemain)
        }
    }

    /// Removes what `owner` programmed, as far as referential integrity allows. Returns how many
    /// entries were removed.
    pub fn purge_owner(&mut self, owner: SessionId) -> usize {
        let (removed, _) = self.remove_where(|_, entry_owner| entry_owner == owner);
        removed
    }

    fn remove_where<F>(&mut self, select: F) -> (usize, usize)
    where
        F: Fn(&str, SessionId) -> bool,
    {
        let before = self.total_len();

        for (name, instance) in self.instances.iter_mut() {
            instance.ipv4.retain(|_, e| !select(name, e.owner));
        }

        // Selected groups survive only when something outside the selection still reaches them,
        // directly or through a chain of backups.
        let mut pinned = self.referenced_groups(|name, owner| !select(name, owner));
        loop {
            let mut changed = false;
            for (name, instance) in &self.instances {
                for (id, nhg) in &instance.next_hop_groups {
                    let backup = match nhg.value.backup_next_hop_group() {
                        Some(backup) => backup,
                        None => continue,
                    };
                    if select(name, nhg.owner) && is_referenced(&pinned, name, *id) {
                        changed |= pinned.entry(name.clone()).or_default().insert(backup);
                    }
                }
            }
            if !changed {
                break;
            }
        }
        for (name, instance) in self.instances.iter_mut() {
            instance
                .next_hop_groups
                .retain(|id, e| !select(name, e.owner) || is_referenced(&pinned, name, *id));
        }

        let referenced = self.referenced_next_hops();
        for (name, instance) in self.instances.iter_mut() {
            instance
                .next_hops
                .retain(|index, e| !select(name, e.owner) || is_referenced(&referenced, name, *index));
        }

        let remaining = self
            .instances
            .iter()
            .map(|(name, instance)| {
                instance.next_hops.values().filter(|e| select(name, e.owner)).count()
                    + instance.next_hop_groups.values().filter(|e| select(name, e.owner)).count()
                    + instance.ipv4.values().filter(|e| select(name, e.owner)).count()
            })
            .sum();

        (before - self.total_len(), remaining)
    }

    /// Groups referenced by any prefix, or as a backup by a group `counts` accepts.
    fn referenced_groups<F>(&self, counts: F) -> References
    where
        F: Fn(&str, SessionId) -> bool,
    {
        let mut references = References::new();
        for (name, instance) in &self.instances {
            for ipv4 in instance.ipv4.values() {
                let nhg_instance = ipv4.value.next_hop_group_network_instance().unwrap_or(name);
                references
                    .entry(nhg_instance.to_string())
                    .or_default()
                    .insert(ipv4.value.next_hop_group());
            }
            for nhg in instance.next_hop_groups.values().filter(|nhg| counts(name, nhg.owner)) {
                if let Some(backup) = nhg.value.backup_next_hop_group() {
                    references.entry(name.clone()).or_default().insert(backup);
                }
            }
        }
        references
    }

    fn referenced_next_hops(&self) -> References {
        let mut references = References::new();
        for (name, instance) in &self.instances {
            for nhg in instance.next_hop_groups.values() {
                references
                    .entry(name.clone())
                    .or_default()
                    .extend(nhg.value.next_hops().map(|(index, _)| index));
            }
        }
        references
    }

    fn total_len(&self) -> usize {
        self.instances.values().map(NetworkInstance::len).sum()
    }

    pub fn entry_count(&self, network_instance: &str) -> usize {
        self.instances.get(network_instance).map_or(0, NetworkInstance::len)
    }

    /// Everything installed in `network_instance` (or everywhere), restricted to one AFT unless
    /// `aft` is `All`. The device programs its FIB synchronously, so both flags are always set.
    pub fn get(&self, network_instance: Option<&str>, aft: grpc::AftType) -> Vec<grpc::AftEntry> {
        let wants = |wanted: grpc::AftType| aft == grpc::AftType::All || aft == wanted;

        let mut entries = Vec::new();
        for (name, instance) in &self.instances {
            if network_instance.map_or(false, |ni| ni != name.as_str()) {
                continue;
            }
            if wants(grpc::AftType::Nexthop) {
                for nh in instance.next_hops.values() {
                    entries.push(Entry::NextHop(nh.value.clone()).to_aft_entry(name, true, true));
                }
            }
            if wants(grpc::AftType::NexthopGroup) {
                for nhg in instance.next_hop_groups.values() {
                    entries.push(Entry::NextHopGroup(nhg.value.clone()).to_aft_entry(name, true, true));
                }
            }
            if wants(grpc::AftType::Ipv4) {
                for ipv4 in instance.ipv4.values() {
                    entries.push(Entry::Ipv4(ipv4.value.clone()).to_aft_entry(name, true, true));
                }
            }
        }
        entries
    }

    /// Returns true if the interface's state changed.
    pub fn set_interface_enabled(&mut self, interface: &str, enabled: bool) -> bool {
        if enabled {
            self.interfaces_down.remove(interface)
        } else {
            self.interfaces_down.insert(interface.to_string())
        }
    }

    pub fn next_hop_group_telemetry(&self, network_instance: &str, id: u64) -> Option<NextHopGroupTelemetry> {
        let instance = self.instances.get(network_instance)?;
        let nhg = &instance.next_hop_groups.get(&id)?.value;

        let primary_down = nhg.next_hops().all(|(index, _)| {
            instance
                .next_hops
                .get(&index)
                .and_then(|nh| nh.value.interface_ref())
                .map_or(false, |interface| self.interfaces_down.contains(interface))
        });

        Some(NextHopGroupTelemetry {
            id,
            backup_next_hop_group: nhg.backup_next_hop_group(),
            backup_active: nhg.backup_next_hop_group().is_some() && primary_down,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: &str = "DEFAULT";

    fn op(id: u64, op_type: OperationType, entry: impl Into<Entry>) -> PendingOperation {
        op_in(id, op_type, DEFAULT, entry)
    }

    fn op_in(id: u64, op_type: OperationType, network_instance: &str, entry: impl Into<Entry>) -> PendingOperation {
        let entry: Entry = entry.into();
        PendingOperation {
            id,
            op_type,
            network_instance: network_instance.to_string(),
            entry: entry.normalized(network_instance),
        }
    }

    fn succeeded(outcomes: &[(u64, Result<(), StoreError>)]) -> Vec<u64> {
        let mut ids: Vec<u64> = outcomes.iter().filter(|(_, r)| r.is_ok()).map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn batch_order_does_not_matter() {
        let mut store = AftStore::new(DEFAULT);
        let outcomes = store.apply_batch(
            vec![
                op(1, OperationType::Add, Ipv4Entry::new("198.51.100.0/24", 42)),
                op(2, OperationType::Add, NextHopGroup::new(42).with_next_hop(1, 1)),
                op(3, OperationType::Add, NextHop::new(1).with_ip_address("203.0.113.1")),
            ],
            1,
        );

        assert_eq!(succeeded(&outcomes), vec![1, 2, 3]);
        assert_eq!(store.entry_count(DEFAULT), 3);
    }

    #[test]
    fn missing_reference_fails_and_nothing_is_installed() {
        let mut store = AftStore::new(DEFAULT);
        let outcomes = store.apply_batch(vec![op(1, OperationType::Add, Ipv4Entry::new("198.51.100.0/24", 42))], 1);

        assert!(matches!(outcomes[0], (1, Err(StoreError::MissingReference(..)))));
        assert_eq!(store.entry_count(DEFAULT), 0);
    }

    #[test]
    fn referenced_entries_cannot_be_deleted() {
        let mut store = AftStore::new(DEFAULT);
        store.apply_batch(
            vec![
                op(1, OperationType::Add, NextHop::new(1)),
                op(2, OperationType::Add, NextHopGroup::new(42).with_next_hop(1, 1)),
            ],
            1,
        );

        let outcomes = store.apply_batch(vec![op(3, OperationType::Delete, NextHop::new(1))], 1);
        assert!(matches!(outcomes[0], (3, Err(StoreError::StillReferenced(..)))));

        // Deleting the group in the same batch unblocks it.
        let outcomes = store.apply_batch(
            vec![
                op(4, OperationType::Delete, NextHop::new(1)),
                op(5, OperationType::Delete, NextHopGroup::new(42)),
            ],
            1,
        );
        assert_eq!(succeeded(&outcomes), vec![4, 5]);
        assert_eq!(store.entry_count(DEFAULT), 0);
    }

    #[test]
    fn add_replaces_but_replace_needs_existing_entry() {
        let mut store = AftStore::new(DEFAULT);
        let outcomes = store.apply_batch(vec![op(1, OperationType::Replace, NextHop::new(1))], 1);
        assert!(matches!(outcomes[0], (1, Err(StoreError::NotFound(_)))));

        store.apply_batch(vec![op(2, OperationType::Add, NextHop::new(1))], 1);
        let outcomes = store.apply_batch(
            vec![op(3, OperationType::Add, NextHop::new(1).with_ip_address("192.0.2.1"))],
            1,
        );
        assert_eq!(succeeded(&outcomes), vec![3]);
        assert_eq!(store.entry_count(DEFAULT), 1);
    }

    #[test]
    fn invalid_entry_is_rejected() {
        let mut store = AftStore::new(DEFAULT);
        let outcomes = store.apply_batch(vec![op(1, OperationType::Add, NextHopGroup::new(42))], 1);
        assert!(matches!(outcomes[0], (1, Err(StoreError::Invalid(_)))));
    }

    #[test]
    fn flush_keeps_cross_instance_references() {
        let mut store = AftStore::new(DEFAULT);
        store.apply_batch(
            vec![
                op(1, OperationType::Add, NextHop::new(1)),
                op(2, OperationType::Add, NextHopGroup::new(42).with_next_hop(1, 1)),
                op(3, OperationType::Add, Ipv4Entry::new("198.51.100.0/24", 42)),
                op_in(
                    4,
                    OperationType::Add,
                    "VRF-A",
                    Ipv4Entry::new("192.0.2.0/24", 42).with_next_hop_group_network_instance(DEFAULT),
                ),
            ],
            1,
        );

        assert_eq!(store.flush(Some(DEFAULT)).unwrap(), FlushOutcome::NonZeroReferenceRemain);
        assert_eq!(store.entry_count(DEFAULT), 2);

        assert_eq!(store.flush(None).unwrap(), FlushOutcome::Ok);
        assert_eq!(store.entry_count(DEFAULT), 0);
        assert_eq!(store.entry_count("VRF-A"), 0);

        // Idempotent, and a flushed instance still exists.
        assert_eq!(store.flush(Some("VRF-A")).unwrap(), FlushOutcome::Ok);
        assert!(store.flush(Some("VRF-B")).is_err());
    }

    #[test]
    fn flush_removes_backup_chains() {
        let mut store = AftStore::new(DEFAULT);
        store.apply_batch(
            vec![
                op(1, OperationType::Add, NextHop::new(1)),
                op(2, OperationType::Add, NextHop::new(2)),
                op(3, OperationType::Add, NextHopGroup::new(100).with_next_hop(2, 1)),
                op(4, OperationType::Add, NextHopGroup::new(42).with_next_hop(1, 1).with_backup_next_hop_group(100)),
            ],
            1,
        );

        assert_eq!(store.flush(Some(DEFAULT)).unwrap(), FlushOutcome::Ok);
        assert_eq!(store.entry_count(DEFAULT), 0);
    }

    #[test]
    fn backup_cycle_is_rejected() {
        let mut store = AftStore::new(DEFAULT);
        store.apply_batch(
            vec![
                op(1, OperationType::Add, NextHop::new(1)),
                op(2, OperationType::Add, NextHop::new(2)),
                op(3, OperationType::Add, NextHopGroup::new(10).with_next_hop(1, 1)),
                op(4, OperationType::Add, NextHopGroup::new(20).with_next_hop(2, 1).with_backup_next_hop_group(10)),
            ],
            1,
        );

        let outcomes = store.apply_batch(
            vec![
                op(5, OperationType::Add, NextHopGroup::new(10).with_next_hop(1, 1).with_backup_next_hop_group(20)),
                op(6, OperationType::Replace, NextHopGroup::new(20).with_next_hop(2, 1).with_backup_next_hop_group(20)),
            ],
            1,
        );
        assert!(matches!(outcomes[0].1, Err(StoreError::BackupCycle(_, _))));
        assert!(matches!(outcomes[1].1, Err(StoreError::BackupCycle(_, _))));

        assert_eq!(store.flush(Some(DEFAULT)).unwrap(), FlushOutcome::Ok);
        assert_eq!(store.entry_count(DEFAULT), 0);
    }

    #[test]
    fn flush_clears_groups_that_only_reference_each_other() {
        let mut store = AftStore::new(DEFAULT);
        store.apply_batch(vec![op(1, OperationType::Add, NextHop::new(1))], 1);
        for (id, backup) in vec![(10, 20), (20, 10)] {
            let nhg = NextHopGroup::new(id).with_next_hop(1, 1).with_backup_next_hop_group(backup);
            store.insert(DEFAULT, Entry::from(nhg).normalized(DEFAULT), 1);
        }

        assert_eq!(store.flush(Some(DEFAULT)).unwrap(), FlushOutcome::Ok);
        assert_eq!(store.entry_count(DEFAULT), 0);
    }

    #[test]
    fn purge_keeps_backup_chain_of_foreign_group() {
        let mut store = AftStore::new(DEFAULT);
        store.apply_batch(
            vec![
                op(1, OperationType::Add, NextHop::new(1)),
                op(2, OperationType::Add, NextHopGroup::new(10).with_next_hop(1, 1)),
                op(3, OperationType::Add, NextHopGroup::new(20).with_next_hop(1, 1).with_backup_next_hop_group(10)),
            ],
            1,
        );
        store.apply_batch(
            vec![op(1, OperationType::Add, NextHopGroup::new(30).with_next_hop(1, 1).with_backup_next_hop_group(20))],
            2,
        );

        // Group 30 reaches 20, and 20 reaches 10, so nothing of session 1 can go.
        assert_eq!(store.purge_owner(1), 0);
        assert_eq!(store.purge_owner(2), 1);
        assert_eq!(store.purge_owner(1), 3);
    }

    #[test]
    fn purge_only_removes_owned_entries() {
        let mut store = AftStore::new(DEFAULT);
        store.apply_batch(vec![op(1, OperationType::Add, NextHop::new(1))], 1);
        store.apply_batch(
            vec![
                op(1, OperationType::Add, NextHop::new(2)),
                op(2, OperationType::Add, NextHopGroup::new(42).with_next_hop(1, 1)),
            ],
            2,
        );

        // Next hop 1 belongs to session 1 but group 42 from session 2 still uses it.
        assert_eq!(store.purge_owner(1), 0);
        assert_eq!(store.purge_owner(2), 2);
        assert_eq!(store.purge_owner(1), 1);
        assert_eq!(store.entry_count(DEFAULT), 0);
    }

    #[test]
    fn get_filters_by_instance_and_aft() {
        let mut store = AftStore::new(DEFAULT);
        store.apply_batch(
            vec![
                op(1, OperationType::Add, NextHop::new(1)),
                op(2, OperationType::Add, NextHopGroup::new(42).with_next_hop(1, 1)),
                op_in(3, OperationType::Add, "VRF-A", NextHop::new(1)),
            ],
            1,
        );

        assert_eq!(store.get(None, grpc::AftType::All).len(), 3);
        assert_eq!(store.get(Some(DEFAULT), grpc::AftType::All).len(), 2);
        assert_eq!(store.get(None, grpc::AftType::Nexthop).len(), 2);

        let groups = store.get(Some(DEFAULT), grpc::AftType::NexthopGroup);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].rib_programmed && groups[0].fib_programmed);
        assert!(store.get(Some("VRF-B"), grpc::AftType::All).is_empty());
    }

    #[test]
    fn backup_activates_when_all_primaries_are_down() {
        let mut store = AftStore::new(DEFAULT);
        store.apply_batch(
            vec![
                op(1, OperationType::Add, NextHop::new(1).with_interface_ref("port2")),
                op(2, OperationType::Add, NextHop::new(2).with_interface_ref("port3")),
                op(3, OperationType::Add, NextHopGroup::new(100).with_next_hop(2, 1)),
                op(4, OperationType::Add, NextHopGroup::new(42).with_next_hop(1, 1).with_backup_next_hop_group(100)),
            ],
            1,
        );

        let telemetry = store.next_hop_group_telemetry(DEFAULT, 42).unwrap();
        assert_eq!(telemetry.backup_next_hop_group, Some(100));
        assert!(!telemetry.backup_active);

        assert!(store.set_interface_enabled("port2", false));
        assert!(!store.set_interface_enabled("port2", false));
        assert!(store.next_hop_group_telemetry(DEFAULT, 42).unwrap().backup_active);
        // No backup, nothing to activate.
        store.set_interface_enabled("port3", false);
        assert!(!store.next_hop_group_telemetry(DEFAULT, 100).unwrap().backup_active);

        store.set_interface_enabled("port2", true);
        assert!(!store.next_hop_group_telemetry(DEFAULT, 42).unwrap().backup_active);
        assert_eq!(store.next_hop_group_telemetry(DEFAULT, 7), None);
    }
}
