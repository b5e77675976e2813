//! A client-side record of what should be programmed on the device, for checking `Get` output.
use crate::api::{EntryKey, OperationType, ProgrammedEntry};
use crate::entry::Entry;
use std::collections::BTreeMap;

/// How the device's AFT differs from the expected one.
#[derive(Clone, Debug, PartialEq)]
pub enum AftMismatch {
    /// Expected, but the device doesn't have it.
    Missing(EntryKey),
    /// The device has it, but it was never programmed through this cache.
    Unexpected(EntryKey),
    Differs {
        key: EntryKey,
        expected: Entry,
        programmed: Entry,
    },
}

/// AftCache is the expected AFT. Snapshots can be pushed before a step that is expected to fail, or
/// to be undone, and popped afterwards to restore the previous expectation.
pub struct AftCache {
    default_network_instance: String,
    current: BTreeMap<EntryKey, Entry>,
    snapshots: Vec<BTreeMap<EntryKey, Entry>>,
}

impl AftCache {
    pub fn new(default_network_instance: impl Into<String>) -> Self {
        AftCache {
            default_network_instance: default_network_instance.into(),
            current: BTreeMap::new(),
            snapshots: Vec::new(),
        }
    }

    /// Applies one successful operation.
    pub fn record(&mut self, op_type: OperationType, entry: &Entry) {
        let key = entry.key(&self.default_network_instance);
        match op_type {
            OperationType::Add | OperationType::Replace => {
                let normalized = entry.normalized(key.network_instance());
                self.current.insert(key, normalized);
            }
            OperationType::Delete => {
                self.current.remove(&key);
            }
        }
    }

    pub fn push(&mut self) {
        self.snapshots.push(self.current.clone());
    }

    /// Restores the most recently pushed snapshot. Returns false if there was none.
    pub fn pop(&mut self) -> bool {
        match self.snapshots.pop() {
            Some(snapshot) => {
                self.current = snapshot;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.current.clear();
    }

    pub fn clear_network_instance(&mut self, network_instance: &str) {
        self.current.retain(|key, _| key.network_instance() != network_instance);
    }

    pub fn get(&self, key: &EntryKey) -> Option<&Entry> {
        self.current.get(key)
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Compares the expectation against entries read back from the device. The result is ordered
    /// by key.
    pub fn diff(&self, programmed: &[ProgrammedEntry]) -> Vec<AftMismatch> {
        let programmed: BTreeMap<EntryKey, &Entry> = programmed
            .iter()
            .map(|p| (p.entry.key(&p.network_instance), &p.entry))
            .collect();

        let mut mismatches = Vec::new();
        for (key, expected) in &self.current {
            match programmed.get(key) {
                None => mismatches.push(AftMismatch::Missing(key.clone())),
                Some(entry) if *entry != expected => mismatches.push(AftMismatch::Differs {
                    key: key.clone(),
                    expected: expected.clone(),
                    programmed: (*entry).clone(),
                }),
                Some(_) => {}
            }
        }
        for key in programmed.keys() {
            if !self.current.contains_key(key) {
                mismatches.push(AftMismatch::Unexpected(key.clone()));
            }
        }

        mismatches.sort_by(|a, b| mismatch_key(a).cmp(mismatch_key(b)));
        mismatches
    }
}

fn mismatch_key(mismatch: &AftMismatch) -> &EntryKey {
    match mismatch {
        AftMismatch::Missing(key) => key,
        AftMismatch::Unexpected(key) => key,
        AftMismatch::Differs { key, .. } => key,
    }
}
