//! Conflict detection: find addresses claimed by more than one owner.

use std::collections::BTreeMap;

use crate::types::{ConflictGroup, TableEntry};

/// Group entries by address and keep only groups with several owners.
///
/// Groups come out sorted by address.  Within a group owners are sorted by
/// name and each owner's keys keep their order of appearance in `entries`.
pub fn detect_conflicts(entries: &[TableEntry]) -> Vec<ConflictGroup> {
    let mut by_address: BTreeMap<&str, BTreeMap<String, Vec<String>>> = BTreeMap::new();
    for entry in entries {
        by_address
            .entry(entry.decoded_address.as_str())
            .or_default()
            .entry(entry.owner.clone())
            .or_default()
            .push(entry.key.clone());
    }

    by_address
        .into_iter()
        .map(|(address, owners_to_keys)| ConflictGroup {
            address: address.to_string(),
            owners_to_keys,
        })
        .filter(ConflictGroup::is_invalid)
        .collect()
}
