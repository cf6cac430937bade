//! Repair policy.
//!
//! Only the node that owns a claim can tell whether it still runs the
//! workload behind it.  A node therefore repairs its own stale claims and
//! asks the owners of every other claim to check theirs.
//!
//! Decisions are pure; executing them is the loop's job.

use log::warn;

use crate::types::{
    ConflictGroup, NetworkContext, RepairAction, RepairStrategy, TableEntry, TableName,
};

/// Decide the actions for every owner of one conflicting group.
///
/// `ctx.own_peer_name` must be resolved; networks without an identity are
/// skipped before the policy runs.
pub fn decide(
    strategy: RepairStrategy,
    table: TableName,
    ctx: &NetworkContext,
    group: &ConflictGroup,
) -> Vec<RepairAction> {
    if !group.is_invalid() {
        return Vec::new();
    }
    let own = ctx.own_peer_name.as_deref();

    group
        .owners_to_keys
        .iter()
        .filter_map(|(owner, keys)| {
            if Some(owner.as_str()) == own {
                decide_own_claim(strategy, table, ctx, &group.address, keys)
            } else {
                decide_peer_claim(strategy, table, ctx, &group.address, owner, keys)
            }
        })
        .collect()
}

fn decide_own_claim(
    strategy: RepairStrategy,
    table: TableName,
    ctx: &NetworkContext,
    address: &str,
    keys: &[String],
) -> Option<RepairAction> {
    if ctx.local_container_addresses.contains(address) {
        // Our claim is live; the other owner has to fix theirs.
        return None;
    }
    Some(match strategy {
        RepairStrategy::Rejoin => RepairAction::RejoinNetwork {
            network_id: ctx.network_id.clone(),
        },
        RepairStrategy::Targeted | RepairStrategy::Corroborate => RepairAction::DeleteEntries {
            table,
            network_id: ctx.network_id.clone(),
            keys: keys.to_vec(),
        },
    })
}

fn decide_peer_claim(
    strategy: RepairStrategy,
    table: TableName,
    ctx: &NetworkContext,
    address: &str,
    owner: &str,
    keys: &[String],
) -> Option<RepairAction> {
    let Some(peer_address) = ctx.peer_name_to_address.get(owner) else {
        warn!(
            "Owner {} of {} in {} on network {} is not a known peer, cannot ask it to verify",
            owner, address, table, ctx.network_name
        );
        return None;
    };
    Some(match strategy {
        RepairStrategy::Corroborate => RepairAction::CorroboratePeerClaim {
            peer_address: peer_address.clone(),
            network_id: ctx.network_id.clone(),
            table,
            address: address.to_string(),
            keys: keys.to_vec(),
        },
        RepairStrategy::Targeted | RepairStrategy::Rejoin => {
            RepairAction::RequestPeerVerification {
                peer_address: peer_address.clone(),
                network_id: ctx.network_id.clone(),
                candidate_addresses: vec![address.to_string()],
            }
        }
    })
}

/// Receiving side of a verification request, for one table.
///
/// The claim stands if at least one candidate is bound to a local
/// container.  Otherwise this node's own entries for the candidates are
/// stale and get the same repair `decide` would give them.
pub fn verify_local_claims(
    strategy: RepairStrategy,
    table: TableName,
    ctx: &NetworkContext,
    candidate_addresses: &[String],
    entries: &[TableEntry],
) -> Option<RepairAction> {
    if candidate_addresses
        .iter()
        .any(|candidate| ctx.local_container_addresses.contains(candidate))
    {
        return None;
    }
    let own = ctx.own_peer_name.as_deref()?;
    let keys: Vec<String> = entries
        .iter()
        .filter(|e| e.owner == own && candidate_addresses.contains(&e.decoded_address))
        .map(|e| e.key.clone())
        .collect();
    if keys.is_empty() {
        return None;
    }
    Some(match strategy {
        RepairStrategy::Rejoin => RepairAction::RejoinNetwork {
            network_id: ctx.network_id.clone(),
        },
        RepairStrategy::Targeted | RepairStrategy::Corroborate => RepairAction::DeleteEntries {
            table,
            network_id: ctx.network_id.clone(),
            keys,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn group(address: &str, owners: &[(&str, &[&str])]) -> ConflictGroup {
        ConflictGroup {
            address: address.into(),
            owners_to_keys: owners
                .iter()
                .map(|(owner, keys)| {
                    (
                        owner.to_string(),
                        keys.iter().map(|k| k.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    fn ctx(own: &str, local: &[&str]) -> NetworkContext {
        let peers: BTreeMap<String, String> = [
            ("node-a", "192.168.0.1"),
            ("node-b", "192.168.0.2"),
            ("node-c", "192.168.0.3"),
        ]
        .into_iter()
        .map(|(n, ip)| (n.to_string(), ip.to_string()))
        .collect();
        NetworkContext {
            network_id: "net1".into(),
            network_name: "backend".into(),
            own_peer_name: Some(own.into()),
            peer_name_to_address: peers,
            local_container_addresses: local.iter().map(|a| a.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    fn targeted(ctx: &NetworkContext, group: &ConflictGroup) -> Vec<RepairAction> {
        decide(RepairStrategy::Targeted, TableName::EndpointTable, ctx, group)
    }

    #[test]
    fn single_owner_group_yields_nothing() {
        let g = group("10.0.0.5", &[("node-b", &["k2"])]);
        assert!(targeted(&ctx("node-a", &[]), &g).is_empty());
    }

    #[test]
    fn stale_own_claim_deletes_only_own_keys() {
        let g = group("10.0.0.5", &[("node-a", &["k1", "k3"]), ("node-b", &["k2"])]);
        let actions = targeted(&ctx("node-a", &[]), &g);
        assert_eq!(
            actions,
            vec![
                RepairAction::DeleteEntries {
                    table: TableName::EndpointTable,
                    network_id: "net1".into(),
                    keys: vec!["k1".into(), "k3".into()],
                },
                RepairAction::RequestPeerVerification {
                    peer_address: "192.168.0.2".into(),
                    network_id: "net1".into(),
                    candidate_addresses: vec!["10.0.0.5".into()],
                },
            ]
        );
    }

    #[test]
    fn live_own_claim_is_left_alone() {
        let g = group("10.0.0.5", &[("node-a", &["k1"]), ("node-b", &["k2"])]);
        let actions = targeted(&ctx("node-a", &["10.0.0.5"]), &g);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], RepairAction::RequestPeerVerification { .. }));
    }

    #[test]
    fn bystander_asks_every_owner() {
        let g = group("10.0.0.5", &[("node-a", &["k1"]), ("node-b", &["k2"])]);
        let actions = targeted(&ctx("node-c", &[]), &g);
        let targets: Vec<&str> = actions
            .iter()
            .map(|a| match a {
                RepairAction::RequestPeerVerification { peer_address, .. } => {
                    peer_address.as_str()
                }
                other => panic!("unexpected action {other:?}"),
            })
            .collect();
        assert_eq!(targets, vec!["192.168.0.1", "192.168.0.2"]);
    }

    #[test]
    fn unknown_owner_is_skipped() {
        let g = group("10.0.0.5", &[("node-a", &["k1"]), ("node-gone", &["k2"])]);
        let actions = targeted(&ctx("node-c", &[]), &g);
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            RepairAction::RequestPeerVerification { peer_address, .. } if peer_address == "192.168.0.1"
        ));
    }

    #[test]
    fn corroborate_strategy_carries_keys() {
        let g = group("10.0.0.5", &[("node-a", &["k1"]), ("node-b", &["k2"])]);
        let actions = decide(
            RepairStrategy::Corroborate,
            TableName::OverlayPeerTable,
            &ctx("node-a", &["10.0.0.5"]),
            &g,
        );
        assert_eq!(
            actions,
            vec![RepairAction::CorroboratePeerClaim {
                peer_address: "192.168.0.2".into(),
                network_id: "net1".into(),
                table: TableName::OverlayPeerTable,
                address: "10.0.0.5".into(),
                keys: vec!["k2".into()],
            }]
        );
    }

    #[test]
    fn rejoin_strategy_replaces_deletion() {
        let g = group("10.0.0.5", &[("node-a", &["k1"]), ("node-b", &["k2"])]);
        let actions = decide(
            RepairStrategy::Rejoin,
            TableName::EndpointTable,
            &ctx("node-a", &[]),
            &g,
        );
        assert_eq!(
            actions[0],
            RepairAction::RejoinNetwork {
                network_id: "net1".into()
            }
        );
    }

    fn own_entry(key: &str, owner: &str, address: &str) -> TableEntry {
        TableEntry {
            key: key.into(),
            owner: owner.into(),
            table: TableName::EndpointTable,
            decoded_address: address.into(),
        }
    }

    #[test]
    fn local_verification_deletes_own_stale_entries() {
        let entries = vec![
            own_entry("k1", "node-a", "10.0.0.5"),
            own_entry("k2", "node-b", "10.0.0.5"),
            own_entry("k3", "node-a", "10.0.0.7"),
            own_entry("k4", "node-a", "10.0.0.5"),
        ];
        let candidates = vec!["10.0.0.5".to_string()];
        assert_eq!(
            verify_local_claims(
                RepairStrategy::Targeted,
                TableName::EndpointTable,
                &ctx("node-a", &["10.0.0.9"]),
                &candidates,
                &entries,
            ),
            Some(RepairAction::DeleteEntries {
                table: TableName::EndpointTable,
                network_id: "net1".into(),
                keys: vec!["k1".into(), "k4".into()],
            })
        );
        assert_eq!(
            verify_local_claims(
                RepairStrategy::Rejoin,
                TableName::EndpointTable,
                &ctx("node-a", &[]),
                &candidates,
                &entries,
            ),
            Some(RepairAction::RejoinNetwork {
                network_id: "net1".into()
            })
        );
    }

    #[test]
    fn local_verification_keeps_backed_or_foreign_claims() {
        let entries = vec![own_entry("k1", "node-a", "10.0.0.5")];
        let candidates = vec!["10.0.0.5".to_string(), "10.0.0.9".to_string()];
        // one candidate is backed
        assert_eq!(
            verify_local_claims(
                RepairStrategy::Targeted,
                TableName::EndpointTable,
                &ctx("node-a", &["10.0.0.9"]),
                &candidates,
                &entries,
            ),
            None
        );
        // no entries owned by us
        assert_eq!(
            verify_local_claims(
                RepairStrategy::Targeted,
                TableName::EndpointTable,
                &ctx("node-b", &[]),
                &candidates,
                &entries,
            ),
            None
        );
        assert_eq!(
            verify_local_claims(
                RepairStrategy::Targeted,
                TableName::EndpointTable,
                &ctx("node-a", &[]),
                &[],
                &entries,
            ),
            None
        );
    }
}
