//! Consistent-hash ring construction and the `hashOrder` placement walk.

use std::collections::HashSet;

use cask_core::RING_REPLICAS_PER_NODE;

use crate::node::Node;

/// One virtual token: a node paired with one of its 16 hash positions.
#[derive(Debug, Clone)]
pub struct RingEntry {
    pub node: Node,
    pub hash: String,
}

/// All virtual tokens of `nodes`, sorted by hash ascending. `nodes` should
/// already include `Myself` where callers want it considered for placement.
pub fn build_ring(nodes: &[Node]) -> Vec<RingEntry> {
    let mut entries: Vec<RingEntry> = nodes
        .iter()
        .flat_map(|n| {
            n.hash_keys().into_iter().map(|hash| RingEntry {
                node: n.clone(),
                hash,
            })
        })
        .collect();
    entries.sort_by(|a, b| a.hash.cmp(&b.hash));
    entries
}

/// Same as [`build_ring`] but only over writeable nodes.
pub fn build_write_ring(nodes: &[Node]) -> Vec<RingEntry> {
    let writeable: Vec<Node> = nodes.iter().filter(|n| n.writeable).cloned().collect();
    build_ring(&writeable)
}

/// The placement walk: rotate `ring` so the first entry whose
/// `"sha1:" + hash` lexicographically exceeds `hash` comes first, then walk
/// forward collecting distinct nodes by UUID until `size` are found.
///
/// Comparison is over strings, not numeric values — this is observable
/// behavior that must match across every node's placement decision.
pub fn hash_order(hash: &str, size: usize, ring: &[RingEntry]) -> Vec<Node> {
    if ring.is_empty() {
        return Vec::new();
    }

    let pivot = ring
        .iter()
        .position(|entry| format!("sha1:{}", entry.hash).as_str() > hash)
        .unwrap_or(0);

    let reordered = ring[pivot..].iter().chain(ring[..pivot].iter());

    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(size);
    for entry in reordered {
        if result.len() >= size {
            break;
        }
        if seen.insert(entry.node.uuid.clone()) {
            result.push(entry.node.clone());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(uuid: &str) -> Node {
        Node::new(uuid, format!("http://{uuid}"), true)
    }

    #[test]
    fn ring_length_is_sixteen_times_member_count() {
        let nodes = vec![node("a"), node("b"), node("c")];
        let ring = build_ring(&nodes);
        assert_eq!(ring.len(), RING_REPLICAS_PER_NODE * 3);
    }

    #[test]
    fn hash_order_matches_spec_example() {
        let nodes = vec![node("a"), node("b"), node("c")];
        let ring = build_ring(&nodes);
        let hash = "sha1:a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";
        let order = hash_order(hash, 3, &ring);
        let uuids: Vec<&str> = order.iter().map(|n| n.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["a", "b", "c"]);
    }

    #[test]
    fn hash_order_returns_consistent_permutation_for_same_snapshot() {
        let nodes = vec![node("a"), node("b"), node("c"), node("d")];
        let ring = build_ring(&nodes);
        let hash = "sha1:deadbeefdeadbeefdeadbeefdeadbeefdeadbeef";
        let first = hash_order(hash, 4, &ring);
        let second = hash_order(hash, 4, &ring);
        assert_eq!(
            first.iter().map(|n| &n.uuid).collect::<Vec<_>>(),
            second.iter().map(|n| &n.uuid).collect::<Vec<_>>()
        );
    }

    #[test]
    fn hash_order_deduplicates_by_uuid() {
        let nodes = vec![node("a"), node("b")];
        let ring = build_ring(&nodes);
        let order = hash_order("sha1:0000000000000000000000000000000000000000", 5, &ring);
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn write_ring_excludes_non_writeable() {
        let mut b = node("b");
        b.writeable = false;
        let nodes = vec![node("a"), b];
        let ring = build_write_ring(&nodes);
        assert_eq!(ring.len(), RING_REPLICAS_PER_NODE);
        assert!(ring.iter().all(|e| e.node.uuid == "a"));
    }
}
