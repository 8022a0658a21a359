//! Static shard assignment table

use std::collections::{BTreeMap, HashMap};

use crate::peer::{PeerKey, ShardId};

/// Peers statically expected in each shard.
///
/// Immutable once built; the monitor reads it without locking.
#[derive(Clone, Debug, Default)]
pub struct ShardAssignment {
    shards: BTreeMap<ShardId, Vec<PeerKey>>,
    index: HashMap<PeerKey, ShardId>,
}

impl ShardAssignment {
    /// Builds the table from a shard to peers mapping.
    ///
    /// A peer listed under several shards resolves to the lowest shard id.
    pub fn new<I, P>(shards: I) -> Self
    where
        I: IntoIterator<Item = (ShardId, P)>,
        P: IntoIterator<Item = PeerKey>,
    {
        let mut table: BTreeMap<ShardId, Vec<PeerKey>> = BTreeMap::new();
        for (shard_id, peers) in shards {
            table.entry(shard_id).or_default().extend(peers);
        }

        let mut index = HashMap::new();
        for (shard_id, peers) in &table {
            for peer in peers {
                index.entry(peer.clone()).or_insert(*shard_id);
            }
        }

        Self {
            shards: table,
            index,
        }
    }

    /// Shard the peer is statically assigned to, if any.
    #[must_use]
    pub fn shard_of(&self, peer: &PeerKey) -> Option<ShardId> {
        self.index.get(peer).copied()
    }

    /// Whether no peer is assigned to any shard.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of distinct assigned peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Iterates over `(shard, peer)` pairs in shard order.
    pub fn iter(&self) -> impl Iterator<Item = (ShardId, &PeerKey)> {
        self.shards
            .iter()
            .flat_map(|(shard_id, peers)| peers.iter().map(move |peer| (*shard_id, peer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let table = ShardAssignment::new([
            (0, vec![PeerKey::from("a"), PeerKey::from("b")]),
            (1, vec![PeerKey::from("c")]),
        ]);

        assert_eq!(table.shard_of(&PeerKey::from("b")), Some(0));
        assert_eq!(table.shard_of(&PeerKey::from("c")), Some(1));
        assert_eq!(table.shard_of(&PeerKey::from("z")), None);
        assert_eq!(table.len(), 3);
        assert_eq!(table.iter().count(), 3);
    }

    #[test]
    fn test_shards_without_peers_are_empty() {
        let table = ShardAssignment::new([(0, Vec::<PeerKey>::new()), (4, Vec::new())]);

        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_peer_resolves_to_lowest_shard() {
        let table = ShardAssignment::new([
            (3, vec![PeerKey::from("a")]),
            (1, vec![PeerKey::from("a")]),
        ]);

        assert_eq!(table.shard_of(&PeerKey::from("a")), Some(1));
    }
}
