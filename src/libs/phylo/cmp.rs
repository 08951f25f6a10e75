use super::tree::Tree;
use fixedbitset::FixedBitSet;
use std::collections::{BTreeMap, HashSet};

/// Trait for tree comparison and topology analysis
pub trait TreeComparison {
    /// Get the set of all non-trivial splits (bipartitions) in the tree.
    ///
    /// Requires a `leaf_map` that maps leaf names to bit indices (0..N), so
    /// splits from different trees over the same taxa are comparable.
    /// Splits are normalized to always include the first taxon.
    fn get_splits(&self, leaf_map: &BTreeMap<String, usize>) -> HashSet<FixedBitSet>;

    /// Compute the unrooted Robinson-Foulds (RF) distance between two trees:
    /// the symmetric difference of non-trivial splits, |S1 \ S2| + |S2 \ S1|.
    /// Returns an error if the trees have different leaf sets.
    fn robinson_foulds(&self, other: &Self) -> Result<usize, String>;
}

impl TreeComparison for Tree {
    fn get_splits(&self, leaf_map: &BTreeMap<String, usize>) -> HashSet<FixedBitSet> {
        let mut splits = HashSet::new();
        let num_leaves = leaf_map.len();

        let root_id = match self.get_root() {
            Some(id) => id,
            None => return splits,
        };

        let nodes = match self.postorder(&root_id) {
            Ok(n) => n,
            Err(_) => return splits,
        };

        // NodeId -> set of leaves under this node
        let mut node_leaves: BTreeMap<usize, FixedBitSet> = BTreeMap::new();

        for node_id in nodes {
            let mut bitset = FixedBitSet::with_capacity(num_leaves);
            let node = self.get_node(node_id).unwrap();

            if node.is_leaf() {
                if let Some(name) = &node.name {
                    if let Some(&idx) = leaf_map.get(name) {
                        bitset.insert(idx);
                    }
                }
            } else {
                for child in &node.children {
                    if let Some(child_bs) = node_leaves.get(child) {
                        bitset.union_with(child_bs);
                    }
                }
            }

            // Bipartitions are unrooted. Convention: a normalized split
            // always contains taxon 0; complement otherwise.
            let mut normalized = bitset.clone();
            if num_leaves > 0 && !normalized.contains(0) {
                normalized.toggle_range(..num_leaves);
            }

            // After normalization the trivial cases are:
            // size 1 (a single leaf), size N (the root), size N-1
            // (the complement of some other leaf).
            let count = normalized.count_ones(..);
            let is_trivial = count <= 1 || count >= num_leaves - 1;

            if !is_trivial {
                splits.insert(normalized);
            }

            node_leaves.insert(node_id, bitset);
        }

        splits
    }

    fn robinson_foulds(&self, other: &Self) -> Result<usize, String> {
        let leaves_self: HashSet<_> = self.get_leaf_names().into_iter().flatten().collect();
        let leaves_other: HashSet<_> = other.get_leaf_names().into_iter().flatten().collect();

        if leaves_self != leaves_other {
            let mut diff1: Vec<_> = leaves_self.difference(&leaves_other).collect();
            diff1.sort();
            let mut diff2: Vec<_> = leaves_other.difference(&leaves_self).collect();
            diff2.sort();

            return Err(format!(
                "Trees have different leaf sets.\nIn Tree1 only: {:?}\nIn Tree2 only: {:?}",
                diff1, diff2
            ));
        }

        if leaves_self.is_empty() {
            return Ok(0);
        }

        // Canonical name -> index map, sorted for stability
        let mut sorted_leaves: Vec<_> = leaves_self.into_iter().collect();
        sorted_leaves.sort();

        let mut leaf_map = BTreeMap::new();
        for (i, name) in sorted_leaves.into_iter().enumerate() {
            leaf_map.insert(name, i);
        }

        let splits_self = self.get_splits(&leaf_map);
        let splits_other = other.get_splits(&leaf_map);

        let intersection_count = splits_self.intersection(&splits_other).count();
        let rf = splits_self.len() + splits_other.len() - 2 * intersection_count;

        Ok(rf)
    }
}
