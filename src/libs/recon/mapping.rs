use super::error::ReconError;
use crate::libs::phylo::node::NodeId;
use crate::libs::phylo::tree::Tree;
use std::collections::BTreeMap;

/// Precomputed LCA index over a species tree.
///
/// Depths and binary-lifting ancestor tables are built once per species
/// tree; `lca` then answers in O(log n). All gene trees reconciled against
/// the same species tree share one index.
#[derive(Debug, Clone)]
pub struct SpeciesIndex {
    root: NodeId,
    depth: Vec<usize>,
    /// up[j][v] = 2^j-th ancestor of v (the root lifts to itself)
    up: Vec<Vec<NodeId>>,
    leaf_ids: BTreeMap<String, NodeId>,
}

impl SpeciesIndex {
    pub fn build(tree: &Tree) -> Result<Self, ReconError> {
        let root = tree
            .get_root()
            .ok_or_else(|| ReconError::Structure("species tree has no root".to_string()))?;

        tree.validate().map_err(ReconError::Structure)?;

        let n = tree
            .preorder(&root)
            .map_err(ReconError::Structure)?
            .iter()
            .map(|&id| id + 1)
            .max()
            .unwrap_or(0);

        let mut depth = vec![0usize; n];
        let mut parent = vec![root; n];

        // Preorder guarantees a parent is visited before its children.
        for id in tree.preorder(&root).map_err(ReconError::Structure)? {
            let node = tree.get_node(id).unwrap();
            if let Some(p) = node.parent {
                depth[id] = depth[p] + 1;
                parent[id] = p;
            }
        }

        let max_depth = depth.iter().copied().max().unwrap_or(0);
        let levels = usize::BITS as usize - max_depth.leading_zeros() as usize;
        let levels = levels.max(1);

        let mut up = Vec::with_capacity(levels);
        up.push(parent);
        for j in 1..levels {
            let prev = &up[j - 1];
            let level: Vec<NodeId> = (0..n).map(|v| prev[prev[v]]).collect();
            up.push(level);
        }

        // Species names live on the leaves.
        let mut leaf_ids = BTreeMap::new();
        for id in tree.get_leaves() {
            if let Some(name) = &tree.get_node(id).unwrap().name {
                leaf_ids.insert(name.clone(), id);
            }
        }

        Ok(Self {
            root,
            depth,
            up,
            leaf_ids,
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.depth[id]
    }

    /// Species leaf ID for a species name.
    pub fn leaf_id(&self, name: &str) -> Option<NodeId> {
        self.leaf_ids.get(name).copied()
    }

    /// Lift `id` up by `steps` ancestors.
    fn ancestor(&self, mut id: NodeId, mut steps: usize) -> NodeId {
        let mut j = 0;
        while steps > 0 {
            if steps & 1 == 1 {
                id = self.up[j][id];
            }
            steps >>= 1;
            j += 1;
        }
        id
    }

    /// Lowest common ancestor of two species nodes.
    pub fn lca(&self, a: NodeId, b: NodeId) -> NodeId {
        let (mut a, mut b) = (a, b);

        // Equalize depths
        if self.depth[a] > self.depth[b] {
            a = self.ancestor(a, self.depth[a] - self.depth[b]);
        } else if self.depth[b] > self.depth[a] {
            b = self.ancestor(b, self.depth[b] - self.depth[a]);
        }
        if a == b {
            return a;
        }

        // Binary descent: lift both while they remain distinct
        for j in (0..self.up.len()).rev() {
            if self.up[j][a] != self.up[j][b] {
                a = self.up[j][a];
                b = self.up[j][b];
            }
        }

        self.up[0][a]
    }

    /// True if `anc` is an ancestor of (or equal to) `desc`.
    pub fn is_ancestor_or_equal(&self, anc: NodeId, desc: NodeId) -> bool {
        if self.depth[desc] < self.depth[anc] {
            return false;
        }
        self.ancestor(desc, self.depth[desc] - self.depth[anc]) == anc
    }
}

/// The gene-node -> species-node mapping.
///
/// Total on all live gene nodes: leaves map to the species leaf named by
/// the extractor, internal nodes to the LCA of their children's images.
#[derive(Debug, Clone)]
pub struct GeneMapping {
    images: Vec<Option<NodeId>>,
}

impl GeneMapping {
    /// Infer the full mapping in one bottom-up pass.
    ///
    /// `extract` turns a gene leaf label into a species name; a label the
    /// extractor rejects, or a species name absent from the species tree,
    /// fails with the offending leaf identity.
    pub fn infer<F>(gene: &Tree, sp: &SpeciesIndex, extract: F) -> Result<Self, ReconError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = gene
            .get_root()
            .ok_or_else(|| ReconError::Structure("gene tree has no root".to_string()))?;

        let order = gene.postorder(&root).map_err(ReconError::Structure)?;
        let n = order.iter().map(|&id| id + 1).max().unwrap_or(0);
        let mut images: Vec<Option<NodeId>> = vec![None; n];

        for id in order {
            let node = gene.get_node(id).unwrap();

            let image = if node.is_leaf() {
                let label = node.name.as_deref().unwrap_or("");
                let species = extract(label).ok_or_else(|| ReconError::Mapping {
                    leaf: label.to_string(),
                })?;
                sp.leaf_id(&species).ok_or_else(|| ReconError::Mapping {
                    leaf: label.to_string(),
                })?
            } else {
                // Children are already mapped (postorder)
                let mut iter = node.children.iter();
                let first = *iter.next().unwrap();
                let mut acc = images[first].unwrap();
                for &child in iter {
                    acc = sp.lca(acc, images[child].unwrap());
                }
                acc
            };

            images[id] = Some(image);
        }

        Ok(Self { images })
    }

    pub fn image(&self, gene_node: NodeId) -> Option<NodeId> {
        self.images.get(gene_node).copied().flatten()
    }

    /// Record the image of a freshly created gene node (refinement splice).
    pub fn set_image(&mut self, gene_node: NodeId, species_node: NodeId) {
        if gene_node >= self.images.len() {
            self.images.resize(gene_node + 1, None);
        }
        self.images[gene_node] = Some(species_node);
    }
}

/// Build a species-name extractor from a separator and a position flag,
/// the way gene labels like "HUMAN_BRCA2" or "BRCA2_HUMAN" encode their
/// species. A label without the separator is taken whole.
pub fn species_extractor(sep: String, prefix: bool) -> impl Fn(&str) -> Option<String> {
    move |label: &str| {
        if label.is_empty() {
            return None;
        }
        match label.split_once(sep.as_str()) {
            None => Some(label.to_string()),
            Some(_) => {
                let part = if prefix {
                    label.split(sep.as_str()).next()
                } else {
                    label.rsplit(sep.as_str()).next()
                };
                part.filter(|s| !s.is_empty()).map(|s| s.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn species_5() -> (Tree, SpeciesIndex) {
        let tree = Tree::from_newick("(((a,b)ab,c)abc,(d,e)de)r;").unwrap();
        let index = SpeciesIndex::build(&tree).unwrap();
        (tree, index)
    }

    #[test]
    fn test_lca_queries() {
        let (tree, index) = species_5();
        let id = |name: &str| tree.get_node_by_name(name).unwrap();

        assert_eq!(index.lca(id("a"), id("b")), id("ab"));
        assert_eq!(index.lca(id("a"), id("c")), id("abc"));
        assert_eq!(index.lca(id("a"), id("d")), id("r"));
        assert_eq!(index.lca(id("d"), id("e")), id("de"));
        assert_eq!(index.lca(id("ab"), id("c")), id("abc"));
        assert_eq!(index.lca(id("a"), id("a")), id("a"));
        assert_eq!(index.lca(id("r"), id("e")), id("r"));
    }

    #[test]
    fn test_depth_and_ancestry() {
        let (tree, index) = species_5();
        let id = |name: &str| tree.get_node_by_name(name).unwrap();

        assert_eq!(index.depth(id("r")), 0);
        assert_eq!(index.depth(id("abc")), 1);
        assert_eq!(index.depth(id("ab")), 2);
        assert_eq!(index.depth(id("a")), 3);

        assert!(index.is_ancestor_or_equal(id("abc"), id("a")));
        assert!(index.is_ancestor_or_equal(id("a"), id("a")));
        assert!(!index.is_ancestor_or_equal(id("de"), id("a")));
    }

    #[test]
    fn test_mapping_simple() {
        let (sp_tree, index) = species_5();
        let sid = |name: &str| sp_tree.get_node_by_name(name).unwrap();

        let gene = Tree::from_newick("((a_g1,b_g1)x,(a_g2,d_g1)y)z;").unwrap();
        let gid = |name: &str| gene.get_node_by_name(name).unwrap();

        let mapping =
            GeneMapping::infer(&gene, &index, species_extractor("_".to_string(), true)).unwrap();

        assert_eq!(mapping.image(gid("a_g1")), Some(sid("a")));
        assert_eq!(mapping.image(gid("x")), Some(sid("ab")));
        assert_eq!(mapping.image(gid("y")), Some(sid("r")));
        assert_eq!(mapping.image(gid("z")), Some(sid("r")));
    }

    #[test]
    fn test_mapping_monotone() {
        // Image of an ancestor is an ancestor-or-equal of the image of
        // any descendant.
        let (_, index) = species_5();
        let gene = Tree::from_newick("(((a_1,c_1),(b_1,b_2)),e_1);").unwrap();
        let mapping =
            GeneMapping::infer(&gene, &index, species_extractor("_".to_string(), true)).unwrap();

        let root = gene.get_root().unwrap();
        for id in gene.postorder(&root).unwrap() {
            let img = mapping.image(id).unwrap();
            let mut current = gene.get_node(id).unwrap().parent;
            while let Some(p) = current {
                let p_img = mapping.image(p).unwrap();
                assert!(index.is_ancestor_or_equal(p_img, img));
                current = gene.get_node(p).unwrap().parent;
            }
        }
    }

    #[test]
    fn test_mapping_unmatched_leaf() {
        let (_, index) = species_5();
        let gene = Tree::from_newick("(a_g1,marsian_g1);").unwrap();

        let err = GeneMapping::infer(&gene, &index, species_extractor("_".to_string(), true))
            .unwrap_err();
        match err {
            ReconError::Mapping { leaf } => assert_eq!(leaf, "marsian_g1"),
            other => panic!("expected Mapping error, got {:?}", other),
        }
    }

    #[test]
    fn test_species_extractor_positions() {
        let prefix = species_extractor("_".to_string(), true);
        assert_eq!(prefix("HUMAN_BRCA2"), Some("HUMAN".to_string()));
        assert_eq!(prefix("HUMAN"), Some("HUMAN".to_string()));

        let postfix = species_extractor("_".to_string(), false);
        assert_eq!(postfix("BRCA2_HUMAN"), Some("HUMAN".to_string()));
        assert_eq!(postfix("BRCA2_COPY_HUMAN"), Some("HUMAN".to_string()));
    }
}
