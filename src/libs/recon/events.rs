use super::config::ResolveConfig;
use super::mapping::{GeneMapping, SpeciesIndex};
use crate::libs::phylo::node::NodeId;
use crate::libs::phylo::tree::Tree;

/// Classification of an internal gene node against the species tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Speciation,
    Duplication,
}

/// Aggregated reconciliation cost of a (sub)tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cost {
    pub duplications: usize,
    pub losses: usize,
}

impl Cost {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn add(&mut self, other: Cost) {
        self.duplications += other.duplications;
        self.losses += other.losses;
    }

    /// Weighted total under the configured event weights.
    pub fn weighted(&self, cfg: &ResolveConfig) -> f64 {
        self.duplications as f64 * cfg.dup_weight + self.losses as f64 * cfg.loss_weight
    }
}

/// A gene node is a duplication iff its species image equals the image of
/// at least one child; the mapping then fails to strictly descend.
pub fn classify(gene: &Tree, mapping: &GeneMapping, node: NodeId) -> Event {
    let image = match mapping.image(node) {
        Some(img) => img,
        None => return Event::Speciation,
    };

    let children = match gene.get_node(node) {
        Some(n) if !n.is_leaf() => &n.children,
        _ => return Event::Speciation,
    };

    for &child in children {
        if mapping.image(child) == Some(image) {
            return Event::Duplication;
        }
    }
    Event::Speciation
}

/// Losses on one gene edge: the number of species-tree edges strictly
/// between the parent's image and the child's image (0 if equal or
/// adjacent). The child image must be a descendant-or-equal of the
/// parent image (mapping monotonicity).
pub fn edge_losses(sp: &SpeciesIndex, parent_img: NodeId, child_img: NodeId) -> usize {
    (sp.depth(child_img) - sp.depth(parent_img)).saturating_sub(1)
}

/// Duplication and loss counts for the subtree under `root`, in one
/// bottom-up pass over the precomputed mapping.
pub fn subtree_cost(
    gene: &Tree,
    mapping: &GeneMapping,
    sp: &SpeciesIndex,
    root: NodeId,
) -> Cost {
    let mut cost = Cost::zero();

    for id in crate::libs::phylo::tree::traversal::postorder(gene, root) {
        let node = match gene.get_node(id) {
            Some(n) => n,
            None => continue,
        };
        if node.is_leaf() {
            continue;
        }

        if classify(gene, mapping, id) == Event::Duplication {
            cost.duplications += 1;
        }

        let image = mapping.image(id).unwrap();
        for &child in &node.children {
            cost.losses += edge_losses(sp, image, mapping.image(child).unwrap());
        }
    }

    cost
}

/// Annotate internal nodes with their event as an NHX `D` tag
/// (`D=Y` duplication, `D=N` speciation).
pub fn annotate_events(gene: &mut Tree, mapping: &GeneMapping) {
    let root = match gene.get_root() {
        Some(r) => r,
        None => return,
    };

    let internals: Vec<NodeId> = gene
        .postorder(&root)
        .unwrap_or_default()
        .into_iter()
        .filter(|&id| gene.get_node(id).map(|n| !n.is_leaf()).unwrap_or(false))
        .collect();

    for id in internals {
        let tag = match classify(gene, mapping, id) {
            Event::Duplication => "Y",
            Event::Speciation => "N",
        };
        if let Some(node) = gene.get_node_mut(id) {
            node.add_property("D", tag);
        }
    }
}
