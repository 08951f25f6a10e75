use super::Tree;
use crate::libs::phylo::node::NodeId;

/// Get IDs of all leaves in subtree rooted at `id`.
pub fn get_leaves(tree: &Tree, id: NodeId) -> Vec<NodeId> {
    let mut leaves = Vec::new();
    let mut stack = vec![id];

    while let Some(curr) = stack.pop() {
        if let Some(node) = tree.get_node(curr) {
            if node.children.is_empty() {
                leaves.push(curr);
            } else {
                for &child in &node.children {
                    stack.push(child);
                }
            }
        }
    }
    leaves
}

/// Get names of all leaves in subtree.
pub fn get_leaf_names(tree: &Tree, id: NodeId) -> Vec<Option<String>> {
    get_leaves(tree, id)
        .into_iter()
        .map(|leaf_id| tree.get_node(leaf_id).and_then(|n| n.name.clone()))
        .collect()
}

/// Check if tree is binary (all internal nodes have exactly 2 children).
pub fn is_binary(tree: &Tree) -> bool {
    tree.nodes
        .iter()
        .all(|n| n.deleted || n.children.is_empty() || n.children.len() == 2)
}

/// IDs of all multifurcating nodes (more than 2 children), in postorder.
///
/// Postorder matters to callers: resolving a polytomy must never be
/// attempted before the polytomies below it have been handled.
pub fn polytomies(tree: &Tree) -> Vec<NodeId> {
    let root = match tree.get_root() {
        Some(r) => r,
        None => return Vec::new(),
    };

    super::traversal::postorder(tree, root)
        .into_iter()
        .filter(|&id| {
            tree.get_node(id)
                .map(|n| n.children.len() > 2)
                .unwrap_or(false)
        })
        .collect()
}

