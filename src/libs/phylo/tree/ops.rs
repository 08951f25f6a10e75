use super::Tree;
use crate::libs::phylo::node::NodeId;
use std::collections::HashSet;

/// Add a child to a parent node.
/// Updates both parent's `children` list and child's `parent` field.
pub fn add_child(tree: &mut Tree, parent_id: NodeId, child_id: NodeId) -> Result<(), String> {
    // Validation
    if parent_id == child_id {
        return Err("Cannot add node as child of itself".to_string());
    }
    if tree.get_node(parent_id).is_none() {
        return Err(format!("Parent node {} not found or deleted", parent_id));
    }
    if tree.get_node(child_id).is_none() {
        return Err(format!("Child node {} not found or deleted", child_id));
    }

    // Check if child already has a parent
    let child_parent = tree.nodes[child_id].parent;
    if let Some(old_parent) = child_parent {
        return Err(format!(
            "Node {} already has parent {}",
            child_id, old_parent
        ));
    }

    // Link
    tree.nodes[child_id].parent = Some(parent_id);
    tree.nodes[parent_id].children.push(child_id);

    Ok(())
}

/// Unlink a child from its parent. The child keeps its subtree and
/// becomes detached (parent = None); it is NOT deleted.
pub fn detach_child(tree: &mut Tree, parent_id: NodeId, child_id: NodeId) -> Result<(), String> {
    if tree.get_node(parent_id).is_none() {
        return Err(format!("Parent node {} not found or deleted", parent_id));
    }
    if tree.nodes.get(child_id).map(|n| n.parent) != Some(Some(parent_id)) {
        return Err(format!(
            "Node {} is not a child of node {}",
            child_id, parent_id
        ));
    }

    tree.nodes[parent_id].children.retain(|&c| c != child_id);
    tree.nodes[child_id].parent = None;

    Ok(())
}

/// Soft remove a node and its descendants (optional recursive).
/// If recursive is false, children are orphaned (parent set to None).
pub fn remove_node(tree: &mut Tree, id: NodeId, recursive: bool) {
    if id >= tree.nodes.len() || tree.nodes[id].deleted {
        return;
    }

    // 1. Handle parent relation
    if let Some(parent_id) = tree.nodes[id].parent {
        if let Some(parent) = tree.get_node_mut(parent_id) {
            parent.children.retain(|&child| child != id);
        }
    }

    // 2. Handle children
    let children = tree.nodes[id].children.clone();
    for child_id in children {
        if recursive {
            remove_node(tree, child_id, true);
        } else {
            if let Some(child) = tree.get_node_mut(child_id) {
                child.parent = None;
            }
        }
    }

    // 3. Mark as deleted
    if let Some(node) = tree.get_node_mut(id) {
        node.deleted = true;
        node.children.clear();
        node.parent = None;
    }

    // 4. Update root if needed
    if tree.root == Some(id) {
        tree.root = None;
    }
}

/// Collapse a node, removing it and connecting its children to its parent.
/// Edge lengths are summed (parent->node + node->child).
/// This is the binary contraction used to remove single-child nodes.
pub fn collapse_node(tree: &mut Tree, id: NodeId) -> Result<(), String> {
    if tree.get_node(id).is_none() {
        return Err(format!("Node {} not found", id));
    }
    if tree.root == Some(id) {
        return Err("Cannot collapse root node".to_string());
    }

    // 1. Get info
    let (parent_id, parent_edge) = {
        let node = tree.get_node(id).unwrap();
        // Checked root above, so parent must exist
        (node.parent.unwrap(), node.length)
    };

    let children_info: Vec<(NodeId, Option<f64>)> = {
        let node = tree.get_node(id).unwrap();
        node.children
            .iter()
            .map(|&c| (c, tree.nodes[c].length))
            .collect()
    };

    // 2. Re-parent children
    let mut new_children_ids = Vec::new();
    for (child_id, child_edge) in children_info {
        let new_edge = match (parent_edge, child_edge) {
            (Some(p), Some(c)) => Some(p + c),
            (Some(p), None) => Some(p),
            (None, Some(c)) => Some(c),
            (None, None) => None,
        };

        if let Some(child) = tree.get_node_mut(child_id) {
            child.parent = Some(parent_id);
            child.length = new_edge;
        }
        new_children_ids.push(child_id);
    }

    // 3. Splice children into parent's list at the collapsed position
    if let Some(parent) = tree.get_node_mut(parent_id) {
        if let Some(pos) = parent.children.iter().position(|&x| x == id) {
            parent.children.splice(pos..pos + 1, new_children_ids);
        }
    }

    // 4. Mark deleted
    if let Some(node) = tree.get_node_mut(id) {
        node.deleted = true;
        node.children.clear();
        node.parent = None;
    }

    Ok(())
}

/// Compact the tree by removing soft-deleted nodes and remapping IDs.
/// This invalidates all existing NodeIds held outside!
pub fn compact(tree: &mut Tree) {
    let mut old_to_new = std::collections::HashMap::new();
    let mut new_nodes = Vec::with_capacity(tree.nodes.len());
    let mut new_idx = 0;

    // 1. Build mapping and new node list (without edges first)
    for old_node in &tree.nodes {
        if !old_node.deleted {
            old_to_new.insert(old_node.id, new_idx);
            let mut new_node = old_node.clone();
            new_node.id = new_idx;
            new_node.parent = None;
            new_node.children.clear();
            new_nodes.push(new_node);
            new_idx += 1;
        }
    }

    // 2. Reconstruct edges using the mapping
    for (old_idx, node) in tree.nodes.iter().enumerate() {
        if node.deleted {
            continue;
        }

        let new_self_idx = *old_to_new.get(&old_idx).unwrap();

        if let Some(old_parent) = node.parent {
            if let Some(&new_parent) = old_to_new.get(&old_parent) {
                new_nodes[new_self_idx].parent = Some(new_parent);
            }
        }

        for &old_child in &node.children {
            if let Some(&new_child) = old_to_new.get(&old_child) {
                new_nodes[new_self_idx].children.push(new_child);
            }
        }
    }

    // 3. Update root
    if let Some(old_root) = tree.root {
        tree.root = old_to_new.get(&old_root).copied();
    }

    // 4. Swap
    tree.nodes = new_nodes;
}

/// Check structural invariants after mutation.
///
/// A valid tree has exactly one root (no parent), every live node reachable
/// from it exactly once, symmetric parent/child links, and no internal node
/// with exactly one child (binary contraction required).
pub fn validate(tree: &Tree) -> Result<(), String> {
    let root = match tree.root {
        Some(r) => r,
        None => {
            if tree.is_empty() {
                return Ok(());
            }
            return Err("Tree has live nodes but no root".to_string());
        }
    };

    if tree.get_node(root).is_none() {
        return Err(format!("Root {} is deleted", root));
    }
    if tree.nodes[root].parent.is_some() {
        return Err(format!("Root {} has a parent", root));
    }

    // Walk from root; a node seen twice means a cycle or a shared child.
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            return Err(format!("Node {} reachable more than once", id));
        }
        let node = tree
            .get_node(id)
            .ok_or_else(|| format!("Deleted node {} is still linked", id))?;

        if !node.is_leaf() && node.children.len() == 1 {
            return Err(format!("Internal node {} has exactly one child", id));
        }

        for &child in &node.children {
            match tree.get_node(child) {
                Some(c) if c.parent == Some(id) => stack.push(child),
                Some(_) => {
                    return Err(format!(
                        "Child {} does not point back to parent {}",
                        child, id
                    ))
                }
                None => return Err(format!("Node {} links deleted child {}", id, child)),
            }
        }
    }

    // Every live node must have been reached.
    for node in tree.nodes.iter().filter(|n| !n.deleted) {
        if !seen.contains(&node.id) {
            return Err(format!("Node {} is disconnected from the root", node.id));
        }
        if node.id != root && node.parent.is_none() {
            return Err(format!("Non-root node {} has no parent", node.id));
        }
    }

    Ok(())
}
