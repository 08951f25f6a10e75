use super::Tree;
use crate::libs::phylo::node::NodeId;
use std::io::Read;

/// Read all Newick trees from a file ("stdin" for standard input).
pub fn from_file(infile: &str) -> anyhow::Result<Vec<Tree>> {
    let mut reader = crate::libs::io::reader(infile);
    let mut newick = String::new();
    reader
        .read_to_string(&mut newick)
        .map_err(|e| anyhow::anyhow!("Read error: {}", e))?;
    Ok(Tree::from_newick_multi(newick.as_str())?)
}

/// Serialize tree to a single-line Newick string.
pub fn to_newick(tree: &Tree) -> String {
    if let Some(root) = tree.get_root() {
        let mut s = to_newick_recursive(tree, root);
        s.push(';');
        s
    } else {
        ";".to_string()
    }
}

fn to_newick_recursive(tree: &Tree, node_id: NodeId) -> String {
    let node = tree.get_node(node_id).unwrap();

    // Node info: Label + Length + NHX properties
    let mut node_info = String::new();

    if let Some(name) = &node.name {
        node_info.push_str(&quote_label(name));
    }

    if let Some(len) = node.length {
        node_info.push_str(&format!(":{}", len));
    }

    if let Some(props) = &node.properties {
        if !props.is_empty() {
            node_info.push_str("[&&NHX");
            for (k, v) in props {
                if v.is_empty() {
                    node_info.push_str(&format!(":{}", k));
                } else {
                    node_info.push_str(&format!(":{}={}", k, v));
                }
            }
            node_info.push(']');
        }
    }

    if node.children.is_empty() {
        node_info
    } else {
        let children_strs: Vec<String> = node
            .children
            .iter()
            .map(|&child| to_newick_recursive(tree, child))
            .collect();

        format!("({}){}", children_strs.join(","), node_info)
    }
}

fn quote_label(label: &str) -> String {
    let needs_quote = label.chars().any(|c| "(),:;[] \t\n".contains(c));
    if needs_quote {
        format!("'{}'", label)
    } else {
        label.to_string()
    }
}
