use crate::libs::phylo::node::NodeId;
use crate::libs::phylo::tree::Tree;
use anyhow::Result;
use intspan::NamedMatrix;
use std::collections::HashMap;

/// Build a tree from a PHYLIP distance matrix using Neighbor-Joining.
pub fn nj(matrix: &NamedMatrix) -> Result<Tree> {
    let names: Vec<String> = matrix.get_names().into_iter().cloned().collect();
    let n = names.len();

    let mut dist = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            dist[i][j] = matrix.get(i, j) as f64;
        }
    }

    nj_from_matrix(&names, &dist)
}

/// Neighbor-Joining over an explicit symmetric distance matrix.
///
/// The classical agglomerative scheme: at each of n-2 iterations compute
/// Q(i,j) = (m-2)*d(i,j) - r(i) - r(j) over the m active clusters (r is the
/// total divergence of a cluster), join the minimum-Q pair under a fresh
/// node with the standard branch lengths, and update distances to the new
/// cluster with d(u,k) = (d(i,k) + d(j,k) - d(i,j)) / 2. The final two
/// clusters are joined as siblings under the root.
///
/// Ties on Q break toward the smaller plain distance, then toward the
/// lexicographically smallest pair of cluster representative names, so the
/// output never depends on iteration order. (With three clusters left every
/// pair has the same Q; the distance criterion is what picks the genuine
/// cherry there.)
pub fn nj_from_matrix(names: &[String], dist: &[Vec<f64>]) -> Result<Tree> {
    let n = names.len();

    if n == 0 {
        return Ok(Tree::new());
    }
    if n == 1 {
        let mut tree = Tree::new();
        let root = tree.add_node();
        tree.set_root(root);
        tree.get_node_mut(root).unwrap().name = Some(names[0].clone());
        return Ok(tree);
    }

    let mut tree = Tree::new();

    // Active clusters, each a NodeId in the growing tree.
    let mut active: Vec<NodeId> = Vec::with_capacity(n);
    // Representative name of each cluster: the lexicographically smallest
    // leaf name it contains. Indexed by NodeId.
    let mut reps: Vec<String> = Vec::with_capacity(2 * n);

    for name in names {
        let id = tree.add_node();
        tree.get_node_mut(id).unwrap().name = Some(name.clone());
        active.push(id);
        reps.push(name.clone());
    }

    // Distances between cluster NodeIds, keyed (min, max).
    let mut dists: HashMap<(NodeId, NodeId), f64> = HashMap::new();
    for i in 0..n {
        for j in (i + 1)..n {
            dists.insert((active[i], active[j]), dist[i][j]);
        }
    }

    let d_of = |dists: &HashMap<(NodeId, NodeId), f64>, a: NodeId, b: NodeId| -> f64 {
        if a == b {
            0.0
        } else {
            *dists.get(&(a.min(b), a.max(b))).unwrap_or(&0.0)
        }
    };

    while active.len() > 2 {
        let m = active.len();

        // Total divergence of each active cluster
        let mut r: HashMap<NodeId, f64> = HashMap::new();
        for &a in &active {
            let sum: f64 = active.iter().map(|&b| d_of(&dists, a, b)).sum();
            r.insert(a, sum);
        }

        // Minimum-Q pair
        let mut best: Option<(f64, usize, usize)> = None;
        for i in 0..m {
            for j in (i + 1)..m {
                let (a, b) = (active[i], active[j]);
                let d = d_of(&dists, a, b);
                let q = (m as f64 - 2.0) * d - r[&a] - r[&b];

                let better = match best {
                    None => true,
                    Some((bq, bi, bj)) => {
                        let (pa, pb) = (active[bi], active[bj]);
                        let bd = d_of(&dists, pa, pb);
                        if q < bq - 1e-12 {
                            true
                        } else if q > bq + 1e-12 {
                            false
                        } else if d < bd - 1e-12 {
                            true
                        } else if d > bd + 1e-12 {
                            false
                        } else {
                            // Lexicographic tie-break on representative names
                            pair_key(&reps[a], &reps[b]) < pair_key(&reps[pa], &reps[pb])
                        }
                    }
                };
                if better {
                    best = Some((q, i, j));
                }
            }
        }

        let (_, idx1, idx2) = best.unwrap();
        let (id1, id2) = (active[idx1], active[idx2]);
        let d12 = d_of(&dists, id1, id2);

        // Branch lengths to the new internal node
        let len1 = d12 / 2.0 + (r[&id1] - r[&id2]) / (2.0 * (m as f64 - 2.0));
        let len2 = d12 - len1;

        let new_node = tree.add_node();
        tree.add_child(new_node, id1).map_err(|e| anyhow::anyhow!(e))?;
        tree.add_child(new_node, id2).map_err(|e| anyhow::anyhow!(e))?;
        tree.get_node_mut(id1).unwrap().length = Some(len1);
        tree.get_node_mut(id2).unwrap().length = Some(len2);

        let rep = reps[id1].clone().min(reps[id2].clone());
        reps.push(rep);

        // Distances from the new cluster to the remaining ones
        let mut new_dists = Vec::new();
        for (k_idx, &other) in active.iter().enumerate() {
            if k_idx == idx1 || k_idx == idx2 {
                continue;
            }
            let d = (d_of(&dists, id1, other) + d_of(&dists, id2, other) - d12) / 2.0;
            new_dists.push((other, d));
        }

        // Remove merged clusters (larger index first to avoid shifting)
        active.remove(idx2);
        active.remove(idx1);

        active.push(new_node);
        for (other, d) in new_dists {
            dists.insert((new_node.min(other), new_node.max(other)), d);
        }
    }

    // Join the final two clusters as siblings under the root.
    let root = tree.add_node();
    let (id1, id2) = (active[0], active[1]);
    let d12 = d_of(&dists, id1, id2);
    tree.add_child(root, id1).map_err(|e| anyhow::anyhow!(e))?;
    tree.add_child(root, id2).map_err(|e| anyhow::anyhow!(e))?;
    tree.get_node_mut(id1).unwrap().length = Some(d12 / 2.0);
    tree.get_node_mut(id2).unwrap().length = Some(d12 / 2.0);
    tree.set_root(root);

    Ok(tree)
}

fn pair_key<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
