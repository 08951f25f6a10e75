use super::config::TieBreakMetric;
use super::enumerate::{Shape, ShapeNode};
use crate::libs::phylo::build;
use crate::libs::phylo::tree::Tree;
use fixedbitset::FixedBitSet;
use intspan::NamedMatrix;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};

/// Everything the tie breaker needs to know about one polytomy.
pub struct TieContext<'a> {
    /// Representative label per child (canonical ordering input)
    pub labels: &'a [String],
    /// Gene leaf names under each child (distance matrix lookup)
    pub child_leaves: &'a [Vec<String>],
    pub matrix: Option<&'a NamedMatrix>,
    pub metric: TieBreakMetric,
}

/// Select exactly one candidate out of a cost-tied set.
///
/// With a usable distance matrix: build the NJ reference tree over the
/// polytomy's children and keep the candidate agreeing best with it,
/// canonical order breaking exact agreement ties. Without one (or with a
/// matrix that does not cover every leaf): canonical order alone, reported
/// as a fallback rather than silently.
///
/// Returns (winner index, fallback used).
pub fn break_tie(candidates: &[Shape], ctx: &TieContext) -> (usize, bool) {
    debug_assert!(!candidates.is_empty());

    let k = ctx.labels.len();

    let reference = ctx
        .matrix
        .and_then(|m| child_matrix(ctx.child_leaves, m))
        .and_then(|dist| nj_reference(k, &dist));

    let reference = match reference {
        Some(r) => r,
        None => return (canonical_winner(candidates, ctx.labels), true),
    };

    let mut best_idx = 0;
    let mut best_score = usize::MIN;
    let mut best_key = String::new();

    for (i, cand) in candidates.iter().enumerate() {
        let score = match ctx.metric {
            TieBreakMetric::Bipartition => clade_agreement(cand, &reference, k),
            TieBreakMetric::Quartet => quartet_agreement(cand, &reference, k),
        };
        let key = cand.canonical_key(ctx.labels);

        let better = score > best_score || (score == best_score && (i == 0 || key < best_key));
        if better {
            best_idx = i;
            best_score = score;
            best_key = key;
        }
    }

    (best_idx, false)
}

/// Index of the candidate with the smallest canonical key.
fn canonical_winner(candidates: &[Shape], labels: &[String]) -> usize {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| c.canonical_key(labels))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Average the leaf-level matrix into a k x k child-level matrix.
/// None if any leaf under any child is missing from the matrix.
fn child_matrix(child_leaves: &[Vec<String>], matrix: &NamedMatrix) -> Option<Vec<Vec<f64>>> {
    let names = matrix.get_names();
    let index: HashMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();

    let k = child_leaves.len();
    let mut idx_sets: Vec<Vec<usize>> = Vec::with_capacity(k);
    for leaves in child_leaves {
        if leaves.is_empty() {
            return None;
        }
        let mut ids = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            ids.push(*index.get(leaf.as_str())?);
        }
        idx_sets.push(ids);
    }

    let mut dist = vec![vec![0.0; k]; k];
    for i in 0..k {
        for j in (i + 1)..k {
            let mut sum = 0.0;
            for &a in &idx_sets[i] {
                for &b in &idx_sets[j] {
                    sum += matrix.get(a, b) as f64;
                }
            }
            let mean = sum / (idx_sets[i].len() * idx_sets[j].len()) as f64;
            dist[i][j] = mean;
            dist[j][i] = mean;
        }
    }

    Some(dist)
}

/// The NJ reference as (depth, clade) pairs for its internal nodes,
/// clades being bitsets over child indices 0..k.
fn nj_reference(k: usize, dist: &[Vec<f64>]) -> Option<Vec<(usize, FixedBitSet)>> {
    // Zero-padded index names keep NJ's lexicographic tie-breaks aligned
    // with plain child order.
    let names: Vec<String> = (0..k).map(|i| format!("{:06}", i)).collect();
    let tree = build::nj_from_matrix(&names, dist).ok()?;

    Some(tree_clades(&tree, k))
}

/// (depth, clade) pairs for every internal node of a tree whose leaves
/// are named with zero-padded child indices.
fn tree_clades(tree: &Tree, k: usize) -> Vec<(usize, FixedBitSet)> {
    let root = match tree.get_root() {
        Some(r) => r,
        None => return Vec::new(),
    };

    let mut depth: HashMap<usize, usize> = HashMap::new();
    depth.insert(root, 0);
    for id in tree.preorder(&root).unwrap_or_default() {
        if let Some(node) = tree.get_node(id) {
            if let Some(p) = node.parent {
                let d = depth[&p] + 1;
                depth.insert(id, d);
            }
        }
    }

    let mut sets: HashMap<usize, FixedBitSet> = HashMap::new();
    let mut clades = Vec::new();

    for id in tree.postorder(&root).unwrap_or_default() {
        let node = tree.get_node(id).unwrap();
        let mut bits = FixedBitSet::with_capacity(k);

        if node.is_leaf() {
            if let Some(idx) = node.name.as_deref().and_then(|n| n.parse::<usize>().ok()) {
                bits.insert(idx);
            }
        } else {
            for child in &node.children {
                if let Some(cb) = sets.get(child) {
                    bits.union_with(cb);
                }
            }
            clades.push((depth[&id], bits.clone()));
        }

        sets.insert(id, bits);
    }

    clades
}

/// (depth, clade) pairs for the joins of a candidate shape.
fn shape_clades(shape: &Shape, k: usize) -> Vec<(usize, FixedBitSet)> {
    let n = shape.len();
    let mut depth = vec![0usize; n];

    // Preorder: parents before children
    let mut stack = vec![shape.root()];
    while let Some(idx) = stack.pop() {
        if let ShapeNode::Join(a, b) = shape.node(idx) {
            depth[a] = depth[idx] + 1;
            depth[b] = depth[idx] + 1;
            stack.push(a);
            stack.push(b);
        }
    }

    let mut sets: Vec<FixedBitSet> = vec![FixedBitSet::with_capacity(k); n];
    let mut clades = Vec::new();

    for &idx in shape.postorder().iter() {
        match shape.node(idx) {
            ShapeNode::Leaf(i) => {
                sets[idx].insert(i);
            }
            ShapeNode::Join(a, b) => {
                let mut bits = sets[a].clone();
                bits.union_with(&sets[b]);
                sets[idx] = bits.clone();
                clades.push((depth[idx], bits));
            }
        }
    }

    clades
}

/// Number of non-trivial clades shared between a candidate and the
/// reference (both rooted over the same k children).
fn clade_agreement(cand: &Shape, reference: &[(usize, FixedBitSet)], k: usize) -> usize {
    let non_trivial = |clades: &[(usize, FixedBitSet)]| -> HashSet<FixedBitSet> {
        clades
            .iter()
            .filter(|(_, bits)| {
                let c = bits.count_ones(..);
                c >= 2 && c < k
            })
            .map(|(_, bits)| bits.clone())
            .collect()
    };

    let a = non_trivial(&shape_clades(cand, k));
    let b = non_trivial(reference);
    a.intersection(&b).count()
}

/// Number of child quartets resolved identically by candidate and
/// reference. A quartet {a,b,c,d} resolves to the pairing maximizing the
/// summed LCA depths of its two pairs.
fn quartet_agreement(cand: &Shape, reference: &[(usize, FixedBitSet)], k: usize) -> usize {
    let cand_depth = pair_lca_depths(&shape_clades(cand, k), k);
    let ref_depth = pair_lca_depths(reference, k);

    let mut agree = 0;
    for q in (0..k).combinations(4) {
        let (a, b, c, d) = (q[0], q[1], q[2], q[3]);
        if quartet_of(&cand_depth, a, b, c, d) == quartet_of(&ref_depth, a, b, c, d) {
            agree += 1;
        }
    }
    agree
}

/// For each pair of children, the depth of their LCA: the deepest clade
/// containing both.
fn pair_lca_depths(clades: &[(usize, FixedBitSet)], k: usize) -> Vec<Vec<usize>> {
    let mut depth = vec![vec![0usize; k]; k];

    for (d, bits) in clades {
        let members: Vec<usize> = bits.ones().collect();
        for (pos, &x) in members.iter().enumerate() {
            for &y in &members[pos + 1..] {
                if *d > depth[x][y] {
                    depth[x][y] = *d;
                    depth[y][x] = *d;
                }
            }
        }
    }

    depth
}

/// 0 = ab|cd, 1 = ac|bd, 2 = ad|bc
fn quartet_of(depth: &[Vec<usize>], a: usize, b: usize, c: usize, d: usize) -> usize {
    let s0 = depth[a][b] + depth[c][d];
    let s1 = depth[a][c] + depth[b][d];
    let s2 = depth[a][d] + depth[b][c];

    if s0 >= s1 && s0 >= s2 {
        0
    } else if s1 >= s2 {
        1
    } else {
        2
    }
}
