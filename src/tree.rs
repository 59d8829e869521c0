// src/tree.rs

use ahash::AHashMap;

use crate::error::{Result, TaxdivError};
use crate::taxonomy::{build_children_map, Taxonomy};
use crate::types::Rank;

/// A node in the taxonomic tree (array-based representation).
#[derive(Debug, Clone)]
pub struct TaxNode {
    pub tax_id: String,
    pub name: String,
    /// Raw rank label ("no rank" and friends allowed).
    pub rank: String,
    /// Index of the parent node (root has parent = itself).
    pub parent: usize,
    pub children: Vec<usize>,
    /// Length of the edge to the parent. Taxonomy edges carry unit length.
    pub branch_length: f64,
}

/// A rooted taxonomic tree in arena representation.
///
/// Invariant: every node's arena index is greater than its parent's, so a
/// single reverse pass visits children before parents. Derived trees
/// (`prune_rank`, `with_synthetic_root`) are new arenas; the original is
/// never mutated.
#[derive(Debug, Clone)]
pub struct TaxTree {
    pub nodes: Vec<TaxNode>,
    pub root: usize,
    leaf_index: AHashMap<String, usize>,
}

impl TaxTree {
    /// Build the full tree from taxonomy metadata. Nodes unreachable from
    /// the root (broken parent chains) are left out.
    pub fn from_taxonomy(taxonomy: &Taxonomy) -> Result<TaxTree> {
        let root_id = taxonomy
            .root_id()
            .ok_or_else(|| TaxdivError::InvalidTree("taxonomy has no root node".into()))?
            .to_string();

        let children_map = build_children_map(&taxonomy.parent_map);

        let mut nodes: Vec<TaxNode> = Vec::with_capacity(taxonomy.parent_map.len());
        nodes.push(TaxNode {
            tax_id: root_id.clone(),
            name: taxonomy.name(&root_id).unwrap_or(&root_id).to_string(),
            rank: taxonomy.rank_label(&root_id).unwrap_or("no rank").to_string(),
            parent: 0,
            children: Vec::new(),
            branch_length: 0.0,
        });

        // Breadth-first insertion keeps parents ahead of their children.
        let mut queue = std::collections::VecDeque::from([0usize]);
        while let Some(idx) = queue.pop_front() {
            let tax_id = nodes[idx].tax_id.clone();
            let Some(kids) = children_map.get(&tax_id) else {
                continue;
            };
            for child_id in kids {
                let child_idx = nodes.len();
                nodes.push(TaxNode {
                    tax_id: child_id.clone(),
                    name: taxonomy.name(child_id).unwrap_or(child_id).to_string(),
                    rank: taxonomy
                        .rank_label(child_id)
                        .unwrap_or("no rank")
                        .to_string(),
                    parent: idx,
                    children: Vec::new(),
                    branch_length: 1.0,
                });
                nodes[idx].children.push(child_idx);
                queue.push_back(child_idx);
            }
        }

        Ok(Self::finish(nodes, 0))
    }

    fn finish(nodes: Vec<TaxNode>, root: usize) -> TaxTree {
        let mut leaf_index = AHashMap::new();
        for (idx, node) in nodes.iter().enumerate() {
            if node.children.is_empty() {
                leaf_index.insert(node.tax_id.clone(), idx);
            }
        }
        TaxTree {
            nodes,
            root,
            leaf_index,
        }
    }

    /// Derive a subtree restricted to `rank`: nodes at the target rank
    /// become leaves, nodes broader than the target (or without a ladder
    /// rank) survive only if their clade reaches the target, and nodes
    /// below the target are dropped. The root always survives.
    pub fn prune_rank(&self, rank: Rank) -> TaxTree {
        let n = self.nodes.len();

        // Children sit after parents, so one reverse pass settles the
        // whole reaches-target computation.
        let mut reaches = vec![false; n];
        for i in (0..n).rev() {
            let node = &self.nodes[i];
            match Rank::parse(&node.rank) {
                Some(r) if r == rank => reaches[i] = true,
                Some(r) if r.depth() > rank.depth() => reaches[i] = false,
                _ => reaches[i] = node.children.iter().any(|&c| reaches[c]),
            }
        }

        let mut nodes: Vec<TaxNode> = Vec::new();
        let mut stack: Vec<(usize, usize)> = Vec::new(); // (old idx, new parent)

        let root = &self.nodes[self.root];
        nodes.push(TaxNode {
            children: Vec::new(),
            parent: 0,
            ..root.clone()
        });
        for &c in root.children.iter().rev() {
            if reaches[c] {
                stack.push((c, 0));
            }
        }

        while let Some((old_idx, new_parent)) = stack.pop() {
            let old = &self.nodes[old_idx];
            let new_idx = nodes.len();
            nodes.push(TaxNode {
                children: Vec::new(),
                parent: new_parent,
                ..old.clone()
            });
            nodes[new_parent].children.push(new_idx);

            // A node at the target rank becomes a leaf.
            if Rank::parse(&old.rank) == Some(rank) {
                continue;
            }
            for &c in old.children.iter().rev() {
                if reaches[c] {
                    stack.push((c, new_idx));
                }
            }
        }

        Self::finish(nodes, 0)
    }

    /// Derive a copy wrapped in a synthetic root (name "fake root", rank
    /// "no rank") whose single child is this tree's root. The phylogenetic
    /// distance routines require a root with exactly one child; this is a
    /// tagged transformation, not part of tree construction, so it can be
    /// dropped if a routine without that constraint is substituted.
    pub fn with_synthetic_root(&self) -> TaxTree {
        let mut nodes = Vec::with_capacity(self.nodes.len() + 1);
        nodes.push(TaxNode {
            tax_id: String::new(),
            name: "fake root".to_string(),
            rank: "no rank".to_string(),
            parent: 0,
            children: vec![self.root + 1],
            branch_length: 0.0,
        });
        for node in &self.nodes {
            nodes.push(TaxNode {
                parent: node.parent + 1,
                children: node.children.iter().map(|&c| c + 1).collect(),
                ..node.clone()
            });
        }
        // The old root now hangs off the synthetic node.
        nodes[self.root + 1].parent = 0;
        nodes[self.root + 1].branch_length = 0.0;

        Self::finish(nodes, 0)
    }

    pub fn leaf_idx(&self, tax_id: &str) -> Option<usize> {
        self.leaf_index.get(tax_id).copied()
    }

    /// Leaf tax ids in arena order.
    pub fn leaf_ids(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.children.is_empty())
            .map(|n| n.tax_id.as_str())
            .collect()
    }

    pub fn n_leaves(&self) -> usize {
        self.leaf_index.len()
    }

    pub fn root_child_count(&self) -> usize {
        self.nodes[self.root].children.len()
    }
}
