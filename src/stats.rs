// src/stats.rs
//
// The numeric layer: alpha-diversity scalars, pairwise beta-diversity, and
// tree-aware UniFrac. Callers hand in count vectors/matrices plus
// identifiers; everything here is pure math over those inputs.

use rayon::prelude::*;

use crate::error::{Result, TaxdivError};
use crate::tree::TaxTree;
use crate::types::{AlphaMetric, BetaMetric};

/// A symmetric pairwise distance matrix indexed by sample identifiers.
/// Zero diagonal, non-negative entries.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    pub ids: Vec<String>,
    /// Row-major `n x n` values.
    pub data: Vec<f64>,
}

impl DistanceMatrix {
    fn from_pairs(ids: Vec<String>, pairs: &[((usize, usize), f64)]) -> DistanceMatrix {
        let n = ids.len();
        let mut data = vec![0.0; n * n];
        for &((i, j), d) in pairs {
            data[i * n + j] = d;
            data[j * n + i] = d;
        }
        DistanceMatrix { ids, data }
    }

    pub fn n(&self) -> usize {
        self.ids.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n() + j]
    }

    /// Upper-triangle values in row-major pair order (i < j).
    pub fn condensed(&self) -> Vec<f64> {
        let n = self.n();
        let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                out.push(self.get(i, j));
            }
        }
        out
    }

    /// TSV rendering with a header row of sample ids.
    pub fn to_tsv(&self) -> String {
        use std::fmt::Write as _;
        let mut out = String::new();
        out.push('\t');
        out.push_str(&self.ids.join("\t"));
        out.push('\n');
        for i in 0..self.n() {
            out.push_str(&self.ids[i]);
            for j in 0..self.n() {
                let _ = write!(out, "\t{:.6}", self.get(i, j));
            }
            out.push('\n');
        }
        out
    }
}

/// Shannon entropy: H = -sum p_i * ln(p_i), natural log.
fn shannon(counts: &[f64]) -> f64 {
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }

    let mut h = 0.0;
    for &c in counts {
        if c > 0.0 {
            let p = c / total;
            h -= p * p.ln();
        }
    }
    h
}

/// Simpson's diversity index: 1 - sum p_i^2.
fn simpson(counts: &[f64]) -> f64 {
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }

    let mut sum_p2 = 0.0;
    for &c in counts {
        if c > 0.0 {
            let p = c / total;
            sum_p2 += p * p;
        }
    }
    1.0 - sum_p2
}

/// Chao1 richness estimator: S_obs + f1*(f1-1) / (2*(f2+1))
/// where f1 = singletons, f2 = doubletons.
fn chao1(counts: &[f64]) -> f64 {
    let s_obs = counts.iter().filter(|&&c| c > 0.0).count() as f64;
    let f1 = counts.iter().filter(|&&c| (c - 1.0).abs() < 0.5).count() as f64;
    let f2 = counts.iter().filter(|&&c| (c - 2.0).abs() < 0.5).count() as f64;

    if f2 > 0.0 {
        s_obs + (f1 * (f1 - 1.0)) / (2.0 * (f2 + 1.0))
    } else if f1 > 0.0 {
        s_obs + (f1 * (f1 - 1.0)) / 2.0
    } else {
        s_obs
    }
}

/// Per-sample alpha diversity over a count vector.
pub fn alpha_diversity(metric: AlphaMetric, counts: &[f64]) -> f64 {
    match metric {
        AlphaMetric::Shannon => shannon(counts),
        AlphaMetric::Simpson => simpson(counts),
        AlphaMetric::Chao1 => chao1(counts),
    }
}

/// Bray-Curtis dissimilarity: sum|a-b| / sum(a+b).
fn bray_curtis(a: &[f64], b: &[f64]) -> f64 {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (&ai, &bi) in a.iter().zip(b.iter()) {
        numerator += (ai - bi).abs();
        denominator += ai + bi;
    }

    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Jaccard distance on presence/absence: 1 - |A ∩ B| / |A ∪ B|.
fn jaccard(a: &[f64], b: &[f64]) -> f64 {
    let mut intersection = 0usize;
    let mut union = 0usize;
    for (&ai, &bi) in a.iter().zip(b.iter()) {
        let pa = ai > 0.0;
        let pb = bi > 0.0;
        if pa || pb {
            union += 1;
            if pa && pb {
                intersection += 1;
            }
        }
    }

    if union == 0 {
        0.0
    } else {
        1.0 - intersection as f64 / union as f64
    }
}

/// City-block (Manhattan) distance: sum|a-b|.
fn cityblock(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(&ai, &bi)| (ai - bi).abs()).sum()
}

/// Pairwise beta diversity over a sample x taxon matrix.
///
/// `validate` gates the counts-matrix check: when true, fractional or
/// negative input is rejected with a data-state error. Callers that trust
/// their normalization pass `false` — an explicit capability flag, so the
/// relaxation is visible at the call site.
pub fn beta_diversity(
    metric: BetaMetric,
    rows: &[Vec<f64>],
    ids: &[String],
    validate: bool,
) -> Result<DistanceMatrix> {
    let pair_fn: fn(&[f64], &[f64]) -> f64 = match metric {
        BetaMetric::BrayCurtis => bray_curtis,
        BetaMetric::Jaccard => jaccard,
        BetaMetric::CityBlock => cityblock,
        BetaMetric::WeightedUnifrac | BetaMetric::UnweightedUnifrac => {
            return Err(TaxdivError::Config(format!(
                "{metric} requires a tree; use the unifrac entry points"
            )));
        }
    };

    if validate {
        let ok = rows
            .iter()
            .flatten()
            .all(|&v| v >= 0.0 && v.fract() == 0.0);
        if !ok {
            return Err(TaxdivError::DataState(
                "beta diversity validation requires a non-negative integer count matrix".into(),
            ));
        }
    }

    let pairs = pair_indices(ids.len());
    let distances: Vec<((usize, usize), f64)> = pairs
        .par_iter()
        .map(|&(i, j)| ((i, j), pair_fn(&rows[i], &rows[j])))
        .collect();

    Ok(DistanceMatrix::from_pairs(ids.to_vec(), &distances))
}

fn pair_indices(n: usize) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push((i, j));
        }
    }
    pairs
}

/// Mass per tree node for one sample: leaves filled from the OTU vector,
/// then accumulated bottom-up into every clade.
///
/// OTU ids without a matching leaf, and leaves without a matching OTU id,
/// are silently zero-filled rather than treated as an error.
fn node_mass(tree: &TaxTree, otu_ids: &[String], row: &[f64]) -> Vec<f64> {
    let n = tree.nodes.len();
    let mut mass = vec![0.0; n];

    for (tax_id, &value) in otu_ids.iter().zip(row.iter()) {
        if let Some(idx) = tree.leaf_idx(tax_id) {
            mass[idx] = value;
        }
    }

    // Children always sit after their parent in the arena.
    for i in (0..n).rev() {
        for &child in &tree.nodes[i].children {
            mass[i] += mass[child];
        }
    }
    mass
}

fn check_single_child_root(tree: &TaxTree) -> Result<()> {
    let count = tree.root_child_count();
    if count != 1 {
        return Err(TaxdivError::InvalidTree(format!(
            "unifrac requires a root with exactly one child (found {count})"
        )));
    }
    Ok(())
}

/// Unweighted pair distance: unique branch length / observed branch length.
fn unweighted_pair(tree: &TaxTree, mass_a: &[f64], mass_b: &[f64]) -> f64 {
    let mut unique_length = 0.0;
    let mut total_length = 0.0;

    for i in 0..tree.nodes.len() {
        if i == tree.root {
            continue;
        }
        let in_a = mass_a[i] > 0.0;
        let in_b = mass_b[i] > 0.0;
        if in_a || in_b {
            let bl = tree.nodes[i].branch_length;
            total_length += bl;
            if in_a != in_b {
                unique_length += bl;
            }
        }
    }

    if total_length > 0.0 {
        unique_length / total_length
    } else {
        0.0
    }
}

/// Weighted pair distance:
/// sum bl * |p_a - p_b| / sum bl * max(p_a, p_b).
fn weighted_pair(tree: &TaxTree, mass_a: &[f64], mass_b: &[f64]) -> f64 {
    let total_a = mass_a[tree.root];
    let total_b = mass_b[tree.root];

    if total_a == 0.0 || total_b == 0.0 {
        return if total_a == 0.0 && total_b == 0.0 {
            0.0
        } else {
            1.0
        };
    }

    let mut numerator = 0.0;
    let mut denominator = 0.0;

    for i in 0..tree.nodes.len() {
        if i == tree.root {
            continue;
        }
        let bl = tree.nodes[i].branch_length;
        let pa = mass_a[i] / total_a;
        let pb = mass_b[i] / total_b;
        numerator += bl * (pa - pb).abs();
        denominator += bl * pa.max(pb);
    }

    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

fn unifrac_matrix(
    rows: &[Vec<f64>],
    ids: &[String],
    tree: &TaxTree,
    otu_ids: &[String],
    weighted: bool,
) -> Result<DistanceMatrix> {
    check_single_child_root(tree)?;

    let masses: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| node_mass(tree, otu_ids, row))
        .collect();

    let pairs = pair_indices(ids.len());
    let distances: Vec<((usize, usize), f64)> = pairs
        .par_iter()
        .map(|&(i, j)| {
            let d = if weighted {
                weighted_pair(tree, &masses[i], &masses[j])
            } else {
                unweighted_pair(tree, &masses[i], &masses[j])
            };
            ((i, j), d)
        })
        .collect();

    Ok(DistanceMatrix::from_pairs(ids.to_vec(), &distances))
}

/// Weighted UniFrac over a sample x OTU count matrix and a rooted tree.
/// The tree root must have exactly one child.
pub fn weighted_unifrac(
    rows: &[Vec<f64>],
    ids: &[String],
    tree: &TaxTree,
    otu_ids: &[String],
) -> Result<DistanceMatrix> {
    unifrac_matrix(rows, ids, tree, otu_ids, true)
}

/// Unweighted UniFrac over a sample x OTU count matrix and a rooted tree.
/// The tree root must have exactly one child.
pub fn unweighted_unifrac(
    rows: &[Vec<f64>],
    ids: &[String],
    tree: &TaxTree,
    otu_ids: &[String],
) -> Result<DistanceMatrix> {
    unifrac_matrix(rows, ids, tree, otu_ids, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::test_taxonomy;
    use crate::types::Rank;

    #[test]
    fn shannon_uniform_is_log_n() {
        let counts = vec![25.0, 25.0, 25.0, 25.0];
        assert!((shannon(&counts) - 4.0f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn shannon_single_species_is_zero() {
        assert_eq!(shannon(&[100.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn shannon_sparse_counts_non_negative() {
        let h = alpha_diversity(AlphaMetric::Shannon, &[10.0, 0.0, 5.0]);
        assert!(h >= 0.0);
        assert!(h > 0.0);
    }

    #[test]
    fn simpson_uniform() {
        assert!((simpson(&[25.0, 25.0, 25.0, 25.0]) - 0.75).abs() < 1e-10);
    }

    #[test]
    fn chao1_without_rare_taxa_is_observed_richness() {
        assert_eq!(chao1(&[10.0, 20.0, 30.0]), 3.0);
    }

    #[test]
    fn chao1_with_singletons_and_doubletons() {
        // 3 observed, f1 = 2, f2 = 1: 3 + 2*1 / (2*2) = 3.5
        assert!((chao1(&[1.0, 1.0, 2.0]) - 3.5).abs() < 1e-10);
    }

    #[test]
    fn bray_curtis_bounds() {
        assert_eq!(bray_curtis(&[10.0, 20.0], &[10.0, 20.0]), 0.0);
        assert_eq!(bray_curtis(&[10.0, 0.0], &[0.0, 10.0]), 1.0);
    }

    #[test]
    fn jaccard_partial_overlap() {
        let d = jaccard(&[1.0, 1.0, 0.0], &[0.0, 1.0, 1.0]);
        assert!((d - (1.0 - 1.0 / 3.0)).abs() < 1e-10);
    }

    #[test]
    fn cityblock_is_sum_of_abs_diffs() {
        assert!((cityblock(&[0.6, 0.4], &[0.3, 0.7]) - 0.6).abs() < 1e-10);
    }

    #[test]
    fn beta_matrix_symmetric_zero_diagonal() {
        let rows = vec![vec![10.0, 0.0, 5.0], vec![2.0, 8.0, 0.0], vec![1.0, 1.0, 1.0]];
        let ids: Vec<String> = vec!["a".into(), "b".into(), "c".into()];

        for metric in [BetaMetric::BrayCurtis, BetaMetric::Jaccard, BetaMetric::CityBlock] {
            let dm = beta_diversity(metric, &rows, &ids, false).unwrap();
            assert_eq!(dm.ids, ids);
            for i in 0..3 {
                assert_eq!(dm.get(i, i), 0.0);
                for j in 0..3 {
                    assert_eq!(dm.get(i, j), dm.get(j, i));
                    assert!(dm.get(i, j) >= 0.0);
                }
            }
        }
    }

    #[test]
    fn validation_flag_gates_fractional_input() {
        let rows = vec![vec![0.6, 0.4], vec![0.3, 0.7]];
        let ids: Vec<String> = vec!["a".into(), "b".into()];

        assert!(matches!(
            beta_diversity(BetaMetric::BrayCurtis, &rows, &ids, true),
            Err(TaxdivError::DataState(_))
        ));
        assert!(beta_diversity(BetaMetric::BrayCurtis, &rows, &ids, false).is_ok());
    }

    #[test]
    fn empty_matrix_has_no_condensed_entries() {
        let dm = beta_diversity(BetaMetric::BrayCurtis, &[], &[], false).unwrap();
        assert_eq!(dm.n(), 0);
        assert!(dm.condensed().is_empty());
    }

    #[test]
    fn unifrac_metrics_rejected_without_tree() {
        let rows = vec![vec![1.0], vec![2.0]];
        let ids: Vec<String> = vec!["a".into(), "b".into()];
        assert!(matches!(
            beta_diversity(BetaMetric::WeightedUnifrac, &rows, &ids, false),
            Err(TaxdivError::Config(_))
        ));
    }

    fn genus_tree() -> crate::tree::TaxTree {
        crate::tree::TaxTree::from_taxonomy(&test_taxonomy())
            .unwrap()
            .prune_rank(Rank::Genus)
            .with_synthetic_root()
    }

    #[test]
    fn unifrac_identical_samples_distance_zero() {
        let tree = genus_tree();
        let otu_ids: Vec<String> = vec!["561".into(), "1578".into()];
        let rows = vec![vec![10.0, 20.0], vec![10.0, 20.0]];
        let ids: Vec<String> = vec!["a".into(), "b".into()];

        let dm = weighted_unifrac(&rows, &ids, &tree, &otu_ids).unwrap();
        assert!(dm.get(0, 1).abs() < 1e-10);

        let dm = unweighted_unifrac(&rows, &ids, &tree, &otu_ids).unwrap();
        assert!(dm.get(0, 1).abs() < 1e-10);
    }

    #[test]
    fn unifrac_disjoint_samples_positive_distance() {
        let tree = genus_tree();
        let otu_ids: Vec<String> = vec!["561".into(), "1578".into()];
        let rows = vec![vec![10.0, 0.0], vec![0.0, 10.0]];
        let ids: Vec<String> = vec!["a".into(), "b".into()];

        let dm = unweighted_unifrac(&rows, &ids, &tree, &otu_ids).unwrap();
        let d = dm.get(0, 1);
        assert!(d > 0.5 && d <= 1.0);
    }

    #[test]
    fn unifrac_rejects_multi_child_root() {
        // Two kingdoms hang directly off the root, so the pruned tree keeps
        // a two-child root until the synthetic wrap.
        let tree = crate::tree::TaxTree::from_taxonomy(&crate::taxonomy::forked_test_taxonomy())
            .unwrap()
            .prune_rank(Rank::Genus);
        assert_eq!(tree.root_child_count(), 2);

        let otu_ids: Vec<String> = vec!["561".into(), "2172".into()];
        let rows = vec![vec![10.0, 0.0], vec![0.0, 10.0]];
        let ids: Vec<String> = vec!["a".into(), "b".into()];

        assert!(matches!(
            unweighted_unifrac(&rows, &ids, &tree, &otu_ids),
            Err(TaxdivError::InvalidTree(_))
        ));

        let wrapped = tree.with_synthetic_root();
        assert!(unweighted_unifrac(&rows, &ids, &wrapped, &otu_ids).is_ok());
    }

    #[test]
    fn unifrac_zero_fills_unknown_taxa() {
        let tree = genus_tree();
        // One OTU id the tree has never heard of.
        let otu_ids: Vec<String> = vec!["561".into(), "99999".into()];
        let rows = vec![vec![10.0, 3.0], vec![10.0, 7.0]];
        let ids: Vec<String> = vec!["a".into(), "b".into()];

        let dm = weighted_unifrac(&rows, &ids, &tree, &otu_ids).unwrap();
        // Only the shared 561 leaf carries mass: samples look identical.
        assert!(dm.get(0, 1).abs() < 1e-10);
    }
}
