// src/table.rs

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};

use crate::error::Result;
use crate::taxonomy::{cmp_tax_ids, open_text, Taxonomy};
use crate::types::{Field, Normalize, Rank, RankRequest};

/// Raw per-taxon values for one sample, keyed by tax id.
pub type TaxonCounts = AHashMap<String, f64>;

/// A dense sample x taxon table. Rows are keyed by classification id in
/// insertion order; every row carries a value for every taxon (zero-filled),
/// so the grid is always complete. Annotated with the resolved rank, the
/// backing field, and whether values are normalized.
#[derive(Debug, Clone)]
pub struct AbundanceTable {
    pub sample_ids: Vec<String>,
    pub tax_ids: Vec<String>,
    /// One row per sample, aligned with `tax_ids`.
    pub rows: Vec<Vec<f64>>,
    pub rank: Rank,
    pub field: Field,
    pub normalized: bool,
}

impl AbundanceTable {
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn n_taxa(&self) -> usize {
        self.tax_ids.len()
    }

    pub fn col_index(&self, tax_id: &str) -> Option<usize> {
        self.tax_ids.iter().position(|t| t == tax_id)
    }

    pub fn row_sum(&self, row: usize) -> f64 {
        self.rows[row].iter().sum()
    }

    /// Mean of one column across all samples.
    pub fn column_mean(&self, col: usize) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.rows.iter().map(|r| r[col]).sum::<f64>() / self.rows.len() as f64
    }

    /// Append a column, one value per row.
    pub fn push_column(&mut self, tax_id: impl Into<String>, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.tax_ids.push(tax_id.into());
        for (row, v) in self.rows.iter_mut().zip(values) {
            row.push(v);
        }
    }

    /// A new table restricted to the given columns, in the given order.
    pub fn select_columns(&self, cols: &[usize]) -> AbundanceTable {
        AbundanceTable {
            sample_ids: self.sample_ids.clone(),
            tax_ids: cols.iter().map(|&c| self.tax_ids[c].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| cols.iter().map(|&c| r[c]).collect())
                .collect(),
            rank: self.rank,
            field: self.field,
            normalized: self.normalized,
        }
    }
}

/// The abundance-table provider contract. Implementations must key rows by
/// classification id, columns by tax id, and annotate the result with the
/// resolved rank and normalization state.
pub trait AbundanceSource {
    /// The abundance field this source serves.
    fn field(&self) -> Field;

    fn fetch(
        &self,
        rank: RankRequest,
        normalize: Normalize,
        threshold: Option<f64>,
    ) -> Result<AbundanceTable>;
}

/// In-memory provider over raw per-taxon counts, one map per sample.
/// `fetch` rolls counts up the taxonomy to the requested rank by walking
/// each taxon's parent chain.
#[derive(Debug, Clone)]
pub struct TaxonCountSource {
    taxonomy: Arc<Taxonomy>,
    samples: Vec<(String, TaxonCounts)>,
    field: Field,
}

impl TaxonCountSource {
    pub fn new(taxonomy: Arc<Taxonomy>, samples: Vec<(String, TaxonCounts)>, field: Field) -> Self {
        TaxonCountSource {
            taxonomy,
            samples,
            field,
        }
    }

    /// Nearest ancestor (or self) at `rank`, walking the parent chain.
    /// Cycle-safe: the walk stops at unknown parents and at any id it has
    /// already seen, so self-loops and longer parent cycles both terminate.
    fn ancestor_at_rank<'a>(&'a self, tax_id: &'a str, rank: Rank) -> Option<&'a str> {
        let mut visited: AHashSet<&str> = AHashSet::new();
        let mut current = tax_id;
        while visited.insert(current) {
            if let Some(label) = self.taxonomy.rank_label(current) {
                if Rank::parse(label) == Some(rank) {
                    return Some(current);
                }
            }
            current = self.taxonomy.parent_map.get(current)?;
        }
        None
    }
}

impl AbundanceSource for TaxonCountSource {
    fn field(&self) -> Field {
        self.field
    }

    fn fetch(
        &self,
        rank: RankRequest,
        normalize: Normalize,
        threshold: Option<f64>,
    ) -> Result<AbundanceTable> {
        let rank = match rank {
            RankRequest::At(r) => r,
            RankRequest::Auto => Rank::Species,
        };

        // Abundance fields are fractions at the source; raw counts cannot
        // be reconstructed from them.
        let normalized = match normalize {
            Normalize::Yes | Normalize::Auto => true,
            Normalize::No => self.field.is_abundance(),
        };

        // 1. Roll each sample's counts up to the requested rank.
        let mut buckets: Vec<AHashMap<&str, f64>> = Vec::with_capacity(self.samples.len());
        let mut totals: Vec<f64> = Vec::with_capacity(self.samples.len());
        for (_, counts) in &self.samples {
            let mut bucket: AHashMap<&str, f64> = AHashMap::new();
            let mut total = 0.0;
            for (tax_id, &count) in counts {
                total += count;
                if let Some(ancestor) = self.ancestor_at_rank(tax_id, rank) {
                    *bucket.entry(ancestor).or_insert(0.0) += count;
                }
            }
            buckets.push(bucket);
            totals.push(total);
        }

        // 2. Deterministic column order: numeric tax ids first, then lexical.
        let mut tax_ids: Vec<String> = buckets
            .iter()
            .flat_map(|b| b.keys().map(|t| t.to_string()))
            .collect();
        tax_ids.sort_by(|a, b| cmp_tax_ids(a, b));
        tax_ids.dedup();

        // 3. Dense zero-filled rows, optionally normalized. With-children
        //    fields divide by the sample total so the residual 1 - row_sum
        //    is the mass unclassified at this rank; plain fields divide by
        //    the row sum.
        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(self.samples.len());
        for (i, bucket) in buckets.iter().enumerate() {
            let mut row: Vec<f64> = tax_ids
                .iter()
                .map(|t| bucket.get(t.as_str()).copied().unwrap_or(0.0))
                .collect();
            if normalized && !self.field.is_abundance() {
                let denom = if self.field.is_with_children() {
                    totals[i]
                } else {
                    row.iter().sum()
                };
                if denom > 0.0 {
                    for v in &mut row {
                        *v /= denom;
                    }
                }
            }
            rows.push(row);
        }

        let mut table = AbundanceTable {
            sample_ids: self.samples.iter().map(|(id, _)| id.clone()).collect(),
            tax_ids,
            rows,
            rank,
            field: self.field,
            normalized,
        };

        // 4. Threshold filter: keep taxa at or above the threshold in at
        //    least one sample.
        if let Some(threshold) = threshold {
            let keep: Vec<usize> = (0..table.n_taxa())
                .filter(|&c| table.rows.iter().any(|r| r[c] >= threshold))
                .collect();
            table = table.select_columns(&keep);
        }

        log::debug!(
            "fetched abundance table: {} samples x {} taxa at rank {} (normalized: {})",
            table.n_samples(),
            table.n_taxa(),
            table.rank,
            table.normalized
        );

        Ok(table)
    }
}

/// Parses a per-sample taxon counts file in the format:
/// ```text
/// <sample>\t<taxid>\t<count>
/// ```
/// Sample order follows first appearance; malformed lines are skipped.
/// `.gz` input is handled transparently.
pub fn parse_taxon_counts<P: AsRef<Path>>(filepath: P) -> std::io::Result<Vec<(String, TaxonCounts)>> {
    let reader = open_text(filepath)?;

    let mut order: Vec<String> = Vec::new();
    let mut by_sample: AHashMap<String, TaxonCounts> = AHashMap::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 3 {
            continue;
        }

        let sample = parts[0].trim();
        let tax_id = parts[1].trim();
        let Ok(count) = parts[2].trim().parse::<f64>() else {
            continue;
        };
        if sample.is_empty() || tax_id.is_empty() {
            continue;
        }

        if !by_sample.contains_key(sample) {
            order.push(sample.to_string());
        }
        *by_sample
            .entry(sample.to_string())
            .or_default()
            .entry(tax_id.to_string())
            .or_insert(0.0) += count;
    }

    log::info!("parsed taxon counts for {} samples", order.len());

    Ok(order
        .into_iter()
        .map(|s| {
            let counts = by_sample.remove(&s).unwrap_or_default();
            (s, counts)
        })
        .collect())
}


#[cfg(test)]
mod tests {
    use super::test_support::count_source;
    use super::*;
    use crate::taxonomy::test_taxonomy;

    #[test]
    fn rollup_aggregates_to_requested_rank() {
        let source = count_source(Field::Readcount);
        let table = source
            .fetch(RankRequest::At(Rank::Genus), Normalize::No, None)
            .unwrap();

        assert_eq!(table.sample_ids, vec!["S1", "S2"]);
        assert_eq!(table.tax_ids, vec!["561", "1578"]);
        assert_eq!(table.rows[0], vec![60.0, 40.0]);
        assert_eq!(table.rows[1], vec![30.0, 70.0]);
        assert!(!table.normalized);
        assert_eq!(table.rank, Rank::Genus);
    }

    #[test]
    fn auto_rank_resolves_to_species() {
        let source = count_source(Field::Readcount);
        let table = source.fetch(RankRequest::Auto, Normalize::No, None).unwrap();
        assert_eq!(table.rank, Rank::Species);
        assert_eq!(table.tax_ids, vec!["562", "1582"]);
    }

    #[test]
    fn normalized_rows_sum_to_one() {
        let source = count_source(Field::Readcount);
        let table = source
            .fetch(RankRequest::At(Rank::Genus), Normalize::Yes, None)
            .unwrap();
        assert!(table.normalized);
        for i in 0..table.n_samples() {
            assert!((table.row_sum(i) - 1.0).abs() < 1e-9);
        }
        assert!((table.rows[0][0] - 0.6).abs() < 1e-9);
    }

    #[test]
    fn with_children_residual_counts_unassigned_mass() {
        // A read assigned directly at the phylum level never reaches a
        // genus bucket; with-children normalization keeps it in the
        // denominator so 1 - row_sum exposes it.
        let taxonomy = Arc::new(test_taxonomy());
        let mut s1 = TaxonCounts::new();
        s1.insert("562".into(), 80.0);
        s1.insert("1224".into(), 20.0); // stuck at phylum

        let source = TaxonCountSource::new(
            taxonomy,
            vec![("S1".into(), s1)],
            Field::ReadcountWChildren,
        );
        let table = source
            .fetch(RankRequest::At(Rank::Genus), Normalize::Yes, None)
            .unwrap();

        assert_eq!(table.tax_ids, vec!["561"]);
        assert!((table.rows[0][0] - 0.8).abs() < 1e-9);
        assert!((1.0 - table.row_sum(0) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn threshold_drops_rare_taxa() {
        let source = count_source(Field::Readcount);
        let table = source
            .fetch(RankRequest::At(Rank::Genus), Normalize::Yes, Some(0.5))
            .unwrap();
        // 561 peaks at 0.6, 1578 at 0.7; both survive a 0.5 cut.
        assert_eq!(table.n_taxa(), 2);

        let table = source
            .fetch(RankRequest::At(Rank::Genus), Normalize::Yes, Some(0.65))
            .unwrap();
        assert_eq!(table.tax_ids, vec!["1578"]);
    }

    #[test]
    fn fetch_terminates_on_parent_cycle() {
        // Two corrupt lines forming a parent cycle must not spin the
        // roll-up forever; the cycled taxon just never reaches the rank.
        let mut taxonomy = test_taxonomy();
        taxonomy.parent_map.insert("7001".into(), "7002".into());
        taxonomy.parent_map.insert("7002".into(), "7001".into());
        taxonomy.rank_map.insert("7001".into(), "no rank".into());
        taxonomy.rank_map.insert("7002".into(), "no rank".into());

        let mut s1 = TaxonCounts::new();
        s1.insert("562".into(), 90.0);
        s1.insert("7001".into(), 10.0);

        let source = TaxonCountSource::new(
            Arc::new(taxonomy),
            vec![("S1".into(), s1)],
            Field::Readcount,
        );
        let table = source
            .fetch(RankRequest::At(Rank::Genus), Normalize::No, None)
            .unwrap();

        assert_eq!(table.tax_ids, vec!["561"]);
        assert_eq!(table.rows[0], vec![90.0]);
    }

    #[test]
    fn grid_is_complete_when_taxa_differ() {
        let taxonomy = Arc::new(test_taxonomy());
        let mut s1 = TaxonCounts::new();
        s1.insert("562".into(), 10.0);
        let mut s2 = TaxonCounts::new();
        s2.insert("1582".into(), 5.0);

        let source = TaxonCountSource::new(
            taxonomy,
            vec![("A".into(), s1), ("B".into(), s2)],
            Field::Readcount,
        );
        let table = source
            .fetch(RankRequest::At(Rank::Species), Normalize::No, None)
            .unwrap();

        assert_eq!(table.n_taxa(), 2);
        assert_eq!(table.rows[0], vec![10.0, 0.0]);
        assert_eq!(table.rows[1], vec![0.0, 5.0]);
    }
}
