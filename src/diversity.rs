// src/diversity.rs

use crate::error::{Result, TaxdivError};
use crate::stats;
use crate::stats::DistanceMatrix;
use crate::table::AbundanceSource;
use crate::taxonomy::Taxonomy;
use crate::tree::TaxTree;
use crate::types::{AlphaMetric, BetaMetric, Normalize, RankRequest};

/// One alpha-diversity value per sample, in table row order.
#[derive(Debug, Clone)]
pub struct AlphaDiversity {
    pub metric: AlphaMetric,
    pub sample_ids: Vec<String>,
    pub values: Vec<f64>,
}

impl AlphaDiversity {
    pub fn get(&self, sample_id: &str) -> Option<f64> {
        self.sample_ids
            .iter()
            .position(|s| s == sample_id)
            .map(|i| self.values[i])
    }

    /// TSV rendering: one row per sample, metric name as the value header.
    pub fn to_tsv(&self) -> String {
        use std::fmt::Write as _;
        let mut out = String::new();
        let _ = writeln!(out, "classification_id\t{}", self.metric);
        for (id, v) in self.sample_ids.iter().zip(&self.values) {
            let _ = writeln!(out, "{id}\t{v:.6}");
        }
        out
    }
}

/// Computes diversity within and between samples over an abundance source,
/// delegating the numeric work to [`crate::stats`].
pub struct DiversityCalculator<'a, S: AbundanceSource> {
    source: &'a S,
    taxonomy: &'a Taxonomy,
}

impl<'a, S: AbundanceSource> DiversityCalculator<'a, S> {
    pub fn new(source: &'a S, taxonomy: &'a Taxonomy) -> Self {
        DiversityCalculator { source, taxonomy }
    }

    /// Calculate the diversity within each sample's community.
    ///
    /// Count-based estimators are meaningless on relative abundances, so a
    /// source that can only produce normalized data is rejected.
    pub fn alpha_diversity(
        &self,
        metric: AlphaMetric,
        rank: RankRequest,
    ) -> Result<AlphaDiversity> {
        let table = self.source.fetch(rank, Normalize::No, None)?;
        if table.normalized {
            return Err(TaxdivError::DataState(format!(
                "alpha diversity ({metric}) requires raw read counts, but the {} field only \
                 provides normalized abundances",
                table.field
            )));
        }

        let values = table
            .rows
            .iter()
            .map(|row| stats::alpha_diversity(metric, row))
            .collect();

        Ok(AlphaDiversity {
            metric,
            sample_ids: table.sample_ids,
            values,
        })
    }

    /// Calculate the diversity between each pair of samples.
    ///
    /// The UniFrac metric names route through [`Self::unifrac`]. The other
    /// metrics run on whatever normalization the source deems appropriate,
    /// so the stats-layer counts check is explicitly bypassed
    /// (`validate = false`): the source's normalization is trusted as
    /// domain-appropriate here.
    pub fn beta_diversity(
        &self,
        metric: BetaMetric,
        rank: RankRequest,
    ) -> Result<DistanceMatrix> {
        match metric {
            BetaMetric::WeightedUnifrac => return self.unifrac(true, rank),
            BetaMetric::UnweightedUnifrac => return self.unifrac(false, rank),
            _ => {}
        }

        let table = self.source.fetch(rank, Normalize::Auto, None)?;
        stats::beta_diversity(metric, &table.rows, &table.sample_ids, false)
    }

    /// Calculate the UniFrac beta diversity metric.
    ///
    /// Weighted UniFrac considers abundances, unweighted UniFrac considers
    /// presence. Requires raw counts, like alpha diversity.
    pub fn unifrac(&self, weighted: bool, rank: RankRequest) -> Result<DistanceMatrix> {
        // 1. Fetch raw counts at the requested rank.
        let table = self.source.fetch(rank, Normalize::No, None)?;
        if table.normalized {
            return Err(TaxdivError::DataState(format!(
                "unifrac requires raw read counts, but the {} field only provides normalized \
                 abundances",
                table.field
            )));
        }

        // 2. Build the full tree and prune it to the table's resolved rank.
        let tree = TaxTree::from_taxonomy(self.taxonomy)?;
        let pruned = tree.prune_rank(table.rank);

        // 3. The distance routine expects a root with exactly one child, so
        //    wrap the pruned subtree in a synthetic root.
        let wrapped = pruned.with_synthetic_root();

        log::debug!(
            "unifrac over {} samples, {} taxa, {} tree nodes (weighted: {weighted})",
            table.n_samples(),
            table.n_taxa(),
            wrapped.nodes.len()
        );

        // 4. Run the calculation with the table's taxa as the OTU ids.
        if weighted {
            stats::weighted_unifrac(&table.rows, &table.sample_ids, &wrapped, &table.tax_ids)
        } else {
            stats::unweighted_unifrac(&table.rows, &table.sample_ids, &wrapped, &table.tax_ids)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::test_support::count_source;
    use crate::taxonomy::test_taxonomy;
    use crate::types::{Field, Rank};

    #[test]
    fn alpha_returns_one_non_negative_value_per_sample() {
        let source = count_source(Field::Readcount);
        let taxonomy = test_taxonomy();
        let calc = DiversityCalculator::new(&source, &taxonomy);

        for metric in [AlphaMetric::Shannon, AlphaMetric::Simpson, AlphaMetric::Chao1] {
            let alpha = calc
                .alpha_diversity(metric, RankRequest::At(Rank::Genus))
                .unwrap();
            assert_eq!(alpha.sample_ids, vec!["S1", "S2"]);
            assert_eq!(alpha.values.len(), 2);
            assert!(alpha.values.iter().all(|&v| v >= 0.0));
        }
    }

    #[test]
    fn alpha_rejects_normalized_only_sources() {
        // An abundance field can never hand back raw counts.
        let source = count_source(Field::Abundance);
        let taxonomy = test_taxonomy();
        let calc = DiversityCalculator::new(&source, &taxonomy);

        for metric in [AlphaMetric::Shannon, AlphaMetric::Simpson, AlphaMetric::Chao1] {
            assert!(matches!(
                calc.alpha_diversity(metric, RankRequest::Auto),
                Err(TaxdivError::DataState(_))
            ));
        }
    }

    #[test]
    fn beta_matrix_indexed_by_sample_ids() {
        let source = count_source(Field::Readcount);
        let taxonomy = test_taxonomy();
        let calc = DiversityCalculator::new(&source, &taxonomy);

        for metric in [BetaMetric::BrayCurtis, BetaMetric::Jaccard, BetaMetric::CityBlock] {
            let dm = calc
                .beta_diversity(metric, RankRequest::At(Rank::Genus))
                .unwrap();
            assert_eq!(dm.ids, vec!["S1", "S2"]);
            assert_eq!(dm.get(0, 0), 0.0);
            assert_eq!(dm.get(0, 1), dm.get(1, 0));
        }
    }

    #[test]
    fn beta_runs_on_normalized_data() {
        // The source normalizes on Auto; the validation bypass must let
        // fractional values through.
        let source = count_source(Field::Readcount);
        let taxonomy = test_taxonomy();
        let calc = DiversityCalculator::new(&source, &taxonomy);

        let dm = calc
            .beta_diversity(BetaMetric::BrayCurtis, RankRequest::At(Rank::Genus))
            .unwrap();
        assert!(dm.get(0, 1) > 0.0);
    }

    #[test]
    fn beta_unifrac_names_route_to_unifrac() {
        let source = count_source(Field::Readcount);
        let taxonomy = test_taxonomy();
        let calc = DiversityCalculator::new(&source, &taxonomy);

        let via_beta = calc
            .beta_diversity(BetaMetric::WeightedUnifrac, RankRequest::At(Rank::Genus))
            .unwrap();
        let direct = calc.unifrac(true, RankRequest::At(Rank::Genus)).unwrap();
        assert_eq!(via_beta.ids, direct.ids);
        assert_eq!(via_beta.condensed(), direct.condensed());
    }

    #[test]
    fn unifrac_distances_in_unit_range() {
        let source = count_source(Field::Readcount);
        let taxonomy = test_taxonomy();
        let calc = DiversityCalculator::new(&source, &taxonomy);

        for weighted in [true, false] {
            let dm = calc.unifrac(weighted, RankRequest::At(Rank::Genus)).unwrap();
            let d = dm.get(0, 1);
            assert!(d >= 0.0 && d <= 1.0, "unifrac distance {d} out of range");
            assert_eq!(dm.get(0, 0), 0.0);
        }
    }

    #[test]
    fn unifrac_rejects_normalized_only_sources() {
        let source = count_source(Field::AbundanceWChildren);
        let taxonomy = test_taxonomy();
        let calc = DiversityCalculator::new(&source, &taxonomy);

        assert!(matches!(
            calc.unifrac(true, RankRequest::Auto),
            Err(TaxdivError::DataState(_))
        ));
    }
}
