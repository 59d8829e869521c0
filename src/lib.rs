// src/lib.rs
pub mod bargraph;
pub mod chart;
pub mod diversity;
pub mod error;
pub mod metadata;
pub mod stats;
pub mod table;
pub mod taxonomy;
pub mod tree;
pub mod types;

use std::path::Path;
use std::sync::Arc;

pub use crate::bargraph::{Bargraph, BargraphBuilder, BargraphOptions, SortX};
pub use crate::chart::ChartSpec;
pub use crate::diversity::{AlphaDiversity, DiversityCalculator};
pub use crate::error::{Result, TaxdivError};
pub use crate::metadata::{LabelSpec, MetadataSource, SampleMetadata};
pub use crate::stats::DistanceMatrix;
pub use crate::table::{AbundanceSource, AbundanceTable, TaxonCountSource};
pub use crate::taxonomy::Taxonomy;
pub use crate::tree::TaxTree;
pub use crate::types::{AlphaMetric, BetaMetric, Field, Normalize, Rank, RankRequest, Setting};

/// A loaded analysis: taxonomy, per-sample counts, and sample metadata,
/// wired together so diversity and bargraph calls are one-liners.
pub struct Analysis {
    pub taxonomy: Arc<Taxonomy>,
    pub source: TaxonCountSource,
    pub metadata: SampleMetadata,
}

impl Analysis {
    pub fn diversity(&self) -> DiversityCalculator<'_, TaxonCountSource> {
        DiversityCalculator::new(&self.source, &self.taxonomy)
    }

    pub fn bargraph(&self) -> BargraphBuilder<'_, TaxonCountSource, SampleMetadata> {
        BargraphBuilder::new(&self.source, &self.taxonomy, &self.metadata)
    }

    pub fn alpha_diversity(&self, metric: AlphaMetric, rank: RankRequest) -> Result<AlphaDiversity> {
        self.diversity().alpha_diversity(metric, rank)
    }

    pub fn beta_diversity(&self, metric: BetaMetric, rank: RankRequest) -> Result<DistanceMatrix> {
        self.diversity().beta_diversity(metric, rank)
    }

    pub fn unifrac(&self, weighted: bool, rank: RankRequest) -> Result<DistanceMatrix> {
        self.diversity().unifrac(weighted, rank)
    }

    pub fn plot_bargraph(&self, opts: &BargraphOptions) -> Result<ChartSpec> {
        self.bargraph().plot_bargraph(opts)
    }
}

/// Unified function to load an analysis from taxonomy and counts files.
///
/// The taxonomy file is tab-separated `taxid, parentid, name, rank`; the
/// counts file is `sample, taxid, count`. Both may be gzip-compressed.
pub fn load_analysis<P: AsRef<Path>, Q: AsRef<Path>>(
    taxonomy_path: P,
    counts_path: Q,
    field: Field,
) -> Result<Analysis> {
    // 1. Parse the taxonomy database.
    let taxonomy = Arc::new(taxonomy::parse_taxonomy(taxonomy_path)?);

    // 2. Parse per-sample taxon counts.
    let samples = table::parse_taxon_counts(counts_path)?;
    log::info!("loaded {} samples", samples.len());

    // 3. Seed metadata with a default name per sample so labels resolve.
    let mut metadata = SampleMetadata::new();
    for (sample_id, _) in &samples {
        metadata.set(sample_id.clone(), "name", sample_id.clone());
    }

    let source = TaxonCountSource::new(taxonomy.clone(), samples, field);

    Ok(Analysis {
        taxonomy,
        source,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_fixtures() -> (std::path::PathBuf, std::path::PathBuf) {
        let dir = std::env::temp_dir();
        let tax_path = dir.join("taxdiv_lib_taxonomy.tsv");
        let counts_path = dir.join("taxdiv_lib_counts.tsv");

        let mut f = std::fs::File::create(&tax_path).unwrap();
        for (id, parent, name, rank) in [
            ("1", "1", "root", "no rank"),
            ("2", "1", "Bacteria", "superkingdom"),
            ("1224", "2", "Proteobacteria", "phylum"),
            ("561", "1224", "Escherichia", "genus"),
            ("562", "561", "Escherichia coli", "species"),
            ("1239", "2", "Firmicutes", "phylum"),
            ("1578", "1239", "Lactobacillus", "genus"),
            ("1582", "1578", "Lactobacillus casei", "species"),
        ] {
            writeln!(f, "{id}\t{parent}\t{name}\t{rank}").unwrap();
        }
        drop(f);

        let mut f = std::fs::File::create(&counts_path).unwrap();
        for (sample, tax, count) in [
            ("S1", "562", 60),
            ("S1", "1582", 40),
            ("S2", "562", 30),
            ("S2", "1582", 70),
        ] {
            writeln!(f, "{sample}\t{tax}\t{count}").unwrap();
        }
        drop(f);

        (tax_path, counts_path)
    }

    #[test]
    fn end_to_end_from_files() {
        let (tax_path, counts_path) = write_fixtures();
        let analysis = load_analysis(&tax_path, &counts_path, Field::Readcount).unwrap();
        std::fs::remove_file(&tax_path).ok();
        std::fs::remove_file(&counts_path).ok();

        let alpha = analysis
            .alpha_diversity(AlphaMetric::Shannon, RankRequest::At(Rank::Genus))
            .unwrap();
        assert_eq!(alpha.values.len(), 2);
        assert!(alpha.get("S1").unwrap() > 0.0);

        let dm = analysis
            .beta_diversity(BetaMetric::BrayCurtis, RankRequest::At(Rank::Genus))
            .unwrap();
        assert_eq!(dm.ids, vec!["S1", "S2"]);
        assert_eq!(dm.get(0, 1), dm.get(1, 0));

        let dm = analysis.unifrac(true, RankRequest::At(Rank::Genus)).unwrap();
        assert!(dm.get(0, 1) >= 0.0);

        let spec = analysis
            .plot_bargraph(&BargraphOptions {
                rank: Some(RankRequest::At(Rank::Genus)),
                normalize: Normalize::Yes,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(spec.rows.len(), 4);
    }
}
