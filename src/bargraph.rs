// src/bargraph.rs

use ahash::AHashSet;

use crate::chart::{bar_chart, ChartSpec};
use crate::error::{Result, TaxdivError};
use crate::metadata::{LabelSpec, MetadataSource};
use crate::table::AbundanceSource;
use crate::taxonomy::Taxonomy;
use crate::types::{Field, Normalize, Rank, RankRequest, Setting};

/// How to order samples along the x axis.
pub enum SortX {
    /// Leave samples in data order.
    None,
    /// An explicit ordered list of labels; must cover the dataset exactly.
    Labels(Vec<String>),
    /// A function from the unordered label list to a total order.
    With(Box<dyn Fn(&[String]) -> Vec<String>>),
}

impl Default for SortX {
    fn default() -> Self {
        SortX::None
    }
}

/// Display options for [`BargraphBuilder::plot_bargraph`].
pub struct BargraphOptions {
    /// Rank to aggregate at; `None` is rejected.
    pub rank: Option<RankRequest>,
    pub normalize: Normalize,
    /// Keep the N most abundant taxa (cohort mean). Mutually exclusive
    /// with `threshold` once resolved.
    pub top_n: Setting<usize>,
    /// Keep taxa above this abundance in at least one sample.
    pub threshold: Setting<f64>,
    pub title: Option<String>,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    /// Metadata fields surfaced on hover.
    pub tooltip: Vec<String>,
    /// Metadata field used to facet samples into groups.
    pub haxis: Option<String>,
    /// Color legend title; defaults to the abundance field name.
    pub legend: Option<String>,
    pub label: LabelSpec,
    pub sort_x: SortX,
    /// Impute a "No {rank}" bucket for mass unassigned at this rank.
    /// `None` auto-enables on with-children abundance data.
    pub include_taxa_missing_rank: Option<bool>,
    /// Append an "Other" bucket for mass excluded by the top-N cut.
    pub include_other: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Default for BargraphOptions {
    fn default() -> Self {
        BargraphOptions {
            rank: Some(RankRequest::Auto),
            normalize: Normalize::Auto,
            top_n: Setting::Auto,
            threshold: Setting::Auto,
            title: None,
            xlabel: None,
            ylabel: None,
            tooltip: Vec::new(),
            haxis: None,
            legend: None,
            label: LabelSpec::Default,
            sort_x: SortX::None,
            include_taxa_missing_rank: None,
            include_other: false,
            width: None,
            height: None,
        }
    }
}

/// One (sample, taxon) observation of the long-format output.
#[derive(Debug, Clone, PartialEq)]
pub struct BargraphRow {
    pub classification_id: String,
    pub label: String,
    pub tax_id: String,
    /// `"{name} ({id})"`, or the bare id when no name is known.
    pub tax_name: String,
    pub value: f64,
    /// Index into the taxon display domain; encodes stacking order.
    pub order: usize,
    /// Joined metadata fields beyond the label, in tooltip order.
    pub metadata: Vec<(String, String)>,
}

/// The shaped long-format table plus everything a renderer needs to encode
/// it deterministically.
#[derive(Debug, Clone)]
pub struct Bargraph {
    pub rows: Vec<BargraphRow>,
    /// Taxon display names in stacking order; "No {rank}" and "Other"
    /// always come last, in that relative order.
    pub tax_domain: Vec<String>,
    /// Explicit sample ordering, if a sort strategy produced one.
    pub sample_order: Option<Vec<String>>,
    /// Tooltip field names, "Label" first.
    pub tooltip_fields: Vec<String>,
    pub field: Field,
    pub rank: Rank,
    pub normalized: bool,
    pub haxis: Option<String>,
}

impl Bargraph {
    /// TSV rendering of the long table.
    pub fn to_tsv(&self) -> String {
        use std::fmt::Write as _;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "classification_id\tlabel\ttax_id\ttax_name\t{}\torder",
            self.field
        );
        for row in &self.rows {
            let _ = writeln!(
                out,
                "{}\t{}\t{}\t{}\t{:.6}\t{}",
                row.classification_id, row.label, row.tax_id, row.tax_name, row.value, row.order
            );
        }
        out
    }
}

/// Resolve the `top_n` / `threshold` pair into at most one active selection
/// criterion. Auto defaults to `top_n = 10` unless a concrete threshold
/// takes its place.
pub(crate) fn resolve_selection(
    top_n: Setting<usize>,
    threshold: Setting<f64>,
) -> Result<(Option<usize>, Option<f64>)> {
    match (top_n, threshold) {
        (Setting::Auto, Setting::Auto) | (Setting::Auto, Setting::Off) => Ok((Some(10), None)),
        (Setting::Auto | Setting::Off, Setting::Value(t)) => Ok((None, Some(t))),
        (Setting::Value(n), Setting::Auto | Setting::Off) => Ok((Some(n), None)),
        (Setting::Value(_), Setting::Value(_)) => Err(TaxdivError::Config(
            "top_n and threshold are mutually exclusive; set at most one".into(),
        )),
        (Setting::Off, Setting::Auto | Setting::Off) => Err(TaxdivError::Config(
            "please specify at least one of: threshold, top_n".into(),
        )),
    }
}

fn sort_samples(sort_x: &SortX, labels: &[String]) -> Result<Option<Vec<String>>> {
    match sort_x {
        SortX::None => Ok(None),
        SortX::Labels(order) => {
            let want: AHashSet<&str> = order.iter().map(String::as_str).collect();
            let have: AHashSet<&str> = labels.iter().map(String::as_str).collect();
            if want != have {
                return Err(TaxdivError::Config(
                    "sort_x must have the same items as your dataset".into(),
                ));
            }
            Ok(Some(order.clone()))
        }
        SortX::With(f) => Ok(Some(f(labels))),
    }
}

/// Shapes abundance data into a long-format table for stacked bar charts.
pub struct BargraphBuilder<'a, S: AbundanceSource, M: MetadataSource> {
    source: &'a S,
    taxonomy: &'a Taxonomy,
    metadata: &'a M,
}

impl<'a, S: AbundanceSource, M: MetadataSource> BargraphBuilder<'a, S, M> {
    pub fn new(source: &'a S, taxonomy: &'a Taxonomy, metadata: &'a M) -> Self {
        BargraphBuilder {
            source,
            taxonomy,
            metadata,
        }
    }

    /// Build the shaped table and wrap it in a chart specification.
    pub fn plot_bargraph(&self, opts: &BargraphOptions) -> Result<ChartSpec> {
        let graph = self.build(opts)?;
        Ok(bar_chart(graph, opts))
    }

    /// Build the long-format table and its deterministic orderings.
    pub fn build(&self, opts: &BargraphOptions) -> Result<Bargraph> {
        let Some(rank) = opts.rank else {
            return Err(TaxdivError::Config(
                "please specify a rank or 'auto' to choose automatically".into(),
            ));
        };

        let (top_n, threshold) = resolve_selection(opts.top_n, opts.threshold)?;

        // 1. Fetch the table; the source owns normalization and threshold
        //    filtering.
        let mut table = self.source.fetch(rank, opts.normalize, threshold)?;
        let field = self.source.field();

        let include_missing = opts
            .include_taxa_missing_rank
            .unwrap_or(field == Field::AbundanceWChildren);
        if include_missing && !(field.is_with_children() && table.normalized) {
            return Err(TaxdivError::Config(format!(
                "taxa missing a rank can only be imputed on normalized with-children data \
                 (field is {field})"
            )));
        }

        // 2. Residual mass not assigned to any taxon at this rank. The
        //    synthetic column competes for a top-N slot like any real taxon.
        let no_rank_name = format!("No {}", table.rank);
        if include_missing {
            let residuals: Vec<f64> = (0..table.n_samples())
                .map(|i| 1.0 - table.row_sum(i))
                .collect();
            table.push_column(no_rank_name.clone(), residuals);
        }

        // 3. Top-N cut by mean abundance across the cohort; tax id breaks
        //    ties so the selection is deterministic.
        if let Some(n) = top_n {
            let mut cols: Vec<usize> = (0..table.n_taxa()).collect();
            cols.sort_by(|&a, &b| {
                table
                    .column_mean(b)
                    .partial_cmp(&table.column_mean(a))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| table.tax_ids[a].cmp(&table.tax_ids[b]))
            });
            cols.truncate(n);
            table = table.select_columns(&cols);
        }

        // 4. Mass excluded by the cut.
        if opts.include_other && table.normalized {
            let others: Vec<f64> = (0..table.n_samples())
                .map(|i| 1.0 - table.row_sum(i))
                .collect();
            table.push_column("Other", others);
        }

        // 5. Metadata join: tooltip fields plus the faceting column, with
        //    "Label" always first.
        let mut tooltip = opts.tooltip.clone();
        if let Some(haxis) = &opts.haxis {
            tooltip.push(haxis.clone());
        }
        tooltip.insert(0, "Label".to_string());

        let (frame, mapping) = self.metadata.fetch(&tooltip, &opts.label)?;

        // 6. Melt wide -> long, attaching display names.
        let mut rows = Vec::with_capacity(table.n_samples() * table.n_taxa());
        for (i, classification_id) in table.sample_ids.iter().enumerate() {
            let label = frame.label_for(classification_id);
            let metadata = frame.fields_for(classification_id);
            for (j, tax_id) in table.tax_ids.iter().enumerate() {
                rows.push(BargraphRow {
                    classification_id: classification_id.clone(),
                    label: label.clone(),
                    tax_id: tax_id.clone(),
                    tax_name: self.display_name(tax_id),
                    value: table.rows[i][j],
                    order: 0,
                    metadata: metadata.clone(),
                });
            }
        }

        // 7. Taxon display order: alphabetical, with the synthetic buckets
        //    forced to the end ("No {rank}" before "Other").
        let mut tax_domain: Vec<String> = {
            let mut seen = AHashSet::new();
            rows.iter()
                .filter(|r| seen.insert(r.tax_name.clone()))
                .map(|r| r.tax_name.clone())
                .collect()
        };
        tax_domain.sort();
        for bucket in [no_rank_name.as_str(), "Other"] {
            if let Some(pos) = tax_domain.iter().position(|t| t == bucket) {
                let name = tax_domain.remove(pos);
                tax_domain.push(name);
            }
        }

        for row in &mut rows {
            row.order = tax_domain
                .iter()
                .position(|t| t == &row.tax_name)
                .unwrap_or(0);
        }

        // 8. Sample (x-axis) ordering via the pluggable strategy.
        let labels: Vec<String> = {
            let mut seen = AHashSet::new();
            rows.iter()
                .filter(|r| seen.insert(r.label.clone()))
                .map(|r| r.label.clone())
                .collect()
        };
        let sample_order = sort_samples(&opts.sort_x, &labels)?;

        let tooltip_fields: Vec<String> = tooltip
            .iter()
            .map(|f| mapping.get(f).cloned().unwrap_or_else(|| f.clone()))
            .collect();

        Ok(Bargraph {
            rows,
            tax_domain,
            sample_order,
            tooltip_fields,
            field,
            rank: table.rank,
            normalized: table.normalized,
            haxis: opts.haxis.clone(),
        })
    }

    fn display_name(&self, tax_id: &str) -> String {
        match self.taxonomy.name(tax_id) {
            Some(name) => format!("{name} ({tax_id})"),
            None => tax_id.to_string(),
        }
    }
}
