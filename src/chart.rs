// src/chart.rs
//
// Declarative chart specifications. This crate only shapes data; a renderer
// consumes the spec and owns display/export.

use crate::bargraph::{Bargraph, BargraphOptions, BargraphRow};

/// A positional encoding: which row field drives the axis, and how.
#[derive(Debug, Clone)]
pub struct AxisEncoding {
    pub field: String,
    pub title: String,
    /// Explicit category order, when one exists.
    pub sort: Option<Vec<String>>,
}

/// The color encoding driving the stacked segments.
#[derive(Debug, Clone)]
pub struct ColorEncoding {
    pub field: String,
    pub legend_title: String,
    /// Category order shared with the legend.
    pub sort: Vec<String>,
}

/// Stacking-order encoding: the row field segments sort by, and which way.
#[derive(Debug, Clone)]
pub struct OrderEncoding {
    pub field: String,
    pub descending: bool,
}

/// Complete encoding block for a stacked bar chart.
#[derive(Debug, Clone)]
pub struct Encoding {
    pub x: AxisEncoding,
    pub y: AxisEncoding,
    pub color: ColorEncoding,
    /// Fields surfaced on hover, in display order.
    pub tooltip: Vec<String>,
    pub order: OrderEncoding,
    /// Metadata field used to facet into column groups.
    pub column: Option<String>,
}

/// A renderable chart: long-format rows plus the encoding to draw them.
#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub mark: &'static str,
    pub rows: Vec<BargraphRow>,
    pub encoding: Encoding,
    /// Fixed y scale domain; `[0, 1]` for normalized data.
    pub y_domain: Option<[f64; 2]>,
    pub title: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Wrap a shaped bargraph in a bar-mark chart specification.
pub fn bar_chart(graph: Bargraph, opts: &BargraphOptions) -> ChartSpec {
    let value_field = graph.field.to_string();

    // Label first, then taxon and value, then the caller's fields.
    let mut tooltip = vec![
        "Label".to_string(),
        "tax_name".to_string(),
        value_field.clone(),
    ];
    tooltip.extend(
        graph
            .tooltip_fields
            .iter()
            .filter(|f| *f != "Label")
            .cloned(),
    );

    let legend_title = opts
        .legend
        .clone()
        .unwrap_or_else(|| value_field.clone());

    ChartSpec {
        mark: "bar",
        encoding: Encoding {
            x: AxisEncoding {
                field: "Label".to_string(),
                title: opts.xlabel.clone().unwrap_or_default(),
                sort: graph.sample_order.clone(),
            },
            y: AxisEncoding {
                field: value_field.clone(),
                title: opts.ylabel.clone().unwrap_or(value_field),
                sort: None,
            },
            color: ColorEncoding {
                field: "tax_name".to_string(),
                legend_title,
                sort: graph.tax_domain.clone(),
            },
            tooltip,
            order: OrderEncoding {
                field: "order".to_string(),
                descending: true,
            },
            column: graph.haxis.clone(),
        },
        y_domain: if graph.normalized { Some([0.0, 1.0]) } else { None },
        title: opts.title.clone(),
        width: opts.width,
        height: opts.height,
        rows: graph.rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SampleMetadata;
    use crate::table::test_support::count_source;
    use crate::taxonomy::test_taxonomy;
    use crate::types::{Field, Normalize, Rank, RankRequest};
    use crate::bargraph::BargraphBuilder;

    #[test]
    fn bar_chart_encodes_domain_and_scale() {
        let source = count_source(Field::Readcount);
        let taxonomy = test_taxonomy();
        let metadata = SampleMetadata::new();
        let builder = BargraphBuilder::new(&source, &taxonomy, &metadata);

        let opts = BargraphOptions {
            rank: Some(RankRequest::At(Rank::Genus)),
            normalize: Normalize::Yes,
            title: Some("gut cohort".into()),
            ..Default::default()
        };
        let spec = builder.plot_bargraph(&opts).unwrap();

        assert_eq!(spec.mark, "bar");
        assert_eq!(spec.encoding.x.field, "Label");
        assert_eq!(spec.encoding.y.field, "readcount");
        assert_eq!(spec.encoding.order.field, "order");
        assert!(spec.encoding.order.descending);
        assert_eq!(spec.encoding.color.sort.len(), 2);
        assert_eq!(spec.y_domain, Some([0.0, 1.0]));
        assert_eq!(spec.title.as_deref(), Some("gut cohort"));
        assert_eq!(
            spec.encoding.tooltip[..3],
            ["Label", "tax_name", "readcount"]
        );
        assert_eq!(spec.rows.len(), 4);
    }

    #[test]
    fn legend_defaults_to_field_name() {
        let source = count_source(Field::ReadcountWChildren);
        let taxonomy = test_taxonomy();
        let metadata = SampleMetadata::new();
        let builder = BargraphBuilder::new(&source, &taxonomy, &metadata);

        let opts = BargraphOptions {
            rank: Some(RankRequest::At(Rank::Genus)),
            normalize: Normalize::Yes,
            ..Default::default()
        };
        let spec = builder.plot_bargraph(&opts).unwrap();
        assert_eq!(spec.encoding.color.legend_title, "readcount_w_children");
    }
}
