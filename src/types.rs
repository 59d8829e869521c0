// src/types.rs

use std::fmt;

use crate::error::{Result, TaxdivError};

/// The fixed taxonomic rank ladder, broadest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rank {
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
}

impl Rank {
    /// Depth in the rank ladder; smaller is broader.
    pub fn depth(self) -> u8 {
        match self {
            Rank::Kingdom => 0,
            Rank::Phylum => 1,
            Rank::Class => 2,
            Rank::Order => 3,
            Rank::Family => 4,
            Rank::Genus => 5,
            Rank::Species => 6,
        }
    }

    /// Parse a rank label as found in taxonomy files. Labels outside the
    /// ladder (e.g. "no rank", "strain") yield `None`.
    pub fn parse(label: &str) -> Option<Rank> {
        match label.trim().to_ascii_lowercase().as_str() {
            "kingdom" | "superkingdom" | "domain" => Some(Rank::Kingdom),
            "phylum" => Some(Rank::Phylum),
            "class" => Some(Rank::Class),
            "order" => Some(Rank::Order),
            "family" => Some(Rank::Family),
            "genus" => Some(Rank::Genus),
            "species" => Some(Rank::Species),
            _ => None,
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rank::Kingdom => "kingdom",
            Rank::Phylum => "phylum",
            Rank::Class => "class",
            Rank::Order => "order",
            Rank::Family => "family",
            Rank::Genus => "genus",
            Rank::Species => "species",
        };
        f.write_str(s)
    }
}

/// A rank request: either a concrete rank or "auto", resolved by the
/// abundance source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankRequest {
    Auto,
    At(Rank),
}

impl RankRequest {
    pub fn parse(s: &str) -> Result<RankRequest> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(RankRequest::Auto);
        }
        Rank::parse(s).map(RankRequest::At).ok_or_else(|| {
            TaxdivError::Config(format!(
                "rank must be one of: auto, kingdom, phylum, class, order, family, genus, species (got '{s}')"
            ))
        })
    }
}

/// The abundance field backing a table. With-children fields double-count
/// through ancestor taxa, so `1 - row_sum` is a valid "unclassified at this
/// rank" residual once normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Abundance,
    AbundanceWChildren,
    Readcount,
    ReadcountWChildren,
}

impl Field {
    pub fn is_with_children(self) -> bool {
        matches!(self, Field::AbundanceWChildren | Field::ReadcountWChildren)
    }

    pub fn is_abundance(self) -> bool {
        matches!(self, Field::Abundance | Field::AbundanceWChildren)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Field::Abundance => "abundance",
            Field::AbundanceWChildren => "abundance_w_children",
            Field::Readcount => "readcount",
            Field::ReadcountWChildren => "readcount_w_children",
        };
        f.write_str(s)
    }
}

/// Within-sample diversity metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaMetric {
    Simpson,
    Chao1,
    Shannon,
}

impl AlphaMetric {
    pub fn parse(s: &str) -> Result<AlphaMetric> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simpson" => Ok(AlphaMetric::Simpson),
            "chao1" => Ok(AlphaMetric::Chao1),
            "shannon" => Ok(AlphaMetric::Shannon),
            _ => Err(TaxdivError::Config(format!(
                "for alpha diversity, metric must be one of: simpson, chao1, shannon (got '{s}')"
            ))),
        }
    }
}

impl fmt::Display for AlphaMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlphaMetric::Simpson => "simpson",
            AlphaMetric::Chao1 => "chao1",
            AlphaMetric::Shannon => "shannon",
        };
        f.write_str(s)
    }
}

/// Between-sample diversity metrics. The UniFrac variants are routed through
/// the phylogenetic path by the calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetaMetric {
    Jaccard,
    BrayCurtis,
    CityBlock,
    WeightedUnifrac,
    UnweightedUnifrac,
}

impl BetaMetric {
    pub fn parse(s: &str) -> Result<BetaMetric> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jaccard" => Ok(BetaMetric::Jaccard),
            "braycurtis" => Ok(BetaMetric::BrayCurtis),
            "cityblock" => Ok(BetaMetric::CityBlock),
            "weighted_unifrac" => Ok(BetaMetric::WeightedUnifrac),
            "unweighted_unifrac" => Ok(BetaMetric::UnweightedUnifrac),
            _ => Err(TaxdivError::Config(format!(
                "for beta diversity, metric must be one of: jaccard, braycurtis, cityblock, \
                 weighted_unifrac, unweighted_unifrac (got '{s}')"
            ))),
        }
    }
}

impl fmt::Display for BetaMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BetaMetric::Jaccard => "jaccard",
            BetaMetric::BrayCurtis => "braycurtis",
            BetaMetric::CityBlock => "cityblock",
            BetaMetric::WeightedUnifrac => "weighted_unifrac",
            BetaMetric::UnweightedUnifrac => "unweighted_unifrac",
        };
        f.write_str(s)
    }
}

/// Normalization request passed to the abundance source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalize {
    /// Let the source decide what is domain-appropriate for its field.
    #[default]
    Auto,
    Yes,
    No,
}

/// A tri-state option where "auto" defers to the crate default and "off"
/// explicitly disables the setting. Used for `top_n` / `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Setting<T> {
    #[default]
    Auto,
    Off,
    Value(T),
}

impl<T: Copy> Setting<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Setting::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_off(self) -> bool {
        matches!(self, Setting::Off)
    }
}
