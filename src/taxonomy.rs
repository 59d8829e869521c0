// src/taxonomy.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ahash::AHashMap;
use flate2::read::MultiGzDecoder;

pub type ParentMap = AHashMap<String, String>;
pub type NameMap = AHashMap<String, String>;
pub type RankMap = AHashMap<String, String>;

/// Taxonomy metadata: enough to build a full rooted tree with rank-labeled
/// nodes. Tax ids are kept as strings so synthetic chart buckets and real
/// taxa share one identifier space.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    /// child tax id -> parent tax id
    pub parent_map: ParentMap,
    /// tax id -> scientific name
    pub name_map: NameMap,
    /// tax id -> rank label (may be "no rank")
    pub rank_map: RankMap,
}

impl Taxonomy {
    pub fn name(&self, tax_id: &str) -> Option<&str> {
        self.name_map.get(tax_id).map(String::as_str)
    }

    pub fn rank_label(&self, tax_id: &str) -> Option<&str> {
        self.rank_map.get(tax_id).map(String::as_str)
    }

    /// The root tax id: a node that is its own parent, or failing that, a
    /// node whose parent is unknown to the taxonomy. With several candidates
    /// the smallest tax id wins, so the choice is deterministic.
    pub fn root_id(&self) -> Option<&str> {
        let mut candidates: Vec<&str> = self
            .parent_map
            .iter()
            .filter(|(id, parent)| id == parent)
            .map(|(id, _)| id.as_str())
            .collect();
        if candidates.is_empty() {
            candidates = self
                .parent_map
                .values()
                .filter(|parent| !self.parent_map.contains_key(parent.as_str()))
                .map(String::as_str)
                .collect();
        }
        candidates.sort_by(|a, b| cmp_tax_ids(a, b));
        candidates.dedup();
        if candidates.len() > 1 {
            log::warn!(
                "taxonomy has {} root candidates; keeping {} and dropping the rest",
                candidates.len(),
                candidates[0]
            );
        }
        candidates.first().copied()
    }
}

/// Numeric tax ids sort numerically, ahead of non-numeric ids.
pub(crate) fn cmp_tax_ids(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Build a map of `parent -> Vec<child>` for traversing the taxonomy.
/// Children are sorted by tax id so traversal order is deterministic.
pub fn build_children_map(parent_map: &ParentMap) -> AHashMap<String, Vec<String>> {
    let mut children_map: AHashMap<String, Vec<String>> = AHashMap::new();

    for tax_id in parent_map.keys() {
        children_map.entry(tax_id.clone()).or_default();
    }

    for (child, parent) in parent_map {
        if child != parent {
            children_map.entry(parent.clone()).or_default().push(child.clone());
        }
    }

    for kids in children_map.values_mut() {
        kids.sort();
    }
    children_map
}

/// Open a text file, transparently decompressing `.gz`.
pub(crate) fn open_text<P: AsRef<Path>>(path: P) -> std::io::Result<Box<dyn BufRead>> {
    let f = File::open(&path)?;

    let is_gz = path
        .as_ref()
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    Ok(if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    })
}

/// Parses a taxonomy file in the format:
/// ```text
/// <taxid>\t<parentid>\t<taxname>\t<rank>
/// ```
/// Malformed lines are skipped. `.gz` input is handled transparently.
pub fn parse_taxonomy<P: AsRef<Path>>(filepath: P) -> std::io::Result<Taxonomy> {
    let reader = open_text(filepath)?;

    let mut parent_map: ParentMap = AHashMap::new();
    let mut name_map: NameMap = AHashMap::new();
    let mut rank_map: RankMap = AHashMap::new();

    for line_result in reader.lines() {
        let line = line_result?;
        // Expecting 4 tab-separated fields: taxid, parentid, taxname, rank
        let parts: Vec<&str> = line.split('\t').collect();

        // Skip malformed lines
        if parts.len() < 4 {
            continue;
        }

        let tax_id = parts[0].trim();
        let parent_id = parts[1].trim();
        let tax_name = parts[2].trim();
        let rank = parts[3].trim();

        if tax_id.is_empty() || parent_id.is_empty() {
            continue;
        }

        parent_map.insert(tax_id.to_string(), parent_id.to_string());
        name_map.insert(tax_id.to_string(), tax_name.to_string());
        rank_map.insert(tax_id.to_string(), rank.to_string());
    }

    log::info!("parsed taxonomy with {} nodes", parent_map.len());

    Ok(Taxonomy {
        parent_map,
        name_map,
        rank_map,
    })
}

#[cfg(test)]
pub(crate) fn test_taxonomy() -> Taxonomy {
    // 1 (root, no rank)
    //  `- 2 Bacteria (kingdom)
    //      |- 1224 Proteobacteria (phylum)
    //      |   `- 561 Escherichia (genus)
    //      |       `- 562 Escherichia coli (species)
    //      `- 1239 Firmicutes (phylum)
    //          `- 1578 Lactobacillus (genus)
    //              `- 1582 Lactobacillus casei (species)
    let rows = [
        ("1", "1", "root", "no rank"),
        ("2", "1", "Bacteria", "superkingdom"),
        ("1224", "2", "Proteobacteria", "phylum"),
        ("561", "1224", "Escherichia", "genus"),
        ("562", "561", "Escherichia coli", "species"),
        ("1239", "2", "Firmicutes", "phylum"),
        ("1578", "1239", "Lactobacillus", "genus"),
        ("1582", "1578", "Lactobacillus casei", "species"),
    ];

    let mut taxonomy = Taxonomy::default();
    for (id, parent, name, rank) in rows {
        taxonomy.parent_map.insert(id.to_string(), parent.to_string());
        taxonomy.name_map.insert(id.to_string(), name.to_string());
        taxonomy.rank_map.insert(id.to_string(), rank.to_string());
    }
    taxonomy
}

#[cfg(test)]
pub(crate) fn forked_test_taxonomy() -> Taxonomy {
    // 1 (root, no rank)
    //  |- 2 Bacteria (superkingdom)
    //  |   `- 561 Escherichia (genus)
    //  `- 2157 Archaea (superkingdom)
    //      `- 2172 Methanobrevibacter (genus)
    let rows = [
        ("1", "1", "root", "no rank"),
        ("2", "1", "Bacteria", "superkingdom"),
        ("561", "2", "Escherichia", "genus"),
        ("2157", "1", "Archaea", "superkingdom"),
        ("2172", "2157", "Methanobrevibacter", "genus"),
    ];

    let mut taxonomy = Taxonomy::default();
    for (id, parent, name, rank) in rows {
        taxonomy.parent_map.insert(id.to_string(), parent.to_string());
        taxonomy.name_map.insert(id.to_string(), name.to_string());
        taxonomy.rank_map.insert(id.to_string(), rank.to_string());
    }
    taxonomy
}
