// src/metadata.rs

use ahash::AHashMap;

use crate::error::{Result, TaxdivError};

/// Metadata for one sample: field name -> value.
pub type MetadataMap = AHashMap<String, String>;

/// How to label each classification on the x axis.
pub enum LabelSpec {
    /// Use the "name" metadata field, falling back to the classification id.
    Default,
    /// Use a named metadata field.
    Field(String),
    /// Derive the label from the full metadata map.
    With(Box<dyn Fn(&MetadataMap) -> String>),
}

impl Default for LabelSpec {
    fn default() -> Self {
        LabelSpec::Default
    }
}

/// Resolved metadata columns, joinable by classification id. The first
/// column is always "Label".
#[derive(Debug, Clone)]
pub struct MetadataFrame {
    pub columns: Vec<String>,
    /// classification id -> values aligned with `columns`.
    pub rows: AHashMap<String, Vec<String>>,
}

/// The metadata-fetch collaborator contract: resolve the requested fields
/// and the label column, and report the field -> column mapping.
pub trait MetadataSource {
    fn fetch(
        &self,
        fields: &[String],
        label: &LabelSpec,
    ) -> Result<(MetadataFrame, AHashMap<String, String>)>;
}

/// In-memory sample metadata.
#[derive(Debug, Clone, Default)]
pub struct SampleMetadata {
    entries: AHashMap<String, MetadataMap>,
}

impl SampleMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, classification_id: impl Into<String>, metadata: MetadataMap) {
        self.entries.insert(classification_id.into(), metadata);
    }

    pub fn set(
        &mut self,
        classification_id: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.entries
            .entry(classification_id.into())
            .or_default()
            .insert(field.into(), value.into());
    }

    fn resolve_label(&self, classification_id: &str, label: &LabelSpec) -> String {
        let empty = MetadataMap::new();
        let metadata = self.entries.get(classification_id).unwrap_or(&empty);
        let resolved = match label {
            LabelSpec::Default => metadata.get("name").cloned(),
            LabelSpec::Field(field) => metadata.get(field).cloned(),
            LabelSpec::With(f) => Some(f(metadata)),
        };
        resolved.unwrap_or_else(|| classification_id.to_string())
    }
}

impl MetadataSource for SampleMetadata {
    fn fetch(
        &self,
        fields: &[String],
        label: &LabelSpec,
    ) -> Result<(MetadataFrame, AHashMap<String, String>)> {
        let mut columns = vec!["Label".to_string()];
        let mut mapping: AHashMap<String, String> = AHashMap::new();
        mapping.insert("Label".to_string(), "Label".to_string());

        for field in fields {
            if field == "Label" {
                continue;
            }
            let known = self.entries.values().any(|m| m.contains_key(field));
            if !known {
                return Err(TaxdivError::Config(format!(
                    "metadata field '{field}' not found for any sample"
                )));
            }
            mapping.insert(field.clone(), field.clone());
            columns.push(field.clone());
        }

        let mut rows: AHashMap<String, Vec<String>> = AHashMap::new();
        for (classification_id, metadata) in &self.entries {
            let mut values = vec![self.resolve_label(classification_id, label)];
            for field in &columns[1..] {
                values.push(metadata.get(field).cloned().unwrap_or_default());
            }
            rows.insert(classification_id.clone(), values);
        }

        Ok((MetadataFrame { columns, rows }, mapping))
    }
}

impl MetadataFrame {
    /// Label for a classification, falling back to the bare id for samples
    /// the metadata has never seen.
    pub fn label_for(&self, classification_id: &str) -> String {
        self.rows
            .get(classification_id)
            .and_then(|v| v.first())
            .cloned()
            .unwrap_or_else(|| classification_id.to_string())
    }

    /// Non-label metadata pairs for a classification, column order.
    pub fn fields_for(&self, classification_id: &str) -> Vec<(String, String)> {
        let Some(values) = self.rows.get(classification_id) else {
            return self.columns[1..]
                .iter()
                .map(|c| (c.clone(), String::new()))
                .collect();
        };
        self.columns[1..]
            .iter()
            .zip(values[1..].iter())
            .map(|(c, v)| (c.clone(), v.clone()))
            .collect()
    }
}
