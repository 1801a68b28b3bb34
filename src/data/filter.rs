use std::collections::{BTreeMap, BTreeSet};

use super::model::{FeatureTable, MetadataValue};

// ---------------------------------------------------------------------------
// Filter predicate: which unique values are selected per column
// ---------------------------------------------------------------------------

/// Per-column selection state: maps column_name → set of selected values.
/// A column absent from the map is unconstrained.
pub type FilterState = BTreeMap<String, BTreeSet<MetadataValue>>;

/// Initialise a [`FilterState`] with all values selected (i.e., keep everything).
pub fn init_filter_state(table: &FeatureTable) -> FilterState {
    table
        .unique_values
        .iter()
        .map(|(col, vals)| (col.clone(), vals.clone()))
        .collect()
}

/// Parse `column=value` selections as given on the command line.
/// Repeated columns accumulate values.
pub fn parse_selections<S: AsRef<str>>(
    table: &FeatureTable,
    selections: &[S],
) -> Result<FilterState, FilterError> {
    let mut filters = FilterState::new();
    for sel in selections {
        let sel = sel.as_ref();
        let (col, raw) = sel
            .split_once('=')
            .ok_or_else(|| FilterError::Malformed(sel.to_string()))?;
        let known = table
            .unique_values
            .get(col)
            .ok_or_else(|| FilterError::NotCategorical(col.to_string()))?;
        let value = known
            .iter()
            .find(|v| v.to_string() == raw)
            .cloned()
            .ok_or_else(|| FilterError::UnknownValue {
                column: col.to_string(),
                value: raw.to_string(),
            })?;
        filters.entry(col.to_string()).or_default().insert(value);
    }
    Ok(filters)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("selection '{0}' is not of the form column=value")]
    Malformed(String),
    #[error("column '{0}' is not a categorical column")]
    NotCategorical(String),
    #[error("column '{column}' has no value '{value}'")]
    UnknownValue { column: String, value: String },
}

/// Return indices of records that pass all active filters.
///
/// A record passes a column filter when:
/// * The column is not present in `filters` → passes (no constraint)
/// * The filter set for that column is empty → nothing selected → fails
/// * The record's value for that column is in the selected set → passes
pub fn filtered_indices(table: &FeatureTable, filters: &FilterState) -> Vec<usize> {
    table
        .records
        .iter()
        .enumerate()
        .filter(|(_, rec)| {
            for (col, selected) in filters {
                if selected.is_empty() {
                    return false;
                }
                if let Some(all_vals) = table.unique_values.get(col) {
                    if selected.len() == all_vals.len() {
                        continue;
                    }
                }
                let passes = match rec.get(col) {
                    Some(val) => selected.contains(val),
                    // A missing cell only passes when Null is selected.
                    None => selected.contains(&MetadataValue::Null),
                };
                if !passes {
                    return false;
                }
            }
            true
        })
        .map(|(i, _)| i)
        .collect()
}
