use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ---------------------------------------------------------------------------
// MetadataValue – a single cell in a feature table column
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value mirroring common dataframe dtypes.
/// Used as a key in `BTreeSet`s downstream, so it must be `Ord`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// ISO-8601 date string kept as text.
    Date(String),
    Null,
}

impl Eq for MetadataValue {}

impl PartialOrd for MetadataValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetadataValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use MetadataValue::*;
        fn rank(v: &MetadataValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
                Date(_) => 5,
            }
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) | (Date(a), Date(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl std::hash::Hash for MetadataValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            MetadataValue::String(s) | MetadataValue::Date(s) => s.hash(state),
            MetadataValue::Integer(i) => i.hash(state),
            MetadataValue::Float(f) => f.to_bits().hash(state),
            MetadataValue::Bool(b) => b.hash(state),
            MetadataValue::Null => {}
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v:.4}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Date(d) => write!(f, "{d}"),
            MetadataValue::Null => write!(f, "<null>"),
        }
    }
}

impl MetadataValue {
    /// Interpret the value as an `f64` feature value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(v) => Some(*v),
            MetadataValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Interpret the value as an integer id (image or object number).
    /// Floats are accepted when they carry an exact integer, since pandas
    /// writes id columns as floats as soon as one of them is missing.
    pub fn as_id(&self) -> Option<i64> {
        match self {
            MetadataValue::Integer(i) => Some(*i),
            MetadataValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    /// Columns of these types are offered as categorical filters.
    pub fn is_categorical(&self) -> bool {
        matches!(
            self,
            MetadataValue::String(_) | MetadataValue::Bool(_) | MetadataValue::Date(_)
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }
}

// ---------------------------------------------------------------------------
// ObjectRecord – one row of the feature table
// ---------------------------------------------------------------------------

/// Features measured for a single segmented object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    /// Image the object was segmented from.
    pub image_id: i64,
    /// Object index inside its image; matches the label value in the mask.
    pub object_number: i64,
    /// Named feature / metadata columns: column_name → value.
    pub values: BTreeMap<String, MetadataValue>,
}

impl ObjectRecord {
    pub fn get(&self, column: &str) -> Option<&MetadataValue> {
        self.values.get(column)
    }
}

// ---------------------------------------------------------------------------
// FeatureTable – the complete loaded table
// ---------------------------------------------------------------------------

/// The parsed per-object feature table with pre-computed column indices.
///
/// A table is never mutated after construction. Derived columns and cleaned
/// subsets are produced as new tables (see [`FeatureTable::with_column`] and
/// [`FeatureTable::drop_incomplete`]).
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    /// All objects (rows), in source order.
    pub records: Vec<ObjectRecord>,
    /// Ordered list of value column names (excludes the id columns).
    pub column_names: Vec<String>,
    /// For each categorical column the sorted set of unique values.
    pub unique_values: BTreeMap<String, BTreeSet<MetadataValue>>,
}

impl FeatureTable {
    /// Build column indices from the loaded records.
    pub fn from_records(records: Vec<ObjectRecord>) -> Self {
        let mut column_names_set: BTreeSet<String> = BTreeSet::new();
        let mut unique_values: BTreeMap<String, BTreeSet<MetadataValue>> = BTreeMap::new();

        for rec in &records {
            for (col, val) in &rec.values {
                column_names_set.insert(col.clone());
                if val.is_categorical() {
                    unique_values
                        .entry(col.clone())
                        .or_default()
                        .insert(val.clone());
                }
            }
        }
        // Missing cells still need to be selectable in a categorical filter.
        for (col, vals) in unique_values.iter_mut() {
            if records.iter().any(|r| r.get(col).map_or(true, MetadataValue::is_null)) {
                vals.insert(MetadataValue::Null);
            }
        }

        FeatureTable {
            records,
            column_names: column_names_set.into_iter().collect(),
            unique_values,
        }
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted distinct image ids.
    pub fn image_ids(&self) -> Vec<i64> {
        self.records
            .iter()
            .map(|r| r.image_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }

    /// Columns whose non-null cells are all numeric (at least one present).
    pub fn numeric_columns(&self) -> Vec<String> {
        self.column_names
            .iter()
            .filter(|col| {
                let mut seen = false;
                for rec in &self.records {
                    match rec.get(col) {
                        None | Some(MetadataValue::Null) => {}
                        Some(v) if v.as_f64().is_some() => seen = true,
                        Some(_) => return false,
                    }
                }
                seen
            })
            .cloned()
            .collect()
    }

    /// Records belonging to one image, in table order.
    pub fn records_for_image(&self, image_id: i64) -> impl Iterator<Item = &ObjectRecord> {
        self.records.iter().filter(move |r| r.image_id == image_id)
    }

    /// Return a new table with an extra column, one value per record.
    ///
    /// Used for derived per-object results such as cluster assignments or
    /// classifier labels.
    pub fn with_column(
        &self,
        name: &str,
        values: Vec<MetadataValue>,
    ) -> Result<FeatureTable, TableError> {
        if self.has_column(name) {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }
        if values.len() != self.records.len() {
            return Err(TableError::LengthMismatch {
                column: name.to_string(),
                values: values.len(),
                rows: self.records.len(),
            });
        }
        let records = self
            .records
            .iter()
            .zip(values)
            .map(|(rec, v)| {
                let mut rec = rec.clone();
                rec.values.insert(name.to_string(), v);
                rec
            })
            .collect();
        Ok(FeatureTable::from_records(records))
    }

    /// Return a new table without the rows that have a missing or
    /// non-finite value in any of `columns`.
    pub fn drop_incomplete(&self, columns: &[&str]) -> FeatureTable {
        let records: Vec<ObjectRecord> = self
            .records
            .iter()
            .filter(|rec| {
                columns.iter().all(|col| match rec.get(col) {
                    None | Some(MetadataValue::Null) => false,
                    Some(MetadataValue::Float(v)) => v.is_finite(),
                    Some(_) => true,
                })
            })
            .cloned()
            .collect();
        let dropped = self.records.len() - records.len();
        if dropped > 0 {
            log::debug!("Dropped {dropped} incomplete rows (checked {} columns)", columns.len());
        }
        FeatureTable::from_records(records)
    }
}

/// Failures of table-building operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableError {
    #[error("column '{0}' already exists")]
    DuplicateColumn(String),
    #[error("column '{column}' has {values} values but the table has {rows} rows")]
    LengthMismatch {
        column: String,
        values: usize,
        rows: usize,
    },
}
