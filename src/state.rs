use std::collections::{BTreeMap, BTreeSet};

use crate::backmap::{backmap, BackmapError, OutputRange, RecoloredRaster};
use crate::data::filter::{filtered_indices, init_filter_state, FilterState};
use crate::data::mask::LabelMask;
use crate::data::model::{FeatureTable, MetadataValue};
use crate::data::store::{FeatureStore, StoreError};

// ---------------------------------------------------------------------------
// View session
// ---------------------------------------------------------------------------

/// Why the current selection could not be rendered.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewError {
    #[error("no image selected")]
    NoImageSelected,
    #[error("no feature selected")]
    NoFeatureSelected,
    #[error("no label mask registered for image {0}")]
    NoMask(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Backmap(#[from] BackmapError),
}

/// Selection state for browsing backmapped features, independent of rendering.
///
/// Every setter re-runs the backmap for the current selection; the result is
/// either a fresh raster or a diagnostic in `status_message`.
pub struct ViewSession {
    table: FeatureTable,

    /// Label masks by image id.
    masks: BTreeMap<i64, LabelMask>,

    /// Per-column filter selections. Filtered-out objects render as background.
    pub filters: FilterState,

    pub image_id: Option<i64>,
    pub feature: Option<String>,
    pub range: OutputRange<u8>,

    /// Raster for the current selection, if it could be computed.
    pub raster: Option<RecoloredRaster<u8>>,

    /// Diagnostic for the current selection, shown instead of the raster.
    pub status_message: Option<String>,
}

impl ViewSession {
    pub fn new(table: FeatureTable) -> Self {
        Self {
            filters: init_filter_state(&table),
            table,
            masks: BTreeMap::new(),
            image_id: None,
            feature: None,
            range: OutputRange::default(),
            raster: None,
            status_message: None,
        }
    }

    /// Register the mask for an image. Does not change the selection.
    pub fn add_mask(&mut self, image_id: i64, mask: LabelMask) {
        self.masks.insert(image_id, mask);
        if self.image_id == Some(image_id) {
            self.refresh();
        }
    }

    pub fn select_image(&mut self, image_id: i64) {
        self.image_id = Some(image_id);
        self.refresh();
    }

    pub fn select_feature(&mut self, feature: &str) {
        self.feature = Some(feature.to_string());
        self.refresh();
    }

    pub fn set_range(&mut self, range: OutputRange<u8>) {
        self.range = range;
        self.refresh();
    }

    /// Replace all filter selections at once.
    pub fn set_filters(&mut self, filters: FilterState) {
        self.filters = filters;
        self.refresh();
    }

    /// Toggle a single value in a column's filter.
    pub fn toggle_filter_value(&mut self, column: &str, value: &MetadataValue) {
        let selected = self.filters.entry(column.to_string()).or_default();
        if !selected.remove(value) {
            selected.insert(value.clone());
        }
        self.refresh();
    }

    /// Select all values in a column.
    pub fn select_all(&mut self, column: &str) {
        if let Some(all_vals) = self.table.unique_values.get(column) {
            self.filters.insert(column.to_string(), all_vals.clone());
            self.refresh();
        }
    }

    /// Deselect all values in a column.
    pub fn select_none(&mut self, column: &str) {
        self.filters.insert(column.to_string(), BTreeSet::new());
        self.refresh();
    }

    /// Recompute the raster for the current selection.
    pub fn refresh(&mut self) {
        if self.image_id.is_none() || self.feature.is_none() {
            self.raster = None;
            self.status_message = None;
            return;
        }
        match self.compute() {
            Ok(raster) => {
                log::debug!(
                    "Backmapped '{}' for image {:?} ({} objects, {:?})",
                    self.feature.as_deref().unwrap_or_default(),
                    self.image_id,
                    raster.object_values().len(),
                    raster.condition()
                );
                self.raster = Some(raster);
                self.status_message = None;
            }
            Err(e) => {
                log::warn!("Cannot render selection: {e}");
                self.raster = None;
                self.status_message = Some(e.to_string());
            }
        }
    }

    fn compute(&self) -> Result<RecoloredRaster<u8>, ViewError> {
        let image_id = self.image_id.ok_or(ViewError::NoImageSelected)?;
        let feature = self.feature.as_deref().ok_or(ViewError::NoFeatureSelected)?;
        let mask = self.masks.get(&image_id).ok_or(ViewError::NoMask(image_id))?;

        let visible: BTreeSet<usize> = filtered_indices(&self.table, &self.filters)
            .into_iter()
            .collect();
        let rows: Vec<usize> = self
            .table
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.image_id == image_id)
            .map(|(i, _)| i)
            .collect();
        if rows.iter().all(|i| visible.contains(i)) {
            let features = self.table.feature_column(image_id, feature)?;
            return Ok(backmap(mask, &features, self.range)?);
        }
        if !self.table.has_column(feature) {
            return Err(StoreError::UnknownFeature(feature.to_string()).into());
        }

        // Hidden objects become background and are not read at all; positions
        // still pair row i with the i-th sorted mask id.
        let ids = mask.object_ids();
        if ids.len() != rows.len() {
            return Err(BackmapError::ShapeMismatch {
                features: rows.len(),
                objects: ids.len(),
            }
            .into());
        }
        let mut kept_ids = Vec::new();
        let mut kept_features = Vec::new();
        for (&row, &id) in rows.iter().zip(&ids) {
            if !visible.contains(&row) {
                continue;
            }
            let rec = &self.table.records[row];
            let value = rec
                .get(feature)
                .and_then(MetadataValue::as_f64)
                .ok_or_else(|| StoreError::NonNumeric {
                    image_id,
                    object_number: rec.object_number,
                    feature: feature.to_string(),
                })?;
            kept_ids.push(id);
            kept_features.push(value);
        }
        Ok(backmap(&mask.retain_objects(&kept_ids), &kept_features, self.range)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backmap::Condition;
    use crate::data::model::ObjectRecord;

    fn record(image_id: i64, object_number: i64, area: f64, well: &str) -> ObjectRecord {
        let mut values = BTreeMap::new();
        values.insert("Area".to_string(), MetadataValue::Float(area));
        values.insert("Well".to_string(), MetadataValue::String(well.into()));
        ObjectRecord {
            image_id,
            object_number,
            values,
        }
    }

    fn session() -> ViewSession {
        let table = FeatureTable::from_records(vec![
            record(1, 1, 10.0, "B03"),
            record(1, 2, 20.0, "C04"),
            record(1, 3, 30.0, "B03"),
            record(2, 1, 5.0, "B03"),
        ]);
        let mut s = ViewSession::new(table);
        s.add_mask(1, LabelMask::from_rows(&[[0u32, 1, 2], [3, 3, 0]]).unwrap());
        s
    }

    #[test]
    fn test_renders_after_full_selection() {
        let mut s = session();
        s.select_image(1);
        assert!(s.raster.is_none());
        assert!(s.status_message.is_none());

        s.select_feature("Area");
        let r = s.raster.as_ref().unwrap();
        assert_eq!(r.object_values(), &[(1, 0), (2, 128), (3, 255)]);
        assert!(s.status_message.is_none());
    }

    #[test]
    fn test_invalid_selection_sets_diagnostic() {
        let mut s = session();
        s.select_feature("Area");
        s.select_image(2);
        assert!(s.raster.is_none());
        assert_eq!(
            s.status_message.as_deref(),
            Some("no label mask registered for image 2")
        );

        s.select_image(1);
        s.select_feature("Perimeter");
        assert!(s.raster.is_none());
        assert!(s.status_message.as_deref().unwrap().contains("Perimeter"));
    }

    #[test]
    fn test_range_change_rerenders() {
        let mut s = session();
        s.select_image(1);
        s.select_feature("Area");
        s.set_range(OutputRange::new(100, 200).unwrap());
        let r = s.raster.as_ref().unwrap();
        assert_eq!(r.object_values(), &[(1, 100), (2, 150), (3, 200)]);
    }

    #[test]
    fn test_filtered_objects_become_background() {
        let mut s = session();
        s.select_image(1);
        s.select_feature("Area");
        s.toggle_filter_value("Well", &MetadataValue::String("C04".into()));

        let r = s.raster.as_ref().unwrap();
        // Object 2 (Well C04) is hidden; 1 and 3 are rescaled on their own.
        assert_eq!(r.object_values(), &[(1, 0), (3, 255)]);
        assert!(r.is_background(2, 0));

        s.select_none("Well");
        let r = s.raster.as_ref().unwrap();
        assert_eq!(r.condition(), Condition::EmptyMask);

        s.select_all("Well");
        assert_eq!(s.raster.as_ref().unwrap().object_values().len(), 3);
    }

    #[test]
    fn test_hidden_rows_with_missing_values_do_not_block_render() {
        let mut missing = record(1, 2, 0.0, "C04");
        missing.values.insert("Area".to_string(), MetadataValue::Null);
        let table = FeatureTable::from_records(vec![
            record(1, 1, 10.0, "B03"),
            missing,
            record(1, 3, 30.0, "B03"),
        ]);
        let mut s = ViewSession::new(table);
        s.add_mask(1, LabelMask::from_rows(&[[0u32, 1, 2], [3, 3, 0]]).unwrap());
        s.select_image(1);
        s.select_feature("Area");
        assert!(s.raster.is_none());
        assert!(s.status_message.as_deref().unwrap().contains("not numeric"));

        s.toggle_filter_value("Well", &MetadataValue::String("C04".into()));
        let r = s.raster.as_ref().unwrap();
        assert_eq!(r.object_values(), &[(1, 0), (3, 255)]);
        assert!(s.status_message.is_none());

        // Visible rows are still checked.
        s.select_all("Well");
        s.toggle_filter_value("Well", &MetadataValue::String("B03".into()));
        assert!(s.raster.is_none());
        assert!(s.status_message.as_deref().unwrap().contains("object 2"));
    }

    #[test]
    fn test_mask_registered_after_selection() {
        let table = FeatureTable::from_records(vec![record(7, 1, 1.0, "B03")]);
        let mut s = ViewSession::new(table);
        s.select_image(7);
        s.select_feature("Area");
        assert!(s.status_message.is_some());

        s.add_mask(7, LabelMask::from_rows(&[[1u32]]).unwrap());
        assert!(s.status_message.is_none());
        assert_eq!(s.raster.as_ref().unwrap().condition(), Condition::DegenerateRange);
    }
}
