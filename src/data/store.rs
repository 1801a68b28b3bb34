use super::model::{FeatureTable, MetadataValue};

// ---------------------------------------------------------------------------
// FeatureStore – per-image feature column lookup
// ---------------------------------------------------------------------------

/// One scalar per object of an image, positionally paired with the sorted
/// distinct nonzero ids of that image's mask.
pub type FeatureVector = Vec<f64>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("no objects recorded for image {0}")]
    UnknownImage(i64),
    #[error("unknown feature column '{0}'")]
    UnknownFeature(String),
    #[error("feature '{feature}' is not numeric for image {image_id}, object {object_number}")]
    NonNumeric {
        image_id: i64,
        object_number: i64,
        feature: String,
    },
}

/// Read-only source of per-object feature columns.
pub trait FeatureStore {
    /// Values of `feature` for every object of `image_id`, in store order.
    fn feature_column(&self, image_id: i64, feature: &str) -> Result<FeatureVector, StoreError>;
}

impl FeatureStore for FeatureTable {
    /// Values come back in table row order. They are *not* re-sorted by
    /// object number: a table whose rows are out of order will pair values
    /// with the wrong mask objects, so that case is logged instead.
    fn feature_column(&self, image_id: i64, feature: &str) -> Result<FeatureVector, StoreError> {
        if !self.has_column(feature) {
            return Err(StoreError::UnknownFeature(feature.to_string()));
        }

        let mut values = Vec::new();
        let mut object_numbers = Vec::new();
        for rec in self.records_for_image(image_id) {
            let value = rec
                .get(feature)
                .and_then(MetadataValue::as_f64)
                .ok_or_else(|| StoreError::NonNumeric {
                    image_id,
                    object_number: rec.object_number,
                    feature: feature.to_string(),
                })?;
            values.push(value);
            object_numbers.push(rec.object_number);
        }

        if values.is_empty() {
            return Err(StoreError::UnknownImage(image_id));
        }
        if !object_numbers.windows(2).all(|w| w[0] < w[1]) {
            log::warn!(
                "Image {image_id}: object numbers are not strictly ascending; \
                 '{feature}' values may be paired with the wrong mask objects"
            );
        }
        Ok(values)
    }
}
