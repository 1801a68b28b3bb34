use std::collections::BTreeSet;
use std::path::Path;

use image::DynamicImage;

// ---------------------------------------------------------------------------
// LabelMask – segmentation raster
// ---------------------------------------------------------------------------

/// Integer raster where each segmented object carries a unique nonzero id.
/// `0` is background. Stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMask {
    width: usize,
    height: usize,
    labels: Vec<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum MaskError {
    #[error("mask buffer has {len} labels, expected {width}x{height}")]
    BufferSize {
        width: usize,
        height: usize,
        len: usize,
    },
    #[error("mask rows have uneven lengths (row {row} has {len}, expected {expected})")]
    RaggedRows {
        row: usize,
        len: usize,
        expected: usize,
    },
    #[error("label masks must be single-channel integer images, got {0:?}")]
    UnsupportedPixelFormat(image::ColorType),
    #[error("failed to read mask image")]
    Image(#[from] image::ImageError),
}

impl LabelMask {
    /// Wrap a row-major label buffer.
    pub fn new(width: usize, height: usize, labels: Vec<u32>) -> Result<Self, MaskError> {
        if width.checked_mul(height) != Some(labels.len()) {
            return Err(MaskError::BufferSize {
                width,
                height,
                len: labels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            labels,
        })
    }

    /// Build a mask from nested rows, mostly useful for small literal masks.
    pub fn from_rows<R: AsRef<[u32]>>(rows: &[R]) -> Result<Self, MaskError> {
        let width = rows.first().map_or(0, |r| r.as_ref().len());
        let mut labels = Vec::with_capacity(width * rows.len());
        for (row, r) in rows.iter().enumerate() {
            let r = r.as_ref();
            if r.len() != width {
                return Err(MaskError::RaggedRows {
                    row,
                    len: r.len(),
                    expected: width,
                });
            }
            labels.extend_from_slice(r);
        }
        Self::new(width, rows.len(), labels)
    }

    /// Read a mask from an 8- or 16-bit grayscale image (PNG or TIFF).
    ///
    /// Pixel values are used verbatim as object ids.
    pub fn open(path: &Path) -> Result<Self, MaskError> {
        let img = image::open(path)?;
        let mask = Self::from_image(&img)?;
        log::debug!(
            "Loaded {}x{} mask from {} with {} objects",
            mask.width,
            mask.height,
            path.display(),
            mask.object_count()
        );
        Ok(mask)
    }

    /// Convert a decoded image without rescaling its intensities.
    pub fn from_image(img: &DynamicImage) -> Result<Self, MaskError> {
        let (width, height) = (img.width() as usize, img.height() as usize);
        let labels: Vec<u32> = match img {
            DynamicImage::ImageLuma8(buf) => buf.as_raw().iter().map(|&v| u32::from(v)).collect(),
            DynamicImage::ImageLuma16(buf) => buf.as_raw().iter().map(|&v| u32::from(v)).collect(),
            other => return Err(MaskError::UnsupportedPixelFormat(other.color())),
        };
        Self::new(width, height, labels)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major label buffer.
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    pub fn get(&self, x: usize, y: usize) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.labels[y * self.width + x])
    }

    /// Distinct nonzero object ids in ascending order.
    pub fn object_ids(&self) -> Vec<u32> {
        self.labels
            .iter()
            .copied()
            .filter(|&l| l != 0)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn object_count(&self) -> usize {
        self.object_ids().len()
    }

    /// Copy of the mask where every object not in `keep` becomes background.
    pub fn retain_objects(&self, keep: &[u32]) -> LabelMask {
        let keep: BTreeSet<u32> = keep.iter().copied().collect();
        let labels = self
            .labels
            .iter()
            .map(|l| if keep.contains(l) { *l } else { 0 })
            .collect();
        LabelMask {
            width: self.width,
            height: self.height,
            labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb};

    #[test]
    fn test_object_ids_sorted_and_distinct() {
        let mask = LabelMask::from_rows(&[[0u32, 7, 7], [3, 0, 12], [3, 3, 0]]).unwrap();
        assert_eq!(mask.object_ids(), vec![3, 7, 12]);
        assert_eq!(mask.object_count(), 3);
        assert_eq!(mask.get(2, 1), Some(12));
        assert_eq!(mask.get(3, 0), None);
    }

    #[test]
    fn test_background_only_mask_has_no_objects() {
        let mask = LabelMask::new(2, 2, vec![0; 4]).unwrap();
        assert!(mask.object_ids().is_empty());
    }

    #[test]
    fn test_retain_objects() {
        let mask = LabelMask::from_rows(&[[0u32, 1, 2], [3, 3, 2]]).unwrap();
        let kept = mask.retain_objects(&[2, 3]);
        assert_eq!(kept.labels(), &[0, 0, 2, 3, 3, 2]);
        assert_eq!(mask.object_count(), 3);
    }

    #[test]
    fn test_rejects_wrong_buffer_size() {
        let err = LabelMask::new(3, 2, vec![0; 5]).unwrap_err();
        assert!(matches!(err, MaskError::BufferSize { len: 5, .. }));
    }

    #[test]
    fn test_rejects_overflowing_dimensions() {
        let err = LabelMask::new(usize::MAX, 2, vec![0; 4]).unwrap_err();
        assert!(matches!(err, MaskError::BufferSize { len: 4, .. }));
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let rows: Vec<Vec<u32>> = vec![vec![0, 1], vec![1]];
        let err = LabelMask::from_rows(&rows).unwrap_err();
        assert!(matches!(err, MaskError::RaggedRows { row: 1, .. }));
    }

    #[test]
    fn test_from_luma16_keeps_raw_ids() {
        let buf: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_raw(2, 1, vec![0, 300]).unwrap();
        let mask = LabelMask::from_image(&DynamicImage::ImageLuma16(buf)).unwrap();
        assert_eq!(mask.labels(), &[0, 300]);
    }

    #[test]
    fn test_from_luma8_is_not_rescaled() {
        let buf: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_raw(2, 1, vec![1, 2]).unwrap();
        let mask = LabelMask::from_image(&DynamicImage::ImageLuma8(buf)).unwrap();
        assert_eq!(mask.object_ids(), vec![1, 2]);
    }

    #[test]
    fn test_rejects_color_images() {
        let buf: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::new(1, 1);
        let err = LabelMask::from_image(&DynamicImage::ImageRgb8(buf)).unwrap_err();
        assert!(matches!(err, MaskError::UnsupportedPixelFormat(_)));
    }

    #[test]
    fn test_open_png_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let buf: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_raw(3, 1, vec![0, 1, 2]).unwrap();
        buf.save(&path).unwrap();

        let mask = LabelMask::open(&path).unwrap();
        assert_eq!((mask.width(), mask.height()), (3, 1));
        assert_eq!(mask.object_ids(), vec![1, 2]);
    }
}
