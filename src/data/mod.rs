/// Data layer: feature table, label masks, loading, and row selection.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv          .png / .tif
///        │                              │
///        ▼                              ▼
///   ┌──────────┐                  ┌──────────┐
///   │  loader   │                  │   mask    │  grayscale → LabelMask
///   └──────────┘                  └──────────┘
///        │                              │
///        ▼                              │
///   ┌──────────────┐                    │
///   │ FeatureTable  │  Vec<ObjectRecord> │
///   └──────────────┘                    │
///     │        │                        │
///     ▼        ▼                        │
///  filter    store ── FeatureVector ────┴──▶ backmap
/// ```

pub mod filter;
pub mod loader;
pub mod mask;
pub mod model;
pub mod store;
