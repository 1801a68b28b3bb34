//! Backmapping of per-object single-cell features onto segmentation masks.
//!
//! A feature table (one row per segmented object, exported by a tool such as
//! CellProfiler) is paired with the label mask the objects came from. The
//! values of one feature are rescaled into a display range and painted onto
//! the pixels of their objects, leaving the background transparent.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use cellmap::backmap::backmap_u8;
//! use cellmap::data::loader::{load_table, LoaderOptions};
//! use cellmap::data::mask::LabelMask;
//! use cellmap::data::store::FeatureStore;
//!
//! # fn main() -> anyhow::Result<()> {
//! let table = load_table(Path::new("cells.csv"), &LoaderOptions::default())?;
//! let mask = LabelMask::open(Path::new("image_1_mask.png"))?;
//! let area = table.feature_column(1, "AreaShape_Area")?;
//! let raster = backmap_u8(&mask, &area)?;
//! # Ok(())
//! # }
//! ```

pub mod backmap;
pub mod color;
pub mod config;
pub mod data;
pub mod render;
pub mod state;
