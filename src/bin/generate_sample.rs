//! Writes a small synthetic dataset for trying out `cellmap`:
//! label masks, intensity images and a matching per-object feature table.
//!
//! ```text
//! sample_data/
//!   image_1_mask.png   image_1_raw.png
//!   image_2_mask.png   image_2_raw.png
//!   features.parquet   features.csv
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use image::{ImageBuffer, Luma};
use parquet::arrow::ArrowWriter;

const SIZE: u32 = 128;
const GRID: u32 = 4;

/// Deterministic splitmix64 generator so repeated runs write identical files.
struct SampleRng(u64);

impl SampleRng {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform in `[lo, hi)`.
    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        let unit = (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
        lo + unit * (hi - lo)
    }
}

struct Cell {
    image_id: i64,
    object_number: i64,
    area: i64,
    mean_intensity: f64,
    treatment: &'static str,
    mitotic: bool,
}

/// Draw a grid of jittered disks; returns the mask, the raw image and one
/// row per disk.
fn synth_image(
    image_id: i64,
    treatment: &'static str,
    rng: &mut SampleRng,
) -> (ImageBuffer<Luma<u16>, Vec<u16>>, ImageBuffer<Luma<u16>, Vec<u16>>, Vec<Cell>) {
    let mut mask = ImageBuffer::<Luma<u16>, Vec<u16>>::new(SIZE, SIZE);
    let mut raw = ImageBuffer::<Luma<u16>, Vec<u16>>::new(SIZE, SIZE);
    let mut cells = Vec::new();
    let pitch = f64::from(SIZE / GRID);

    for gy in 0..GRID {
        for gx in 0..GRID {
            // Leave some grid slots empty.
            if rng.uniform(0.0, 1.0) < 0.2 {
                continue;
            }
            let object_number = cells.len() as i64 + 1;
            let cx = (f64::from(gx) + 0.5) * pitch + rng.uniform(-3.0, 3.0);
            let cy = (f64::from(gy) + 0.5) * pitch + rng.uniform(-3.0, 3.0);
            let radius = rng.uniform(5.0, 12.0);
            let mitotic = rng.uniform(0.0, 1.0) < 0.25;
            let brightness = if mitotic { 40_000.0 } else { 15_000.0 } + rng.uniform(0.0, 8_000.0);

            let mut area = 0;
            let mut total = 0.0;
            for (x, y, px) in mask.enumerate_pixels_mut() {
                let (dx, dy) = (f64::from(x) - cx, f64::from(y) - cy);
                if dx * dx + dy * dy <= radius * radius && px[0] == 0 {
                    px[0] = object_number as u16;
                    let value = (brightness + rng.uniform(-1_000.0, 1_000.0)).max(0.0);
                    raw.put_pixel(x, y, Luma([value as u16]));
                    area += 1;
                    total += value;
                }
            }

            cells.push(Cell {
                image_id,
                object_number,
                area,
                mean_intensity: total / area.max(1) as f64,
                treatment,
                mitotic,
            });
        }
    }

    for px in raw.pixels_mut() {
        if px[0] == 0 {
            px[0] = rng.uniform(500.0, 1_500.0) as u16;
        }
    }

    (mask, raw, cells)
}

fn write_parquet(cells: &[Cell], path: &Path) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("ImageNumber", DataType::Int64, false),
        Field::new("ObjectNumber", DataType::Int64, false),
        Field::new("AreaShape_Area", DataType::Int64, false),
        Field::new("Intensity_MeanIntensity", DataType::Float64, false),
        Field::new("Metadata_Treatment", DataType::Utf8, false),
        Field::new("Mitotic", DataType::Boolean, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from_iter_values(cells.iter().map(|c| c.image_id))),
            Arc::new(Int64Array::from_iter_values(cells.iter().map(|c| c.object_number))),
            Arc::new(Int64Array::from_iter_values(cells.iter().map(|c| c.area))),
            Arc::new(Float64Array::from_iter_values(cells.iter().map(|c| c.mean_intensity))),
            Arc::new(StringArray::from_iter_values(cells.iter().map(|c| c.treatment))),
            Arc::new(BooleanArray::from(cells.iter().map(|c| c.mitotic).collect::<Vec<_>>())),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn write_csv(cells: &[Cell], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV file")?;
    writer.write_record([
        "ImageNumber",
        "ObjectNumber",
        "AreaShape_Area",
        "Intensity_MeanIntensity",
        "Metadata_Treatment",
        "Mitotic",
    ])?;
    for c in cells {
        writer.write_record([
            c.image_id.to_string(),
            c.object_number.to_string(),
            c.area.to_string(),
            format!("{:.3}", c.mean_intensity),
            c.treatment.to_string(),
            c.mitotic.to_string(),
        ])?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_data"));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SampleRng(42);
    let mut all_cells = Vec::new();

    for (image_id, treatment) in [(1, "DMSO"), (2, "Taxol")] {
        let (mask, raw, cells) = synth_image(image_id, treatment, &mut rng);
        let mask_path = out_dir.join(format!("image_{image_id}_mask.png"));
        let raw_path = out_dir.join(format!("image_{image_id}_raw.png"));
        mask.save(&mask_path)
            .with_context(|| format!("writing {}", mask_path.display()))?;
        raw.save(&raw_path)
            .with_context(|| format!("writing {}", raw_path.display()))?;
        log::info!("Image {image_id}: {} cells", cells.len());
        all_cells.extend(cells);
    }

    write_parquet(&all_cells, &out_dir.join("features.parquet"))?;
    write_csv(&all_cells, &out_dir.join("features.csv"))?;

    println!(
        "Wrote {} cells over 2 images to {}",
        all_cells.len(),
        out_dir.display()
    );
    Ok(())
}
