use std::collections::BTreeMap;

use image::Rgba;
use palette::{Hsl, IntoColor, LinSrgb, Mix, Srgb};
use serde::{Deserialize, Serialize};

use crate::backmap::{DisplayPixel, RecoloredRaster};

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Rgba<u8>> {
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            opaque(rgb.into_format())
        })
        .collect()
}

fn opaque(c: Srgb<u8>) -> Rgba<u8> {
    Rgba([c.red, c.green, c.blue, 255])
}

/// Anchor colours of the viridis map, low to high.
const VIRIDIS: [(u8, u8, u8); 5] = [
    (0x44, 0x01, 0x54),
    (0x3b, 0x52, 0x8b),
    (0x21, 0x91, 0x8c),
    (0x5e, 0xc9, 0x62),
    (0xfd, 0xe7, 0x25),
];

// ---------------------------------------------------------------------------
// Colormap: rescaled value → colour
// ---------------------------------------------------------------------------

/// How rescaled feature values are turned into colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    Grayscale,
    #[default]
    Viridis,
    /// One distinct hue per distinct value, for cluster ids and class labels.
    ///
    /// Hues are keyed by the rescaled display value, not the raw label.
    /// Labels that rescale to the same level share a hue, which always
    /// happens with more classes than output levels (256 for 8-bit).
    Categorical,
}

impl Colormap {
    /// Colour for a position `t` in `[0, 1]` on a continuous map.
    /// Categorical maps fall back to grayscale here; use [`ColorLookup`].
    pub fn sample(self, t: f64) -> Rgba<u8> {
        let t = t.clamp(0.0, 1.0) as f32;
        match self {
            Colormap::Grayscale | Colormap::Categorical => {
                let v = (t * 255.0).round() as u8;
                Rgba([v, v, v, 255])
            }
            Colormap::Viridis => {
                let segments = (VIRIDIS.len() - 1) as f32;
                let pos = t * segments;
                let i = (pos.floor() as usize).min(VIRIDIS.len() - 2);
                let frac = pos - i as f32;
                let a = linear(VIRIDIS[i]);
                let b = linear(VIRIDIS[i + 1]);
                let mixed: Srgb = a.mix(b, frac).into_color();
                opaque(mixed.into_format())
            }
        }
    }
}

fn linear((r, g, b): (u8, u8, u8)) -> LinSrgb {
    Srgb::new(r, g, b).into_format::<f32>().into_linear()
}

// ---------------------------------------------------------------------------
// ColorLookup: colours for the values present in one raster
// ---------------------------------------------------------------------------

/// Resolved colours for every distinct value of a raster.
#[derive(Debug, Clone)]
pub struct ColorLookup<T> {
    pub colormap: Colormap,
    mapping: BTreeMap<u32, Rgba<u8>>,
    _pixel: std::marker::PhantomData<T>,
}

impl<T: DisplayPixel> ColorLookup<T> {
    /// Build the lookup from the object values of `raster`.
    pub fn new(colormap: Colormap, raster: &RecoloredRaster<T>) -> Self {
        let mut mapping: BTreeMap<u32, Rgba<u8>> = raster
            .object_values()
            .iter()
            .map(|&(_, v)| (key(v), Rgba([0, 0, 0, 0])))
            .collect();

        match colormap {
            Colormap::Categorical => {
                let palette = generate_palette(mapping.len());
                for (slot, c) in mapping.values_mut().zip(palette) {
                    *slot = c;
                }
            }
            _ => {
                let range = raster.range();
                let (lo, hi): (f64, f64) = (range.low().into(), range.high().into());
                let span = hi - lo;
                for (&k, slot) in mapping.iter_mut() {
                    let t = if span > 0.0 { (f64::from(k) - lo) / span } else { 0.5 };
                    *slot = colormap.sample(t);
                }
            }
        }

        ColorLookup {
            colormap,
            mapping,
            _pixel: std::marker::PhantomData,
        }
    }

    /// Look up the colour for a rescaled value.
    pub fn color_for(&self, value: T) -> Rgba<u8> {
        self.mapping
            .get(&key(value))
            .copied()
            .unwrap_or_else(|| self.colormap.sample(0.0))
    }

    /// Legend entries (value label → colour).
    pub fn legend_entries(&self) -> Vec<(String, Rgba<u8>)> {
        self.mapping
            .iter()
            .map(|(v, c)| (v.to_string(), *c))
            .collect()
    }
}

/// Pixel values are at most 16 bits wide, so they index losslessly as `u32`.
fn key<T: DisplayPixel>(v: T) -> u32 {
    let f: f64 = v.into();
    f as u32
}
