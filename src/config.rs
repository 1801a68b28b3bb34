use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backmap::{BackmapError, OutputRange};
use crate::color::Colormap;
use crate::data::loader::LoaderOptions;

/// Settings shared by the CLI commands. Every field has a default, so a
/// config file only needs the keys it changes:
///
/// ```json
/// { "image_column": "ImageId", "colormap": "categorical", "output_range": [16, 240] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub image_column: String,
    pub object_column: String,
    /// Inclusive 8-bit display range `[low, high]`.
    pub output_range: [u8; 2],
    pub colormap: Colormap,
    /// Opacity of the feature layer when drawn over an intensity image.
    pub overlay_alpha: f32,
}

impl Default for Config {
    fn default() -> Self {
        let loader = LoaderOptions::default();
        Self {
            image_column: loader.image_column,
            object_column: loader.object_column,
            output_range: [0, 255],
            colormap: Colormap::default(),
            overlay_alpha: 0.6,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Config {
    /// Read a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        log::debug!("Loaded config from {}: {config:?}", path.display());
        Ok(config)
    }

    /// Config file if given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            image_column: self.image_column.clone(),
            object_column: self.object_column.clone(),
        }
    }

    pub fn output_range(&self) -> Result<OutputRange<u8>, BackmapError> {
        OutputRange::new(self.output_range[0], self.output_range[1])
    }
}
