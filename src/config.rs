use std::{path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

use crate::font::FontFaceData;

/// Settings for detecting when a web font has become available.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct FontOptions {
    /// Pixels a probe box has to move before the font counts as loaded.
    pub tolerance: f64,
    pub delay_ms: u64,
    pub timeout_ms: u64,
    pub probe_text: String,
    pub size_px: f64,
}

impl Default for FontOptions {
    fn default() -> Self {
        FontOptions {
            tolerance: 2.0,
            delay_ms: 100,
            timeout_ms: 5000,
            probe_text: "AxmTYklsjo190QW".to_string(),
            size_px: 48.0,
        }
    }
}

impl FontOptions {
    pub fn delay(&self) -> Duration {
        // a zero period would spin
        Duration::from_millis(self.delay_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeasureOptions {
    pub cache_capacity: usize,
}

impl Default for MeasureOptions {
    fn default() -> Self {
        MeasureOptions {
            cache_capacity: 1000,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub font: FontOptions,
    pub measure: MeasureOptions,
    pub faces: Vec<FontFaceData>,
}

impl Config {
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("Failed to parse config")
    }

    /// A missing file gives the defaults, a malformed one is an error.
    pub async fn read(path: &Path) -> anyhow::Result<Self> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(err) => {
                return Err(err).context(format!("Failed to read config {}", path.display()))
            }
        };

        Config::parse(&contents).context(format!("Invalid config in {}", path.display()))
    }
}
