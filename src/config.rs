//! Extractor configuration

use crate::error::MediaProcessorError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Timeouts and thumbnail sizes used by the extraction components.
///
/// Every field has a default, so an empty TOML file is a valid configuration.
///
/// ```toml
/// thumbnail_generate_timeout_secs = 30
/// audio_video_probe_timeout_secs = 120
/// medium_thumbnail_width = 200
/// large_thumbnail_width = 400
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaExtractorConfig {
    /// Upper bound for one image tool invocation
    pub thumbnail_generate_timeout_secs: u64,

    /// Upper bound for one probe invocation
    pub audio_video_probe_timeout_secs: u64,

    /// Upper bound for rasterizing the first page of a PDF
    pub pdf_conversion_timeout_secs: u64,

    /// Upper bound for each version check during tool discovery
    pub discovery_timeout_secs: u64,

    pub medium_thumbnail_width: u32,
    pub large_thumbnail_width: u32,
}

impl Default for MediaExtractorConfig {
    fn default() -> Self {
        Self {
            thumbnail_generate_timeout_secs: 30,
            audio_video_probe_timeout_secs: 120,
            pdf_conversion_timeout_secs: 30,
            discovery_timeout_secs: 10,
            medium_thumbnail_width: 200,
            large_thumbnail_width: 400,
        }
    }
}

impl MediaExtractorConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, MediaProcessorError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MediaProcessorError::InvalidConfig(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| MediaProcessorError::InvalidConfig(format!("Invalid TOML in {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MediaProcessorError> {
        let timeouts = [
            ("thumbnail_generate_timeout_secs", self.thumbnail_generate_timeout_secs),
            ("audio_video_probe_timeout_secs", self.audio_video_probe_timeout_secs),
            ("pdf_conversion_timeout_secs", self.pdf_conversion_timeout_secs),
            ("discovery_timeout_secs", self.discovery_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(MediaProcessorError::InvalidConfig(format!("{} must be positive", name)));
        }

        if self.medium_thumbnail_width == 0 {
            return Err(MediaProcessorError::InvalidConfig(
                "medium_thumbnail_width must be positive".to_string(),
            ));
        }
        if self.medium_thumbnail_width >= self.large_thumbnail_width {
            return Err(MediaProcessorError::InvalidConfig(format!(
                "medium_thumbnail_width ({}) must be smaller than large_thumbnail_width ({})",
                self.medium_thumbnail_width, self.large_thumbnail_width
            )));
        }
        Ok(())
    }

    pub fn thumbnail_generate_timeout(&self) -> Duration {
        Duration::from_secs(self.thumbnail_generate_timeout_secs)
    }

    pub fn audio_video_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.audio_video_probe_timeout_secs)
    }

    pub fn pdf_conversion_timeout(&self) -> Duration {
        Duration::from_secs(self.pdf_conversion_timeout_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }
}
