//! Per-media-type extraction strategies.
//!
//! The orchestrator picks one [`MediaProcessor`] per detected media type and
//! either extracts metadata from the content (full processing) or copies the
//! declared fields (reduced processing).

mod audio_video;
mod dash;
mod iiif;
mod image;
mod linked;
mod oembed;
mod pdf_scan;
mod text;
mod three_d;

pub use audio_video::{parse_frame_rate, AudioVideoProcessor};
pub use dash::{parse_dash_manifest, parse_iso8601_duration, DashVideoInfo};
pub use iiif::IiifProcessor;
pub use image::ImageProcessor;
pub use linked::{FallbackHandler, HandlerOutcome, LinkedProcessor};
pub use oembed::{OEmbedModel, OEmbedProcessor};
pub use pdf_scan::{find_pdf_characteristics, PdfCharacteristics, DISPLAY_DPI};
pub use text::TextProcessor;
pub use three_d::ThreeDProcessor;

use crate::error::{MediaExtractionError, Result};
use crate::model::{Resource, ResourceExtractionResult};
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait MediaProcessor: Send + Sync {
    /// Analyse the resource. The resource may lack content when
    /// [`download_resource_for_full_processing`](Self::download_resource_for_full_processing)
    /// is false.
    async fn extract_metadata(
        &self,
        resource: &Resource,
        detected_mime_type: &str,
        main_thumbnail_available: bool,
    ) -> Result<Option<ResourceExtractionResult>>;

    /// Build a result from the declared fields only; content is never read.
    async fn copy_metadata(&self, resource: &Resource, detected_mime_type: &str)
        -> Result<Option<ResourceExtractionResult>>;

    /// Whether full processing needs the resource content on disk.
    fn download_resource_for_full_processing(&self) -> bool;
}

pub(crate) fn require_content(resource: &Resource) -> Result<&Path> {
    match resource.content_path() {
        Some(path) if resource.has_content() => Ok(path),
        _ => Err(MediaExtractionError::ContentUnavailable(format!(
            "File does not exist or does not have content: {}",
            resource.resource_url()
        ))),
    }
}

pub(crate) fn content_size(resource: &Resource) -> Result<u64> {
    resource.content_size().map_err(|e| {
        MediaExtractionError::ProcessingError(format!(
            "Could not determine the size of the resource {}: {}",
            resource.resource_url(),
            e
        ))
    })
}
