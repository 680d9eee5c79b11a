//! media_extractor - technical metadata and thumbnails for digital-library resources
//!
//! Resources are classified by mime type and analysed by shelling out to
//! system binaries: `ffprobe` for audio/video, ImageMagick for images and
//! thumbnails, Ghostscript for rendering PDF pages. Tools are located once
//! and shared through an immutable [`ToolContext`].

mod command;
mod config;
mod download;
mod error;
mod extractor;
mod media_type;
mod metrics;
mod mime;
mod model;
mod pdf_to_image;
pub mod processor;
mod thumbnail;
mod tools;

#[cfg(test)]
mod test_support;

pub use command::{CommandExecutor, CommandLine, CommandRunner};
pub use config::MediaExtractorConfig;
pub use download::{ContentRequest, FileSystemDownloadClient, MimeTypeDetectHttpClient, ResourceDownloadClient};
pub use error::{
    CommandExecutionError, MediaExtractionError, MediaProcessorError, ResourceExtractionError, Result,
};
pub use extractor::{MediaExtractor, MediaProcessors, ProcessingMode};
pub use media_type::{MediaType, DASH_MIME_TYPE};
pub use metrics::{ExtractionMetrics, ExtractionOutcome, MediaTypeMetrics, MetricsSnapshot, Timer};
pub use mime::{canonical_mime_type, detect_bytes, detect_local, strip_parameters};
pub use model::{
    AudioResourceMetadata, ImageMetadata, ImageResourceMetadata, Resource, ResourceEntry, ResourceExtractionResult,
    ResourceMetadata, TextResourceMetadata, ThreeDResourceMetadata, Thumbnail, ThumbnailKind, UrlType,
    VideoResourceMetadata,
};
pub use pdf_to_image::{PdfToImageConverter, RasterizedPage};
pub use processor::MediaProcessor;
pub use thumbnail::ThumbnailGenerator;
pub use tools::ToolContext;
