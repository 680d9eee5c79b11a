//! Resource descriptors, extraction results and technical metadata records.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncWriteExt};

// ============================================================================
// Link Roles and Resource Entries
// ============================================================================

/// The role a resource plays for the record that references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UrlType {
    IsShownBy,
    HasView,
    Object,
    IsShownAt,
}

impl UrlType {
    /// Whether technical metadata is wanted for a resource with these roles.
    /// Resources that are only an object (a preview) get thumbnails only.
    pub fn should_extract_metadata(url_types: &HashSet<UrlType>) -> bool {
        url_types.iter().any(|url_type| *url_type != UrlType::Object)
    }
}

/// Input to an extraction: the resource URL and its roles in the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub resource_url: String,
    pub url_types: HashSet<UrlType>,
}

impl ResourceEntry {
    pub fn new(resource_url: impl Into<String>, url_types: impl IntoIterator<Item = UrlType>) -> Self {
        Self {
            resource_url: resource_url.into(),
            url_types: url_types.into_iter().collect(),
        }
    }
}

// ============================================================================
// Resource
// ============================================================================

#[derive(Debug)]
enum ContentFile {
    /// Downloaded content owned by the resource, deleted when the resource is dropped.
    Temporary(TempPath),
    /// Content that already existed on disk; never deleted by us.
    External(PathBuf),
}

impl ContentFile {
    fn path(&self) -> &Path {
        match self {
            ContentFile::Temporary(path) => path,
            ContentFile::External(path) => path,
        }
    }
}

/// A downloaded (or merely probed) resource.
///
/// Any temporary content file is removed when the resource is dropped, so a
/// resource should not outlive the extraction call that obtained it.
#[derive(Debug)]
pub struct Resource {
    resource_url: String,
    url_types: HashSet<UrlType>,
    provided_mime_type: Option<String>,
    provided_file_size: Option<u64>,
    actual_location: String,
    content: Option<ContentFile>,
}

impl Resource {
    pub fn new(entry: &ResourceEntry) -> Self {
        Self {
            resource_url: entry.resource_url.clone(),
            url_types: entry.url_types.clone(),
            provided_mime_type: None,
            provided_file_size: None,
            actual_location: entry.resource_url.clone(),
            content: None,
        }
    }

    pub fn with_provided_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.provided_mime_type = Some(mime_type.into());
        self
    }

    pub fn with_provided_file_size(mut self, file_size: u64) -> Self {
        self.provided_file_size = Some(file_size);
        self
    }

    /// The location after following redirects.
    pub fn with_actual_location(mut self, location: impl Into<String>) -> Self {
        self.actual_location = location.into();
        self
    }

    /// Attach a temporary content file that the resource takes ownership of.
    pub fn with_temporary_content(mut self, path: TempPath) -> Self {
        self.content = Some(ContentFile::Temporary(path));
        self
    }

    /// Attach an existing file as content. The file is left in place on drop.
    pub fn with_external_content(mut self, path: impl Into<PathBuf>) -> Self {
        self.content = Some(ContentFile::External(path.into()));
        self
    }

    pub fn resource_url(&self) -> &str {
        &self.resource_url
    }

    pub fn url_types(&self) -> &HashSet<UrlType> {
        &self.url_types
    }

    pub fn provided_mime_type(&self) -> Option<&str> {
        self.provided_mime_type.as_deref()
    }

    pub fn provided_file_size(&self) -> Option<u64> {
        self.provided_file_size
    }

    pub fn actual_location(&self) -> &str {
        &self.actual_location
    }

    pub fn has_content(&self) -> bool {
        self.content.as_ref().is_some_and(|content| content.path().is_file())
    }

    pub fn content_path(&self) -> Option<&Path> {
        self.content.as_ref().map(ContentFile::path)
    }

    pub fn content_size(&self) -> io::Result<u64> {
        match self.content_path() {
            Some(path) => Ok(std::fs::metadata(path)?.len()),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "resource has no content")),
        }
    }

    pub async fn read_content(&self) -> io::Result<Vec<u8>> {
        match self.content_path() {
            Some(path) => tokio::fs::read(path).await,
            None => Err(io::Error::new(io::ErrorKind::NotFound, "resource has no content")),
        }
    }

    /// Copy the given stream into a new temporary file that becomes this
    /// resource's content. Replaces (and releases) any previous content.
    pub async fn mark_as_with_content(&mut self, mut stream: impl AsyncRead + Unpin + Send) -> io::Result<()> {
        let (file, path) = tempfile::Builder::new().prefix("resource").tempfile()?.into_parts();
        let mut file = tokio::fs::File::from_std(file);
        tokio::io::copy(&mut stream, &mut file).await?;
        file.flush().await?;
        self.content = Some(ContentFile::Temporary(path));
        Ok(())
    }
}

// ============================================================================
// Technical Metadata
// ============================================================================

/// Result of analysing an image with the image tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub color_space: String,
    /// Up to six hex colours (without `#`), most frequent first.
    pub dominant_colors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResourceMetadata {
    pub mime_type: String,
    pub resource_url: String,
    pub content_size: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub color_space: Option<String>,
    pub dominant_colors: Vec<String>,
    pub thumbnail_target_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioResourceMetadata {
    pub mime_type: String,
    pub resource_url: String,
    pub content_size: Option<u64>,
    pub duration: Option<f64>,
    pub bit_rate: Option<u64>,
    pub channels: Option<u32>,
    pub sample_rate: Option<u32>,
    pub sample_size: Option<u32>,
    pub codec_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoResourceMetadata {
    pub mime_type: String,
    pub resource_url: String,
    pub content_size: Option<u64>,
    pub duration: Option<f64>,
    pub bit_rate: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec_name: Option<String>,
    pub frame_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextResourceMetadata {
    pub mime_type: String,
    pub resource_url: String,
    pub content_size: Option<u64>,
    pub contains_text: bool,
    pub resolution: Option<u32>,
    pub thumbnail_target_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreeDResourceMetadata {
    pub mime_type: String,
    pub resource_url: String,
    pub content_size: Option<u64>,
}

/// Technical metadata for one resource, by media type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceMetadata {
    Image(ImageResourceMetadata),
    Audio(AudioResourceMetadata),
    Video(VideoResourceMetadata),
    Text(TextResourceMetadata),
    ThreeD(ThreeDResourceMetadata),
}

impl ResourceMetadata {
    pub fn mime_type(&self) -> &str {
        match self {
            ResourceMetadata::Image(m) => &m.mime_type,
            ResourceMetadata::Audio(m) => &m.mime_type,
            ResourceMetadata::Video(m) => &m.mime_type,
            ResourceMetadata::Text(m) => &m.mime_type,
            ResourceMetadata::ThreeD(m) => &m.mime_type,
        }
    }

    pub fn resource_url(&self) -> &str {
        match self {
            ResourceMetadata::Image(m) => &m.resource_url,
            ResourceMetadata::Audio(m) => &m.resource_url,
            ResourceMetadata::Video(m) => &m.resource_url,
            ResourceMetadata::Text(m) => &m.resource_url,
            ResourceMetadata::ThreeD(m) => &m.resource_url,
        }
    }

    pub fn content_size(&self) -> Option<u64> {
        match self {
            ResourceMetadata::Image(m) => m.content_size,
            ResourceMetadata::Audio(m) => m.content_size,
            ResourceMetadata::Video(m) => m.content_size,
            ResourceMetadata::Text(m) => m.content_size,
            ResourceMetadata::ThreeD(m) => m.content_size,
        }
    }
}

/// Negative numbers reported by tools mean "unknown".
pub(crate) fn non_negative_f64(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan() && *v >= 0.0)
}

pub(crate) fn non_negative_u64(value: Option<i64>) -> Option<u64> {
    value.and_then(|v| u64::try_from(v).ok())
}

pub(crate) fn non_negative_u32(value: Option<i64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

// ============================================================================
// Thumbnails and Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThumbnailKind {
    Medium,
    Large,
}

impl ThumbnailKind {
    pub fn suffix(&self) -> &str {
        match self {
            ThumbnailKind::Medium => "-MEDIUM",
            ThumbnailKind::Large => "-LARGE",
        }
    }
}

/// A generated preview image. Content is never empty.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub kind: ThumbnailKind,
    pub resource_url: String,
    pub target_name: String,
    pub mime_type: String,
    #[serde(skip)]
    pub content: Vec<u8>,
}

impl std::fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thumbnail")
            .field("kind", &self.kind)
            .field("target_name", &self.target_name)
            .field("mime_type", &self.mime_type)
            .field("content_len", &self.content.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceExtractionResult {
    /// Absent when metadata was not requested for the resource's roles.
    pub metadata: Option<ResourceMetadata>,
    pub thumbnails: Vec<Thumbnail>,
}

impl ResourceExtractionResult {
    pub fn new(metadata: Option<ResourceMetadata>, thumbnails: Vec<Thumbnail>) -> Self {
        Self {
            metadata,
            thumbnails: thumbnails.into_iter().filter(|t| !t.content.is_empty()).collect(),
        }
    }

    pub fn from_metadata(metadata: ResourceMetadata) -> Self {
        Self::new(Some(metadata), Vec::new())
    }
}
