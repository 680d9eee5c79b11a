//! Collaborators that fetch resources and detect remote mime types.
//!
//! Network access lives behind these traits. [`FileSystemDownloadClient`]
//! serves resources from the local file system for the command-line tool
//! and for tests.

use crate::mime;
use crate::model::{Resource, ResourceEntry};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use tracing::debug;

/// Whether the downloaded resource should carry its content.
#[derive(Clone, Copy)]
pub enum ContentRequest<'a> {
    Always,
    Never,
    /// Decide based on the mime type reported for the resource.
    WhenMimeType(&'a (dyn Fn(&str) -> bool + Send + Sync)),
}

impl ContentRequest<'_> {
    pub fn wants_content(&self, mime_type: Option<&str>) -> bool {
        match self {
            ContentRequest::Always => true,
            ContentRequest::Never => false,
            ContentRequest::WhenMimeType(predicate) => mime_type.is_some_and(|m| predicate(m)),
        }
    }
}

impl std::fmt::Debug for ContentRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentRequest::Always => write!(f, "Always"),
            ContentRequest::Never => write!(f, "Never"),
            ContentRequest::WhenMimeType(_) => write!(f, "WhenMimeType(..)"),
        }
    }
}

#[async_trait]
pub trait ResourceDownloadClient: Send + Sync {
    /// Fetch the resource, with or without content as requested.
    async fn download(&self, entry: &ResourceEntry, request: ContentRequest<'_>) -> io::Result<Resource>;
}

#[async_trait]
pub trait MimeTypeDetectHttpClient: Send + Sync {
    /// Determine the mime type of the resource at `location` without downloading it fully.
    async fn detect(&self, location: &str) -> io::Result<String>;
}

/// Serves `file://` URIs and plain paths from the local disk. Content is
/// referenced in place and never deleted.
#[derive(Debug, Clone, Default)]
pub struct FileSystemDownloadClient {
    declared_mime_type: Option<String>,
    fixed_file: Option<PathBuf>,
}

impl FileSystemDownloadClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report this mime type for every resource, as a server's `Content-Type` would.
    pub fn with_declared_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.declared_mime_type = Some(mime_type.into());
        self
    }

    /// Serve this file whatever the requested location.
    pub fn with_fixed_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.fixed_file = Some(path.into());
        self
    }

    fn resolve(&self, location: &str) -> PathBuf {
        match &self.fixed_file {
            Some(path) => path.clone(),
            None => PathBuf::from(location.strip_prefix("file://").unwrap_or(location)),
        }
    }
}

#[async_trait]
impl ResourceDownloadClient for FileSystemDownloadClient {
    async fn download(&self, entry: &ResourceEntry, request: ContentRequest<'_>) -> io::Result<Resource> {
        let path = self.resolve(&entry.resource_url);
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            ));
        }

        let mime_type = match &self.declared_mime_type {
            Some(mime_type) => mime_type.clone(),
            None => mime::detect_local(&path, None).await?,
        };

        let mut resource = Resource::new(entry)
            .with_provided_mime_type(mime_type.as_str())
            .with_provided_file_size(metadata.len());
        if request.wants_content(Some(&mime_type)) {
            debug!("Serving {} with content", path.display());
            resource = resource.with_external_content(path);
        }
        Ok(resource)
    }
}

#[async_trait]
impl MimeTypeDetectHttpClient for FileSystemDownloadClient {
    async fn detect(&self, location: &str) -> io::Result<String> {
        match &self.declared_mime_type {
            Some(mime_type) => Ok(mime::canonical_mime_type(mime::strip_parameters(mime_type)).to_string()),
            None => mime::detect_local(&self.resolve(location), None).await,
        }
    }
}
