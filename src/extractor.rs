//! The extraction orchestrator.
//!
//! [`MediaExtractor`] decides how much work a resource warrants from its link
//! roles, fetches it accordingly, detects its real mime type, and hands it to
//! the processor for that media type.

use crate::command::{CommandExecutor, CommandRunner};
use crate::config::MediaExtractorConfig;
use crate::download::{ContentRequest, MimeTypeDetectHttpClient, ResourceDownloadClient};
use crate::error::{MediaExtractionError, MediaProcessorError, ResourceExtractionError, Result};
use crate::media_type::MediaType;
use crate::metrics::{ExtractionMetrics, ExtractionOutcome, MetricsSnapshot, Timer};
use crate::mime;
use crate::model::{Resource, ResourceEntry, ResourceExtractionResult, UrlType};
use crate::pdf_to_image::PdfToImageConverter;
use crate::processor::{
    AudioVideoProcessor, FallbackHandler, ImageProcessor, LinkedProcessor, MediaProcessor, OEmbedProcessor,
    TextProcessor, ThreeDProcessor,
};
use crate::thumbnail::ThumbnailGenerator;
use crate::tools::ToolContext;
use std::sync::Arc;
use tracing::{debug, info, warn};

const XHTML_MIME_TYPE: &str = "application/xhtml+xml";

/// How much of a resource is fetched and analysed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    /// Content is downloaded and analysed.
    Full,
    /// Only declared properties are reported; content is not fetched.
    Reduced,
    /// The resource is ignored.
    None,
}

impl ProcessingMode {
    pub fn for_entry(entry: &ResourceEntry) -> Self {
        let has_any = |types: &[UrlType]| types.iter().any(|t| entry.url_types.contains(t));
        if has_any(&[UrlType::IsShownBy, UrlType::HasView, UrlType::Object]) {
            ProcessingMode::Full
        } else if has_any(&[UrlType::IsShownAt]) {
            ProcessingMode::Reduced
        } else {
            ProcessingMode::None
        }
    }
}

/// One processor per media type.
#[derive(Clone)]
pub struct MediaProcessors {
    pub image: Arc<dyn MediaProcessor>,
    pub audio_video: Arc<dyn MediaProcessor>,
    /// Text and unknown types.
    pub linked: Arc<dyn MediaProcessor>,
    pub three_d: Arc<dyn MediaProcessor>,
}

impl MediaProcessors {
    /// The standard processors, sharing one runner and tool context. The
    /// fallback chain for text is oEmbed first, then plain text.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        tools: Arc<ToolContext>,
        download_client: Arc<dyn ResourceDownloadClient>,
        config: &MediaExtractorConfig,
    ) -> Self {
        let thumbnail_generator = Arc::new(ThumbnailGenerator::new(runner.clone(), tools.clone(), config));
        let pdf_converter = Arc::new(PdfToImageConverter::new(runner.clone(), tools.clone(), config));
        let text: Arc<dyn FallbackHandler> = Arc::new(TextProcessor::new(thumbnail_generator.clone(), pdf_converter));
        let oembed: Arc<dyn FallbackHandler> = Arc::new(OEmbedProcessor::new());

        Self {
            image: Arc::new(ImageProcessor::new(thumbnail_generator)),
            audio_video: Arc::new(AudioVideoProcessor::new(runner, tools, download_client, config)),
            linked: Arc::new(LinkedProcessor::new(vec![oembed, text])),
            three_d: Arc::new(ThreeDProcessor::new()),
        }
    }

    fn for_media_type(&self, media_type: MediaType) -> &dyn MediaProcessor {
        match media_type {
            MediaType::Text | MediaType::Unknown => self.linked.as_ref(),
            MediaType::Audio | MediaType::Video => self.audio_video.as_ref(),
            MediaType::Image => self.image.as_ref(),
            MediaType::ThreeD => self.three_d.as_ref(),
        }
    }
}

/// Extracts technical metadata and thumbnails from web resources.
///
/// Safe to share between tasks; each call processes one resource to
/// completion and releases its content before returning.
pub struct MediaExtractor {
    download_client: Arc<dyn ResourceDownloadClient>,
    mime_type_detect_client: Arc<dyn MimeTypeDetectHttpClient>,
    processors: MediaProcessors,
    metrics: Arc<ExtractionMetrics>,
}

impl MediaExtractor {
    /// Discover the external tools and build the standard processors.
    pub async fn new(
        config: &MediaExtractorConfig,
        download_client: Arc<dyn ResourceDownloadClient>,
        mime_type_detect_client: Arc<dyn MimeTypeDetectHttpClient>,
    ) -> std::result::Result<Self, MediaProcessorError> {
        config.validate()?;
        let runner: Arc<dyn CommandRunner> = Arc::new(CommandExecutor::new());
        let tools = Arc::new(ToolContext::discover(runner.as_ref(), config.discovery_timeout()).await?);
        let processors = MediaProcessors::new(runner, tools, download_client.clone(), config);
        Ok(Self::with_components(download_client, mime_type_detect_client, processors))
    }

    pub fn with_components(
        download_client: Arc<dyn ResourceDownloadClient>,
        mime_type_detect_client: Arc<dyn MimeTypeDetectHttpClient>,
        processors: MediaProcessors,
    ) -> Self {
        Self {
            download_client,
            mime_type_detect_client,
            processors,
            metrics: ExtractionMetrics::new(),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Process one resource. `Ok(None)` means the resource warrants no
    /// processing or its processor produced nothing.
    pub async fn perform_media_extraction(
        &self,
        entry: &ResourceEntry,
        main_thumbnail_available: bool,
    ) -> std::result::Result<Option<ResourceExtractionResult>, ResourceExtractionError> {
        let timer = Timer::new();

        let mode = ProcessingMode::for_entry(entry);
        if mode == ProcessingMode::None {
            debug!("No processing needed for {}", entry.resource_url);
            self.metrics.record_extraction(ExtractionOutcome::Skipped, timer.elapsed_ms());
            return Ok(None);
        }

        let result = self.perform_processing(entry, mode, main_thumbnail_available).await;
        match &result {
            Ok(_) => self.metrics.record_extraction(ExtractionOutcome::Succeeded, timer.elapsed_ms()),
            Err(e) => {
                warn!("Extraction of {} failed: {}", entry.resource_url, e);
                self.metrics.record_extraction(ExtractionOutcome::Failed, timer.elapsed_ms());
            }
        }
        result.map_err(|cause| ResourceExtractionError {
            resource_url: entry.resource_url.clone(),
            cause,
        })
    }

    async fn perform_processing(
        &self,
        entry: &ResourceEntry,
        mode: ProcessingMode,
        main_thumbnail_available: bool,
    ) -> Result<Option<ResourceExtractionResult>> {
        let wants_content = |mime_type: &str| self.should_download_for_full_processing(mime_type);
        let request = match mode {
            ProcessingMode::Full => ContentRequest::WhenMimeType(&wants_content),
            _ => ContentRequest::Never,
        };
        let mut resource = self
            .download_client
            .download(entry, request)
            .await
            .map_err(MediaExtractionError::Download)?;

        let detected_mime_type = self.detect_and_verify_mime_type(&resource).await?;
        let media_type = MediaType::classify(&detected_mime_type);
        self.metrics.record_media_type(media_type);

        self.verify_and_correct_content_availability(&mut resource, mode, &detected_mime_type)
            .await?;

        let processor = self.choose_media_processor(media_type);
        debug!(
            "Processing {} as {} ({:?})",
            resource.resource_url(),
            media_type.as_str(),
            mode
        );
        if mode == ProcessingMode::Full {
            processor
                .extract_metadata(&resource, &detected_mime_type, main_thumbnail_available)
                .await
        } else {
            processor.copy_metadata(&resource, &detected_mime_type).await
        }
    }

    /// Sniff local content, or ask the remote side when there is none.
    /// Disagreement with the provided type is only logged.
    pub async fn detect_and_verify_mime_type(&self, resource: &Resource) -> Result<String> {
        let provided = resource.provided_mime_type();
        let detected = match resource.content_path() {
            Some(path) if resource.has_content() => mime::detect_local(path, provided).await,
            _ => self.mime_type_detect_client.detect(resource.actual_location()).await,
        }
        .map_err(MediaExtractionError::MimeDetection)?;

        if let Some(provided) = provided {
            let xhtml_as_html = detected == XHTML_MIME_TYPE && provided.starts_with("text/html");
            if !xhtml_as_html && detected != provided {
                info!(
                    "Invalid mime type provided (should be {}, was {}): {}",
                    detected,
                    provided,
                    resource.resource_url()
                );
            }
        }
        Ok(detected)
    }

    /// Fetch the content after all when the detected type needs it for full
    /// processing but the provided type did not.
    pub async fn verify_and_correct_content_availability(
        &self,
        resource: &mut Resource,
        mode: ProcessingMode,
        detected_mime_type: &str,
    ) -> Result<()> {
        if mode != ProcessingMode::Full
            || !self.should_download_for_full_processing(detected_mime_type)
            || resource.has_content()
        {
            return Ok(());
        }

        debug!("Downloading content of {} after all", resource.resource_url());
        let entry = ResourceEntry::new(resource.resource_url(), resource.url_types().iter().copied());
        let downloaded = self
            .download_client
            .download(&entry, ContentRequest::Always)
            .await
            .map_err(MediaExtractionError::Download)?;
        if let Some(path) = downloaded.content_path().filter(|_| downloaded.has_content()) {
            resource.mark_as_with_content(tokio::fs::File::open(path).await?).await?;
        }

        if !resource.has_content() {
            return Err(MediaExtractionError::ContentUnavailable(format!(
                "Could not download the content of {}",
                resource.resource_url()
            )));
        }
        Ok(())
    }

    pub fn choose_media_processor(&self, media_type: MediaType) -> &dyn MediaProcessor {
        self.processors.for_media_type(media_type)
    }

    /// Whether resources of this mime type need their content for full processing.
    pub fn should_download_for_full_processing(&self, mime_type: &str) -> bool {
        let media_type = MediaType::classify(mime::strip_parameters(mime_type));
        self.choose_media_processor(media_type)
            .download_resource_for_full_processing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::FileSystemDownloadClient;
    use crate::model::{ResourceMetadata, ThreeDResourceMetadata};
    use async_trait::async_trait;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records how it was called and answers with a fixed 3D result.
    struct Recording {
        needs_content: bool,
        extracted: AtomicUsize,
        copied: AtomicUsize,
        saw_content: Mutex<Vec<bool>>,
    }

    impl Recording {
        fn new(needs_content: bool) -> Arc<Self> {
            Arc::new(Self {
                needs_content,
                extracted: AtomicUsize::new(0),
                copied: AtomicUsize::new(0),
                saw_content: Mutex::new(Vec::new()),
            })
        }

        fn result(resource: &Resource, mime_type: &str) -> Option<ResourceExtractionResult> {
            Some(ResourceExtractionResult::from_metadata(ResourceMetadata::ThreeD(
                ThreeDResourceMetadata {
                    mime_type: mime_type.to_string(),
                    resource_url: resource.resource_url().to_string(),
                    content_size: None,
                },
            )))
        }
    }

    #[async_trait]
    impl MediaProcessor for Recording {
        async fn extract_metadata(
            &self,
            resource: &Resource,
            mime_type: &str,
            _main: bool,
        ) -> Result<Option<ResourceExtractionResult>> {
            self.extracted.fetch_add(1, Ordering::SeqCst);
            self.saw_content.lock().unwrap().push(resource.has_content());
            Ok(Self::result(resource, mime_type))
        }

        async fn copy_metadata(&self, resource: &Resource, mime_type: &str) -> Result<Option<ResourceExtractionResult>> {
            self.copied.fetch_add(1, Ordering::SeqCst);
            self.saw_content.lock().unwrap().push(resource.has_content());
            Ok(Self::result(resource, mime_type))
        }

        fn download_resource_for_full_processing(&self) -> bool {
            self.needs_content
        }
    }

    /// Serves a fixed file, reporting a configurable mime type, and counts
    /// content downloads.
    struct FakeClient {
        inner: FileSystemDownloadClient,
        path: std::path::PathBuf,
        content_downloads: AtomicUsize,
        remote_mime_type: String,
        refuse_content: bool,
    }

    #[async_trait]
    impl ResourceDownloadClient for FakeClient {
        async fn download(&self, entry: &ResourceEntry, request: ContentRequest<'_>) -> io::Result<Resource> {
            let local = ResourceEntry::new(self.path.display().to_string(), entry.url_types.iter().copied());
            let request = if self.refuse_content {
                ContentRequest::Never
            } else {
                request
            };
            let resource = self.inner.download(&local, request).await?;
            if resource.has_content() {
                self.content_downloads.fetch_add(1, Ordering::SeqCst);
            }
            let mut mirrored = Resource::new(entry).with_provided_mime_type(self.remote_mime_type.as_str());
            if let Some(path) = resource.content_path().filter(|_| resource.has_content()) {
                mirrored = mirrored.with_external_content(path);
            }
            Ok(mirrored)
        }
    }

    #[async_trait]
    impl MimeTypeDetectHttpClient for FakeClient {
        async fn detect(&self, _location: &str) -> io::Result<String> {
            Ok(self.remote_mime_type.clone())
        }
    }

    struct Fixture {
        _file: tempfile::NamedTempFile,
        client: Arc<FakeClient>,
        image: Arc<Recording>,
        linked: Arc<Recording>,
        extractor: MediaExtractor,
    }

    fn fixture(content: &[u8], declared: &str, refuse_content: bool) -> Fixture {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), content).unwrap();
        let client = Arc::new(FakeClient {
            inner: FileSystemDownloadClient::new().with_declared_mime_type(declared),
            path: file.path().to_path_buf(),
            content_downloads: AtomicUsize::new(0),
            remote_mime_type: declared.to_string(),
            refuse_content,
        });
        let image = Recording::new(true);
        let linked = Recording::new(false);
        let processors = MediaProcessors {
            image: image.clone(),
            audio_video: Recording::new(false),
            linked: linked.clone(),
            three_d: Recording::new(true),
        };
        let extractor = MediaExtractor::with_components(client.clone(), client.clone(), processors);
        Fixture {
            _file: file,
            client,
            image,
            linked,
            extractor,
        }
    }

    const PNG: [u8; 16] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    ];

    #[test]
    fn test_processing_mode() {
        let mode = |types: &[UrlType]| ProcessingMode::for_entry(&ResourceEntry::new("u", types.iter().copied()));
        assert_eq!(mode(&[UrlType::IsShownAt]), ProcessingMode::Reduced);
        assert_eq!(mode(&[UrlType::Object]), ProcessingMode::Full);
        assert_eq!(mode(&[UrlType::IsShownAt, UrlType::HasView]), ProcessingMode::Full);
        assert_eq!(mode(&[UrlType::IsShownBy]), ProcessingMode::Full);
        assert_eq!(mode(&[]), ProcessingMode::None);
    }

    #[tokio::test]
    async fn test_none_mode_is_skipped() {
        let f = fixture(&PNG, "image/png", false);
        let entry = ResourceEntry::new("http://example.com/a.png", Vec::<UrlType>::new());
        assert!(f.extractor.perform_media_extraction(&entry, false).await.unwrap().is_none());
        assert_eq!(f.client.content_downloads.load(Ordering::SeqCst), 0);
        assert_eq!(f.extractor.metrics().skipped, 1);
    }

    #[tokio::test]
    async fn test_full_mode_extracts_with_content() {
        let f = fixture(&PNG, "image/png", false);
        let entry = ResourceEntry::new("http://example.com/a.png", [UrlType::HasView]);
        let result = f.extractor.perform_media_extraction(&entry, false).await.unwrap().unwrap();

        assert_eq!(result.metadata.unwrap().mime_type(), "image/png");
        assert_eq!(f.image.extracted.load(Ordering::SeqCst), 1);
        assert_eq!(*f.image.saw_content.lock().unwrap(), [true]);
        let metrics = f.extractor.metrics();
        assert_eq!(metrics.succeeded, 1);
        assert_eq!(metrics.media_types.image, 1);
    }

    #[tokio::test]
    async fn test_reduced_mode_copies_without_content() {
        let f = fixture(b"<html></html>", "text/html", false);
        let entry = ResourceEntry::new("http://example.com/page", [UrlType::IsShownAt]);
        let result = f.extractor.perform_media_extraction(&entry, false).await.unwrap().unwrap();

        assert_eq!(result.metadata.unwrap().mime_type(), "text/html");
        assert_eq!(f.linked.copied.load(Ordering::SeqCst), 1);
        assert_eq!(f.linked.extracted.load(Ordering::SeqCst), 0);
        assert_eq!(*f.linked.saw_content.lock().unwrap(), [false]);
        assert_eq!(f.client.content_downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_correction_downloads_content_for_mislabelled_resource() {
        // Declared as HTML (no content needed) but the bytes are a PNG.
        let f = fixture(&PNG, "text/html", false);
        let entry = ResourceEntry::new("http://example.com/a", [UrlType::IsShownBy]);

        let mut resource = f
            .client
            .download(&entry, ContentRequest::WhenMimeType(&|m: &str| f.extractor.should_download_for_full_processing(m)))
            .await
            .unwrap();
        assert!(!resource.has_content());

        f.extractor
            .verify_and_correct_content_availability(&mut resource, ProcessingMode::Full, "image/png")
            .await
            .unwrap();
        assert!(resource.has_content());
        assert_eq!(resource.read_content().await.unwrap(), PNG);
    }

    #[tokio::test]
    async fn test_correction_is_skipped_in_reduced_mode() {
        let f = fixture(&PNG, "text/html", false);
        let entry = ResourceEntry::new("http://example.com/a", [UrlType::IsShownAt]);
        let mut resource = Resource::new(&entry);
        f.extractor
            .verify_and_correct_content_availability(&mut resource, ProcessingMode::Reduced, "image/png")
            .await
            .unwrap();
        assert!(!resource.has_content());
    }

    #[tokio::test]
    async fn test_missing_content_fails_with_url() {
        let f = fixture(&PNG, "image/png", true);
        let entry = ResourceEntry::new("http://example.com/a.png", [UrlType::IsShownBy]);
        let err = f.extractor.perform_media_extraction(&entry, false).await.unwrap_err();

        assert_eq!(err.resource_url, "http://example.com/a.png");
        assert!(matches!(err.cause, MediaExtractionError::ContentUnavailable(_)));
        assert!(err.to_string().starts_with("Problem while processing http://example.com/a.png"));
        assert_eq!(f.image.extracted.load(Ordering::SeqCst), 0);
        assert_eq!(f.extractor.metrics().failed, 1);
    }

    #[tokio::test]
    async fn test_detection_prefers_content() {
        let f = fixture(&PNG, "image/jpeg", false);
        let entry = ResourceEntry::new("http://example.com/a", [UrlType::IsShownBy]);
        let resource = f.client.download(&entry, ContentRequest::Always).await.unwrap();
        assert_eq!(f.extractor.detect_and_verify_mime_type(&resource).await.unwrap(), "image/png");

        let resource = f.client.download(&entry, ContentRequest::Never).await.unwrap();
        assert_eq!(f.extractor.detect_and_verify_mime_type(&resource).await.unwrap(), "image/jpeg");
    }

    #[test]
    fn test_processor_choice() {
        let f = fixture(&PNG, "image/png", false);
        assert!(f.extractor.should_download_for_full_processing("image/png"));
        assert!(f.extractor.should_download_for_full_processing("model/gltf+json"));
        assert!(!f.extractor.should_download_for_full_processing("video/mp4"));
        assert!(!f.extractor.should_download_for_full_processing("text/html; charset=utf-8"));
        assert!(!f.extractor.should_download_for_full_processing("application/x-unknown"));
    }
}
