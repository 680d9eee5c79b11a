use super::linked::{FallbackHandler, HandlerOutcome};
use super::pdf_scan::{find_pdf_characteristics, PdfCharacteristics};
use super::{content_size, require_content, MediaProcessor};
use crate::error::{MediaExtractionError, Result};
use crate::model::{Resource, ResourceExtractionResult, ResourceMetadata, TextResourceMetadata, Thumbnail, UrlType};
use crate::pdf_to_image::PdfToImageConverter;
use crate::thumbnail::ThumbnailGenerator;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const PDF_MIME_TYPE: &str = "application/pdf";
const XHTML_MIME_TYPE: &str = "application/xhtml+xml";

fn is_textual(mime_type: &str) -> bool {
    mime_type.starts_with("text/") || mime_type == XHTML_MIME_TYPE
}

/// Text documents. PDFs are scanned for text and image resolution, and get
/// thumbnails from their first page unless the record already has one.
pub struct TextProcessor {
    thumbnail_generator: Arc<ThumbnailGenerator>,
    pdf_converter: Arc<PdfToImageConverter>,
}

impl TextProcessor {
    pub fn new(thumbnail_generator: Arc<ThumbnailGenerator>, pdf_converter: Arc<PdfToImageConverter>) -> Self {
        Self {
            thumbnail_generator,
            pdf_converter,
        }
    }

    async fn scan_pdf(&self, resource: &Resource) -> Result<PdfCharacteristics> {
        let path = require_content(resource)?.to_path_buf();
        tokio::task::spawn_blocking(move || find_pdf_characteristics(&path))
            .await
            .map_err(|e| MediaExtractionError::ProcessingError(format!("PDF scan task failed: {}", e)))?
    }

    async fn create_pdf_thumbnails(&self, resource: &Resource) -> Result<Vec<Thumbnail>> {
        let page = self.pdf_converter.convert_to_image(require_content(resource)?).await?;
        let (_, thumbnails) = self
            .thumbnail_generator
            .generate_thumbnails(resource.resource_url(), "image/png", page.path(), true)
            .await?;
        Ok(thumbnails)
    }
}

#[async_trait]
impl MediaProcessor for TextProcessor {
    async fn extract_metadata(
        &self,
        resource: &Resource,
        detected_mime_type: &str,
        main_thumbnail_available: bool,
    ) -> Result<Option<ResourceExtractionResult>> {
        if !UrlType::should_extract_metadata(resource.url_types()) {
            return Ok(None);
        }
        require_content(resource)?;

        let (characteristics, thumbnails) = if detected_mime_type == PDF_MIME_TYPE {
            let thumbnails = if main_thumbnail_available {
                debug!("Main thumbnail available, not rendering {}", resource.resource_url());
                Vec::new()
            } else {
                self.create_pdf_thumbnails(resource).await?
            };
            (self.scan_pdf(resource).await?, thumbnails)
        } else {
            let characteristics = PdfCharacteristics {
                contains_text: is_textual(detected_mime_type),
                resolution: None,
            };
            (characteristics, Vec::new())
        };

        let metadata = ResourceMetadata::Text(TextResourceMetadata {
            mime_type: detected_mime_type.to_string(),
            resource_url: resource.resource_url().to_string(),
            content_size: Some(content_size(resource)?),
            contains_text: characteristics.contains_text,
            resolution: characteristics.resolution,
            thumbnail_target_names: thumbnails.iter().map(|t| t.target_name.clone()).collect(),
        });
        Ok(Some(ResourceExtractionResult::new(Some(metadata), thumbnails)))
    }

    async fn copy_metadata(
        &self,
        resource: &Resource,
        detected_mime_type: &str,
    ) -> Result<Option<ResourceExtractionResult>> {
        let metadata = ResourceMetadata::Text(TextResourceMetadata {
            mime_type: detected_mime_type.to_string(),
            resource_url: resource.resource_url().to_string(),
            content_size: resource.provided_file_size(),
            contains_text: is_textual(detected_mime_type),
            resolution: None,
            thumbnail_target_names: Vec::new(),
        });
        Ok(Some(ResourceExtractionResult::from_metadata(metadata)))
    }

    fn download_resource_for_full_processing(&self) -> bool {
        true
    }
}

/// Last link of the fallback chain: always handles the resource.
#[async_trait]
impl FallbackHandler for TextProcessor {
    async fn try_extract(
        &self,
        resource: &Resource,
        detected_mime_type: &str,
        main_thumbnail_available: bool,
    ) -> Result<HandlerOutcome> {
        self.extract_metadata(resource, detected_mime_type, main_thumbnail_available)
            .await
            .map(HandlerOutcome::Handled)
    }

    async fn try_copy(&self, resource: &Resource, detected_mime_type: &str) -> Result<HandlerOutcome> {
        self.copy_metadata(resource, detected_mime_type)
            .await
            .map(HandlerOutcome::Handled)
    }

    fn requires_content(&self) -> bool {
        self.download_resource_for_full_processing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandLine;
    use crate::config::MediaExtractorConfig;
    use crate::model::ResourceEntry;
    use crate::test_support::StubRunner;
    use crate::tools::ToolContext;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use std::path::Path;

    fn fake_tools() -> StubRunner {
        StubRunner::new().respond(|command: &CommandLine| {
            let argv = command.argv();
            match argv[0].as_str() {
                "gs" => {
                    let output = argv.iter().find_map(|arg| arg.strip_prefix("-sOutputFile="))?;
                    std::fs::write(output, b"png").ok()?;
                    Some(Ok(String::new()))
                }
                "magick" => {
                    let marker = argv[4].lines().next()?.to_string();
                    for window in argv.windows(2) {
                        if window[0] == "-write" && window[1] != "info:" {
                            std::fs::write(window[1].trim_start_matches("png:"), b"thumb").ok()?;
                        }
                    }
                    Some(Ok(format!(
                        "{m}\n595\n842\nsRGB\n{m}\n{m}\n   10: (255,255,255) #FFFFFF white\n{m}",
                        m = marker
                    )))
                }
                _ => None,
            }
        })
    }

    fn processor() -> (Arc<StubRunner>, TextProcessor) {
        let runner = Arc::new(fake_tools());
        let tools = Arc::new(ToolContext::new("ffprobe", "magick", "gs", "/tmp/colormap.png"));
        let config = MediaExtractorConfig::default();
        let generator = ThumbnailGenerator::new(runner.clone(), tools.clone(), &config);
        let converter = PdfToImageConverter::new(runner.clone(), tools, &config);
        (runner, TextProcessor::new(Arc::new(generator), Arc::new(converter)))
    }

    fn write_text_pdf(path: &Path) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tj", vec![Object::string_literal("Hello world")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    fn resource(file: &tempfile::NamedTempFile, url_types: &[UrlType]) -> Resource {
        let entry = ResourceEntry::new("http://example.com/doc", url_types.iter().copied());
        Resource::new(&entry).with_external_content(file.path())
    }

    fn text_metadata(result: ResourceExtractionResult) -> TextResourceMetadata {
        match result.metadata {
            Some(ResourceMetadata::Text(text)) => text,
            other => panic!("unexpected metadata: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pdf_with_thumbnails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_text_pdf(file.path());
        let (runner, processor) = processor();

        let result = processor
            .extract_metadata(&resource(&file, &[UrlType::IsShownBy]), PDF_MIME_TYPE, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.thumbnails.len(), 2);
        assert!(result.thumbnails.iter().all(|t| t.mime_type == "image/png"));

        let text = text_metadata(result);
        assert!(text.contains_text);
        assert_eq!(text.resolution, None);
        assert_eq!(text.thumbnail_target_names.len(), 2);

        let magick = runner.calls().into_iter().find(|c| c.argv()[0] == "magick").unwrap();
        assert!(magick.argv().contains(&"-alpha".to_string()));
    }

    #[tokio::test]
    async fn test_pdf_without_thumbnails_when_main_thumbnail_available() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_text_pdf(file.path());
        let (runner, processor) = processor();

        let result = processor
            .extract_metadata(&resource(&file, &[UrlType::HasView]), PDF_MIME_TYPE, true)
            .await
            .unwrap()
            .unwrap();
        assert!(result.thumbnails.is_empty());
        assert!(text_metadata(result).contains_text);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_plain_text_types() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"<html></html>").unwrap();
        let (_, processor) = processor();

        for (mime_type, expected) in [
            ("text/html", true),
            ("application/xhtml+xml", true),
            ("application/rtf", false),
        ] {
            let result = processor
                .extract_metadata(&resource(&file, &[UrlType::IsShownBy]), mime_type, false)
                .await
                .unwrap()
                .unwrap();
            assert!(result.thumbnails.is_empty());
            let text = text_metadata(result);
            assert_eq!(text.contains_text, expected, "{}", mime_type);
            assert_eq!(text.content_size, Some(13));
        }
    }

    #[tokio::test]
    async fn test_object_only_resources_are_skipped() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"text").unwrap();
        let (_, processor) = processor();
        let result = processor
            .extract_metadata(&resource(&file, &[UrlType::Object]), "text/plain", false)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_requires_content() {
        let (_, processor) = processor();
        let entry = ResourceEntry::new("http://example.com/doc", [UrlType::IsShownBy]);
        let result = processor.extract_metadata(&Resource::new(&entry), "text/plain", false).await;
        assert!(matches!(result, Err(MediaExtractionError::ContentUnavailable(_))));
    }

    #[tokio::test]
    async fn test_copy_and_fallback_handler() {
        let (_, processor) = processor();
        let entry = ResourceEntry::new("http://example.com/doc", [UrlType::IsShownAt]);
        let resource = Resource::new(&entry).with_provided_file_size(99);

        let outcome = processor.try_copy(&resource, "text/html").await.unwrap();
        let HandlerOutcome::Handled(Some(result)) = outcome else {
            panic!("text handler must always handle");
        };
        let text = text_metadata(result);
        assert_eq!(text.content_size, Some(99));
        assert!(text.contains_text);
        assert!(processor.requires_content());
    }
}
