use super::{content_size, require_content, MediaProcessor};
use crate::error::Result;
use crate::model::{ImageResourceMetadata, Resource, ResourceExtractionResult, ResourceMetadata, UrlType};
use crate::thumbnail::ThumbnailGenerator;
use async_trait::async_trait;
use std::sync::Arc;

/// Thumbnails plus dimensions, colour space and dominant colours of images.
pub struct ImageProcessor {
    thumbnail_generator: Arc<ThumbnailGenerator>,
}

impl ImageProcessor {
    pub fn new(thumbnail_generator: Arc<ThumbnailGenerator>) -> Self {
        Self { thumbnail_generator }
    }
}

#[async_trait]
impl MediaProcessor for ImageProcessor {
    async fn extract_metadata(
        &self,
        resource: &Resource,
        detected_mime_type: &str,
        _main_thumbnail_available: bool,
    ) -> Result<Option<ResourceExtractionResult>> {
        let content = require_content(resource)?;
        let size = content_size(resource)?;

        let (image, thumbnails) = self
            .thumbnail_generator
            .generate_thumbnails(resource.resource_url(), detected_mime_type, content, false)
            .await?;

        // Previews (OBJECT only) contribute thumbnails but no metadata.
        let metadata = UrlType::should_extract_metadata(resource.url_types()).then(|| {
            ResourceMetadata::Image(ImageResourceMetadata {
                mime_type: detected_mime_type.to_string(),
                resource_url: resource.resource_url().to_string(),
                content_size: Some(size),
                width: Some(image.width),
                height: Some(image.height),
                color_space: Some(image.color_space),
                dominant_colors: image.dominant_colors,
                thumbnail_target_names: thumbnails.iter().map(|t| t.target_name.clone()).collect(),
            })
        });

        Ok(Some(ResourceExtractionResult::new(metadata, thumbnails)))
    }

    async fn copy_metadata(
        &self,
        resource: &Resource,
        detected_mime_type: &str,
    ) -> Result<Option<ResourceExtractionResult>> {
        let metadata = ResourceMetadata::Image(ImageResourceMetadata {
            mime_type: detected_mime_type.to_string(),
            resource_url: resource.resource_url().to_string(),
            content_size: resource.provided_file_size(),
            width: None,
            height: None,
            color_space: None,
            dominant_colors: Vec::new(),
            thumbnail_target_names: Vec::new(),
        });
        Ok(Some(ResourceExtractionResult::from_metadata(metadata)))
    }

    fn download_resource_for_full_processing(&self) -> bool {
        true
    }
}
