use super::{content_size, require_content, MediaProcessor};
use crate::error::Result;
use crate::model::{Resource, ResourceExtractionResult, ResourceMetadata, ThreeDResourceMetadata};
use async_trait::async_trait;

/// 3D objects: only mime type, location and size are reported.
#[derive(Debug, Default)]
pub struct ThreeDProcessor;

impl ThreeDProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaProcessor for ThreeDProcessor {
    async fn extract_metadata(
        &self,
        resource: &Resource,
        detected_mime_type: &str,
        _main_thumbnail_available: bool,
    ) -> Result<Option<ResourceExtractionResult>> {
        require_content(resource)?;
        let metadata = ThreeDResourceMetadata {
            mime_type: detected_mime_type.to_string(),
            resource_url: resource.resource_url().to_string(),
            content_size: Some(content_size(resource)?),
        };
        Ok(Some(ResourceExtractionResult::from_metadata(ResourceMetadata::ThreeD(metadata))))
    }

    async fn copy_metadata(
        &self,
        resource: &Resource,
        detected_mime_type: &str,
    ) -> Result<Option<ResourceExtractionResult>> {
        let metadata = ThreeDResourceMetadata {
            mime_type: detected_mime_type.to_string(),
            resource_url: resource.resource_url().to_string(),
            content_size: resource.provided_file_size(),
        };
        Ok(Some(ResourceExtractionResult::from_metadata(ResourceMetadata::ThreeD(metadata))))
    }

    fn download_resource_for_full_processing(&self) -> bool {
        true
    }
}
