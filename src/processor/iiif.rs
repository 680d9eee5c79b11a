use super::MediaProcessor;
use crate::error::Result;
use crate::model::{Resource, ResourceExtractionResult};
use async_trait::async_trait;

/// Placeholder for IIIF image service descriptors. Content is requested so
/// the descriptor is available once it is analysed; no result is produced yet.
#[derive(Debug, Default)]
pub struct IiifProcessor;

impl IiifProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaProcessor for IiifProcessor {
    async fn extract_metadata(
        &self,
        _resource: &Resource,
        _detected_mime_type: &str,
        _main_thumbnail_available: bool,
    ) -> Result<Option<ResourceExtractionResult>> {
        Ok(None)
    }

    async fn copy_metadata(
        &self,
        _resource: &Resource,
        _detected_mime_type: &str,
    ) -> Result<Option<ResourceExtractionResult>> {
        Ok(None)
    }

    fn download_resource_for_full_processing(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceEntry, UrlType};

    #[tokio::test]
    async fn test_no_results() {
        let entry = ResourceEntry::new("http://example.com/info.json", [UrlType::IsShownBy]);
        let resource = Resource::new(&entry);
        let processor = IiifProcessor::new();

        assert!(processor.download_resource_for_full_processing());
        assert!(processor.extract_metadata(&resource, "application/json", false).await.unwrap().is_none());
        assert!(processor.copy_metadata(&resource, "application/json").await.unwrap().is_none());
    }
}
