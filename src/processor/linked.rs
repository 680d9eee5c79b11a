use super::MediaProcessor;
use crate::error::Result;
use crate::model::{Resource, ResourceExtractionResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Answer of a [`FallbackHandler`]: either it took the resource, or the next
/// handler should try.
#[derive(Debug)]
pub enum HandlerOutcome {
    Handled(Option<ResourceExtractionResult>),
    Pass,
}

/// One link of the [`LinkedProcessor`] chain.
#[async_trait]
pub trait FallbackHandler: Send + Sync {
    async fn try_extract(
        &self,
        resource: &Resource,
        detected_mime_type: &str,
        main_thumbnail_available: bool,
    ) -> Result<HandlerOutcome>;

    async fn try_copy(&self, resource: &Resource, detected_mime_type: &str) -> Result<HandlerOutcome>;

    fn requires_content(&self) -> bool;
}

/// Text and unknown resources: handlers are asked in order and the first one
/// that handles the resource decides the result.
pub struct LinkedProcessor {
    handlers: Vec<Arc<dyn FallbackHandler>>,
}

impl LinkedProcessor {
    pub fn new(handlers: Vec<Arc<dyn FallbackHandler>>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl MediaProcessor for LinkedProcessor {
    async fn extract_metadata(
        &self,
        resource: &Resource,
        detected_mime_type: &str,
        main_thumbnail_available: bool,
    ) -> Result<Option<ResourceExtractionResult>> {
        for handler in &self.handlers {
            if let HandlerOutcome::Handled(result) = handler
                .try_extract(resource, detected_mime_type, main_thumbnail_available)
                .await?
            {
                return Ok(result);
            }
        }
        Ok(None)
    }

    async fn copy_metadata(
        &self,
        resource: &Resource,
        detected_mime_type: &str,
    ) -> Result<Option<ResourceExtractionResult>> {
        for handler in &self.handlers {
            if let HandlerOutcome::Handled(result) = handler.try_copy(resource, detected_mime_type).await? {
                return Ok(result);
            }
        }
        Ok(None)
    }

    fn download_resource_for_full_processing(&self) -> bool {
        self.handlers.iter().any(|handler| handler.requires_content())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaExtractionError;
    use crate::model::{ResourceEntry, ResourceMetadata, ThreeDResourceMetadata, UrlType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        handles: bool,
        fails: bool,
        content: bool,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(handles: bool, content: bool) -> Arc<Self> {
            Arc::new(Self {
                handles,
                fails: false,
                content,
                calls: AtomicUsize::new(0),
            })
        }

        fn outcome(&self, resource: &Resource, mime_type: &str) -> Result<HandlerOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fails {
                return Err(MediaExtractionError::ProcessingError("boom".to_string()));
            }
            if !self.handles {
                return Ok(HandlerOutcome::Pass);
            }
            let metadata = ResourceMetadata::ThreeD(ThreeDResourceMetadata {
                mime_type: mime_type.to_string(),
                resource_url: resource.resource_url().to_string(),
                content_size: None,
            });
            Ok(HandlerOutcome::Handled(Some(ResourceExtractionResult::from_metadata(metadata))))
        }
    }

    #[async_trait]
    impl FallbackHandler for Fixed {
        async fn try_extract(&self, resource: &Resource, mime_type: &str, _main: bool) -> Result<HandlerOutcome> {
            self.outcome(resource, mime_type)
        }

        async fn try_copy(&self, resource: &Resource, mime_type: &str) -> Result<HandlerOutcome> {
            self.outcome(resource, mime_type)
        }

        fn requires_content(&self) -> bool {
            self.content
        }
    }

    fn chain(handlers: &[&Arc<Fixed>]) -> LinkedProcessor {
        LinkedProcessor::new(
            handlers
                .iter()
                .map(|handler| Arc::clone(handler) as Arc<dyn FallbackHandler>)
                .collect(),
        )
    }

    fn resource() -> Resource {
        Resource::new(&ResourceEntry::new("http://example.com/page", [UrlType::IsShownBy]))
    }

    #[tokio::test]
    async fn test_first_handler_that_handles_wins() {
        let first = Fixed::new(false, false);
        let second = Fixed::new(true, false);
        let third = Fixed::new(true, false);
        let processor = chain(&[&first, &second, &third]);

        let result = processor.extract_metadata(&resource(), "text/html", false).await.unwrap();
        assert_eq!(result.unwrap().metadata.unwrap().mime_type(), "text/html");
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_nobody_handles() {
        let processor = chain(&[&Fixed::new(false, false)]);
        assert!(processor.copy_metadata(&resource(), "text/html").await.unwrap().is_none());
        assert!(LinkedProcessor::new(Vec::new())
            .extract_metadata(&resource(), "text/html", true)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_errors_stop_the_chain() {
        let failing = Arc::new(Fixed {
            handles: true,
            fails: true,
            content: false,
            calls: AtomicUsize::new(0),
        });
        let after = Fixed::new(true, false);
        let processor = chain(&[&failing, &after]);
        assert!(processor.extract_metadata(&resource(), "text/html", false).await.is_err());
        assert_eq!(after.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_download_if_any_handler_needs_content() {
        assert!(!chain(&[&Fixed::new(true, false)]).download_resource_for_full_processing());
        assert!(chain(&[&Fixed::new(true, false), &Fixed::new(true, true)]).download_resource_for_full_processing());
    }
}
