//! oEmbed documents describing a photo or a video hosted elsewhere.

use super::linked::{FallbackHandler, HandlerOutcome};
use crate::error::{MediaExtractionError, Result};
use crate::model::{
    ImageResourceMetadata, Resource, ResourceExtractionResult, ResourceMetadata, VideoResourceMetadata,
};
use async_trait::async_trait;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

const MAX_WIDTH: &str = "maxwidth";
const MAX_HEIGHT: &str = "maxheight";

/// An oEmbed response. Numbers may arrive as JSON numbers or strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OEmbedModel {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub version: Option<String>,
    pub title: Option<String>,
    #[serde(deserialize_with = "lenient_int")]
    pub height: i64,
    #[serde(deserialize_with = "lenient_int")]
    pub width: i64,
    pub url: Option<String>,
    pub author_name: Option<String>,
    pub author_url: Option<String>,
    pub provider_name: Option<String>,
    pub provider_url: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub cache_age: Option<String>,
    pub thumbnail_url: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub thumbnail_height: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub thumbnail_width: Option<String>,
    pub html: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub duration: Option<String>,
}

fn lenient_int<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f as i64))
            .ok_or_else(|| de::Error::custom(format!("invalid integer: {}", number))),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(0),
        Some(Value::String(text)) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid integer: {}", text))),
        Some(other) => Err(de::Error::custom(format!("invalid integer: {}", other))),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

impl OEmbedModel {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            MediaExtractionError::parse(
                format!("Unable to read oEmbed JSON: {}", e),
                String::from_utf8_lossy(bytes),
            )
        })
    }

    /// Child elements of the root become fields; attributes and nesting are ignored.
    pub fn from_xml(bytes: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(bytes);
        let document = roxmltree::Document::parse(&text)
            .map_err(|e| MediaExtractionError::parse(format!("Unable to read oEmbed XML: {}", e), text.as_ref()))?;

        let fields: Map<String, Value> = document
            .root_element()
            .children()
            .filter(|node| node.is_element())
            .map(|node| {
                let value = node.text().map(|t| Value::String(t.trim().to_string())).unwrap_or(Value::Null);
                (node.tag_name().name().to_string(), value)
            })
            .collect();

        serde_json::from_value(Value::Object(fields)).map_err(|e| {
            MediaExtractionError::parse(format!("Unable to read oEmbed XML: {}", e), text.as_ref())
        })
    }

    fn has_type(&self, expected: &str) -> bool {
        self.kind.as_deref().is_some_and(|kind| kind.eq_ignore_ascii_case(expected))
    }

    fn has_valid_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn is_valid_photo(&self) -> bool {
        self.has_type("photo") && non_empty(&self.url) && self.has_valid_dimensions()
    }

    pub fn is_valid_video(&self) -> bool {
        self.has_type("video") && non_empty(&self.html) && self.has_valid_dimensions()
    }

    pub fn has_valid_version(&self) -> bool {
        self.version.as_deref().is_some_and(|v| v.starts_with("1.0"))
    }

    /// A version 1.0 photo with a url or video with html, both with positive dimensions.
    pub fn is_valid(&self) -> bool {
        self.has_valid_version() && (self.is_valid_photo() || self.is_valid_video())
    }

    /// Seconds, or 0.0 when absent or not a number.
    pub fn duration_seconds(&self) -> f64 {
        self.duration
            .as_deref()
            .and_then(|d| d.trim().parse().ok())
            .unwrap_or(0.0)
    }
}

fn query_parameters(url: &str) -> HashMap<&str, &str> {
    let Some((_, query)) = url.split_once('?') else {
        return HashMap::new();
    };
    let query = query.split('#').next().unwrap_or_default();
    query
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn within_limit(limit: Option<&str>, value: Option<i64>) -> Option<bool> {
    let limit: i64 = limit?.trim().parse().ok()?;
    Some(limit > 0 && value? <= limit)
}

/// Compare the reported sizes against the `maxwidth`/`maxheight` the resource
/// URL asked for. Mismatches are only reported.
fn check_size_parameters(model: &OEmbedModel, url: &str) {
    let params = query_parameters(url);
    if !params.contains_key(MAX_WIDTH) && !params.contains_key(MAX_HEIGHT) {
        debug!("No size parameters in {}, size checks skipped", url);
        return;
    }

    let thumbnail = |value: &Option<String>| {
        model.thumbnail_url.as_ref()?;
        value.as_deref()?.trim().parse::<i64>().ok()
    };
    let checks = [
        ("height", MAX_HEIGHT, Some(model.height)),
        ("width", MAX_WIDTH, Some(model.width)),
        ("thumbnail height", MAX_HEIGHT, thumbnail(&model.thumbnail_height)),
        ("thumbnail width", MAX_WIDTH, thumbnail(&model.thumbnail_width)),
    ];
    for (property, parameter, value) in checks {
        if within_limit(params.get(parameter).copied(), value) != Some(true) {
            warn!("Not valid {} according to {} of {}", property, parameter, url);
        }
    }
}

/// First link of the fallback chain for text and unknown types.
#[derive(Debug, Default)]
pub struct OEmbedProcessor;

impl OEmbedProcessor {
    pub fn new() -> Self {
        Self
    }

    async fn read_model(resource: &Resource, detected_mime_type: &str) -> Result<Option<OEmbedModel>> {
        let parse: fn(&[u8]) -> Result<OEmbedModel> = if detected_mime_type.starts_with("application/json") {
            OEmbedModel::from_json
        } else if detected_mime_type.starts_with("application/xml") {
            OEmbedModel::from_xml
        } else {
            return Ok(None);
        };
        let bytes = resource.read_content().await?;
        parse(&bytes).map(Some)
    }

    fn create_result(resource: &Resource, detected_mime_type: &str, model: &OEmbedModel) -> ResourceExtractionResult {
        let width = u32::try_from(model.width).ok();
        let height = u32::try_from(model.height).ok();
        let metadata = if model.is_valid_photo() {
            ResourceMetadata::Image(ImageResourceMetadata {
                mime_type: detected_mime_type.to_string(),
                resource_url: resource.resource_url().to_string(),
                content_size: resource.provided_file_size(),
                width,
                height,
                color_space: None,
                dominant_colors: Vec::new(),
                thumbnail_target_names: Vec::new(),
            })
        } else {
            ResourceMetadata::Video(VideoResourceMetadata {
                mime_type: detected_mime_type.to_string(),
                resource_url: resource.resource_url().to_string(),
                content_size: resource.provided_file_size(),
                duration: Some(model.duration_seconds()),
                bit_rate: None,
                width,
                height,
                codec_name: None,
                frame_rate: None,
            })
        };
        ResourceExtractionResult::from_metadata(metadata)
    }
}

#[async_trait]
impl FallbackHandler for OEmbedProcessor {
    async fn try_extract(
        &self,
        resource: &Resource,
        detected_mime_type: &str,
        _main_thumbnail_available: bool,
    ) -> Result<HandlerOutcome> {
        if resource.content_path().is_none() {
            return Ok(HandlerOutcome::Pass);
        }
        match Self::read_model(resource, detected_mime_type).await? {
            Some(model) if model.is_valid() => {
                check_size_parameters(&model, resource.resource_url());
                Ok(HandlerOutcome::Handled(Some(Self::create_result(resource, detected_mime_type, &model))))
            }
            Some(_) => {
                warn!("No valid oEmbed model found in {}", resource.resource_url());
                Ok(HandlerOutcome::Pass)
            }
            None => Ok(HandlerOutcome::Pass),
        }
    }

    async fn try_copy(&self, _resource: &Resource, detected_mime_type: &str) -> Result<HandlerOutcome> {
        if detected_mime_type.starts_with("application/json+oembed")
            || detected_mime_type.starts_with("application/xml+oembed")
        {
            Ok(HandlerOutcome::Handled(None))
        } else {
            Ok(HandlerOutcome::Pass)
        }
    }

    fn requires_content(&self) -> bool {
        true
    }
}
