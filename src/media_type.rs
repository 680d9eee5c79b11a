//! Mapping from mime types to the broad media categories that select a processor.

use serde::{Deserialize, Serialize};

pub const DASH_MIME_TYPE: &str = "application/dash+xml";

const TEXT_MIME_TYPES: [&str; 5] = [
    "application/xml",
    "application/rtf",
    "application/epub",
    "application/pdf",
    "application/xhtml+xml",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Image,
    Audio,
    Video,
    Text,
    ThreeD,
    Unknown,
}

impl MediaType {
    /// Classify a mime type. Total: anything unrecognised is [`MediaType::Unknown`].
    pub fn classify(mime_type: &str) -> Self {
        if mime_type.starts_with("image/") {
            MediaType::Image
        } else if mime_type.starts_with("audio/") {
            MediaType::Audio
        } else if mime_type.starts_with("video/") || mime_type == DASH_MIME_TYPE {
            MediaType::Video
        } else if mime_type.starts_with("model/") {
            MediaType::ThreeD
        } else if TEXT_MIME_TYPES.contains(&mime_type) || mime_type.starts_with("text/") {
            MediaType::Text
        } else {
            MediaType::Unknown
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MediaType::Image => "image",
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Text => "text",
            MediaType::ThreeD => "3d",
            MediaType::Unknown => "unknown",
        }
    }
}
