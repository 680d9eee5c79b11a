//! Audio and video analysis with ffprobe, and DASH manifests

use super::dash::parse_dash_manifest;
use super::MediaProcessor;
use crate::command::{CommandLine, CommandRunner};
use crate::config::MediaExtractorConfig;
use crate::download::{ContentRequest, ResourceDownloadClient};
use crate::error::{MediaExtractionError, Result};
use crate::media_type::{MediaType, DASH_MIME_TYPE};
use crate::model::{
    non_negative_f64, non_negative_u32, non_negative_u64, AudioResourceMetadata, Resource, ResourceEntry,
    ResourceExtractionResult, ResourceMetadata, VideoResourceMetadata,
};
use crate::tools::ToolContext;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

type JsonObject = Map<String, Value>;

/// Frame rate from `num/den` or a plain number. `0/0` is 0.0, any other zero
/// denominator is unknown, and negative rates are unknown.
pub fn parse_frame_rate(value: &str) -> Option<f64> {
    let rate = match value.trim().split_once('/') {
        Some((numerator, denominator)) => {
            let numerator: f64 = numerator.trim().parse().ok()?;
            let denominator: f64 = denominator.trim().parse().ok()?;
            if denominator == 0.0 {
                if numerator == 0.0 {
                    0.0
                } else {
                    return None;
                }
            } else {
                numerator / denominator
            }
        }
        None => value.trim().parse().ok()?,
    };
    non_negative_f64(Some(rate))
}

/// ffprobe reports most numbers as strings; both forms are accepted.
fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    number.filter(|v| !v.is_nan())
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Probe output: the first video (else audio) stream and the container format.
struct ProbeResult<'a> {
    output: &'a str,
    candidates: [&'a JsonObject; 2],
}

impl<'a> ProbeResult<'a> {
    /// The first candidate offering a valid value, stream before format.
    fn find<T>(&self, key: &str, getter: impl Fn(&Value) -> Option<T>) -> Option<T> {
        self.candidates.iter().find_map(|candidate| candidate.get(key).and_then(&getter))
    }

    fn require<T>(&self, key: &str, getter: impl Fn(&Value) -> Option<T>) -> Result<T> {
        self.find(key, getter)
            .ok_or_else(|| MediaExtractionError::parse(format!("Could not find value for field: {}", key), self.output))
    }
}

/// Metadata for audio and video resources.
pub struct AudioVideoProcessor {
    runner: Arc<dyn CommandRunner>,
    tools: Arc<ToolContext>,
    download_client: Arc<dyn ResourceDownloadClient>,
    timeout: Duration,
}

impl AudioVideoProcessor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        tools: Arc<ToolContext>,
        download_client: Arc<dyn ResourceDownloadClient>,
        config: &MediaExtractorConfig,
    ) -> Self {
        Self {
            runner,
            tools,
            download_client,
            timeout: config.audio_video_probe_timeout(),
        }
    }

    /// Probe the local content when there is any, else let ffprobe stream the URL.
    fn create_probe_command(&self, resource: &Resource) -> CommandLine {
        let location = match resource.content_path() {
            Some(path) if resource.has_content() => path.display().to_string(),
            _ => resource.resource_url().to_string(),
        };
        CommandLine::new(self.tools.ffprobe_command())
            .args(&[
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-hide_banner",
            ])
            .arg(location)
    }

    async fn extract_from_manifest(&self, resource: &Resource, detected_mime_type: &str) -> Result<ResourceMetadata> {
        let manifest = if resource.has_content() {
            String::from_utf8_lossy(&resource.read_content().await?).into_owned()
        } else {
            debug!("Fetching DASH manifest {}", resource.resource_url());
            let entry = ResourceEntry::new(resource.resource_url(), resource.url_types().iter().copied());
            let downloaded = self
                .download_client
                .download(&entry, ContentRequest::Always)
                .await
                .map_err(MediaExtractionError::Download)?;
            if !downloaded.has_content() {
                return Err(MediaExtractionError::ContentUnavailable(format!(
                    "Could not download DASH manifest {}",
                    resource.resource_url()
                )));
            }
            String::from_utf8_lossy(&downloaded.read_content().await?).into_owned()
        };

        let info = parse_dash_manifest(&manifest)?;
        Ok(ResourceMetadata::Video(VideoResourceMetadata {
            mime_type: detected_mime_type.to_string(),
            resource_url: resource.resource_url().to_string(),
            content_size: resource.provided_file_size(),
            duration: non_negative_f64(info.duration),
            bit_rate: info.bit_rate,
            width: info.width,
            height: info.height,
            codec_name: info.codec_name,
            frame_rate: info.frame_rate,
        }))
    }
}

/// Turn ffprobe JSON output into audio or video metadata.
pub(crate) fn parse_probe_response(resource: &Resource, detected_mime_type: &str, output: &str) -> Result<ResourceMetadata> {
    let has_content = resource.has_content();
    let json: Value = if output.trim().is_empty() {
        Value::Object(JsonObject::new())
    } else {
        serde_json::from_str(output).map_err(|e| {
            info!("Could not parse ffprobe response: {}", e);
            MediaExtractionError::parse(format!("File seems to be corrupted: {}", e), output)
        })?
    };
    let root = json
        .as_object()
        .ok_or_else(|| MediaExtractionError::parse("ffprobe output is not a JSON object", output))?;

    if !has_content && root.is_empty() {
        return Err(MediaExtractionError::ContentUnavailable(
            "Analysis of this media file revealed no metadata. Probably it could not be downloaded.".to_string(),
        ));
    }

    let format = root
        .get("format")
        .and_then(Value::as_object)
        .ok_or_else(|| MediaExtractionError::parse("No format information", output))?;
    let streams: Vec<&JsonObject> = root
        .get("streams")
        .and_then(Value::as_array)
        .map(|streams| streams.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default();
    let find_stream = |codec_type: &str| {
        streams
            .iter()
            .find(|stream| stream.get("codec_type").and_then(Value::as_str) == Some(codec_type))
            .copied()
    };

    let file_size = match format.get("size").and_then(as_i64) {
        Some(size) => non_negative_u64(Some(size)),
        None if has_content => resource.content_size().ok(),
        None => resource.provided_file_size(),
    };
    let url = resource.resource_url().to_string();
    let mime_type = detected_mime_type.to_string();

    if let Some(video) = find_stream("video") {
        let probe = ProbeResult {
            output,
            candidates: [video, format],
        };
        let frame_rate = probe.require("avg_frame_rate", as_string)?;
        Ok(ResourceMetadata::Video(VideoResourceMetadata {
            mime_type,
            resource_url: url,
            content_size: file_size,
            duration: non_negative_f64(Some(probe.require("duration", as_f64)?)),
            bit_rate: non_negative_u64(Some(probe.require("bit_rate", as_i64)?)),
            width: non_negative_u32(Some(probe.require("width", as_i64)?)),
            height: non_negative_u32(Some(probe.require("height", as_i64)?)),
            codec_name: Some(probe.require("codec_name", as_string)?),
            frame_rate: parse_frame_rate(&frame_rate),
        }))
    } else if let Some(audio) = find_stream("audio") {
        let probe = ProbeResult {
            output,
            candidates: [audio, format],
        };
        Ok(ResourceMetadata::Audio(AudioResourceMetadata {
            mime_type,
            resource_url: url,
            content_size: file_size,
            duration: non_negative_f64(Some(probe.require("duration", as_f64)?)),
            bit_rate: non_negative_u64(Some(probe.require("bit_rate", as_i64)?)),
            channels: non_negative_u32(Some(probe.require("channels", as_i64)?)),
            sample_rate: non_negative_u32(Some(probe.require("sample_rate", as_i64)?)),
            sample_size: non_negative_u32(Some(probe.require("bits_per_sample", as_i64)?)),
            codec_name: probe.find("codec_name", as_string),
        }))
    } else {
        Err(MediaExtractionError::parse("No media streams", output))
    }
}

#[async_trait]
impl MediaProcessor for AudioVideoProcessor {
    async fn extract_metadata(
        &self,
        resource: &Resource,
        detected_mime_type: &str,
        _main_thumbnail_available: bool,
    ) -> Result<Option<ResourceExtractionResult>> {
        let metadata = if detected_mime_type == DASH_MIME_TYPE {
            self.extract_from_manifest(resource, detected_mime_type).await?
        } else {
            let output = self.runner.execute(&self.create_probe_command(resource), self.timeout).await?;
            parse_probe_response(resource, detected_mime_type, &output)?
        };
        Ok(Some(ResourceExtractionResult::from_metadata(metadata)))
    }

    async fn copy_metadata(
        &self,
        resource: &Resource,
        detected_mime_type: &str,
    ) -> Result<Option<ResourceExtractionResult>> {
        let mime_type = detected_mime_type.to_string();
        let resource_url = resource.resource_url().to_string();
        let content_size = resource.provided_file_size();

        let metadata = match MediaType::classify(detected_mime_type) {
            MediaType::Audio => ResourceMetadata::Audio(AudioResourceMetadata {
                mime_type,
                resource_url,
                content_size,
                duration: None,
                bit_rate: None,
                channels: None,
                sample_rate: None,
                sample_size: None,
                codec_name: None,
            }),
            MediaType::Video => ResourceMetadata::Video(VideoResourceMetadata {
                mime_type,
                resource_url,
                content_size,
                duration: None,
                bit_rate: None,
                width: None,
                height: None,
                codec_name: None,
                frame_rate: None,
            }),
            _ => return Ok(None),
        };
        Ok(Some(ResourceExtractionResult::from_metadata(metadata)))
    }

    fn download_resource_for_full_processing(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::FileSystemDownloadClient;
    use crate::model::UrlType;
    use crate::test_support::StubRunner;

    const VIDEO_PROBE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "audio", "codec_name": "aac", "channels": 2, "sample_rate": "48000"},
            {"index": 1, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
             "avg_frame_rate": "30000/1001", "bit_rate": "4500000"}
        ],
        "format": {"duration": "60.060000", "size": "33554432", "bit_rate": "4700000"}
    }"#;

    const AUDIO_PROBE: &str = r#"{
        "streams": [
            {"codec_type": "audio", "codec_name": "mp3", "channels": 2, "sample_rate": "44100",
             "bits_per_sample": 0, "duration": "N/A"}
        ],
        "format": {"duration": "180.5", "size": "2883584", "bit_rate": "128000"}
    }"#;

    fn processor(runner: StubRunner) -> AudioVideoProcessor {
        let tools = Arc::new(ToolContext::new("ffprobe", "magick", "gs", "/tmp/colormap.png"));
        AudioVideoProcessor::new(
            Arc::new(runner),
            tools,
            Arc::new(FileSystemDownloadClient::new()),
            &MediaExtractorConfig::default(),
        )
    }

    fn remote(url: &str) -> Resource {
        Resource::new(&ResourceEntry::new(url, [UrlType::IsShownBy]))
    }

    #[test]
    fn test_frame_rate_parsing() {
        assert_eq!(parse_frame_rate("0/0"), Some(0.0));
        assert_eq!(parse_frame_rate("30/0"), None);
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("-30/1"), None);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("abc"), None);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.001);
    }

    #[test]
    fn test_parse_video_prefers_video_stream() {
        let metadata = parse_probe_response(&remote("http://a/v.mp4"), "video/mp4", VIDEO_PROBE).unwrap();
        match metadata {
            ResourceMetadata::Video(video) => {
                assert_eq!(video.width, Some(1920));
                assert_eq!(video.height, Some(1080));
                assert_eq!(video.codec_name.as_deref(), Some("h264"));
                assert_eq!(video.bit_rate, Some(4_500_000));
                assert_eq!(video.duration, Some(60.06));
                assert_eq!(video.content_size, Some(33_554_432));
                assert!((video.frame_rate.unwrap() - 29.97).abs() < 0.01);
            }
            other => panic!("unexpected metadata: {:?}", other),
        }
    }

    #[test]
    fn test_parse_audio_falls_back_to_format() {
        let metadata = parse_probe_response(&remote("http://a/s.mp3"), "audio/mpeg", AUDIO_PROBE).unwrap();
        match metadata {
            ResourceMetadata::Audio(audio) => {
                assert_eq!(audio.duration, Some(180.5));
                assert_eq!(audio.bit_rate, Some(128_000));
                assert_eq!(audio.channels, Some(2));
                assert_eq!(audio.sample_rate, Some(44_100));
                assert_eq!(audio.sample_size, Some(0));
                assert_eq!(audio.codec_name.as_deref(), Some("mp3"));
            }
            other => panic!("unexpected metadata: {:?}", other),
        }
    }

    #[test]
    fn test_negative_values_become_unknown() {
        let probe = r#"{"streams": [{"codec_type": "video", "codec_name": "vp8", "width": -1, "height": 480,
            "avg_frame_rate": "30/0", "bit_rate": "-5", "duration": "-1"}], "format": {"size": "10"}}"#;
        match parse_probe_response(&remote("http://a/v.webm"), "video/webm", probe).unwrap() {
            ResourceMetadata::Video(video) => {
                assert_eq!(video.width, None);
                assert_eq!(video.height, Some(480));
                assert_eq!(video.bit_rate, None);
                assert_eq!(video.duration, None);
                assert_eq!(video.frame_rate, None);
            }
            other => panic!("unexpected metadata: {:?}", other),
        }
    }

    #[test]
    fn test_parse_failures() {
        let resource = remote("http://a/v.mp4");
        assert!(matches!(
            parse_probe_response(&resource, "video/mp4", "{}"),
            Err(MediaExtractionError::ContentUnavailable(_))
        ));
        assert!(matches!(
            parse_probe_response(&resource, "video/mp4", "not json"),
            Err(MediaExtractionError::Parse { .. })
        ));

        let no_streams = r#"{"streams": [], "format": {"size": "1"}}"#;
        assert!(parse_probe_response(&resource, "video/mp4", no_streams).is_err());

        let missing_field = r#"{"streams": [{"codec_type": "video", "width": 1, "height": 1}], "format": {}}"#;
        match parse_probe_response(&resource, "video/mp4", missing_field) {
            Err(MediaExtractionError::Parse { output, .. }) => assert_eq!(output, missing_field),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_command_targets_url_without_content() {
        let runner = StubRunner::new().reply(&["ffprobe"], VIDEO_PROBE);
        let processor = processor(runner);
        let result = processor
            .extract_metadata(&remote("http://example.com/v.mp4"), "video/mp4", false)
            .await
            .unwrap()
            .unwrap();
        assert!(result.thumbnails.is_empty());

        let command = processor.create_probe_command(&remote("http://example.com/v.mp4"));
        assert_eq!(
            command.argv(),
            [
                "ffprobe",
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-hide_banner",
                "http://example.com/v.mp4"
            ]
        );
    }

    #[tokio::test]
    async fn test_dash_manifest_from_content() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"<MPD mediaPresentationDuration="PT30S"><Period><AdaptationSet mimeType="video/mp4">
               <Representation width="1280" height="720" frameRate="25" codecs="avc1" bandwidth="2000"/>
               </AdaptationSet></Period></MPD>"#,
        )
        .unwrap();
        let entry = ResourceEntry::new("http://example.com/stream.mpd", [UrlType::IsShownBy]);
        let resource = Resource::new(&entry).with_external_content(file.path());

        let runner = StubRunner::new();
        let processor = processor(runner);
        let result = processor
            .extract_metadata(&resource, DASH_MIME_TYPE, false)
            .await
            .unwrap()
            .unwrap();
        match result.metadata {
            Some(ResourceMetadata::Video(video)) => {
                assert_eq!(video.width, Some(1280));
                assert_eq!(video.duration, Some(30.0));
                assert_eq!(video.frame_rate, Some(25.0));
            }
            other => panic!("unexpected metadata: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_copy_metadata() {
        let processor = processor(StubRunner::new());
        let resource = remote("http://a/s.mp3").with_provided_file_size(7);

        let result = processor.copy_metadata(&resource, "audio/mpeg").await.unwrap().unwrap();
        assert!(matches!(result.metadata, Some(ResourceMetadata::Audio(_))));
        assert_eq!(result.metadata.unwrap().content_size(), Some(7));

        let result = processor.copy_metadata(&resource, DASH_MIME_TYPE).await.unwrap().unwrap();
        assert!(matches!(result.metadata, Some(ResourceMetadata::Video(_))));

        assert!(processor.copy_metadata(&resource, "text/plain").await.unwrap().is_none());
        assert!(!processor.download_resource_for_full_processing());
    }
}
