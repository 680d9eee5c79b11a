//! Thumbnail generation and image analysis with ImageMagick.
//!
//! A single `magick` invocation reads the source once, writes every thumbnail
//! size, and prints the dimensions, colour space and a colour histogram. The
//! printed values are bracketed by a random marker so that warnings emitted
//! by the tool on the same stream are detected instead of misparsed.

use crate::command::{CommandLine, CommandRunner};
use crate::config::MediaExtractorConfig;
use crate::error::{MediaExtractionError, Result};
use crate::media_type::MediaType;
use crate::model::{ImageMetadata, Thumbnail, ThumbnailKind};
use crate::tools::ToolContext;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const MAX_DOMINANT_COLORS: usize = 6;
const EXPECTED_SEGMENTS: usize = 5;
const MAGICK_TEMPORARY_PATH: &str = "MAGICK_TEMPORARY_PATH";

static COLOR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([0-9A-F]{6})").expect("Color regex pattern is valid and should compile"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ThumbnailSize {
    width: u32,
    kind: ThumbnailKind,
}

/// Produces the MEDIUM and LARGE previews of an image and reports its
/// dimensions, colour space and dominant colours.
pub struct ThumbnailGenerator {
    runner: Arc<dyn CommandRunner>,
    tools: Arc<ToolContext>,
    sizes: Vec<ThumbnailSize>,
    timeout: Duration,
}

impl ThumbnailGenerator {
    pub fn new(runner: Arc<dyn CommandRunner>, tools: Arc<ToolContext>, config: &MediaExtractorConfig) -> Self {
        let mut sizes = vec![
            ThumbnailSize {
                width: config.medium_thumbnail_width,
                kind: ThumbnailKind::Medium,
            },
            ThumbnailSize {
                width: config.large_thumbnail_width,
                kind: ThumbnailKind::Large,
            },
        ];
        // The largest size must come last: it is kept on the stack for the histogram.
        sizes.sort_by_key(|size| size.width);

        Self {
            runner,
            tools,
            sizes,
            timeout: config.thumbnail_generate_timeout(),
        }
    }

    /// Generate thumbnails for `content`, an image of the given mime type.
    ///
    /// When the source is narrower than a requested size, that thumbnail is a
    /// verbatim copy of the source. All intermediate files are removed before
    /// returning, on success or failure.
    pub async fn generate_thumbnails(
        &self,
        url: &str,
        mime_type: &str,
        content: &Path,
        remove_alpha: bool,
    ) -> Result<(ImageMetadata, Vec<Thumbnail>)> {
        if MediaType::classify(mime_type) != MediaType::Image {
            return Err(MediaExtractionError::UnsupportedMimeType(format!(
                "Cannot generate thumbnails for non-image type {}",
                mime_type
            )));
        }
        if mime_type.to_ascii_lowercase().contains("djvu") {
            return Err(MediaExtractionError::UnsupportedMimeType(format!(
                "Thumbnail generation is not supported for {}",
                mime_type
            )));
        }

        let work_dir = tempfile::Builder::new().prefix("thumbnails").tempdir()?;
        let magick_temp = work_dir.path().join("magick");
        tokio::fs::create_dir(&magick_temp).await?;

        let output_mime_type = if mime_type == "image/png" { "image/png" } else { "image/jpeg" };
        let targets: Vec<PathBuf> = self
            .sizes
            .iter()
            .map(|size| work_dir.path().join(format!("thumbnail{}", size.kind.suffix())))
            .collect();

        let marker = Uuid::new_v4().simple().to_string();
        let command = self
            .create_thumbnail_command(content, &targets, output_mime_type, remove_alpha, &marker)
            .env(MAGICK_TEMPORARY_PATH, magick_temp.display().to_string());

        let output = self.runner.execute(&command, self.timeout).await?;
        let image = parse_command_response(&output, &marker)?;

        let name_base = hex::encode(Sha256::digest(url.as_bytes()));
        let mut thumbnails = Vec::with_capacity(self.sizes.len());
        for (size, target) in self.sizes.iter().zip(&targets) {
            let generated = tokio::fs::read(target).await?;
            if generated.is_empty() {
                return Err(MediaExtractionError::ProcessingError(format!(
                    "Thumbnail file empty: {}",
                    target.display()
                )));
            }

            let (bytes, thumbnail_mime) = if image.width < size.width {
                debug!("Source narrower than {}px, using original for {}", size.width, url);
                (tokio::fs::read(content).await?, mime_type)
            } else {
                (generated, output_mime_type)
            };

            thumbnails.push(Thumbnail {
                kind: size.kind,
                resource_url: url.to_string(),
                target_name: format!("{}{}", name_base, size.kind.suffix()),
                mime_type: thumbnail_mime.to_string(),
                content: bytes,
            });
        }

        Ok((image, thumbnails))
    }

    fn create_thumbnail_command(
        &self,
        content: &Path,
        targets: &[PathBuf],
        output_mime_type: &str,
        remove_alpha: bool,
        marker: &str,
    ) -> CommandLine {
        let format_prefix = if output_mime_type == "image/png" { "png:" } else { "jpeg:" };

        let mut command = CommandLine::new(self.tools.magick_command())
            .arg("-quiet")
            .arg(format!("{}[0]", content.display()))
            .arg("-format")
            .arg(format!("{m}\n%w\n%h\n%[colorspace]\n{m}\n", m = marker))
            .args(&["-write", "info:"]);

        if remove_alpha {
            command = command.args(&["-background", "white", "-alpha", "remove"]);
        }

        let last = self.sizes.len().saturating_sub(1);
        for (index, (size, target)) in self.sizes.iter().zip(targets).enumerate() {
            if index != last {
                command = command.args(&["(", "+clone"]);
            }
            command = command
                .arg("-thumbnail")
                .arg(format!("{}x", size.width))
                .arg("-write")
                .arg(format!("{}{}", format_prefix, target.display()));
            if index != last {
                command = command.args(&["+delete", ")"]);
            }
        }

        command
            .args(&["-colorspace", "sRGB", "-dither", "Riemersma", "-remap"])
            .path(self.tools.color_map_path())
            .arg("-format")
            .arg(format!("{m}\n%c\n{m}", m = marker))
            .arg("histogram:info:")
    }
}

/// Parse the marker-delimited tool output into image metadata.
pub(crate) fn parse_command_response(output: &str, marker: &str) -> Result<ImageMetadata> {
    let segments: Vec<&str> = output.split(marker).collect();
    if segments.len() != EXPECTED_SEGMENTS {
        return Err(MediaExtractionError::parse(
            format!("Expected {} output segments, found {}", EXPECTED_SEGMENTS, segments.len()),
            output,
        ));
    }
    if let Some(noise) = segments.iter().step_by(2).find(|segment| !segment.trim().is_empty()) {
        info!("Unexpected output from image tool: {}", noise.trim());
        return Err(MediaExtractionError::parse("Image tool reported a problem", output));
    }

    let mut properties = segments[1].lines().map(str::trim).filter(|line| !line.is_empty());
    let width = parse_dimension(properties.next(), "width", output)?;
    let height = parse_dimension(properties.next(), "height", output)?;
    let color_space = properties
        .next()
        .ok_or_else(|| MediaExtractionError::parse("Missing color space", output))?
        .to_string();

    let dominant_colors = extract_dominant_colors(segments[3], output)?;

    Ok(ImageMetadata {
        width,
        height,
        color_space,
        dominant_colors,
    })
}

fn parse_dimension(value: Option<&str>, name: &str, output: &str) -> Result<u32> {
    value
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or_else(|| MediaExtractionError::parse(format!("Could not read image {}", name), output))
}

/// Histogram lines start with the zero-padded pixel count, so a reverse sort
/// puts the most frequent colours first.
fn extract_dominant_colors(histogram: &str, output: &str) -> Result<Vec<String>> {
    let mut lines: Vec<&str> = histogram.lines().filter(|line| !line.trim().is_empty()).collect();
    lines.sort_unstable_by(|a, b| b.cmp(a));

    lines
        .into_iter()
        .take(MAX_DOMINANT_COLORS)
        .map(|line| {
            COLOR_PATTERN
                .captures(line)
                .and_then(|captures| captures.get(1))
                .map(|color| color.as_str().to_string())
                .ok_or_else(|| MediaExtractionError::parse(format!("No color in histogram line '{}'", line), output))
        })
        .collect()
}
