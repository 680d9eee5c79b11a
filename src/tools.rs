//! Discovery of the external tools and preparation of the shared colour map.
//!
//! Discovery happens once, when a [`ToolContext`] is built. The context is
//! immutable afterwards and is shared by every component that shells out.

use crate::command::{CommandLine, CommandRunner};
use crate::error::MediaProcessorError;
use image::{ImageFormat, Rgb, RgbImage};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempPath;
use tracing::{debug, info, warn};

static GHOSTSCRIPT_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d+)+").expect("Version regex pattern is valid and should compile"));

/// CSS/X11 named colours. Dominant colours are reported in terms of this palette.
const COLOR_PALETTE: &[u32] = &[
    0xF0F8FF, 0xFAEBD7, 0x00FFFF, 0x7FFFD4, 0xF0FFFF, 0xF5F5DC, 0xFFE4C4, 0x000000, 0xFFEBCD, 0x0000FF,
    0x8A2BE2, 0xA52A2A, 0xDEB887, 0x5F9EA0, 0x7FFF00, 0xD2691E, 0xFF7F50, 0x6495ED, 0xFFF8DC, 0xDC143C,
    0x00008B, 0x008B8B, 0xB8860B, 0xA9A9A9, 0x006400, 0xBDB76B, 0x8B008B, 0x556B2F, 0xFF8C00, 0x9932CC,
    0x8B0000, 0xE9967A, 0x8FBC8F, 0x483D8B, 0x2F4F4F, 0x00CED1, 0x9400D3, 0xFF1493, 0x00BFFF, 0x696969,
    0x1E90FF, 0xB22222, 0xFFFAF0, 0x228B22, 0xFF00FF, 0xDCDCDC, 0xF8F8FF, 0xFFD700, 0xDAA520, 0x808080,
    0x008000, 0xADFF2F, 0xF0FFF0, 0xFF69B4, 0xCD5C5C, 0x4B0082, 0xFFFFF0, 0xF0E68C, 0xE6E6FA, 0xFFF0F5,
    0x7CFC00, 0xFFFACD, 0xADD8E6, 0xF08080, 0xE0FFFF, 0xFAFAD2, 0xD3D3D3, 0x90EE90, 0xFFB6C1, 0xFFA07A,
    0x20B2AA, 0x87CEFA, 0x778899, 0xB0C4DE, 0xFFFFE0, 0x00FF00, 0x32CD32, 0xFAF0E6, 0x800000, 0x66CDAA,
    0x0000CD, 0xBA55D3, 0x9370DB, 0x3CB371, 0x7B68EE, 0x00FA9A, 0x48D1CC, 0xC71585, 0x191970, 0xF5FFFA,
    0xFFE4E1, 0xFFE4B5, 0xFFDEAD, 0x000080, 0xFDF5E6, 0x808000, 0x6B8E23, 0xFFA500, 0xFF4500, 0xDA70D6,
    0xEEE8AA, 0x98FB98, 0xAFEEEE, 0xDB7093, 0xFFEFD5, 0xFFDAB9, 0xCD853F, 0xFFC0CB, 0xDDA0DD, 0xB0E0E6,
    0x800080, 0x663399, 0xFF0000, 0xBC8F8F, 0x4169E1, 0x8B4513, 0xFA8072, 0xF4A460, 0x2E8B57, 0xFFF5EE,
    0xA0522D, 0xC0C0C0, 0x87CEEB, 0x6A5ACD, 0x708090, 0xFFFAFA, 0x00FF7F, 0x4682B4, 0xD2B48C, 0x008080,
    0xD8BFD8, 0xFF6347, 0x40E0D0, 0xEE82EE, 0xF5DEB3, 0xFFFFFF, 0xF5F5F5, 0xFFFF00, 0x9ACD32,
];

#[derive(Debug)]
enum ColorMap {
    Owned(TempPath),
    External(PathBuf),
}

/// Discovered tool commands and the reference colour map.
#[derive(Debug)]
pub struct ToolContext {
    ffprobe_command: String,
    magick_command: String,
    ghostscript_command: String,
    color_map: ColorMap,
}

impl ToolContext {
    /// Locate and version-check ffprobe, ImageMagick and Ghostscript, and render
    /// the colour map. Any missing tool is fatal.
    pub async fn discover(runner: &dyn CommandRunner, timeout: Duration) -> Result<Self, MediaProcessorError> {
        let ffprobe_command = discover_ffprobe(runner, timeout).await?;
        let magick_command = discover_magick(runner, timeout).await?;
        let ghostscript_command = discover_ghostscript(runner, timeout).await?;
        let color_map = create_color_map()?;
        Ok(Self {
            ffprobe_command,
            magick_command,
            ghostscript_command,
            color_map: ColorMap::Owned(color_map),
        })
    }

    /// Build a context from already known commands; the colour map file is not
    /// touched or removed.
    pub fn new(
        ffprobe_command: impl Into<String>,
        magick_command: impl Into<String>,
        ghostscript_command: impl Into<String>,
        color_map_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ffprobe_command: ffprobe_command.into(),
            magick_command: magick_command.into(),
            ghostscript_command: ghostscript_command.into(),
            color_map: ColorMap::External(color_map_path.into()),
        }
    }

    pub fn ffprobe_command(&self) -> &str {
        &self.ffprobe_command
    }

    pub fn magick_command(&self) -> &str {
        &self.magick_command
    }

    pub fn ghostscript_command(&self) -> &str {
        &self.ghostscript_command
    }

    pub fn color_map_path(&self) -> &Path {
        match &self.color_map {
            ColorMap::Owned(path) => path,
            ColorMap::External(path) => path,
        }
    }
}

async fn run_redirected(
    runner: &dyn CommandRunner,
    command: CommandLine,
    timeout: Duration,
) -> Result<String, crate::error::CommandExecutionError> {
    runner.execute(&command.redirect_error_stream(true), timeout).await
}

pub(crate) async fn discover_ffprobe(runner: &dyn CommandRunner, timeout: Duration) -> Result<String, MediaProcessorError> {
    let output = run_redirected(runner, CommandLine::new("ffprobe"), timeout)
        .await
        .map_err(|source| MediaProcessorError::Discovery {
            tool: "ffprobe".to_string(),
            source,
        })?;

    let version = output
        .strip_prefix("ffprobe version ")
        .ok_or_else(|| MediaProcessorError::DependencyNotFound("ffprobe".to_string()))?;

    // Release builds report a plain number; git builds ("N-...") are accepted as is.
    let major: String = version.chars().take_while(|c| c.is_ascii_digit()).collect();
    if let Ok(major) = major.parse::<u32>() {
        if major < 2 {
            return Err(MediaProcessorError::DependencyNotFound(format!(
                "ffprobe 2.x or newer (found {})",
                major
            )));
        }
    }
    info!("Found ffprobe version {}", version.split_whitespace().next().unwrap_or_default());
    Ok("ffprobe".to_string())
}

pub(crate) async fn discover_magick(runner: &dyn CommandRunner, timeout: Duration) -> Result<String, MediaProcessorError> {
    match run_redirected(runner, CommandLine::new("magick").arg("-version"), timeout).await {
        Ok(output) if output.starts_with("Version: ImageMagick 7") => {
            info!("Found ImageMagick 7. Command: magick");
            return Ok("magick".to_string());
        }
        Ok(_) => debug!("'magick' is not ImageMagick 7"),
        Err(e) => info!("Could not find ImageMagick 7 because of: {}", e),
    }

    let locator = if cfg!(windows) { "where" } else { "which" };
    let paths: Vec<String> = match run_redirected(runner, CommandLine::new(locator).arg("convert"), timeout).await {
        Ok(output) => output.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect(),
        Err(e) => {
            warn!("Could not find ImageMagick 6: {}", e);
            Vec::new()
        }
    };

    for path in paths {
        match run_redirected(runner, CommandLine::new(path.as_str()).arg("-version"), timeout).await {
            Ok(output) if output.starts_with("Version: ImageMagick 6") => {
                info!("Found ImageMagick 6. Command: {}", path);
                return Ok(path);
            }
            Ok(_) => debug!("{} is not ImageMagick 6", path),
            Err(e) => info!("Could not find ImageMagick 6 at path {} because of: {}", path, e),
        }
    }

    Err(MediaProcessorError::DependencyNotFound("ImageMagick 6 or 7".to_string()))
}

pub(crate) async fn discover_ghostscript(
    runner: &dyn CommandRunner,
    timeout: Duration,
) -> Result<String, MediaProcessorError> {
    let command = if cfg!(windows) { "gswin64c" } else { "gs" };
    let output = run_redirected(runner, CommandLine::new(command).arg("--version"), timeout)
        .await
        .map_err(|source| MediaProcessorError::Discovery {
            tool: "ghostscript".to_string(),
            source,
        })?;

    let version = output.trim();
    if !GHOSTSCRIPT_VERSION.is_match(version) {
        return Err(MediaProcessorError::DependencyNotFound(format!(
            "ghostscript (unexpected version output: {})",
            version
        )));
    }
    info!("Found ghostscript version {}", version);
    Ok(command.to_string())
}

/// Render the palette into a temporary PNG, one pixel per colour.
pub(crate) fn create_color_map() -> Result<TempPath, MediaProcessorError> {
    let path = tempfile::Builder::new()
        .prefix("colormap")
        .suffix(".png")
        .tempfile()?
        .into_temp_path();

    let image = RgbImage::from_fn(COLOR_PALETTE.len() as u32, 1, |x, _| {
        let rgb = COLOR_PALETTE[x as usize];
        Rgb([(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8])
    });
    image
        .save_with_format(&path, ImageFormat::Png)
        .map_err(|e| MediaProcessorError::ColorMap(e.to_string()))?;

    debug!("Color map written to {}", path.display());
    Ok(path)
}
