//! First-page rasterization of PDF files with Ghostscript

use crate::command::{CommandLine, CommandRunner};
use crate::config::MediaExtractorConfig;
use crate::error::{MediaExtractionError, Result};
use crate::tools::ToolContext;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const OUTPUT_FILE_NAME: &str = "pdf-page.png";

/// A rendered page. The image and its directory are deleted when this is dropped.
#[derive(Debug)]
pub struct RasterizedPage {
    _dir: TempDir,
    path: PathBuf,
}

impl RasterizedPage {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub struct PdfToImageConverter {
    runner: Arc<dyn CommandRunner>,
    tools: Arc<ToolContext>,
    timeout: Duration,
}

impl PdfToImageConverter {
    pub fn new(runner: Arc<dyn CommandRunner>, tools: Arc<ToolContext>, config: &MediaExtractorConfig) -> Self {
        Self {
            runner,
            tools,
            timeout: config.pdf_conversion_timeout(),
        }
    }

    /// Render page 1 of `pdf` at 72 DPI into a PNG with alpha.
    pub async fn convert_to_image(&self, pdf: &Path) -> Result<RasterizedPage> {
        let dir = tempfile::Builder::new().prefix("pdf-to-image").tempdir()?;
        let path = dir.path().join(OUTPUT_FILE_NAME);

        // On any failure below `dir` is dropped, taking partial output with it.
        self.runner.execute(&self.create_command(pdf, &path), self.timeout).await?;

        let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(MediaExtractionError::ProcessingError(format!(
                "Could not convert first page of {} to an image",
                pdf.display()
            )));
        }

        Ok(RasterizedPage { _dir: dir, path })
    }

    fn create_command(&self, pdf: &Path, output: &Path) -> CommandLine {
        CommandLine::new(self.tools.ghostscript_command())
            .args(&[
                "-q",
                "-dQUIET",
                "-dSAFER",
                "-dBATCH",
                "-dNOPAUSE",
                "-dNOPROMPT",
                "-dMaxBitmap=500000000",
                "-dAlignToPixels=0",
                "-dGridFitTT=2",
                "-sDEVICE=pngalpha",
                "-dTextAlphaBits=4",
                "-dGraphicsAlphaBits=4",
                "-r72x72",
                "-dFirstPage=1",
                "-dLastPage=1",
            ])
            .arg(format!("-sOutputFile={}", output.display()))
            .arg(format!("-f{}", pdf.display()))
    }
}
