// media_extractor - extract technical metadata and thumbnails for one resource

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use media_extractor::{FileSystemDownloadClient, MediaExtractor, MediaExtractorConfig, ResourceEntry, UrlType};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "media_extractor", version, about = "Extract technical metadata and thumbnails from a media file")]
struct Args {
    /// Local file holding the resource content
    file: PathBuf,

    /// URL the resource is known by (defaults to the file's own URI)
    #[arg(long)]
    url: Option<String>,

    /// Link role of the resource in its record; may be repeated
    #[arg(long = "role", value_enum, default_values_t = [Role::IsShownBy])]
    roles: Vec<Role>,

    /// Mime type declared for the resource, as a server would report it
    #[arg(long)]
    mime_type: Option<String>,

    /// The record's main thumbnail already exists
    #[arg(long)]
    main_thumbnail_available: bool,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write generated thumbnails into this directory
    #[arg(long)]
    thumbnail_dir: Option<PathBuf>,

    /// Print extraction counters after the result
    #[arg(long)]
    stats: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    IsShownBy,
    HasView,
    Object,
    IsShownAt,
}

impl From<Role> for UrlType {
    fn from(role: Role) -> Self {
        match role {
            Role::IsShownBy => UrlType::IsShownBy,
            Role::HasView => UrlType::HasView,
            Role::Object => UrlType::Object,
            Role::IsShownAt => UrlType::IsShownAt,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self
            .to_possible_value()
            .map(|value| value.get_name().to_string())
            .unwrap_or_default();
        f.write_str(&name)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => MediaExtractorConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => MediaExtractorConfig::default(),
    };

    let file = args
        .file
        .canonicalize()
        .with_context(|| format!("Cannot access {}", args.file.display()))?;
    let url = args.url.clone().unwrap_or_else(|| format!("file://{}", file.display()));

    let mut client = FileSystemDownloadClient::new().with_fixed_file(&file);
    if let Some(mime_type) = &args.mime_type {
        client = client.with_declared_mime_type(mime_type.as_str());
    }
    let client = Arc::new(client);

    let extractor = MediaExtractor::new(&config, client.clone(), client)
        .await
        .context("Failed to initialize media extractor")?;

    let entry = ResourceEntry::new(url, args.roles.iter().copied().map(UrlType::from));
    info!("Processing {}", entry.resource_url);
    let result = extractor
        .perform_media_extraction(&entry, args.main_thumbnail_available)
        .await?;

    if let (Some(dir), Some(result)) = (&args.thumbnail_dir, &result) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        for thumbnail in &result.thumbnails {
            let path = dir.join(&thumbnail.target_name);
            tokio::fs::write(&path, &thumbnail.content)
                .await
                .with_context(|| format!("Failed to write thumbnail {}", path.display()))?;
            info!("Wrote {} ({} bytes)", path.display(), thumbnail.content.len());
        }
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialize result")?
    );

    if args.stats {
        println!(
            "{}",
            serde_json::to_string_pretty(&extractor.metrics()).context("Failed to serialize metrics")?
        );
    }

    Ok(())
}
