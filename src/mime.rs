//! Mime type sniffing of local content.
//!
//! Magic bytes are checked with `infer` first, then with `tree_magic_mini`.
//! A caller-provided hint only wins when the sniffers return a generic type
//! and the hint is a more specific member of the same family. `text/xml` is
//! reported as its alias `application/xml`.

use std::path::Path;
use tokio::io::AsyncReadExt;

const SNIFF_LENGTH: u64 = 64 * 1024;
const OCTET_STREAM: &str = "application/octet-stream";
const XML: &str = "application/xml";

/// The mime type without parameters, e.g. `text/html; charset=utf-8` -> `text/html`.
pub fn strip_parameters(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or(mime_type).trim()
}

/// Detect the mime type of the file at `path`, using `hint` (usually the
/// server-provided type) to refine generic results.
pub async fn detect_local(path: &Path, hint: Option<&str>) -> std::io::Result<String> {
    let mut head = Vec::new();
    tokio::fs::File::open(path)
        .await?
        .take(SNIFF_LENGTH)
        .read_to_end(&mut head)
        .await?;
    Ok(detect_bytes(&head, hint))
}

/// The registered name for aliased types.
pub fn canonical_mime_type(mime_type: &str) -> &str {
    if mime_type.eq_ignore_ascii_case("text/xml") {
        XML
    } else {
        mime_type
    }
}

pub fn detect_bytes(bytes: &[u8], hint: Option<&str>) -> String {
    let sniffed = canonical_mime_type(match infer::get(bytes) {
        Some(kind) => kind.mime_type(),
        None if bytes.is_empty() => OCTET_STREAM,
        None => tree_magic_mini::from_u8(bytes),
    });

    let hint = hint.map(|hint| canonical_mime_type(strip_parameters(hint)));
    match hint.filter(|hint| !hint.is_empty()) {
        Some(hint) if refines(sniffed, hint) => hint.to_string(),
        _ => sniffed.to_string(),
    }
}

/// Whether `hint` is a more specific version of the generic `sniffed` type.
fn refines(sniffed: &str, hint: &str) -> bool {
    if sniffed == hint {
        return false;
    }
    match sniffed {
        OCTET_STREAM | "application/x-empty" => true,
        "text/plain" => hint.starts_with("text/") || is_json(hint) || is_xml(hint),
        XML => is_xml(hint),
        "application/json" => is_json(hint),
        "application/zip" => hint.ends_with("+zip") || hint.starts_with("application/vnd.") || hint.starts_with("model/"),
        _ => false,
    }
}

fn is_xml(mime_type: &str) -> bool {
    mime_type.ends_with("+xml") || mime_type.starts_with("application/xml") || mime_type.starts_with("text/xml")
}

fn is_json(mime_type: &str) -> bool {
    mime_type.ends_with("+json") || mime_type.starts_with("application/json")
}
