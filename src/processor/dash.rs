//! MPEG-DASH manifest (MPD) parsing

use super::audio_video::parse_frame_rate;
use crate::error::{MediaExtractionError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use roxmltree::{Document, Node};

static ISO8601_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^P(?:(\d+(?:\.\d+)?)D)?(?:T(?:(\d+(?:\.\d+)?)H)?(?:(\d+(?:\.\d+)?)M)?(?:(\d+(?:\.\d+)?)S)?)?$")
        .expect("Duration regex pattern is valid and should compile")
});

/// Video properties of the representation chosen from a manifest.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashVideoInfo {
    pub duration: Option<f64>,
    pub bit_rate: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec_name: Option<String>,
    pub frame_rate: Option<f64>,
}

/// Seconds in an ISO-8601 duration of the form `PnDTnHnMnS`.
pub fn parse_iso8601_duration(value: &str) -> Option<f64> {
    let captures = ISO8601_DURATION.captures(value.trim())?;
    let factors = [86_400.0, 3_600.0, 60.0, 1.0];
    let mut seconds = 0.0;
    let mut any = false;
    for (index, factor) in factors.iter().enumerate() {
        if let Some(component) = captures.get(index + 1) {
            seconds += component.as_str().parse::<f64>().ok()? * factor;
            any = true;
        }
    }
    any.then_some(seconds)
}

fn child_elements<'a, 'input>(node: Node<'a, 'input>, name: &'a str) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |child| child.is_element() && child.tag_name().name() == name)
}

fn is_video(node: Node) -> bool {
    ["contentType", "mimeType"]
        .iter()
        .filter_map(|attribute| node.attribute(*attribute))
        .any(|value| value.starts_with("video"))
}

fn dimension(node: Node, name: &str) -> Option<u32> {
    node.attribute(name).and_then(|value| value.trim().parse().ok())
}

/// Choose the representation to report, see [`parse_dash_manifest`].
fn select_representation<'a, 'input>(representations: &[Node<'a, 'input>]) -> Option<Node<'a, 'input>> {
    if let [only] = representations {
        return Some(*only);
    }

    // Ties keep the earliest representation.
    let largest = representations
        .iter()
        .filter_map(|node| Some((*node, u64::from(dimension(*node, "width")?) * u64::from(dimension(*node, "height")?))))
        .fold(None, |best: Option<(Node, u64)>, (node, area)| match best {
            Some((_, best_area)) if best_area >= area => best,
            _ => Some((node, area)),
        });
    if let Some((node, _)) = largest {
        return Some(node);
    }

    representations
        .iter()
        .find(|node| is_video(**node) || node.has_attribute("width") || node.has_attribute("height"))
        .copied()
}

/// Extract the video properties of a DASH manifest.
///
/// The first `Period` is used, and within it the first `AdaptationSet` of a
/// video type. A single representation is taken as is; otherwise the one with
/// the largest `width*height` wins, falling back to the first representation
/// that is marked as video or has any dimension. Attributes missing on the
/// representation are taken from the adaptation set.
pub fn parse_dash_manifest(xml: &str) -> Result<DashVideoInfo> {
    let document = Document::parse(xml)
        .map_err(|e| MediaExtractionError::parse(format!("Could not parse DASH manifest: {}", e), xml))?;

    let mpd = document.root_element();
    if mpd.tag_name().name() != "MPD" {
        return Err(MediaExtractionError::parse("Document is not a DASH manifest", xml));
    }

    let period = child_elements(mpd, "Period")
        .next()
        .ok_or_else(|| MediaExtractionError::parse("DASH manifest has no Period", xml))?;
    let adaptation_set = child_elements(period, "AdaptationSet")
        .find(|node| is_video(*node))
        .ok_or_else(|| MediaExtractionError::parse("DASH manifest has no video AdaptationSet", xml))?;

    let representations: Vec<Node> = child_elements(adaptation_set, "Representation").collect();
    let representation = select_representation(&representations)
        .ok_or_else(|| MediaExtractionError::parse("No suitable video Representation in DASH manifest", xml))?;

    let attribute = |name: &str| {
        representation
            .attribute(name)
            .or_else(|| adaptation_set.attribute(name))
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    Ok(DashVideoInfo {
        duration: mpd.attribute("mediaPresentationDuration").and_then(parse_iso8601_duration),
        bit_rate: representation.attribute("bandwidth").and_then(|v| v.trim().parse().ok()),
        width: attribute("width").and_then(|v| v.parse().ok()),
        height: attribute("height").and_then(|v| v.parse().ok()),
        codec_name: attribute("codecs").map(String::from),
        frame_rate: attribute("frameRate").and_then(parse_frame_rate),
    })
}
