//! Strict extraction of a delimited section from a final message.

use serde::{Deserialize, Serialize};

use crate::contract::{recognised_markers, SectionMarker};

/// Result of looking up a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Extraction {
    Found(String),
    /// The marker is present but nothing but whitespace follows it.
    Empty,
    MarkerAbsent,
}

impl Extraction {
    pub fn found(self) -> Option<String> {
        match self {
            Extraction::Found(text) => Some(text),
            Extraction::Empty | Extraction::MarkerAbsent => None,
        }
    }
}

/// Take the text after the first `begin_marker` up to the next recognised
/// marker (any of `end_markers` or the known section markers) or the end of
/// the message, trimmed.
///
/// This never guesses: a message without `begin_marker` is
/// [`Extraction::MarkerAbsent`].
pub fn extract(
    final_message: &str,
    begin_marker: &SectionMarker,
    end_markers: &[SectionMarker],
) -> Extraction {
    let token = begin_marker.token();
    let Some(start) = final_message.find(&token) else {
        return Extraction::MarkerAbsent;
    };
    let rest = &final_message[start + token.len()..];

    let mut boundaries = recognised_markers(end_markers);
    boundaries.retain(|m| m != begin_marker);
    let stop = boundaries
        .iter()
        .filter_map(|m| rest.find(&m.token()))
        .min()
        .unwrap_or(rest.len());

    let text = rest[..stop].trim();
    if text.is_empty() {
        Extraction::Empty
    } else {
        Extraction::Found(text.to_string())
    }
}

/// Extract the `Final Version` section of an integrator message.
pub fn extract_final_version(final_message: &str) -> Extraction {
    extract(
        final_message,
        &SectionMarker::final_version(),
        &[SectionMarker::feedback()],
    )
}
