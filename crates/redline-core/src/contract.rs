//! Response contracts: delimited sections, numbered lists and word ceilings.
//!
//! A sectioned response looks like
//!
//! ```text
//! ### Version ###
//! <edited text>
//!
//! ### Feedback ###
//! <comments>
//! ```
//!
//! [`validate`] turns an ordered marker list into a section map and reports
//! every deviation as a [`Violation`]. Nothing is truncated or rewritten; the
//! caller decides what a violation means for its stage.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{word_count, ResponseFormat};

/// Section names every parser treats as boundaries.
pub const KNOWN_SECTIONS: [&str; 3] = ["Version", "Feedback", "Final Version"];

/// Section name used for numbered-list responses.
pub const SUBTASKS_SECTION: &str = "Subtasks";

/// A literal `### <name> ###` delimiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionMarker(String);

impl SectionMarker {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn version() -> Self {
        Self::new("Version")
    }

    pub fn feedback() -> Self {
        Self::new("Feedback")
    }

    pub fn final_version() -> Self {
        Self::new("Final Version")
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// The exact delimiter text.
    pub fn token(&self) -> String {
        format!("### {} ###", self.0)
    }
}

impl std::fmt::Display for SectionMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// How the section structure was recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Every expected marker was found.
    Clean,
    /// Some delimiters were found, but not all expected markers.
    Partial,
    /// No delimiter at all; the whole response was filed under the first marker.
    Inferred,
}

/// One deviation from the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    MissingMarker { section: String },
    EmptySection { section: String },
    DuplicateMarker { section: String, occurrences: usize },
    OutOfOrder { section: String },
    FormatInferred { section: String },
    NoNumberedItems,
    LengthExceeded { section: String, words: usize, limit: usize },
}

impl Violation {
    pub fn is_length(&self) -> bool {
        matches!(self, Violation::LengthExceeded { .. })
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::MissingMarker { section } => write!(f, "missing marker for '{section}'"),
            Violation::EmptySection { section } => write!(f, "section '{section}' is empty"),
            Violation::DuplicateMarker {
                section,
                occurrences,
            } => write!(f, "marker for '{section}' appears {occurrences} times"),
            Violation::OutOfOrder { section } => {
                write!(f, "section '{section}' appears out of order")
            }
            Violation::FormatInferred { section } => write!(
                f,
                "no delimiter found; whole response inferred as '{section}'"
            ),
            Violation::NoNumberedItems => write!(f, "response contains no numbered items"),
            Violation::LengthExceeded {
                section,
                words,
                limit,
            } => write!(f, "section '{section}' has {words} words (limit {limit})"),
        }
    }
}

/// An extracted section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub text: String,
}

/// Outcome of checking one response against its contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub match_kind: MatchKind,
    /// Extracted sections in expected order; missing sections are absent.
    pub sections: Vec<Section>,
    pub violations: Vec<Violation>,
    pub primary_word_count: usize,
}

impl ValidationResult {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn section(&self, name: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.text.as_str())
    }

    /// Text of the first section, when it was recovered and is non-empty.
    pub fn primary(&self) -> Option<&str> {
        self.sections
            .first()
            .map(|s| s.text.as_str())
            .filter(|t| !t.is_empty())
    }

    pub fn length_violation(&self) -> Option<&Violation> {
        self.violations.iter().find(|v| v.is_length())
    }

    /// Violations other than word-count overruns.
    pub fn format_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.is_length())
    }

    pub fn has_format_violations(&self) -> bool {
        self.format_violations().next().is_some()
    }

    pub fn describe(&self) -> String {
        self.violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Copy)]
struct Occurrence {
    start: usize,
    end: usize,
    marker: usize,
}

/// All recognised delimiter occurrences, sorted by position, without overlaps.
fn scan(text: &str, recognised: &[SectionMarker]) -> Vec<Occurrence> {
    let mut found: Vec<Occurrence> = recognised
        .iter()
        .enumerate()
        .flat_map(|(idx, marker)| {
            let token = marker.token();
            text.match_indices(&token)
                .map(|(start, m)| Occurrence {
                    start,
                    end: start + m.len(),
                    marker: idx,
                })
                .collect::<Vec<_>>()
        })
        .collect();
    found.sort_by_key(|o| (o.start, std::cmp::Reverse(o.end)));

    let mut out: Vec<Occurrence> = Vec::with_capacity(found.len());
    for occ in found {
        if out.last().map_or(true, |prev| occ.start >= prev.end) {
            out.push(occ);
        }
    }
    out
}

/// Expected markers followed by the known markers not already listed.
pub(crate) fn recognised_markers(expected: &[SectionMarker]) -> Vec<SectionMarker> {
    let mut all = expected.to_vec();
    for name in KNOWN_SECTIONS {
        if !all.iter().any(|m| m.name() == name) {
            all.push(SectionMarker::new(name));
        }
    }
    all
}

/// Validate a sectioned response.
///
/// The first expected marker names the primary section; `word_limit` applies
/// to it alone. When the response contains no recognised delimiter the whole
/// trimmed text is filed under the primary section and the result is marked
/// [`MatchKind::Inferred`].
pub fn validate(
    raw_text: &str,
    expected_sections: &[SectionMarker],
    word_limit: Option<usize>,
) -> ValidationResult {
    let mut violations = Vec::new();
    let mut sections = Vec::new();

    let Some(primary) = expected_sections.first() else {
        return ValidationResult {
            match_kind: MatchKind::Clean,
            sections,
            violations,
            primary_word_count: 0,
        };
    };

    let recognised = recognised_markers(expected_sections);
    let occurrences = scan(raw_text, &recognised);

    let match_kind = if occurrences.is_empty() {
        let text = raw_text.trim().to_string();
        violations.push(Violation::FormatInferred {
            section: primary.name().to_string(),
        });
        if text.is_empty() {
            violations.push(Violation::EmptySection {
                section: primary.name().to_string(),
            });
        }
        sections.push(Section {
            name: primary.name().to_string(),
            text,
        });
        MatchKind::Inferred
    } else {
        let mut missing = false;
        let mut last_start: Option<usize> = None;

        for (idx, marker) in expected_sections.iter().enumerate() {
            let hits: Vec<usize> = occurrences
                .iter()
                .enumerate()
                .filter(|(_, o)| o.marker == idx)
                .map(|(pos, _)| pos)
                .collect();

            let Some(&first) = hits.first() else {
                missing = true;
                violations.push(Violation::MissingMarker {
                    section: marker.name().to_string(),
                });
                continue;
            };

            if hits.len() > 1 {
                violations.push(Violation::DuplicateMarker {
                    section: marker.name().to_string(),
                    occurrences: hits.len(),
                });
            }

            let occ = occurrences[first];
            if last_start.is_some_and(|prev| occ.start < prev) {
                violations.push(Violation::OutOfOrder {
                    section: marker.name().to_string(),
                });
            }
            last_start = Some(occ.start);

            let stop = occurrences
                .get(first + 1)
                .map_or(raw_text.len(), |next| next.start);
            let text = raw_text[occ.end..stop].trim().to_string();
            if text.is_empty() {
                violations.push(Violation::EmptySection {
                    section: marker.name().to_string(),
                });
            }
            sections.push(Section {
                name: marker.name().to_string(),
                text,
            });
        }

        if missing {
            MatchKind::Partial
        } else {
            MatchKind::Clean
        }
    };

    let primary_word_count = sections
        .iter()
        .find(|s| s.name == primary.name())
        .map_or(0, |s| word_count(&s.text));

    if let Some(limit) = word_limit {
        if primary_word_count > limit {
            violations.push(Violation::LengthExceeded {
                section: primary.name().to_string(),
                words: primary_word_count,
                limit,
            });
        }
    }

    ValidationResult {
        match_kind,
        sections,
        violations,
        primary_word_count,
    }
}

fn numbered_item() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*\d+[.)]\s+\S").expect("numbered item pattern is valid"))
}

/// Validate a numbered-list response (at least one `1.` / `1)` item).
pub fn validate_numbered_list(raw_text: &str, word_limit: Option<usize>) -> ValidationResult {
    let text = raw_text.trim().to_string();
    let mut violations = Vec::new();

    if text.is_empty() {
        violations.push(Violation::EmptySection {
            section: SUBTASKS_SECTION.to_string(),
        });
    } else if !numbered_item().is_match(&text) {
        violations.push(Violation::NoNumberedItems);
    }

    let words = word_count(&text);
    if let Some(limit) = word_limit {
        if words > limit {
            violations.push(Violation::LengthExceeded {
                section: SUBTASKS_SECTION.to_string(),
                words,
                limit,
            });
        }
    }

    let match_kind = if violations.iter().any(|v| !v.is_length()) {
        MatchKind::Partial
    } else {
        MatchKind::Clean
    };

    ValidationResult {
        match_kind,
        sections: vec![Section {
            name: SUBTASKS_SECTION.to_string(),
            text,
        }],
        violations,
        primary_word_count: words,
    }
}

/// Validate a response against a participant's declared format.
pub fn validate_format(
    raw_text: &str,
    format: &ResponseFormat,
    word_limit: Option<usize>,
) -> ValidationResult {
    match format {
        ResponseFormat::NumberedList => validate_numbered_list(raw_text, word_limit),
        ResponseFormat::Sections { markers } => validate(raw_text, markers, word_limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor_markers() -> Vec<SectionMarker> {
        vec![SectionMarker::version(), SectionMarker::feedback()]
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_clean_two_section_response_passes() {
        let raw = "### Version ###\nThe revised text.\n\n### Feedback ###\nTightened wording.";
        let result = validate(raw, &editor_markers(), Some(250));
        assert!(result.passed(), "{}", result.describe());
        assert_eq!(result.match_kind, MatchKind::Clean);
        assert_eq!(result.section("Version"), Some("The revised text."));
        assert_eq!(result.section("Feedback"), Some("Tightened wording."));
        assert_eq!(result.primary_word_count, 3);
    }

    #[test]
    fn test_word_count_at_limit_passes_and_limit_plus_one_fails() {
        let at = format!("### Version ###\n{}\n### Feedback ###\nok", words(10));
        let result = validate(&at, &editor_markers(), Some(10));
        assert!(result.passed());

        let over = format!("### Version ###\n{}\n### Feedback ###\nok", words(11));
        let result = validate(&over, &editor_markers(), Some(10));
        assert!(!result.passed());
        assert_eq!(
            result.length_violation(),
            Some(&Violation::LengthExceeded {
                section: "Version".to_string(),
                words: 11,
                limit: 10
            })
        );
        assert!(!result.has_format_violations());
        assert_eq!(result.section("Version").unwrap(), words(11));
        assert_eq!(result.section("Feedback"), Some("ok"));
    }

    #[test]
    fn test_no_delimiter_is_inferred_not_clean() {
        let raw = "  Just an edited paragraph with no markers.  ";
        let result = validate(raw, &editor_markers(), None);
        assert_eq!(result.match_kind, MatchKind::Inferred);
        assert_eq!(
            result.section("Version"),
            Some("Just an edited paragraph with no markers.")
        );
        assert!(result
            .violations
            .contains(&Violation::FormatInferred {
                section: "Version".to_string()
            }));
        assert_eq!(result.primary(), Some("Just an edited paragraph with no markers."));
    }

    #[test]
    fn test_missing_marker_vs_empty_section() {
        let missing = validate("### Version ###\ntext only", &editor_markers(), None);
        assert_eq!(missing.match_kind, MatchKind::Partial);
        assert_eq!(
            missing.violations,
            vec![Violation::MissingMarker {
                section: "Feedback".to_string()
            }]
        );

        let empty = validate("### Version ###\n\n### Feedback ###\nnote", &editor_markers(), None);
        assert_eq!(empty.match_kind, MatchKind::Clean);
        assert_eq!(
            empty.violations,
            vec![Violation::EmptySection {
                section: "Version".to_string()
            }]
        );
        assert_eq!(empty.primary(), None);
    }

    #[test]
    fn test_known_marker_bounds_section_even_when_not_expected() {
        let raw = "### Final Version ###\nFinal text\n### Version ###\nstray\n### Feedback ###\nfb";
        let result = validate(
            raw,
            &[SectionMarker::final_version(), SectionMarker::feedback()],
            None,
        );
        assert_eq!(result.section("Final Version"), Some("Final text"));
        assert_eq!(result.section("Feedback"), Some("fb"));
    }

    #[test]
    fn test_out_of_order_and_duplicate_markers_are_reported() {
        let raw = "### Feedback ###\nfb\n### Version ###\ntext\n### Version ###\nagain";
        let result = validate(raw, &editor_markers(), None);
        assert!(result.violations.contains(&Violation::OutOfOrder {
            section: "Feedback".to_string()
        }));
        assert!(result.violations.contains(&Violation::DuplicateMarker {
            section: "Version".to_string(),
            occurrences: 2
        }));
        assert_eq!(result.section("Version"), Some("text"));
    }

    #[test]
    fn test_numbered_list() {
        let ok = validate_numbered_list("Subtasks:\n1. Fix tone\n2) Tighten intro", None);
        assert!(ok.passed());
        assert_eq!(numbered_item().find_iter("1. a\n2) b\nnot 3 item").count(), 2);

        let bad = validate_numbered_list("- fix tone\n- tighten", None);
        assert_eq!(bad.violations, vec![Violation::NoNumberedItems]);

        let blank = validate_numbered_list("   ", None);
        assert_eq!(
            blank.violations,
            vec![Violation::EmptySection {
                section: SUBTASKS_SECTION.to_string()
            }]
        );
    }

    #[test]
    fn test_marker_token_is_bit_exact() {
        assert_eq!(SectionMarker::final_version().token(), "### Final Version ###");
        assert_eq!(SectionMarker::version().to_string(), "### Version ###");
    }
}
