//! Participant profiles: the fixed instruction and contract attached to each role.

use serde::{Deserialize, Serialize};

use super::document::Requirements;
use super::message::SpeakerRole;
use crate::contract::SectionMarker;

/// Sampling parameters forwarded to the completion capability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Randomness; lower is more deterministic.
    pub temperature: f32,
}

impl SamplingParams {
    pub fn with_temperature(temperature: f32) -> Self {
        Self { temperature }
    }
}

/// The response shape a participant is expected to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// At least one numbered item (`1.` or `1)`).
    NumberedList,
    /// Delimited sections in the given order; the first is the primary section.
    Sections { markers: Vec<SectionMarker> },
}

impl ResponseFormat {
    pub fn sections(markers: impl IntoIterator<Item = SectionMarker>) -> Self {
        ResponseFormat::Sections {
            markers: markers.into_iter().collect(),
        }
    }

    /// The primary section marker, if the format is sectioned.
    pub fn primary(&self) -> Option<&SectionMarker> {
        match self {
            ResponseFormat::NumberedList => None,
            ResponseFormat::Sections { markers } => markers.first(),
        }
    }
}

/// Immutable description of one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub name: String,
    pub role: SpeakerRole,
    /// Instruction template; `{requirements}` and `{word_limit}` are substituted
    /// when the participant is built.
    pub instructions: String,
    pub sampling: SamplingParams,
    pub format: ResponseFormat,
    pub word_limit: Option<usize>,
}

impl ParticipantProfile {
    /// Render the instruction template for a run.
    pub fn render_instructions(&self, requirements: &Requirements) -> String {
        let limit = self
            .word_limit
            .map(|l| l.to_string())
            .unwrap_or_else(|| "no".to_string());
        self.instructions
            .replace("{requirements}", &requirements.render())
            .replace("{word_limit}", &limit)
    }

    pub fn task_decomposer(temperature: f32) -> Self {
        Self {
            name: "Task_Decomposer".to_string(),
            role: SpeakerRole::Decomposer,
            instructions: DECOMPOSER_INSTRUCTIONS.to_string(),
            sampling: SamplingParams::with_temperature(temperature),
            format: ResponseFormat::NumberedList,
            word_limit: None,
        }
    }

    pub fn conservative_editor(temperature: f32, word_limit: usize) -> Self {
        Self {
            name: "Editor_Conservative".to_string(),
            role: SpeakerRole::Editor,
            instructions: CONSERVATIVE_INSTRUCTIONS.to_string(),
            sampling: SamplingParams::with_temperature(temperature),
            format: ResponseFormat::sections([SectionMarker::version(), SectionMarker::feedback()]),
            word_limit: Some(word_limit),
        }
    }

    pub fn creative_editor(temperature: f32, word_limit: usize) -> Self {
        Self {
            name: "Editor_Creative".to_string(),
            role: SpeakerRole::Editor,
            instructions: CREATIVE_INSTRUCTIONS.to_string(),
            sampling: SamplingParams::with_temperature(temperature),
            format: ResponseFormat::sections([SectionMarker::version(), SectionMarker::feedback()]),
            word_limit: Some(word_limit),
        }
    }

    pub fn integrator(temperature: f32, word_limit: usize) -> Self {
        Self {
            name: "Integrator".to_string(),
            role: SpeakerRole::Integrator,
            instructions: INTEGRATOR_INSTRUCTIONS.to_string(),
            sampling: SamplingParams::with_temperature(temperature),
            format: ResponseFormat::sections([
                SectionMarker::final_version(),
                SectionMarker::feedback(),
            ]),
            word_limit: Some(word_limit),
        }
    }
}

const DECOMPOSER_INSTRUCTIONS: &str = "\
You decompose editing work. Read the article and these requirements:
{requirements}

Identify the problems the article has with respect to the requirements and
break the revision into concrete subtasks for the editing team. Do not revise
the text yourself. Reply with the subtasks as a numbered list.";

const CONSERVATIVE_INSTRUCTIONS: &str = "\
You are a conservative editor. Focus on grammar accuracy, precise word choice,
formal tone and consistency. Apply the subtasks from the decomposer.

Return the complete edited text (at most {word_limit} words, native English)
and brief feedback of under 50 words, using exactly this format:
### Version ###
[full edited text]

### Feedback ###
[comments]";

const CREATIVE_INSTRUCTIONS: &str = "\
You are a creative editor. Focus on flow, readability, clarity of argument,
structure and engagement. Apply the subtasks from the decomposer.

Return the complete edited text (at most {word_limit} words, native English)
and brief feedback of under 50 words, using exactly this format:
### Version ###
[full edited text]

### Feedback ###
[comments]";

const INTEGRATOR_INSTRUCTIONS: &str = "\
You are the final integrator. Evaluate both editors' versions, incorporate the
best changes according to these requirements:
{requirements}

Produce the final version in at most {word_limit} words, using exactly this format:
### Final Version ###
[text]

### Feedback ###
[comments]";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_requirements_and_limit() {
        let profile = ParticipantProfile::integrator(0.5, 200);
        let rendered = profile.render_instructions(&Requirements::new(["make formal"]));
        assert!(rendered.contains("- make formal"));
        assert!(rendered.contains("at most 200 words"));
        assert!(!rendered.contains("{requirements}"));
        assert!(rendered.contains("### Final Version ###"));
    }

    #[test]
    fn test_editor_profiles_differ_only_in_bias_and_instructions() {
        let a = ParticipantProfile::conservative_editor(0.3, 250);
        let b = ParticipantProfile::creative_editor(0.7, 250);
        assert_eq!(a.format, b.format);
        assert_eq!(a.word_limit, b.word_limit);
        assert!(a.sampling.temperature < b.sampling.temperature);
        assert_ne!(a.name, b.name);
    }

    #[test]
    fn test_primary_marker() {
        let p = ParticipantProfile::integrator(0.5, 200);
        assert_eq!(p.format.primary(), Some(&SectionMarker::final_version()));
        assert_eq!(ResponseFormat::NumberedList.primary(), None);
    }
}
