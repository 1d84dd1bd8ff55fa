//! End-to-end pipeline runs against scripted completions.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redline_core::fakes::{MemoryTranscript, ScriptedCompletion};
use redline_core::{
    CompletionError, Document, ErrorKind, FileTranscript, PipelineController, PipelineState,
    RedlineConfig, Requirements, RunReport, SpeakerRole, StagePlan, Transcript,
};

const SPEAKERS: [&str; 4] = [
    "Task_Decomposer",
    "Editor_Conservative",
    "Editor_Creative",
    "Integrator",
];

fn article(words: usize) -> String {
    (0..words)
        .map(|i| format!("word{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn final_text() -> String {
    (0..70)
        .map(|i| format!("formal{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn scripted(integrator_reply: &str) -> ScriptedCompletion {
    ScriptedCompletion::new()
        .reply(
            "Task_Decomposer",
            "1. Replace informal words\n2. Tighten sentences",
        )
        .reply(
            "Editor_Conservative",
            "### Version ###\nConservative draft.\n\n### Feedback ###\nGrammar fixed.",
        )
        .reply(
            "Editor_Creative",
            "### Version ###\nCreative draft.\n\n### Feedback ###\nFlow improved.",
        )
        .reply("Integrator", integrator_reply)
}

fn controller(
    backend: Arc<ScriptedCompletion>,
    transcript: Arc<dyn Transcript>,
    output: &Path,
) -> PipelineController {
    let plan = StagePlan::from_config(&RedlineConfig::default()).unwrap();
    PipelineController::new(plan, backend, transcript, output)
}

async fn run(ctl: &PipelineController) -> RunReport {
    ctl.run(
        Document::new(article(80)),
        Requirements::new(["make formal"]),
    )
    .await
}

/// Speakers of the transcript entries, in file order.
fn entry_speakers(contents: &str) -> Vec<&str> {
    contents
        .lines()
        .filter_map(|line| line.split_once(": ").map(|(speaker, _)| speaker))
        .filter(|speaker| SPEAKERS.contains(speaker) || *speaker == "Admin")
        .collect()
}

#[tokio::test]
async fn test_formal_rewrite_completes() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("Final.txt");
    let transcript = Arc::new(FileTranscript::create(&dir.path().join("log"), Utc::now()).unwrap());
    let expected = final_text();
    let backend = Arc::new(scripted(&format!(
        "### Final Version ###\n{expected}\n\n### Feedback ###\nCombined tone and flow."
    )));

    let report = run(&controller(backend, transcript.clone(), &output)).await;

    assert!(report.is_done(), "{:?}", report.outcome);
    assert_eq!(std::fs::read_to_string(&output).unwrap(), expected);
    let artifacts = report.artifacts().unwrap();
    assert_eq!(artifacts.words_before, 80);
    assert_eq!(artifacts.words_after, 70);
    assert_eq!(report.transcript_path.as_deref(), Some(transcript.path()));

    let contents = std::fs::read_to_string(transcript.path()).unwrap();
    assert_eq!(entry_speakers(&contents), SPEAKERS.to_vec());
    assert!(!contents.contains("Admin: "));
    assert!(contents.ends_with("Combined tone and flow.\n\n"));
}

#[tokio::test]
async fn test_missing_final_marker_fails_without_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("Final.txt");
    let transcript = Arc::new(FileTranscript::create(&dir.path().join("log"), Utc::now()).unwrap());
    let backend = Arc::new(scripted(
        "Here is the merged article, nicely formal.\n\n### Feedback ###\nDone.",
    ));

    let report = run(&controller(backend, transcript.clone(), &output)).await;

    let failure = report.failure().unwrap();
    assert_eq!(failure.state, PipelineState::Extract);
    assert_eq!(failure.kind, ErrorKind::FormatViolation);
    assert!(failure.reason.starts_with("invalid final format"));
    assert!(failure.reason.contains("missing"));
    assert!(!output.exists());
    assert_eq!(failure.transcript_path.as_deref(), Some(transcript.path()));

    let contents = std::fs::read_to_string(transcript.path()).unwrap();
    assert_eq!(entry_speakers(&contents), SPEAKERS.to_vec());
    assert_eq!(report.visited.last(), Some(&PipelineState::Failed));
}

#[tokio::test(start_paused = true)]
async fn test_editor_outage_cancels_sibling_and_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("Final.txt");
    let transcript = Arc::new(MemoryTranscript::new());
    let backend = Arc::new(
        ScriptedCompletion::new()
            .reply("Task_Decomposer", "1. Formal tone")
            .reply(
                "Editor_Conservative",
                "### Version ###\nslow\n\n### Feedback ###\nslow",
            )
            .delay("Editor_Conservative", Duration::from_secs(30))
            .fail(
                "Editor_Creative",
                CompletionError::Transient("connection reset".into()),
            ),
    );

    let report = run(&controller(backend.clone(), transcript.clone(), &output)).await;

    let failure = report.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::CompletionError);
    assert_eq!(failure.state, PipelineState::FanOutEdit);
    assert!(failure.reason.contains("Editor_Creative"));
    assert_eq!(backend.aborted(), vec!["Editor_Conservative".to_string()]);
    assert_eq!(report.history.count_role(SpeakerRole::Editor), 0);
    assert_eq!(transcript.speakers(), vec!["Task_Decomposer"]);
    assert!(!output.exists());
}

#[tokio::test(start_paused = true)]
async fn test_append_order_ignores_completion_order() {
    let rounds = [true, true, false, false];
    for creative_first in rounds {
        let dir = tempfile::tempdir().unwrap();
        let transcript = Arc::new(MemoryTranscript::new());
        let slow = if creative_first {
            "Editor_Conservative"
        } else {
            "Editor_Creative"
        };
        let backend = Arc::new(
            scripted("### Final Version ###\nDone text.\n\n### Feedback ###\nok")
                .delay(slow, Duration::from_millis(250)),
        );

        let report = run(&controller(
            backend.clone(),
            transcript.clone(),
            &dir.path().join("Final.txt"),
        ))
        .await;

        assert!(report.is_done());
        assert_eq!(transcript.speakers(), SPEAKERS.to_vec());
        let editors: Vec<&str> = report
            .history
            .messages()
            .iter()
            .filter(|m| m.role == SpeakerRole::Editor)
            .map(|m| m.speaker.as_str())
            .collect();
        assert_eq!(editors, vec!["Editor_Conservative", "Editor_Creative"]);
        assert_eq!(backend.completion_order()[2], slow);
    }
}

#[tokio::test]
async fn test_transcript_failure_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("Final.txt");
    let backend = Arc::new(scripted(
        "### Final Version ###\nStill written.\n\n### Feedback ###\nok",
    ));

    let report = run(&controller(
        backend,
        Arc::new(MemoryTranscript::failing()),
        &output,
    ))
    .await;

    assert!(report.is_done());
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "Still written.");
    assert_eq!(report.warnings.len(), 4);
    assert!(report
        .warnings
        .iter()
        .all(|w| w.starts_with("transcript write failed")));
}

#[tokio::test]
async fn test_overlong_final_version_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("Final.txt");
    let long = article(201);
    let backend = Arc::new(scripted(&format!(
        "### Final Version ###\n{long}\n\n### Feedback ###\ntoo long"
    )));

    let report = run(&controller(
        backend,
        Arc::new(MemoryTranscript::new()),
        &output,
    ))
    .await;

    assert!(report.is_done());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("201 words (limit 200)"));
    assert_eq!(std::fs::read_to_string(&output).unwrap(), long);
}
