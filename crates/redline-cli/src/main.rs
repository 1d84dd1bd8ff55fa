//! Redline - multi-editor document revision
//!
//! ## Commands
//!
//! - `run`: revise a document through the decompose / edit / integrate pipeline
//! - `validate`: check a saved response against a participant's contract
//! - `extract`: print the final version from a saved integrator response

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use redline_core::{
    extract_final_version, validate_format, DiscardTranscript, Extraction, FileTranscript,
    ParticipantProfile, PipelineController, RedlineConfig, RunOutcome, RunReport, Transcript,
};
use redline_llm::{load_config_list, select_endpoint, Endpoint, OpenAiCompatClient};

#[derive(Parser)]
#[command(name = "redline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Revise a document with a decomposer, two editors and an integrator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the revision pipeline on a document
    Run(RunArgs),

    /// Check a response file against a participant's response contract
    Validate {
        /// Which participant's contract to apply
        #[arg(long, value_enum)]
        role: ContractRole,

        /// File holding the raw response
        file: PathBuf,

        /// Word ceiling for the primary section (default: the role's configured limit)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the Final Version section of an integrator response
    Extract {
        /// File holding the raw integrator response
        file: PathBuf,
    },
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// TOML config file
    #[arg(short, long, env = "REDLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Document to revise
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Requirements file, one requirement per line
    #[arg(short, long)]
    requirements: Option<PathBuf>,

    /// Inline requirement (repeatable)
    #[arg(long = "require")]
    require: Vec<String>,

    /// Where to write the final version
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for conversation transcripts
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Endpoint list in OAI_CONFIG_LIST format
    #[arg(long, default_value = "OAI_CONFIG_LIST.json")]
    llm_config: PathBuf,

    /// Model to select from the endpoint list
    #[arg(long)]
    model: Option<String>,

    /// Word ceiling for the final version
    #[arg(long)]
    max_length: Option<usize>,

    /// Attempts per completion call (1 disables retrying)
    #[arg(long)]
    retries: Option<u32>,

    /// Fail when the decomposer does not answer with a numbered list
    #[arg(long)]
    strict_decomposition: bool,

    /// Print the run outcome as JSON on stdout
    #[arg(long)]
    report_json: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ContractRole {
    Decomposer,
    Editor,
    Integrator,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    redline_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Validate { role, file, limit } => cmd_validate(role, &file, limit),
        Commands::Extract { file } => cmd_extract(&file),
    }
}

/// Config file, then `REDLINE_*` variables (read through `env`), then flags.
fn resolve_config<F>(args: &RunArgs, env: F) -> Result<RedlineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let base = match &args.config {
        Some(path) => RedlineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RedlineConfig::default(),
    };
    let mut config = base
        .with_overrides_from(env)
        .context("Invalid REDLINE_* environment override")?;

    if let Some(input) = &args.input {
        config.input_path = input.clone();
    }
    if let Some(path) = &args.requirements {
        config.requirements_path = Some(path.clone());
    }
    if !args.require.is_empty() {
        config.requirements = args.require.clone();
        if args.requirements.is_none() {
            config.requirements_path = None;
        }
    }
    if let Some(output) = &args.output {
        config.output_path = output.clone();
    }
    if let Some(dir) = &args.log_dir {
        config.log_dir = dir.clone();
    }
    if let Some(max) = args.max_length {
        config.max_length = max;
    }
    if let Some(attempts) = args.retries {
        config.retry.max_attempts = attempts;
    }
    if args.strict_decomposition {
        config.strict_decomposition = true;
    }
    config.validate()?;
    Ok(config)
}

fn resolve_endpoint(args: &RunArgs) -> Result<Endpoint> {
    if args.llm_config.exists() {
        let list = load_config_list(&args.llm_config)?;
        let endpoint = select_endpoint(list, args.model.as_deref())?;
        return Ok(endpoint.with_env_key_fallback());
    }
    info!(
        path = %args.llm_config.display(),
        "endpoint list not found, using OPENAI_* environment"
    );
    let mut endpoint = Endpoint::from_env();
    if let Some(model) = &args.model {
        endpoint.model = model.clone();
    }
    Ok(endpoint)
}

/// File transcript under `log_dir`, or one that keeps nothing when the
/// folder cannot be used. A logging problem never stops a run.
fn open_transcript(log_dir: &Path) -> Arc<dyn Transcript> {
    match FileTranscript::create(log_dir, Utc::now()) {
        Ok(transcript) => Arc::new(transcript),
        Err(e) => {
            warn!(
                log_dir = %log_dir.display(),
                error = %e,
                "transcript unavailable, continuing without one"
            );
            Arc::new(DiscardTranscript)
        }
    }
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args, |key| std::env::var(key).ok())?;
    run_pipeline(&args, &config).await
}

async fn run_pipeline(args: &RunArgs, config: &RedlineConfig) -> Result<()> {
    let requirements = config
        .load_requirements()
        .context("No usable editing requirements")?;
    let endpoint = resolve_endpoint(args)?;
    info!(model = %endpoint.model, base_url = %endpoint.base_url, "using completion endpoint");
    let backend = Arc::new(OpenAiCompatClient::new(endpoint)?);

    let transcript = open_transcript(&config.log_dir);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    let controller =
        PipelineController::from_config(config, backend, transcript)?.with_cancellation(cancel);
    let report = controller
        .run_from_file(&config.input_path, requirements)
        .await;

    if args.report_json {
        println!("{}", serde_json::to_string_pretty(&report.outcome)?);
    } else {
        print_summary(&report);
    }

    match &report.outcome {
        RunOutcome::Done(_) => Ok(()),
        RunOutcome::Failed(failure) => bail!("{} ({})", failure.reason, failure.kind),
    }
}

fn print_summary(report: &RunReport) {
    match &report.outcome {
        RunOutcome::Done(artifacts) => {
            println!("Final version written to {}", artifacts.output_path.display());
            println!(
                "  words: {} -> {}",
                artifacts.words_before, artifacts.words_after
            );
        }
        RunOutcome::Failed(failure) => {
            println!("Run failed in {}: {}", failure.state, failure.reason);
        }
    }
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    if let Some(path) = &report.transcript_path {
        println!("  transcript: {}", path.display());
    }
}

fn contract_profile(role: ContractRole, config: &RedlineConfig) -> ParticipantProfile {
    let t = &config.temperatures;
    match role {
        ContractRole::Decomposer => ParticipantProfile::task_decomposer(t.decomposer),
        ContractRole::Editor => {
            ParticipantProfile::conservative_editor(t.conservative, config.editor_word_limit)
        }
        ContractRole::Integrator => ParticipantProfile::integrator(t.integrator, config.max_length),
    }
}

fn cmd_validate(role: ContractRole, file: &Path, limit: Option<usize>) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let profile = contract_profile(role, &RedlineConfig::default());
    let result = validate_format(&raw, &profile.format, limit.or(profile.word_limit));

    println!(
        "{:?}: {} words in primary section",
        result.match_kind, result.primary_word_count
    );
    for violation in &result.violations {
        println!("  {violation}");
    }
    if result.has_format_violations() {
        bail!("{} does not satisfy the {:?} contract", file.display(), role);
    }
    Ok(())
}

fn cmd_extract(file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    match extract_final_version(&raw) {
        Extraction::Found(text) => {
            println!("{text}");
            Ok(())
        }
        Extraction::Empty => bail!("Final Version section in {} is empty", file.display()),
        Extraction::MarkerAbsent => bail!("{} has no ### Final Version ### marker", file.display()),
    }
}
