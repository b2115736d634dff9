use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use failure_issue::render::DEFAULT_ARTIFACT_NAME;
use failure_issue::{
    build_issue_body, IssueError, IssueInputs, MissingKeyPolicy, RunMetadata, SummaryCounts,
    TranslationConfig, Translator,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a JUnit XML report into step outputs
    Parse(ParseArgs),
    /// Render an issue body from the outputs of `parse`
    Render(RenderArgs),
    /// Parse a JUnit XML report and render the issue body in one step
    Issue(IssueArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// `key=value` lines and delimited sections
    Text,
    /// The parsed report as JSON
    Json,
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// Path to the JUnit XML file
    #[arg(long)]
    junit_file: PathBuf,

    /// Step output file to append to (usually $GITHUB_OUTPUT)
    #[arg(long)]
    github_output: Option<PathBuf>,

    /// Output format when no step output file is given
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

// Identifies the CI run; each flag falls back to the runner environment.
#[derive(Args, Debug)]
struct MetadataArgs {
    #[arg(long, env = "GITHUB_WORKFLOW", default_value = "")]
    workflow: String,

    #[arg(long, env = "GITHUB_JOB", default_value = "")]
    job: String,

    #[arg(long, env = "GITHUB_RUN_ID", default_value = "")]
    run_id: String,

    #[arg(long, env = "GITHUB_RUN_ATTEMPT", default_value = "")]
    run_attempt: String,

    /// Git ref of the run
    #[arg(long = "ref", env = "GITHUB_REF", default_value = "")]
    git_ref: String,

    /// Commit SHA of the run
    #[arg(long, env = "GITHUB_SHA", default_value = "")]
    commit: String,

    #[arg(long, env = "GITHUB_SERVER_URL", default_value = "https://github.com")]
    server_url: String,

    /// `owner/name` of the repository
    #[arg(long, env = "GITHUB_REPOSITORY", default_value = "")]
    repository: String,

    /// Artifact holding the full logs, named in the footer
    #[arg(long, default_value = DEFAULT_ARTIFACT_NAME)]
    artifact_name: String,
}

impl From<MetadataArgs> for RunMetadata {
    fn from(args: MetadataArgs) -> Self {
        Self {
            workflow: args.workflow,
            job: args.job,
            run_id: args.run_id,
            run_attempt: args.run_attempt,
            git_ref: args.git_ref,
            commit: args.commit,
            server_url: args.server_url,
            repository: args.repository,
            artifact_name: args.artifact_name,
        }
    }
}

#[derive(Args, Debug)]
struct TranslationArgs {
    /// Behaviour when GEMINI_API_KEY is not set
    #[arg(long, value_enum, default_value_t = MissingKeyPolicy::Fail)]
    on_missing_key: MissingKeyPolicy,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Status line shown at the top of the summary
    #[arg(long, visible_alias = "status-ja")]
    status: String,

    #[arg(long)]
    total_tests: String,

    #[arg(long)]
    passed: String,

    #[arg(long)]
    failed: String,

    #[arg(long)]
    timed_out: String,

    /// File containing the formatted failed test list
    #[arg(long)]
    failed_tests_list_file: PathBuf,

    /// File containing the detailed error messages
    #[arg(long)]
    error_details_file: PathBuf,

    #[command(flatten)]
    metadata: MetadataArgs,

    #[command(flatten)]
    translation: TranslationArgs,
}

#[derive(Args, Debug)]
struct IssueArgs {
    /// Path to the JUnit XML file
    #[arg(long)]
    junit_file: PathBuf,

    /// Status line shown at the top of the summary
    #[arg(long, visible_alias = "status-ja")]
    status: String,

    #[command(flatten)]
    metadata: MetadataArgs,

    #[command(flatten)]
    translation: TranslationArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // stdout carries the issue body / step outputs; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    match cli.command {
        Command::Parse(args) => run_parse(args),
        Command::Render(args) => run_render(args, cancel).await,
        Command::Issue(args) => run_issue(args, cancel).await,
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Interrupted; cancelling pending requests");
        cancel.cancel();
    }
}

fn run_parse(args: ParseArgs) -> Result<()> {
    let report = junit_report::parse_file(&args.junit_file)?;
    info!(
        file = %args.junit_file.display(),
        total = report.statistics.total,
        failed = report.statistics.failed,
        timed_out = report.statistics.timed_out,
        "Parsed JUnit report"
    );

    if let Some(output) = args.github_output {
        let files = junit_report::write_github_output(&output, &report)?;
        info!(
            list = %files.failed_tests_list.display(),
            details = %files.error_details.display(),
            "Step outputs written"
        );
        return Ok(());
    }

    match args.format {
        OutputFormat::Text => print!("{}", junit_report::render_stdout_report(&report)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        ),
    }
    Ok(())
}

async fn run_render(args: RenderArgs, cancel: CancellationToken) -> Result<()> {
    let inputs = IssueInputs {
        status: args.status,
        counts: SummaryCounts {
            total: args.total_tests,
            passed: args.passed,
            failed: args.failed,
            timed_out: args.timed_out,
        },
        failed_tests_list: read_input("failed tests list", &args.failed_tests_list_file)?,
        error_details: read_input("error details", &args.error_details_file)?,
        metadata: args.metadata.into(),
    };
    emit_issue_body(&inputs, args.translation, cancel).await
}

async fn run_issue(args: IssueArgs, cancel: CancellationToken) -> Result<()> {
    let report = junit_report::parse_file(&args.junit_file)?;
    let inputs = IssueInputs::from_report(args.status, &report, args.metadata.into());
    emit_issue_body(&inputs, args.translation, cancel).await
}

async fn emit_issue_body(
    inputs: &IssueInputs,
    translation: TranslationArgs,
    cancel: CancellationToken,
) -> Result<()> {
    let config = TranslationConfig::from_env().with_missing_key(translation.on_missing_key);
    let translator =
        Translator::from_config(&config, cancel).context("Failed to set up translation")?;
    let document = build_issue_body(inputs, &translator).await?;
    info!(
        translated = document.has_translation(),
        "Issue body generated"
    );
    println!("{document}");
    Ok(())
}

fn read_input(description: &'static str, path: &Path) -> Result<String, IssueError> {
    std::fs::read_to_string(path).map_err(|source| IssueError::input_file(description, path, source))
}
