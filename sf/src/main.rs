//! StoryForge - requirements to backlog
//!
//! CLI entry point for running the story pipeline and reviewing pull requests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, bail, eyre};
use tracing::{info, warn};

use storyforge::cli::{Cli, Command, OutputFormat, get_log_path};
use storyforge::config::Config;
use storyforge::domain::{Phase, ProjectContext, RequirementsBundle};
use storyforge::llm::{StructuredCaller, create_client};
use storyforge::persistence::{JsonFileSink, create_sink};
use storyforge::prompts::PromptLoader;
use storyforge::review::{CodeReviewer, PullRequestEvent, extract_task_id, render_comment};
use storyforge::workflow::{CancelToken, EngineConfig, RunReport, StorageOutcome, WorkflowEngine};

fn setup_logging(level: &str) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Write to the log file, keeping stdout for command output
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;
    let filter = tracing_subscriber::EnvFilter::try_new(level.to_lowercase())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // CLI flag > config file > INFO
    let level = cli
        .log_level
        .clone()
        .or_else(|| Config::load_log_level(cli.config.as_ref()))
        .unwrap_or_else(|| "INFO".to_string());
    setup_logging(&level).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(
        "StoryForge loaded config: provider={}, model={}",
        config.llm.provider, config.llm.model
    );

    match cli.command {
        Command::Generate {
            text,
            file,
            docs,
            context,
            max_iterations,
            output,
            format,
        } => {
            let requirements = load_requirements(text, file.as_deref(), &docs)?;
            let project_context = build_context(context);
            cmd_generate(config, requirements, project_context, max_iterations, output, format).await
        }
        Command::Review { event, backlog, diff } => cmd_review(&config, &event, &backlog, &diff).await,
        Command::TaskId { title, branch } => cmd_task_id(&title, &branch),
        Command::Config => cmd_config(&config),
    }
}

fn load_requirements(text: Option<String>, file: Option<&Path>, docs: &[PathBuf]) -> Result<RequirementsBundle> {
    let primary = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => {
            fs::read_to_string(path).context(format!("Failed to read requirements from {}", path.display()))?
        }
        (None, None) => String::new(),
    };

    let mut bundle = RequirementsBundle::new(primary);
    for path in docs {
        let content =
            fs::read_to_string(path).context(format!("Failed to read document {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        bundle = bundle.with_document(filename, content);
    }

    if bundle.is_empty() {
        bail!("No requirements given. Use --text, --file or --doc.");
    }
    Ok(bundle)
}

/// Values that parse as JSON keep their type; anything else is a string
fn build_context(entries: Vec<(String, String)>) -> ProjectContext {
    entries
        .into_iter()
        .map(|(key, raw)| {
            let value = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
            (key, value)
        })
        .collect()
}

async fn cmd_generate(
    mut config: Config,
    requirements: RequirementsBundle,
    project_context: ProjectContext,
    max_iterations: Option<u32>,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    if let Some(max) = max_iterations {
        config.workflow.max_iterations = max;
    }
    config.validate()?;

    let client = create_client(&config.llm)?;
    let prompts = Arc::new(PromptLoader::new(config.prompts.dir.clone()));
    let mut engine = WorkflowEngine::new(client, EngineConfig::from(&config)).with_prompts(prompts);
    if let Some(sink) = create_sink(&config.storage) {
        engine = engine.with_sink(sink);
    }

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current stage");
            on_interrupt.cancel();
        }
    });

    if format == OutputFormat::Text {
        println!("{}", "Generating user stories...".bright_cyan().bold());
    }
    let report = engine.run_with_cancel(requirements, project_context, &cancel).await;

    if let Some(path) = &output {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json).context(format!("Failed to write report to {}", path.display()))?;
        info!("Wrote report to {}", path.display());
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }

    if !report.success {
        return Err(eyre!(
            "Workflow {}: {}",
            report.phase,
            report.error.as_deref().unwrap_or("unknown error")
        ));
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let phase = match report.phase {
        Phase::Complete => report.phase.to_string().green().bold(),
        Phase::Escalated => report.phase.to_string().yellow().bold(),
        _ => report.phase.to_string().red().bold(),
    };
    println!();
    println!("{} {}", "Result:".bold(), phase);
    println!(
        "Iterations: {}  Scores: {}",
        report.iterations,
        report
            .score_history
            .iter()
            .map(|s| format!("{:.1}", s))
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    if let (Some(score), Some(status)) = (report.validation_score, report.validation_status) {
        println!("Final validation: {:.1} ({})", score, status);
    }
    if let Some(escalation) = &report.escalation {
        println!("{} {}", "Needs human review:".yellow(), escalation.message);
    }
    if let Some(error) = &report.error {
        println!("{} {}", "Error:".red(), error);
    }

    if !report.stories.is_empty() {
        println!();
        println!("{}", "User stories".bright_cyan().bold());
        for story in &report.stories {
            println!(
                "  {} {} {}",
                story.id.yellow(),
                story.title,
                format!("[{}, {} pts]", story.priority, story.estimated_points).dimmed()
            );
        }
    }

    if !report.tasks.is_empty() {
        println!();
        println!("{}", "Tasks".bright_cyan().bold());
        for task in &report.tasks {
            let deps = if task.dependencies.is_empty() {
                String::new()
            } else {
                format!(" after {}", task.dependencies.join(", "))
            };
            println!(
                "  {} {} {}",
                task.id.yellow(),
                task.title,
                format!("[{} {}, {}h{}]", task.story_id, task.category, task.estimated_hours, deps).dimmed()
            );
        }
    }

    match &report.storage {
        StorageOutcome::Stored { project_id } => println!("\nStored as project {}", project_id.green()),
        StorageOutcome::Failed { error } => println!("\n{} {}", "Storage failed:".red(), error),
        StorageOutcome::Skipped => {}
    }
}

async fn cmd_review(config: &Config, event: &Path, backlog: &Path, diff: &Path) -> Result<()> {
    let payload = fs::read_to_string(event).context(format!("Failed to read event {}", event.display()))?;
    let event = PullRequestEvent::from_json(&payload).context("Failed to parse pull_request event")?;
    if !event.wants_review() {
        println!("Pull request #{} action '{}' needs no review", event.number, event.action);
        return Ok(());
    }

    let task_id = event
        .task_id()
        .ok_or_else(|| eyre!("No task id found in PR title or branch '{}'", event.branch()))?;
    let project = JsonFileSink::load(backlog)
        .await
        .context(format!("Failed to load backlog {}", backlog.display()))?;
    let task = project
        .task(&task_id)
        .ok_or_else(|| eyre!("Task {} not found in project {}", task_id, project.metadata.name))?;
    let story = project.story(&task.story_id);
    let diff = fs::read_to_string(diff).context(format!("Failed to read diff {}", diff.display()))?;

    config.validate()?;
    let client = create_client(&config.llm)?;
    let caller = StructuredCaller::new(client, std::time::Duration::from_millis(config.llm.timeout_ms));
    let reviewer = CodeReviewer::new(
        caller,
        Arc::new(PromptLoader::new(config.prompts.dir.clone())),
        config.llm.max_tokens,
    );

    info!(task_id = %task_id, pr = event.number, repo = %event.repository.full_name, "Reviewing pull request");
    let report = reviewer.review(task, story, &diff).await;
    println!("{}", render_comment(&report, &task_id));
    Ok(())
}

fn cmd_task_id(title: &str, branch: &str) -> Result<()> {
    match extract_task_id(title, branch) {
        Some(id) => {
            println!("{}", id);
            Ok(())
        }
        None => bail!("No task id found"),
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    println!("{}", serde_yaml::to_string(config)?);
    Ok(())
}
