//! triage - run the external agent over an issue backlog and build the report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use triage_agent::{AgentExecutor, PermissionMode};
use triage_core::{BacklogItem, IssueNumber, SortOrder};
use triage_pipeline::brief::{reset_prompts_dir, write_brief};
use triage_pipeline::{
    aggregate, load_template, select, write_report, AgentRunner, BacklogSource, GhCliBacklog,
    JsonFileBacklog, Orchestrator, PipelineError, ProgressReporter, TriageConfig,
};

/// Issue triage pipeline
#[derive(Parser)]
#[command(name = "triage")]
#[command(about = "Triage an issue backlog with an external agent", long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent over every untriaged item
    Run {
        #[command(flatten)]
        backlog: BacklogArgs,

        #[command(flatten)]
        agent: AgentArgs,
    },

    /// Rebuild the report from cached results
    Aggregate {
        /// Restrict the report to the items in this export and list the
        /// missing ones as untriaged
        #[arg(long)]
        issues_file: Option<PathBuf>,
    },

    /// Run, then aggregate
    Triage {
        #[command(flatten)]
        backlog: BacklogArgs,

        #[command(flatten)]
        agent: AgentArgs,
    },

    /// Render task briefs without starting the agent
    Prompts {
        #[command(flatten)]
        backlog: BacklogArgs,

        /// Brief template (defaults to the built-in one)
        #[arg(long)]
        template: Option<PathBuf>,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Project root the agent works in
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Results directory (default: <root>/triage-results)
    #[arg(long, global = true)]
    results_dir: Option<PathBuf>,

    /// Prompts directory (default: <root>/triage-prompts)
    #[arg(long, global = true)]
    prompts_dir: Option<PathBuf>,

    /// Report path (default: <root>/triage-report.json)
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Repository in owner/name form
    #[arg(long, global = true, default_value = "microsoft/typespec")]
    repo: String,

    /// Model identifier passed to the agent
    #[arg(long, global = true, default_value = "claude-sonnet-4")]
    model: String,

    /// Report order by issue number (asc or desc)
    #[arg(long, global = true, default_value = "desc")]
    sort: SortOrder,

    /// Playground base URL for share links
    #[arg(long, global = true, default_value = "https://typespec.io/playground")]
    playground_url: String,

    /// Label prefix marking an area label (repeatable)
    #[arg(long = "area-prefix", global = true)]
    area_prefixes: Vec<String>,
}

#[derive(Args)]
struct BacklogArgs {
    /// Read issues from a JSON export instead of the GitHub CLI
    #[arg(long)]
    issues_file: Option<PathBuf>,

    /// Only triage these issue numbers (repeatable)
    #[arg(long = "issue")]
    issues: Vec<u64>,

    /// Skip issues carrying this label (repeatable)
    #[arg(long = "exclude-label")]
    exclude_labels: Vec<String>,

    /// Maximum number of open issues to list
    #[arg(long, default_value = "500")]
    limit: usize,

    /// GitHub CLI executable
    #[arg(long, default_value = "gh")]
    gh: String,
}

#[derive(Args)]
struct AgentArgs {
    /// Agent CLI executable
    #[arg(long, default_value = "copilot")]
    agent: String,

    /// Extra argument placed before the standard agent arguments (repeatable)
    #[arg(long = "agent-arg", allow_hyphen_values = true)]
    agent_args: Vec<String>,

    /// Per-item agent timeout in seconds
    #[arg(long, default_value = "600")]
    timeout_secs: u64,

    /// Items processed concurrently per batch
    #[arg(short, long, default_value = "1")]
    concurrency: usize,

    /// Brief template (defaults to the built-in one)
    #[arg(long)]
    template: Option<PathBuf>,

    /// Command the agent uses to verify reproductions
    #[arg(long, default_value = "verify-repro")]
    verify_command: String,

    /// Emit JSON progress events on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // stdout is reserved for JSON progress events
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("triage=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    match cli.command {
        Commands::Run { backlog, agent } => {
            let config = Arc::new(build_config(&cli.common, Some(&agent)));
            let items = fetch_backlog(&backlog, &config).await?;
            run(config, items).await?;
        }
        Commands::Aggregate { issues_file } => {
            let config = Arc::new(build_config(&cli.common, None));
            let scope = match issues_file {
                Some(path) => Some(JsonFileBacklog::new(path).fetch().await?),
                None => None,
            };
            report(&config, scope.as_deref()).await?;
        }
        Commands::Triage { backlog, agent } => {
            let config = Arc::new(build_config(&cli.common, Some(&agent)));
            let items = fetch_backlog(&backlog, &config).await?;
            run(config.clone(), items.clone()).await?;
            report(&config, Some(items.as_slice())).await?;
        }
        Commands::Prompts { backlog, template } => {
            let mut config = build_config(&cli.common, None);
            config.template_path = template;
            let items = fetch_backlog(&backlog, &config).await?;
            let template = load_template(config.template_path.as_deref())?;

            reset_prompts_dir(&config)?;
            for item in &items {
                let path = write_brief(&config, &template, item)?;
                info!(issue = %item.number, path = %path.display(), "Brief written");
            }
            info!(count = items.len(), dir = %config.prompts_dir.display(), "Briefs rendered");
        }
    }

    Ok(())
}

fn build_config(common: &CommonArgs, agent: Option<&AgentArgs>) -> TriageConfig {
    let mut config = TriageConfig::for_root(&common.root);
    if let Some(dir) = &common.results_dir {
        config.results_dir = dir.clone();
    }
    if let Some(dir) = &common.prompts_dir {
        config.prompts_dir = dir.clone();
    }
    if let Some(path) = &common.report {
        config.report_path = path.clone();
    }
    config.repo = common.repo.clone();
    config.model = common.model.clone();
    config.sort_order = common.sort;
    config.playground_url = common.playground_url.clone();
    if !common.area_prefixes.is_empty() {
        config.area_prefixes = common.area_prefixes.clone();
    }

    if let Some(agent) = agent {
        config.agent_program = agent.agent.clone();
        config.agent_args = agent.agent_args.clone();
        config.agent_timeout = Duration::from_secs(agent.timeout_secs);
        config.concurrency = agent.concurrency;
        config.template_path = agent.template.clone();
        config.verify_command = agent.verify_command.clone();
        config.json_progress = agent.json;
    }
    config
}

async fn fetch_backlog(
    args: &BacklogArgs,
    config: &TriageConfig,
) -> Result<Vec<BacklogItem>, PipelineError> {
    let source: Box<dyn BacklogSource> = match &args.issues_file {
        Some(path) => Box::new(
            JsonFileBacklog::new(path).with_excluded_labels(args.exclude_labels.clone()),
        ),
        None => Box::new(
            GhCliBacklog::new(&config.repo)
                .with_program(&args.gh)
                .with_limit(args.limit)
                .with_excluded_labels(args.exclude_labels.clone()),
        ),
    };

    let only: Vec<IssueNumber> = args.issues.iter().copied().map(IssueNumber::new).collect();
    let items = select(source.fetch().await?, &only);
    if items.is_empty() {
        warn!("Backlog is empty, nothing to triage");
    }
    Ok(items)
}

async fn run(config: Arc<TriageConfig>, items: Vec<BacklogItem>) -> Result<(), PipelineError> {
    config.validate()?;

    let executor = AgentExecutor::new(&config.agent_program)
        .with_args(config.agent_args.clone())
        .with_model(&config.model)
        .with_permission_mode(PermissionMode::AllowAll)
        .with_timeout(config.agent_timeout);
    executor.validate()?;

    let template = load_template(config.template_path.as_deref())?;
    let runner = AgentRunner::new(config.clone(), Arc::new(executor), template);
    let progress = if config.json_progress {
        ProgressReporter::json_stdout()
    } else {
        ProgressReporter::new()
    };

    let summary = Orchestrator::new(config, runner, progress).run(items).await?;
    for job in summary.jobs.values().filter(|job| !job.state.has_result()) {
        warn!(
            issue = %job.number(),
            state = %job.state,
            error = job.error.as_deref().unwrap_or(""),
            "Item left untriaged"
        );
    }
    info!(
        total = summary.total(),
        cached = summary.cached,
        succeeded = summary.succeeded,
        failed = summary.failed,
        timed_out = summary.timed_out,
        "Run complete"
    );
    Ok(())
}

async fn report(config: &TriageConfig, scope: Option<&[BacklogItem]>) -> Result<(), PipelineError> {
    let compiler_version = triage_sandbox::compiler_version(&config.sandbox).await;
    let report = aggregate(config, scope, compiler_version)?;

    match write_report(report, &config.report_path, config.sort_order)? {
        Some(path) => info!(path = %path.display(), "Report ready"),
        None => info!("No results yet"),
    }
    Ok(())
}
