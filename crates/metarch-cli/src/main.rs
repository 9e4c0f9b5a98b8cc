//! Metarch CLI - route tasks to specialist agents

use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use metarch_core::config::Config;
use metarch_core::orchestrator::{Orchestrator, SolveReport};
use metarch_core::registry::WorkerRegistry;
use metarch_core::routing::{TaskProfile, WorkerRecord, COMPLEXITY_MAX, COMPLEXITY_MIN};
use metarch_core::storage::{open_store, RegistryStore};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "metarch")]
#[command(author, version, about = "Route tasks to specialist agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a task and dispatch it to the best worker
    Solve {
        /// Task description
        task: String,
    },

    /// Create a specialist worker for a domain
    CreateAgent {
        /// Domain tags (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        tags: Vec<String>,
        /// Complexity the worker is centered on (0-10)
        #[arg(short, long)]
        complexity: f64,
        /// Operations the worker supports (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        operations: Vec<String>,
        /// What the worker is for
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List registered workers
    ListAgents {
        /// Include deprecated workers
        #[arg(short, long)]
        all: bool,
    },

    /// Show ecosystem status
    Status,

    /// Deprecate a worker so it is no longer routed to
    Deprecate {
        /// Worker ID
        id: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays parseable
    let directive = "metarch=info"
        .parse::<tracing_subscriber::filter::Directive>()
        .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into());
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(directive);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        report_error(&e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Solve { task } => cmd_solve(&task, format, quiet).await,

        Commands::CreateAgent {
            tags,
            complexity,
            operations,
            description,
        } => cmd_create_agent(tags, complexity, operations, description, format, quiet).await,

        Commands::ListAgents { all } => cmd_list_agents(all, format, quiet).await,

        Commands::Status => cmd_status(format).await,

        Commands::Deprecate { id } => cmd_deprecate(&id, format, quiet).await,

        Commands::Config { action } => cmd_config(action, quiet),
    }
}

fn report_error(e: &anyhow::Error) {
    match e.downcast_ref::<metarch_core::Error>() {
        Some(core) => {
            eprintln!("Error [{}]: {}", core.code(), core);
            if let Some(hint) = core.suggestion() {
                eprintln!("  Try: {}", hint);
            }
        }
        None => eprintln!("Error: {:#}", e),
    }
}

// ============================================================================
// Session
// ============================================================================

/// Loaded configuration, store and orchestrator for one invocation
struct Session {
    store: Box<dyn RegistryStore>,
    orchestrator: Orchestrator,
}

impl Session {
    async fn open() -> anyhow::Result<Self> {
        let config = Config::load()?;
        let data_dir = config.data_dir()?;
        debug!(data_dir = %data_dir.display(), backend = %config.storage.backend, "Opening registry");

        let store = open_store(config.storage.backend, &data_dir)
            .await
            .with_context(|| format!("Failed to open registry store in {}", data_dir.display()))?;
        let registry = WorkerRegistry::from_records(store.load_all().await?)?;
        let orchestrator = Orchestrator::from_config(Arc::new(registry), &config);

        Ok(Self { store, orchestrator })
    }

    async fn persist(&self) -> anyhow::Result<()> {
        let records = self.orchestrator.snapshot().await;
        self.store.save_all(&records).await?;
        debug!(count = records.len(), "Persisted registry");
        Ok(())
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_solve(task: &str, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let session = Session::open().await?;

    // Outcomes are tracked even when dispatch fails, so save either way
    let result = session.orchestrator.solve(task).await;
    session.persist().await?;
    let report = result?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report, quiet),
    }

    if !report.succeeded() {
        return Err(anyhow!(
            "Worker '{}' reported failure for this task",
            report.worker.id
        ));
    }
    Ok(())
}

fn print_report(report: &SolveReport, quiet: bool) {
    if quiet {
        println!("{}", report.output);
        return;
    }

    let how = if report.synthesized {
        " (newly created)"
    } else if report.fallback {
        " (fallback)"
    } else {
        ""
    };
    println!("Task analysis:");
    println!("  Domains: {}", report.profile.domain_tags.join(", "));
    println!("  Complexity: {}", report.profile.complexity);
    if !report.profile.required_operations.is_empty() {
        let ops: Vec<&str> = report.profile.required_operations.iter().map(String::as_str).collect();
        println!("  Operations: {}", ops.join(", "));
    }
    println!();
    println!("Dispatched to {} ({}){}", report.worker.name, report.worker.id, how);
    println!("  Score: {:.3} [{}]", report.decision.score, report.decision.reason);
    for alt in report.decision.alternatives().take(3) {
        println!("  Also considered: {} ({:.3})", alt.worker_id, alt.score);
    }
    println!();
    println!("{}", report.output);
    println!();
    println!(
        "Outcome: {} in {}ms (worker success rate {:.0}% over {} runs)",
        if report.succeeded() { "success" } else { "failure" },
        report.outcome.latency.as_millis(),
        report.stats.success_rate() * 100.0,
        report.stats.invocation_count
    );
}

async fn cmd_create_agent(
    tags: Vec<String>,
    complexity: f64,
    operations: Vec<String>,
    description: Option<String>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    if !(COMPLEXITY_MIN..=COMPLEXITY_MAX).contains(&complexity) {
        return Err(metarch_core::Error::InvalidInput(format!(
            "complexity must be between {} and {}, got {}",
            COMPLEXITY_MIN, COMPLEXITY_MAX, complexity
        ))
        .into());
    }

    let session = Session::open().await?;
    let profile = TaskProfile::new(description.unwrap_or_default(), tags, complexity)
        .with_operations(operations);
    if profile.domain_tags.is_empty() {
        return Err(metarch_core::Error::InvalidInput("at least one tag is required".to_string()).into());
    }

    let record = session.orchestrator.create_agent(&profile).await?;
    session.persist().await?;
    info!(worker_id = %record.descriptor.id, "Created worker");

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
        OutputFormat::Text if quiet => println!("{}", record.descriptor.id),
        OutputFormat::Text => {
            println!("Created worker '{}'", record.descriptor.name);
            print_worker(&record);
        }
    }
    Ok(())
}

async fn cmd_list_agents(all: bool, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let session = Session::open().await?;
    let workers = session.orchestrator.list_workers(all).await;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&workers)?);
        return Ok(());
    }

    if workers.is_empty() {
        if !quiet {
            println!("No workers registered.");
            println!("\nCreate one with: metarch create-agent --tags <domain> --complexity <0-10>");
        }
        return Ok(());
    }

    if !quiet {
        println!("Workers:");
    }
    for worker in &workers {
        if quiet {
            println!("{}", worker.descriptor.id);
        } else {
            print_worker(worker);
        }
    }
    Ok(())
}

fn print_worker(worker: &WorkerRecord) {
    let d = &worker.descriptor;
    let tags: Vec<&str> = d.domain_tags.iter().map(String::as_str).collect();
    println!(
        "  {} - {} [{}] v{} {}",
        d.id,
        d.name,
        worker.status,
        d.version,
        d.origin
    );
    println!("      Tags: {}  Complexity: {}", tags.join(", "), d.complexity);
    if !d.operations.is_empty() {
        let ops: Vec<&str> = d.operations.iter().map(String::as_str).collect();
        println!("      Operations: {}", ops.join(", "));
    }
    if let Some(description) = &d.description {
        println!("      {}", description);
    }
    println!(
        "      Runs: {}  Success: {:.0}%  Avg latency: {:.0}ms",
        worker.stats.invocation_count,
        worker.stats.success_rate() * 100.0,
        worker.stats.average_latency_ms()
    );
}

async fn cmd_status(format: OutputFormat) -> anyhow::Result<()> {
    let session = Session::open().await?;
    let status = session.orchestrator.status().await;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let eco = &status.ecosystem;
    println!("Metarch Status");
    println!("==============");
    println!();
    println!(
        "Workers: {} ({} active, {} deprecated)",
        eco.total_workers, eco.active_workers, eco.deprecated_workers
    );
    println!("Total invocations: {}", eco.total_invocations);
    println!("Success rate: {:.1}%", eco.success_rate * 100.0);
    match eco.average_quality {
        Some(q) => println!("Average quality: {:.2}", q),
        None => println!("Average quality: (no samples)"),
    }
    if let Some(domain) = &eco.most_active_domain {
        println!("Most active domain: {}", domain);
    }
    if !eco.domains.is_empty() {
        println!();
        println!("Domains:");
        for (domain, count) in &eco.domains {
            println!("  {}: {} worker(s)", domain, count);
        }
    }
    Ok(())
}

async fn cmd_deprecate(id: &str, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let session = Session::open().await?;
    let record = session.orchestrator.deprecate(id).await?;
    session.persist().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
        OutputFormat::Text => {
            if !quiet {
                println!("Deprecated worker '{}'", record.descriptor.id);
            }
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
