use clap::{Parser, Subcommand};
use maestro_orchestrator::{
    default_profiles, AgentProfile, FailurePolicy, NewTask, Orchestrator, OrchestratorConfig,
    SimulatedHandler, TaskSpec,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "maestro.toml";

#[derive(Parser)]
#[command(name = "maestro", about = "Maestro: in-memory multi-agent task scheduler")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the configured agent pool
    Agents,
    /// Create and execute a single task
    Task {
        /// Task type; must be a capability in the vocabulary
        #[arg(long = "type")]
        task_type: String,
        /// Human-readable description
        #[arg(short, long)]
        description: String,
        /// JSON input payload
        #[arg(long, default_value = "{}")]
        input: String,
        /// Priority (lower is more urgent)
        #[arg(short, long)]
        priority: Option<i32>,
    },
    /// Execute a workflow defined in a TOML file
    Workflow {
        /// Path to the workflow definition
        file: PathBuf,
    },
}

#[derive(Deserialize, Default)]
struct MaestroConfig {
    #[serde(default)]
    orchestrator: OrchestratorConfig,
    /// Agent pool; the stock agents are used when empty.
    #[serde(default)]
    agents: Vec<AgentProfile>,
    #[serde(default)]
    simulation: SimulationConfig,
}

#[derive(Deserialize, Default)]
struct SimulationConfig {
    /// Artificial latency of the simulated agents.
    #[serde(default)]
    delay_ms: u64,
}

/// On-disk workflow definition.
#[derive(Deserialize, Serialize)]
struct WorkflowFile {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    on_failure: FailurePolicy,
    #[serde(default)]
    tasks: Vec<TaskSpec>,
}

fn load_config(path: &Path) -> anyhow::Result<MaestroConfig> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        info!("No {DEFAULT_CONFIG} found, using defaults");
        return Ok(MaestroConfig::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
    })?;
    Ok(toml::from_str(&raw)?)
}

fn load_workflow(path: &Path) -> anyhow::Result<WorkflowFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!("Failed to read workflow file '{}': {}", path.display(), e)
    })?;
    Ok(toml::from_str(&raw)?)
}

/// Build the orchestrator and register the configured (or stock) agents.
fn build_orchestrator(config: MaestroConfig) -> anyhow::Result<Orchestrator> {
    let orchestrator = Orchestrator::new(&config.orchestrator)?;
    let profiles = if config.agents.is_empty() {
        default_profiles()
    } else {
        config.agents
    };
    let delay = Duration::from_millis(config.simulation.delay_ms);
    for profile in profiles {
        let handler = SimulatedHandler::new(profile.name.clone()).with_delay(delay);
        orchestrator.register_agent(profile, Arc::new(handler))?;
    }
    info!(
        agents = orchestrator.agent_status().total,
        "Agent pool ready"
    );
    Ok(orchestrator)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let orchestrator = build_orchestrator(config)?;

    match cli.command {
        Commands::Agents => print_json(&orchestrator.agent_status())?,
        Commands::Task {
            task_type,
            description,
            input,
            priority,
        } => {
            let input: serde_json::Value = serde_json::from_str(&input)
                .map_err(|e| anyhow::anyhow!("--input is not valid JSON: {e}"))?;
            let mut spec = NewTask::new(task_type, description).with_input(input);
            if let Some(priority) = priority {
                spec = spec.with_priority(priority);
            }
            let task = orchestrator.create_task(spec)?;
            let outcome = orchestrator.execute_task(task.id).await?;
            print_json(&outcome)?;
        }
        Commands::Workflow { file } => {
            let definition = load_workflow(&file)?;
            let id = orchestrator.create_workflow_with_policy(
                definition.name,
                definition.description,
                definition.tasks,
                definition.on_failure,
            )?;
            let run = orchestrator.execute_workflow(id).await?;
            print_json(&run)?;
        }
    }

    Ok(())
}
