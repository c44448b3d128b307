mod config;
mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mcp::ServerConfig;
use runtime::{AnthropicCompletion, Agent, ApiKey, Completion, OpenAiCompletion, ToolRegistry};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{Config, Provider};
use error::{Error, Result};

const CONFIG_FILE: &str = "tiller.toml";

#[derive(Parser)]
#[command(name = "tiller")]
#[command(about = "A minimal agent that drives MCP tools with a language model", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./tiller.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level, including prompts and raw model output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent until it finishes the goal or runs out of steps
    Run {
        /// What the agent should accomplish
        goal: String,
        /// Override the step budget
        #[arg(long)]
        max_steps: Option<usize>,
        /// Override the per-step timeout, in seconds
        #[arg(long)]
        step_timeout: Option<u64>,
    },
    /// Connect every server and print the combined tool catalog
    Tools,
    /// Print the resources advertised by each server
    Resources,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        if let Error::Config(config::ConfigError::MissingAuth { var }) = &e {
            warn!(%var, "no completion credential configured");
        }
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            goal,
            max_steps,
            step_timeout,
        } => cmd_run(&config, &goal, max_steps, step_timeout).await,
        Commands::Tools => cmd_tools(&config).await,
        Commands::Resources => cmd_resources(&config).await,
    }
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        info!(path = %path.display(), "loading config");
        return Ok(Config::load(path)?);
    }

    let path = Path::new(CONFIG_FILE);
    if path.exists() {
        info!(path = CONFIG_FILE, "loading config");
        Ok(Config::load(path)?)
    } else {
        info!("no {CONFIG_FILE} found, using the filesystem server on the working directory");
        Ok(Config::default_config(&std::env::current_dir()?))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

async fn cmd_run(
    config: &Config,
    goal: &str,
    max_steps: Option<usize>,
    step_timeout: Option<u64>,
) -> Result<()> {
    // Resolve everything from the environment before any server starts.
    let completion = build_completion(config, config.api_key(env_var)?);
    let servers = config.server_configs(env_var)?;
    let agent_config = config.agent_config(max_steps, step_timeout);

    let registry = Arc::new(ToolRegistry::stdio());
    let result = async {
        connect_all(&registry, &servers).await?;
        info!(
            provider = completion.name(),
            model = %agent_config.model,
            tools = registry.len().await,
            "agent ready"
        );

        let mut agent = Agent::new(completion, registry.clone(), agent_config);
        let outcome = agent.run(goal).await;
        println!("{}", outcome.message());
        Ok::<_, Error>(())
    }
    .await;

    release(&registry, result).await
}

async fn cmd_tools(config: &Config) -> Result<()> {
    let servers = config.server_configs(env_var)?;
    let registry = ToolRegistry::stdio();

    let result = async {
        connect_all(&registry, &servers).await?;
        let tools = registry.list_tools().await;
        if tools.is_empty() {
            println!("No tools available.");
        }
        for tool in tools {
            println!("{:<40}  {}", tool.name, tool.description);
        }
        Ok::<_, Error>(())
    }
    .await;

    release(&registry, result).await
}

async fn cmd_resources(config: &Config) -> Result<()> {
    let servers = config.server_configs(env_var)?;
    let registry = ToolRegistry::stdio();

    let result = async {
        connect_all(&registry, &servers).await?;
        let resources = registry.list_resources().await;
        if resources.is_empty() {
            println!("No resources available.");
        }
        for (session, resource) in resources {
            println!("{session:<16}  {:<48}  {}", resource.uri, resource.name);
        }
        Ok::<_, Error>(())
    }
    .await;

    release(&registry, result).await
}

fn build_completion(config: &Config, api_key: ApiKey) -> Arc<dyn Completion> {
    let max_tokens = config.backend.max_tokens;
    match config.backend.provider {
        Provider::Anthropic => {
            let mut builder = AnthropicCompletion::builder(api_key);
            if let Some(max) = max_tokens {
                builder = builder.max_tokens(max);
            }
            Arc::new(builder.build())
        }
        Provider::OpenAi => {
            let mut completion = OpenAiCompletion::new(api_key);
            if let Some(max) = max_tokens {
                completion = completion.with_max_output_tokens(max);
            }
            Arc::new(completion)
        }
    }
}

/// Connect servers in order; the first failure aborts.
async fn connect_all(registry: &ToolRegistry, servers: &[ServerConfig]) -> Result<()> {
    for server in servers {
        registry.connect(&server.name, server).await?;
        info!(session = %server.name, "connected");
    }
    Ok(())
}

/// Disconnect every session, whatever `result` was.
///
/// A command error takes precedence over a shutdown error; the latter is
/// only logged in that case.
async fn release(registry: &ToolRegistry, result: Result<()>) -> Result<()> {
    let shutdown = registry.disconnect_all().await;
    match (result, shutdown) {
        (Err(e), Err(shutdown)) => {
            warn!("cleanup after failure was incomplete: {shutdown}");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), shutdown) => Ok(shutdown?),
    }
}
