use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use relay_api::ReqwestExecutor;
use relay_engine::{
    ChainExecutor, ExecutionOptions, PluginRegistry, VariableContext, parse_call, parse_config_file,
    plugin::{CorePlugin, EnvSecretsPlugin},
    validate_config,
};
use relay_types::RelayConfig;
use tracing::{debug, info};

/// Environment variable naming the configuration file when `--config` is absent.
const CONFIG_ENV_VAR: &str = "RELAY_CONFIG";
const CONFIG_FILE_NAME: &str = "relay.yaml";
/// How long secrets read from the environment stay cached within one run.
const SECRET_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Parser)]
#[command(name = "relay", version, about = "Run HTTP requests and request chains described in a config file")]
struct Cli {
    /// Path to the configuration file (defaults to $RELAY_CONFIG, ./relay.yaml, then the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Invoke a single endpoint given as <api>.<endpoint>.
    Call {
        target: String,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Run a named chain.
    Chain {
        name: String,
        #[command(flatten)]
        run: RunArgs,
    },
    /// List configured APIs, endpoints, profiles, and chains.
    List,
    /// Check the configuration for structural problems.
    Validate,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Variable for this run, highest precedence (repeatable).
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    vars: Vec<(String, String)>,

    /// Profile to apply; later profiles override earlier ones (repeatable).
    #[arg(long = "profile", value_name = "NAME")]
    profiles: Vec<String>,

    /// Assemble requests without sending them.
    #[arg(long)]
    dry_run: bool,

    /// Per-request timeout in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 30)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let config_path = discover_config(cli.config.as_deref())?;
    debug!(path = %config_path.display(), "loading configuration");
    let config = parse_config_file(&config_path)?;

    match cli.command {
        Command::Call { target, run } => run_call(&config, &target, &run).await,
        Command::Chain { name, run } => run_chain(&config, &name, &run).await,
        Command::List => {
            print_listing(&config);
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate => Ok(report_validation(&config)),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_call(config: &RelayConfig, target: &str, run: &RunArgs) -> Result<ExitCode> {
    let (api, endpoint) = parse_call(target)?;
    let executor = build_executor(run)?;
    let context = build_context(config, run)?;

    let result = executor.call_endpoint(config, api, endpoint, &context).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(exit_code(result.success))
}

async fn run_chain(config: &RelayConfig, name: &str, run: &RunArgs) -> Result<ExitCode> {
    let executor = build_executor(run)?;
    let context = build_context(config, run)?;

    let result = executor.run(config, name, context).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(exit_code(result.success))
}

fn build_executor(run: &RunArgs) -> Result<ChainExecutor> {
    let plugins = PluginRegistry::builder()
        .install(CorePlugin)?
        .install(EnvSecretsPlugin::new(Some(SECRET_CACHE_TTL)))?
        .build();
    let http = ReqwestExecutor::with_timeout(Duration::from_secs(run.timeout))?;
    let options = ExecutionOptions { dry_run: run.dry_run };
    info!(plugins = ?plugins.plugin_names().collect::<Vec<_>>(), dry_run = run.dry_run, "executor ready");
    Ok(ChainExecutor::new(Arc::new(http), Arc::new(plugins), options))
}

fn build_context(config: &RelayConfig, run: &RunArgs) -> Result<VariableContext> {
    let mut context = VariableContext::new()
        .with_process_env()
        .with_cli_variables(run.vars.iter().cloned());
    context.apply_profiles(config, &run.profiles)?;
    Ok(context)
}

fn exit_code(success: bool) -> ExitCode {
    if success { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn print_listing(config: &RelayConfig) {
    for (api_name, api) in &config.apis {
        println!("{api_name} ({})", api.base_url);
        for (endpoint_name, endpoint) in &api.endpoints {
            println!("  {api_name}.{endpoint_name}  {} {}", endpoint.method.to_ascii_uppercase(), endpoint.path);
        }
    }
    if !config.profiles.is_empty() {
        println!();
        println!("profiles: {}", config.profiles.keys().cloned().collect::<Vec<_>>().join(", "));
    }
    if !config.chains.is_empty() {
        println!();
        println!("chains:");
        for (chain_name, chain) in &config.chains {
            match &chain.description {
                Some(description) => println!("  {chain_name} ({} steps) - {description}", chain.steps.len()),
                None => println!("  {chain_name} ({} steps)", chain.steps.len()),
            }
        }
    }
}

fn report_validation(config: &RelayConfig) -> ExitCode {
    match validate_config(config) {
        Ok(()) => {
            println!("configuration is valid");
            ExitCode::SUCCESS
        }
        Err(problems) => {
            for problem in &problems {
                eprintln!("{problem}");
            }
            ExitCode::FAILURE
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Picks the configuration file: explicit path, then `RELAY_CONFIG`, then
/// `./relay.yaml`, then `<config dir>/relay/relay.yaml`.
fn discover_config(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(config_dir) = dirs_next::config_dir() {
        candidates.push(config_dir.join("relay").join(CONFIG_FILE_NAME));
    }
    for candidate in &candidates {
        if candidate.is_file() {
            return Ok(candidate.clone());
        }
    }
    let searched = candidates
        .iter()
        .map(|candidate| candidate.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    bail!("no configuration file found (searched {searched}); pass --config or set {CONFIG_ENV_VAR}")
}
