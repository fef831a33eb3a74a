/// Version injected at compile time via TIBM_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("TIBM_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tibm::apply;
use tibm::config::{CliOverrides, Config};
use tibm::ibm::client::IbmClient;
use tibm::ibm::http::format_command_error;
use tibm::manifest::Manifest;
use tibm::resource::{dispatch, registry, TypeKind};
use tibm::state::StateFile;
use tracing_subscriber::EnvFilter;

/// Declarative reconciler for IBM Cloud IAM policies, metrics routing and
/// compliance reports
#[derive(Parser, Debug)]
#[command(name = "tibm", version, about, long_about = None)]
struct Args {
    /// Region used to build regional endpoints
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// Account that policies are scoped to
    #[arg(long, global = true)]
    account_id: Option<String>,

    /// Path of the state file
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Log level for debugging (TIBM_LOG takes a full filter when this is off)
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, update and delete remote objects to match a manifest
    Apply {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Show what apply would do, without remote calls
    Plan {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Re-read every managed object and drop the ones that are gone
    Refresh,
    /// Delete every managed object
    Destroy,
    /// Adopt an existing remote object
    Import {
        #[arg(value_name = "TYPE")]
        type_name: String,
        name: String,
        id: String,
    },
    /// Read a data source and print it as JSON
    Data {
        kind: String,
        /// Value of the data source's required argument
        id: Option<String>,
        /// Extra arguments as key=value
        #[arg(long = "arg", value_parser = parse_key_val)]
        args: Vec<(String, String)>,
    },
    /// List supported resource and data source types
    Types,
    /// Show the effective settings, or persist one with KEY VALUE
    Config {
        key: Option<String>,
        value: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_directive(self) -> Option<&'static str> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some("error"),
            LogLevel::Warn => Some("warn"),
            LogLevel::Info => Some("info"),
            LogLevel::Debug => Some("debug"),
            LogLevel::Trace => Some("trace"),
        }
    }
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {s:?}"))
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = match level.to_directive() {
        Some(directive) => EnvFilter::new(directive),
        None => match std::env::var("TIBM_LOG") {
            Ok(value) if !value.trim().is_empty() => EnvFilter::new(value),
            _ => return None,
        },
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("warning: cannot open log file {}: {}", log_path.display(), e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("tibm {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("tibm").join("tibm.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".tibm").join("tibm.log");
    }
    PathBuf::from("tibm.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_guard = setup_logging(args.log_level);

    let mut config = Config::load();
    config.overrides = CliOverrides {
        region: args.region.clone(),
        account_id: args.account_id.clone(),
        state_path: args.state.clone(),
    };

    if let Err(err) = run(args.command, &mut config).await {
        tracing::error!("{:#}", err);
        eprintln!("Error: {}", format_command_error(&err));
        drop(log_guard);
        std::process::exit(1);
    }
    Ok(())
}

fn connect(config: &Config) -> Result<IbmClient> {
    IbmClient::from_config(config).context("cannot build IBM Cloud client")
}

async fn run(command: Command, config: &mut Config) -> Result<()> {
    let state_path = config.effective_state_path();

    match command {
        Command::Apply { file } => {
            let manifest = Manifest::load(&file)?;
            let mut state = StateFile::load(&state_path)?;
            let client = connect(config)?;
            let summary = apply::apply(&client, &manifest, &mut state, &state_path).await?;
            println!("Apply complete: {summary}");
        }
        Command::Plan { file } => {
            let manifest = Manifest::load(&file)?;
            let state = StateFile::load(&state_path)?;
            let steps = apply::plan(&manifest, &state)?;
            if steps.is_empty() {
                println!("No changes.");
            }
            for step in &steps {
                println!("{step}");
            }
        }
        Command::Refresh => {
            let mut state = StateFile::load(&state_path)?;
            let client = connect(config)?;
            apply::refresh(&client, &mut state, &state_path).await?;
            println!("Refreshed {} resources", state.resources.len());
        }
        Command::Destroy => {
            let mut state = StateFile::load(&state_path)?;
            let client = connect(config)?;
            let count = apply::destroy(&client, &mut state, &state_path).await?;
            println!("Destroy complete: {count} deleted");
        }
        Command::Import {
            type_name,
            name,
            id,
        } => {
            let mut state = StateFile::load(&state_path)?;
            let client = connect(config)?;
            apply::import(&client, &mut state, &state_path, &type_name, &name, &id).await?;
            println!("Imported {id} as {type_name}.{name}");
        }
        Command::Data { kind, id, args } => {
            let def = registry::get_type(&kind)
                .filter(|def| def.kind == TypeKind::DataSource)
                .with_context(|| format!("unknown data source {kind:?}"))?;

            let mut arguments = Map::new();
            if let Some(id) = id {
                let primary = def
                    .primary_arg()
                    .with_context(|| format!("{kind} takes no positional argument"))?;
                arguments.insert(primary.to_string(), Value::String(id));
            }
            for (key, value) in args {
                arguments.insert(key, Value::String(value));
            }

            let client = connect(config)?;
            let value = dispatch::read_data_source(&kind, &client, &Value::Object(arguments)).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Types => {
            for kind in [TypeKind::Resource, TypeKind::DataSource] {
                println!("{kind}s:");
                for name in registry::type_names(kind) {
                    if let Some(def) = registry::get_type(name) {
                        println!("  {:<32} {}", name, def.display_name);
                    }
                }
            }
        }
        Command::Config { key, value } => match (key, value) {
            (Some(key), Some(value)) => {
                config.set(&key, &value)?;
                config.save().context("failed to save config")?;
                println!("Set {key}");
            }
            (Some(key), None) => anyhow::bail!("missing value for {key}"),
            _ => {
                println!("region:          {}", config.effective_region());
                println!(
                    "account_id:      {}",
                    config.effective_account_id().unwrap_or_else(|| "(not set)".to_string())
                );
                println!(
                    "scc_instance_id: {}",
                    config
                        .effective_scc_instance_id()
                        .unwrap_or_else(|| "(not set)".to_string())
                );
                println!(
                    "api_key:         {}",
                    if config.effective_api_key().is_some() { "(set)" } else { "(not set)" }
                );
                println!("state_path:      {}", config.effective_state_path().display());
                println!("settle_timeout:  {:?}", config.settle_timeout());
            }
        },
    }
    Ok(())
}
