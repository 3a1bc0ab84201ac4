mod config_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    modgraph_config::ModgraphConfig,
    modgraph_gateway::{core_module, enabled_modules, session_runtime, start_gateway},
    modgraph_graphql::{ModuleSet, build_schema},
    modgraph_service_traits::{AuditSink, TracingAuditSink},
    modgraph_sessions::MemorySessionStore,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::config_commands::ConfigAction;

#[derive(Parser)]
#[command(name = "modgraph", about = "modgraph: one GraphQL schema over many service modules")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of searching the standard locations.
    #[arg(long, global = true, env = "MODGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Serve,
    /// Compose every enabled module and print the merged schema.
    CheckSchema,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Explicit `--config` must load; discovery falls back to defaults.
fn load_config(cli: &Cli) -> anyhow::Result<ModgraphConfig> {
    let mut config = match &cli.config {
        Some(path) => modgraph_config::load_config(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => modgraph_config::discover_and_load(),
    };
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

/// Every module this binary ships, configured from `config`.
fn modules(config: &ModgraphConfig) -> anyhow::Result<(ModuleSet, Arc<MemorySessionStore>)> {
    let (sessions, resolver) = session_runtime(config);
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let core = core_module(config, resolver, &audit)?;
    Ok((ModuleSet::new().with(Arc::new(core)), sessions))
}

fn check_schema(config: &ModgraphConfig) -> anyhow::Result<()> {
    let (modules, _) = modules(config)?;
    let modules = enabled_modules(config, modules);
    let schema = build_schema(&modules).context("schema composition failed")?;
    println!("{}", schema.sdl());
    eprintln!(
        "composed {} module(s): {}",
        modules.len(),
        modules.names().join(", ")
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    match &cli.command {
        None | Some(Commands::Serve) => {
            let config = load_config(&cli)?;
            info!(version = env!("CARGO_PKG_VERSION"), "modgraph starting");
            let (modules, sessions) = modules(&config)?;
            start_gateway(config, sessions, modules).await
        },
        Some(Commands::CheckSchema) => check_schema(&load_config(&cli)?),
        Some(Commands::Config {
            action: ConfigAction::Check { verbose },
        }) => config_commands::check(cli.config.as_deref(), *verbose),
        Some(Commands::Config {
            action: ConfigAction::Show,
        }) => {
            let config = load_config(&cli)?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        },
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from(["modgraph", "--bind", "0.0.0.0", "--port", "9100", "serve"]);
        assert!(matches!(cli.command, Some(Commands::Serve)));
        let config = load_config(&Cli {
            config: None,
            ..cli
        })
        .unwrap();
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let cli = Cli::parse_from([
            "modgraph",
            "--config",
            missing.to_str().unwrap(),
            "check-schema",
        ]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn default_modules_compose() {
        assert!(check_schema(&ModgraphConfig::default()).is_ok());
    }
}
