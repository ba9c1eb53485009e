use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tenant_host::plugins::{PluginCatalog, PluginConfig};
use tenant_host::{Config, Host};

/// Tenant Host - plugin hosting core for multi-tenant servers
#[derive(Parser)]
#[command(name = "tenant-host", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "TENANT_HOST_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(long, env = "TENANT_HOST_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List plugins compiled into this host
    Plugins,
    /// Validate the config file and every enabled plugin's settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,tenant_host=info",
        1 => "info,tenant_host=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let catalog = PluginCatalog::builtin();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Plugins => {
                list_plugins(&catalog);
                Ok(())
            }
            Command::CheckConfig => check_config(&config, &catalog),
        };
    }

    tracing::info!(
        port = config.server.port,
        plugins = config.enabled_plugins().count(),
        "starting tenant host"
    );

    let host = Host::new(config, catalog)?;
    host.run().await?;

    Ok(())
}

/// Print the plugin catalog
fn list_plugins(catalog: &PluginCatalog) {
    for name in catalog.names() {
        let Some(plugin) = catalog.create(name) else {
            continue;
        };
        let caps = plugin.capabilities();
        println!("{name} v{}", plugin.version());
        println!(
            "  rest: {}  messages: {}  config: {}  deinit: {}",
            caps.rest_api, caps.handle_message, caps.conf_descriptions, caps.deinit
        );
        for desc in plugin.conf_descriptions() {
            let required = if desc.is_required() { " (required)" } else { "" };
            let secret = if desc.secret_value { " (secret)" } else { "" };
            println!(
                "    {}: {}{required}{secret}",
                desc.key,
                desc.data_type.as_str()
            );
        }
    }
}

/// Validate configured plugins without starting them
fn check_config(config: &Config, catalog: &PluginCatalog) -> anyhow::Result<()> {
    println!("port: {}", config.server.port);
    match &config.database {
        Some(path) => println!("database: {}", path.display()),
        None => println!("database: in-memory"),
    }
    println!("message timeout: {}s", config.message_timeout.as_secs());

    let mut problems = 0;
    for entry in config.enabled_plugins() {
        let Some(plugin) = catalog.create(&entry.name) else {
            println!("[fail] {}: not in catalog", entry.name);
            problems += 1;
            continue;
        };
        let result = if plugin.capabilities().conf_descriptions {
            PluginConfig::validate_and_merge(&entry.name, &plugin.conf_descriptions(), &entry.config)
        } else {
            Ok(PluginConfig::unvalidated(entry.config.clone()))
        };
        match result {
            Ok(merged) => println!(
                "[ok]   {}: {}",
                entry.name,
                serde_json::Value::Object(merged.redacted())
            ),
            Err(e) => {
                println!("[fail] {}: {e}", entry.name);
                problems += 1;
            }
        }
    }

    if problems > 0 {
        anyhow::bail!("{problems} plugin(s) have invalid configuration");
    }
    Ok(())
}
