//! `mdpress` CLI - Convert Markdown documents to PDF through plugins

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mdpress::config::{ConfigPaths, ConfigResolver};

mod cmd;

#[derive(Parser)]
#[command(name = "mdpress")]
#[command(about = "Markdown to PDF converter with pluggable document templates")]
#[command(version)]
struct Cli {
    /// Project config file (registers plugins, overrides settings)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Ignore user and project configs; use factory defaults only
    #[arg(long, global = true)]
    factory_defaults: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a Markdown file to PDF
    Convert {
        /// Markdown file to convert
        input: PathBuf,

        /// Plugin to use (registered name, plugin directory, or config file);
        /// defaults to the front matter's `plugin:` key, then to 'default'
        #[arg(short, long)]
        plugin: Option<String>,

        /// Output PDF path (defaults to the input path with .pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the main configuration, or one plugin's effective configuration
    Config {
        /// Show the effective configuration for this plugin
        #[arg(long)]
        plugin: Option<String>,

        /// Plain YAML only, no provenance comments
        #[arg(long)]
        pure: bool,
    },

    /// Inspect registered plugins
    Plugin {
        #[command(subcommand)]
        action: PluginAction,
    },
}

#[derive(Subcommand)]
enum PluginAction {
    /// List every discoverable plugin with its status
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; RUST_LOG overrides the default level.
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let paths = ConfigPaths::from_env(cli.config.clone());
    let resolver = ConfigResolver::new(paths, cli.factory_defaults);

    match cli.command {
        Commands::Convert { input, plugin, output } => {
            cmd::convert::cmd_convert(&resolver, &input, plugin.as_deref(), output).await?;
        }
        Commands::Config { plugin, pure } => {
            cmd::config::cmd_config(&resolver, plugin.as_deref(), pure).await?;
        }
        Commands::Plugin { action: PluginAction::List } => {
            cmd::plugin::cmd_plugin_list(&resolver).await?;
        }
    }

    Ok(())
}
