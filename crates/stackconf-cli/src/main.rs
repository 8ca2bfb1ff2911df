//! stackconf CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "stackconf")]
#[command(about = "Registers a host in Foreman and PowerDNS, then runs Puppet", long_about = None)]
struct Cli {
    /// Config file (default: ~/.stackconf.kdl, then /etc/.stackconf.kdl)
    #[arg(long, global = true, env = "STACKCONF_CONFIG")]
    config: Option<PathBuf>,

    /// Dry run: log changes without making them
    #[arg(short = 'n', long, global = true)]
    noop: bool,

    /// Exit with status 1 when the command fails
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register this host and run the Puppet agent
    Create,
    /// Remove this host from the inventory and DNS
    Delete,
    /// Delete every host and DNS entry of the given environments
    Deleteenv {
        /// Environment names, matched as substrings
        #[arg(required = true)]
        envs: Vec<String>,
        /// Comma-separated substrings of names to keep
        #[arg(short, long, default_value = "")]
        whitelist: String,
        /// Delete whole DNS zones instead of their records
        #[arg(short = 'd', long)]
        deletedomains: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut strict = cli.strict;

    let result = match commands::load_context(cli.config.as_deref(), cli.noop).await {
        Ok(ctx) => {
            strict |= ctx.settings.stackconf.strict_exit;
            match cli.command {
                Commands::Create => commands::create::run(&ctx).await,
                Commands::Delete => commands::delete::run(&ctx).await,
                Commands::Deleteenv {
                    envs,
                    whitelist,
                    deletedomains,
                } => commands::deleteenv::run(&ctx, &envs, &whitelist, deletedomains).await,
            }
        }
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "Command failed");
    }
    ExitCode::from(commands::exit_code_for(&result, strict))
}
