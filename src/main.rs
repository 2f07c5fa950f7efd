// src/main.rs
//! Quarry - CLI entry point

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

// =============================================================================
// CLI Definitions
// =============================================================================

#[derive(Parser)]
#[command(name = "quarry")]
#[command(version)]
#[command(about = "Repository metadata manager", long_about = None)]
struct Cli {
    /// Installation root directory
    #[arg(short, long, default_value = "/", global = true)]
    root: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a repository
    RepoAdd {
        /// Unique repository alias
        alias: String,

        /// Base URL of the repository
        url: String,

        /// Human readable name
        #[arg(short, long)]
        name: Option<String>,

        /// Repository priority (lower = preferred)
        #[arg(short, long)]
        priority: Option<u32>,

        /// Add the repository in disabled state
        #[arg(long)]
        disabled: bool,
    },

    /// List configured repositories
    RepoList,

    /// Remove a repository and its caches
    RepoRemove {
        /// Repository alias
        alias: String,
    },

    /// Enable a repository
    RepoEnable {
        /// Repository alias
        alias: String,
    },

    /// Disable a repository
    RepoDisable {
        /// Repository alias
        alias: String,
    },

    /// Import all repositories defined in a .repo file
    RepoImport {
        /// Path to the .repo file
        file: String,
    },

    /// Refresh repository metadata
    Refresh {
        /// Optional repository alias (refreshes all enabled if omitted)
        alias: Option<String>,

        /// Refresh even if the metadata looks current
        #[arg(short, long)]
        force: bool,

        /// Also (re)build the solver cache
        #[arg(short, long)]
        build: bool,
    },

    /// Drop built solver caches
    CleanCache {
        /// Optional repository alias (cleans all if omitted)
        alias: Option<String>,
    },

    /// Refresh, build and load one repository, then report its size
    Load {
        /// Repository alias
        alias: String,
    },

    /// Add a service
    ServiceAdd {
        /// Unique service alias
        alias: String,

        /// Service URL
        url: String,

        /// Service type (plugin or remote-index)
        #[arg(short, long, default_value = "remote-index")]
        service_type: String,
    },

    /// List configured services
    ServiceList,

    /// Remove a service
    ServiceRemove {
        /// Service alias
        alias: String,
    },

    /// Refresh all enabled services
    ServiceRefresh,
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::RepoAdd {
            alias,
            url,
            name,
            priority,
            disabled,
        }) => commands::cmd_repo_add(&alias, &url, &cli.root, name, priority, disabled),

        Some(Commands::RepoList) => commands::cmd_repo_list(&cli.root),

        Some(Commands::RepoRemove { alias }) => commands::cmd_repo_remove(&alias, &cli.root),

        Some(Commands::RepoEnable { alias }) => {
            commands::cmd_repo_enable(&alias, &cli.root, true)
        }

        Some(Commands::RepoDisable { alias }) => {
            commands::cmd_repo_enable(&alias, &cli.root, false)
        }

        Some(Commands::RepoImport { file }) => commands::cmd_repo_import(&file, &cli.root),

        Some(Commands::Refresh { alias, force, build }) => {
            commands::cmd_refresh(alias, &cli.root, force, build)
        }

        Some(Commands::CleanCache { alias }) => commands::cmd_clean_cache(alias, &cli.root),

        Some(Commands::Load { alias }) => commands::cmd_load(&alias, &cli.root),

        Some(Commands::ServiceAdd {
            alias,
            url,
            service_type,
        }) => commands::cmd_service_add(&alias, &url, &cli.root, &service_type),

        Some(Commands::ServiceList) => commands::cmd_service_list(&cli.root),

        Some(Commands::ServiceRemove { alias }) => {
            commands::cmd_service_remove(&alias, &cli.root)
        }

        Some(Commands::ServiceRefresh) => commands::cmd_service_refresh(&cli.root),

        None => {
            println!("quarry v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'quarry --help' for usage information");
            Ok(())
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        let code = err
            .downcast_ref::<quarry::Error>()
            .map(quarry::Error::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}
