//! Magpie CLI - queue-driven knowledge base ingestion.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Magpie - sync external integrations into your knowledge base
#[derive(Parser)]
#[command(name = "magpie")]
#[command(version)]
#[command(about = "Sync external integrations into your knowledge base", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Magpie (create config and database)
    Init,

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Manage integrations
    #[command(subcommand)]
    Integration(IntegrationCommands),

    /// Request a sync for an integration and enqueue it
    Sync {
        /// Integration ID or name
        integration: String,

        /// User the integration belongs to (default: from config)
        #[arg(short, long)]
        user: Option<String>,

        /// Message priority (normal, high)
        #[arg(short, long, default_value = "normal")]
        priority: String,

        /// Wait for the sync to finish
        #[arg(short, long)]
        wait: bool,
    },

    /// Re-enqueue an existing sync run, or all failed queue messages
    Retry {
        /// Sync run ID
        sync_id: Option<String>,

        /// Return every failed queue message to pending instead
        #[arg(long, conflicts_with = "sync_id")]
        failed: bool,

        /// User the run belongs to (default: from config)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Run the ingestion worker until interrupted
    Worker,

    /// Show queue, worker and sync status
    Status,

    /// List recent sync runs
    Runs {
        /// User to list runs for (default: from config)
        #[arg(short, long)]
        user: Option<String>,

        /// Maximum number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// List documents
    Documents {
        /// User to list documents for (default: from config)
        #[arg(short, long)]
        user: Option<String>,

        /// Only show failed documents
        #[arg(long)]
        failed: bool,

        /// Maximum number of documents to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Print the config file path
    Path,
}

#[derive(Subcommand)]
enum IntegrationCommands {
    /// Add an integration
    Add {
        /// Display name
        name: String,

        /// Integration kind (drive, sqlite, postgres, notion, slack)
        #[arg(short, long)]
        kind: String,

        /// Source path (directory for drive, database file for sqlite)
        #[arg(short, long)]
        path: Option<String>,

        /// Table whose rows become documents (sqlite only)
        #[arg(short, long)]
        table: Option<String>,

        /// Comma-separated glob patterns to ignore (drive only)
        #[arg(short, long)]
        ignore: Option<String>,

        /// Owning user (default: from config)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// List integrations
    List {
        /// User to list integrations for (default: from config)
        #[arg(short, long)]
        user: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("magpie=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("magpie=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => commands::config::show(),
            ConfigCommands::Path => commands::config::path(),
        },
        Commands::Integration(cmd) => match cmd {
            IntegrationCommands::Add {
                name,
                kind,
                path,
                table,
                ignore,
                user,
            } => commands::integration::add(&name, &kind, path, table, ignore, user),
            IntegrationCommands::List { user } => commands::integration::list(user),
        },
        Commands::Sync {
            integration,
            user,
            priority,
            wait,
        } => commands::sync::run(&integration, user, &priority, wait),
        Commands::Retry {
            sync_id,
            failed,
            user,
        } => commands::retry::run(sync_id, failed, user),
        Commands::Worker => commands::worker::run(),
        Commands::Status => commands::status::run(),
        Commands::Runs { user, limit } => commands::runs::run(user, limit),
        Commands::Documents {
            user,
            failed,
            limit,
        } => commands::documents::run(user, failed, limit),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
