use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "taskshoot-cli", version, about = "TaskShoot calendar sync CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authentication management for Google Calendar
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
    /// Run and inspect calendar synchronization
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
    /// List the calendars visible to an owner
    Calendars {
        /// Owner whose calendars to list
        #[arg(long)]
        owner: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Auth { action } => commands::auth::run(action),
        Commands::Sync { action } => commands::sync::run(action),
        Commands::Calendars { owner } => commands::calendars::run(owner),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
