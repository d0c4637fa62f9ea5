use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "emerge")]
#[command(about = "Emerge - turn habits into XP, levels and a growing world")]
#[command(version)]
struct Cli {
    /// Path to the SQLite database (defaults to [store].path or ~/.emerge/progression.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to the config file (defaults to .emerge/config.toml, then ~/.emerge/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Keep state in memory only (nothing is persisted)
    #[arg(long, global = true)]
    memory: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a stream of JSON-lines activity events ("-" for stdin)
    Apply {
        input: PathBuf,

        /// Append progression events to this JSON-lines file
        #[arg(long)]
        outbox: Option<PathBuf>,

        /// Print the dispatch report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record a single activity for a user
    Record {
        #[arg(long)]
        user: String,

        /// habit_completion, joined_challenge, joined_tribe or reflection_saved
        #[arg(long = "type")]
        activity_type: String,

        #[arg(long)]
        difficulty: Option<String>,

        #[arg(long)]
        attribute: Option<String>,

        #[arg(long)]
        habit: Option<String>,

        /// Current streak of the habit in days
        #[arg(long)]
        streak_day: Option<u32>,

        /// Idempotency key (defaults to a fresh UUID)
        #[arg(long)]
        event_id: Option<String>,
    },

    /// Show a user's progression and world
    Show {
        user: String,

        #[arg(long)]
        json: bool,
    },

    /// Show a motivational insight for a user
    Insight { user: String },

    /// Write a default configuration file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let open = || cli::AppContext::open(cli.config.as_deref(), cli.db.as_deref(), cli.memory);

    match cli.command {
        Commands::Apply {
            input,
            outbox,
            json,
        } => {
            cli::apply::apply_command(&open()?, &input, outbox, json).await?;
        }
        Commands::Record {
            user,
            activity_type,
            difficulty,
            attribute,
            habit,
            streak_day,
            event_id,
        } => {
            let args = cli::record::RecordArgs {
                user,
                activity_type,
                difficulty,
                attribute,
                habit,
                streak_day,
                event_id,
            };
            cli::record::record_command(&open()?, args).await?;
        }
        Commands::Show { user, json } => {
            cli::show::show_command(&open()?, &user, json)?;
        }
        Commands::Insight { user } => {
            cli::show::insight_command(&open()?, &user)?;
        }
        Commands::Init { force } => {
            cli::init::init_command(cli.config.as_deref(), force)?;
        }
    }

    Ok(())
}
