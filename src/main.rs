use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use financas::core::date::parse_user_date;
use financas::core::log::init_logging;
use financas::core::{MovementType, RecordId};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Show balance and movements for a date
    Summary {
        /// Date as DD/MM/YYYY or YYYY-MM-DD, defaults to today
        #[arg(short, long, value_parser = parse_user_date)]
        date: Option<chrono::NaiveDate>,
    },
    /// Register an income or expense
    Add {
        /// Amount, a non-negative number
        #[arg(long, allow_hyphen_values = true)]
        value: String,
        /// What the movement is for
        #[arg(long)]
        description: String,
        /// receita (income) or despesa (expense)
        #[arg(short = 't', long = "type", default_value = "receita")]
        kind: MovementType,
    },
    /// Remove a movement by id
    Remove {
        id: String,
        /// Date the movement is listed under, defaults to today
        #[arg(short, long, value_parser = parse_user_date)]
        date: Option<chrono::NaiveDate>,
    },
    /// Show the signed-in user
    Profile,
}

impl From<Commands> for financas::AppCommand {
    fn from(cmd: Commands) -> financas::AppCommand {
        match cmd {
            Commands::Summary { date } => financas::AppCommand::Summary { date },
            Commands::Add {
                value,
                description,
                kind,
            } => financas::AppCommand::Add {
                value,
                description,
                kind,
            },
            Commands::Remove { id, date } => financas::AppCommand::Remove {
                id: RecordId::new(id),
                date,
            },
            Commands::Profile => financas::AppCommand::Profile,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => financas::cli::setup::setup(),
        Some(cmd) => financas::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
