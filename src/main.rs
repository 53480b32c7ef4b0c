use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "boardsync")]
#[command(version, about = "Kanban board synchronization core")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Remote store database. Overrides boardsync.toml and BOARDSYNC_DB.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Client state database. Overrides boardsync.toml and BOARDSYNC_STATE.
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,

    /// Account whose boards are shown
    #[arg(long, global = true)]
    pub account: Option<String>,

    /// Directory holding .boardsync/ (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List this account's boards
    Boards,
    /// Show the active board
    Show {
        /// Print the board as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a board with the starter columns and make it active
    CreateBoard { name: String },
    RenameBoard { board: String, name: String },
    /// Make another board active
    Switch { board: String },
    /// Delete a board with all its columns and tasks
    DeleteBoard { board: String },
    /// Add a task to a column (by title or id)
    AddTask {
        column: String,
        title: String,
        /// low, medium or high
        #[arg(long, default_value = "medium")]
        priority: String,
        /// Position within the column; appended when omitted
        #[arg(long)]
        index: Option<usize>,
    },
    /// Move a task to a column at an index
    MoveTask {
        task: String,
        column: String,
        index: usize,
    },
    DeleteTask { task: String },
    /// Add a column to the active board
    AddColumn {
        title: String,
        #[arg(long)]
        index: Option<usize>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate boardsync.toml
    Validate,
    /// Write a default boardsync.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    boardsync::telemetry::init_logging(cli.verbose, cli.json_logs);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    match &cli.command {
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
        command => {
            let config = cmd::load_config(&cli, &project_dir)?;
            let mut client = cmd::open_client(&config).await?;
            match command {
                Commands::Boards => cmd::cmd_boards(&mut client).await?,
                Commands::Show { json } => cmd::cmd_show(&client, *json)?,
                Commands::CreateBoard { name } => cmd::cmd_create_board(&mut client, name).await?,
                Commands::RenameBoard { board, name } => {
                    cmd::cmd_rename_board(&mut client, board, name).await?
                }
                Commands::Switch { board } => cmd::cmd_switch(&mut client, board).await?,
                Commands::DeleteBoard { board } => cmd::cmd_delete_board(&mut client, board).await?,
                Commands::AddTask {
                    column,
                    title,
                    priority,
                    index,
                } => cmd::cmd_add_task(&client, column, title, priority, *index).await?,
                Commands::MoveTask { task, column, index } => {
                    cmd::cmd_move_task(&client, task, column, *index).await?
                }
                Commands::DeleteTask { task } => cmd::cmd_delete_task(&client, task).await?,
                Commands::AddColumn { title, index } => {
                    cmd::cmd_add_column(&client, title, *index).await?
                }
                Commands::Config { .. } => {}
            }
        }
    }

    Ok(())
}
