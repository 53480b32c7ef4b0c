//! CLI command implementations.
//!
//! | Module   | Commands handled                                               |
//! |----------|----------------------------------------------------------------|
//! | `board`  | `Boards`, `Show`, `CreateBoard`, `RenameBoard`, `Switch`, `DeleteBoard` |
//! | `task`   | `AddTask`, `MoveTask`, `DeleteTask`, `AddColumn`               |
//! | `config` | `Config`                                                       |

pub mod board;
pub mod config;
pub mod task;

pub use board::{
    cmd_boards, cmd_create_board, cmd_delete_board, cmd_rename_board, cmd_show, cmd_switch,
};
pub use config::cmd_config;
pub use task::{cmd_add_column, cmd_add_task, cmd_delete_task, cmd_move_task};

use anyhow::{Context, Result, bail};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use boardsync::config::SyncConfig;
use boardsync::sync::client_state::ClientState;
use boardsync::sync::{Board, BoardClient, Column, SqliteGateway, Task};

use super::Cli;

pub fn load_config(cli: &Cli, project_dir: &Path) -> Result<SyncConfig> {
    let config = SyncConfig::with_cli_args(
        project_dir,
        cli.account.clone(),
        cli.db.clone(),
        cli.state.clone(),
    )?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    Ok(config)
}

/// Open the stores, then bootstrap the account's active board.
pub async fn open_client(config: &SyncConfig) -> Result<BoardClient> {
    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let gateway = SqliteGateway::open(&db_path, config.feed_capacity())?;
    let state = ClientState::open(&config.state_path())?;
    let mut client = BoardClient::new(Arc::new(gateway), Arc::new(state), config);
    client
        .session
        .bootstrap()
        .await
        .context("Failed to open the active board")?;
    Ok(client)
}

/// Match `needle` against an id, a unique id prefix, or a name.
fn resolve<'a, T>(
    kind: &str,
    needle: &str,
    items: &'a [T],
    id: impl Fn(&T) -> Uuid,
    name: impl Fn(&T) -> &str,
) -> Result<&'a T> {
    if let Ok(exact) = Uuid::parse_str(needle) {
        if let Some(item) = items.iter().find(|i| id(*i) == exact) {
            return Ok(item);
        }
    }
    let by_name: Vec<&T> = items
        .iter()
        .filter(|i| name(*i).eq_ignore_ascii_case(needle))
        .collect();
    if let [item] = by_name.as_slice() {
        return Ok(*item);
    }
    let needle_lower = needle.to_ascii_lowercase();
    let by_prefix: Vec<&T> = items
        .iter()
        .filter(|i| id(*i).to_string().starts_with(&needle_lower))
        .collect();
    match by_prefix.as_slice() {
        [item] => Ok(*item),
        [] if by_name.is_empty() => bail!("No {} matches '{}'", kind, needle),
        _ => bail!("'{}' matches more than one {}; use its id", needle, kind),
    }
}

pub fn resolve_board<'a>(boards: &'a [Board], needle: &str) -> Result<&'a Board> {
    resolve("board", needle, boards, |b| b.id, |b| b.name.as_str())
}

pub fn resolve_column<'a>(columns: &'a [Column], needle: &str) -> Result<&'a Column> {
    resolve("column", needle, columns, |c| c.id, |c| c.title.as_str())
}

pub fn resolve_task<'a>(tasks: &'a [Task], needle: &str) -> Result<&'a Task> {
    resolve("task", needle, tasks, |t| t.id, |t| t.title.as_str())
}
