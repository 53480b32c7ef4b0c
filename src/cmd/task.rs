//! Task and column commands: `boardsync add-task|move-task|delete-task|add-column`.

use anyhow::{Result, anyhow};

use boardsync::render;
use boardsync::sync::{BoardClient, Column, NewTask, Priority, Task};

use super::{resolve_column, resolve_task};

fn columns(client: &BoardClient) -> Result<Vec<Column>> {
    Ok(client
        .context()
        .read(|s| s.columns_ordered().into_iter().cloned().collect::<Vec<_>>())?)
}

fn tasks(client: &BoardClient) -> Result<Vec<Task>> {
    Ok(client
        .context()
        .read(|s| s.entities().tasks.values().cloned().collect::<Vec<_>>())?)
}

pub async fn cmd_add_task(
    client: &BoardClient,
    column: &str,
    title: &str,
    priority: &str,
    index: Option<usize>,
) -> Result<()> {
    let priority: Priority = priority.parse().map_err(|e: String| anyhow!(e))?;
    let columns = columns(client)?;
    let column = resolve_column(&columns, column)?;
    let new = NewTask {
        priority,
        ..NewTask::titled(title)
    };
    let task = client.engine.create_task(column.id, new, index).await?;
    println!(
        "Added {} to {} at position {}",
        render::short_id(task.id),
        column.title,
        task.position
    );
    Ok(())
}

pub async fn cmd_move_task(
    client: &BoardClient,
    task: &str,
    column: &str,
    index: usize,
) -> Result<()> {
    let tasks = tasks(client)?;
    let task = resolve_task(&tasks, task)?;
    let columns = columns(client)?;
    let column = resolve_column(&columns, column)?;
    let moved = client.engine.move_task(task.id, column.id, index).await?;
    println!("Moved {} to {} at position {}", moved.title, column.title, moved.position);
    Ok(())
}

pub async fn cmd_delete_task(client: &BoardClient, task: &str) -> Result<()> {
    let tasks = tasks(client)?;
    let task = resolve_task(&tasks, task)?;
    client.engine.delete_task(task.id).await?;
    println!("Deleted {}", task.title);
    Ok(())
}

pub async fn cmd_add_column(client: &BoardClient, title: &str, index: Option<usize>) -> Result<()> {
    let column = client.engine.create_column(title, index).await?;
    println!(
        "Added column {} ({}) at position {}",
        column.title,
        render::short_id(column.id),
        column.position
    );
    Ok(())
}
