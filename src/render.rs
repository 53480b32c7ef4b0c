//! Plain-text rendering of boards for the terminal.

use console::style;
use uuid::Uuid;

use crate::sync::models::{Board, BoardView, Priority, Task};

/// First eight hex digits of an id; enough to address it from the CLI.
pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

fn priority_marker(priority: Priority) -> String {
    match priority {
        Priority::High => style("!!").red().bold().to_string(),
        Priority::Medium => style("! ").yellow().to_string(),
        Priority::Low => "  ".to_string(),
    }
}

fn task_line(task: &Task) -> String {
    let mut line = format!(
        "    {} {} {}",
        priority_marker(task.priority),
        style(short_id(task.id)).dim(),
        task.title
    );
    if let Some(deadline) = task.deadline {
        line.push_str(&format!(" (due {})", deadline.format("%Y-%m-%d")));
    }
    line
}

/// Render the board: each column in order with its tasks in order.
pub fn board_view(board: Option<&Board>, view: &BoardView) -> String {
    let mut out = String::new();
    match board {
        Some(board) => out.push_str(&format!("{}\n", style(&board.name).bold().cyan())),
        None => out.push_str("No active board\n"),
    }
    for column in &view.columns {
        out.push_str(&format!(
            "\n  {} {} ({})\n",
            style(&column.column.title).bold(),
            style(short_id(column.column.id)).dim(),
            column.tasks.len()
        ));
        if column.tasks.is_empty() {
            out.push_str(&format!("    {}\n", style("(empty)").dim()));
        }
        for task in &column.tasks {
            out.push_str(&task_line(task));
            out.push('\n');
        }
    }
    out
}

/// Render the board listing, marking the active board.
pub fn board_list(boards: &[Board], active: Option<Uuid>) -> String {
    if boards.is_empty() {
        return "No boards\n".to_string();
    }
    let mut out = String::new();
    for board in boards {
        let marker = if Some(board.id) == active { "*" } else { " " };
        out.push_str(&format!(
            "{} {} {}\n",
            marker,
            style(short_id(board.id)).dim(),
            board.name
        ));
    }
    out
}
