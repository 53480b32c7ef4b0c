//! Board commands: `boardsync boards|show|create-board|rename-board|switch|delete-board`.

use anyhow::Result;

use boardsync::render;
use boardsync::sync::BoardClient;

use super::resolve_board;

fn print_board(client: &BoardClient) -> Result<()> {
    let view = client.view()?;
    print!("{}", render::board_view(client.session.active(), &view));
    Ok(())
}

pub async fn cmd_boards(client: &mut BoardClient) -> Result<()> {
    let boards = client.session.list_boards().await?;
    print!("{}", render::board_list(&boards, client.session.active_board()));
    Ok(())
}

pub fn cmd_show(client: &BoardClient, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&client.view()?)?);
        return Ok(());
    }
    print_board(client)
}

pub async fn cmd_create_board(client: &mut BoardClient, name: &str) -> Result<()> {
    let board = client.session.create_board(name).await?;
    println!("Created board {} ({})", board.name, render::short_id(board.id));
    print_board(client)
}

pub async fn cmd_rename_board(client: &mut BoardClient, board: &str, name: &str) -> Result<()> {
    let target = resolve_board(client.session.boards(), board)?.id;
    let board = client.session.rename_board(target, name).await?;
    println!("Renamed board {} to {}", render::short_id(board.id), board.name);
    Ok(())
}

pub async fn cmd_switch(client: &mut BoardClient, board: &str) -> Result<()> {
    let target = resolve_board(client.session.boards(), board)?.id;
    client.session.switch_board(target).await?;
    print_board(client)
}

pub async fn cmd_delete_board(client: &mut BoardClient, board: &str) -> Result<()> {
    let target = resolve_board(client.session.boards(), board)?.clone();
    let active = client.session.delete_board(target.id).await?;
    println!("Deleted board {}", target.name);
    if let Some(active) = client.session.active().filter(|b| Some(b.id) == active) {
        println!("Active board: {}", active.name);
    }
    Ok(())
}
