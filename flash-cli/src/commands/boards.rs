//! Boards command - list the daemon's board catalog.

use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};

use crate::client::{Board, FlashClient};

#[derive(Tabled)]
struct BoardRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Platform")]
    url: String,
}

impl From<Board> for BoardRow {
    fn from(board: Board) -> Self {
        Self {
            id: board.id,
            name: board.name,
            url: board.url.unwrap_or_default(),
        }
    }
}

pub async fn run(client: &FlashClient, json: bool) -> Result<()> {
    let boards = client.boards().await?;

    if json {
        let ids: Vec<serde_json::Value> = boards
            .iter()
            .map(|b| serde_json::json!({ "id": b.id, "name": b.name, "url": b.url }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&ids)?);
        return Ok(());
    }

    let rows: Vec<BoardRow> = boards.into_iter().map(BoardRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
    Ok(())
}
