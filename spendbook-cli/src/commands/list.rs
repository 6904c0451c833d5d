//! List command - stored transactions, newest first

use anyhow::Result;
use comfy_table::Cell;

use super::get_context;
use crate::output;

pub fn run(limit: Option<usize>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let transactions = ctx.status_service.list_transactions(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&transactions)?);
        return Ok(());
    }

    if transactions.is_empty() {
        println!("No transactions stored.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec![
        "ID",
        "Date",
        "Sender",
        "Receiver",
        "Description",
        "Amount",
        "Currency",
    ]);
    for tx in &transactions {
        table.add_row(vec![
            Cell::new(tx.id),
            Cell::new(tx.date),
            Cell::new(output::truncate(&tx.sender, 24)),
            Cell::new(output::truncate(&tx.receiver, 24)),
            Cell::new(output::truncate(&tx.description, 40)),
            output::amount_cell(tx.amount),
            Cell::new(&tx.currency),
        ]);
    }
    println!("{table}");
    println!("  {} transaction(s)", transactions.len());

    Ok(())
}
