//! Tasks command implementation

use anyhow::Result;

use super::{format_time, truncate};
use crate::store::SqliteStore;

pub fn run(store: &SqliteStore, limit: usize) -> Result<()> {
    let tasks = store.list_tasks(limit)?;

    if tasks.is_empty() {
        println!("No tasks found. Run 'tasktrail ingest' first.");
        return Ok(());
    }

    println!(
        "{:<8} {:<12} {:<12} {:<9} {}",
        "ID", "Start", "End", "Searches", "Name"
    );
    println!("{}", "-".repeat(80));

    for task in tasks {
        println!(
            "{:<8} {:<12} {:<12} {:<9} {}",
            task.id,
            format_time(task.start_timestamp),
            format_time(task.end_timestamp),
            task.search_count,
            truncate(&task.display_name, 40),
        );
    }

    Ok(())
}
