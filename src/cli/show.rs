//! Show command implementation

use anyhow::Result;

use super::{format_time, truncate};
use crate::model::TaskId;
use crate::store::SqliteStore;

pub fn run(store: &SqliteStore, task_id: TaskId) -> Result<()> {
    let task = match store.get_task(task_id)? {
        Some(t) => t,
        None => {
            println!("Task '{}' not found.", task_id);
            return Ok(());
        }
    };

    println!("\n{}", "=".repeat(80));
    println!("Task {}: {}", task.id, task.display_name);
    println!(
        "Span: {} .. {} | Searches: {}",
        format_time(task.start_timestamp),
        format_time(task.end_timestamp),
        task.search_ids.len()
    );
    println!("{}", "=".repeat(80));

    for search in store.searches_for_task(task.id)? {
        let kind = if search.is_query { "query" } else { "page" };
        println!(
            "\n[{}] {} #{} {}",
            format_time(Some(search.timestamp)),
            kind,
            search.id,
            truncate(search.text(), 60)
        );
        if !search.search_engine.is_empty() {
            println!("    engine: {}", search.search_engine);
        }

        for page in &search.pages {
            let title = if page.title.is_empty() {
                "-".to_string()
            } else {
                truncate(&page.title, 40)
            };
            let dwell = if page.dwell_time > 0 {
                format!(" ({}s)", page.dwell_time / 1000)
            } else {
                String::new()
            };
            println!("    {} {}{}", title, page.url, dwell);
        }
    }

    Ok(())
}
