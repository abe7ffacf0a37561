//! Find command implementation

use anyhow::{Context, Result};
use regex::RegexBuilder;
use std::collections::BTreeMap;

use super::truncate;
use crate::model::{SearchGraph, SearchMatch, TaskId};
use crate::store::{SqliteStore, Storage};

pub fn run(store: &mut SqliteStore, pattern: &str) -> Result<()> {
    let pattern = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("Invalid pattern: {}", pattern))?;

    let state = store.load_searches_and_tasks()?;
    let graph = SearchGraph::restore(state.searches, state.tasks);

    // Group hits by task so related results print together
    let mut hits: BTreeMap<Option<TaskId>, Vec<(u64, SearchMatch)>> = BTreeMap::new();
    for search in graph.searches().values() {
        let summary = search.matches(&pattern);
        if summary.search_matches {
            hits.entry(search.task_id).or_default().push((search.id, summary));
        }
    }

    if hits.is_empty() {
        println!("No searches match '{}'.", pattern);
        return Ok(());
    }

    for (task_id, searches) in hits {
        match task_id {
            Some(id) => println!(
                "\nTask {}: {}",
                id,
                graph.task_name(id).unwrap_or("-")
            ),
            None => println!("\nUnassigned"),
        }

        for (search_id, summary) in searches {
            let text = graph.search(search_id).map(|s| s.text()).unwrap_or("-");
            println!("  #{:<6} {}", search_id, truncate(text, 60));
            for url in summary.page_matches {
                println!("           {}", url);
            }
        }
    }

    Ok(())
}
