//! Related command implementation

use anyhow::Result;

use super::truncate;
use crate::config::Config;
use crate::identify::rank_tasks_for_search;
use crate::model::{SearchGraph, SearchId};
use crate::store::{SqliteStore, Storage};

pub fn run(
    store: &mut SqliteStore,
    config: &Config,
    search_id: SearchId,
    limit: usize,
) -> Result<()> {
    let state = store.load_searches_and_tasks()?;
    let graph = SearchGraph::restore(state.searches, state.tasks);
    let classifier = config.classifier();

    let Some(search) = graph.search(search_id) else {
        println!("Search '{}' not found.", search_id);
        return Ok(());
    };
    println!("Tasks related to #{} \"{}\"", search.id, truncate(search.text(), 50));
    println!("{:<8} {:<8} {}", "Task", "Score", "Name");
    println!("{}", "-".repeat(60));

    let ranked = rank_tasks_for_search(&classifier, &graph, search_id)?;
    for (task_id, score) in ranked.iter().rev().take(limit) {
        let marker = if *score >= classifier.same_task_threshold() {
            "*"
        } else if *score >= classifier.related_threshold() {
            "~"
        } else {
            " "
        };
        println!(
            "{:<8} {:<8.4} {} {}",
            task_id,
            score,
            marker,
            truncate(graph.task_name(*task_id).unwrap_or("-"), 40)
        );
    }

    Ok(())
}
