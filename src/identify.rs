//! Task identification and same-taskness ranking
//!
//! Identification rescans the whole graph on every call: for each task the
//! member searches are classified against the new search in stored order,
//! and the first member at or above the same-task threshold marks the task
//! as related. Cost is one classifier call per scanned member.

use std::collections::{BTreeMap, HashSet};

use crate::classifier::Classifier;
use crate::error::{Result, TaskTrailError};
use crate::model::{Search, SearchGraph, SearchId, Task, TaskId};

/// Ids of every task with at least one member that scores at or above the
/// classifier's same-task threshold against `search`, in task id order.
pub fn identify_related_tasks(
    classifier: &Classifier,
    search: &Search,
    tasks: &BTreeMap<TaskId, Task>,
    searches: &BTreeMap<SearchId, Search>,
) -> Vec<TaskId> {
    let query = search.text();
    let threshold = classifier.same_task_threshold();

    tasks
        .values()
        .filter(|task| {
            task.search_ids
                .iter()
                .filter_map(|id| searches.get(id))
                .any(|member| classifier.classify(query, member.text()) >= threshold)
        })
        .map(|task| task.id)
        .collect()
}

/// Every search other than `search`, paired with its score against it, in
/// non-decreasing score order (most similar last). Ties keep id order.
pub fn rank_searches_by_same_taskness<'a>(
    classifier: &Classifier,
    search: &Search,
    searches: &'a BTreeMap<SearchId, Search>,
) -> Vec<(&'a Search, f64)> {
    let text = search.text();
    let mut ranked: Vec<(&Search, f64)> = searches
        .values()
        .filter(|candidate| candidate.id != search.id)
        .map(|candidate| (candidate, classifier.classify(text, candidate.text())))
        .collect();

    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranked
}

/// Collapse ranked searches into ranked tasks. Each task is scored by its
/// best-scoring member; the result stays in non-decreasing score order.
pub fn rank_tasks_by_same_taskness<'a>(
    ranked_searches: &[(&Search, f64)],
    tasks: &'a BTreeMap<TaskId, Task>,
) -> Vec<(&'a Task, f64)> {
    let mut seen = HashSet::new();
    let mut ranked = vec![];

    for (search, score) in ranked_searches.iter().rev() {
        let Some(task_id) = search.task_id else {
            continue;
        };
        if !seen.insert(task_id) {
            continue;
        }
        if let Some(task) = tasks.get(&task_id) {
            ranked.push((task, *score));
        }
    }

    ranked.reverse();
    ranked
}

/// Tasks ranked against the search with `search_id`, most similar last
pub fn rank_tasks_for_search(
    classifier: &Classifier,
    graph: &SearchGraph,
    search_id: SearchId,
) -> Result<Vec<(TaskId, f64)>> {
    let search = graph
        .search(search_id)
        .ok_or(TaskTrailError::SearchNotFound(search_id))?;

    let ranked_searches = rank_searches_by_same_taskness(classifier, search, graph.searches());
    Ok(rank_tasks_by_same_taskness(&ranked_searches, graph.tasks())
        .into_iter()
        .map(|(task, score)| (task.id, score))
        .collect())
}
