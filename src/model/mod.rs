//! Search, task and page entities and the id-keyed graph that holds them
//!
//! Searches and tasks reference each other only by id: a search records the
//! id of its owning task, and a task lists the ids of its member searches.
//! The [`SearchGraph`] owns both maps and is the only place task membership
//! changes, so the two sides never disagree once an operation returns.

mod recent;
pub mod url;

pub use recent::{RecentSearches, DEFAULT_RECENT_CAPACITY};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::error::{Result, TaskTrailError};

pub type SearchId = u64;
pub type TaskId = u64;
/// Milliseconds since the Unix epoch
pub type Timestamp = i64;

/// A single URL visit inside a search
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub favicon: String,
    #[serde(default)]
    pub is_serp_click: bool,
    /// Unset for click stubs whose page load has not been seen yet
    #[serde(default)]
    pub initial_access: Option<Timestamp>,
    #[serde(default)]
    pub last_access: Option<Timestamp>,
    /// Accumulated focus time in milliseconds
    #[serde(default)]
    pub dwell_time: i64,
}

impl Page {
    /// A page recorded from a link click, before the target loads
    pub fn click_stub(url: &str, is_serp_click: bool) -> Self {
        Self {
            url: url.to_string(),
            is_serp_click,
            ..Default::default()
        }
    }

    pub fn loaded(url: &str, time: Timestamp, title: &str, favicon: &str) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            favicon: favicon.to_string(),
            initial_access: Some(time),
            last_access: Some(time),
            ..Default::default()
        }
    }
}

/// Fields applied by [`Search::update_page`]; `None` leaves a field as is
#[derive(Debug, Clone, Default)]
pub struct PageUpdate {
    pub title: Option<String>,
    pub favicon: Option<String>,
    pub initial_access: Option<Timestamp>,
    pub last_access: Option<Timestamp>,
    pub dwell_time: Option<i64>,
}

/// Data needed to create a search; the graph assigns the id
#[derive(Debug, Clone, Default)]
pub struct NewSearch {
    pub timestamp: Timestamp,
    pub text: String,
    pub url: String,
    pub is_query: bool,
    pub search_engine: String,
}

/// One logical query or page visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Search {
    pub id: SearchId,
    pub timestamp: Timestamp,
    pub text: String,
    pub url: String,
    pub is_query: bool,
    #[serde(default)]
    pub search_engine: String,
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub pages: Vec<Page>,
    pub last_access: Timestamp,
}

/// Result of matching a pattern against a search and its pages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchMatch {
    pub search_matches: bool,
    pub page_matches: Vec<String>,
}

impl Search {
    fn new(id: SearchId, data: NewSearch) -> Self {
        Self {
            id,
            timestamp: data.timestamp,
            text: data.text,
            url: data.url,
            is_query: data.is_query,
            search_engine: data.search_engine,
            task_id: None,
            pages: vec![],
            last_access: data.timestamp,
        }
    }

    /// Display text, falling back to the URL for untitled page visits
    pub fn text(&self) -> &str {
        if self.text.is_empty() {
            &self.url
        } else {
            &self.text
        }
    }

    pub fn page(&self, url: &str) -> Option<&Page> {
        self.pages.iter().rev().find(|p| p.url == url)
    }

    pub fn add_page(&mut self, page: Page) {
        if let Some(access) = page.last_access {
            self.last_access = self.last_access.max(access);
        }
        self.pages.push(page);
    }

    /// Apply `update` to the most recent page with `url`.
    /// Returns false if the search has no such page.
    pub fn update_page(&mut self, url: &str, update: PageUpdate) -> bool {
        let Some(page) = self.pages.iter_mut().rev().find(|p| p.url == url) else {
            return false;
        };

        if let Some(title) = update.title {
            page.title = title;
        }
        if let Some(favicon) = update.favicon {
            page.favicon = favicon;
        }
        if let Some(initial_access) = update.initial_access {
            page.initial_access = Some(initial_access);
        }
        if let Some(last_access) = update.last_access {
            page.last_access = Some(last_access);
        }
        if let Some(dwell_time) = update.dwell_time {
            page.dwell_time = dwell_time;
        }

        if let Some(access) = page.last_access {
            self.last_access = self.last_access.max(access);
        }
        true
    }

    pub fn matches(&self, pattern: &Regex) -> SearchMatch {
        let mut summary = SearchMatch {
            search_matches: pattern.is_match(&self.text) || pattern.is_match(&self.url),
            page_matches: vec![],
        };

        for page in &self.pages {
            if pattern.is_match(&page.url) || pattern.is_match(&page.title) {
                summary.search_matches = true;
                summary.page_matches.push(page.url.clone());
            }
        }
        summary
    }
}

/// A cluster of related searches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub start_timestamp: Option<Timestamp>,
    pub end_timestamp: Option<Timestamp>,
    /// Member search ids in ascending order
    pub search_ids: Vec<SearchId>,
    #[serde(default)]
    pub display_name: String,
}

impl Task {
    fn new(id: TaskId, display_name: String) -> Self {
        Self {
            id,
            start_timestamp: None,
            end_timestamp: None,
            search_ids: vec![],
            display_name,
        }
    }

    fn extend_span(&mut self, timestamp: Timestamp) {
        self.start_timestamp = Some(self.start_timestamp.map_or(timestamp, |t| t.min(timestamp)));
        self.end_timestamp = Some(self.end_timestamp.map_or(timestamp, |t| t.max(timestamp)));
    }
}

/// How a search was placed into a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAssignment {
    /// No existing task matched; a new one was created
    Created(TaskId),
    /// Exactly one task matched
    Joined(TaskId),
    /// Several tasks matched; the first absorbed the rest
    Merged { primary: TaskId, absorbed: Vec<TaskId> },
}

impl TaskAssignment {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskAssignment::Created(id) | TaskAssignment::Joined(id) => *id,
            TaskAssignment::Merged { primary, .. } => *primary,
        }
    }
}

/// Entities changed since the last [`SearchGraph::take_changes`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphChanges {
    pub searches: Vec<Search>,
    pub tasks: Vec<Task>,
    pub deleted_tasks: Vec<TaskId>,
}

impl GraphChanges {
    pub fn is_empty(&self) -> bool {
        self.searches.is_empty() && self.tasks.is_empty() && self.deleted_tasks.is_empty()
    }
}

/// Arena of searches and tasks keyed by id
#[derive(Debug, Clone, Default)]
pub struct SearchGraph {
    searches: BTreeMap<SearchId, Search>,
    tasks: BTreeMap<TaskId, Task>,
    max_search_id: SearchId,
    max_task_id: TaskId,
    dirty_searches: BTreeSet<SearchId>,
    dirty_tasks: BTreeSet<TaskId>,
    deleted_tasks: BTreeSet<TaskId>,
}

impl SearchGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from persisted entities. Id counters resume after the
    /// largest restored ids; nothing is marked dirty.
    pub fn restore(searches: Vec<Search>, tasks: Vec<Task>) -> Self {
        let mut graph = Self::new();
        for search in searches {
            graph.max_search_id = graph.max_search_id.max(search.id);
            graph.searches.insert(search.id, search);
        }
        for task in tasks {
            graph.max_task_id = graph.max_task_id.max(task.id);
            graph.tasks.insert(task.id, task);
        }
        graph
    }

    pub fn searches(&self) -> &BTreeMap<SearchId, Search> {
        &self.searches
    }

    pub fn tasks(&self) -> &BTreeMap<TaskId, Task> {
        &self.tasks
    }

    pub fn search(&self, id: SearchId) -> Option<&Search> {
        self.searches.get(&id)
    }

    /// Mutable access; the search is marked for persistence
    pub fn search_mut(&mut self, id: SearchId) -> Option<&mut Search> {
        let search = self.searches.get_mut(&id)?;
        self.dirty_searches.insert(id);
        Some(search)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn max_search_id(&self) -> SearchId {
        self.max_search_id
    }

    pub fn max_task_id(&self) -> TaskId {
        self.max_task_id
    }

    /// Create a search with the next id. It has no task until [`Self::assign`].
    pub fn create_search(&mut self, data: NewSearch) -> SearchId {
        self.max_search_id += 1;
        let id = self.max_search_id;
        self.searches.insert(id, Search::new(id, data));
        self.dirty_searches.insert(id);
        id
    }

    /// Display name of a task, or its first member's text when unnamed
    pub fn task_name(&self, id: TaskId) -> Option<&str> {
        let task = self.tasks.get(&id)?;
        if !task.display_name.is_empty() {
            return Some(&task.display_name);
        }
        task.search_ids
            .first()
            .and_then(|sid| self.searches.get(sid))
            .map(|s| s.text())
    }

    pub fn rename_task(&mut self, id: TaskId, name: &str) -> Result<()> {
        let task = self.tasks.get_mut(&id).ok_or(TaskTrailError::TaskNotFound(id))?;
        task.display_name = name.to_string();
        self.dirty_tasks.insert(id);
        Ok(())
    }

    /// Place `search_id` according to the related tasks found for it.
    ///
    /// - no related tasks: a new task named after the lowercased search text
    /// - one: the search joins it
    /// - several: the search joins the first, which then absorbs the others;
    ///   absorbed tasks are discarded and their ids are never reused
    pub fn assign(&mut self, search_id: SearchId, related: &[TaskId]) -> Result<TaskAssignment> {
        let search = self
            .searches
            .get(&search_id)
            .ok_or(TaskTrailError::SearchNotFound(search_id))?;

        let Some((&primary, others)) = related.split_first() else {
            self.max_task_id += 1;
            let id = self.max_task_id;
            let task = Task::new(id, search.text().to_lowercase());
            self.tasks.insert(id, task);
            self.add_search_ids(id, &[search_id])?;
            debug!(search_id, task_id = id, "created task");
            return Ok(TaskAssignment::Created(id));
        };

        self.add_search_ids(primary, &[search_id])?;

        let mut absorbed = vec![];
        for &other in others {
            if other == primary || absorbed.contains(&other) {
                continue;
            }
            self.merge(primary, other)?;
            absorbed.push(other);
        }

        if absorbed.is_empty() {
            debug!(search_id, task_id = primary, "joined task");
            Ok(TaskAssignment::Joined(primary))
        } else {
            debug!(search_id, task_id = primary, ?absorbed, "merged tasks");
            Ok(TaskAssignment::Merged { primary, absorbed })
        }
    }

    /// Move every member of `absorbed` into `primary` and discard `absorbed`.
    /// Member ids with no stored search are dropped.
    fn merge(&mut self, primary: TaskId, absorbed: TaskId) -> Result<()> {
        if !self.tasks.contains_key(&primary) {
            return Err(TaskTrailError::TaskNotFound(primary));
        }
        let task = self
            .tasks
            .remove(&absorbed)
            .ok_or(TaskTrailError::TaskNotFound(absorbed))?;
        self.dirty_tasks.remove(&absorbed);
        self.deleted_tasks.insert(absorbed);

        let (members, missing): (Vec<SearchId>, Vec<SearchId>) = task
            .search_ids
            .iter()
            .copied()
            .partition(|id| self.searches.contains_key(id));
        if !missing.is_empty() {
            warn!(task_id = absorbed, ?missing, "dropping unknown members of merged task");
        }
        self.add_search_ids(primary, &members)
    }

    /// Insert ids into a task's sorted member list, skipping duplicates, and
    /// point each search at the task.
    fn add_search_ids(&mut self, task_id: TaskId, ids: &[SearchId]) -> Result<()> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(TaskTrailError::TaskNotFound(task_id))?;

        for &id in ids {
            let search = self
                .searches
                .get_mut(&id)
                .ok_or(TaskTrailError::SearchNotFound(id))?;

            if let Err(index) = task.search_ids.binary_search(&id) {
                task.search_ids.insert(index, id);
            }
            search.task_id = Some(task_id);
            task.extend_span(search.timestamp);
            self.dirty_searches.insert(id);
        }

        self.dirty_tasks.insert(task_id);
        Ok(())
    }

    /// Drain the set of changed entities for persistence
    pub fn take_changes(&mut self) -> GraphChanges {
        let searches = std::mem::take(&mut self.dirty_searches)
            .into_iter()
            .filter_map(|id| self.searches.get(&id).cloned())
            .collect();
        let tasks = std::mem::take(&mut self.dirty_tasks)
            .into_iter()
            .filter_map(|id| self.tasks.get(&id).cloned())
            .collect();
        let deleted_tasks = std::mem::take(&mut self.deleted_tasks).into_iter().collect();

        GraphChanges {
            searches,
            tasks,
            deleted_tasks,
        }
    }

    /// Put changes back after a failed save so the next flush retries them
    pub fn restore_changes(&mut self, changes: &GraphChanges) {
        self.dirty_searches.extend(changes.searches.iter().map(|s| s.id));
        self.dirty_tasks.extend(
            changes
                .tasks
                .iter()
                .map(|t| t.id)
                .filter(|id| self.tasks.contains_key(id)),
        );
        self.deleted_tasks.extend(changes.deleted_tasks.iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(text: &str, timestamp: Timestamp) -> NewSearch {
        NewSearch {
            timestamp,
            text: text.to_string(),
            url: format!("https://www.google.com/search?q={}", text),
            is_query: true,
            search_engine: "google".to_string(),
        }
    }

    #[test]
    fn test_create_search_assigns_monotonic_ids() {
        let mut graph = SearchGraph::new();
        let a = graph.create_search(query("cats", 1));
        let b = graph.create_search(query("dogs", 2));
        assert_eq!((a, b), (1, 2));
        assert_eq!(graph.max_search_id(), 2);
        assert_eq!(graph.search(a).and_then(|s| s.task_id), None);
    }

    #[test]
    fn test_assign_creates_task_named_after_search() {
        let mut graph = SearchGraph::new();
        let id = graph.create_search(query("Cat Breeds", 10));

        let outcome = graph.assign(id, &[]).unwrap();
        assert_eq!(outcome, TaskAssignment::Created(1));

        let task = graph.task(1).unwrap();
        assert_eq!(task.display_name, "cat breeds");
        assert_eq!(task.search_ids, vec![id]);
        assert_eq!(task.start_timestamp, Some(10));
        assert_eq!(graph.search(id).unwrap().task_id, Some(1));
    }

    #[test]
    fn test_assign_joins_single_task() {
        let mut graph = SearchGraph::new();
        let a = graph.create_search(query("cats", 10));
        graph.assign(a, &[]).unwrap();
        let b = graph.create_search(query("cat food", 20));

        assert_eq!(graph.assign(b, &[1]).unwrap(), TaskAssignment::Joined(1));
        let task = graph.task(1).unwrap();
        assert_eq!(task.search_ids, vec![a, b]);
        assert_eq!(task.end_timestamp, Some(20));
    }

    #[test]
    fn test_assign_merges_multiple_tasks() {
        let mut graph = SearchGraph::new();
        let a = graph.create_search(query("cats", 10));
        graph.assign(a, &[]).unwrap();
        let b = graph.create_search(query("dogs", 20));
        graph.assign(b, &[]).unwrap();
        let c = graph.create_search(query("cats and dogs", 30));

        let outcome = graph.assign(c, &[2, 1]).unwrap();
        assert_eq!(
            outcome,
            TaskAssignment::Merged {
                primary: 2,
                absorbed: vec![1]
            }
        );

        assert!(graph.task(1).is_none());
        let task = graph.task(2).unwrap();
        assert_eq!(task.search_ids, vec![a, b, c]);
        assert_eq!(task.start_timestamp, Some(10));
        for id in [a, b, c] {
            assert_eq!(graph.search(id).unwrap().task_id, Some(2));
        }

        // Discarded ids are not reused
        let d = graph.create_search(query("stocks", 40));
        assert_eq!(graph.assign(d, &[]).unwrap(), TaskAssignment::Created(3));
    }

    #[test]
    fn test_merge_drops_dangling_members() {
        let mut graph = SearchGraph::new();
        let a = graph.create_search(query("cats", 10));
        graph.assign(a, &[]).unwrap();
        let b = graph.create_search(query("dogs", 20));
        graph.assign(b, &[]).unwrap();
        let changes = graph.take_changes();

        // Task 2 lists a member whose row could not be loaded
        let mut tasks = changes.tasks;
        tasks[1].search_ids.push(99);
        let mut graph = SearchGraph::restore(changes.searches, tasks);

        let c = graph.create_search(query("cats dogs", 30));
        let outcome = graph.assign(c, &[1, 2]).unwrap();
        assert_eq!(
            outcome,
            TaskAssignment::Merged {
                primary: 1,
                absorbed: vec![2]
            }
        );

        assert_eq!(graph.task(1).unwrap().search_ids, vec![a, b, c]);
        assert_eq!(graph.search(b).unwrap().task_id, Some(1));
        assert_eq!(graph.take_changes().deleted_tasks, vec![2]);
    }

    #[test]
    fn test_assign_unknown_search() {
        let mut graph = SearchGraph::new();
        assert!(matches!(
            graph.assign(7, &[]),
            Err(TaskTrailError::SearchNotFound(7))
        ));
    }

    #[test]
    fn test_take_changes_tracks_deleted_tasks() {
        let mut graph = SearchGraph::new();
        let a = graph.create_search(query("cats", 10));
        graph.assign(a, &[]).unwrap();
        let b = graph.create_search(query("dogs", 20));
        graph.assign(b, &[]).unwrap();
        graph.take_changes();

        let c = graph.create_search(query("cats dogs", 30));
        graph.assign(c, &[1, 2]).unwrap();

        let changes = graph.take_changes();
        assert_eq!(changes.deleted_tasks, vec![2]);
        assert_eq!(changes.tasks.len(), 1);
        // The new search and the one moved over from task 2
        assert_eq!(changes.searches.iter().map(|s| s.id).collect::<Vec<_>>(), vec![b, c]);
        assert!(graph.take_changes().is_empty());
    }

    #[test]
    fn test_restore_resumes_id_counters() {
        let mut graph = SearchGraph::new();
        let a = graph.create_search(query("cats", 10));
        graph.assign(a, &[]).unwrap();
        let changes = graph.take_changes();

        let mut restored = SearchGraph::restore(changes.searches, changes.tasks);
        assert_eq!(restored.max_search_id(), 1);
        assert_eq!(restored.max_task_id(), 1);
        assert!(restored.take_changes().is_empty());
        assert_eq!(restored.create_search(query("dogs", 20)), 2);
    }

    #[test]
    fn test_search_text_falls_back_to_url() {
        let mut graph = SearchGraph::new();
        let id = graph.create_search(NewSearch {
            timestamp: 1,
            url: "http://example.org/".to_string(),
            ..Default::default()
        });
        assert_eq!(graph.search(id).unwrap().text(), "http://example.org/");
    }

    #[test]
    fn test_update_page_and_last_access() {
        let mut graph = SearchGraph::new();
        let id = graph.create_search(query("cats", 10));
        let search = graph.search_mut(id).unwrap();

        search.add_page(Page::click_stub("http://cats.example/", true));
        assert!(search.update_page(
            "http://cats.example/",
            PageUpdate {
                title: Some("Cats".to_string()),
                initial_access: Some(50),
                last_access: Some(50),
                ..Default::default()
            }
        ));
        assert!(!search.update_page("http://other.example/", PageUpdate::default()));

        let page = search.page("http://cats.example/").unwrap();
        assert_eq!(page.title, "Cats");
        assert_eq!(page.initial_access, Some(50));
        assert_eq!(search.last_access, 50);
    }

    #[test]
    fn test_search_matches_pages() {
        let mut graph = SearchGraph::new();
        let id = graph.create_search(query("cats", 10));
        let search = graph.search_mut(id).unwrap();
        search.add_page(Page::loaded("http://wiki.example/Siamese", 11, "Siamese cat", ""));

        let pattern = Regex::new("(?i)siamese").unwrap();
        let summary = search.matches(&pattern);
        assert!(summary.search_matches);
        assert_eq!(summary.page_matches, vec!["http://wiki.example/Siamese"]);

        let miss = search.matches(&Regex::new("dogs").unwrap());
        assert_eq!(miss, SearchMatch::default());
    }

    #[test]
    fn test_task_name_and_rename() {
        let mut graph = SearchGraph::new();
        let id = graph.create_search(query("Cats", 10));
        graph.assign(id, &[]).unwrap();
        assert_eq!(graph.task_name(1), Some("cats"));

        graph.rename_task(1, "Pets").unwrap();
        assert_eq!(graph.task_name(1), Some("Pets"));
        assert!(graph.rename_task(9, "x").is_err());
    }
}
