//! The search model: raw events in, searches and tasks out
//!
//! [`SearchModel`] is synchronous and owns all mutable model state. While a
//! lock is held (initialization, or a save in flight) live events go to an
//! overflow queue and are applied later in arrival order. Historical replay
//! and queue draining pass `override_lock` to bypass the check.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, error, warn};

use super::blacklist::Blacklist;
use super::event::{LinkClicked, PageBlurred, PageFocused, PageLoaded, QueryEntered, RawEvent};
use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::Result;
use crate::identify::{identify_related_tasks, rank_tasks_for_search};
use crate::model::url::{same_day, serp_key};
use crate::model::{
    NewSearch, Page, PageUpdate, RecentSearches, Search, SearchGraph, SearchId, TaskAssignment,
    TaskId, Timestamp,
};
use crate::notify::{ModelEvent, Notifier};
use crate::store::{ChangeSet, StoredState, UpdatingLock};

/// Called once the event it was queued with has been applied
pub type Continuation = Box<dyn FnOnce() + Send>;

struct PendingEvent {
    event: RawEvent,
    done: Option<Continuation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    BlacklistedUrl,
    BlacklistedQuery,
    /// Click source, focus or blur target is not attributed to any search
    Untracked,
}

/// What applying one event did to the model
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    SearchCreated {
        search_id: SearchId,
        assignment: TaskAssignment,
    },
    PageAdded {
        search_id: SearchId,
    },
    PageUpdated {
        search_id: SearchId,
    },
    ClickRecorded {
        search_id: SearchId,
    },
    Focused {
        search_id: SearchId,
    },
    Blurred {
        search_id: SearchId,
    },
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Applied(EventOutcome),
    Queued,
}

#[derive(Debug, Clone)]
struct FocusedPage {
    url: String,
    search_id: SearchId,
    since: Timestamp,
}

/// Point-in-time copy of the model for readers outside the worker
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    pub graph: SearchGraph,
    /// Search ids in creation order, oldest first
    pub chronological: Vec<SearchId>,
    /// Most recently accessed search ids, most recent first
    pub recent: Vec<SearchId>,
    pub initialized: bool,
    pub max_timestamp: Option<Timestamp>,
    pub min_timestamp: Option<Timestamp>,
}

pub struct SearchModel {
    classifier: Classifier,
    blacklist: Blacklist,
    graph: SearchGraph,
    chronological: Vec<SearchId>,
    recent: RecentSearches,
    page_lookup: HashMap<String, SearchId>,
    most_recent_click: Option<SearchId>,
    focused: Option<FocusedPage>,
    initialization_lock: bool,
    updating_lock: UpdatingLock,
    overflow: VecDeque<PendingEvent>,
    max_timestamp: Option<Timestamp>,
    min_timestamp: Option<Timestamp>,
    notifier: Notifier,
}

impl SearchModel {
    /// A new, empty model. It starts under the initialization lock.
    pub fn new(
        classifier: Classifier,
        blacklist: Blacklist,
        recent_capacity: usize,
        notifier: Notifier,
        updating_lock: UpdatingLock,
    ) -> Self {
        Self {
            classifier,
            blacklist,
            graph: SearchGraph::new(),
            chronological: vec![],
            recent: RecentSearches::new(recent_capacity),
            page_lookup: HashMap::new(),
            most_recent_click: None,
            focused: None,
            initialization_lock: true,
            updating_lock,
            overflow: VecDeque::new(),
            max_timestamp: None,
            min_timestamp: None,
            notifier,
        }
    }

    pub fn from_config(
        config: &Config,
        notifier: Notifier,
        updating_lock: UpdatingLock,
    ) -> Result<Self> {
        Ok(Self::new(
            config.classifier(),
            config.model.blacklist()?,
            config.model.recently_accessed_capacity,
            notifier,
            updating_lock,
        ))
    }

    /// Replace the graph with persisted state and rebuild the derived indices
    pub fn restore(&mut self, state: StoredState) {
        self.graph = SearchGraph::restore(state.searches, state.tasks);

        // Ids are handed out in creation order
        let ordered: Vec<&Search> = self.graph.searches().values().collect();
        self.chronological = ordered.iter().map(|s| s.id).collect();

        self.page_lookup.clear();
        for search in &ordered {
            self.page_lookup.insert(search.url.clone(), search.id);
            if search.is_query {
                self.page_lookup.insert(serp_key(&search.url, &search.text), search.id);
            }
            for page in &search.pages {
                self.page_lookup.insert(page.url.clone(), search.id);
            }
        }

        let mut by_access = ordered;
        by_access.sort_by_key(|s| (s.last_access, s.id));
        for search in by_access {
            self.recent.touch(search.id);
        }

        self.max_timestamp = state.max_timestamp;
        self.min_timestamp = state.min_timestamp;
    }

    // ============================================
    // LOCKING
    // ============================================

    pub fn has_initialization_lock(&self) -> bool {
        self.initialization_lock
    }

    pub fn is_locked(&self) -> bool {
        self.initialization_lock || self.updating_lock.is_held()
    }

    pub fn overflow_len(&self) -> usize {
        self.overflow.len()
    }

    /// Time of the oldest queued event that carries one
    pub fn first_queued_time(&self) -> Option<Timestamp> {
        self.overflow.iter().find_map(|p| p.event.time())
    }

    /// Release the initialization lock. Refused while events are still
    /// queued, since they must be applied before any newer live event.
    pub fn finish_initialization(&mut self) -> bool {
        if !self.overflow.is_empty() {
            return false;
        }
        if self.initialization_lock {
            self.initialization_lock = false;
            self.notifier.emit(ModelEvent::ModelInitialized);
        }
        true
    }

    // ============================================
    // EVENT INTAKE
    // ============================================

    /// Apply `event` now, or queue it behind a held lock. Once no lock is
    /// held, queued events are applied before `event`.
    pub fn submit(
        &mut self,
        event: RawEvent,
        done: Option<Continuation>,
        override_lock: bool,
    ) -> Result<Submission> {
        if !override_lock {
            if self.is_locked() {
                debug!(kind = event.kind(), "model locked; queueing event");
                self.overflow.push_back(PendingEvent { event, done });
                return Ok(Submission::Queued);
            }
            self.drain_overflow();
        }

        let outcome = self.apply(&event);
        if let Some(done) = done {
            done();
        }
        outcome.map(Submission::Applied)
    }

    /// Apply every queued event in arrival order, regardless of locks.
    /// Returns the number applied.
    pub fn drain_overflow(&mut self) -> usize {
        let mut applied = 0;
        while let Some(PendingEvent { event, done }) = self.overflow.pop_front() {
            if let Err(e) = self.apply(&event) {
                error!("Failed to apply queued {} event: {}", event.kind(), e);
            }
            if let Some(done) = done {
                done();
            }
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, event: &RawEvent) -> Result<EventOutcome> {
        let outcome = match event {
            RawEvent::QueryEntered(e) => self.query_entered(e),
            RawEvent::PageLoaded(e) => self.page_loaded(e),
            RawEvent::LinkClicked(e) => self.link_clicked(e),
            RawEvent::PageFocused(e) => self.page_focused(e),
            RawEvent::PageBlurred(e) => self.page_blurred(e),
        }?;
        debug!(kind = event.kind(), ?outcome, "applied event");
        Ok(outcome)
    }

    /// Event time, falling back to the latest time seen when it is missing
    fn resolve_time(&mut self, time: Option<Timestamp>, kind: &str) -> Timestamp {
        match time {
            Some(t) => {
                self.max_timestamp = Some(self.max_timestamp.map_or(t, |max| max.max(t)));
                self.min_timestamp = Some(self.min_timestamp.map_or(t, |min| min.min(t)));
                t
            }
            None => {
                let fallback = self.max_timestamp.unwrap_or(0);
                warn!("{} event has no valid timestamp; using {}", kind, fallback);
                fallback
            }
        }
    }

    fn notify(&self, event: ModelEvent) {
        if !self.initialization_lock {
            self.notifier.emit(event);
        }
    }

    // ============================================
    // HANDLERS
    // ============================================

    fn query_entered(&mut self, e: &QueryEntered) -> Result<EventOutcome> {
        let time = self.resolve_time(e.time, "query-entered");

        if self.blacklist.is_query_blacklisted(&e.query, &e.url) {
            return Ok(EventOutcome::Ignored(IgnoreReason::BlacklistedQuery));
        }

        let search_id = self.create_search(NewSearch {
            timestamp: time,
            text: e.query.clone(),
            url: e.url.clone(),
            is_query: true,
            search_engine: e.search_engine.clone(),
        });

        self.page_lookup.insert(serp_key(&e.url, &e.query), search_id);
        self.page_lookup.insert(e.url.clone(), search_id);

        let assignment = self.identify_task(search_id)?;
        Ok(EventOutcome::SearchCreated {
            search_id,
            assignment,
        })
    }

    fn page_loaded(&mut self, e: &PageLoaded) -> Result<EventOutcome> {
        let time = self.resolve_time(e.time, "page-loaded");

        if self.blacklist.is_url_blacklisted(&e.url) {
            return Ok(EventOutcome::Ignored(IgnoreReason::BlacklistedUrl));
        }

        let candidate = match self.most_recent_click.take() {
            Some(clicked) => {
                self.page_lookup.insert(e.url.clone(), clicked);
                Some(clicked)
            }
            None => self.page_lookup.get(&e.url).copied(),
        };

        let existing = candidate.filter(|&id| {
            self.graph
                .search(id)
                .map_or(false, |s| same_day(s.timestamp, time))
        });

        let loaded = Page::loaded(&e.url, time, &e.title, &e.favicon);

        let Some(search_id) = existing else {
            let search_id = self.create_search(NewSearch {
                timestamp: time,
                text: e.title.clone(),
                url: e.url.clone(),
                is_query: false,
                search_engine: String::new(),
            });
            self.page_lookup.insert(e.url.clone(), search_id);
            if let Some(search) = self.graph.search_mut(search_id) {
                search.add_page(loaded);
            }
            self.notify(ModelEvent::NewPage {
                search_id,
                url: e.url.clone(),
            });

            let assignment = self.identify_task(search_id)?;
            return Ok(EventOutcome::SearchCreated {
                search_id,
                assignment,
            });
        };

        let Some(search) = self.graph.search_mut(search_id) else {
            return Ok(EventOutcome::Ignored(IgnoreReason::Untracked));
        };

        // A click stub has no initial access yet and is filled in; a page
        // that was already loaded gets a fresh entry.
        let is_stub = search
            .page(&e.url)
            .map_or(false, |page| page.initial_access.is_none());

        let outcome = if is_stub {
            search.update_page(
                &e.url,
                PageUpdate {
                    title: Some(e.title.clone()),
                    favicon: Some(e.favicon.clone()),
                    initial_access: Some(time),
                    last_access: Some(time),
                    ..Default::default()
                },
            );
            self.notify(ModelEvent::UpdatedPage {
                search_id,
                url: e.url.clone(),
                updated: vec![
                    "initial_access".to_string(),
                    "title".to_string(),
                    "favicon".to_string(),
                ],
            });
            EventOutcome::PageUpdated { search_id }
        } else {
            search.add_page(loaded);
            self.notify(ModelEvent::NewPage {
                search_id,
                url: e.url.clone(),
            });
            EventOutcome::PageAdded { search_id }
        };

        self.recent.touch(search_id);
        Ok(outcome)
    }

    fn link_clicked(&mut self, e: &LinkClicked) -> Result<EventOutcome> {
        self.resolve_time(e.time, "link-clicked");

        let source = if e.is_serp {
            serp_key(&e.url, &e.query)
        } else {
            e.url.clone()
        };

        let Some(&search_id) = self.page_lookup.get(&source) else {
            return Ok(EventOutcome::Ignored(IgnoreReason::Untracked));
        };
        let Some(search) = self.graph.search_mut(search_id) else {
            return Ok(EventOutcome::Ignored(IgnoreReason::Untracked));
        };

        search.add_page(Page::click_stub(&e.target_url, e.is_serp));
        self.page_lookup.insert(e.target_url.clone(), search_id);
        self.most_recent_click = Some(search_id);

        self.notify(ModelEvent::NewPage {
            search_id,
            url: e.target_url.clone(),
        });
        Ok(EventOutcome::ClickRecorded { search_id })
    }

    fn page_focused(&mut self, e: &PageFocused) -> Result<EventOutcome> {
        let time = self.resolve_time(e.time, "page-focused");
        self.finish_focus(time);

        let Some(&search_id) = self.page_lookup.get(&e.url) else {
            return Ok(EventOutcome::Ignored(IgnoreReason::Untracked));
        };

        let mut updated = vec![];
        if let Some(search) = self.graph.search_mut(search_id) {
            let title = (!e.title.is_empty()).then(|| e.title.clone());
            if title.is_some() {
                updated.push("title".to_string());
            }
            let update = PageUpdate {
                title,
                last_access: Some(time),
                ..Default::default()
            };
            if search.update_page(&e.url, update) {
                updated.push("last_access".to_string());
            } else {
                updated.clear();
            }
        }

        self.focused = Some(FocusedPage {
            url: e.url.clone(),
            search_id,
            since: time,
        });
        self.recent.touch(search_id);
        self.notify(ModelEvent::UpdatedPage {
            search_id,
            url: e.url.clone(),
            updated,
        });
        Ok(EventOutcome::Focused { search_id })
    }

    fn page_blurred(&mut self, e: &PageBlurred) -> Result<EventOutcome> {
        let time = self.resolve_time(e.time, "page-blurred");

        Ok(match self.finish_focus(time) {
            Some(search_id) => EventOutcome::Blurred { search_id },
            None => EventOutcome::Ignored(IgnoreReason::Untracked),
        })
    }

    /// Add the time since focus to the focused page's dwell time and clear
    /// the focus pointer. Returns the search that held focus.
    fn finish_focus(&mut self, now: Timestamp) -> Option<SearchId> {
        let focused = self.focused.take()?;
        let search = self.graph.search_mut(focused.search_id)?;
        let dwell = search.page(&focused.url)?.dwell_time + (now - focused.since).max(0);

        search.update_page(
            &focused.url,
            PageUpdate {
                dwell_time: Some(dwell),
                ..Default::default()
            },
        );
        self.notify(ModelEvent::UpdatedPage {
            search_id: focused.search_id,
            url: focused.url,
            updated: vec!["dwell_time".to_string()],
        });
        Some(focused.search_id)
    }

    // ============================================
    // GRAPH UPDATES
    // ============================================

    fn create_search(&mut self, data: NewSearch) -> SearchId {
        let search_id = self.graph.create_search(data);
        self.chronological.push(search_id);
        self.recent.touch(search_id);
        self.notify(ModelEvent::NewSearch { search_id });
        search_id
    }

    fn identify_task(&mut self, search_id: SearchId) -> Result<TaskAssignment> {
        let related = match self.graph.search(search_id) {
            Some(search) => identify_related_tasks(
                &self.classifier,
                search,
                self.graph.tasks(),
                self.graph.searches(),
            ),
            None => vec![],
        };

        let assignment = self.graph.assign(search_id, &related)?;
        match &assignment {
            TaskAssignment::Created(task_id) => {
                self.notify(ModelEvent::NewTask { task_id: *task_id });
            }
            TaskAssignment::Joined(task_id) => {
                self.notify(ModelEvent::UpdatedTask { task_id: *task_id });
            }
            TaskAssignment::Merged { primary, absorbed } => {
                for task_id in absorbed {
                    self.notify(ModelEvent::DeletedTask {
                        task_id: *task_id,
                        merged_with: *primary,
                    });
                }
                self.notify(ModelEvent::UpdatedTask { task_id: *primary });
            }
        }
        Ok(assignment)
    }

    // ============================================
    // QUERIES
    // ============================================

    pub fn graph(&self) -> &SearchGraph {
        &self.graph
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Search ids in creation order, oldest first
    pub fn chronological(&self) -> &[SearchId] {
        &self.chronological
    }

    /// Up to `n` most recently accessed search ids, most recent first
    pub fn current_searches(&self, n: usize) -> Vec<SearchId> {
        self.recent.current(n)
    }

    /// Search that a URL is currently attributed to
    pub fn lookup(&self, url: &str) -> Option<SearchId> {
        self.page_lookup.get(url).copied()
    }

    pub fn related_tasks(&self, search_id: SearchId) -> Result<Vec<(TaskId, f64)>> {
        rank_tasks_for_search(&self.classifier, &self.graph, search_id)
    }

    pub fn max_timestamp(&self) -> Option<Timestamp> {
        self.max_timestamp
    }

    pub fn min_timestamp(&self) -> Option<Timestamp> {
        self.min_timestamp
    }

    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            graph: self.graph.clone(),
            chronological: self.chronological.clone(),
            recent: self.recent.current(self.recent.capacity()),
            initialized: !self.initialization_lock,
            max_timestamp: self.max_timestamp,
            min_timestamp: self.min_timestamp,
        }
    }

    // ============================================
    // PERSISTENCE
    // ============================================

    /// Drain dirty entities and the current time bounds for a save
    pub fn take_changes(&mut self) -> ChangeSet {
        ChangeSet {
            graph: self.graph.take_changes(),
            max_timestamp: self.max_timestamp,
            min_timestamp: self.min_timestamp,
        }
    }

    /// Re-mark entities from a failed save as dirty
    pub fn restore_changes(&mut self, changes: &ChangeSet) {
        self.graph.restore_changes(&changes.graph);
    }
}
