//! Persistence for searches and tasks
//!
//! The model talks to storage through the [`Storage`] trait; [`SqliteStore`]
//! is the bundled implementation. A save writes one [`ChangeSet`] in a single
//! transaction while holding the store's [`UpdatingLock`], which the model
//! consults before applying live events.

mod schema;

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{GraphChanges, Page, Search, SearchId, Task, TaskId, Timestamp};

pub use schema::SCHEMA;

const MAX_TIMESTAMP_KEY: &str = "max_timestamp";
const MIN_TIMESTAMP_KEY: &str = "min_timestamp";

/// Shared flag raised while a save is in progress
#[derive(Debug, Clone, Default)]
pub struct UpdatingLock(Arc<AtomicBool>);

impl UpdatingLock {
    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise the flag until the returned guard is dropped
    pub fn acquire(&self) -> UpdatingGuard {
        self.0.store(true, Ordering::SeqCst);
        UpdatingGuard(self.clone())
    }
}

pub struct UpdatingGuard(UpdatingLock);

impl Drop for UpdatingGuard {
    fn drop(&mut self) {
        (self.0).0.store(false, Ordering::SeqCst);
    }
}

/// Everything loaded at startup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredState {
    pub searches: Vec<Search>,
    pub tasks: Vec<Task>,
    pub max_timestamp: Option<Timestamp>,
    pub min_timestamp: Option<Timestamp>,
}

impl StoredState {
    pub fn is_empty(&self) -> bool {
        self.searches.is_empty() && self.tasks.is_empty()
    }
}

/// Pending writes: changed entities plus the processed-event time bounds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub graph: GraphChanges,
    pub max_timestamp: Option<Timestamp>,
    pub min_timestamp: Option<Timestamp>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }
}

/// Storage collaborator used by the search model
pub trait Storage: Send {
    /// Create tables if needed; safe to call repeatedly
    fn init_storage(&mut self) -> Result<()>;

    fn load_searches_and_tasks(&mut self) -> Result<StoredState>;

    fn save(&mut self, changes: &ChangeSet) -> Result<()>;

    fn updating_lock(&self) -> UpdatingLock;
}

/// Row summary for task listings
#[derive(Debug, Clone)]
pub struct TaskRow {
    pub id: TaskId,
    pub display_name: String,
    pub start_timestamp: Option<Timestamp>,
    pub end_timestamp: Option<Timestamp>,
    pub search_count: usize,
}

pub struct SqliteStore {
    conn: Connection,
    lock: UpdatingLock,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let mut store = Self {
            conn,
            lock: UpdatingLock::default(),
        };
        store.init_storage()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
            lock: UpdatingLock::default(),
        };
        store.init_storage()?;
        Ok(store)
    }

    fn map_search(row: &Row) -> rusqlite::Result<(Search, String)> {
        let search = Search {
            id: row.get::<_, i64>(0)? as SearchId,
            task_id: row.get::<_, Option<i64>>(1)?.map(|id| id as TaskId),
            timestamp: row.get(2)?,
            text: row.get(3)?,
            url: row.get(4)?,
            is_query: row.get(5)?,
            search_engine: row.get(6)?,
            last_access: row.get(7)?,
            pages: vec![],
        };
        Ok((search, row.get(8)?))
    }

    fn map_task(row: &Row) -> rusqlite::Result<(Task, String)> {
        let task = Task {
            id: row.get::<_, i64>(0)? as TaskId,
            display_name: row.get(1)?,
            start_timestamp: row.get(2)?,
            end_timestamp: row.get(3)?,
            search_ids: vec![],
        };
        Ok((task, row.get(4)?))
    }

    fn decode_search((mut search, pages): (Search, String)) -> Result<Search> {
        search.pages = serde_json::from_str::<Vec<Page>>(&pages)?;
        Ok(search)
    }

    fn decode_task((mut task, ids): (Task, String)) -> Result<Task> {
        task.search_ids = serde_json::from_str(&ids)?;
        Ok(task)
    }

    fn meta(&self, key: &str) -> Result<Option<Timestamp>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM model_meta WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    // ============================================
    // QUERIES
    // ============================================

    /// Tasks ordered by most recent activity
    pub fn list_tasks(&self, limit: usize) -> Result<Vec<TaskRow>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, display_name, start_timestamp, end_timestamp, search_ids
               FROM tasks
               ORDER BY end_timestamp DESC, id DESC
               LIMIT ?"#,
        )?;

        let rows = stmt
            .query_map(params![limit as i64], Self::map_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|row| {
                let task = Self::decode_task(row)?;
                Ok(TaskRow {
                    id: task.id,
                    display_name: task.display_name,
                    start_timestamp: task.start_timestamp,
                    end_timestamp: task.end_timestamp,
                    search_count: task.search_ids.len(),
                })
            })
            .collect()
    }

    pub fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        let row = self
            .conn
            .query_row(
                r#"SELECT id, display_name, start_timestamp, end_timestamp, search_ids
                   FROM tasks WHERE id = ?"#,
                params![id as i64],
                Self::map_task,
            )
            .optional()?;

        row.map(Self::decode_task).transpose()
    }

    /// Member searches of a task in chronological order
    pub fn searches_for_task(&self, task_id: TaskId) -> Result<Vec<Search>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, task_id, timestamp, text, url, is_query, search_engine, last_access, pages
               FROM searches
               WHERE task_id = ?
               ORDER BY timestamp, id"#,
        )?;

        let rows = stmt
            .query_map(params![task_id as i64], Self::map_search)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(Self::decode_search).collect()
    }

    /// Set a task's display name. Returns false if the task does not exist.
    pub fn rename_task(&self, id: TaskId, name: &str) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE tasks SET display_name = ? WHERE id = ?",
            params![name, id as i64],
        )?;
        Ok(updated > 0)
    }
}

impl Storage for SqliteStore {
    fn init_storage(&mut self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn load_searches_and_tasks(&mut self) -> Result<StoredState> {
        let search_rows = {
            let mut stmt = self.conn.prepare(
                r#"SELECT id, task_id, timestamp, text, url, is_query, search_engine, last_access, pages
                   FROM searches ORDER BY id"#,
            )?;
            let rows = stmt
                .query_map([], Self::map_search)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut searches = Vec::with_capacity(search_rows.len());
        for row in search_rows {
            let id = row.0.id;
            match Self::decode_search(row) {
                Ok(search) => searches.push(search),
                Err(e) => warn!("Skipping search {} with unreadable pages: {}", id, e),
            }
        }

        let task_rows = {
            let mut stmt = self.conn.prepare(
                r#"SELECT id, display_name, start_timestamp, end_timestamp, search_ids
                   FROM tasks ORDER BY id"#,
            )?;
            let rows = stmt
                .query_map([], Self::map_task)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut tasks = Vec::with_capacity(task_rows.len());
        for row in task_rows {
            let id = row.0.id;
            match Self::decode_task(row) {
                Ok(task) => {
                    if let (Some(start), Some(end)) = (task.start_timestamp, task.end_timestamp) {
                        if start > end {
                            warn!("Task {} ends before it starts ({} > {})", id, start, end);
                        }
                    }
                    tasks.push(task);
                }
                Err(e) => warn!("Skipping task {} with unreadable members: {}", id, e),
            }
        }

        // Databases written before bounds were recorded fall back to task spans
        let max_timestamp = match self.meta(MAX_TIMESTAMP_KEY)? {
            Some(t) => Some(t),
            None => tasks.iter().filter_map(|t| t.end_timestamp).max(),
        };
        let min_timestamp = match self.meta(MIN_TIMESTAMP_KEY)? {
            Some(t) => Some(t),
            None => tasks.iter().filter_map(|t| t.start_timestamp).min(),
        };

        debug!(
            "Loaded {} searches and {} tasks (bounds {:?}..{:?})",
            searches.len(),
            tasks.len(),
            min_timestamp,
            max_timestamp
        );

        Ok(StoredState {
            searches,
            tasks,
            max_timestamp,
            min_timestamp,
        })
    }

    fn save(&mut self, changes: &ChangeSet) -> Result<()> {
        let _guard = self.lock.acquire();
        let tx = self.conn.transaction()?;

        for search in &changes.graph.searches {
            tx.execute(
                r#"INSERT INTO searches
                   (id, task_id, timestamp, text, url, is_query, search_engine, last_access, pages)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT(id) DO UPDATE SET
                       task_id = excluded.task_id,
                       text = excluded.text,
                       last_access = excluded.last_access,
                       pages = excluded.pages"#,
                params![
                    search.id as i64,
                    search.task_id.map(|id| id as i64),
                    search.timestamp,
                    search.text,
                    search.url,
                    search.is_query,
                    search.search_engine,
                    search.last_access,
                    serde_json::to_string(&search.pages)?,
                ],
            )?;
        }

        for task in &changes.graph.tasks {
            tx.execute(
                r#"INSERT INTO tasks (id, display_name, start_timestamp, end_timestamp, search_ids)
                   VALUES (?, ?, ?, ?, ?)
                   ON CONFLICT(id) DO UPDATE SET
                       display_name = excluded.display_name,
                       start_timestamp = excluded.start_timestamp,
                       end_timestamp = excluded.end_timestamp,
                       search_ids = excluded.search_ids"#,
                params![
                    task.id as i64,
                    task.display_name,
                    task.start_timestamp,
                    task.end_timestamp,
                    serde_json::to_string(&task.search_ids)?,
                ],
            )?;
        }

        for id in &changes.graph.deleted_tasks {
            tx.execute("DELETE FROM tasks WHERE id = ?", params![*id as i64])?;
        }

        for (key, value) in [
            (MAX_TIMESTAMP_KEY, changes.max_timestamp),
            (MIN_TIMESTAMP_KEY, changes.min_timestamp),
        ] {
            if let Some(value) = value {
                tx.execute(
                    "INSERT OR REPLACE INTO model_meta (key, value) VALUES (?, ?)",
                    params![key, value],
                )?;
            }
        }

        tx.commit()?;
        debug!(
            "Saved {} searches, {} tasks, {} deletions",
            changes.graph.searches.len(),
            changes.graph.tasks.len(),
            changes.graph.deleted_tasks.len()
        );
        Ok(())
    }

    fn updating_lock(&self) -> UpdatingLock {
        self.lock.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewSearch, SearchGraph};
    use tempfile::TempDir;

    fn sample_graph() -> SearchGraph {
        let mut graph = SearchGraph::new();
        let a = graph.create_search(NewSearch {
            timestamp: 100,
            text: "cat breeds".to_string(),
            url: "https://www.google.com/search?q=cat+breeds".to_string(),
            is_query: true,
            search_engine: "google".to_string(),
        });
        graph.assign(a, &[]).unwrap();
        graph
            .search_mut(a)
            .unwrap()
            .add_page(Page::loaded("http://cats.example/", 150, "Cats", ""));

        let b = graph.create_search(NewSearch {
            timestamp: 200,
            text: "stock market".to_string(),
            is_query: true,
            ..Default::default()
        });
        graph.assign(b, &[]).unwrap();
        graph
    }

    fn change_set(graph: &mut SearchGraph) -> ChangeSet {
        ChangeSet {
            graph: graph.take_changes(),
            max_timestamp: Some(200),
            min_timestamp: Some(100),
        }
    }

    #[test]
    fn test_save_and_load() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut graph = sample_graph();
        store.save(&change_set(&mut graph)).unwrap();

        let state = store.load_searches_and_tasks().unwrap();
        assert_eq!(state.searches.len(), 2);
        assert_eq!(state.tasks.len(), 2);
        assert_eq!(state.max_timestamp, Some(200));
        assert_eq!(state.min_timestamp, Some(100));

        let cats = &state.searches[0];
        assert_eq!(cats, graph.search(1).unwrap());
        assert_eq!(cats.pages[0].title, "Cats");
        assert_eq!(&state.tasks[0], graph.task(1).unwrap());
    }

    #[test]
    fn test_merge_deletes_absorbed_task() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut graph = sample_graph();
        store.save(&change_set(&mut graph)).unwrap();

        let c = graph.create_search(NewSearch {
            timestamp: 300,
            text: "cat stocks".to_string(),
            ..Default::default()
        });
        graph.assign(c, &[1, 2]).unwrap();
        store.save(&change_set(&mut graph)).unwrap();

        let state = store.load_searches_and_tasks().unwrap();
        assert_eq!(state.tasks.len(), 1);
        assert_eq!(state.tasks[0].search_ids, vec![1, 2, 3]);
        assert!(state.searches.iter().all(|s| s.task_id == Some(1)));
        assert_eq!(store.searches_for_task(1).unwrap().len(), 3);
    }

    #[test]
    fn test_bounds_fall_back_to_task_spans() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut graph = sample_graph();
        let mut changes = change_set(&mut graph);
        changes.max_timestamp = None;
        changes.min_timestamp = None;
        store.save(&changes).unwrap();

        let state = store.load_searches_and_tasks().unwrap();
        assert_eq!(state.max_timestamp, Some(200));
        assert_eq!(state.min_timestamp, Some(100));
    }

    #[test]
    fn test_empty_store() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let state = store.load_searches_and_tasks().unwrap();
        assert!(state.is_empty());
        assert_eq!(state.max_timestamp, None);
    }

    #[test]
    fn test_list_and_rename_tasks() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut graph = sample_graph();
        store.save(&change_set(&mut graph)).unwrap();

        let rows = store.list_tasks(10).unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(rows[1].display_name, "cat breeds");

        assert!(store.rename_task(1, "Pets").unwrap());
        assert!(!store.rename_task(42, "Nope").unwrap());
        assert_eq!(store.get_task(1).unwrap().unwrap().display_name, "Pets");
        assert!(store.get_task(42).unwrap().is_none());
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/tasktrail.db");
        let mut store = SqliteStore::open(&path).unwrap();
        assert!(path.exists());
        store.init_storage().unwrap();
    }

    #[test]
    fn test_updating_lock_guard() {
        let store = SqliteStore::open_in_memory().unwrap();
        let lock = store.updating_lock();
        assert!(!lock.is_held());
        {
            let _guard = lock.acquire();
            assert!(store.updating_lock().is_held());
        }
        assert!(!lock.is_held());
    }
}
