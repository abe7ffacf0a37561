//! End-to-end ingestion tests
//!
//! These drive the model runtime against a real SQLite file and JSONL
//! activity logs:
//! 1. Replay of a log into an empty database
//! 2. Restart replays only events newer than the persisted state
//! 3. Live events submitted after initialization are persisted
//! 4. A store that fails to load is never overwritten
//! 5. Task clustering with a custom same-task strategy

use std::io::Write;
use std::path::Path;

use tasktrail::classifier::{Classifier, SameTaskClassifier};
use tasktrail::config::Config;
use tasktrail::ingest::{
    Blacklist, EventOutcome, JsonlActivityLog, ModelRuntime, SearchModel, Submission,
};
use tasktrail::model::TaskAssignment;
use tasktrail::notify::Notifier;
use tasktrail::store::{ChangeSet, SqliteStore, Storage, StoredState, UpdatingLock};
use tasktrail::{RawEvent, TaskTrailError};
use tempfile::TempDir;

const T0: i64 = 1_700_000_000_000;

fn serp(query: &str) -> String {
    format!("https://www.google.com/search?q={}", query.replace(' ', "+"))
}

fn append_events(path: &Path, events: &[RawEvent]) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    for event in events {
        writeln!(file, "{}", serde_json::to_string(event).unwrap()).unwrap();
    }
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.database.path = dir.path().join("tasktrail.db").to_string_lossy().into_owned();
    config
}

async fn ingest(config: &Config, log_path: &Path) {
    let store = SqliteStore::open(&config.database_path()).unwrap();
    let log = JsonlActivityLog::from_paths(vec![log_path.to_path_buf()]);
    let handle = ModelRuntime::spawn(config, Box::new(store), Box::new(log)).unwrap();
    handle.wait_initialized().await.unwrap();
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_log_replay_persists_searches_pages_and_tasks() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let log_path = dir.path().join("activity.jsonl");

    append_events(
        &log_path,
        &[
            RawEvent::query(T0, "cat breeds", &serp("cat breeds"), "google"),
            RawEvent::click(
                T0 + 10,
                &serp("cat breeds"),
                "http://cats.example/",
                true,
                "cat breeds",
            ),
            RawEvent::load(T0 + 20, "http://cats.example/", "Cat Breeds A-Z"),
            RawEvent::query(T0 + 1000, "cat breeds list", &serp("cat breeds list"), "google"),
            RawEvent::query(T0 + 2000, "stock market", &serp("stock market"), "google"),
        ],
    );
    ingest(&config, &log_path).await;

    let mut store = SqliteStore::open(&config.database_path()).unwrap();
    let state = store.load_searches_and_tasks().unwrap();
    assert_eq!(state.searches.len(), 3);
    assert_eq!(state.tasks.len(), 2);
    assert_eq!(state.min_timestamp, Some(T0));
    assert_eq!(state.max_timestamp, Some(T0 + 2000));

    let cats = state.searches.iter().find(|s| s.text == "cat breeds").unwrap();
    assert_eq!(cats.pages.len(), 1);
    assert_eq!(cats.pages[0].title, "Cat Breeds A-Z");
    assert!(cats.pages[0].is_serp_click);

    let cat_task = cats.task_id.unwrap();
    let members = store.searches_for_task(cat_task).unwrap();
    let texts: Vec<&str> = members.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, vec!["cat breeds", "cat breeds list"]);
}

#[tokio::test]
async fn test_restart_replays_only_newer_events() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let log_path = dir.path().join("activity.jsonl");

    append_events(
        &log_path,
        &[
            RawEvent::query(T0, "stock market", &serp("stock market"), "google"),
            RawEvent::query(T0 + 100, "stock market news", &serp("stock market news"), "google"),
        ],
    );
    ingest(&config, &log_path).await;

    // The browser kept logging while the process was down
    append_events(
        &log_path,
        &[RawEvent::query(T0 + 5000, "cat breeds", &serp("cat breeds"), "google")],
    );
    ingest(&config, &log_path).await;

    let mut store = SqliteStore::open(&config.database_path()).unwrap();
    let state = store.load_searches_and_tasks().unwrap();
    let mut texts: Vec<&str> = state.searches.iter().map(|s| s.text.as_str()).collect();
    texts.sort();
    assert_eq!(texts, vec!["cat breeds", "stock market", "stock market news"]);
    assert_eq!(state.tasks.len(), 2);
    assert_eq!(state.max_timestamp, Some(T0 + 5000));
}

#[tokio::test]
async fn test_live_events_are_saved_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let store = SqliteStore::open(&config.database_path()).unwrap();
    let log = Vec::<RawEvent>::new();
    let handle = ModelRuntime::spawn(&config, Box::new(store), Box::new(log)).unwrap();
    handle.wait_initialized().await.unwrap();

    handle
        .submit(RawEvent::load(T0, "http://news.example/", "Morning News"))
        .unwrap();
    handle
        .submit(RawEvent::focus(T0 + 1000, "http://news.example/", "Morning News"))
        .unwrap();
    handle
        .submit_and_wait(RawEvent::blur(T0 + 4000, "http://news.example/"))
        .await
        .unwrap();
    handle.shutdown().await.unwrap();

    let store = SqliteStore::open(&config.database_path()).unwrap();
    let tasks = store.list_tasks(10).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].display_name, "morning news");

    let searches = store.searches_for_task(tasks[0].id).unwrap();
    assert_eq!(searches.len(), 1);
    assert!(!searches[0].is_query);
    assert_eq!(searches[0].pages[0].dwell_time, 3000);
}

/// SQLite store whose load fails, as when the database is busy at startup
struct UnreadableStore(SqliteStore);

impl Storage for UnreadableStore {
    fn init_storage(&mut self) -> tasktrail::Result<()> {
        self.0.init_storage()
    }

    fn load_searches_and_tasks(&mut self) -> tasktrail::Result<StoredState> {
        Err(TaskTrailError::Other("database is locked".to_string()))
    }

    fn save(&mut self, changes: &ChangeSet) -> tasktrail::Result<()> {
        self.0.save(changes)
    }

    fn updating_lock(&self) -> UpdatingLock {
        self.0.updating_lock()
    }
}

#[tokio::test]
async fn test_failed_load_leaves_stored_rows_intact() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let log_path = dir.path().join("activity.jsonl");
    append_events(
        &log_path,
        &[RawEvent::query(T0, "precious history", &serp("precious history"), "google")],
    );
    ingest(&config, &log_path).await;

    let store = UnreadableStore(SqliteStore::open(&config.database_path()).unwrap());
    let log = Vec::<RawEvent>::new();
    let handle = ModelRuntime::spawn(&config, Box::new(store), Box::new(log)).unwrap();
    assert!(matches!(
        handle.wait_initialized().await,
        Err(TaskTrailError::StorageUnavailable(_))
    ));
    handle
        .submit_and_wait(RawEvent::query(T0 + 10, "new query", &serp("new query"), "google"))
        .await
        .unwrap();
    assert!(handle.shutdown().await.is_err());

    let mut store = SqliteStore::open(&config.database_path()).unwrap();
    let state = store.load_searches_and_tasks().unwrap();
    let rows: Vec<(u64, &str)> = state.searches.iter().map(|s| (s.id, s.text.as_str())).collect();
    assert_eq!(rows, vec![(1, "precious history")]);
}

/// Scores queries sharing their first word as the same task
struct FirstWord;

impl SameTaskClassifier for FirstWord {
    fn name(&self) -> &str {
        "first-word"
    }

    fn score(&self, q1: &str, q2: &str) -> f64 {
        let first = |q: &str| q.split_whitespace().next().map(str::to_lowercase);
        if first(q1).is_some() && first(q1) == first(q2) {
            1.0
        } else {
            0.0
        }
    }
}

#[test]
fn test_custom_strategy_clusters_queries() {
    let blacklist = Blacklist::new::<&str>(&[], &[]).unwrap();
    let mut model = SearchModel::new(
        Classifier::with_strategy(Box::new(FirstWord)),
        blacklist,
        10,
        Notifier::new(16),
        UpdatingLock::default(),
    );
    model.finish_initialization();

    let mut submit = |event: RawEvent| match model.submit(event, None, false).unwrap() {
        Submission::Applied(EventOutcome::SearchCreated { assignment, .. }) => assignment,
        other => panic!("unexpected outcome {:?}", other),
    };

    let first = submit(RawEvent::query(T0, "cats", &serp("cats"), "google"));
    assert!(matches!(first, TaskAssignment::Created(_)));

    let second = submit(RawEvent::query(
        T0 + 10,
        "cats breeds",
        &serp("cats breeds"),
        "google",
    ));
    assert_eq!(second.task_id(), first.task_id());

    let third = submit(RawEvent::query(
        T0 + 20,
        "stock market",
        &serp("stock market"),
        "google",
    ));
    assert_ne!(third.task_id(), first.task_id());

    assert_eq!(model.graph().tasks().len(), 2);
    assert_eq!(model.current_searches(3), vec![3, 2, 1]);
}
