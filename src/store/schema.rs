//! SQLite schema for persisted searches and tasks
//!
//! Pages are stored inline on their search as a JSON array and task
//! membership as a JSON array of search ids, mirroring the in-memory shape.
//! `model_meta` holds the persisted timestamp bounds.

pub const SCHEMA: &str = r#"
-- ============================================
-- SEARCHES
-- ============================================

CREATE TABLE IF NOT EXISTS searches (
    id INTEGER PRIMARY KEY,
    task_id INTEGER,
    timestamp INTEGER NOT NULL,            -- ms since epoch
    text TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL DEFAULT '',
    is_query INTEGER NOT NULL DEFAULT 0,
    search_engine TEXT NOT NULL DEFAULT '',
    last_access INTEGER NOT NULL,
    pages TEXT NOT NULL DEFAULT '[]'       -- JSON array of pages
);

CREATE INDEX IF NOT EXISTS idx_searches_task ON searches(task_id);
CREATE INDEX IF NOT EXISTS idx_searches_timestamp ON searches(timestamp);

-- ============================================
-- TASKS
-- ============================================

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY,
    display_name TEXT NOT NULL DEFAULT '',
    start_timestamp INTEGER,
    end_timestamp INTEGER,
    search_ids TEXT NOT NULL DEFAULT '[]'  -- JSON array, ascending
);

CREATE INDEX IF NOT EXISTS idx_tasks_end ON tasks(end_timestamp);

-- ============================================
-- MODEL STATE
-- ============================================

-- 'max_timestamp' / 'min_timestamp' of processed events
CREATE TABLE IF NOT EXISTS model_meta (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
"#;
