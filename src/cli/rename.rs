//! Rename command implementation

use anyhow::Result;

use crate::model::TaskId;
use crate::store::SqliteStore;

pub fn run(store: &SqliteStore, task_id: TaskId, name: &str) -> Result<()> {
    if !store.rename_task(task_id, name)? {
        anyhow::bail!("Task not found: {}", task_id);
    }
    println!("Task {} renamed to '{}'", task_id, name);
    Ok(())
}
