//! Ingest command implementation

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::config::Config;
use crate::ingest::{JsonlActivityLog, ModelRuntime, RawEvent};
use crate::store::SqliteStore;

pub async fn run(config: &Config, logs: &[String], stdin: bool) -> Result<()> {
    let db_path = config.database_path();
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let log = JsonlActivityLog::from_patterns(logs).context("Failed to resolve activity logs")?;
    let files = log.paths().len();

    let handle = ModelRuntime::spawn(config, Box::new(store), Box::new(log))?;
    handle
        .wait_initialized()
        .await
        .context("Refusing to ingest without the stored model")?;

    let mut submitted = 0usize;
    if stdin {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut line_number = 0usize;
        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawEvent>(&line) {
                Ok(event) => {
                    handle.submit(event)?;
                    submitted += 1;
                }
                Err(e) => warn!("stdin:{}: skipping undecodable event: {}", line_number, e),
            }
        }
    }

    handle.flush().await.context("Failed to save search model")?;
    let snapshot = handle.snapshot().await?;
    handle.shutdown().await?;

    println!("Activity log files: {}", files);
    if stdin {
        println!("Live events submitted: {}", submitted);
    }
    println!("Searches: {}", snapshot.graph.searches().len());
    println!("Tasks: {}", snapshot.graph.tasks().len());

    Ok(())
}
