//! Historical activity log access
//!
//! An activity log is a chronologically ordered record of raw events. The
//! model replays a window of it at startup to catch up on activity that was
//! logged but never persisted. On disk a log is one or more JSONL files,
//! optionally zstd-compressed (`.zst`), read in sorted path order.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::event::RawEvent;
use crate::error::Result;
use crate::model::Timestamp;

/// Exclusive time bounds for a log read; `None` is unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub after: Option<Timestamp>,
    pub before: Option<Timestamp>,
}

impl TimeWindow {
    pub fn new(after: Option<Timestamp>, before: Option<Timestamp>) -> Self {
        Self { after, before }
    }

    /// Events without a usable timestamp only fall inside windows that have
    /// no lower bound, so they are replayed once on a full rebuild.
    pub fn contains(&self, time: Option<Timestamp>) -> bool {
        match time {
            Some(t) => {
                self.after.map_or(true, |after| t > after)
                    && self.before.map_or(true, |before| t < before)
            }
            None => self.after.is_none(),
        }
    }
}

/// Source of historical events
pub trait ActivityLog: Send {
    /// Deliver the events inside `window` in chunks of at most `chunk_size`,
    /// newest first when `reverse` is set. Reading stops early when
    /// `on_chunk` returns `ControlFlow::Break`.
    fn read_chunks(
        &mut self,
        window: TimeWindow,
        reverse: bool,
        chunk_size: usize,
        on_chunk: &mut dyn FnMut(Vec<RawEvent>) -> ControlFlow<()>,
    ) -> Result<()>;
}

fn deliver(
    events: impl Iterator<Item = RawEvent>,
    window: TimeWindow,
    reverse: bool,
    chunk_size: usize,
    on_chunk: &mut dyn FnMut(Vec<RawEvent>) -> ControlFlow<()>,
) {
    let mut selected: Vec<RawEvent> = events.filter(|e| window.contains(e.time())).collect();
    if reverse {
        selected.reverse();
    }

    let mut selected = selected.into_iter().peekable();
    while selected.peek().is_some() {
        let chunk: Vec<RawEvent> = selected.by_ref().take(chunk_size.max(1)).collect();
        if on_chunk(chunk).is_break() {
            break;
        }
    }
}

/// In-memory log, mostly for tests and stdin ingestion
impl ActivityLog for Vec<RawEvent> {
    fn read_chunks(
        &mut self,
        window: TimeWindow,
        reverse: bool,
        chunk_size: usize,
        on_chunk: &mut dyn FnMut(Vec<RawEvent>) -> ControlFlow<()>,
    ) -> Result<()> {
        deliver(self.iter().cloned(), window, reverse, chunk_size, on_chunk);
        Ok(())
    }
}

/// Parse JSONL events from `reader`. Blank lines are skipped; lines that do
/// not decode are logged and skipped.
pub fn parse_events<R: BufRead>(reader: R, source: &str) -> Result<Vec<RawEvent>> {
    let mut events = vec![];

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<RawEvent>(&line) {
            Ok(event) => events.push(event),
            Err(e) => warn!("{}:{}: skipping undecodable event: {}", source, index + 1, e),
        }
    }

    Ok(events)
}

/// Activity log backed by JSONL files on disk
#[derive(Debug, Clone)]
pub struct JsonlActivityLog {
    paths: Vec<PathBuf>,
}

impl JsonlActivityLog {
    /// Expand glob patterns (with `~` expansion) into the sorted list of
    /// matching files. Patterns matching nothing yield an empty log.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut paths = vec![];

        for pattern in patterns {
            let expanded = shellexpand::tilde(pattern.as_ref()).into_owned();
            for entry in glob::glob(&expanded)? {
                match entry {
                    Ok(path) if path.is_file() => paths.push(path),
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unreadable log path: {}", e),
                }
            }
        }

        paths.sort();
        paths.dedup();
        debug!("Activity log spans {} file(s)", paths.len());
        Ok(Self { paths })
    }

    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn read_file(path: &Path) -> Result<Vec<RawEvent>> {
        let file = File::open(path)?;
        let source = path.display().to_string();

        if path.extension().and_then(|e| e.to_str()) == Some("zst") {
            let decoder = zstd::Decoder::new(file)?;
            parse_events(BufReader::new(decoder), &source)
        } else {
            parse_events(BufReader::new(file), &source)
        }
    }
}

impl ActivityLog for JsonlActivityLog {
    fn read_chunks(
        &mut self,
        window: TimeWindow,
        reverse: bool,
        chunk_size: usize,
        on_chunk: &mut dyn FnMut(Vec<RawEvent>) -> ControlFlow<()>,
    ) -> Result<()> {
        let mut events = vec![];
        for path in &self.paths {
            events.extend(Self::read_file(path)?);
        }
        deliver(events.into_iter(), window, reverse, chunk_size, on_chunk);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn collect(
        log: &mut dyn ActivityLog,
        window: TimeWindow,
        reverse: bool,
    ) -> Vec<Vec<Timestamp>> {
        let mut chunks = vec![];
        log.read_chunks(window, reverse, 2, &mut |chunk| {
            chunks.push(chunk.iter().filter_map(|e| e.time()).collect());
            ControlFlow::Continue(())
        })
        .unwrap();
        chunks
    }

    fn sample() -> Vec<RawEvent> {
        (1..=5).map(|t| RawEvent::blur(t, "http://a/")).collect()
    }

    #[test]
    fn test_window_bounds_are_exclusive() {
        let window = TimeWindow::new(Some(1), Some(5));
        assert!(!window.contains(Some(1)));
        assert!(window.contains(Some(2)));
        assert!(!window.contains(Some(5)));
        assert!(!window.contains(None));
        assert!(TimeWindow::default().contains(None));
    }

    #[test]
    fn test_chunks_forward_and_reverse() {
        let mut log = sample();
        assert_eq!(
            collect(&mut log, TimeWindow::default(), false),
            vec![vec![1, 2], vec![3, 4], vec![5]]
        );
        assert_eq!(
            collect(&mut log, TimeWindow::new(Some(1), None), true),
            vec![vec![5, 4], vec![3, 2]]
        );
    }

    #[test]
    fn test_break_stops_reading() {
        let mut log = sample();
        let mut seen = 0;
        log.read_chunks(TimeWindow::default(), false, 2, &mut |_| {
            seen += 1;
            ControlFlow::Break(())
        })
        .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_parse_skips_bad_lines() {
        let input = "{\"e\":\"page-blurred\",\"t\":1}\nnot json\n\n{\"e\":\"page-blurred\",\"t\":2}\n";
        let events = parse_events(input.as_bytes(), "test").unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_jsonl_files_plain_and_compressed() {
        let dir = TempDir::new().unwrap();

        let mut plain = File::create(dir.path().join("a.jsonl")).unwrap();
        writeln!(plain, "{}", serde_json::to_string(&RawEvent::blur(1, "x")).unwrap()).unwrap();
        writeln!(plain, "{}", serde_json::to_string(&RawEvent::blur(2, "x")).unwrap()).unwrap();

        let body = format!("{}\n", serde_json::to_string(&RawEvent::blur(3, "x")).unwrap());
        let compressed = zstd::encode_all(body.as_bytes(), 0).unwrap();
        std::fs::write(dir.path().join("b.jsonl.zst"), compressed).unwrap();

        let pattern = format!("{}/*.jsonl*", dir.path().display());
        let mut log = JsonlActivityLog::from_patterns(&[pattern]).unwrap();
        assert_eq!(log.paths().len(), 2);
        assert_eq!(
            collect(&mut log, TimeWindow::default(), false),
            vec![vec![1, 2], vec![3]]
        );
    }

    #[test]
    fn test_unmatched_pattern_is_empty() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/missing-*.jsonl", dir.path().display());
        let mut log = JsonlActivityLog::from_patterns(&[pattern]).unwrap();
        assert!(collect(&mut log, TimeWindow::default(), false).is_empty());
    }
}
