//! Single-worker ingestion runtime
//!
//! One tokio task owns the [`SearchModel`] and applies commands in the order
//! they arrive on an unbounded channel, so handlers never interleave. The
//! channel exists before initialization starts; anything sent while the
//! model is initializing lands in the overflow queue and is applied once the
//! stored state and the activity log have been caught up.
//!
//! Dirty entities are written in the background every flush interval. The
//! save runs on a blocking thread under the store's updating lock; live
//! events that arrive meanwhile are queued and drained once it completes.
//!
//! If the stored state cannot be loaded the model still runs, in memory
//! only: saves are refused so ids starting over at 1 never overwrite stored
//! rows, and [`ModelHandle::wait_initialized`] returns the load error.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::event::RawEvent;
use super::log::{ActivityLog, TimeWindow};
use super::machine::{Continuation, ModelSnapshot, SearchModel};
use crate::config::Config;
use crate::error::{Result, TaskTrailError};
use crate::model::{SearchId, TaskId};
use crate::notify::{ModelEvent, Notifier};
use crate::store::{ChangeSet, Storage};

type SharedStorage = Arc<Mutex<Box<dyn Storage>>>;

/// Initialization progress published to handles
#[derive(Debug, Clone, PartialEq)]
enum InitState {
    Pending,
    Ready,
    /// Stored state failed to load; nothing will be saved
    LoadFailed(String),
}

enum Command {
    Event {
        event: RawEvent,
        done: Option<oneshot::Sender<()>>,
    },
    CurrentSearches(usize, oneshot::Sender<Vec<SearchId>>),
    Snapshot(oneshot::Sender<ModelSnapshot>),
    RelatedTasks(SearchId, oneshot::Sender<Result<Vec<(TaskId, f64)>>>),
    Flush(oneshot::Sender<Result<()>>),
    Shutdown(oneshot::Sender<Result<()>>),
}

/// Cloneable handle to a running model worker
#[derive(Clone)]
pub struct ModelHandle {
    tx: mpsc::UnboundedSender<Command>,
    notifier: Notifier,
    initialized: watch::Receiver<InitState>,
}

impl ModelHandle {
    /// Queue a live event. Returns once it is accepted, not applied.
    pub fn submit(&self, event: RawEvent) -> Result<()> {
        self.tx
            .send(Command::Event { event, done: None })
            .map_err(|_| TaskTrailError::RuntimeClosed)
    }

    /// Queue a live event and wait until the model has applied it
    pub async fn submit_and_wait(&self, event: RawEvent) -> Result<()> {
        self.request(|tx| Command::Event {
            event,
            done: Some(tx),
        })
        .await
    }

    pub fn has_initialization_lock(&self) -> bool {
        *self.initialized.borrow() == InitState::Pending
    }

    /// Wait for initialization. Fails if the stored state could not be
    /// loaded; the model then keeps running in memory but never saves.
    pub async fn wait_initialized(&self) -> Result<()> {
        let mut initialized = self.initialized.clone();
        let state = initialized
            .wait_for(|state| *state != InitState::Pending)
            .await
            .map_err(|_| TaskTrailError::RuntimeClosed)?;
        match &*state {
            InitState::LoadFailed(error) => Err(TaskTrailError::StorageUnavailable(error.clone())),
            _ => Ok(()),
        }
    }

    /// Up to `n` most recently accessed search ids, most recent first
    pub async fn current_searches(&self, n: usize) -> Result<Vec<SearchId>> {
        self.request(|tx| Command::CurrentSearches(n, tx)).await
    }

    pub async fn snapshot(&self) -> Result<ModelSnapshot> {
        self.request(Command::Snapshot).await
    }

    /// Tasks ranked by same-taskness against a search, most similar last
    pub async fn related_tasks(&self, search_id: SearchId) -> Result<Vec<(TaskId, f64)>> {
        self.request(|tx| Command::RelatedTasks(search_id, tx)).await?
    }

    /// Save all pending changes now
    pub async fn flush(&self) -> Result<()> {
        self.request(Command::Flush).await?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.notifier.subscribe()
    }

    /// Flush and stop the worker
    pub async fn shutdown(self) -> Result<()> {
        self.request(Command::Shutdown).await?
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .map_err(|_| TaskTrailError::RuntimeClosed)?;
        rx.await.map_err(|_| TaskTrailError::RuntimeClosed)
    }
}

pub struct ModelRuntime;

impl ModelRuntime {
    /// Start the worker on the current tokio runtime
    pub fn spawn(
        config: &Config,
        storage: Box<dyn Storage>,
        log: Box<dyn ActivityLog>,
    ) -> Result<ModelHandle> {
        let notifier = Notifier::new(config.ingest.event_capacity);
        let model = SearchModel::from_config(config, notifier.clone(), storage.updating_lock())?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (initialized_tx, initialized_rx) = watch::channel(InitState::Pending);

        let worker = Worker {
            model,
            storage: Arc::new(Mutex::new(storage)),
            log,
            rx,
            notifier: notifier.clone(),
            initialized: initialized_tx,
            chunk_size: config.ingest.chunk_size,
            flush_interval: Duration::from_millis(config.ingest.flush_interval_ms.max(1)),
            deferred: vec![],
            saving: None,
            load_error: None,
        };
        tokio::spawn(worker.run());

        Ok(ModelHandle {
            tx,
            notifier,
            initialized: initialized_rx,
        })
    }
}

struct PendingSave {
    handle: JoinHandle<Result<()>>,
    changes: ChangeSet,
}

enum Flow {
    Continue,
    Stop,
}

struct Worker {
    model: SearchModel,
    storage: SharedStorage,
    log: Box<dyn ActivityLog>,
    rx: mpsc::UnboundedReceiver<Command>,
    notifier: Notifier,
    initialized: watch::Sender<InitState>,
    chunk_size: usize,
    flush_interval: Duration,
    /// Non-event commands received during initialization
    deferred: Vec<Command>,
    saving: Option<PendingSave>,
    /// Set when stored state failed to load. Saving is disabled so the
    /// store is never overwritten from an empty graph.
    load_error: Option<String>,
}

fn lock_storage(storage: &SharedStorage) -> Result<std::sync::MutexGuard<'_, Box<dyn Storage>>> {
    storage
        .lock()
        .map_err(|_| TaskTrailError::Other("storage mutex poisoned".to_string()))
}

async fn join_save(handle: &mut JoinHandle<Result<()>>) -> Result<()> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(TaskTrailError::Other(format!("save task failed: {}", e))),
    }
}

/// Resolves when the in-flight save finishes; never, if there is none
async fn wait_for_save(saving: &mut Option<PendingSave>) -> Result<()> {
    match saving {
        Some(pending) => join_save(&mut pending.handle).await,
        None => std::future::pending().await,
    }
}

fn event_continuation(done: Option<oneshot::Sender<()>>) -> Option<Continuation> {
    done.map(|tx| -> Continuation {
        Box::new(move || {
            let _ = tx.send(());
        })
    })
}

impl Worker {
    async fn run(mut self) {
        if let Flow::Stop = self.initialize().await {
            return;
        }

        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.rx.recv() => {
                    let Some(command) = command else {
                        // Every handle is gone; persist what we have
                        let _ = self.flush_now().await;
                        break;
                    };
                    if let Flow::Stop = self.handle_command(command).await {
                        break;
                    }
                }
                _ = ticker.tick(), if self.saving.is_none() => {
                    self.start_save();
                }
                result = wait_for_save(&mut self.saving) => {
                    self.finish_save(&result);
                }
            }
        }

        debug!("Model worker stopped");
    }

    // ============================================
    // INITIALIZATION
    // ============================================

    async fn initialize(&mut self) -> Flow {
        info!("Initializing search model");
        self.absorb_pending();

        let storage = self.storage.clone();
        let loaded = tokio::task::spawn_blocking(move || {
            let mut storage = lock_storage(&storage)?;
            storage.init_storage()?;
            storage.load_searches_and_tasks()
        })
        .await
        .map_err(|e| TaskTrailError::Other(format!("load task failed: {}", e)))
        .and_then(|result| result);
        self.absorb_pending();

        let has_prior_state = match loaded {
            Ok(state) => {
                let prior = !state.is_empty();
                info!(
                    "Restored {} searches and {} tasks",
                    state.searches.len(),
                    state.tasks.len()
                );
                self.model.restore(state);
                prior
            }
            Err(e) => {
                error!("Failed to load stored searches and tasks; saving disabled: {}", e);
                self.load_error = Some(e.to_string());
                false
            }
        };

        if let Err(e) = self.replay_log(has_prior_state) {
            error!("Failed to replay activity log: {}", e);
        }
        self.absorb_pending();

        // New arrivals keep landing behind the queue until it is empty
        loop {
            self.model.drain_overflow();
            self.absorb_pending();
            if self.model.finish_initialization() {
                break;
            }
        }

        match &self.load_error {
            Some(error) => {
                self.initialized
                    .send_replace(InitState::LoadFailed(error.clone()));
                self.notifier.emit(ModelEvent::StorageFailed {
                    error: error.clone(),
                });
            }
            None => {
                self.initialized.send_replace(InitState::Ready);
            }
        }
        info!(
            "Search model initialized with {} searches in {} tasks",
            self.model.graph().searches().len(),
            self.model.graph().tasks().len()
        );

        for command in std::mem::take(&mut self.deferred) {
            if let Flow::Stop = self.handle_command(command).await {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Move every command already waiting on the channel into the model:
    /// events join the overflow queue, everything else waits until
    /// initialization is over.
    fn absorb_pending(&mut self) {
        while let Ok(command) = self.rx.try_recv() {
            match command {
                Command::Event { event, done } => {
                    let done = event_continuation(done);
                    if let Err(e) = self.model.submit(event, done, false) {
                        error!("Failed to queue event: {}", e);
                    }
                }
                other => self.deferred.push(other),
            }
        }
    }

    /// Replay logged events newer than the persisted state and older than
    /// the first queued live event, oldest first.
    fn replay_log(&mut self, has_prior_state: bool) -> Result<()> {
        let window = TimeWindow::new(
            if has_prior_state {
                self.model.max_timestamp()
            } else {
                None
            },
            self.model.first_queued_time(),
        );
        debug!(?window, "Replaying activity log");

        let Worker {
            model, log, rx, deferred, chunk_size, ..
        } = self;

        let mut replayed = 0usize;
        log.read_chunks(window, false, *chunk_size, &mut |chunk| {
            for event in chunk {
                if let Err(e) = model.submit(event, None, true) {
                    warn!("Skipping replayed event: {}", e);
                }
                replayed += 1;
            }

            // Live events that arrived while this chunk was applied
            while let Ok(command) = rx.try_recv() {
                match command {
                    Command::Event { event, done } => {
                        let _ = model.submit(event, event_continuation(done), false);
                    }
                    other => deferred.push(other),
                }
            }
            ControlFlow::Continue(())
        })?;

        info!("Replayed {} logged events", replayed);
        Ok(())
    }

    // ============================================
    // ACTIVE
    // ============================================

    async fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Event { event, done } => {
                let kind = event.kind();
                if let Err(e) = self.model.submit(event, event_continuation(done), false) {
                    error!("Failed to apply {} event: {}", kind, e);
                }
            }
            Command::CurrentSearches(n, reply) => {
                let _ = reply.send(self.model.current_searches(n));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.model.snapshot());
            }
            Command::RelatedTasks(search_id, reply) => {
                let _ = reply.send(self.model.related_tasks(search_id));
            }
            Command::Flush(reply) => {
                let _ = reply.send(self.flush_now().await);
            }
            Command::Shutdown(reply) => {
                let result = self.flush_now().await;
                info!("Search model shut down");
                let _ = reply.send(result);
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    // ============================================
    // PERSISTENCE
    // ============================================

    /// Hand dirty entities to a blocking save, if there are any
    fn start_save(&mut self) {
        if self.load_error.is_some() {
            return;
        }
        let changes = self.model.take_changes();
        if changes.is_empty() {
            return;
        }

        let storage = self.storage.clone();
        let pending = changes.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let mut storage = lock_storage(&storage)?;
            storage.save(&pending)
        });

        debug!(
            "Saving {} searches and {} tasks",
            changes.graph.searches.len(),
            changes.graph.tasks.len()
        );
        self.saving = Some(PendingSave { handle, changes });
    }

    fn finish_save(&mut self, result: &Result<()>) {
        let Some(pending) = self.saving.take() else {
            return;
        };

        if let Err(e) = result {
            error!("Failed to save search model: {}", e);
            self.model.restore_changes(&pending.changes);
            self.notifier.emit(ModelEvent::StorageFailed {
                error: e.to_string(),
            });
        }

        let drained = self.model.drain_overflow();
        if drained > 0 {
            debug!("Applied {} events queued during save", drained);
        }
    }

    /// Wait out any in-flight save, then save what is still dirty
    async fn flush_now(&mut self) -> Result<()> {
        if let Some(error) = &self.load_error {
            return Err(TaskTrailError::StorageUnavailable(error.clone()));
        }
        if let Some(pending) = self.saving.as_mut() {
            let result = join_save(&mut pending.handle).await;
            self.finish_save(&result);
        }

        self.start_save();
        match self.saving.as_mut() {
            Some(pending) => {
                let result = join_save(&mut pending.handle).await;
                self.finish_save(&result);
                result
            }
            None => Ok(()),
        }
    }
}
