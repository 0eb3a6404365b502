//! Sync orchestrator.
//!
//! The engine owns the command log and the base index. A round ships the
//! queued commands, reconciles the response against a snapshot taken when
//! the round started, then commits in one step: snapshot saved, log trimmed,
//! remaps applied. Only one round runs at a time; requests that arrive
//! meanwhile are coalesced into one follow-up round after the running one.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, Notify};
use tokio::time::{Interval, MissedTickBehavior};

use super::reconciler::{ConflictReport, FailedCommand, Reconciler};
use super::translator;
use super::transport::{FolderDirectory, SyncTransport};
use crate::assembler::TaskAssembler;
use crate::command_log::CommandLog;
use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::models::{Command, Folder, Task, TaskId, UserId};
use crate::producer::CommandSink;
use crate::projector;
use crate::services::{FolderCache, LocalSnapshot, TaskStore};
use crate::state::SyncPhase;
use crate::task_index::TaskIndex;

/// Result of a `sync_now` request
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// This call ran the round plus any follow-ups requested meanwhile
    Completed(SyncReport),
    /// Another round was in flight; one follow-up round runs after it
    Coalesced,
}

/// Summary of the rounds run by one `sync_now` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub rounds: usize,
    pub shipped: usize,
    pub acknowledged: usize,
    pub failed: Vec<FailedCommand>,
    pub remapped: usize,
    pub upserted: usize,
    pub removed: usize,
    pub discarded: usize,
    pub conflicts: Vec<ConflictReport>,
    pub cursor: Option<DateTime<Utc>>,
    pub folders_refreshed: bool,
}

impl SyncReport {
    fn absorb(&mut self, next: Self) {
        self.rounds += next.rounds;
        self.shipped += next.shipped;
        self.acknowledged += next.acknowledged;
        self.failed = next.failed;
        self.remapped += next.remapped;
        self.upserted += next.upserted;
        self.removed += next.removed;
        self.discarded += next.discarded;
        self.conflicts.extend(next.conflicts);
        self.cursor = next.cursor.or(self.cursor);
        self.folders_refreshed = next.folders_refreshed;
    }
}

/// Point-in-time view for status displays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub pending_commands: usize,
    pub persistence_degraded: bool,
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct EngineState {
    base: TaskIndex,
    last_sync: Option<DateTime<Utc>>,
    folders: FolderCache,
    last_error: Option<String>,
}

impl EngineState {
    fn snapshot(&self) -> LocalSnapshot {
        LocalSnapshot {
            tasks: self.base.to_vec(),
            last_sync: self.last_sync,
            folders: self.folders.list().to_vec(),
        }
    }
}

/// Clears the in-flight flag even when the round future is dropped
struct RoundGuard<'a> {
    in_flight: &'a AtomicBool,
    phase: &'a watch::Sender<SyncPhase>,
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        self.phase.send_if_modified(|phase| {
            if phase.is_active() {
                *phase = SyncPhase::Idle;
                true
            } else {
                false
            }
        });
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

pub struct SyncEngine<T, F, S> {
    user_id: UserId,
    transport: T,
    directory: F,
    store: S,
    assembler: TaskAssembler,
    sync_on_mutation: bool,
    // Lock order: log, then state
    log: Mutex<CommandLog>,
    state: Mutex<EngineState>,
    in_flight: AtomicBool,
    rerun: AtomicBool,
    phase: watch::Sender<SyncPhase>,
    mutated: Notify,
}

impl<T, F, S> std::fmt::Debug for SyncEngine<T, F, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("user_id", &self.user_id)
            .field("phase", &*self.phase.borrow())
            .finish_non_exhaustive()
    }
}

impl<T, F, S> SyncEngine<T, F, S>
where
    T: SyncTransport,
    F: FolderDirectory,
    S: TaskStore,
{
    /// Load the local snapshot and take ownership of `log`.
    pub async fn open(
        settings: &SyncSettings,
        log: CommandLog,
        transport: T,
        directory: F,
        store: S,
    ) -> Result<Self> {
        if log.owner() != &settings.user_id {
            return Err(Error::Validation(format!(
                "command log belongs to {}, engine user is {}",
                log.owner(),
                settings.user_id
            )));
        }

        let snapshot = store.load_snapshot().await?;
        let pending = log.pending_commands();
        let orphans = projector::find_orphans(&snapshot.tasks, &pending);
        if !orphans.is_empty() {
            tracing::warn!(
                count = orphans.len(),
                "Command log references tasks that no longer exist locally"
            );
        }

        tracing::info!(
            user_id = %settings.user_id,
            tasks = snapshot.tasks.len(),
            pending = pending.len(),
            "Sync engine ready"
        );

        let (phase, _) = watch::channel(SyncPhase::Idle);
        Ok(Self {
            user_id: settings.user_id.clone(),
            transport,
            directory,
            store,
            assembler: TaskAssembler::new(settings.utc_offset),
            sync_on_mutation: settings.sync_on_mutation,
            log: Mutex::new(log),
            state: Mutex::new(EngineState {
                base: TaskIndex::from_tasks(snapshot.tasks),
                last_sync: snapshot.last_sync,
                folders: FolderCache::from_folders(snapshot.folders),
                last_error: None,
            }),
            in_flight: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            phase,
            mutated: Notify::new(),
        })
    }

    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Queue a command. The next `tasks()` call reflects it.
    pub async fn enqueue(&self, command: Command) -> Result<()> {
        self.log.lock().await.enqueue(command)?;
        if self.sync_on_mutation {
            self.mutated.notify_one();
        }
        Ok(())
    }

    /// Visible tasks with folder names filled in from the cache
    pub async fn tasks(&self) -> Vec<Task> {
        let log = self.log.lock().await;
        let state = self.state.lock().await;
        let mut tasks = log.projected_tasks(&state.base.to_vec());
        for task in &mut tasks {
            if let Some(folder) = task.folder.as_mut() {
                if folder.name.is_none() {
                    folder.name = state
                        .folders
                        .resolve_name(&folder.id)
                        .map(ToString::to_string);
                }
            }
        }
        tasks
    }

    /// Visible task by id, following id remaps
    pub async fn task(&self, id: &TaskId) -> Option<Task> {
        let resolved = self
            .log
            .lock()
            .await
            .resolve_alias(id)
            .unwrap_or_else(|| id.clone());
        self.tasks()
            .await
            .into_iter()
            .find(|task| task.id == resolved)
    }

    pub async fn pending_commands(&self) -> Vec<Command> {
        self.log.lock().await.pending_commands()
    }

    pub async fn folders(&self) -> Vec<Folder> {
        self.state.lock().await.folders.list().to_vec()
    }

    pub async fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_sync
    }

    pub async fn status(&self) -> SyncStatus {
        let log = self.log.lock().await;
        let state = self.state.lock().await;
        SyncStatus {
            phase: *self.phase.borrow(),
            last_synced_at: state.last_sync,
            pending_commands: log.len(),
            persistence_degraded: log.is_persistence_degraded(),
            last_error: state.last_error.clone(),
        }
    }

    /// Observe phase transitions
    pub fn subscribe(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    /// Run a sync round now, or coalesce into the one already running.
    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.rerun.store(true, Ordering::SeqCst);
            tracing::debug!("Sync already in flight; request coalesced");
            return Ok(SyncOutcome::Coalesced);
        }
        let _guard = RoundGuard {
            in_flight: &self.in_flight,
            phase: &self.phase,
        };
        // This round ships everything queued so far
        self.rerun.store(false, Ordering::SeqCst);

        let mut report = match self.run_round().await {
            Ok(report) => report,
            Err(error) => {
                self.rerun.store(false, Ordering::SeqCst);
                return Err(error);
            }
        };

        while self.rerun.swap(false, Ordering::SeqCst) {
            tracing::debug!("Running coalesced follow-up round");
            report.absorb(self.run_round().await?);
        }

        Ok(SyncOutcome::Completed(report))
    }

    /// Trigger rounds on a timer and after local mutations until `shutdown`
    /// resolves. A running round is finished before the loop exits.
    pub async fn run_auto_sync(
        &self,
        interval: Option<Duration>,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);
        let mut ticker = interval.map(|period| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                () = next_tick(&mut ticker) => {}
                () = self.mutated.notified(), if self.sync_on_mutation => {
                    tracing::debug!("Local mutation triggered sync");
                }
            }

            match self.sync_now().await {
                Ok(SyncOutcome::Completed(report)) => tracing::debug!(
                    rounds = report.rounds,
                    acknowledged = report.acknowledged,
                    "Automatic sync finished"
                ),
                Ok(SyncOutcome::Coalesced) => {}
                Err(error) => tracing::warn!("Automatic sync failed: {}", error),
            }
        }
        tracing::debug!("Automatic sync stopped");
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.phase.send_replace(phase);
    }

    async fn run_round(&self) -> Result<SyncReport> {
        self.set_phase(SyncPhase::Syncing);
        match self.round().await {
            Ok(report) => {
                self.state.lock().await.last_error = None;
                self.set_phase(SyncPhase::Idle);
                Ok(report)
            }
            Err(error) => {
                tracing::warn!(
                    retryable = error.is_retryable(),
                    "Sync round failed: {}",
                    error
                );
                self.state.lock().await.last_error = Some(error.to_string());
                self.set_phase(SyncPhase::Failed);
                self.set_phase(SyncPhase::Idle);
                Err(error)
            }
        }
    }

    async fn round(&self) -> Result<SyncReport> {
        let (shipped, last_sync) = {
            let log = self.log.lock().await;
            let state = self.state.lock().await;
            (log.pending_commands(), state.last_sync)
        };

        let batch = translator::build_batch(&self.user_id, &shipped, last_sync, Utc::now());
        tracing::debug!(commands = batch.commands.len(), "Shipping sync batch");
        let response = self.transport.send_batch(&batch).await?;
        if !response.success {
            return Err(Error::ServerRejected(
                response
                    .error_message
                    .unwrap_or_else(|| "server reported failure".to_string()),
            ));
        }

        self.set_phase(SyncPhase::Reconciling);
        let mut report = {
            let mut log = self.log.lock().await;
            let mut state = self.state.lock().await;
            let reconciliation = Reconciler::new(self.assembler, &state.folders).reconcile(
                &state.base,
                &shipped,
                &response,
            )?;

            let snapshot = LocalSnapshot {
                tasks: reconciliation.tasks.to_vec(),
                last_sync: Some(reconciliation.cursor),
                folders: state.folders.list().to_vec(),
            };
            if let Err(error) = self.store.save_snapshot(&snapshot).await {
                tracing::error!("Failed to save local snapshot: {}", error);
            }

            state.base = reconciliation.tasks;
            state.last_sync = Some(reconciliation.cursor);
            for remap in &reconciliation.remaps {
                log.remap_entity(&remap.from, &remap.to);
            }
            log.remove_commands(&reconciliation.acknowledged);

            SyncReport {
                rounds: 1,
                shipped: batch.commands.len(),
                acknowledged: reconciliation.acknowledged.len(),
                failed: reconciliation.failed,
                remapped: reconciliation.remaps.len(),
                upserted: reconciliation.upserted,
                removed: reconciliation.removed,
                discarded: reconciliation.discarded,
                conflicts: reconciliation.conflicts,
                cursor: Some(reconciliation.cursor),
                folders_refreshed: false,
            }
        };

        report.folders_refreshed = self.refresh_folders().await;

        tracing::info!(
            shipped = report.shipped,
            acknowledged = report.acknowledged,
            failed = report.failed.len(),
            upserted = report.upserted,
            conflicts = report.conflicts.len(),
            "Sync round complete"
        );
        Ok(report)
    }

    /// Best-effort; never undoes the committed round
    async fn refresh_folders(&self) -> bool {
        let folders = match self.directory.list_folders(&self.user_id).await {
            Ok(folders) => folders,
            Err(error) => {
                tracing::warn!("Folder refresh failed: {}", error);
                return false;
            }
        };

        let mut state = self.state.lock().await;
        state.folders = FolderCache::from_folders(folders);
        if let Err(error) = self.store.save_snapshot(&state.snapshot()).await {
            tracing::warn!("Failed to save refreshed folders: {}", error);
        }
        true
    }
}

impl<T, F, S> CommandSink for SyncEngine<T, F, S>
where
    T: SyncTransport,
    F: FolderDirectory,
    S: TaskStore,
{
    fn owner(&self) -> &UserId {
        &self.user_id
    }

    async fn submit(&self, command: Command) -> Result<()> {
        self.enqueue(command).await
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
