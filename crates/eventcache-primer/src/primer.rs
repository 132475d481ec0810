//! Cache primer implementation.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use eventcache_core::{BookmarkStore, EventCache, EventsResponse, PartitionId, UserId};

use crate::{
    Batch, ChatStateSnapshot, EventsSource, PrimerConfig, PrimerError, PrimerQueue, UserLoader,
};

/// Observable state of a running primer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrimerStatus {
    /// True while a drain is scheduled or running.
    pub active: bool,
    /// Batches finished since the primer was created.
    pub batches_completed: u64,
}

/// What happened to one dispatched batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub local_user_index: PartitionId,
    pub chats: usize,
    pub requests: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub new_users: usize,
    /// Chats still queued afterwards.
    pub remaining: usize,
}

/// Result of one drain step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Nothing was queued; the drain has stopped.
    Idle,
    /// A batch was sent.
    Dispatched(BatchReport),
}

/// Operations that can be sent to a spawned primer.
enum PrimerOp {
    ProcessState(Box<ChatStateSnapshot>),
    Shutdown,
}

/// Why the actor woke up.
enum Wake {
    Op(Option<PrimerOp>),
    BatchDue,
}

/// Background primer that backfills chat caches.
///
/// All scheduling state lives here and is only touched by one task at a time:
/// either a caller driving [`process_next_batch`](Self::process_next_batch)
/// directly, or the actor started by [`spawn`](Self::spawn).
pub struct CachePrimer {
    config: PrimerConfig,
    queue: PrimerQueue,
    users_loaded: HashSet<UserId>,
    job_active: bool,
    batches_completed: u64,
    source: Arc<dyn EventsSource>,
    user_loader: Arc<dyn UserLoader>,
    bookmarks: Arc<BookmarkStore>,
    cache: Option<Arc<EventCache>>,
}

impl CachePrimer {
    /// Create a new primer.
    pub fn new(
        source: Arc<dyn EventsSource>,
        user_loader: Arc<dyn UserLoader>,
        bookmarks: Arc<BookmarkStore>,
        config: PrimerConfig,
    ) -> Self {
        Self {
            queue: PrimerQueue::new(&config),
            config,
            users_loaded: HashSet::new(),
            job_active: false,
            batches_completed: 0,
            source,
            user_loader,
            bookmarks,
            cache: None,
        }
    }

    /// Write primed events into `cache`.
    pub fn with_cache(mut self, cache: Arc<EventCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Rebuild the queue from a fresh chat snapshot.
    ///
    /// Returns true if this started a new drain, in which case the caller is
    /// responsible for driving [`process_next_batch`](Self::process_next_batch).
    pub fn process_state(&mut self, snapshot: &ChatStateSnapshot) -> bool {
        let queued = self.queue.rebuild(snapshot, &self.bookmarks);
        if !self.job_active && queued > 0 {
            self.job_active = true;
            debug!(queued, "starting priming drain");
            return true;
        }
        false
    }

    /// Whether a drain is in progress.
    pub fn is_active(&self) -> bool {
        self.job_active
    }

    pub fn queue(&self) -> &PrimerQueue {
        &self.queue
    }

    pub fn bookmarks(&self) -> &Arc<BookmarkStore> {
        &self.bookmarks
    }

    /// Whether a user has already been handed to the loader.
    pub fn has_loaded_user(&self, user_id: &UserId) -> bool {
        self.users_loaded.contains(user_id)
    }

    pub fn status(&self) -> PrimerStatus {
        PrimerStatus {
            active: self.job_active,
            batches_completed: self.batches_completed,
        }
    }

    /// Send the next batch and fold its results back in.
    ///
    /// Fetch failures are logged and otherwise ignored: the affected chats keep
    /// their old bookmarks and become eligible again on the next snapshot.
    #[tracing::instrument(skip(self), fields(queued = self.queue.pending_len()))]
    pub async fn process_next_batch(&mut self) -> BatchOutcome {
        let Some(batch) = self.take_batch() else {
            return BatchOutcome::Idle;
        };

        let result = self
            .source
            .get_events_batch(&batch.local_user_index, batch.requests.clone())
            .await;

        BatchOutcome::Dispatched(self.complete_batch(batch, result))
    }

    /// Drain the queue, pausing between batches. Returns the number of
    /// batches sent.
    pub async fn run_until_idle(&mut self) -> u64 {
        let mut batches = 0;
        while self.job_active {
            match self.process_next_batch().await {
                BatchOutcome::Idle => break,
                BatchOutcome::Dispatched(_) => batches += 1,
            }
            if self.job_active {
                sleep(self.config.batch_delay()).await;
            }
        }
        batches
    }

    fn take_batch(&mut self) -> Option<Batch> {
        let batch = self.queue.next_batch();
        if batch.is_none() {
            self.queue.clear();
            if self.job_active {
                debug!("priming queue drained");
            }
            self.job_active = false;
        }
        batch
    }

    fn complete_batch(
        &mut self,
        batch: Batch,
        result: Result<Vec<EventsResponse>, PrimerError>,
    ) -> BatchReport {
        let mut succeeded = 0;
        let mut failed = 0;
        let mut new_users = Vec::new();

        match result {
            Ok(responses) => {
                if responses.len() != batch.requests.len() {
                    warn!(
                        partition = %batch.local_user_index,
                        expected = batch.requests.len(),
                        got = responses.len(),
                        "events batch returned wrong number of responses"
                    );
                }

                for (request, response) in batch.requests.iter().zip(responses) {
                    match response {
                        EventsResponse::Success(success) => {
                            succeeded += 1;
                            for user_id in success.user_ids() {
                                if self.users_loaded.insert(user_id.clone()) {
                                    new_users.push(user_id.clone());
                                }
                            }
                            if let Some(latest) = success.latest_known_update {
                                self.bookmarks.advance(&request.chat_id, latest);
                            }
                            if let Some(cache) = &self.cache {
                                cache.insert_events(&request.chat_id, success.events);
                            }
                        }
                        EventsResponse::Failure { reason } => {
                            failed += 1;
                            debug!(chat = %request.chat_id, reason = %reason, "events request failed");
                        }
                    }
                }
                failed += batch.requests.len().saturating_sub(succeeded + failed);
            }
            Err(e) => {
                failed = batch.requests.len();
                warn!(
                    partition = %batch.local_user_index,
                    requests = batch.requests.len(),
                    error = %e,
                    "events batch failed"
                );
            }
        }

        let new_user_count = new_users.len();
        if !new_users.is_empty() {
            self.user_loader.load_users(new_users);
        }

        self.queue.release(&batch);
        self.batches_completed += 1;
        if self.queue.is_empty() {
            self.job_active = false;
        }

        let report = BatchReport {
            local_user_index: batch.local_user_index,
            chats: batch.chats.len(),
            requests: batch.requests.len(),
            succeeded,
            failed,
            new_users: new_user_count,
            remaining: self.queue.pending_len(),
        };
        debug!(
            partition = %report.local_user_index,
            chats = report.chats,
            succeeded = report.succeeded,
            failed = report.failed,
            new_users = report.new_users,
            remaining = report.remaining,
            "primed batch"
        );
        report
    }

    /// Spawn the primer as a background task.
    ///
    /// Returns a handle for feeding it snapshots.
    pub fn spawn(self) -> CachePrimerHandle {
        let (op_tx, op_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(self.status());
        tokio::spawn(async move {
            self.run(op_rx, status_tx).await;
        });
        CachePrimerHandle { op_tx, status_rx }
    }

    /// Run the primer event loop until shut down or every handle is dropped.
    async fn run(
        mut self,
        mut op_rx: mpsc::UnboundedReceiver<PrimerOp>,
        status_tx: watch::Sender<PrimerStatus>,
    ) {
        info!("cache primer started");
        let mut next_batch_at: Option<Instant> = None;

        loop {
            let wake = match next_batch_at {
                Some(at) => tokio::select! {
                    op = op_rx.recv() => Wake::Op(op),
                    _ = sleep_until(at) => Wake::BatchDue,
                },
                None => Wake::Op(op_rx.recv().await),
            };

            match wake {
                Wake::BatchDue => {
                    next_batch_at = None;
                    let shutdown = self.drain_step(&mut op_rx).await;
                    status_tx.send_replace(self.status());
                    if shutdown {
                        break;
                    }
                    if self.job_active {
                        next_batch_at = Some(Instant::now() + self.config.batch_delay());
                    }
                }
                Wake::Op(Some(PrimerOp::ProcessState(snapshot))) => {
                    if self.process_state(&snapshot) {
                        next_batch_at = Some(Instant::now());
                    }
                    status_tx.send_replace(self.status());
                }
                Wake::Op(Some(PrimerOp::Shutdown)) | Wake::Op(None) => break,
            }
        }

        self.job_active = false;
        status_tx.send_replace(self.status());
        info!("cache primer stopped");
    }

    /// Run one batch, still accepting snapshots while the fetch is in flight.
    ///
    /// Returns true if a shutdown was requested meanwhile.
    async fn drain_step(&mut self, op_rx: &mut mpsc::UnboundedReceiver<PrimerOp>) -> bool {
        let Some(batch) = self.take_batch() else {
            return false;
        };

        let source = Arc::clone(&self.source);
        let partition = batch.local_user_index.clone();
        let requests = batch.requests.clone();
        let fetch = async move { source.get_events_batch(&partition, requests).await };
        tokio::pin!(fetch);

        let mut shutdown = false;
        let result = loop {
            tokio::select! {
                result = &mut fetch => break result,
                op = op_rx.recv(), if !shutdown => match op {
                    Some(PrimerOp::ProcessState(snapshot)) => {
                        self.process_state(&snapshot);
                    }
                    Some(PrimerOp::Shutdown) | None => shutdown = true,
                },
            }
        };

        self.complete_batch(batch, result);
        shutdown
    }
}

/// Handle for sending snapshots to a spawned primer.
///
/// This is cheaply cloneable and can be shared across tasks.
#[derive(Clone)]
pub struct CachePrimerHandle {
    op_tx: mpsc::UnboundedSender<PrimerOp>,
    status_rx: watch::Receiver<PrimerStatus>,
}

impl CachePrimerHandle {
    /// Hand the primer a new chat snapshot. Never blocks.
    pub fn process_state(&self, snapshot: ChatStateSnapshot) {
        if self
            .op_tx
            .send(PrimerOp::ProcessState(Box::new(snapshot)))
            .is_err()
        {
            warn!("cache primer has shut down, dropping chat state");
        }
    }

    /// Stop the primer once any in-flight batch has completed.
    pub fn shutdown(&self) -> Result<(), PrimerError> {
        self.op_tx
            .send(PrimerOp::Shutdown)
            .map_err(|_| PrimerError::ShutDown)
    }

    pub fn status(&self) -> PrimerStatus {
        *self.status_rx.borrow()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<PrimerStatus> {
        self.status_rx.clone()
    }

    /// Whether the background task has stopped.
    pub fn is_closed(&self) -> bool {
        self.op_tx.is_closed()
    }

    /// Wait until the background task has exited.
    ///
    /// Results of a batch in flight at shutdown are applied before this returns.
    pub async fn stopped(&self) {
        let mut status = self.status_rx.clone();
        while status.changed().await.is_ok() {}
    }
}
