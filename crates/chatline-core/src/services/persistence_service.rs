use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::repositories::{ConversationRepository, RegistrySnapshot};

type Pending = Option<(u64, RegistrySnapshot)>;

/// Writes registry snapshots in the background.
///
/// Mutations hand over a full snapshot and return immediately. A single
/// writer task saves them in order; snapshots scheduled while a write is in
/// progress collapse into the latest one. Failed writes are logged and the
/// next scheduled snapshot simply tries again.
pub struct PersistenceCoordinator {
    repository: Arc<dyn ConversationRepository>,
    pending: watch::Sender<Pending>,
    attempted: watch::Receiver<u64>,
    generation: AtomicU64,
}

impl PersistenceCoordinator {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn new(repository: Arc<dyn ConversationRepository>) -> Self {
        let (pending, mut pending_rx) = watch::channel::<Pending>(None);
        let (attempted_tx, attempted) = watch::channel(0u64);

        let repo = repository.clone();
        tokio::spawn(async move {
            while pending_rx.changed().await.is_ok() {
                let next = pending_rx.borrow_and_update().clone();
                let Some((generation, snapshot)) = next else {
                    continue;
                };

                let conversations = snapshot.conversations.len();
                match repo.save(snapshot).await {
                    Ok(()) => debug!(
                        generation,
                        conversations,
                        path = %repo.storage_path(),
                        "Saved conversation snapshot"
                    ),
                    Err(e) => warn!(
                        generation,
                        error = ?e,
                        path = %repo.storage_path(),
                        "Failed to save conversations; will retry on next change"
                    ),
                }
                attempted_tx.send_replace(generation);
            }
            debug!("Persistence writer stopped");
        });

        Self {
            repository,
            pending,
            attempted,
            generation: AtomicU64::new(0),
        }
    }

    /// Queue a snapshot for writing
    pub fn schedule(&self, snapshot: RegistrySnapshot) {
        self.pending.send_modify(|slot| {
            let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            *slot = Some((generation, snapshot));
        });
    }

    /// Wait until the most recently scheduled snapshot has been attempted
    pub async fn flush(&self) {
        let target = self.generation.load(Ordering::Acquire);
        if target == 0 {
            return;
        }
        let mut attempted = self.attempted.clone();
        if attempted.wait_for(|done| *done >= target).await.is_err() {
            warn!(target, "Persistence writer exited before flush completed");
        }
    }

    /// Number of snapshots handed over so far
    pub fn scheduled_count(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn storage_path(&self) -> String {
        self.repository.storage_path()
    }
}
