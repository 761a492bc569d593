//! Per-document build exclusivity
//!
//! At most one build per document identifier is in flight. The first
//! request gets a `BuildPermit`; later requests are rejected with
//! `Conflict` or, under the wait policy, receive the in-flight build's
//! result through a watch channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;

use dig_core::{ConflictPolicy, DigError, DocumentId, Result};

use crate::IngestReport;

/// Published outcome of a finished build, shared with every waiter
pub type SharedOutcome = Result<Arc<IngestReport>>;

type Slot = watch::Receiver<Option<SharedOutcome>>;

/// What a build request got from the registry
#[derive(Debug)]
pub enum BuildTicket {
    /// Run the build; the permit is released on drop
    Permit(BuildPermit),
    /// Another request ran the build; this is its outcome
    Joined(SharedOutcome),
}

/// Registry of in-flight builds, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct BuildRegistry {
    in_flight: Arc<Mutex<HashMap<DocumentId, Slot>>>,
}

fn lock(map: &Mutex<HashMap<DocumentId, Slot>>) -> MutexGuard<'_, HashMap<DocumentId, Slot>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl BuildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a build for `document_id` is running
    pub fn is_in_flight(&self, document_id: &DocumentId) -> bool {
        lock(&self.in_flight).contains_key(document_id)
    }

    fn issue(&self, map: &mut HashMap<DocumentId, Slot>, document_id: &DocumentId) -> BuildPermit {
        let (sender, receiver) = watch::channel(None);
        map.insert(document_id.clone(), receiver);
        BuildPermit {
            document_id: document_id.clone(),
            sender,
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Try to take the permit without waiting
    pub fn try_acquire(&self, document_id: &DocumentId) -> Result<BuildPermit> {
        let mut map = lock(&self.in_flight);
        if map.contains_key(document_id) {
            return Err(DigError::Conflict {
                document_id: document_id.clone(),
            });
        }
        Ok(self.issue(&mut map, document_id))
    }

    /// Take the permit, or apply the conflict policy if a build is running
    pub async fn acquire(
        &self,
        document_id: &DocumentId,
        policy: ConflictPolicy,
        wait_timeout: Duration,
    ) -> Result<BuildTicket> {
        let mut receiver = {
            let mut map = lock(&self.in_flight);
            match map.get(document_id) {
                Some(slot) => slot.clone(),
                None => return Ok(BuildTicket::Permit(self.issue(&mut map, document_id))),
            }
        };

        let conflict = || DigError::Conflict {
            document_id: document_id.clone(),
        };

        match policy {
            ConflictPolicy::Reject => {
                tracing::info!(document_id = %document_id, "Rejecting concurrent build");
                Err(conflict())
            }
            ConflictPolicy::Wait => {
                tracing::info!(document_id = %document_id, "Waiting for in-flight build");
                match tokio::time::timeout(wait_timeout, receiver.wait_for(Option::is_some)).await {
                    Ok(Ok(outcome)) => match &*outcome {
                        Some(outcome) => Ok(BuildTicket::Joined(outcome.clone())),
                        None => Err(conflict()),
                    },
                    Ok(Err(_)) => {
                        tracing::warn!(
                            document_id = %document_id,
                            "In-flight build ended without a result"
                        );
                        Err(conflict())
                    }
                    Err(_) => {
                        tracing::warn!(
                            document_id = %document_id,
                            timeout_ms = wait_timeout.as_millis() as u64,
                            "Timed out waiting for in-flight build"
                        );
                        Err(conflict())
                    }
                }
            }
        }
    }
}

/// Exclusive right to build one document; released on drop
#[derive(Debug)]
pub struct BuildPermit {
    document_id: DocumentId,
    sender: watch::Sender<Option<SharedOutcome>>,
    in_flight: Arc<Mutex<HashMap<DocumentId, Slot>>>,
}

impl BuildPermit {
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// Hand the outcome to everyone waiting, then release the permit
    pub fn complete(self, outcome: SharedOutcome) {
        self.sender.send_replace(Some(outcome));
    }
}

impl Drop for BuildPermit {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.document_id);
    }
}
