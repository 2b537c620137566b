//! In-flight job bookkeeping.
//!
//! The registry is the dispatcher's only shared mutable state. Claim is
//! insert-if-absent under capacity, release is remove-if-token-matches,
//! and both happen under one lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::types::{ClaimToken, JobId};

/// Transient, non-authoritative handle for one claimed job
#[derive(Debug, Clone)]
pub struct InFlightEntry {
    pub job_type: String,
    pub token: ClaimToken,
    pub started: Instant,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StaleJob {
    pub job_id: JobId,
    pub job_type: String,
    pub token: ClaimToken,
    pub age: Duration,
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<JobId, InFlightEntry>,
    next_token: u64,
}

#[derive(Debug, Default)]
pub struct InFlightRegistry {
    state: Mutex<RegistryState>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Claim `id` if it is not already held and fewer than `max` jobs are in flight.
    pub fn try_claim(&self, id: &JobId, job_type: &str, max: usize) -> Option<ClaimToken> {
        let mut state = self.state.lock();
        if state.entries.len() >= max || state.entries.contains_key(id) {
            return None;
        }
        state.next_token += 1;
        let token = ClaimToken::new(state.next_token);
        state.entries.insert(
            id.clone(),
            InFlightEntry {
                job_type: job_type.to_string(),
                token,
                started: Instant::now(),
                claimed_at: Utc::now(),
            },
        );
        Some(token)
    }

    /// Remove the entry only if it still belongs to `token`.
    ///
    /// Returns `false` when the claim was already swept (or superseded by a
    /// newer claim of the same job).
    pub fn release(&self, id: &JobId, token: ClaimToken) -> bool {
        let mut state = self.state.lock();
        match state.entries.get(id) {
            Some(entry) if entry.token == token => {
                state.entries.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Drop every entry that has been in flight for at least `threshold`.
    pub fn evict_stale(&self, threshold: Duration) -> Vec<StaleJob> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let stale: Vec<JobId> = state
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.started) >= threshold)
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|id| {
                state.entries.remove(&id).map(|entry| StaleJob {
                    age: now.duration_since(entry.started),
                    job_id: id,
                    job_type: entry.job_type,
                    token: entry.token,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.state.lock().entries.contains_key(id)
    }

    pub fn has_capacity(&self, max: usize) -> bool {
        self.len() < max
    }

    pub fn snapshot(&self) -> Vec<(JobId, InFlightEntry)> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }
}

/// Releases a claim when dropped, so a panicking task still frees its slot.
pub struct ClaimGuard {
    registry: Arc<InFlightRegistry>,
    job_id: JobId,
    token: ClaimToken,
    released: bool,
}

impl ClaimGuard {
    pub fn new(registry: Arc<InFlightRegistry>, job_id: JobId, token: ClaimToken) -> Self {
        Self {
            registry,
            job_id,
            token,
            released: false,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn token(&self) -> ClaimToken {
        self.token
    }

    /// Release now. Returns whether the claim was still held.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.registry.release(&self.job_id, self.token)
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if !self.released {
            self.registry.release(&self.job_id, self.token);
        }
    }
}
