//! Debounce and throttle batching keyed by logical unit.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// When a buffered batch becomes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "delay_ms", rename_all = "lowercase")]
pub enum BatchPolicy {
    /// Due `delay` ms after the most recent input.
    Debounce(u64),
    /// Due at the next multiple of `delay` ms after the first input.
    Throttle(u64),
}

impl BatchPolicy {
    fn first_deadline(self, now: u64) -> u64 {
        match self {
            Self::Debounce(delay) => now.saturating_add(delay),
            Self::Throttle(0) => now,
            Self::Throttle(delay) => (now / delay + 1).saturating_mul(delay),
        }
    }
}

#[derive(Debug)]
struct Pending<B> {
    batch: B,
    deadline: u64,
}

/// Buffers inputs per key until their batch is due.
///
/// New input for a key with a pending batch is merged into that batch, and
/// under debounce it also pushes the deadline back.
#[derive(Debug)]
pub struct Batcher<K, B> {
    policy: BatchPolicy,
    pending: HashMap<K, Pending<B>>,
}

impl<K, B> Batcher<K, B>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty batcher.
    #[must_use]
    pub fn new(policy: BatchPolicy) -> Self {
        Self {
            policy,
            pending: HashMap::new(),
        }
    }

    /// The scheduling policy.
    #[must_use]
    pub fn policy(&self) -> BatchPolicy {
        self.policy
    }

    /// Buffer `input` under `key`, merging it into a pending batch with
    /// `merge(existing, input)`.
    pub fn push<F>(&mut self, key: K, input: B, now: u64, merge: F)
    where
        F: FnOnce(&mut B, B),
    {
        match self.pending.get_mut(&key) {
            Some(pending) => {
                merge(&mut pending.batch, input);
                if let BatchPolicy::Debounce(_) = self.policy {
                    pending.deadline = self.policy.first_deadline(now);
                }
            }
            None => {
                let deadline = self.policy.first_deadline(now);
                self.pending.insert(
                    key,
                    Pending {
                        batch: input,
                        deadline,
                    },
                );
            }
        }
    }

    /// Remove and return every batch due at `now`, earliest deadline first.
    pub fn take_due(&mut self, now: u64) -> Vec<(K, B)> {
        let due_keys: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        let mut due: Vec<(u64, K, B)> = due_keys
            .into_iter()
            .filter_map(|k| self.pending.remove(&k).map(|p| (p.deadline, k, p.batch)))
            .collect();
        due.sort_by_key(|(deadline, _, _)| *deadline);
        due.into_iter().map(|(_, k, b)| (k, b)).collect()
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Drop batches whose key fails the predicate.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K, &B) -> bool,
    {
        self.pending.retain(|k, p| keep(k, &p.batch));
    }

    /// Drop every pending batch.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Number of pending batches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
