//! Credential pool and selection policy
//!
//! The pool holds every discovered credential with its status. Each
//! scheduler run asks for a pass: the available credentials in the order the
//! selection policy dictates. Exhaustion is recorded here and outlives the
//! run, so a batch never re-tries a credential that already hit its quota.
//!
//! Transitions:
//! - Available → Exhausted (quota exceeded)
//! - Exhausted → Available (explicit `reset`, never automatic)

use std::collections::HashMap;
use std::fmt;

use credentials::Credential;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::info;

/// Runtime status of a pool credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Available,
    Exhausted,
}

/// Order in which a pass visits the available credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Discovery order, every pass starts from the first available credential.
    #[default]
    Sequential,
    /// Discovery order, each pass starts one credential later than the last.
    RoundRobin,
    /// Order shuffled once at construction with a fixed seed, then sequential.
    Shuffled { seed: u64 },
}

/// Pool counts by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCounts {
    pub total: usize,
    pub available: usize,
    pub exhausted: usize,
}

impl fmt::Display for PoolCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "credentials total={} available={} exhausted={}",
            self.total, self.available, self.exhausted
        )
    }
}

/// Ordered credentials with per-credential status.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    statuses: HashMap<String, CredentialStatus>,
    policy: SelectionPolicy,
    next_index: usize,
}

impl CredentialPool {
    /// Build a pool from credentials in discovery order. All start Available.
    ///
    /// Duplicate ids are dropped, keeping the first occurrence.
    pub fn new(credentials: Vec<Credential>, policy: SelectionPolicy) -> Self {
        let mut statuses = HashMap::with_capacity(credentials.len());
        let mut unique = Vec::with_capacity(credentials.len());
        for credential in credentials {
            if statuses
                .insert(credential.id.clone(), CredentialStatus::Available)
                .is_none()
            {
                unique.push(credential);
            }
        }

        if let SelectionPolicy::Shuffled { seed } = policy {
            let mut rng = StdRng::seed_from_u64(seed);
            unique.shuffle(&mut rng);
        }

        info!(
            credentials = unique.len(),
            policy = ?policy,
            "credential pool initialized"
        );
        Self {
            credentials: unique,
            statuses,
            policy,
            next_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn status(&self, id: &str) -> Option<CredentialStatus> {
        self.statuses.get(id).copied()
    }

    /// Available credentials for one pass, in selection-policy order.
    ///
    /// Round-robin advances its starting offset on every call, including calls
    /// that return an empty pass.
    pub fn pass(&mut self) -> Vec<Credential> {
        let n = self.credentials.len();
        if n == 0 {
            return Vec::new();
        }
        let start = match self.policy {
            SelectionPolicy::RoundRobin => {
                let start = self.next_index % n;
                self.next_index = self.next_index.wrapping_add(1);
                start
            }
            SelectionPolicy::Sequential | SelectionPolicy::Shuffled { .. } => 0,
        };

        (0..n)
            .map(|offset| &self.credentials[(start + offset) % n])
            .filter(|c| self.status(&c.id) == Some(CredentialStatus::Available))
            .cloned()
            .collect()
    }

    /// Record quota exhaustion. Unknown ids are ignored.
    pub fn mark_exhausted(&mut self, id: &str) {
        if let Some(status) = self.statuses.get_mut(id) {
            if *status != CredentialStatus::Exhausted {
                info!(credential = id, "credential exhausted");
            }
            *status = CredentialStatus::Exhausted;
        }
    }

    /// Make every credential available again (e.g. after a quota reset window).
    pub fn reset(&mut self) {
        for status in self.statuses.values_mut() {
            *status = CredentialStatus::Available;
        }
        info!(credentials = self.credentials.len(), "credential pool reset");
    }

    pub fn counts(&self) -> PoolCounts {
        let exhausted = self
            .statuses
            .values()
            .filter(|s| **s == CredentialStatus::Exhausted)
            .count();
        PoolCounts {
            total: self.credentials.len(),
            available: self.credentials.len() - exhausted,
            exhausted,
        }
    }
}
