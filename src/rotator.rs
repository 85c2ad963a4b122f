//! Quota-aware API credential rotation
//!
//! The rotator owns a fixed pool of API keys and a spend counter for each.
//! Every search call is charged a fixed cost against the chosen key, and a
//! key's spend resets once a full rolling window has passed since its first
//! charge. Selection and charging happen under one lock over the whole pool,
//! so concurrent callers can never push a key past its budget.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, warn};

/// YouTube's default daily quota for a project key
pub const DEFAULT_MAX_WINDOW_BUDGET: u32 = 10_000;

/// Quota units charged for one `search.list` call
pub const DEFAULT_CALL_COST: u32 = 100;

/// An API key handed out by the rotator
///
/// `Debug` and `Display` only show the last four characters so keys can be
/// logged safely.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for use in the outgoing request only
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chars: Vec<char> = self.0.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        write!(f, "***{}", tail)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RotatorError {
    #[error("all API keys have exceeded their quota")]
    ExhaustedPool,

    #[error("no API keys provided")]
    EmptyPool,
}

/// Budget policy applied to every key in the pool
#[derive(Debug, Clone, Copy)]
pub struct QuotaPolicy {
    /// Spend at which a key stops being handed out
    pub max_window_budget: u32,
    /// Spend added per acquired call
    pub call_cost: u32,
    /// Length of the rolling window, counted from a key's first charge
    pub window: Duration,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            max_window_budget: DEFAULT_MAX_WINDOW_BUDGET,
            call_cost: DEFAULT_CALL_COST,
            window: Duration::hours(24),
        }
    }
}

#[derive(Debug)]
struct Slot {
    credential: Credential,
    used: u32,
    window_reset_at: Option<DateTime<Utc>>,
}

impl Slot {
    /// Clears the spend once the window deadline has passed.
    ///
    /// Invariant: `window_reset_at.is_none()` iff `used == 0`.
    fn refresh_window(&mut self, now: DateTime<Utc>) {
        if let Some(reset_at) = self.window_reset_at {
            if now >= reset_at {
                debug!(credential = %self.credential, spent = self.used, "quota window reset");
                self.used = 0;
                self.window_reset_at = None;
            }
        }
    }
}

/// Shared pool of API keys with per-key quota accounting
///
/// Meant to be constructed once at startup and shared behind an `Arc`.
#[derive(Debug)]
pub struct CredentialRotator {
    policy: QuotaPolicy,
    slots: Mutex<Vec<Slot>>,
}

impl CredentialRotator {
    /// Builds a rotator over `keys`, in the given order
    ///
    /// Empty keys and duplicates are dropped. Fails with `EmptyPool` when
    /// nothing usable remains.
    pub fn new<I, S>(keys: I, policy: QuotaPolicy) -> Result<Self, RotatorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut slots: Vec<Slot> = Vec::new();
        for key in keys {
            let key = key.into();
            let key = key.trim();
            if key.is_empty() || slots.iter().any(|s| s.credential.as_str() == key) {
                continue;
            }
            slots.push(Slot {
                credential: Credential::new(key),
                used: 0,
                window_reset_at: None,
            });
        }

        if slots.is_empty() {
            return Err(RotatorError::EmptyPool);
        }

        Ok(Self {
            policy,
            slots: Mutex::new(slots),
        })
    }

    pub fn policy(&self) -> QuotaPolicy {
        self.policy
    }

    /// Number of keys in the pool
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Picks the least-spent key with budget left and charges it one call
    pub fn acquire(&self) -> Result<Credential, RotatorError> {
        self.acquire_at(Utc::now())
    }

    /// Same as [`acquire`](Self::acquire) with an explicit clock reading
    pub fn acquire_at(&self, now: DateTime<Utc>) -> Result<Credential, RotatorError> {
        let mut slots = self.lock();

        let mut best: Option<(usize, u32)> = None;
        for (idx, slot) in slots.iter_mut().enumerate() {
            slot.refresh_window(now);

            if !self.has_room(slot) {
                continue;
            }
            // strict comparison keeps the first key among equal spends
            match best {
                Some((_, min)) if min <= slot.used => {}
                _ => best = Some((idx, slot.used)),
            }
        }

        let Some((idx, _)) = best else {
            warn!(pool = slots.len(), "credential pool exhausted");
            return Err(RotatorError::ExhaustedPool);
        };

        let slot = &mut slots[idx];
        slot.used = slot.used.saturating_add(self.policy.call_cost);
        if slot.window_reset_at.is_none() {
            slot.window_reset_at = Some(now + self.policy.window);
        }
        debug!(credential = %slot.credential, spent = slot.used, "credential acquired");

        Ok(slot.credential.clone())
    }

    /// Marks a key as spent for the rest of a fresh window
    ///
    /// Called when the remote API rejects a key our accounting still
    /// considered usable. Unknown keys are ignored.
    pub fn penalize(&self, credential: &Credential) {
        self.penalize_at(credential, Utc::now())
    }

    /// Same as [`penalize`](Self::penalize) with an explicit clock reading
    pub fn penalize_at(&self, credential: &Credential, now: DateTime<Utc>) {
        let mut slots = self.lock();
        match slots.iter_mut().find(|s| &s.credential == credential) {
            Some(slot) => {
                slot.used = self.policy.max_window_budget;
                slot.window_reset_at = Some(now + self.policy.window);
                warn!(credential = %credential, until = %(now + self.policy.window), "credential penalized");
            }
            None => warn!(credential = %credential, "penalize called for unknown credential"),
        }
    }

    /// Current recorded spend of a key, without applying a pending reset
    pub fn spent(&self, credential: &Credential) -> Option<u32> {
        self.lock()
            .iter()
            .find(|s| &s.credential == credential)
            .map(|s| s.used)
    }

    /// Sum of recorded spend across the pool
    pub fn total_spent(&self) -> u64 {
        self.lock().iter().map(|s| u64::from(s.used)).sum()
    }

    /// A key is eligible while one more call keeps it within budget.
    fn has_room(&self, slot: &Slot) -> bool {
        slot.used < self.policy.max_window_budget
            && slot.used.saturating_add(self.policy.call_cost) <= self.policy.max_window_budget
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        // A panic while holding the lock cannot leave a slot half-updated,
        // so a poisoned pool is still consistent.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
