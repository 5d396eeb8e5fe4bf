//! Per-session character budget accounting
//!
//! A ledger tracks `used` and `reserved` characters against a fixed
//! capacity. Ingestion reserves before doing any expensive work, shrinks the
//! reservation to the actual compressed size, then commits. The invariant
//! `used + reserved <= capacity` holds after every public call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MemoryError, Result};

/// Snapshot of a session's budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetState {
    pub capacity: usize,
    pub used: usize,
    pub reserved: usize,
}

impl BudgetState {
    /// Characters still admissible
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used + self.reserved)
    }

    /// Characters not yet committed; reservations in flight may still release
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.used)
    }
}

/// Handle for one outstanding reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationToken(u64);

#[derive(Debug)]
struct LedgerInner {
    state: BudgetState,
    reservations: HashMap<u64, usize>,
    next_id: u64,
}

/// Reservation-based budget ledger
#[derive(Debug)]
pub struct BudgetLedger {
    inner: Mutex<LedgerInner>,
}

impl BudgetLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                state: BudgetState {
                    capacity,
                    used: 0,
                    reserved: 0,
                },
                reservations: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    /// No await ever happens under this lock, and every mutation leaves the
    /// state consistent, so a poisoned lock still holds valid data.
    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve `amount` characters, failing without side effects when the
    /// request does not fit.
    pub fn reserve(&self, amount: usize) -> Result<ReservationToken> {
        let mut inner = self.lock();
        let available = inner.state.available();
        if amount > available {
            debug!("Reservation of {} rejected, {} available", amount, available);
            return Err(MemoryError::BudgetExceeded {
                requested: amount,
                available,
            });
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.state.reserved += amount;
        inner.reservations.insert(id, amount);
        Ok(ReservationToken(id))
    }

    /// Lower an outstanding reservation to `amount`. Never raises it.
    ///
    /// Returns the reservation's size after the call, or `None` when the
    /// token is no longer outstanding.
    pub fn shrink(&self, token: ReservationToken, amount: usize) -> Option<usize> {
        let mut inner = self.lock();
        let current = *inner.reservations.get(&token.0)?;
        if amount >= current {
            return Some(current);
        }
        inner.state.reserved -= current - amount;
        inner.reservations.insert(token.0, amount);
        Some(amount)
    }

    /// Move a reservation into `used`. Returns false if the token was
    /// already committed or released.
    pub fn commit(&self, token: ReservationToken) -> bool {
        let mut inner = self.lock();
        let Some(amount) = inner.reservations.remove(&token.0) else {
            return false;
        };
        inner.state.reserved -= amount;
        inner.state.used += amount;
        true
    }

    /// Cancel a reservation. Releasing a committed or released token is a no-op.
    pub fn release(&self, token: ReservationToken) -> bool {
        let mut inner = self.lock();
        match inner.reservations.remove(&token.0) {
            Some(amount) => {
                inner.state.reserved -= amount;
                true
            }
            None => false,
        }
    }

    /// Return used budget after content leaves the working context
    pub fn free(&self, amount: usize) {
        let mut inner = self.lock();
        if amount > inner.state.used {
            warn!(
                "Freeing {} chars but only {} are used",
                amount, inner.state.used
            );
        }
        inner.state.used = inner.state.used.saturating_sub(amount);
    }

    pub fn status(&self) -> BudgetState {
        self.lock().state
    }
}

/// Reservation that releases itself unless committed.
///
/// Dropping the guard (on error, early return, or when the owning future is
/// cancelled) returns the reserved characters to the ledger.
#[derive(Debug)]
pub struct ReservationGuard {
    ledger: Arc<BudgetLedger>,
    token: Option<ReservationToken>,
}

impl ReservationGuard {
    pub fn reserve(ledger: &Arc<BudgetLedger>, amount: usize) -> Result<Self> {
        let token = ledger.reserve(amount)?;
        Ok(Self {
            ledger: Arc::clone(ledger),
            token: Some(token),
        })
    }

    pub fn token(&self) -> Option<ReservationToken> {
        self.token
    }

    pub fn shrink(&self, amount: usize) -> Option<usize> {
        self.token.and_then(|t| self.ledger.shrink(t, amount))
    }

    /// Commit the reservation; the guard no longer releases on drop
    pub fn commit(mut self) -> bool {
        match self.token.take() {
            Some(token) => self.ledger.commit(token),
            None => false,
        }
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            if self.ledger.release(token) {
                debug!("Released uncommitted reservation {:?}", token);
            }
        }
    }
}
