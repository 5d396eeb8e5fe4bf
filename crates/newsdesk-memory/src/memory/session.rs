//! Agent sessions
//!
//! A session is one working context of the news agent; it owns the budget
//! ledger that bounds how much content can be admitted into that context.
//! Session ids are alphanumeric with underscores and hyphens, max 128 chars.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::budget::{BudgetLedger, BudgetState};
use crate::fingerprint::Fingerprint;

const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionIdError {
    #[error("Session ID cannot be empty")]
    Empty,

    #[error("Session ID contains invalid characters: allowed are a-z, A-Z, 0-9, _, -")]
    InvalidChars,

    #[error("Session ID exceeds maximum length of {MAX_SESSION_ID_LEN} characters")]
    TooLong,
}

/// A validated session id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Fresh random id, e.g. `ses-5f0c...`
    pub fn generate() -> Self {
        SessionId(format!("ses-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), SessionIdError> {
        if s.is_empty() {
            return Err(SessionIdError::Empty);
        }
        if s.len() > MAX_SESSION_ID_LEN {
            return Err(SessionIdError::TooLong);
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SessionIdError::InvalidChars);
        }
        Ok(())
    }
}

impl TryFrom<&str> for SessionId {
    type Error = SessionIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::validate(value)?;
        Ok(SessionId(value.to_string()))
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(&value)?;
        Ok(SessionId(value))
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One working context and its budget
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    ledger: Arc<BudgetLedger>,
    /// Characters charged to this session per fingerprint
    admitted: Mutex<HashMap<Fingerprint, usize>>,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId, capacity: usize) -> Self {
        Self {
            id,
            ledger: Arc::new(BudgetLedger::new(capacity)),
            admitted: Mutex::new(HashMap::new()),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn ledger(&self) -> &Arc<BudgetLedger> {
        &self.ledger
    }

    pub fn budget_status(&self) -> BudgetState {
        self.ledger.status()
    }

    /// Return characters to the budget after content leaves the context
    pub fn free(&self, amount: usize) {
        self.ledger.free(amount);
    }

    /// Characters already charged to this session for `fingerprint`
    pub fn admitted_size(&self, fingerprint: &Fingerprint) -> Option<usize> {
        self.admitted_map().get(fingerprint).copied()
    }

    /// Record that `size` characters of `fingerprint` are in this context.
    /// The recorded size only grows.
    pub fn record_admitted(&self, fingerprint: Fingerprint, size: usize) {
        let mut admitted = self.admitted_map();
        let entry = admitted.entry(fingerprint).or_insert(0);
        *entry = (*entry).max(size);
    }

    /// Forget an admission and return its size, e.g. before `free`-ing it
    pub fn forget_admitted(&self, fingerprint: &Fingerprint) -> Option<usize> {
        self.admitted_map().remove(fingerprint)
    }

    pub fn admitted_count(&self) -> usize {
        self.admitted_map().len()
    }

    fn admitted_map(&self) -> MutexGuard<'_, HashMap<Fingerprint, usize>> {
        self.admitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_session_ids() {
        assert!(SessionId::try_from("morning-digest").is_ok());
        assert!(SessionId::try_from("DESK_42").is_ok());
        assert!(SessionId::try_from("a").is_ok());
    }

    #[test]
    fn test_invalid_session_ids() {
        assert_eq!(SessionId::try_from(""), Err(SessionIdError::Empty));
        assert_eq!(
            SessionId::try_from("has space"),
            Err(SessionIdError::InvalidChars)
        );
        assert_eq!(
            SessionId::try_from("x".repeat(129)),
            Err(SessionIdError::TooLong)
        );
        assert!(SessionId::try_from("x".repeat(128)).is_ok());
    }

    #[test]
    fn test_generated_ids_are_valid_and_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(SessionId::try_from(a.as_str()).is_ok());
    }

    #[test]
    fn test_admission_tracking() {
        let session = Session::new(SessionId::generate(), 1000);
        let fp = crate::fingerprint::fingerprint("https://a.com/x", &[]).unwrap();
        assert_eq!(session.admitted_size(&fp), None);
        session.record_admitted(fp.clone(), 300);
        session.record_admitted(fp.clone(), 120);
        assert_eq!(session.admitted_size(&fp), Some(300));
        session.record_admitted(fp.clone(), 450);
        assert_eq!(session.admitted_size(&fp), Some(450));
        assert_eq!(session.admitted_count(), 1);
        assert_eq!(session.forget_admitted(&fp), Some(450));
        assert_eq!(session.admitted_size(&fp), None);
    }

    #[test]
    fn test_session_starts_with_empty_budget() {
        let session = Session::new(SessionId::generate(), 1000);
        let status = session.budget_status();
        assert_eq!(status.capacity, 1000);
        assert_eq!(status.used, 0);
        assert_eq!(status.reserved, 0);
    }
}
