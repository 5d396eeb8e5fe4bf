//! Newsdesk memory - context-budgeted memory and compression for a
//! news-assembling agent
//!
//! Content pulled from the web or from conversation turns is fingerprinted,
//! compressed to a per-item character budget, embedded and kept in a
//! capacity-bounded vector index. Each agent session carries a budget ledger
//! so the working context never grows past its capacity.

pub mod budget;
pub mod compression;
pub mod config;
pub mod embedding;
pub mod error;
pub mod fetch;
pub mod fingerprint;
pub mod index;
pub mod memory;
pub mod testing;
pub mod text;

pub use budget::{BudgetLedger, BudgetState, ReservationGuard, ReservationToken};
pub use compression::{CompressionLevel, Compressor, SummaryStyle};
pub use config::Config;
pub use error::{MemoryError, Result};
pub use fingerprint::{Fingerprint, SourceRef, fingerprint};
pub use index::{InMemoryIndex, IndexSnapshot, IndexStats, VectorIndex};
pub use memory::{
    ContentItem, IngestReport, IngestRequest, MemoryManager, RetrievedContent, Session, SessionId,
};
