//! Content memory for agent sessions
//!
//! Ties sessions, budget accounting, compression and the vector index
//! together behind `MemoryManager`.

pub mod manager;
pub mod retrieval;
pub mod session;
pub mod types;

pub use manager::{IngestReport, IngestRequest, IngestStage, ManagerSettings, MemoryManager};
pub use retrieval::{RetrievedContent, fit_to_budget};
pub use session::{Session, SessionId, SessionIdError};
pub use types::ContentItem;
