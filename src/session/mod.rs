//! Sessions: lifecycle, transcript, audit trail, and the turn loop.

pub mod audit;
mod manager;
pub mod options;
pub mod state;
pub mod transcript;
mod turn;

pub use audit::{AuditEvent, AuditLog, AuditRecord};
pub use manager::{Session, SessionManager};
pub use options::{SessionLimits, SessionOptions, DEFAULT_MAX_PARALLEL_TOOLS};
pub use state::SessionState;
pub use transcript::Transcript;
