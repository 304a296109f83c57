//! Session domain: data model (§3.2–§3.6), lifecycle manager (§4.3), and
//! the transaction engine (§4.4).

mod engine;
mod manager;
mod types;

pub use engine::{EngineError, ScanRequest, TransactionEngine};
pub use manager::{SessionError, SessionManager};
pub use types::{
    AdminAdjustment, DeviceConnection, DeviceType, ScanMode, Session, SessionStatus, TeamScore,
    Transaction, TransactionStatus, VideoQueueItemStateMirror,
};
