//! Local carbon-accounting workspace storage with a destructive retention
//! policy.
//!
//! Two collaborating pieces: [`store::LedgerStore`], a schema-versioned
//! SQLite CRUD layer for reporting activities, emission factors, and GHG
//! reporting standards; and [`session::SessionLifecycleManager`], an
//! inactivity-driven state machine that warns the user after a period of
//! silence and fires a destructive cleanup callback if the warning goes
//! unanswered. [`retention::RetentionController`] wires the two together.
//!
//! The store holds sensitive draft data on a possibly shared machine, so
//! nothing in it is treated as an archive: the retention path clears all
//! three collections, and the session slot survives restarts only so an
//! in-progress warning countdown resumes at the correct remaining time.

pub mod error;
mod migrations;
pub mod observer;
pub mod retention;
pub mod session;
pub mod store;
pub mod types;
mod util;

pub use error::{SessionError, StoreError};
pub use retention::{RemoteWipe, RetentionController, RetentionNotifier};
pub use session::{
    ActivityKind, SessionConfig, SessionLifecycleManager, SessionRecord, SessionSlot,
};
pub use store::{LedgerStore, StoreConfig, StoreStats};
pub use types::{
    DataSnapshot, EmissionFactor, FactorSnapshot, GhgReportingStandard, MethodType, RecordKind,
    ReportingActivity,
};
