//! Injected observability hooks.
//!
//! Every store operation and every session transition is reported to an
//! observer instead of being printed directly, so hosts can route traces
//! wherever they want. [`LogSink`] is the default and forwards to the `log`
//! facade.

use crate::types::RecordKind;

/// A structured trace of one store operation.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// Database opened; migrations applied during this open.
    Opened { migrations_applied: usize },
    Added { kind: RecordKind, id: i64 },
    Updated { kind: RecordKind, id: i64 },
    Deleted { kind: RecordKind, id: i64 },
    Cleared { kind: RecordKind, removed: usize },
    Seeded { inserted: usize },
    Exported { activities: usize, factors: usize, standards: usize },
    Imported { activities: usize, factors: usize, standards: usize },
}

/// A structured trace of one session lifecycle transition.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Manager constructed; `resumed` is true when a prior session was
    /// adopted from the slot.
    Started { resumed: bool },
    ActivityRecorded,
    Extended,
    WarningRaised,
    /// Destructive cleanup fired; the manager is already live again under a
    /// new session identifier.
    Cleared,
    Destroyed,
}

pub trait StoreObserver: Send + Sync {
    fn store_event(&self, event: &StoreEvent);
}

pub trait SessionObserver: Send + Sync {
    fn session_event(&self, event: &SessionEvent);
}

/// Default observer: forwards everything to `log`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StoreObserver for LogSink {
    fn store_event(&self, event: &StoreEvent) {
        match event {
            StoreEvent::Opened { migrations_applied } if *migrations_applied > 0 => {
                log::info!("store opened, {migrations_applied} migration(s) applied");
            }
            StoreEvent::Cleared { kind, removed } => {
                log::info!("cleared {removed} record(s) from {kind}");
            }
            StoreEvent::Seeded { inserted } => {
                log::info!("seeded {inserted} default reporting standard(s)");
            }
            other => log::debug!("store: {other:?}"),
        }
    }
}

impl SessionObserver for LogSink {
    fn session_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::WarningRaised => log::info!("session inactivity warning raised"),
            SessionEvent::Cleared => log::info!("session cleared, new session started"),
            SessionEvent::ActivityRecorded => log::trace!("session activity recorded"),
            other => log::debug!("session: {other:?}"),
        }
    }
}
