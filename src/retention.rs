//! Glue between the session lifecycle and the store's destructive clear.
//!
//! The lifecycle manager knows nothing about the store; this controller owns
//! both callback registrations. The local clear and the optional remote wipe
//! are independent actions, not a transaction — one failing does not roll
//! back the other, and per-kind partial failure of the local clear is
//! surfaced through the notifier for the host to retry.

use std::sync::Arc;

use async_trait::async_trait;

use crate::session::{CleanupFuture, SessionLifecycleManager};
use crate::store::LedgerStore;

/// Optional remote "delete everything" endpoint.
#[async_trait]
pub trait RemoteWipe: Send + Sync {
    async fn clear_all(&self) -> Result<(), String>;
}

/// Transient user-facing notifications. No persistent error log.
pub trait RetentionNotifier: Send + Sync {
    /// The inactivity warning went up; the host reads the countdown from the
    /// manager itself.
    fn inactivity_warning(&self);
    /// Local draft data was cleared.
    fn data_cleared(&self);
    /// A clear step failed; already-cleared kinds stay cleared.
    fn clear_failed(&self, detail: &str);
}

/// Default notifier: log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl RetentionNotifier for LogNotifier {
    fn inactivity_warning(&self) {
        log::info!("inactivity warning shown");
    }

    fn data_cleared(&self) {
        log::info!("local draft data cleared");
    }

    fn clear_failed(&self, detail: &str) {
        log::warn!("data clear incomplete: {detail}");
    }
}

/// Wires the lifecycle manager's two callbacks to the store and the optional
/// remote backend.
pub struct RetentionController {
    store: Arc<LedgerStore>,
    remote: Option<Arc<dyn RemoteWipe>>,
    notifier: Arc<dyn RetentionNotifier>,
}

impl RetentionController {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self {
            store,
            remote: None,
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteWipe>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn RetentionNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Register both lifecycle callbacks on the manager.
    pub fn install(self: &Arc<Self>, manager: &SessionLifecycleManager) {
        let controller = Arc::clone(self);
        manager.set_inactivity_warning_callback(move || {
            controller.notifier.inactivity_warning();
        });

        let controller = Arc::clone(self);
        manager.set_data_cleanup_callback(move || {
            let controller = Arc::clone(&controller);
            Box::pin(async move {
                controller.run_cleanup().await;
            }) as CleanupFuture
        });
    }

    /// Run the destructive cleanup: local clear, then remote wipe.
    ///
    /// Each step stands alone. The local clear is itself at-most-once per
    /// kind (see [`LedgerStore::clear_all_data`]); on failure the error names
    /// the failing kind and the remainder can be retried by the host.
    pub async fn run_cleanup(&self) {
        match self.store.clear_all_data().await {
            Ok(()) => self.notifier.data_cleared(),
            Err(e) => {
                log::error!("local data clear failed: {e}");
                self.notifier.clear_failed(&e.to_string());
            }
        }

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.clear_all().await {
                log::error!("remote data clear failed: {e}");
                self.notifier.clear_failed(&e);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
