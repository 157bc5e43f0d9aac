//! Inactivity-driven session lifecycle.
//!
//! Watches for user activity and drives a two-stage timeout: silence raises
//! a warning, continued silence fires the destructive cleanup callback,
//! after which the manager is immediately live again under a fresh session
//! identifier. Deadlines are wall-clock based and the session metadata is
//! persisted on every activity update, so a restarted process resumes an
//! in-progress warning countdown at the correct remaining time instead of
//! starting over.
//!
//! The manager knows nothing about the store; the destructive action is an
//! injected callback (see `retention`).

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::SessionError;
use crate::observer::{LogSink, SessionEvent, SessionObserver};
use crate::util::atomic_write_str;

/// Default silence before the warning is raised.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(20 * 60);
/// Default time the warning may stay unanswered before cleanup fires.
pub const DEFAULT_MODAL_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Persisted sessions older than this are abandoned on startup.
pub const DEFAULT_RESUME_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Buffer for the activity event channel.
const ACTIVITY_CHANNEL_SIZE: usize = 64;

/// Interaction classes that count as user activity.
///
/// The host UI forwards these through [`SessionLifecycleManager::activity_sender`];
/// every class funnels into the same record-activity entry point that
/// `extend_session` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    PointerDown,
    PointerMove,
    KeyDown,
    Scroll,
    TouchStart,
    Click,
    Input,
    Change,
}

/// Every interaction class the manager listens for, for hosts that attach
/// listeners from a declarative list.
pub const QUALIFYING_ACTIVITY: &[ActivityKind] = &[
    ActivityKind::PointerDown,
    ActivityKind::PointerMove,
    ActivityKind::KeyDown,
    ActivityKind::Scroll,
    ActivityKind::TouchStart,
    ActivityKind::Click,
    ActivityKind::Input,
    ActivityKind::Change,
];

/// Persisted session metadata: one JSON record in the slot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    /// Epoch milliseconds of the last qualifying activity.
    pub last_activity: i64,
    pub is_modal_open: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modal_start_time: Option<i64>,
}

/// Synchronous key-value slot holding the session record.
///
/// Loads are lenient — a missing or malformed file reads as "no prior
/// session". Saves are atomic and owner-only on unix.
#[derive(Debug, Clone)]
pub struct SessionSlot {
    path: PathBuf,
}

impl SessionSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The stock slot location under `~/.carbondesk/`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".carbondesk").join("session.json"))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Load the stored record. Absent or unparsable data is `None`, never an
    /// error.
    pub fn load(&self) -> Option<SessionRecord> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                log::debug!("ignoring malformed session slot: {e}");
                None
            }
        }
    }

    pub fn save(&self, record: &SessionRecord) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| SessionError::SlotWrite {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }

        let content = serde_json::to_string_pretty(record)?;
        atomic_write_str(&self.path, &content).map_err(|source| SessionError::SlotWrite {
            path: self.path.clone(),
            source,
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).map_err(
                |source| SessionError::SlotWrite {
                    path: self.path.clone(),
                    source,
                },
            )?;
        }

        Ok(())
    }
}

/// Lifecycle thresholds, overridable at construction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub inactivity_timeout: Duration,
    pub modal_timeout: Duration,
    pub resume_window: Duration,
    pub slot_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            modal_timeout: DEFAULT_MODAL_TIMEOUT,
            resume_window: DEFAULT_RESUME_WINDOW,
            slot_path: SessionSlot::default_path()
                .unwrap_or_else(|| PathBuf::from(".carbondesk-session.json")),
        }
    }
}

/// Future returned by the cleanup callback.
pub type CleanupFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

type WarningCallback = Arc<dyn Fn() + Send + Sync>;
type CleanupCallback = Arc<dyn Fn() -> CleanupFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    /// Warning raised at this epoch-ms instant; the modal countdown runs
    /// against it.
    Warning { started: i64 },
}

struct ManagerState {
    session_id: String,
    last_activity: i64,
    phase: Phase,
}

struct Inner {
    config: SessionConfig,
    slot: SessionSlot,
    state: Mutex<ManagerState>,
    warning_cb: Mutex<Option<WarningCallback>>,
    cleanup_cb: Mutex<Option<CleanupCallback>>,
    /// The single pending timer. Arming replaces and aborts the previous
    /// one, so at most one countdown is live per manager.
    timer: Mutex<Option<JoinHandle<()>>>,
    observer: Arc<dyn SessionObserver>,
}

/// The session lifecycle manager.
///
/// Construction recovers any prior session from the slot and arms the first
/// timer, so it must happen inside a tokio runtime. Register the callbacks
/// immediately after construction.
pub struct SessionLifecycleManager {
    inner: Arc<Inner>,
    pump: Mutex<Option<JoinHandle<()>>>,
    activity_tx: mpsc::Sender<ActivityKind>,
}

impl SessionLifecycleManager {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_observer(config, Arc::new(LogSink))
    }

    pub fn with_observer(config: SessionConfig, observer: Arc<dyn SessionObserver>) -> Self {
        let slot = SessionSlot::new(config.slot_path.clone());
        let now = now_ms();

        let (state, resumed) = match slot.load() {
            Some(record) if is_fresh(&record, now, config.resume_window) => {
                let phase = match (record.is_modal_open, record.modal_start_time) {
                    (true, Some(started)) => Phase::Warning { started },
                    _ => Phase::Active,
                };
                let state = ManagerState {
                    session_id: record.session_id,
                    last_activity: record.last_activity,
                    phase,
                };
                (state, true)
            }
            _ => (
                ManagerState {
                    session_id: Uuid::new_v4().to_string(),
                    last_activity: now,
                    phase: Phase::Active,
                },
                false,
            ),
        };

        let inner = Arc::new(Inner {
            config,
            slot,
            state: Mutex::new(state),
            warning_cb: Mutex::new(None),
            cleanup_cb: Mutex::new(None),
            timer: Mutex::new(None),
            observer,
        });

        inner.persist();
        inner.arm_from_state();

        let (activity_tx, mut activity_rx) = mpsc::channel(ACTIVITY_CHANNEL_SIZE);
        let pump_inner = Arc::clone(&inner);
        let pump = tokio::spawn(async move {
            while let Some(_kind) = activity_rx.recv().await {
                pump_inner.touch(false);
            }
        });

        inner
            .observer
            .session_event(&SessionEvent::Started { resumed });

        Self {
            inner,
            pump: Mutex::new(Some(pump)),
            activity_tx,
        }
    }

    /// Callback invoked (with no arguments) when the inactivity warning is
    /// raised. The host queries [`modal_time_remaining`](Self::modal_time_remaining)
    /// itself.
    pub fn set_inactivity_warning_callback(&self, cb: impl Fn() + Send + Sync + 'static) {
        *self.inner.warning_cb.lock() = Some(Arc::new(cb));
    }

    /// Callback invoked when the modal timeout elapses unanswered. Spawned
    /// fire-and-forget; once invoked it cannot be aborted.
    pub fn set_data_cleanup_callback(
        &self,
        cb: impl Fn() -> CleanupFuture + Send + Sync + 'static,
    ) {
        *self.inner.cleanup_cb.lock() = Some(Arc::new(cb));
    }

    /// Sender the host UI forwards interaction events through. The channel
    /// is detached as one unit by [`destroy`](Self::destroy).
    pub fn activity_sender(&self) -> mpsc::Sender<ActivityKind> {
        self.activity_tx.clone()
    }

    /// Record one qualifying activity event directly.
    pub fn record_activity(&self, _kind: ActivityKind) {
        self.inner.touch(false);
    }

    /// Explicit user extension; same entry point as activity detection.
    pub fn extend_session(&self) {
        self.inner.touch(true);
    }

    /// Force the destructive cleanup now instead of waiting out the modal
    /// timeout. The manager rotates to a fresh session immediately.
    pub fn force_cleanup(&self) {
        self.inner.fire_cleanup();
    }

    /// Remaining warning time, computed on demand from the persisted
    /// warning start — correct even across a restart mid-warning. Outside
    /// the warning phase this is the full modal timeout.
    pub fn modal_time_remaining(&self) -> Duration {
        let started = match self.inner.state.lock().phase {
            Phase::Warning { started } => started,
            Phase::Active => return self.inner.config.modal_timeout,
        };
        let elapsed = (now_ms() - started).max(0) as u64;
        self.inner
            .config
            .modal_timeout
            .saturating_sub(Duration::from_millis(elapsed))
    }

    pub fn inactivity_timeout(&self) -> Duration {
        self.inner.config.inactivity_timeout
    }

    pub fn modal_timeout(&self) -> Duration {
        self.inner.config.modal_timeout
    }

    /// Identifier of the current session.
    pub fn session_id(&self) -> String {
        self.inner.state.lock().session_id.clone()
    }

    /// True while the inactivity warning is up.
    pub fn is_warning(&self) -> bool {
        matches!(self.inner.state.lock().phase, Phase::Warning { .. })
    }

    /// Cancel the pending timer and detach the activity channel. The
    /// persisted session metadata is left in place so a later construction
    /// can resume.
    pub fn destroy(&self) {
        let timer = self.inner.timer.lock().take();
        let pump = self.pump.lock().take();
        if timer.is_none() && pump.is_none() {
            return;
        }
        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(pump) = pump {
            pump.abort();
        }
        self.inner.observer.session_event(&SessionEvent::Destroyed);
    }
}

impl Drop for SessionLifecycleManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

enum ModalDecision {
    Ignore,
    Rearm(Duration),
    Fire,
}

impl Inner {
    /// The one entry point both activity detection and explicit extension
    /// funnel through: reset to `Active`, persist, re-arm the inactivity
    /// timer from now.
    fn touch(self: &Arc<Self>, extension: bool) {
        {
            let mut state = self.state.lock();
            state.last_activity = now_ms();
            state.phase = Phase::Active;
        }
        self.persist();
        self.arm_inactivity(self.config.inactivity_timeout);
        self.observer.session_event(if extension {
            &SessionEvent::Extended
        } else {
            &SessionEvent::ActivityRecorded
        });
    }

    /// Arm the timer appropriate to the recovered state: a resumed warning
    /// continues at its remaining time, a resumed active session owes only
    /// the silence it has not yet served.
    fn arm_from_state(self: &Arc<Self>) {
        let now = now_ms();
        let (phase, last_activity) = {
            let state = self.state.lock();
            (state.phase, state.last_activity)
        };
        match phase {
            Phase::Active => {
                let silence = Duration::from_millis((now - last_activity).max(0) as u64);
                self.arm_inactivity(self.config.inactivity_timeout.saturating_sub(silence));
            }
            Phase::Warning { started } => {
                let elapsed = Duration::from_millis((now - started).max(0) as u64);
                self.arm_modal(self.config.modal_timeout.saturating_sub(elapsed));
            }
        }
    }

    fn arm_inactivity(self: &Arc<Self>, delay: Duration) {
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.on_inactivity_elapsed();
        });
        self.replace_timer(handle);
    }

    fn arm_modal(self: &Arc<Self>, delay: Duration) {
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.on_modal_elapsed();
        });
        self.replace_timer(handle);
    }

    fn replace_timer(&self, handle: JoinHandle<()>) {
        if let Some(old) = self.timer.lock().replace(handle) {
            old.abort();
        }
    }

    fn on_inactivity_elapsed(self: &Arc<Self>) {
        let now = now_ms();
        let timeout_ms = self.config.inactivity_timeout.as_millis() as i64;
        let remaining = {
            let mut state = self.state.lock();
            if !matches!(state.phase, Phase::Active) {
                return;
            }
            // An activity may have slipped in between the timer firing and
            // this call; trust the wall clock, not the timer.
            let silence = now - state.last_activity;
            if silence < timeout_ms {
                Some(Duration::from_millis((timeout_ms - silence) as u64))
            } else {
                state.phase = Phase::Warning { started: now };
                None
            }
        };

        if let Some(remaining) = remaining {
            self.arm_inactivity(remaining);
            return;
        }

        self.persist();
        self.observer.session_event(&SessionEvent::WarningRaised);
        let cb = self.warning_cb.lock().clone();
        if let Some(cb) = cb {
            cb();
        }
        // Activity may have raced in while the callback ran; if so the
        // inactivity timer it armed stays, and no modal countdown starts.
        if matches!(self.state.lock().phase, Phase::Warning { .. }) {
            self.arm_modal(self.config.modal_timeout);
        }
    }

    fn on_modal_elapsed(self: &Arc<Self>) {
        let now = now_ms();
        let modal_ms = self.config.modal_timeout.as_millis() as i64;
        let decision = {
            let state = self.state.lock();
            match state.phase {
                Phase::Warning { started } => {
                    let elapsed = now - started;
                    if elapsed < modal_ms {
                        ModalDecision::Rearm(Duration::from_millis((modal_ms - elapsed) as u64))
                    } else {
                        ModalDecision::Fire
                    }
                }
                Phase::Active => ModalDecision::Ignore,
            }
        };

        match decision {
            ModalDecision::Ignore => {}
            ModalDecision::Rearm(remaining) => self.arm_modal(remaining),
            ModalDecision::Fire => self.fire_cleanup(),
        }
    }

    /// Destructive transition: invoke the cleanup callback fire-and-forget,
    /// discard the old session identifier, and come back up `Active` under a
    /// brand-new session record.
    fn fire_cleanup(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            state.session_id = Uuid::new_v4().to_string();
            state.last_activity = now_ms();
            state.phase = Phase::Active;
        }
        self.persist();

        let cb = self.cleanup_cb.lock().clone();
        if let Some(cb) = cb {
            // Cannot be aborted from here on; the store clears are
            // fire-and-forget from the manager's perspective.
            tokio::spawn(cb());
        }

        self.observer.session_event(&SessionEvent::Cleared);
        self.arm_inactivity(self.config.inactivity_timeout);
    }

    /// Write the current state to the slot. Persistence failures are logged,
    /// not propagated: the in-memory lifecycle keeps running.
    fn persist(&self) {
        let record = {
            let state = self.state.lock();
            let modal_start_time = match state.phase {
                Phase::Warning { started } => Some(started),
                Phase::Active => None,
            };
            SessionRecord {
                session_id: state.session_id.clone(),
                last_activity: state.last_activity,
                is_modal_open: modal_start_time.is_some(),
                modal_start_time,
            }
        };
        if let Err(e) = self.slot.save(&record) {
            log::warn!("failed to persist session metadata: {e}");
        }
    }
}

fn is_fresh(record: &SessionRecord, now: i64, window: Duration) -> bool {
    let age = now - record.last_activity;
    age >= 0 && age <= window.as_millis() as i64
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// =============================================================================
// Tests
// =============================================================================
