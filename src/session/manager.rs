//! Sessions and the manager that owns them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::audit::{AuditLog, AuditRecord};
use super::options::{SessionLimits, SessionOptions};
use super::state::SessionState;
use super::transcript::Transcript;
use super::turn::Turn;
use crate::error::KeelError;
use crate::hooks::HookPipeline;
use crate::permissions::{PermissionController, PermissionMode};
use crate::stream::{MessageStream, StreamObserver};
use crate::tools::{ToolRegistry, ToolSpec};
use crate::transport::ModelTransport;
use crate::types::Message;

struct Lifecycle {
    state: SessionState,
    /// Incremented per submit; stale turn callbacks are ignored.
    turn: u64,
    producer_done: bool,
    consumer_detached: bool,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    pending: Option<MessageStream>,
}

/// State shared between a session handle, its turn task, and its tool tasks.
pub(crate) struct SessionInner {
    pub(crate) id: String,
    pub(crate) transport: Arc<dyn ModelTransport>,
    pub(crate) registry: ToolRegistry,
    pub(crate) hooks: HookPipeline,
    pub(crate) permissions: PermissionController,
    pub(crate) limits: SessionLimits,
    pub(crate) system_prompt: Option<String>,
    pub(crate) audit: AuditLog,
    transcript: Mutex<Transcript>,
    lifecycle: Mutex<Lifecycle>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionInner {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn state(&self) -> SessionState {
        self.lifecycle().state
    }

    fn apply(&self, lifecycle: &mut Lifecycle, next: SessionState) -> bool {
        if lifecycle.state == next {
            return true;
        }
        if !lifecycle.state.can_transition_to(next) {
            tracing::debug!(
                session_id = %self.id,
                from = %lifecycle.state,
                to = %next,
                "ignored session state transition"
            );
            return false;
        }
        tracing::debug!(session_id = %self.id, from = %lifecycle.state, to = %next, "session state");
        lifecycle.state = next;
        self.state_tx.send_replace(next);
        true
    }

    /// Move to `next` if the transition is legal.
    pub(crate) fn set_state(&self, next: SessionState) -> bool {
        let mut lifecycle = self.lifecycle();
        self.apply(&mut lifecycle, next)
    }

    pub(crate) fn append(&self, message: Message) {
        self.transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
    }

    pub(crate) fn transcript_snapshot(&self) -> Vec<Message> {
        self.transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .messages()
            .to_vec()
    }

    /// Tool specs the transport may see: the registry filtered by the allow list.
    pub(crate) fn advertised_tools(&self) -> Vec<ToolSpec> {
        self.registry
            .tool_specs()
            .into_iter()
            .filter(|spec| self.permissions.is_allowed(&spec.name))
            .collect()
    }

    pub(crate) fn turn_finished(&self, turn: u64) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.turn != turn {
            return;
        }
        lifecycle.producer_done = true;
        lifecycle.cancel = None;
        if lifecycle.consumer_detached {
            self.apply(&mut lifecycle, SessionState::Idle);
        }
    }

    fn result_observed(&self, turn: u64) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.turn == turn && lifecycle.state.is_busy() {
            self.apply(&mut lifecycle, SessionState::Idle);
        }
    }

    fn detached(&self, turn: u64) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.turn != turn {
            return;
        }
        lifecycle.consumer_detached = true;
        if lifecycle.producer_done && lifecycle.state.is_busy() {
            self.apply(&mut lifecycle, SessionState::Idle);
        }
    }
}

struct TurnObserver {
    session: Weak<SessionInner>,
    turn: u64,
}

impl StreamObserver for TurnObserver {
    fn result_observed(&self) {
        if let Some(session) = self.session.upgrade() {
            session.result_observed(self.turn);
        }
    }

    fn detached(&self) {
        if let Some(session) = self.session.upgrade() {
            session.detached(self.turn);
        }
    }
}

/// Handle to one conversation. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Build the registry and hook snapshots and assign a fresh id.
    pub fn open(options: SessionOptions, transport: Arc<dyn ModelTransport>) -> Result<Self, KeelError> {
        let SessionOptions {
            allowed_tools,
            permission_mode,
            mcp_servers,
            builtin_tools,
            hooks,
            permission_resolver,
            system_prompt,
            limits,
        } = options;

        let registry = ToolRegistry::builder()
            .servers(mcp_servers)
            .builtins(builtin_tools)
            .build()?;
        let hooks = HookPipeline::from_config(&hooks, limits.hook_timeout)?;
        let permissions = PermissionController::new(permission_mode)
            .with_allowed_tools(allowed_tools)
            .with_resolver(permission_resolver);
        let id = uuid::Uuid::new_v4().to_string();
        let (state_tx, _) = watch::channel(SessionState::Created);

        tracing::info!(
            session_id = %id,
            permission_mode = %permission_mode,
            tools = registry.len(),
            hooks = hooks.len(),
            "session opened"
        );
        Ok(Self {
            inner: Arc::new(SessionInner {
                id,
                transport,
                registry,
                hooks,
                permissions,
                limits,
                system_prompt,
                audit: AuditLog::new(),
                transcript: Mutex::new(Transcript::new()),
                lifecycle: Mutex::new(Lifecycle {
                    state: SessionState::Created,
                    turn: 0,
                    producer_done: false,
                    consumer_detached: false,
                    cancel: None,
                    task: None,
                    pending: None,
                }),
                state_tx,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Subscribe to state changes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Wait until no turn is in flight; returns the state reached.
    pub async fn wait_for_idle(&self) -> SessionState {
        let mut rx = self.watch_state();
        loop {
            let state = *rx.borrow_and_update();
            if !state.is_busy() {
                return state;
            }
            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }

    pub fn permission_mode(&self) -> PermissionMode {
        self.inner.permissions.mode()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.inner.registry
    }

    /// Snapshot of the conversation so far.
    pub fn transcript(&self) -> Vec<Message> {
        self.inner.transcript_snapshot()
    }

    pub fn audit_log(&self) -> Vec<AuditRecord> {
        self.inner.audit.snapshot()
    }

    /// Start a turn for `prompt`. Must be called within a Tokio runtime.
    ///
    /// Fails with [`KeelError::SessionClosed`] once closed and with
    /// [`KeelError::InvalidState`] while a turn is in flight.
    pub fn submit(&self, prompt: impl Into<String>) -> Result<(), KeelError> {
        let prompt = prompt.into();
        let stale;
        let mut lifecycle = self.inner.lifecycle();
        match lifecycle.state {
            SessionState::Closed => return Err(KeelError::SessionClosed),
            state if !state.accepts_submit() => {
                return Err(KeelError::InvalidState(format!(
                    "a turn is already in progress (state: {state})"
                )))
            }
            _ => {}
        }

        lifecycle.turn += 1;
        let turn = lifecycle.turn;
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let observer: Arc<dyn StreamObserver> = Arc::new(TurnObserver {
            session: Arc::downgrade(&self.inner),
            turn,
        });
        stale = lifecycle.pending.replace(MessageStream::new(rx, Some(observer)));
        lifecycle.producer_done = false;
        lifecycle.consumer_detached = false;
        lifecycle.cancel = Some(cancel.clone());
        self.inner.apply(&mut lifecycle, SessionState::Active);

        tracing::debug!(session_id = %self.inner.id, turn, "prompt submitted");
        let task = Turn {
            session: Arc::clone(&self.inner),
            seq: turn,
            tx,
            cancel,
        };
        lifecycle.task = Some(tokio::spawn(task.supervise(prompt)));
        // A stale stream notifies the session on drop, which takes the lock.
        drop(lifecycle);
        drop(stale);
        Ok(())
    }

    /// Take the message stream of the last submitted turn.
    pub fn drain(&self) -> Result<MessageStream, KeelError> {
        let mut lifecycle = self.inner.lifecycle();
        match lifecycle.pending.take() {
            Some(stream) => Ok(stream),
            None if lifecycle.state.is_closed() => Err(KeelError::SessionClosed),
            None => Err(KeelError::InvalidState(
                "no submitted turn to drain".to_string(),
            )),
        }
    }

    /// Submit and drain in one call.
    pub fn send(&self, prompt: impl Into<String>) -> Result<MessageStream, KeelError> {
        self.submit(prompt)?;
        self.drain()
    }

    /// Cancel in-flight work, wait for the turn to wind down, and close.
    ///
    /// Closing an already closed session does nothing.
    pub async fn close(&self) {
        let (task, was_open) = {
            let mut lifecycle = self.inner.lifecycle();
            let was_open = !lifecycle.state.is_closed();
            self.inner.apply(&mut lifecycle, SessionState::Closed);
            if let Some(cancel) = lifecycle.cancel.take() {
                cancel.cancel();
            }
            (lifecycle.task.take(), was_open)
        };
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::warn!(session_id = %self.inner.id, error = %err, "turn task failed");
            }
        }
        if was_open {
            tracing::info!(session_id = %self.inner.id, "session closed");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Opens sessions against one model transport and keeps an index of them.
pub struct SessionManager {
    transport: Arc<dyn ModelTransport>,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn ModelTransport>) -> Self {
        Self {
            transport,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn open(&self, options: SessionOptions) -> Result<Session, KeelError> {
        let session = Session::open(options, Arc::clone(&self.transport))?;
        self.sessions()
            .insert(session.id().to_string(), session.clone());
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions().get(id).cloned()
    }

    /// Ids of open sessions, sorted.
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn submit(&self, session: &Session, prompt: impl Into<String>) -> Result<(), KeelError> {
        session.submit(prompt)
    }

    pub fn drain(&self, session: &Session) -> Result<MessageStream, KeelError> {
        session.drain()
    }

    /// Close and forget a session. Returns whether the id was known.
    pub async fn close(&self, id: &str) -> bool {
        let session = self.sessions().remove(id);
        match session {
            Some(session) => {
                session.close().await;
                true
            }
            None => false,
        }
    }

    /// Close every session.
    pub async fn shutdown(&self) {
        let sessions: Vec<Session> = self.sessions().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close().await;
        }
    }

    /// One-shot exchange on a fresh session that the manager does not track.
    pub fn query(
        &self,
        options: SessionOptions,
        prompt: impl Into<String>,
    ) -> Result<MessageStream, KeelError> {
        let session = Session::open(options, Arc::clone(&self.transport))?;
        session.send(prompt)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.session_ids())
            .finish()
    }
}
