//! Session manager with drain-gated renewal.
//!
//! State lives in a watch channel. Reading the session and registering an
//! operation happen under the same borrow, and a renewal closes the gate
//! (`rotating`) through the same channel, so no caller can pick up a token
//! once its rotation has started.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::tracker::{OperationGuard, OperationTracker};
use crate::types::{Authenticator, Session, SessionConfig};
use crate::SessionError;

#[derive(Debug, Clone, Default)]
struct SessionState {
    session: Option<Session>,
    /// A renewal is waiting for drain or talking to the server.
    rotating: bool,
    /// Bumped whenever a renewal finishes, successfully or not.
    generation: u64,
    last_error: Option<String>,
}

impl SessionState {
    fn current(&self, now: Instant) -> Option<&Session> {
        if self.rotating {
            return None;
        }
        self.session.as_ref().filter(|s| s.is_current(now))
    }
}

struct Shared {
    authenticator: Arc<dyn Authenticator>,
    config: SessionConfig,
    tracker: Arc<OperationTracker>,
    state: watch::Sender<SessionState>,
    renew_lock: tokio::sync::Mutex<()>,
}

/// Owns the session of one client instance.
///
/// Dropping the manager (or calling [`shutdown`](Self::shutdown)) stops the
/// background renewal task.
pub struct SessionManager {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    renewal_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(authenticator: Arc<dyn Authenticator>, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            shared: Arc::new(Shared {
                authenticator,
                config,
                tracker: Arc::new(OperationTracker::new()),
                state,
                renew_lock: tokio::sync::Mutex::new(()),
            }),
            cancel: CancellationToken::new(),
            renewal_task: Mutex::new(None),
        }
    }

    pub fn tracker(&self) -> &Arc<OperationTracker> {
        &self.shared.tracker
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Snapshot of the current session, valid or not.
    pub fn current(&self) -> Option<Session> {
        self.shared.state.borrow().session.clone()
    }

    /// Starts the background renewal task. Calling it again is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut task = self.renewal_task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        *task = Some(tokio::spawn(renewal_loop(
            Arc::clone(&self.shared),
            self.cancel.clone(),
        )));
    }

    /// Stops the renewal task and makes every later call fail with
    /// [`SessionError::Shutdown`].
    pub fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(task) = self
            .renewal_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Authenticates now, replacing any current session.
    ///
    /// Waits for in-flight operations like any renewal.
    pub async fn authenticate(&self) -> Result<Session, SessionError> {
        self.check_running()?;
        let generation = self.shared.state.borrow().generation;
        self.renew(generation, true).await
    }

    /// Returns a current session, renewing first if needed.
    ///
    /// Makes no network call while the session is current. Must not be
    /// called while holding an [`OperationGuard`]: a pending renewal waits
    /// for that guard.
    pub async fn ensure_valid(&self) -> Result<Session, SessionError> {
        self.wait_current(None).await.map(|(session, _)| session)
    }

    /// Returns a current session together with a registered operation.
    ///
    /// This is how API calls obtain their token: the session cannot be
    /// rotated until the returned guard is dropped.
    pub async fn acquire(&self, label: &str) -> Result<(Session, OperationGuard), SessionError> {
        let (session, guard) = self.wait_current(Some(label)).await?;
        match guard {
            Some(guard) => Ok((session, guard)),
            None => Err(SessionError::Shutdown),
        }
    }

    async fn wait_current(
        &self,
        label: Option<&str>,
    ) -> Result<(Session, Option<OperationGuard>), SessionError> {
        let mut rx = self.shared.state.subscribe();
        loop {
            self.check_running()?;

            let (rotating, generation) = {
                let state = rx.borrow_and_update();
                if let Some(session) = state.current(Instant::now()) {
                    let guard = label.map(|l| self.shared.tracker.begin(l));
                    return Ok((session.clone(), guard));
                }
                (state.rotating, state.generation)
            };

            if rotating {
                self.wait_rotation(&mut rx, generation).await?;
            } else {
                self.renew(generation, false).await?;
            }
        }
    }

    /// Renews on a detached task. Dropping the caller's future leaves the
    /// rotation running for everyone else waiting on it.
    async fn renew(&self, generation: u64, force: bool) -> Result<Session, SessionError> {
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => Err(SessionError::Shutdown),
                result = shared.renew(generation, force) => result,
            }
        });
        self.cancellable(async {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(SessionError::Auth(format!("renewal task failed: {e}"))),
            }
        })
        .await
    }

    /// Blocks until the rotation observed at `generation` finishes and
    /// reports its failure, if any, to this waiter. An abandoned rotation
    /// is not a failure: the caller loops and renews again.
    async fn wait_rotation(
        &self,
        rx: &mut watch::Receiver<SessionState>,
        generation: u64,
    ) -> Result<(), SessionError> {
        let outcome = self.cancellable(async {
            let state = rx
                .wait_for(|s| !s.rotating)
                .await
                .map_err(|_| SessionError::Shutdown)?;
            if state.generation != generation && state.current(Instant::now()).is_none() {
                if let Some(err) = &state.last_error {
                    return Err(SessionError::Auth(err.clone()));
                }
            }
            Ok(())
        });
        outcome.await
    }

    async fn cancellable<T>(
        &self,
        fut: impl Future<Output = Result<T, SessionError>>,
    ) -> Result<T, SessionError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SessionError::Shutdown),
            result = fut => result,
        }
    }

    fn check_running(&self) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            Err(SessionError::Shutdown)
        } else {
            Ok(())
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    /// Runs one renewal unless another caller already completed one since
    /// `seen_generation` (and `force` is unset).
    async fn renew(&self, seen_generation: u64, force: bool) -> Result<Session, SessionError> {
        let _serial = self.renew_lock.lock().await;

        if !force {
            let state = self.state.borrow();
            if state.generation != seen_generation {
                if let Some(session) = state.current(Instant::now()) {
                    return Ok(session.clone());
                }
            }
        }

        let mut rotation = Rotation::begin(&self.state);

        let in_flight = self.tracker.in_flight();
        if in_flight > 0 {
            debug!(in_flight, "waiting for in-flight operations before renewal");
        }
        if !self.tracker.await_drained(self.config.drain_timeout).await {
            warn!(
                in_flight = self.tracker.in_flight(),
                operations = ?self.tracker.labels(),
                "drain timeout elapsed, rotating session with operations in flight"
            );
        }

        self.state.send_modify(|s| {
            if let Some(session) = s.session.as_mut() {
                session.valid = false;
            }
        });

        debug!("requesting session token");
        match self.authenticator.authenticate().await {
            Ok(credentials) if credentials.expires_in.is_zero() => {
                let e = SessionError::Auth("session granted with zero lifetime".into());
                error!(error = %e, "session renewal failed");
                rotation.finish(Err(e.to_string()));
                Err(e)
            }
            Ok(credentials) => {
                let expires_in = credentials.expires_in;
                let session =
                    Session::from_credentials(credentials, self.config.renewal_margin, Instant::now());
                info!(
                    organization = %session.organization_id,
                    expires_in_secs = expires_in.as_secs(),
                    "session established"
                );
                rotation.finish(Ok(session.clone()));
                Ok(session)
            }
            Err(e) => {
                error!(error = %e, "session renewal failed");
                rotation.finish(Err(e.to_string()));
                Err(e)
            }
        }
    }
}

/// Closes the gate on creation and reopens it exactly once. Dropped
/// halfway, it reopens the gate without recording an error.
struct Rotation<'a> {
    state: &'a watch::Sender<SessionState>,
    open: bool,
}

impl<'a> Rotation<'a> {
    fn begin(state: &'a watch::Sender<SessionState>) -> Self {
        state.send_modify(|s| s.rotating = true);
        Self { state, open: true }
    }

    fn finish(&mut self, outcome: Result<Session, String>) {
        self.close(|s| match outcome {
            Ok(session) => {
                s.session = Some(session);
                s.last_error = None;
            }
            Err(err) => s.last_error = Some(err),
        });
    }

    fn close(&mut self, apply: impl FnOnce(&mut SessionState)) {
        if !self.open {
            return;
        }
        self.open = false;
        self.state.send_modify(|s| {
            s.rotating = false;
            s.generation += 1;
            apply(s);
        });
    }
}

impl Drop for Rotation<'_> {
    fn drop(&mut self) {
        self.close(|s| {
            debug!("session renewal abandoned");
            s.last_error = None;
        });
    }
}

/// Sleeps until the session deadline, renews, and re-arms on every change.
async fn renewal_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut rx = shared.state.subscribe();
    loop {
        let (deadline, generation) = {
            let state = rx.borrow_and_update();
            let deadline = state
                .session
                .as_ref()
                .filter(|s| s.valid && !state.rotating)
                .map(|s| s.expires_at);
            (deadline, state.generation)
        };

        let Some(deadline) = deadline else {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            continue;
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                info!("session deadline reached, renewing");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = shared.renew(generation, false) => {
                        if let Err(e) = result {
                            warn!(error = %e, "scheduled renewal failed, next call will retry");
                        }
                    }
                }
            }
        }
    }
    debug!("session renewal task stopped");
}
