//! RequestCoalescer — one wake per service, however many callers.
//!
//! The first request for an untracked service marks it DOWN and starts a
//! poll chain. Callers that must wait for the app attach to a single
//! pending wake per service, backed by a `watch` channel: the watcher task
//! publishes one outcome and every attached receiver observes it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::context::WakeContext;
use crate::error::WakeError;
use crate::fsm::DeploymentFsm;
use crate::state::WakeState;

type WakeOutcome = Option<Result<(), WakeError>>;

/// Deduplicates concurrent wake requests per service.
pub struct RequestCoalescer {
    ctx: Arc<WakeContext>,
    fsm: DeploymentFsm,
    pending: Mutex<HashMap<String, watch::Receiver<WakeOutcome>>>,
}

impl RequestCoalescer {
    pub fn new(ctx: Arc<WakeContext>) -> Arc<Self> {
        Arc::new(Self {
            fsm: DeploymentFsm::new(ctx.clone()),
            ctx,
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn context(&self) -> &Arc<WakeContext> {
        &self.ctx
    }

    /// Start tracking an untracked service: mark it DOWN and queue its
    /// first poll once the app id is known. Returns whether tracking began
    /// with this call.
    pub fn ensure_tracked(&self, route_id: &str) -> bool {
        if !self
            .ctx
            .states
            .set_if_absent(route_id, WakeState::Down, self.ctx.settings.state_ttl)
        {
            return false;
        }
        info!(%route_id, "waking up app for service");

        let ctx = self.ctx.clone();
        let fsm = self.fsm.clone();
        let route_id = route_id.to_string();
        tokio::spawn(async move {
            match ctx.app_id_for(&route_id).await {
                Some(app_id) => fsm.schedule(&route_id, &app_id),
                None => {
                    warn!(%route_id, "no app id for service, dropping wake");
                    ctx.states.delete(&route_id);
                }
            }
        });
        true
    }

    /// Current wake state. An untracked service starts tracking and
    /// reports DOWN without waiting.
    pub fn status(&self, route_id: &str) -> WakeState {
        match self.ctx.state(route_id) {
            Some(state) => state,
            None => {
                self.ensure_tracked(route_id);
                WakeState::Down
            }
        }
    }

    /// Number of services with an outstanding pending wake.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Wait for the service's wake to finish. All concurrent callers share
    /// one pending wake and receive the same outcome.
    pub async fn attach(self: &Arc<Self>, route_id: &str) -> Result<(), WakeError> {
        let mut rx = {
            let mut pending = lock(&self.pending);
            match pending.get(route_id) {
                Some(rx) => rx.clone(),
                None => {
                    let (tx, rx) = watch::channel(None);
                    pending.insert(route_id.to_string(), rx.clone());
                    tokio::spawn(Arc::clone(self).watch_wake(route_id.to_string(), tx));
                    debug!(%route_id, "pending wake created");
                    rx
                }
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(WakeError::Abandoned))
    }

    async fn watch_wake(self: Arc<Self>, route_id: String, tx: watch::Sender<WakeOutcome>) {
        let settings = &self.ctx.settings;
        let deadline = Instant::now() + settings.deadline;

        let outcome = loop {
            // READY wins over a deadline reached on the same check.
            if self.ctx.state(&route_id) == Some(WakeState::Ready) {
                lock(&self.pending).remove(&route_id);
                tokio::time::sleep(settings.release_delay).await;
                info!(%route_id, "waiting calls released");
                break Ok(());
            }
            if Instant::now() >= deadline {
                warn!(%route_id, deadline = ?settings.deadline, "wake deadline exceeded");
                lock(&self.pending).remove(&route_id);
                break Err(WakeError::DeadlineExceeded);
            }
            tokio::time::sleep(settings.check_interval).await;
        };

        let _ = tx.send(Some(outcome));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
