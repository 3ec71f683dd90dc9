use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::info;
use uuid::Uuid;

use crate::intake::controller::{ControllerDeps, IntakeController, IntakeHandle};

/// Live intake sessions, keyed by session id. Each entry owns a running controller.
#[derive(Clone)]
pub struct SessionRegistry {
    deps: ControllerDeps,
    sessions: Arc<RwLock<HashMap<Uuid, IntakeHandle>>>,
}

impl SessionRegistry {
    pub fn new(deps: ControllerDeps) -> Self {
        Self {
            deps,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn open(&self) -> IntakeHandle {
        let handle = IntakeController::spawn(self.deps.clone());
        self.sessions.write().await.insert(handle.id(), handle.clone());
        handle
    }

    pub async fn get(&self, id: Uuid) -> Option<IntakeHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Removes the session and stops its controller. `false` if it was unknown.
    pub async fn close(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id);
        match removed {
            Some(handle) => {
                handle.close();
                info!(session_id = %id, "Intake session removed");
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Closes every session whose last activity is at least `ttl` ago.
    /// Returns how many were closed.
    pub async fn reap_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<IntakeHandle> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, handle)| now.duration_since(handle.last_activity()) >= ttl)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for handle in &expired {
            handle.close();
            info!(session_id = %handle.id(), "Idle intake session closed");
        }
        expired.len()
    }

    /// Runs `reap_idle` every `every` for as long as the runtime lives.
    pub fn spawn_reaper(&self, ttl: Duration, every: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                registry.reap_idle(ttl).await;
            }
        })
    }
}
