use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::db::repository;
use crate::error::AppError;
use crate::models::Lecture;
use crate::services::LifecycleController;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryStats {
    pub closed: usize,
    pub rescheduled: usize,
}

struct Timer {
    generation: u64,
    handle: AbortHandle,
}

/// Lecture closure timers.
///
/// Timers are a cache of the deadline stored on each lecture row. Firing goes
/// through [`LifecycleController::close_if_due`], which re-reads the row, so a
/// stale or duplicate timer is a no-op.
pub struct ClosureScheduler {
    db: SqlitePool,
    lifecycle: LifecycleController,
    timers: Arc<Mutex<HashMap<String, Timer>>>,
    generation: AtomicU64,
}

impl ClosureScheduler {
    pub fn new(db: SqlitePool, lifecycle: LifecycleController) -> Self {
        Self {
            db,
            lifecycle,
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Arms a one-shot timer at the lecture's deadline, replacing any timer
    /// already pending for it.
    pub fn schedule(&self, lecture: &Lecture) {
        if !lecture.is_active() {
            self.cancel(&lecture.id);
            return;
        }

        let delay = (lecture.deadline() - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let lecture_id = lecture.id.clone();
        let lifecycle = self.lifecycle.clone();
        let timers = self.timers.clone();

        debug!("closure for lecture {} scheduled in {:?}", lecture_id, delay);

        // Held across the spawn so the task cannot finish and clean up before
        // its own entry exists.
        let Ok(mut registry) = self.timers.lock() else {
            warn!("closure timer registry is poisoned, lecture {} not scheduled", lecture_id);
            return;
        };

        let task_id = lecture_id.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            match lifecycle.close_if_due(&task_id).await {
                Ok(true) => info!("scheduled closure fired for lecture {}", task_id),
                Ok(false) => debug!("scheduled closure for lecture {} was a no-op", task_id),
                Err(e) => warn!("scheduled closure for lecture {} failed: {:?}", task_id, e),
            }

            if let Ok(mut timers) = timers.lock() {
                if timers.get(&task_id).is_some_and(|t| t.generation == generation) {
                    timers.remove(&task_id);
                }
            }
        });

        let timer = Timer {
            generation,
            handle: task.abort_handle(),
        };
        if let Some(previous) = registry.insert(lecture_id, timer) {
            previous.handle.abort();
        }
    }

    /// Drops the pending timer, if any. Returns whether one was pending.
    pub fn cancel(&self, lecture_id: &str) -> bool {
        let Ok(mut timers) = self.timers.lock() else {
            return false;
        };
        match timers.remove(lecture_id) {
            Some(timer) => {
                timer.handle.abort();
                debug!("closure timer for lecture {} cancelled", lecture_id);
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, lecture_id: &str) -> bool {
        self.timers
            .lock()
            .map(|timers| timers.contains_key(lecture_id))
            .unwrap_or(false)
    }

    pub fn pending(&self) -> usize {
        self.timers.lock().map(|timers| timers.len()).unwrap_or(0)
    }

    /// Rebuilds timers from persisted lecture state. Overdue lectures are
    /// closed right away; the rest are re-armed.
    pub async fn recover(&self) -> Result<RecoveryStats, AppError> {
        let now = Utc::now();
        let mut stats = RecoveryStats::default();

        for lecture in repository::fetch_active_lectures(&self.db).await? {
            if lecture.is_overdue(now) {
                if self.lifecycle.close_if_due(&lecture.id).await? {
                    stats.closed += 1;
                }
                self.cancel(&lecture.id);
            } else if !self.is_scheduled(&lecture.id) {
                self.schedule(&lecture);
                stats.rescheduled += 1;
            }
        }

        Ok(stats)
    }

    /// Periodic backstop sweep. Never returns.
    pub async fn start(self: Arc<Self>, interval: Duration) {
        info!("Starting closure sweep (interval: {:?})", interval);

        loop {
            tokio::time::sleep(interval).await;

            match self.recover().await {
                Ok(stats) if stats.closed > 0 || stats.rescheduled > 0 => {
                    info!(
                        "Closure sweep completed - closed: {}, rescheduled: {}",
                        stats.closed, stats.rescheduled
                    );
                }
                Ok(_) => debug!("Closure sweep found nothing to do"),
                Err(e) => warn!("Closure sweep failed: {:?}", e),
            }
        }
    }
}
