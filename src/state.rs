use std::sync::Arc;

use sqlx::SqlitePool;

use crate::notify::{Notifier, PushGateway};
use crate::services::{ClosureScheduler, LifecycleController, PasscodeRotator, PresenceLedger};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub notifier: Arc<dyn Notifier>,
    pub push: Arc<dyn PushGateway>,
    pub scheduler: Arc<ClosureScheduler>,
}

impl AppState {
    pub fn new(db: SqlitePool, notifier: Arc<dyn Notifier>, push: Arc<dyn PushGateway>) -> Self {
        let lifecycle = LifecycleController::new(db.clone(), notifier.clone(), push.clone());
        let scheduler = Arc::new(ClosureScheduler::new(db.clone(), lifecycle));
        Self {
            db,
            notifier,
            push,
            scheduler,
        }
    }

    pub fn lifecycle(&self) -> LifecycleController {
        LifecycleController::new(self.db.clone(), self.notifier.clone(), self.push.clone())
    }

    pub fn presence(&self) -> PresenceLedger {
        PresenceLedger::new(self.db.clone(), self.notifier.clone())
    }

    pub fn passcodes(&self) -> PasscodeRotator {
        PasscodeRotator::new(self.db.clone(), self.notifier.clone())
    }
}
