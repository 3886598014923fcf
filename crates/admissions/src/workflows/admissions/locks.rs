use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::domain::ApplicationId;

/// Per-application mutual exclusion. Operations on different applications never contend.
#[derive(Debug, Default)]
pub(crate) struct ApplicationLocks {
    table: Mutex<HashMap<ApplicationId, Arc<Mutex<()>>>>,
}

impl ApplicationLocks {
    pub(crate) fn handle(&self, id: &ApplicationId) -> Arc<Mutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.entry(id.clone()).or_default().clone()
    }

    pub(crate) fn forget(&self, id: &ApplicationId) {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}

pub(crate) fn hold(handle: &Mutex<()>) -> MutexGuard<'_, ()> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}
