use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Best-effort, same-process serialization of mutating operations per
/// volume. The overall design assumes *external* serialization (at
/// most one active backup or delete per volume at a time) and treats
/// the `VolumeRecord` read-modify-write as the caller's responsibility —
/// this registry does not change that contract or provide any
/// cross-process guarantee. It exists so a
/// single process driving concurrent operations against the same
/// volume (e.g. a test harness) doesn't race on its own accord.
#[derive(Clone, Default)]
pub struct VolumeLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl VolumeLocks {
    pub fn new() -> Self {
        VolumeLocks::default()
    }

    fn lock_for(&self, volume_name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(volume_name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn acquire(&self, volume_name: &str) -> OwnedMutexGuard<()> {
        self.lock_for(volume_name).lock_owned().await
    }
}
