use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<Mutex<()>>>;

/// One async mutex per room, so turns of the same room never interleave.
///
/// A room's entry lives only while someone holds or waits for its lock.
#[derive(Debug, Clone, Default)]
pub struct RoomLocks {
    rooms: Arc<StdMutex<LockMap>>,
}

impl RoomLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other holder exists for `room_id`.
    pub async fn acquire(&self, room_id: &str) -> RoomGuard {
        let lock = {
            let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(rooms.entry(room_id.to_owned()).or_default())
        };

        RoomGuard {
            room_id: room_id.to_owned(),
            rooms: Arc::clone(&self.rooms),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Rooms currently locked or awaited.
    #[must_use]
    pub fn active_rooms(&self) -> usize {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Exclusive access to one room; released on drop.
#[derive(Debug)]
pub struct RoomGuard {
    room_id: String,
    rooms: Arc<StdMutex<LockMap>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RoomGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map still points at the mutex: nobody holds or waits for it.
        if rooms
            .get(&self.room_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            rooms.remove(&self.room_id);
        }
    }
}
