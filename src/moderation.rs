use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

/// Process-wide, room-scoped blocked-user sets.
///
/// Starts empty and is never persisted: a restart clears every block, while
/// lock and pin live on the room record and survive. Each mutation is a
/// single lock-scoped map operation on one (room, user) pair.
#[derive(Debug, Clone, Default)]
pub struct ModerationRegistry {
    blocked: Arc<Mutex<HashMap<String, HashSet<String>>>>,
}

impl ModerationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn block(&self, room_id: &str, user_id: &str) {
        let mut blocked = self.blocked.lock().await;
        blocked
            .entry(room_id.to_owned())
            .or_default()
            .insert(user_id.to_owned());
    }

    pub async fn unblock(&self, room_id: &str, user_id: &str) {
        let mut blocked = self.blocked.lock().await;
        if let Some(set) = blocked.get_mut(room_id) {
            set.remove(user_id);
            if set.is_empty() {
                blocked.remove(room_id);
            }
        }
    }

    pub async fn is_blocked(&self, room_id: &str, user_id: &str) -> bool {
        let blocked = self.blocked.lock().await;
        blocked.get(room_id).is_some_and(|set| set.contains(user_id))
    }
}
