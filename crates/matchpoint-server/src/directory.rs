use std::collections::HashMap;
use std::sync::Mutex;

use matchpoint_core::game::UserId;

/// Display-name lookup for match and roster payloads. Profile storage is
/// owned by the wider platform; the coordinator only needs a name per id.
pub trait PlayerDirectory: Send + Sync {
    fn display_name(&self, user_id: UserId) -> String;
}

/// In-memory directory with a deterministic fallback name.
#[derive(Default)]
pub struct MemoryDirectory {
    names: Mutex<HashMap<UserId, String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: UserId, name: impl Into<String>) {
        self.names.lock().unwrap().insert(user_id, name.into());
    }
}

impl PlayerDirectory for MemoryDirectory {
    fn display_name(&self, user_id: UserId) -> String {
        self.names
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| format!("Player {user_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_generated_name() {
        let directory = MemoryDirectory::new();
        assert_eq!(directory.display_name(7), "Player 7");

        directory.insert(7, "Ada");
        assert_eq!(directory.display_name(7), "Ada");
    }
}
