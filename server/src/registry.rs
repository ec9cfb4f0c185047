//! The fixed set of rooms, created once at startup.

use crate::room::GameRoom;
use shared::ROOM_NAMES;
use std::sync::Arc;

/// Lookup table for the statically-provisioned rooms. Rooms live for the
/// process lifetime; "free" means "exists" — there are no occupancy limits.
pub struct RoomRegistry {
    rooms: Vec<Arc<GameRoom>>,
}

impl RoomRegistry {
    pub fn new(round_seconds: u32) -> Self {
        Self {
            rooms: ROOM_NAMES
                .iter()
                .map(|name| Arc::new(GameRoom::new(name, round_seconds)))
                .collect(),
        }
    }

    pub fn room_names(&self) -> Vec<String> {
        self.rooms.iter().map(|room| room.name.clone()).collect()
    }

    pub fn find(&self, name: &str) -> Option<Arc<GameRoom>> {
        self.rooms.iter().find(|room| room.name == name).cloned()
    }
}
