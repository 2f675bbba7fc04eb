//! Room directory: which connections are in which room, in join order.

use std::collections::HashMap;

/// Rooms "1" through "10" keep their history and only age out.
pub const PERMANENT_ROOMS: [&str; 10] = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "10"];

pub fn is_permanent_room(room: &str) -> bool {
    PERMANENT_ROOMS.contains(&room)
}

/// Room name → member connection ids.
///
/// A room exists here only while it has at least one member; removing the
/// last member removes the room in the same call.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<String, Vec<String>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `connection_id` to `room`, creating the room if needed.
    /// Returns false if it was already a member.
    pub fn add_member(&mut self, room: &str, connection_id: &str) -> bool {
        let members = self.rooms.entry(room.to_string()).or_default();
        if members.iter().any(|m| m == connection_id) {
            return false;
        }
        members.push(connection_id.to_string());
        true
    }

    /// Remove `connection_id` from `room`. Returns true if it was a member.
    pub fn remove_member(&mut self, room: &str, connection_id: &str) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        let before = members.len();
        members.retain(|m| m != connection_id);
        let removed = members.len() != before;
        if members.is_empty() {
            self.rooms.remove(room);
        }
        removed
    }

    /// Members in join order. Empty for unknown rooms.
    pub fn members(&self, room: &str) -> &[String] {
        self.rooms.get(room).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn room_names(&self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_rooms_are_exactly_one_to_ten() {
        for room in ["1", "5", "10"] {
            assert!(is_permanent_room(room));
        }
        for room in ["0", "11", "01", "lobby", " 1", ""] {
            assert!(!is_permanent_room(room), "{room:?}");
        }
    }

    #[test]
    fn members_keep_join_order() {
        let mut dir = RoomDirectory::new();
        dir.add_member("r", "c3");
        dir.add_member("r", "c1");
        dir.add_member("r", "c2");
        assert_eq!(dir.members("r"), ["c3", "c1", "c2"]);

        assert!(!dir.add_member("r", "c1"));
        assert_eq!(dir.members("r").len(), 3);
    }

    #[test]
    fn last_removal_deletes_room() {
        let mut dir = RoomDirectory::new();
        dir.add_member("r", "c1");
        dir.add_member("r", "c2");

        assert!(dir.remove_member("r", "c1"));
        assert!(dir.contains("r"));
        assert!(dir.remove_member("r", "c2"));
        assert!(!dir.contains("r"));
        assert!(dir.is_empty());
        assert!(dir.members("r").is_empty());
    }

    #[test]
    fn removing_non_member_is_harmless() {
        let mut dir = RoomDirectory::new();
        dir.add_member("r", "c1");
        assert!(!dir.remove_member("r", "c9"));
        assert!(!dir.remove_member("missing", "c1"));
        assert_eq!(dir.room_names(), vec!["r".to_string()]);
    }
}
