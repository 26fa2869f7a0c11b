use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::mongodb::Id;

/// The per-election holding room, where participants wait before their first
/// round assignment.
pub const HOLDING_ROOM_INDEX: i32 = -1;

/// Synthetic round number for the chief-delegate room created after the last
/// real round.
pub const CHIEF_DELEGATE_ROUND: u32 = u32::MAX;

/// Bookkeeping for rooms created ahead of need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predisposed {
    pub is_predisposed: bool,
    pub predisposed_by: Option<String>,
    #[serde(default, with = "predisposed_at_serde")]
    pub predisposed_at: Option<DateTime<Utc>>,
    pub share_link: Option<String>,
}

impl Predisposed {
    /// Metadata for a room created on demand, not ahead of need.
    pub fn none() -> Self {
        Self {
            is_predisposed: false,
            predisposed_by: None,
            predisposed_at: None,
            share_link: None,
        }
    }

    pub fn by(account: &str, at: DateTime<Utc>, share_link: Option<String>) -> Self {
        Self {
            is_predisposed: true,
            predisposed_by: Some(account.to_string()),
            predisposed_at: Some(at),
            share_link,
        }
    }
}

// `chrono_datetime_as_bson_datetime` does not handle `Option`, so wrap it.
mod predisposed_at_serde {
    use chrono::{DateTime, Utc};
    use mongodb::bson::DateTime as BsonDateTime;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value
            .map(BsonDateTime::from_chrono)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<BsonDateTime>::deserialize(deserializer)?;
        Ok(value.map(BsonDateTime::to_chrono))
    }
}

/// Core room data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCore {
    pub election_id: u32,
    pub round: u32,
    pub room_index: i32,
    pub short_name: String,
    pub long_name: String,
    /// The chat platform's room ID; `None` until the room actually exists
    /// there.
    pub chat_id: Option<String>,
    #[serde(flatten)]
    pub predisposed: Predisposed,
}

impl RoomCore {
    /// A numbered round room, not yet created on the chat platform.
    pub fn for_slot(election_id: u32, round: u32, room_index: i32) -> Self {
        let (short_name, long_name) = room_names(election_id, round, room_index);
        Self {
            election_id,
            round,
            room_index,
            short_name,
            long_name,
            chat_id: None,
            predisposed: Predisposed::none(),
        }
    }

    pub fn is_holding_room(&self) -> bool {
        self.room_index == HOLDING_ROOM_INDEX
    }
}

/// A room from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub room: RoomCore,
}

/// A room without an ID, ready for insertion.
pub type NewRoom = RoomCore;

impl Deref for Room {
    type Target = RoomCore;

    fn deref(&self) -> &Self::Target {
        &self.room
    }
}

impl DerefMut for Room {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.room
    }
}

/// Names for a pool room awaiting its first assignment.
pub fn free_room_names(index: i32) -> (String, String) {
    (
        format!("free-g{:02}", index + 1),
        format!("Eden Community Room {}", index + 1),
    )
}

/// The display names for a room slot.
pub fn room_names(election_id: u32, round: u32, room_index: i32) -> (String, String) {
    match (round, room_index) {
        (_, HOLDING_ROOM_INDEX) => (
            format!("e{election_id}-lobby"),
            format!("Election {election_id} - Lobby"),
        ),
        (CHIEF_DELEGATE_ROUND, _) => (
            format!("e{election_id}-delegates"),
            format!("Election {election_id} - Chief Delegates"),
        ),
        (round, index) => (
            format!("e{election_id}-r{round}-g{:02}", index + 1),
            format!("Election {election_id} - Round {round} Group {}", index + 1),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_names() {
        let (short, long) = room_names(7, 2, 4);
        assert_eq!(short, "e7-r2-g05");
        assert_eq!(long, "Election 7 - Round 2 Group 5");
    }

    #[test]
    fn holding_room_names() {
        let (short, long) = room_names(7, 0, HOLDING_ROOM_INDEX);
        assert_eq!(short, "e7-lobby");
        assert_eq!(long, "Election 7 - Lobby");
    }

    #[test]
    fn chief_delegate_names() {
        let (short, _) = room_names(7, CHIEF_DELEGATE_ROUND, 0);
        assert_eq!(short, "e7-delegates");
    }
}
