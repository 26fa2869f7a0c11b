use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{self, serde_helpers::chrono_datetime_as_bson_datetime, Bson};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use super::mongodb::{truncate_to_seconds, Id};

/// Which participants a reminder addresses, keyed off their attendance flag.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReminderGroup {
    Attended,
    NotAttended,
    Both,
}

impl ReminderGroup {
    pub fn includes(self, attended: bool) -> bool {
        match self {
            Self::Attended => attended,
            Self::NotAttended => !attended,
            Self::Both => true,
        }
    }
}

impl From<ReminderGroup> for Bson {
    fn from(group: ReminderGroup) -> Self {
        bson::to_bson(&group).unwrap() // Infallible.
    }
}

/// Core reminder data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderCore {
    pub election_id: u32,
    /// `None` for whole-election reminders, `Some` for round-end reminders.
    pub round: Option<u32>,
    pub group: ReminderGroup,
    /// Trigger time, truncated to whole seconds.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub date_time_before: DateTime<Utc>,
}

impl ReminderCore {
    pub fn new(
        election_id: u32,
        round: Option<u32>,
        group: ReminderGroup,
        date_time_before: DateTime<Utc>,
    ) -> Self {
        Self {
            election_id,
            round,
            group,
            date_time_before: truncate_to_seconds(date_time_before),
        }
    }
}

/// A reminder without an ID, ready for insertion.
pub type NewReminder = ReminderCore;

/// A reminder from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub reminder: ReminderCore,
}

impl Deref for Reminder {
    type Target = ReminderCore;

    fn deref(&self) -> &Self::Target {
        &self.reminder
    }
}

impl DerefMut for Reminder {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reminder
    }
}

/// Delivery outcome for one recipient of one reminder, stored as an integer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum SendStatus {
    NotSent = 0,
    Sent = 1,
    /// Transport failure; eligible for retry on the next dispatch pass.
    Error = 2,
    /// Permanent failure (e.g. the recipient never talked to the bot).
    Failed = 3,
}

impl SendStatus {
    /// Terminal statuses are never retried.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl From<SendStatus> for Bson {
    fn from(status: SendStatus) -> Self {
        Bson::Int32(status as i32)
    }
}

/// The per-recipient delivery/dedup record for a given reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSentCore {
    pub reminder_id: Id,
    pub account: String,
    pub status: SendStatus,
}

/// A sent-record without an ID, ready for insertion.
pub type NewReminderSent = ReminderSentCore;

/// A sent-record from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSent {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub sent: ReminderSentCore,
}

impl Deref for ReminderSent {
    type Target = ReminderSentCore;

    fn deref(&self) -> &Self::Target {
        &self.sent
    }
}
