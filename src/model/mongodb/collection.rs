use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::{
    election::Election,
    participant::Participant,
    reminder::{NewReminder, NewReminderSent, Reminder, ReminderSent},
    room::{NewRoom, Room},
};

use super::counter::Counter;

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Election collection
const ELECTIONS: &str = "elections";
impl MongoCollection for Election {
    const NAME: &'static str = ELECTIONS;
}

// Room collections
const ROOMS: &str = "rooms";
impl MongoCollection for Room {
    const NAME: &'static str = ROOMS;
}
impl MongoCollection for NewRoom {
    const NAME: &'static str = ROOMS;
}

// Participant collection
const PARTICIPANTS: &str = "participants";
impl MongoCollection for Participant {
    const NAME: &'static str = PARTICIPANTS;
}

// Reminder collections
const REMINDERS: &str = "reminders";
impl MongoCollection for Reminder {
    const NAME: &'static str = REMINDERS;
}
impl MongoCollection for NewReminder {
    const NAME: &'static str = REMINDERS;
}

const REMINDERS_SENT: &str = "reminders_sent";
impl MongoCollection for ReminderSent {
    const NAME: &'static str = REMINDERS_SENT;
}
impl MongoCollection for NewReminderSent {
    const NAME: &'static str = REMINDERS_SENT;
}

// Counter collection
const COUNTERS: &str = "counters";
impl MongoCollection for Counter {
    const NAME: &'static str = COUNTERS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Election collection: one election per target date.
    let election_index = IndexModel::builder()
        .keys(doc! {"date": 1})
        .options(unique.clone())
        .build();
    Coll::<Election>::from_db(db)
        .create_index(election_index, None)
        .await?;

    // Room collection: at most one room per slot once fully created.
    // The partial filter leaves rooms still waiting for their chat room out
    // of the constraint.
    let room_options = IndexOptions::builder()
        .unique(true)
        .partial_filter_expression(doc! {"chat_id": {"$type": "string"}})
        .build();
    let room_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "round": 1, "room_index": 1})
        .options(room_options)
        .build();
    Coll::<Room>::from_db(db)
        .create_index(room_index, None)
        .await?;

    // Reminder collection: one trigger per slot.
    let reminder_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "round": 1, "group": 1, "date_time_before": 1})
        .options(unique.clone())
        .build();
    Coll::<Reminder>::from_db(db)
        .create_index(reminder_index, None)
        .await?;

    // Sent-record collection: this uniqueness is the send dedup guard.
    let sent_index = IndexModel::builder()
        .keys(doc! {"reminder_id": 1, "account": 1})
        .options(unique)
        .build();
    Coll::<ReminderSent>::from_db(db)
        .create_index(sent_index, None)
        .await?;

    Ok(())
}
