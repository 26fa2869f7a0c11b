use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::Coll;

/// The counter that assigns election IDs.
pub const ELECTION_ID_COUNTER: &str = "election_id";

/// A counter object used to implement auto-increment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub name: String,
    pub next: u32,
}

impl Counter {
    /// Create a new `Counter` starting at the given value.
    pub fn new(name: impl Into<String>, start: u32) -> Self {
        Self {
            name: name.into(),
            next: start,
        }
    }

    /// Atomically retrieve the next value of the named counter.
    pub async fn next(counters: &Coll<Counter>, name: &str) -> Result<u32> {
        let update = doc! {
            "$inc": { "next": 1 }
        };
        let options: FindOneAndUpdateOptions = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update(doc! {"_id": name}, update, options)
            .await?
            .ok_or_else(|| Error::not_found(format!("Counter {}", name)))?;
        Ok(counter.next)
    }
}

/// Ensure the election ID counter exists, starting at 1.
///
/// This operation is idempotent: an existing counter is left untouched.
pub async fn ensure_election_id_counter_exists(counters: &Coll<Counter>) -> Result<()> {
    let existing = counters
        .find_one(doc! {"_id": ELECTION_ID_COUNTER}, None)
        .await?;
    if existing.is_none() {
        // A concurrent insert of the same `_id` would fail, but there is
        // exactly one bot process per deployment.
        counters
            .insert_one(Counter::new(ELECTION_ID_COUNTER, 1), None)
            .await?;
        info!("Created election ID counter");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use mongodb::Database;

    #[bot_test]
    async fn counter_increment(counters: Coll<Counter>) {
        const START: u32 = 5;

        counters
            .insert_one(Counter::new("test_counter", START), None)
            .await
            .unwrap();

        // Get the next value.
        let next = Counter::next(&counters, "test_counter").await.unwrap();
        assert_eq!(next, START);

        // Check the counter was incremented.
        let counter = counters
            .find_one(doc! {"_id": "test_counter"}, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(counter.next, START + 1);
    }

    #[bot_test]
    async fn election_counter_bootstrap_is_idempotent(db: Database) {
        let counters = Coll::<Counter>::from_db(&db);
        ensure_election_id_counter_exists(&counters).await.unwrap();
        ensure_election_id_counter_exists(&counters).await.unwrap();

        let count = counters.count_documents(None, None).await.unwrap();
        assert_eq!(count, 1);

        let first = Counter::next(&counters, ELECTION_ID_COUNTER).await.unwrap();
        assert_eq!(first, 1);
    }
}
