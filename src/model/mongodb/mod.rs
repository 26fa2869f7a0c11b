mod bson;
mod collection;
mod counter;

pub use bson::{as_bson_datetime, truncate_to_seconds, Id};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use counter::{ensure_election_id_counter_exists, Counter, ELECTION_ID_COUNTER};
