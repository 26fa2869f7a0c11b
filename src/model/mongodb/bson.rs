use std::fmt::{self, Display, Formatter};
use std::ops::Deref;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document};
use serde::{Deserialize, Serialize};

/// A database row ID.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id(ObjectId);

impl Id {
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    /// A filter document matching exactly this ID.
    pub fn as_doc(&self) -> Document {
        doc! {"_id": self.0}
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Id {
    type Target = ObjectId;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = mongodb::bson::oid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse::<ObjectId>()?))
    }
}

impl From<ObjectId> for Id {
    fn from(id: ObjectId) -> Self {
        Self(id)
    }
}

impl From<Id> for Bson {
    fn from(id: Id) -> Self {
        Bson::ObjectId(id.0)
    }
}

/// Convert a chrono datetime into its BSON form for use in filter documents.
pub fn as_bson_datetime(datetime: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_chrono(datetime)
}

/// Drop the sub-second part of a datetime.
///
/// Reminder trigger times are matched on whole seconds, both because the
/// upstream offsets are whole seconds and because BSON datetimes only carry
/// millisecond precision anyway.
pub fn truncate_to_seconds(datetime: DateTime<Utc>) -> DateTime<Utc> {
    datetime - Duration::nanoseconds(i64::from(datetime.timestamp_subsec_nanos()))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn truncation_drops_subsecond_precision() {
        let precise = Utc.timestamp_opt(1_670_000_000, 987_654_321).unwrap();
        let truncated = truncate_to_seconds(precise);
        assert_eq!(truncated.timestamp(), 1_670_000_000);
        assert_eq!(truncated.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn truncation_is_idempotent() {
        let precise = Utc.timestamp_opt(1_670_000_000, 123_000_000).unwrap();
        let once = truncate_to_seconds(precise);
        assert_eq!(once, truncate_to_seconds(once));
    }
}
