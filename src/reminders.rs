use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson},
    options::UpdateOptions,
    Database,
};

use crate::chat::ChatClient;
use crate::error::Result;
use crate::model::{
    election::Election,
    mongodb::{as_bson_datetime, Coll},
    participant::Participant,
    reminder::{NewReminder, Reminder, ReminderCore, ReminderGroup, ReminderSent, SendStatus},
    room::Room,
};

/// Message per whole-election reminder offset, in minutes before the start.
const ELECTION_MESSAGES: &[(i64, &str)] = &[
    (1440, "The election starts tomorrow. Check in with your community and make sure you can attend."),
    (60, "The election starts in about an hour. Get ready!"),
    (5, "The election is about to start. Join your lobby now."),
];

/// Message per round-end reminder offset, in minutes before the boundary.
const ROUND_MESSAGES: &[(i64, &str)] = &[
    (10, "About ten minutes left in this round. Make sure your group has converged on a delegate."),
    (2, "This round is ending. Cast your final vote now."),
];

/// A reminder the caller wants to exist, before ID assignment and second
/// truncation.
#[derive(Debug, Clone)]
pub struct ReminderSpec {
    pub round: Option<u32>,
    pub group: ReminderGroup,
    pub at: DateTime<Utc>,
}

/// Pick the message whose configured offset is closest to the actual
/// remaining time. A late-running poll thus still produces a sensible
/// "starting soon" message instead of none at all.
pub fn nearest_message<'a>(remaining: Duration, table: &[(i64, &'a str)]) -> Option<&'a str> {
    let minutes = remaining.num_minutes();
    table
        .iter()
        .min_by_key(|(offset, _)| (offset - minutes).abs())
        .map(|&(_, text)| text)
}

/// Select the participants still owed a delivery attempt for one reminder.
///
/// Whole-election reminders are first-touch: any recorded outcome, even an
/// error, suppresses another attempt. Round reminders retry errors but never
/// resend past a terminal outcome.
pub fn eligible_recipients<'a>(
    participants: &'a [Participant],
    outcomes: &HashMap<String, SendStatus>,
    group: ReminderGroup,
    first_touch: bool,
) -> Vec<&'a Participant> {
    participants
        .iter()
        .filter(|p| group.includes(p.attended))
        .filter(|p| match outcomes.get(&p.account) {
            None => true,
            Some(_) if first_touch => false,
            Some(status) => !status.is_terminal(),
        })
        .collect()
}

/// Creates reminder rows ahead of time and dispatches the ones that come due,
/// with per-recipient dedup through the sent-record collection.
pub struct ReminderEngine {
    db: Database,
    chat: ChatClient,
}

impl ReminderEngine {
    pub fn new(db: Database, chat: ChatClient) -> Self {
        Self { db, chat }
    }

    /// Make sure a reminder row exists for every spec. Matching is on the
    /// full slot including the second-truncated trigger time, so repeated
    /// polls never duplicate a reminder.
    pub async fn ensure_reminders(&self, election: &Election, specs: &[ReminderSpec]) -> Result<()> {
        let reminders = Coll::<Reminder>::from_db(&self.db);
        let new_reminders = Coll::<NewReminder>::from_db(&self.db);

        for spec in specs {
            let core = ReminderCore::new(election.id, spec.round, spec.group, spec.at);
            let filter = doc! {
                "election_id": core.election_id,
                "round": core.round.map(Bson::from).unwrap_or(Bson::Null),
                "group": core.group,
                "date_time_before": as_bson_datetime(core.date_time_before),
            };
            if reminders.find_one(filter, None).await?.is_none() {
                debug!(
                    "Creating reminder for election {} round {:?} at {}",
                    core.election_id, core.round, core.date_time_before
                );
                new_reminders.insert_one(&core, None).await?;
            }
        }
        Ok(())
    }

    /// Dispatch every reminder of the election (whole-election for
    /// `round == None`, else that round's) whose trigger time falls within
    /// `[now - tolerance, now]`, i.e. is due but not yet stale.
    ///
    /// `boundary` is the event the reminders count down to (election start or
    /// round end) and drives message selection. Reminders with overlapping
    /// tolerance windows each dispatch independently.
    pub async fn dispatch_due(
        &self,
        election: &Election,
        round: Option<u32>,
        boundary: DateTime<Utc>,
        tolerance: Duration,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let reminders = Coll::<Reminder>::from_db(&self.db);

        let filter = doc! {
            "election_id": election.id,
            "round": round.map(Bson::from).unwrap_or(Bson::Null),
            "date_time_before": {
                "$lte": as_bson_datetime(now),
                "$gte": as_bson_datetime(now - tolerance),
            },
        };
        let due: Vec<Reminder> = reminders.find(filter, None).await?.try_collect().await?;
        if due.is_empty() {
            return Ok(());
        }

        let participants = self.round_participants(election, round).await?;
        let table = if round.is_some() {
            ROUND_MESSAGES
        } else {
            ELECTION_MESSAGES
        };
        let text = match nearest_message(boundary - now, table) {
            Some(text) => text,
            None => return Ok(()),
        };

        for reminder in due {
            self.dispatch_one(&reminder, &participants, text, round.is_none())
                .await?;
        }
        Ok(())
    }

    /// All participants currently sitting in the election's rooms (all rooms
    /// for whole-election reminders, the round's numbered rooms otherwise).
    async fn round_participants(
        &self,
        election: &Election,
        round: Option<u32>,
    ) -> Result<Vec<Participant>> {
        let rooms = Coll::<Room>::from_db(&self.db);
        let filter = match round {
            Some(round) => doc! {
                "election_id": election.id,
                "round": round,
                "room_index": {"$gte": 0},
            },
            None => doc! {"election_id": election.id},
        };
        let rooms: Vec<Room> = rooms.find(filter, None).await?.try_collect().await?;
        let room_ids: Vec<Bson> = rooms.iter().map(|room| Bson::from(room.id)).collect();

        let participants = Coll::<Participant>::from_db(&self.db);
        let members = participants
            .find(doc! {"room_id": {"$in": room_ids}}, None)
            .await?
            .try_collect()
            .await?;
        Ok(members)
    }

    async fn dispatch_one(
        &self,
        reminder: &Reminder,
        participants: &[Participant],
        text: &str,
        first_touch: bool,
    ) -> Result<()> {
        let sent = Coll::<ReminderSent>::from_db(&self.db);
        let rows: Vec<ReminderSent> = sent
            .find(doc! {"reminder_id": reminder.id}, None)
            .await?
            .try_collect()
            .await?;
        let outcomes: HashMap<String, SendStatus> = rows
            .into_iter()
            .map(|row| (row.account.clone(), row.status))
            .collect();

        let recipients = eligible_recipients(participants, &outcomes, reminder.group, first_touch);
        if recipients.is_empty() {
            return Ok(());
        }
        info!(
            "Dispatching reminder {} to {} recipients",
            reminder.id,
            recipients.len()
        );

        let mut errors = 0usize;
        for participant in recipients {
            let status = self.send_to(participant, text).await;
            if status == SendStatus::Error {
                errors += 1;
            }
            self.record_outcome(reminder, &participant.account, status)
                .await?;
        }
        if errors > 0 {
            warn!(
                "Reminder {}: {errors} deliveries failed and will be retried",
                reminder.id
            );
        }
        Ok(())
    }

    /// One delivery attempt. Failures are converted into a status for the
    /// sent-record; they never abort the batch.
    async fn send_to(&self, participant: &Participant, text: &str) -> SendStatus {
        let handle = match &participant.chat_handle {
            Some(handle) => handle,
            None => {
                debug!("{} has no chat handle, cannot deliver", participant.account);
                return SendStatus::Failed;
            }
        };
        match self.chat.is_known(handle).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("{handle} has never talked to the bot, cannot deliver");
                return SendStatus::Failed;
            }
            Err(e) => {
                warn!("Failed to check {handle} against the chat platform: {e}");
                return SendStatus::Error;
            }
        }
        match self.chat.send_message(handle, text, &[]).await {
            Ok(true) => SendStatus::Sent,
            Ok(false) => SendStatus::Error,
            Err(e) => {
                warn!("Failed to deliver reminder to {handle}: {e}");
                SendStatus::Error
            }
        }
    }

    /// Record the outcome of a delivery attempt, replacing any previous
    /// non-terminal outcome for this recipient.
    async fn record_outcome(
        &self,
        reminder: &Reminder,
        account: &str,
        status: SendStatus,
    ) -> Result<()> {
        let sent = Coll::<ReminderSent>::from_db(&self.db);
        let filter = doc! {"reminder_id": reminder.id, "account": account};
        let update = doc! {"$set": {"status": status}};
        let options = UpdateOptions::builder().upsert(true).build();
        sent.update_one(filter, update, options).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use mongodb::Database;

    use crate::model::election::{ElectionCore, ElectionState};

    use super::*;

    #[test]
    fn nearest_message_picks_closest_offset() {
        let table = &[(1440, "tomorrow"), (60, "hour"), (5, "now")];
        assert_eq!(
            nearest_message(Duration::minutes(1300), table),
            Some("tomorrow")
        );
        assert_eq!(nearest_message(Duration::minutes(45), table), Some("hour"));
        // A poll running late still lands on the closest configured bucket.
        assert_eq!(nearest_message(Duration::minutes(-3), table), Some("now"));
        assert_eq!(nearest_message(Duration::minutes(0), table), Some("now"));
    }

    #[test]
    fn nearest_message_of_empty_table_is_none() {
        assert_eq!(nearest_message(Duration::minutes(10), &[]), None);
    }

    fn participant(account: &str, attended: bool) -> Participant {
        let mut participant = Participant::new(account, account.to_uppercase());
        participant.attended = attended;
        participant
    }

    #[test]
    fn first_touch_reminders_never_retry() {
        let participants = vec![participant("alice", true), participant("bob", true)];
        let outcomes = HashMap::from([("alice".to_string(), SendStatus::Error)]);
        let recipients = eligible_recipients(&participants, &outcomes, ReminderGroup::Both, true);
        let accounts: Vec<_> = recipients.iter().map(|p| p.account.as_str()).collect();
        assert_eq!(accounts, vec!["bob"]);
    }

    #[test]
    fn round_reminders_retry_errors_but_not_terminal_outcomes() {
        let participants = vec![
            participant("alice", true),
            participant("bob", true),
            participant("carol", true),
            participant("dave", true),
        ];
        let outcomes = HashMap::from([
            ("alice".to_string(), SendStatus::Sent),
            ("bob".to_string(), SendStatus::Error),
            ("carol".to_string(), SendStatus::Failed),
        ]);
        let recipients = eligible_recipients(&participants, &outcomes, ReminderGroup::Both, false);
        let accounts: Vec<_> = recipients.iter().map(|p| p.account.as_str()).collect();
        assert_eq!(accounts, vec!["bob", "dave"]);
    }

    #[test]
    fn attendance_group_filters_recipients() {
        let participants = vec![participant("alice", true), participant("bob", false)];
        let outcomes = HashMap::new();
        let attended =
            eligible_recipients(&participants, &outcomes, ReminderGroup::Attended, false);
        assert_eq!(attended.len(), 1);
        assert_eq!(attended[0].account, "alice");
        let not_attended =
            eligible_recipients(&participants, &outcomes, ReminderGroup::NotAttended, false);
        assert_eq!(not_attended.len(), 1);
        assert_eq!(not_attended[0].account, "bob");
    }

    fn example_election() -> Election {
        Election {
            id: 1,
            election: ElectionCore {
                date: Utc.timestamp_opt(1_760_000_000, 0).unwrap(),
                status: ElectionState::RegistrationV1,
            },
        }
    }

    fn engine(db: &Database) -> ReminderEngine {
        ReminderEngine::new(
            db.clone(),
            ChatClient::new("http://127.0.0.1:1", "unused-test-key"),
        )
    }

    #[bot_test]
    async fn ensure_reminders_is_idempotent(db: Database, reminders: Coll<Reminder>) {
        let election = example_election();
        let specs = vec![
            ReminderSpec {
                round: None,
                group: ReminderGroup::Both,
                at: election.date - Duration::minutes(60),
            },
            ReminderSpec {
                round: None,
                group: ReminderGroup::Both,
                at: election.date - Duration::minutes(5),
            },
        ];

        let engine = engine(&db);
        engine.ensure_reminders(&election, &specs).await.unwrap();
        engine.ensure_reminders(&election, &specs).await.unwrap();

        let count = reminders.count_documents(None, None).await.unwrap();
        assert_eq!(count, 2);
    }

    #[bot_test]
    async fn dispatch_skips_fully_recorded_reminders(
        db: Database,
        reminders: Coll<NewReminder>,
        sent: Coll<ReminderSent>,
    ) {
        let election = example_election();
        let now = election.date - Duration::minutes(4);

        // One due reminder, one participant in the election's lobby, and a
        // terminal sent-record: the pass must touch nothing and send nothing
        // (the chat client points at a dead endpoint, so an attempted send
        // would surface as an error row).
        let core = ReminderCore::new(
            election.id,
            None,
            ReminderGroup::Both,
            election.date - Duration::minutes(5),
        );
        reminders.insert_one(&core, None).await.unwrap();
        let reminder = Coll::<Reminder>::from_db(&db)
            .find_one(None, None)
            .await
            .unwrap()
            .unwrap();

        let rooms = Coll::<crate::model::room::NewRoom>::from_db(&db);
        let mut lobby = crate::model::room::RoomCore::for_slot(
            election.id,
            0,
            crate::model::room::HOLDING_ROOM_INDEX,
        );
        lobby.chat_id = Some("lobby-chat".to_string());
        rooms.insert_one(&lobby, None).await.unwrap();
        let lobby_id = Coll::<Room>::from_db(&db)
            .find_one(None, None)
            .await
            .unwrap()
            .unwrap()
            .id;

        let participants = Coll::<Participant>::from_db(&db);
        let mut alice = Participant::new("alice", "Alice");
        alice.room_id = Some(lobby_id);
        alice.chat_handle = Some("alice_chat".to_string());
        participants.insert_one(&alice, None).await.unwrap();

        sent.update_one(
            doc! {"reminder_id": reminder.id, "account": "alice"},
            doc! {"$set": {"status": SendStatus::Sent}},
            UpdateOptions::builder().upsert(true).build(),
        )
        .await
        .unwrap();

        let engine = engine(&db);
        engine
            .dispatch_due(&election, None, election.date, Duration::minutes(15), now)
            .await
            .unwrap();

        let rows: Vec<ReminderSent> = sent.find(None, None).await.unwrap().try_collect().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, SendStatus::Sent);
    }

    #[bot_test]
    async fn dispatch_ignores_undue_reminders(db: Database, reminders: Coll<NewReminder>) {
        let election = example_election();
        // Trigger is an hour away: not yet due.
        let core = ReminderCore::new(
            election.id,
            None,
            ReminderGroup::Both,
            election.date - Duration::minutes(60),
        );
        reminders.insert_one(&core, None).await.unwrap();

        let engine = engine(&db);
        engine
            .dispatch_due(
                &election,
                None,
                election.date,
                Duration::minutes(15),
                election.date - Duration::minutes(120),
            )
            .await
            .unwrap();

        let sent = Coll::<ReminderSent>::from_db(&db);
        assert_eq!(sent.count_documents(None, None).await.unwrap(), 0);
    }
}
