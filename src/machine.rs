use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{bson::doc, options::FindOptions, Database};

use crate::chain::{ChainClient, StateData};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    election::{BotMode, Election, ElectionCore, ElectionState},
    mongodb::{as_bson_datetime, Coll, Counter, ELECTION_ID_COUNTER},
    reminder::ReminderGroup,
    room::CHIEF_DELEGATE_ROUND,
};
use crate::reconciler::RoomReconciler;
use crate::reminders::{ReminderEngine, ReminderSpec};

/// Projection of the chain's election state onto local side effects.
///
/// The machine has no transitions of its own: every poll reads the chain's
/// state tuple, runs that state's entry actions (all idempotent), and records
/// the state change if there was one.
pub struct ElectionStateMachine {
    db: Database,
    chain: ChainClient,
    reconciler: RoomReconciler,
    reminders: ReminderEngine,
    config: Config,
    clock: Clock,
}

impl ElectionStateMachine {
    pub fn new(
        db: Database,
        chain: ChainClient,
        reconciler: RoomReconciler,
        reminders: ReminderEngine,
        config: Config,
        clock: Clock,
    ) -> Self {
        Self {
            db,
            chain,
            reconciler,
            reminders,
            config,
            clock,
        }
    }

    /// One poll cycle: read, classify, act, persist the change. Returns the
    /// mode the runner should poll at until the next cycle.
    pub async fn poll(&self) -> Result<BotMode> {
        let view = self
            .chain
            .current_election_state(self.clock.height_hint())
            .await?;
        let state = ElectionState::from_chain_tag(&view.tag)?;
        let mode = state.bot_mode();
        debug!("Chain reports election state {state}");

        let election = match state {
            ElectionState::PendingDate => self.on_pending_date().await?,
            ElectionState::RegistrationV0 | ElectionState::RegistrationV1 => {
                self.on_registration(&view.data).await?
            }
            ElectionState::SeedingV0 | ElectionState::SeedingV1 => {
                self.on_seeding(&view.data).await?
            }
            ElectionState::InitVotersV0 | ElectionState::InitVotersV1 => {
                self.on_init_voters().await?
            }
            ElectionState::Active => self.on_active(&view.data).await?,
            ElectionState::PostRound => self.on_post_round(&view.data).await?,
            ElectionState::Final => self.on_final().await?,
            // Never produced by `from_chain_tag`.
            ElectionState::CustomFreeGroups => {
                return Err(Error::protocol(
                    "chain reported the local-only free-groups state",
                ))
            }
        };

        if let Some(election) = election {
            if let Some(previous) = self.persist_status(&election, state).await? {
                info!("Election {}: {previous} -> {state}", election.id);
            }
        }
        Ok(mode)
    }

    /// No election scheduled. Use the quiet time to keep the free-room pool
    /// topped up.
    async fn on_pending_date(&self) -> Result<Option<Election>> {
        self.reconciler
            .ensure_free_rooms(self.config.free_room_target())
            .await?;
        Ok(None)
    }

    async fn on_registration(&self, data: &StateData) -> Result<Option<Election>> {
        let date = data
            .election_time
            .ok_or_else(|| Error::protocol("registration state without an election time"))?;
        let election = self.find_or_create_election(date).await?;
        self.prepare_for_election(&election).await?;
        Ok(Some(election))
    }

    async fn on_seeding(&self, data: &StateData) -> Result<Option<Election>> {
        // While seeding runs, the end of the seeding window is the best
        // known round boundary.
        let date = data
            .seed_end
            .ok_or_else(|| Error::protocol("seeding state without a seed window end"))?;
        let election = self.find_or_create_election(date).await?;
        self.prepare_for_election(&election).await?;
        Ok(Some(election))
    }

    /// The contract is initialising voter records; nothing for the bot to do
    /// until groups form.
    async fn on_init_voters(&self) -> Result<Option<Election>> {
        self.current_election().await
    }

    async fn on_active(&self, data: &StateData) -> Result<Option<Election>> {
        let round = data
            .round
            .ok_or_else(|| Error::protocol("active state without a round number"))?;
        let round_config = data
            .config
            .ok_or_else(|| Error::protocol("active state without a round config"))?;
        let round_end = data
            .round_end
            .ok_or_else(|| Error::protocol("active state without a round end"))?;

        let election = match self.current_election().await? {
            Some(election) => election,
            None => {
                // Cold start in the middle of a live election.
                warn!("No persisted election while the chain reports an active round");
                self.create_election(round_end).await?
            }
        };

        let specs: Vec<ReminderSpec> = self
            .config
            .round_reminder_offsets()
            .into_iter()
            .map(|offset| ReminderSpec {
                round: Some(round),
                group: ReminderGroup::Both,
                at: round_end - offset,
            })
            .collect();
        self.reminders.ensure_reminders(&election, &specs).await?;

        let height = self.query_height().await?;
        self.reconciler
            .ensure_rooms_for_round(
                &election,
                round,
                round_config.num_participants as usize,
                round_config.num_groups as usize,
                false,
                height,
            )
            .await?;

        self.reminders
            .dispatch_due(
                &election,
                Some(round),
                round_end,
                self.config.reminder_tolerance(),
                self.clock.now(),
            )
            .await?;
        Ok(Some(election))
    }

    /// Between rounds the contract may or may not still expose the round
    /// tuple; when it does, keep reconciling, otherwise just hold position.
    async fn on_post_round(&self, data: &StateData) -> Result<Option<Election>> {
        if data.round.is_some() && data.config.is_some() && data.round_end.is_some() {
            self.on_active(data).await
        } else {
            self.current_election().await
        }
    }

    async fn on_final(&self) -> Result<Option<Election>> {
        let election = match self.current_election().await? {
            Some(election) => election,
            None => {
                warn!("Chain reports a finished election the bot never saw");
                return Ok(None);
            }
        };
        // One board room for the chief delegates; the cohort size is
        // whatever the chain still lists.
        let height = self.query_height().await?;
        self.reconciler
            .ensure_rooms_for_round(&election, CHIEF_DELEGATE_ROUND, 0, 1, true, height)
            .await?;
        Ok(Some(election))
    }

    /// Entry actions shared by the pre-election phases.
    async fn prepare_for_election(&self, election: &Election) -> Result<()> {
        self.reconciler.gather_unassigned(election).await?;

        let specs: Vec<ReminderSpec> = self
            .config
            .election_reminder_offsets()
            .into_iter()
            .map(|offset| ReminderSpec {
                round: None,
                group: ReminderGroup::Both,
                at: election.date - offset,
            })
            .collect();
        self.reminders.ensure_reminders(election, &specs).await?;
        self.reminders
            .dispatch_due(
                election,
                None,
                election.date,
                self.config.reminder_tolerance(),
                self.clock.now(),
            )
            .await?;

        self.reconciler
            .ensure_free_rooms(self.config.free_room_target())
            .await?;
        Ok(())
    }

    /// Pin participant reads to a single block so repeated fetches within a
    /// pass see one consistent ordering.
    async fn query_height(&self) -> Result<Option<u32>> {
        match self.clock.height_hint() {
            Some(height) => Ok(Some(height)),
            None => Ok(Some(
                self.chain
                    .block_height_for_timestamp(self.clock.now())
                    .await?,
            )),
        }
    }

    /// The latest real election, if any.
    async fn current_election(&self) -> Result<Option<Election>> {
        let elections = Coll::<Election>::from_db(&self.db);
        let filter = doc! {"status": {"$ne": ElectionState::CustomFreeGroups}};
        let options = FindOptions::builder()
            .sort(doc! {"date": -1})
            .limit(1)
            .build();
        let latest: Vec<Election> = elections.find(filter, options).await?.try_collect().await?;
        Ok(latest.into_iter().next())
    }

    async fn find_or_create_election(&self, date: DateTime<Utc>) -> Result<Election> {
        let elections = Coll::<Election>::from_db(&self.db);
        let filter = doc! {"date": as_bson_datetime(date)};
        if let Some(election) = elections.find_one(filter, None).await? {
            return Ok(election);
        }

        if let Some(mut current) = self.current_election().await? {
            // A pre-election phase can still shift the boundary
            // (registration start vs seeding end); follow the move rather
            // than fork a second election.
            if current.status.bot_mode() == BotMode::NotElection {
                elections
                    .update_one(
                        doc! {"_id": current.id},
                        doc! {"$set": {"date": as_bson_datetime(date)}},
                        None,
                    )
                    .await?;
                info!("Election {}: date moved to {date}", current.id);
                current.date = date;
                return Ok(current);
            }
        }

        self.create_election(date).await
    }

    async fn create_election(&self, date: DateTime<Utc>) -> Result<Election> {
        let counters = Coll::<Counter>::from_db(&self.db);
        let id = Counter::next(&counters, ELECTION_ID_COUNTER).await?;
        let election = Election {
            id,
            election: ElectionCore {
                date,
                status: ElectionState::PendingDate,
            },
        };
        Coll::<Election>::from_db(&self.db)
            .insert_one(&election, None)
            .await?;
        info!("Created election {id} for {date}");
        Ok(election)
    }

    /// Persist the freshly observed state if it differs from the last
    /// persisted one, returning the previous state on a change. Observing
    /// the same state twice writes nothing the second time.
    async fn persist_status(
        &self,
        election: &Election,
        state: ElectionState,
    ) -> Result<Option<ElectionState>> {
        if election.status == state {
            return Ok(None);
        }
        let elections = Coll::<Election>::from_db(&self.db);
        elections
            .update_one(
                doc! {"_id": election.id},
                doc! {"$set": {"status": state}},
                None,
            )
            .await?;
        Ok(Some(election.status))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use mongodb::Database;

    use crate::chain::TokenCell;
    use crate::chat::ChatClient;
    use crate::model::mongodb::ensure_election_id_counter_exists;

    use super::*;

    fn machine(db: &Database) -> ElectionStateMachine {
        // Clients point at dead endpoints; these tests only exercise the
        // persistence paths.
        let chain = ChainClient::new("http://127.0.0.1:1", TokenCell::new());
        let chat = ChatClient::new("http://127.0.0.1:1", "unused-test-key");
        let reconciler = RoomReconciler::new(
            db.collection::<mongodb::bson::Document>("_").client().clone(),
            db.clone(),
            chain.clone(),
            chat.clone(),
            Clock::wall(),
            "edenbot".to_string(),
            None,
        );
        let reminders = ReminderEngine::new(db.clone(), chat);
        ElectionStateMachine::new(
            db.clone(),
            chain,
            reconciler,
            reminders,
            Config::example(),
            Clock::wall(),
        )
    }

    #[bot_test]
    async fn status_persists_only_on_change(db: Database, elections: Coll<Election>) {
        let machine = machine(&db);
        let election = Election {
            id: 1,
            election: ElectionCore {
                date: Utc.timestamp_opt(1_760_000_000, 0).unwrap(),
                status: ElectionState::RegistrationV1,
            },
        };
        elections.insert_one(&election, None).await.unwrap();

        // First observation of a new state records the transition.
        let previous = machine
            .persist_status(&election, ElectionState::SeedingV1)
            .await
            .unwrap();
        assert_eq!(previous, Some(ElectionState::RegistrationV1));
        let stored = elections
            .find_one(doc! {"_id": 1}, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ElectionState::SeedingV1);

        // The same observation again is a no-op.
        let previous = machine
            .persist_status(&stored, ElectionState::SeedingV1)
            .await
            .unwrap();
        assert_eq!(previous, None);
    }

    #[bot_test]
    async fn election_date_follows_the_chain(db: Database, elections: Coll<Election>) {
        let counters = Coll::<Counter>::from_db(&db);
        ensure_election_id_counter_exists(&counters).await.unwrap();

        let machine = machine(&db);
        let registration_date = Utc.timestamp_opt(1_760_000_000, 0).unwrap();
        let first = machine
            .find_or_create_election(registration_date)
            .await
            .unwrap();

        // Same date finds the same election.
        let again = machine
            .find_or_create_election(registration_date)
            .await
            .unwrap();
        assert_eq!(first.id, again.id);

        // Seeding shifts the boundary of the same election.
        let seed_end = registration_date + chrono::Duration::hours(2);
        let shifted = machine.find_or_create_election(seed_end).await.unwrap();
        assert_eq!(shifted.id, first.id);
        assert_eq!(shifted.date, seed_end);
        assert_eq!(elections.count_documents(None, None).await.unwrap(), 1);
    }

    #[bot_test]
    async fn current_election_skips_the_pool(db: Database, elections: Coll<Election>) {
        let machine = machine(&db);
        let pool = Election {
            id: 1,
            election: ElectionCore {
                date: Utc.timestamp_opt(0, 0).unwrap(),
                status: ElectionState::CustomFreeGroups,
            },
        };
        elections.insert_one(&pool, None).await.unwrap();
        assert!(machine.current_election().await.unwrap().is_none());

        let real = Election {
            id: 2,
            election: ElectionCore {
                date: Utc.timestamp_opt(1_760_000_000, 0).unwrap(),
                status: ElectionState::Active,
            },
        };
        elections.insert_one(&real, None).await.unwrap();
        let current = machine.current_election().await.unwrap().unwrap();
        assert_eq!(current.id, 2);
    }
}
