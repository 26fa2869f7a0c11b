use std::collections::{HashMap, HashSet};

use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson},
    options::FindOptions,
    Client, Database,
};

use crate::allocator::member_index_to_group;
use crate::chain::ChainClient;
use crate::chat::ChatClient;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::model::{
    election::{Election, ElectionCore, ElectionState},
    mongodb::{Coll, Counter, Id, ELECTION_ID_COUNTER},
    participant::{ExtendedParticipant, Participant},
    room::{free_room_names, room_names, NewRoom, Predisposed, Room, RoomCore, HOLDING_ROOM_INDEX},
};

const ROUND_ROOM_DESCRIPTION: &str =
    "Discussion room for one election round. The bot manages membership.";
const FREE_ROOM_DESCRIPTION: &str =
    "Reserved community room. The bot will repurpose it for a future election round.";

/// How a participant gets into their target room, for logging and holding
/// room bookkeeping. The three-way split is what makes the reconciliation
/// re-entrant: re-running after a crash converges on the same end state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MoveKind {
    /// Already in the target room from a previous (partial) run.
    AlreadyPlaced,
    /// Waiting in the election's holding room.
    FromHolding,
    /// Carried over from a previous round's room.
    CarriedOver,
    /// No current room at all.
    NewJoiner,
}

pub fn classify_move(current: Option<Id>, target: Id, holding: Option<Id>) -> MoveKind {
    match current {
        Some(room) if room == target => MoveKind::AlreadyPlaced,
        Some(room) if Some(room) == holding => MoveKind::FromHolding,
        Some(_) => MoveKind::CarriedOver,
        None => MoveKind::NewJoiner,
    }
}

/// Map each member to their group index using the contract's partition rule.
///
/// `total_participants` is the chain-side population for the round, which can
/// exceed the locally-known member count when some accounts never talked to
/// the bot.
pub fn plan_assignments(
    members: &[ExtendedParticipant],
    total_participants: usize,
    num_groups: usize,
) -> Result<Vec<(String, usize)>> {
    members
        .iter()
        .map(|member| {
            if member.ordinal_index >= total_participants {
                return Err(Error::allocation(format!(
                    "ordinal index {} out of range for {} participants",
                    member.ordinal_index, total_participants
                )));
            }
            let group =
                member_index_to_group(member.ordinal_index, total_participants, num_groups);
            Ok((member.participant.account.clone(), group))
        })
        .collect()
}

/// Ensures that, for one election round, the right chat rooms exist and hold
/// exactly the participants the partition formula assigns to them.
pub struct RoomReconciler {
    client: Client,
    db: Database,
    chain: ChainClient,
    chat: ChatClient,
    clock: Clock,
    bot_account: String,
    operator_handle: Option<String>,
}

impl RoomReconciler {
    pub fn new(
        client: Client,
        db: Database,
        chain: ChainClient,
        chat: ChatClient,
        clock: Clock,
        bot_account: String,
        operator_handle: Option<String>,
    ) -> Self {
        Self {
            client,
            db,
            chain,
            chat,
            clock,
            bot_account,
            operator_handle,
        }
    }

    /// Bring one round to its target state: rooms created (reusing
    /// pre-provisioned ones first), named, and populated per the partition
    /// formula. Safe to call repeatedly; a fully reconciled round is a no-op.
    ///
    /// Any persistence error aborts the pass and surfaces to the caller; the
    /// next poll re-attempts from the top.
    pub async fn ensure_rooms_for_round(
        &self,
        election: &Election,
        round: u32,
        num_participants: usize,
        num_groups: usize,
        is_last_round: bool,
        height: Option<u32>,
    ) -> Result<Vec<Room>> {
        let rooms_coll = Coll::<Room>::from_db(&self.db);
        let slot_filter = doc! {
            "election_id": election.id,
            "round": round,
            "room_index": {"$gte": 0},
            "chat_id": {"$ne": null},
        };
        let created = rooms_coll.count_documents(slot_filter.clone(), None).await? as usize;
        if created == num_groups
            && self
                .round_is_settled(election, round, num_participants, is_last_round)
                .await?
        {
            debug!("Round {round} of election {} already reconciled", election.id);
            return self.round_rooms(election, round).await;
        }

        // Fill the missing slots. Pre-provisioned rooms go first: chat-room
        // creation is rate-limited upstream, and the free pool amortises it
        // across quiet weeks.
        let existing: Vec<Room> = rooms_coll
            .find(slot_filter, None)
            .await?
            .try_collect()
            .await?;
        let taken: HashSet<i32> = existing.iter().map(|room| room.room_index).collect();
        let missing: Vec<i32> = (0..num_groups as i32)
            .filter(|index| !taken.contains(index))
            .collect();

        let mut free = self.take_free_rooms(missing.len()).await?.into_iter();
        let mut fresh: Vec<NewRoom> = Vec::new();
        let mut repurposed: Vec<Room> = Vec::new();
        for index in missing {
            let (short_name, long_name) = room_names(election.id, round, index);
            if let Some(mut room) = free.next() {
                room.election_id = election.id;
                room.round = round;
                room.room_index = index;
                room.short_name = short_name;
                room.long_name = long_name;
                repurposed.push(room);
            } else {
                let mut room = RoomCore::for_slot(election.id, round, index);
                room.chat_id = Some(
                    self.create_chat_room(&room.long_name, ROUND_ROOM_DESCRIPTION)
                        .await?,
                );
                fresh.push(room);
            }
        }

        // Persist freshly-created rows first (they need IDs), then the
        // repurposing updates, all in one transaction.
        if !fresh.is_empty() || !repurposed.is_empty() {
            info!(
                "Round {round} of election {}: creating {} rooms, repurposing {}",
                election.id,
                fresh.len(),
                repurposed.len()
            );
            // Dropping the session on any error path below aborts the
            // transaction server-side.
            let mut session = self.client.start_session(None).await?;
            session.start_transaction(None).await?;
            if !fresh.is_empty() {
                Coll::<NewRoom>::from_db(&self.db)
                    .insert_many_with_session(&fresh, None, &mut session)
                    .await?;
            }
            for room in &repurposed {
                let update = doc! {"$set": {
                    "election_id": room.election_id,
                    "round": room.round,
                    "room_index": room.room_index,
                    "short_name": &room.short_name,
                    "long_name": &room.long_name,
                }};
                rooms_coll
                    .update_one_with_session(room.id.as_doc(), update, None, &mut session)
                    .await?;
            }
            session.commit_transaction().await?;
        }

        // Cosmetic: bring repurposed chat rooms' titles in line.
        for room in &repurposed {
            if let Some(chat_id) = &room.chat_id {
                if let Err(e) = self
                    .chat
                    .rename_group(chat_id, &room.long_name, ROUND_ROOM_DESCRIPTION)
                    .await
                {
                    warn!("Could not rename repurposed room {}: {e}", room.short_name);
                }
            }
        }

        let rooms = self.round_rooms(election, round).await?;

        // Chain-side membership for this round.
        let (chain_count, members) = self
            .fetch_round_members(round, is_last_round, height)
            .await?;
        if !is_last_round && chain_count != num_participants {
            return Err(Error::allocation(format!(
                "chain reports {chain_count} participants for round {round}, expected {num_participants}"
            )));
        }
        let total = if is_last_round {
            members.len()
        } else {
            num_participants
        };
        let assignments = plan_assignments(&members, total, num_groups)?;
        let members_by_account: HashMap<&str, &ExtendedParticipant> = members
            .iter()
            .map(|member| (member.participant.account.as_str(), member))
            .collect();
        let rooms_by_index: HashMap<i32, &Room> =
            rooms.iter().map(|room| (room.room_index, room)).collect();
        let holding = self.holding_room(election).await?;
        let holding_id = holding.as_ref().map(|room| room.id);

        // Chat membership goes first: adding is idempotent on the platform
        // side, and a failure here aborts before any row changes so the next
        // poll repeats the whole pass.
        let mut handles_by_room: HashMap<i32, Vec<String>> = HashMap::new();
        for (account, group) in &assignments {
            let member = members_by_account[account.as_str()];
            if let Some(handle) = &member.participant.chat_handle {
                handles_by_room
                    .entry(*group as i32)
                    .or_default()
                    .push(handle.clone());
            }
        }
        for (index, handles) in &handles_by_room {
            let room = rooms_by_index.get(index).ok_or_else(|| {
                Error::allocation(format!("no room at index {index} for round {round}"))
            })?;
            if let Some(chat_id) = &room.chat_id {
                self.chat.add_members(chat_id, handles).await?;
            }
        }

        // Membership rows, one transaction for the whole round.
        let participants_coll = Coll::<Participant>::from_db(&self.db);
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        let mut moved = 0usize;
        for (account, group) in &assignments {
            let member = members_by_account[account.as_str()];
            let room = rooms_by_index.get(&(*group as i32)).ok_or_else(|| {
                Error::allocation(format!("no room at index {group} for round {round}"))
            })?;
            match classify_move(member.participant.room_id, room.id, holding_id) {
                MoveKind::AlreadyPlaced => continue,
                kind => {
                    debug!("{account} -> {} ({kind:?})", room.short_name);
                    participants_coll
                        .update_one_with_session(
                            doc! {"_id": account},
                            doc! {"$set": {"room_id": room.id}},
                            None,
                            &mut session,
                        )
                        .await?;
                    moved += 1;
                }
            }
        }
        session.commit_transaction().await?;
        if moved > 0 {
            info!("Round {round} of election {}: moved {moved} participants", election.id);
        }

        Ok(rooms)
    }

    /// The synthetic election that owns rooms provisioned ahead of need.
    /// Created on first use.
    pub async fn free_groups_election(&self) -> Result<Election> {
        let elections = Coll::<Election>::from_db(&self.db);
        let filter = doc! {"status": ElectionState::CustomFreeGroups};
        if let Some(election) = elections.find_one(filter, None).await? {
            return Ok(election);
        }

        let counters = Coll::<Counter>::from_db(&self.db);
        let id = Counter::next(&counters, ELECTION_ID_COUNTER).await?;
        let election = Election {
            id,
            election: ElectionCore {
                // The pool election sorts before any real one.
                date: Utc.timestamp_opt(0, 0).unwrap(), // Epoch is valid.
                status: ElectionState::CustomFreeGroups,
            },
        };
        elections.insert_one(&election, None).await?;
        info!("Created free-room pool election {id}");
        Ok(election)
    }

    /// Top the free-room pool up to `target` unused rooms.
    pub async fn ensure_free_rooms(&self, target: u32) -> Result<()> {
        let pool = self.free_groups_election().await?;
        let rooms_coll = Coll::<Room>::from_db(&self.db);
        let filter = doc! {
            "election_id": pool.id,
            "predisposed_by": &self.bot_account,
            "chat_id": {"$ne": null},
        };
        let existing = rooms_coll.count_documents(filter, None).await? as u32;
        if existing >= target {
            return Ok(());
        }

        // Indexes under the pool election just keep growing; uniqueness of
        // the slot triple does the bookkeeping.
        let options = FindOptions::builder()
            .sort(doc! {"room_index": -1})
            .limit(1)
            .build();
        let top: Vec<Room> = rooms_coll
            .find(doc! {"election_id": pool.id}, options)
            .await?
            .try_collect()
            .await?;
        let mut next_index = top.first().map(|room| room.room_index + 1).unwrap_or(0);

        let new_rooms = Coll::<NewRoom>::from_db(&self.db);
        for _ in existing..target {
            let (short_name, long_name) = free_room_names(next_index);
            let chat_id = self
                .create_chat_room(&long_name, FREE_ROOM_DESCRIPTION)
                .await?;
            let share_link = match self.chat.invite_link(&chat_id).await {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("No share link for new free room {short_name}: {e}");
                    None
                }
            };
            let room = RoomCore {
                election_id: pool.id,
                round: 0,
                room_index: next_index,
                short_name,
                long_name,
                chat_id: Some(chat_id),
                predisposed: Predisposed::by(&self.bot_account, self.clock.now(), share_link),
            };
            new_rooms.insert_one(&room, None).await?;
            info!("Pre-provisioned free room {}", room.short_name);
            next_index += 1;
        }
        Ok(())
    }

    /// The election's holding room, created (or repurposed from the pool) on
    /// first use.
    pub async fn ensure_holding_room(&self, election: &Election) -> Result<Room> {
        if let Some(room) = self.holding_room(election).await? {
            return Ok(room);
        }

        let rooms_coll = Coll::<Room>::from_db(&self.db);
        let (short_name, long_name) = room_names(election.id, 0, HOLDING_ROOM_INDEX);
        if let Some(mut room) = self.take_free_rooms(1).await?.into_iter().next() {
            room.election_id = election.id;
            room.round = 0;
            room.room_index = HOLDING_ROOM_INDEX;
            room.short_name = short_name;
            room.long_name = long_name;
            let update = doc! {"$set": {
                "election_id": room.election_id,
                "round": room.round,
                "room_index": room.room_index,
                "short_name": &room.short_name,
                "long_name": &room.long_name,
            }};
            rooms_coll.update_one(room.id.as_doc(), update, None).await?;
            if let Some(chat_id) = &room.chat_id {
                if let Err(e) = self
                    .chat
                    .rename_group(chat_id, &room.long_name, ROUND_ROOM_DESCRIPTION)
                    .await
                {
                    warn!("Could not rename holding room {}: {e}", room.short_name);
                }
            }
            info!("Repurposed free room as holding room for election {}", election.id);
            return Ok(room);
        }

        let mut room = RoomCore {
            election_id: election.id,
            round: 0,
            room_index: HOLDING_ROOM_INDEX,
            short_name,
            long_name,
            chat_id: None,
            predisposed: Predisposed::none(),
        };
        room.chat_id = Some(
            self.create_chat_room(&room.long_name, ROUND_ROOM_DESCRIPTION)
                .await?,
        );
        Coll::<NewRoom>::from_db(&self.db)
            .insert_one(&room, None)
            .await?;
        info!("Created holding room for election {}", election.id);
        self.holding_room(election)
            .await?
            .ok_or_else(|| Error::not_found(format!("holding room of election {}", election.id)))
    }

    /// Move every locally-known participant without a room into the
    /// election's holding room.
    pub async fn gather_unassigned(&self, election: &Election) -> Result<()> {
        let participants_coll = Coll::<Participant>::from_db(&self.db);
        let unassigned: Vec<Participant> = participants_coll
            .find(doc! {"room_id": null}, None)
            .await?
            .try_collect()
            .await?;
        if unassigned.is_empty() {
            return Ok(());
        }

        let holding = self.ensure_holding_room(election).await?;
        let handles: Vec<String> = unassigned
            .iter()
            .filter_map(|p| p.chat_handle.clone())
            .collect();
        if let Some(chat_id) = &holding.chat_id {
            self.chat.add_members(chat_id, &handles).await?;
        }

        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        for participant in &unassigned {
            participants_coll
                .update_one_with_session(
                    doc! {"_id": &participant.account},
                    doc! {"$set": {"room_id": holding.id}},
                    None,
                    &mut session,
                )
                .await?;
        }
        session.commit_transaction().await?;
        info!(
            "Gathered {} unassigned participants into the holding room",
            unassigned.len()
        );
        Ok(())
    }

    async fn holding_room(&self, election: &Election) -> Result<Option<Room>> {
        let rooms_coll = Coll::<Room>::from_db(&self.db);
        let filter = doc! {"election_id": election.id, "room_index": HOLDING_ROOM_INDEX};
        Ok(rooms_coll.find_one(filter, None).await?)
    }

    /// The round's numbered rooms, in index order.
    async fn round_rooms(&self, election: &Election, round: u32) -> Result<Vec<Room>> {
        let rooms_coll = Coll::<Room>::from_db(&self.db);
        let filter = doc! {
            "election_id": election.id,
            "round": round,
            "room_index": {"$gte": 0},
            "chat_id": {"$ne": null},
        };
        let options = FindOptions::builder().sort(doc! {"room_index": 1}).build();
        let rooms = rooms_coll
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(rooms)
    }

    /// Whether the round's membership rows already match expectations, which
    /// lets a repeated poll skip the chain fetch entirely.
    async fn round_is_settled(
        &self,
        election: &Election,
        round: u32,
        num_participants: usize,
        is_last_round: bool,
    ) -> Result<bool> {
        let rooms = self.round_rooms(election, round).await?;
        let room_ids: Vec<Bson> = rooms.iter().map(|room| Bson::from(room.id)).collect();
        let assigned = Coll::<Participant>::from_db(&self.db)
            .count_documents(doc! {"room_id": {"$in": room_ids}}, None)
            .await? as usize;
        Ok(if is_last_round {
            assigned > 0
        } else {
            assigned == num_participants
        })
    }

    /// The oldest unused pre-provisioned rooms, up to `limit`.
    async fn take_free_rooms(&self, limit: usize) -> Result<Vec<Room>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let pool = self.free_groups_election().await?;
        let rooms_coll = Coll::<Room>::from_db(&self.db);
        let filter = doc! {
            "election_id": pool.id,
            "predisposed_by": &self.bot_account,
            "chat_id": {"$ne": null},
        };
        let options = FindOptions::builder()
            .sort(doc! {"predisposed_at": 1})
            .limit(limit as i64)
            .build();
        let rooms = rooms_coll
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(rooms)
    }

    /// Create a chat room and hand the operator elevated rights in it.
    async fn create_chat_room(&self, name: &str, description: &str) -> Result<String> {
        let chat_id = self.chat.create_group(name, description).await?;
        if let Some(operator) = &self.operator_handle {
            if let Err(e) = self.chat.set_member_role(&chat_id, operator, true).await {
                warn!("Could not promote {operator} in new room {name}: {e}");
            }
        }
        Ok(chat_id)
    }

    /// The chain's member table for the round, joined against local
    /// participant rows. Returns the chain-side population (which the caller
    /// validates) and the locally-known members in ordinal order.
    async fn fetch_round_members(
        &self,
        round: u32,
        is_last_round: bool,
        height: Option<u32>,
    ) -> Result<(usize, Vec<ExtendedParticipant>)> {
        let chain_participants = self.chain.participants(height).await?;
        let votes = self.chain.votes(height).await?;

        let mut relevant: Vec<(String, crate::chain::ChainParticipant)> = chain_participants
            .into_iter()
            .filter(|(_, p)| is_last_round || p.round == round)
            .collect();
        relevant.sort_by_key(|(_, p)| p.index);
        let chain_count = relevant.len();

        let accounts: Vec<Bson> = relevant
            .iter()
            .map(|(account, _)| Bson::String(account.clone()))
            .collect();
        let local: Vec<Participant> = Coll::<Participant>::from_db(&self.db)
            .find(doc! {"_id": {"$in": accounts}}, None)
            .await?
            .try_collect()
            .await?;
        let local: HashMap<String, Participant> = local
            .into_iter()
            .map(|participant| (participant.account.clone(), participant))
            .collect();

        let mut members = Vec::new();
        for (position, (account, chain_participant)) in relevant.iter().enumerate() {
            match local.get(account) {
                Some(participant) => members.push(ExtendedParticipant {
                    participant: participant.clone(),
                    // Chief-delegate grouping re-ranks the survivors; regular
                    // rounds must use the contract's own index.
                    ordinal_index: if is_last_round {
                        position
                    } else {
                        chain_participant.index as usize
                    },
                    vote_target: votes
                        .get(account)
                        .and_then(|vote| vote.candidate.clone()),
                }),
                None => warn!("Chain participant {account} is unknown locally, skipping"),
            }
        }
        Ok((chain_count, members))
    }
}

#[cfg(test)]
mod tests {
    use mongodb::Database;

    use crate::chain::TokenCell;
    use crate::model::election::{ElectionCore, ElectionState};

    use super::*;

    #[test]
    fn move_classification() {
        let target = Id::new();
        let holding = Id::new();
        let other = Id::new();
        assert_eq!(
            classify_move(Some(target), target, Some(holding)),
            MoveKind::AlreadyPlaced
        );
        assert_eq!(
            classify_move(Some(holding), target, Some(holding)),
            MoveKind::FromHolding
        );
        assert_eq!(
            classify_move(Some(other), target, Some(holding)),
            MoveKind::CarriedOver
        );
        assert_eq!(classify_move(None, target, Some(holding)), MoveKind::NewJoiner);
    }

    fn member(account: &str, ordinal: usize) -> ExtendedParticipant {
        ExtendedParticipant {
            participant: Participant::new(account, account.to_uppercase()),
            ordinal_index: ordinal,
            vote_target: None,
        }
    }

    #[test]
    fn assignments_follow_the_partition_formula() {
        let members: Vec<_> = (0..86).map(|i| member(&format!("acct{i:03}"), i)).collect();
        let assignments = plan_assignments(&members, 86, 20).unwrap();
        assert_eq!(assignments.len(), 86);
        // Spot-check the boundary between large and short groups.
        assert_eq!(assignments[29].1, 5);
        assert_eq!(assignments[30].1, 6);
        // Every group in range, every member assigned exactly once.
        let mut counts = vec![0usize; 20];
        for (_, group) in &assignments {
            counts[*group] += 1;
        }
        assert_eq!(counts.iter().sum::<usize>(), 86);
        assert!(counts.iter().all(|&count| count == 4 || count == 5));
    }

    #[test]
    fn out_of_range_ordinal_is_an_allocation_error() {
        let members = vec![member("alice", 90)];
        assert!(plan_assignments(&members, 86, 20).is_err());
    }

    fn reconciler(db: &Database) -> RoomReconciler {
        // Clients point at dead endpoints; tests only exercise paths that
        // never leave the database.
        RoomReconciler::new(
            db.collection::<mongodb::bson::Document>("_").client().clone(),
            db.clone(),
            ChainClient::new("http://127.0.0.1:1", TokenCell::new()),
            ChatClient::new("http://127.0.0.1:1", "unused-test-key"),
            Clock::wall(),
            "edenbot".to_string(),
            None,
        )
    }

    fn example_election() -> Election {
        Election {
            id: 3,
            election: ElectionCore {
                date: Utc.timestamp_opt(1_760_000_000, 0).unwrap(),
                status: ElectionState::Active,
            },
        }
    }

    #[bot_test]
    async fn settled_round_is_a_no_op(db: Database) {
        let election = example_election();
        let new_rooms = Coll::<NewRoom>::from_db(&db);
        let participants = Coll::<Participant>::from_db(&db);

        // Seed a fully reconciled round: 4 rooms, 14 participants assigned.
        for index in 0..4 {
            let mut room = RoomCore::for_slot(election.id, 2, index);
            room.chat_id = Some(format!("chat-{index}"));
            new_rooms.insert_one(&room, None).await.unwrap();
        }
        let rooms: Vec<Room> = Coll::<Room>::from_db(&db)
            .find(None, None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        for i in 0..14 {
            let mut participant = Participant::new(format!("acct{i:02}"), format!("Member {i}"));
            participant.room_id = Some(rooms[i % 4].id);
            participants.insert_one(&participant, None).await.unwrap();
        }

        // Twice, per the idempotence contract. The dead chain endpoint makes
        // any accidental chain fetch fail loudly.
        let reconciler = reconciler(&db);
        let first = reconciler
            .ensure_rooms_for_round(&election, 2, 14, 4, false, None)
            .await
            .unwrap();
        let second = reconciler
            .ensure_rooms_for_round(&election, 2, 14, 4, false, None)
            .await
            .unwrap();

        assert_eq!(first.len(), 4);
        assert_eq!(second, first);
        let total_rooms = Coll::<Room>::from_db(&db)
            .count_documents(None, None)
            .await
            .unwrap();
        assert_eq!(total_rooms, 4);
    }

    #[bot_test]
    async fn free_pool_election_is_created_once(db: Database) {
        let counters = Coll::<Counter>::from_db(&db);
        crate::model::mongodb::ensure_election_id_counter_exists(&counters)
            .await
            .unwrap();

        let reconciler = reconciler(&db);
        let first = reconciler.free_groups_election().await.unwrap();
        let second = reconciler.free_groups_election().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.status, ElectionState::CustomFreeGroups);

        let elections = Coll::<Election>::from_db(&db);
        assert_eq!(elections.count_documents(None, None).await.unwrap(), 1);
    }
}
