use std::fmt::{self, Display, Formatter};
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{self, serde_helpers::chrono_datetime_as_bson_datetime, Bson};
use serde::{Deserialize, Serialize};

/// Core election data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionCore {
    /// The round-boundary timestamp the election is anchored to: the start
    /// of the first round, or the end of seeding while that is all the chain
    /// has committed to.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub date: DateTime<Utc>,
    /// Last chain-reported lifecycle state.
    pub status: ElectionState,
}

/// An election from the database, with its unique ID.
///
/// Election IDs come from the [`Counter`] collection rather than the
/// database, so elections are always inserted fully formed.
///
/// [`Counter`]: crate::model::mongodb::Counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: u32,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}

/// States in the election lifecycle, as reported by the chain contract.
///
/// `CustomFreeGroups` is not a chain state: it tags the one synthetic
/// election row that owns chat rooms provisioned ahead of any real election.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionState {
    /// No election scheduled yet.
    PendingDate,
    /// Members are registering for a scheduled election.
    RegistrationV0,
    RegistrationV1,
    /// The contract is gathering randomness before forming groups.
    SeedingV0,
    SeedingV1,
    /// The contract is initialising per-voter records.
    InitVotersV0,
    InitVotersV1,
    /// A round is in progress.
    Active,
    /// Between rounds: results tallied, next round not yet opened.
    PostRound,
    /// The election is over; chief delegates are chosen.
    Final,
    /// Local-only tag for the pre-provisioned room pool.
    CustomFreeGroups,
}

impl ElectionState {
    /// Decode the chain contract's state variant tag.
    ///
    /// The set of tags is closed: an unrecognised tag means the contract has
    /// moved ahead of this bot and is a hard error, never a silent default.
    pub fn from_chain_tag(tag: &str) -> crate::error::Result<Self> {
        let state = match tag {
            "current_election_state_pending_date" => Self::PendingDate,
            "current_election_state_registration_v0" => Self::RegistrationV0,
            "current_election_state_registration_v1" => Self::RegistrationV1,
            "current_election_state_seeding_v0" => Self::SeedingV0,
            "current_election_state_seeding_v1" => Self::SeedingV1,
            "current_election_state_init_voters_v0" => Self::InitVotersV0,
            "current_election_state_init_voters_v1" => Self::InitVotersV1,
            "current_election_state_active" => Self::Active,
            "current_election_state_post_round" => Self::PostRound,
            "current_election_state_final" => Self::Final,
            other => {
                return Err(crate::error::Error::protocol(format!(
                    "unrecognised election state tag '{other}'"
                )))
            }
        };
        Ok(state)
    }

    /// The poll cadence this state calls for.
    pub fn bot_mode(self) -> BotMode {
        match self {
            Self::Active | Self::PostRound | Self::Final => BotMode::Election,
            _ => BotMode::NotElection,
        }
    }
}

impl Display for ElectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<ElectionState> for Bson {
    fn from(state: ElectionState) -> Self {
        bson::to_bson(&state).unwrap() // Infallible.
    }
}

/// Whether an election is live, which selects the poll interval.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BotMode {
    Election,
    NotElection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_chain_tags_decode() {
        let cases = [
            ("current_election_state_pending_date", ElectionState::PendingDate),
            ("current_election_state_registration_v0", ElectionState::RegistrationV0),
            ("current_election_state_registration_v1", ElectionState::RegistrationV1),
            ("current_election_state_seeding_v0", ElectionState::SeedingV0),
            ("current_election_state_seeding_v1", ElectionState::SeedingV1),
            ("current_election_state_init_voters_v0", ElectionState::InitVotersV0),
            ("current_election_state_init_voters_v1", ElectionState::InitVotersV1),
            ("current_election_state_active", ElectionState::Active),
            ("current_election_state_post_round", ElectionState::PostRound),
            ("current_election_state_final", ElectionState::Final),
        ];
        for (tag, expected) in cases {
            assert_eq!(ElectionState::from_chain_tag(tag).unwrap(), expected);
        }
    }

    #[test]
    fn unknown_tag_is_an_error() {
        assert!(ElectionState::from_chain_tag("current_election_state_v2_shiny").is_err());
        // The local-only tag must never decode from chain input.
        assert!(ElectionState::from_chain_tag("custom_free_groups").is_err());
    }

    #[test]
    fn bot_mode_follows_election_liveness() {
        assert_eq!(ElectionState::RegistrationV1.bot_mode(), BotMode::NotElection);
        assert_eq!(ElectionState::SeedingV1.bot_mode(), BotMode::NotElection);
        assert_eq!(ElectionState::PendingDate.bot_mode(), BotMode::NotElection);
        assert_eq!(ElectionState::Active.bot_mode(), BotMode::Election);
        assert_eq!(ElectionState::PostRound.bot_mode(), BotMode::Election);
        assert_eq!(ElectionState::Final.bot_mode(), BotMode::Election);
    }
}
