use serde::{Deserialize, Serialize};

use super::mongodb::Id;

/// A community member known to the bot.
///
/// Rows are created when a member first talks to the bot, never invented by
/// the reconciler: a chain-registered account with no row here is logged and
/// skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Stable chain account name.
    #[serde(rename = "_id")]
    pub account: String,
    /// The one room this participant currently sits in, if any.
    pub room_id: Option<Id>,
    /// Whether they attended the previous election.
    pub attended: bool,
    /// Chat platform handle; the bot can only address members who have
    /// talked to it first.
    pub chat_handle: Option<String>,
    /// Membership badge template on the chain, when minted.
    pub template_id: Option<u32>,
    pub display_name: String,
}

impl Participant {
    pub fn new(account: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            room_id: None,
            attended: false,
            chat_handle: None,
            template_id: None,
            display_name: display_name.into(),
        }
    }
}

/// A participant enriched with one round's chain-side allocation data.
/// Lives only for the duration of a single reconciliation pass.
#[derive(Debug, Clone)]
pub struct ExtendedParticipant {
    pub participant: Participant,
    /// The contract-assigned position feeding the partition formula.
    pub ordinal_index: usize,
    /// Who they currently vote for in this round, if anyone.
    pub vote_target: Option<String>,
}
