use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::backoff::with_backoff;
use crate::error::{Error, Result};

use super::token::TokenCell;

/// The chain-reported election state: the contract's variant tag plus its
/// payload, decoded loosely since each state carries different fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ElectionStateView {
    pub tag: String,
    #[serde(default)]
    pub data: StateData,
}

/// Union of the per-state payload fields. Absent fields stay `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateData {
    /// Scheduled start of the first round (registration states).
    pub election_time: Option<DateTime<Utc>>,
    /// End of the seeding window (seeding states).
    pub seed_end: Option<DateTime<Utc>>,
    /// Current round number (active state).
    pub round: Option<u32>,
    /// Current round shape (active state).
    pub config: Option<RoundConfig>,
    /// End of the current round (active state).
    pub round_end: Option<DateTime<Utc>>,
}

/// The contract's round configuration row.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RoundConfig {
    pub num_participants: u16,
    pub num_groups: u16,
}

/// One entry of the contract's member table for the current election.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainParticipant {
    pub round: u32,
    /// Ordinal index feeding the partition formula.
    pub index: u32,
    pub candidate: Option<String>,
}

/// One entry of the contract's vote table.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainVote {
    pub candidate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParticipantsResponse {
    participants: HashMap<String, ChainParticipant>,
}

#[derive(Debug, Deserialize)]
struct VotesResponse {
    votes: HashMap<String, ChainVote>,
}

#[derive(Debug, Deserialize)]
struct HeightResponse {
    height: u32,
}

/// Client for the chain query gateway.
///
/// All requests carry the current bearer token from the [`TokenCell`], which
/// the refresher task keeps fresh independently of the poll loop.
#[derive(Clone)]
pub struct ChainClient {
    http: reqwest::Client,
    base_url: String,
    token: TokenCell,
}

impl ChainClient {
    pub fn new(base_url: impl Into<String>, token: TokenCell) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
        }
    }

    /// The contract's current election state, optionally pinned to a block
    /// height.
    pub async fn current_election_state(&self, height: Option<u32>) -> Result<ElectionStateView> {
        self.post("v1/election/state", json!({ "height": height }))
            .await
    }

    /// The contract's member table for the current election, keyed by
    /// account name.
    pub async fn participants(
        &self,
        height: Option<u32>,
    ) -> Result<HashMap<String, ChainParticipant>> {
        let response: ParticipantsResponse = self
            .post("v1/election/participants", json!({ "height": height }))
            .await?;
        Ok(response.participants)
    }

    /// The contract's vote table, keyed by voter account name.
    pub async fn votes(&self, height: Option<u32>) -> Result<HashMap<String, ChainVote>> {
        let response: VotesResponse = self
            .post("v1/election/votes", json!({ "height": height }))
            .await?;
        Ok(response.votes)
    }

    /// The last block height at or before the given timestamp.
    pub async fn block_height_for_timestamp(&self, timestamp: DateTime<Utc>) -> Result<u32> {
        let response: HeightResponse = self
            .post(
                "v1/chain/block_by_time",
                json!({ "timestamp": timestamp.to_rfc3339() }),
            )
            .await?;
        Ok(response.height)
    }

    async fn post<T>(&self, path: &str, body: serde_json::Value) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        with_backoff(path, || {
            let request = self.http.post(&url).json(&body);
            let request = match self.token.get() {
                Some(token) => request.bearer_auth(token),
                None => request,
            };
            async move {
                request
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<T>()
                    .await
            }
        })
        .await
        .map_err(Error::Chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_payload_tolerates_missing_fields() {
        let view: ElectionStateView =
            serde_json::from_str(r#"{"tag": "current_election_state_pending_date"}"#).unwrap();
        assert_eq!(view.tag, "current_election_state_pending_date");
        assert!(view.data.election_time.is_none());
        assert!(view.data.round.is_none());
    }

    #[test]
    fn active_state_payload_decodes() {
        let view: ElectionStateView = serde_json::from_str(
            r#"{
                "tag": "current_election_state_active",
                "data": {
                    "round": 3,
                    "config": {"num_participants": 86, "num_groups": 20},
                    "round_end": "2024-10-12T17:00:00Z"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(view.data.round, Some(3));
        let config = view.data.config.unwrap();
        assert_eq!(config.num_participants, 86);
        assert_eq!(config.num_groups, 20);
    }
}
