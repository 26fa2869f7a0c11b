//! Client for the chain query gateway: election state, participant and vote
//! tables, and block-height lookups, behind a self-refreshing auth token.

mod client;
mod token;

pub use client::{
    ChainClient, ChainParticipant, ChainVote, ElectionStateView, RoundConfig, StateData,
};
pub use token::{token_expiry, ChainAuth, TokenCell, TokenRefresher};
