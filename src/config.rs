use std::path::Path;

use chrono::Duration;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

/// Application configuration, derived from `Edenbot.toml` and `EDENBOT_*`
/// environment variables. Loaded once at startup and shared read-only.
/// Deliberately not `Debug`: half of it is secrets.
#[derive(Clone, Deserialize)]
pub struct Config {
    // non-secrets
    chain_api_url: String,
    chat_api_url: String,
    bot_account: String,
    operator_handle: Option<String>,
    poll_interval_secs: u64,
    election_poll_interval_secs: u64,
    token_refresh_margin_secs: u64,
    free_room_target: u32,
    election_reminder_offsets_minutes: Vec<i64>,
    round_reminder_offsets_minutes: Vec<i64>,
    reminder_tolerance_minutes: i64,
    // secrets
    db_uri: String,
    chain_api_key: String,
    chat_bot_key: String,
}

impl Config {
    /// Load from the given TOML file, with `EDENBOT_*` environment variables
    /// taking precedence.
    pub fn load(path: &Path) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("EDENBOT_"))
            .extract()
    }

    /// Base URL of the chain query gateway.
    pub fn chain_api_url(&self) -> &str {
        &self.chain_api_url
    }

    /// API key exchanged for short-lived chain query tokens.
    pub fn chain_api_key(&self) -> &str {
        &self.chain_api_key
    }

    /// Base URL of the chat platform gateway.
    pub fn chat_api_url(&self) -> &str {
        &self.chat_api_url
    }

    /// Key authenticating the bot against the chat platform.
    pub fn chat_bot_key(&self) -> &str {
        &self.chat_bot_key
    }

    /// The bot's own chain account, recorded on rooms it pre-provisions.
    pub fn bot_account(&self) -> &str {
        &self.bot_account
    }

    /// Chat handle to promote in freshly created rooms, if any.
    pub fn operator_handle(&self) -> Option<&str> {
        self.operator_handle.as_deref()
    }

    /// Poll interval outside of a live election.
    pub fn poll_interval(&self) -> Duration {
        Duration::seconds(self.poll_interval_secs as i64)
    }

    /// Poll interval while an election is live.
    pub fn election_poll_interval(&self) -> Duration {
        Duration::seconds(self.election_poll_interval_secs as i64)
    }

    /// How far ahead of token expiry the refresher runs.
    pub fn token_refresh_margin(&self) -> Duration {
        Duration::seconds(self.token_refresh_margin_secs as i64)
    }

    /// How many unused rooms to keep provisioned ahead of need.
    pub fn free_room_target(&self) -> u32 {
        self.free_room_target
    }

    /// Whole-election reminder offsets, minutes before the election date.
    pub fn election_reminder_offsets(&self) -> Vec<Duration> {
        self.election_reminder_offsets_minutes
            .iter()
            .map(|&minutes| Duration::minutes(minutes))
            .collect()
    }

    /// Round-end reminder offsets, minutes before the round boundary.
    pub fn round_reminder_offsets(&self) -> Vec<Duration> {
        self.round_reminder_offsets_minutes
            .iter()
            .map(|&minutes| Duration::minutes(minutes))
            .collect()
    }

    /// How long past its trigger time a reminder is still worth sending.
    pub fn reminder_tolerance(&self) -> Duration {
        Duration::minutes(self.reminder_tolerance_minutes)
    }

    /// MongoDB connection string.
    pub fn db_uri(&self) -> &str {
        &self.db_uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Config {
        pub fn example() -> Self {
            Self {
                chain_api_url: "http://127.0.0.1:8888".to_string(),
                chat_api_url: "http://127.0.0.1:8081".to_string(),
                bot_account: "edenbot".to_string(),
                operator_handle: Some("operator".to_string()),
                poll_interval_secs: 300,
                election_poll_interval_secs: 10,
                token_refresh_margin_secs: 300,
                free_room_target: 5,
                election_reminder_offsets_minutes: vec![1440, 60, 5],
                round_reminder_offsets_minutes: vec![10, 2],
                reminder_tolerance_minutes: 15,
                db_uri: "mongodb://127.0.0.1:27017".to_string(),
                chain_api_key: "test-key".to_string(),
                chat_bot_key: "test-bot-key".to_string(),
            }
        }
    }

    #[test]
    fn offsets_convert_to_durations() {
        let config = Config::example();
        assert_eq!(
            config.election_reminder_offsets(),
            vec![
                Duration::minutes(1440),
                Duration::minutes(60),
                Duration::minutes(5)
            ]
        );
        assert_eq!(config.reminder_tolerance(), Duration::minutes(15));
    }
}
