#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate bot_test;

use mongodb::Client;

use crate::chain::{ChainAuth, ChainClient, TokenCell, TokenRefresher};
use crate::chat::ChatClient;
use crate::clock::Clock;
use crate::config::Config;
use crate::machine::ElectionStateMachine;
use crate::model::mongodb::{ensure_election_id_counter_exists, ensure_indexes_exist, Coll};
use crate::reconciler::RoomReconciler;
use crate::reminders::ReminderEngine;
use crate::runner::Runner;

pub mod allocator;
pub mod backoff;
pub mod chain;
pub mod chat;
pub mod clock;
pub mod config;
pub mod error;
pub mod machine;
pub mod model;
pub mod reconciler;
pub mod reminders;
pub mod runner;
pub mod scheduled_task;

static DATABASE: &str = "edenbot";

/// Connect everything and hand back the ready-to-run poll loop.
///
/// This is the only place components are wired together: the database handle
/// and the two gateway clients are constructed once and injected into each
/// component from here.
pub async fn build(config: Config, clock: Clock) -> error::Result<Runner> {
    info!("Connecting to the database...");
    let client = Client::with_uri_str(config.db_uri()).await?;
    let db = client.database(DATABASE);
    ensure_indexes_exist(&db).await?;
    ensure_election_id_counter_exists(&Coll::from_db(&db)).await?;
    info!("...database connection online");

    let token = TokenCell::new();
    let auth = ChainAuth::new(config.chain_api_url(), config.chain_api_key());
    let token_refresher =
        TokenRefresher::start(auth, token.clone(), config.token_refresh_margin()).await;
    let chain = ChainClient::new(config.chain_api_url(), token);
    let chat = ChatClient::new(config.chat_api_url(), config.chat_bot_key());

    let reconciler = RoomReconciler::new(
        client,
        db.clone(),
        chain.clone(),
        chat.clone(),
        clock.clone(),
        config.bot_account().to_string(),
        config.operator_handle().map(str::to_string),
    );
    let reminders = ReminderEngine::new(db.clone(), chat);
    let machine = ElectionStateMachine::new(
        db,
        chain,
        reconciler,
        reminders,
        config.clone(),
        clock.clone(),
    );

    Ok(Runner::new(machine, config, clock, token_refresher))
}

/// Helpers for `#[bot_test]`-attributed tests: connect to the database named
/// by `EDENBOT_TEST_DB_URI` (skipping the test if unset), hand out a randomly
/// named database, and drop it afterwards.
#[cfg(test)]
pub mod test_support {
    use mongodb::{Client, Database};

    use crate::model::mongodb::ensure_indexes_exist;

    pub const DB_URI_VAR: &str = "EDENBOT_TEST_DB_URI";

    /// `None` means the environment provides no database and the test should
    /// be skipped.
    pub async fn setup() -> Option<Database> {
        let uri = std::env::var(DB_URI_VAR).ok()?;
        let client = Client::with_uri_str(&uri)
            .await
            .expect("Could not connect to the test database");
        // Random name to avoid collisions between tests.
        let random: u32 = rand::random();
        let db = client.database(&format!("test{random}"));
        ensure_indexes_exist(&db)
            .await
            .expect("Could not create test indexes");
        Some(db)
    }

    pub async fn cleanup(db: Database) {
        db.drop(None).await.expect("Could not drop test database");
    }
}
