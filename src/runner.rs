use crate::chain::TokenRefresher;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::Result;
use crate::machine::ElectionStateMachine;
use crate::model::election::BotMode;

/// The single poll loop driving the state machine.
///
/// A failed cycle is logged and the loop carries on at the next tick; the
/// previous cycle's mode keeps choosing the interval until a cycle succeeds
/// again.
pub struct Runner {
    machine: ElectionStateMachine,
    config: Config,
    clock: Clock,
    // Held so the refresh task lives exactly as long as the runner.
    _token_refresher: TokenRefresher,
}

impl Runner {
    pub fn new(
        machine: ElectionStateMachine,
        config: Config,
        clock: Clock,
        token_refresher: TokenRefresher,
    ) -> Self {
        Self {
            machine,
            config,
            clock,
            _token_refresher: token_refresher,
        }
    }

    /// Poll forever.
    pub async fn run(&self) -> Result<()> {
        info!("Poll loop starting");
        let mut mode = BotMode::NotElection;
        loop {
            mode = self.tick(mode).await;
        }
    }

    /// Poll a fixed number of times, for demo runs.
    pub async fn run_ticks(&self, ticks: u32) -> Result<()> {
        info!("Poll loop starting for {ticks} ticks");
        let mut mode = BotMode::NotElection;
        for _ in 0..ticks {
            mode = self.tick(mode).await;
        }
        info!("Poll loop finished after {ticks} ticks");
        Ok(())
    }

    async fn tick(&self, previous_mode: BotMode) -> BotMode {
        let mode = match self.machine.poll().await {
            Ok(mode) => mode,
            Err(e) => {
                error!("Poll cycle failed: {e}");
                previous_mode
            }
        };
        let interval = match mode {
            BotMode::Election => self.config.election_poll_interval(),
            BotMode::NotElection => self.config.poll_interval(),
        };
        self.clock.sleep(interval).await;
        mode
    }
}
