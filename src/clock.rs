use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// EOSIO-style chains produce two blocks per second.
const BLOCKS_PER_SECOND: i64 = 2;

/// Time source for the poll loop.
///
/// Demo mode swaps wall-clock waiting for a virtual clock that jumps forward
/// instantly, and derives a virtual chain height from the virtual time. The
/// state machine and reconciler run unchanged against either variant.
#[derive(Debug, Clone)]
pub enum Clock {
    Wall,
    Sim(Arc<SimState>),
}

#[derive(Debug)]
pub struct SimState {
    start: DateTime<Utc>,
    start_height: u32,
    elapsed: Mutex<Duration>,
}

impl Clock {
    pub fn wall() -> Self {
        Self::Wall
    }

    pub fn simulated(start: DateTime<Utc>, start_height: u32) -> Self {
        Self::Sim(Arc::new(SimState {
            start,
            start_height,
            elapsed: Mutex::new(Duration::zero()),
        }))
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::Wall => Utc::now(),
            Self::Sim(state) => state.start + *state.elapsed.lock().unwrap(),
        }
    }

    /// The chain height to pin queries to, if this clock dictates one.
    /// The wall clock defers to the chain's own head block.
    pub fn height_hint(&self) -> Option<u32> {
        match self {
            Self::Wall => None,
            Self::Sim(state) => {
                let elapsed = *state.elapsed.lock().unwrap();
                let blocks = elapsed.num_seconds() * BLOCKS_PER_SECOND;
                Some(state.start_height + blocks as u32)
            }
        }
    }

    /// Wait out one poll interval. In demo mode this advances the virtual
    /// clock and returns immediately.
    pub async fn sleep(&self, interval: Duration) {
        match self {
            Self::Wall => {
                let millis = interval.num_milliseconds().max(0) as u64;
                tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
            }
            Self::Sim(state) => {
                let mut elapsed = state.elapsed.lock().unwrap();
                *elapsed = *elapsed + interval;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[tokio::test]
    async fn simulated_clock_advances_without_waiting() {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let clock = Clock::simulated(start, 1000);
        assert_eq!(clock.now(), start);
        assert_eq!(clock.height_hint(), Some(1000));

        clock.sleep(Duration::minutes(5)).await;
        assert_eq!(clock.now(), start + Duration::minutes(5));
        // 5 minutes at 2 blocks per second.
        assert_eq!(clock.height_hint(), Some(1000 + 600));
    }

    #[test]
    fn wall_clock_has_no_height_hint() {
        assert_eq!(Clock::wall().height_hint(), None);
    }
}
