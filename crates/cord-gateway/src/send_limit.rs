//! The gateway command budget.
//!
//! The server allows 120 commands per 60 seconds per connection, not
//! counting heartbeats. Outbound commands wait here before hitting the
//! socket; presence and voice updates queue behind the same window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// Commands allowed per window.
pub const COMMANDS_PER_WINDOW: u32 = 120;

/// Window length.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window limiter for outbound gateway commands.
#[derive(Debug)]
pub struct SendLimiter {
    timestamps: Mutex<VecDeque<Instant>>,
    max_commands: u32,
    window: Duration,
}

impl Default for SendLimiter {
    fn default() -> Self {
        Self::new(COMMANDS_PER_WINDOW, WINDOW)
    }
}

impl SendLimiter {
    /// Create a limiter with a custom budget.
    #[must_use]
    pub fn new(max_commands: u32, window: Duration) -> Self {
        Self {
            timestamps: Mutex::new(VecDeque::with_capacity(max_commands as usize + 1)),
            max_commands,
            window,
        }
    }

    fn try_record(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();

        while timestamps
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            timestamps.pop_front();
        }

        if (timestamps.len() as u32) < self.max_commands {
            timestamps.push_back(now);
            Ok(())
        } else {
            // Safe to index: the queue is at capacity, so it is non-empty.
            let oldest = timestamps[0];
            Err(self.window - now.duration_since(oldest))
        }
    }

    /// Wait until a command slot is available, then claim it.
    pub async fn acquire(&self) {
        loop {
            match self.try_record() {
                Ok(()) => return,
                Err(wait) => {
                    debug!(?wait, "gateway command budget exhausted, queueing");
                    sleep(wait).await;
                }
            }
        }
    }

    /// Commands used in the current window.
    #[must_use]
    pub fn used(&self) -> u32 {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();
        while timestamps
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            timestamps.pop_front();
        }
        timestamps.len() as u32
    }
}
