//! Interval tickers for Strumline room timers.
//!
//! Each room owns two: the ping broadcast and the liveness sweep. A ticker
//! sits inside the room actor's `tokio::select!` loop next to the command
//! channel:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = ping.wait_for_tick() => { /* broadcast ping */ }
//!         _ = sweep.wait_for_tick() => { /* evict silent sessions */ }
//!     }
//! }
//! ```
//!
//! A ticker without a period never fires, which lets tests and embedders
//! switch a timer off without changing the loop.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

/// Configuration for a [`Ticker`].
#[derive(Debug, Clone)]
pub struct TickerConfig {
    /// Time between ticks. `None` disables the ticker.
    pub period: Option<Duration>,
    /// Random delay (0..max) added to the first tick so rooms created in
    /// the same instant do not fire together.
    pub initial_jitter: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            period: None,
            initial_jitter: Duration::from_millis(2),
        }
    }
}

impl TickerConfig {
    pub fn every(period: Duration) -> Self {
        Self {
            period: Some(period),
            ..Default::default()
        }
    }

    /// Zero periods are treated as disabled.
    fn validated(mut self) -> Self {
        if self.period == Some(Duration::ZERO) {
            warn!("zero ticker period, disabling ticker");
            self.period = None;
        }
        self
    }
}

/// A repeating timer.
///
/// Missed ticks are skipped rather than replayed: after a late wakeup the
/// next deadline is one period from now.
pub struct Ticker {
    period: Option<Duration>,
    next_tick: Option<Instant>,
}

impl Ticker {
    pub fn new(config: TickerConfig) -> Self {
        let config = config.validated();
        let next_tick = config.period.map(|period| {
            let jitter = if config.initial_jitter > Duration::ZERO {
                let max = config.initial_jitter.as_micros() as u64;
                Duration::from_micros(rand::rng().random_range(0..max))
            } else {
                Duration::ZERO
            };
            Instant::now() + period + jitter
        });

        match config.period {
            Some(period) => debug!(period_ms = period.as_millis() as u64, "ticker created"),
            None => debug!("ticker created disabled"),
        }

        Self {
            period: config.period,
            next_tick,
        }
    }

    /// A ticker firing every `period`, with the default jitter.
    pub fn every(period: Duration) -> Self {
        Self::new(TickerConfig::every(period))
    }

    /// A ticker that never fires.
    pub fn disabled() -> Self {
        Self::new(TickerConfig::default())
    }

    /// Waits until the next tick is due.
    ///
    /// Pends forever for a disabled ticker, so a `select!` loop simply
    /// never takes this branch.
    pub async fn wait_for_tick(&mut self) {
        let (next, period) = match (self.next_tick, self.period) {
            (Some(next), Some(period)) => (next, period),
            _ => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        let late_by = now.saturating_duration_since(next);
        let skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
        if skipped > 0 {
            warn!(
                skipped,
                late_ms = late_by.as_millis() as u64,
                "ticker fell behind, skipping ahead"
            );
        }

        self.next_tick = Some(now + period);
        trace!("tick fired");
    }
}
