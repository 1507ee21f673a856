//! Simulation clock: fast mode and wall-clock-paced real-time mode.
//!
//! The clock maps simulation minutes to wall time. Fast mode advances
//! instantly and only yields to keep the scheduler cooperative;
//! real-time mode suspends the loop task until
//! `start_wall + sim_minute * 60 / speed_factor`. Over-due targets
//! return immediately: a slow event handler never causes catch-up
//! sleeps. All waits race the shutdown token so a stop request
//! interrupts even a long suspension.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::shutdown::ShutdownToken;

/// Smallest accepted speed factor (10x slower than real time).
pub const MIN_SPEED_FACTOR: f64 = 0.1;
/// Largest accepted speed factor.
pub const MAX_SPEED_FACTOR: f64 = 1000.0;

/// Outcome of a clock wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The target sim-minute was reached.
    Reached,
    /// Shutdown was requested mid-wait.
    Interrupted,
}

/// The simulation clock.
#[derive(Debug)]
pub enum Clock {
    /// No real delays; `now` is whatever was last waited for.
    Fast {
        /// Current simulation time in minutes.
        current: f64,
    },
    /// Paced against the wall clock through the speed factor.
    Real {
        /// Wall-clock instant of sim-minute zero.
        start: Instant,
        /// Sim-minutes per wall-clock minute.
        speed_factor: f64,
        /// Last target, so `now` is monotonic even between waits.
        current: f64,
    },
}

impl Clock {
    /// Create a fast-mode clock starting at sim-minute zero.
    pub const fn fast() -> Self {
        Self::Fast { current: 0.0 }
    }

    /// Create a real-time clock with the given speed factor.
    ///
    /// The factor is clamped into `[0.1, 1000]`; validation happens in
    /// the configuration layer, this is the last line of defense.
    pub fn real_time(speed_factor: f64) -> Self {
        Self::Real {
            start: Instant::now(),
            speed_factor: speed_factor.clamp(MIN_SPEED_FACTOR, MAX_SPEED_FACTOR),
            current: 0.0,
        }
    }

    /// The configured speed factor (fast mode reports infinity).
    pub const fn speed_factor(&self) -> f64 {
        match self {
            Self::Fast { .. } => f64::INFINITY,
            Self::Real { speed_factor, .. } => *speed_factor,
        }
    }

    /// Current simulation time in minutes.
    pub fn now(&self) -> f64 {
        match self {
            Self::Fast { current } => *current,
            Self::Real {
                start,
                speed_factor,
                current,
            } => {
                let elapsed_min = start.elapsed().as_secs_f64() / 60.0;
                (elapsed_min * speed_factor).max(*current)
            }
        }
    }

    /// Suspend until `target` sim-minutes, or until shutdown.
    ///
    /// Fast mode advances the internal time and yields once. Real-time
    /// mode sleeps the remaining wall-clock delta; an over-due target
    /// returns immediately.
    pub async fn wait_until(&mut self, target: f64, shutdown: &mut ShutdownToken) -> WaitOutcome {
        if shutdown.is_triggered() {
            return WaitOutcome::Interrupted;
        }
        match self {
            Self::Fast { current } => {
                *current = current.max(target);
                tokio::task::yield_now().await;
                WaitOutcome::Reached
            }
            Self::Real {
                start,
                speed_factor,
                current,
            } => {
                let target_elapsed =
                    Duration::from_secs_f64((target.max(0.0) * 60.0 / *speed_factor).max(0.0));
                let deadline = *start + target_elapsed;
                let now = Instant::now();
                if deadline <= now {
                    *current = current.max(target);
                    return WaitOutcome::Reached;
                }

                debug!(
                    target_sim_min = target,
                    wait_secs = (deadline - now).as_secs_f64(),
                    "clock sleeping until next event"
                );
                tokio::select! {
                    () = tokio::time::sleep_until(deadline) => {
                        *current = current.max(target);
                        WaitOutcome::Reached
                    }
                    () = shutdown.triggered() => WaitOutcome::Interrupted,
                }
            }
        }
    }
}
