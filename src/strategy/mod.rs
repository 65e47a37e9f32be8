// Signal generation module
pub mod action_zone;

use crate::models::{Candle, SignalSet};

pub use action_zone::{ActionZone, ActionZoneConfig};

/// Annotates a closed-candle window with entry/exit flags and the stop
/// distance for the latest candle. The trading engine depends only on this
/// trait, not on any particular indicator set.
pub trait SignalGenerator: Send + Sync {
    /// Compute the signal set for the most recent candle in the window
    fn annotate(&self, candles: &[Candle]) -> anyhow::Result<SignalSet>;

    /// Generator name, for logs
    fn name(&self) -> &str;

    /// Minimum candles required to produce a signal
    fn min_candles_required(&self) -> usize;
}
