use config::{Config, ConfigError, File};
use serde::Deserialize;

/// Runtime configuration, read from an optional `Settings` file with a
/// `BOT_`-prefixed environment override for every field.
///
/// Credentials come from the environment (loaded via dotenvy in main), never
/// from the settings file.
#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub exchange_url: String,
    pub symbol: String,
    pub timeframe: String,
    pub candle_limit: usize,
    /// Fraction of available cash risked per trade
    pub risk_fraction: f64,
    /// Hard cap on position size in base units
    pub max_position_size: f64,
    pub leverage: u32,
    /// Stop distance = smoothed volatility * this multiplier
    pub stop_multiplier: f64,
    /// Take-profit distance as a multiple of the stop distance; absent
    /// means no take profit.
    pub take_profit_ratio: Option<f64>,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    /// Seconds past the bar boundary to fire the tick, giving the exchange
    /// time to close the candle
    pub tick_offset_secs: u64,
}

impl BotConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("exchange_url", "https://ftx.com")?
            .set_default("symbol", "BTC-PERP")?
            .set_default("timeframe", "1h")?
            .set_default("candle_limit", 99)?
            .set_default("risk_fraction", 0.0001)?
            .set_default("max_position_size", 0.05)?
            .set_default("leverage", 3)?
            .set_default("stop_multiplier", 1.2)?
            .set_default("retry_attempts", 5)?
            .set_default("retry_delay_secs", 5)?
            .set_default("tick_offset_secs", 10)?
            .add_source(File::with_name("Settings").required(false))
            .add_source(config::Environment::with_prefix("BOT"));

        builder.build()?.try_deserialize()
    }
}
