// Order execution and the tick state machine
pub mod engine;
pub mod orders;
pub mod tracker;

pub use engine::{EngineSettings, TickState, TradingEngine};
pub use orders::{FillPolicy, OrderExecutor};
pub use tracker::PositionTracker;
