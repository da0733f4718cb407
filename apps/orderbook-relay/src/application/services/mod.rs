//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `pump`: per-subscription polling loops and the set that tracks them
//! - `upstream`: fetch health shared by every pump

pub mod pump;
pub mod upstream;

pub use pump::{DEFAULT_POLL_INTERVAL, PumpConfig, PumpReport, PumpSet, UpdatePump};
pub use upstream::{UpstreamState, UpstreamStatus};
