//! Coarse periodic scheduling
//!
//! Watchers do not own timers. They subscribe to a slot of the shared
//! [`TimingWheel`] and wake whenever the wheel passes that slot.
//!
//! # Modules
//!
//! - [`wheel`] - Fixed ring of broadcast slots driven by one ticker task

pub mod wheel;

pub use wheel::{TimingWheel, WheelSignal};
