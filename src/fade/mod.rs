//! Fade engine and easing curves

pub mod clock;
pub mod easing;
pub mod engine;

pub use clock::{Clock, ManualClock, SystemClock};
pub use easing::Easing;
pub use engine::{ActiveFade, FadeEngine, FadeStart, FadeValue, DEFAULT_TICK_INTERVAL};
