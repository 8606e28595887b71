pub mod conditioner;
pub mod window;

pub use conditioner::{SignalConditioner, GRAVITY_ALPHA};
pub use window::{RmsWindow, WindowReading};
