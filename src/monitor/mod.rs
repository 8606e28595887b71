pub mod commands;
pub mod controller;
pub mod countdown;
mod worker;

pub use commands::{MonitorCommand, MonitorSnapshot};
pub use controller::{MonitorController, MonitorHandle};
