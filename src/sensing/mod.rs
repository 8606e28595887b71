pub mod controller;
pub mod loop_worker;
pub mod parser;

pub use controller::SensingController;
pub use loop_worker::SensingStats;
pub use parser::{parse_line, ControlCommand, InputLine};
