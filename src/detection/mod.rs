pub mod machine;
pub mod state;

pub use machine::{Action, DetectionMachine};
pub use state::{DetectionConfig, DetectorState, PendingConfirmation};
