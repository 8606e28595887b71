pub mod event;
pub mod sample;

pub use event::{ActivityEvent, ActivityKind};
pub use sample::Sample;
