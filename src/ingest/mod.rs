//! Event ingestion: decoding, historical replay, the model state machine and
//! the async worker that drives it

mod blacklist;
pub mod event;
pub mod log;
mod machine;
mod runtime;

pub use blacklist::Blacklist;
pub use event::RawEvent;
pub use log::{parse_events, ActivityLog, JsonlActivityLog, TimeWindow};
pub use machine::{
    Continuation, EventOutcome, IgnoreReason, ModelSnapshot, SearchModel, Submission,
};
pub use runtime::{ModelHandle, ModelRuntime};
