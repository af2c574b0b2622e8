//! The caller cache (`spec.md` §4.7): memoizes `Caller` lookups by bus
//! name and by `(pid, start_time)`, invalidated by signals from the
//! session-tracker and message-bus collaborators.
//!
//! Modeled as an actor (`spec.md` §9 "Global state"): a single thread
//! owns both maps; [`TrackerHandle`] is the cheap, `Clone + Send` value
//! mechanisms actually hold and call request/response style.

pub mod actor;
pub mod event;
pub mod source;

pub use actor::{spawn, TrackerHandle};
pub use event::{BusEvent, SessionEvent};
pub use source::{CallerSource, StaticCallerSource};
