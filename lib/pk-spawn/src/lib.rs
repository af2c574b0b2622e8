//! The child-process spawn utility (`spec.md` §4.8), used by the
//! authentication-agent integration to run helper programs (the
//! text/graphical auth agents themselves are out of scope, per `spec.md`
//! §1 Non-goals) and by anything else in the crate that needs to shell
//! out and collect the result synchronously.

mod error;
mod model;
mod spawn;

pub use error::SpawnError;
pub use model::{ExitOutcome, SpawnFlags, SpawnOutcome};
pub use spawn::spawn_sync;
