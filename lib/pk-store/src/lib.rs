//! The atomic, per-user append-only authorization grant store
//! (`spec.md` §4.5): on-disk line grammar, the mkstemp-rename-trigger
//! append protocol, and the three read-side iterators the decision
//! engine walks.

pub mod error;
pub mod file;
pub mod fingerprint;
pub mod model;
pub mod resolver;
pub mod store;

pub use error::StoreError;
pub use fingerprint::{parse_entry, serialize_entry};
pub use model::{Entry, Scope};
pub use resolver::{DecimalUserNameResolver, SystemUserNameResolver, UserNameResolver};
pub use store::{AuthStore, VisitControl};
