//! The authorization decision engine (`spec.md` §4.6): the function that
//! composes the policy cache, the configuration override tree and the
//! authorization store into one of the ten `Decision` codes.

pub mod admin;
pub mod engine;
pub mod error;
pub mod grant;
pub mod subject;

pub use admin::{resolve_admin_identities, AdminIdentities};
pub use engine::decide;
pub use error::DecisionError;
pub use grant::{authorize_read_for_uid, authorize_revoke_for_uid, request_grant, GrantError, ACTION_GRANT, ACTION_READ_OTHERS, ACTION_REVOKE_OTHERS};
pub use subject::Subject;
