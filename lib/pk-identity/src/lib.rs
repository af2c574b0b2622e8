//! Identity value types for the PolicyKit authorization core: actions,
//! callers, sessions, seats, and the ten-member decision result lattice
//! they're all judged against.
//!
//! Every public constructor here either succeeds with a value that is
//! known-valid, or fails with an [`IdentityError`] -- there is no path to
//! a half-valid `ActionId` or `Caller` that only blows up later.

pub mod action;
pub mod caller;
pub mod error;
pub mod result;
pub mod session;

pub use action::{validate_icon_name, ActionId, ACTION_ID_MAX_LEN};
pub use caller::{BusName, Caller, ProcessStartTime, SecurityLabel};
pub use error::IdentityError;
pub use result::{Decision, ResultTier};
pub use session::{Seat, Session, SessionCategory, SessionId};

#[cfg(any(test, feature = "test-support"))]
pub mod debug_override {
    //! A debug-only caller override, gated behind `test-support` so it can
    //! never compile into a release build. `spec.md` §6 describes an
    //! environment variable "recognised only in test builds" for
    //! overriding the apparent uid/pid/security-label/session of a
    //! synthetic caller; this is that variable, read from
    //! `POLICYKIT_DEBUG_CALLER` as `uid:pid:start_time[:security_label]`.

    use crate::caller::{Caller, ProcessStartTime, SecurityLabel};
    use crate::error::IdentityError;

    pub const ENV_VAR: &str = "POLICYKIT_DEBUG_CALLER";

    /// Parses [`ENV_VAR`] into a synthetic `Caller`. Returns `Ok(None)` if
    /// the variable is unset; never silently falls back to a "real"
    /// caller if the variable is set but malformed.
    pub fn debug_caller_from_env() -> Result<Option<Caller>, IdentityError> {
        let Ok(raw) = std::env::var(ENV_VAR) else {
            return Ok(None);
        };
        parse(&raw).map(Some)
    }

    fn parse(raw: &str) -> Result<Caller, IdentityError> {
        let mut parts = raw.split(':');
        let uid: u32 = parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| IdentityError::InvalidPid(-1))?;
        let pid: i64 = parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| IdentityError::InvalidPid(-1))?;
        let start_time: u64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let label = match parts.next() {
            Some(s) if !s.is_empty() => Some(SecurityLabel::new(s)?),
            _ => None,
        };
        Caller::new(None, uid, pid, ProcessStartTime(start_time), label, None)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_well_formed_override() {
            let c = parse("1000:4242:99:unconfined_t").unwrap();
            assert_eq!(c.uid, 1000);
            assert_eq!(c.pid, 4242);
            assert_eq!(c.start_time.0, 99);
            assert_eq!(c.security_label.unwrap().as_str(), "unconfined_t");
        }

        #[test]
        fn rejects_non_positive_pid() { assert!(parse("1000:0:99").is_err()); }
    }
}
