//! [`Subject`]: the two things a decision can be asked about, per
//! `spec.md` §4.6's `decide(action, subject, ...)` where `subject ∈
//! Caller | Session`.

use pk_identity::{Caller, Session, SessionCategory};

/// The entity a decision is computed for. The common case is a full
/// `Caller` (a mechanism checking a specific requesting process); a bare
/// `Session` supports session-authorisation queries that aren't tied to
/// one process (`spec.md` GLOSSARY "Subject").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Caller(Caller),
    Session(Session),
}

impl Subject {
    pub fn uid(&self) -> u32 {
        match self {
            Subject::Caller(c) => c.uid,
            Subject::Session(s) => s.uid,
        }
    }

    pub fn caller(&self) -> Option<&Caller> {
        match self {
            Subject::Caller(c) => Some(c),
            Subject::Session(_) => None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            Subject::Caller(c) => c.session.as_ref(),
            Subject::Session(s) => Some(s),
        }
    }

    /// The caller category used to pick the policy-file default
    /// (`spec.md` §4.6 step 2): active if in an active session, inactive
    /// if in a non-active session, `any` otherwise.
    pub fn category(&self) -> SessionCategory { self.session().map(|s| s.category()).unwrap_or(SessionCategory::Any) }

    /// The `(pid, start_time)` this subject's process-scoped grants must
    /// match, if any -- only a full `Caller` has one.
    pub fn process_key(&self) -> Option<(i64, u64)> { self.caller().map(|c| (c.pid, c.start_time.0)) }

    pub fn session_id(&self) -> Option<&str> { self.session().map(|s| s.identifier.as_str()) }
}

impl From<Caller> for Subject {
    fn from(caller: Caller) -> Self { Subject::Caller(caller) }
}

impl From<Session> for Subject {
    fn from(session: Session) -> Self { Subject::Session(session) }
}
