//! The in-memory shape of one persisted authorization line, and its
//! fingerprint grammar: `scope=...:key=value:...`, every key and value
//! percent-encoded per `spec.md` §6 "Store line grammar".

use pk_constraints::ConstraintSet;
use pk_identity::ActionId;

/// The lifetime class of a grant, per `spec.md` §3's scope table. Each
/// variant carries exactly the fields that scope requires; there is no
/// way to build e.g. a `Session` entry without a session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Grants access exactly once to one specific process invocation.
    ProcessOneShot { pid: i64, pid_start_time: u64 },
    /// Grants access for the lifetime of one specific process invocation.
    Process { pid: i64, pid_start_time: u64 },
    /// Grants access for the remainder of a login session.
    Session { session_id: String },
    /// Grants access forever, recorded after the caller authenticated.
    Always,
    /// An administrator-issued positive grant, not tied to an
    /// authentication event.
    Grant,
    /// An administrator-issued negative grant (a revocation that
    /// dominates any positive grant for the same tuple).
    GrantNegative,
}

impl Scope {
    pub fn name(&self) -> &'static str {
        match self {
            Scope::ProcessOneShot { .. } => "process-one-shot",
            Scope::Process { .. } => "process",
            Scope::Session { .. } => "session",
            Scope::Always => "always",
            Scope::Grant => "grant",
            Scope::GrantNegative => "grant-negative",
        }
    }

    /// True for `grant-negative` -- the only scope whose entries dominate
    /// positive grants for the same `(uid, action, constraint-set)` tuple
    /// (`spec.md` §3 invariant 5).
    pub fn is_negative(&self) -> bool { matches!(self, Scope::GrantNegative) }

    /// True for the transient-root scopes (`process*`, `session`):
    /// cleared at boot, never surviving a reboot (`spec.md` §4.5).
    pub fn is_transient(&self) -> bool { matches!(self, Scope::ProcessOneShot { .. } | Scope::Process { .. } | Scope::Session { .. }) }
}

/// One line of a `user-<name>.auths` file: an explicit authorization,
/// positive or negative, scoped and optionally constrained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub scope: Scope,
    pub action_id: ActionId,
    /// Unix timestamp the entry was recorded at.
    pub when: u64,
    /// The uid that completed the authentication, for `process*`/
    /// `session`/`always` entries.
    pub auth_as: Option<u32>,
    /// The uid that issued the grant, for `grant`/`grant-negative`
    /// entries.
    pub granted_by: Option<u32>,
    pub constraints: ConstraintSet,
}

impl Entry {
    /// Whether this entry currently applies to the given caller process
    /// identity, ignoring constraints (checked separately). `process*`
    /// entries require an exact `(pid, start_time)` match; `session`
    /// requires a session id match (checked by the caller, which has the
    /// session context); `always`/`grant`/`grant-negative` always apply.
    pub fn matches_process(&self, pid: i64, pid_start_time: u64) -> bool {
        match &self.scope {
            Scope::ProcessOneShot { pid: p, pid_start_time: t } | Scope::Process { pid: p, pid_start_time: t } => *p == pid && *t == pid_start_time,
            _ => true,
        }
    }

    pub fn matches_session(&self, session_id: &str) -> bool {
        match &self.scope {
            Scope::Session { session_id: s } => s == session_id,
            _ => true,
        }
    }
}
