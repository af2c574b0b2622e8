//! `Session` and `Seat`: the login-session metadata supplied by the
//! session-tracker collaborator (`spec.md` §1, out of scope for this
//! core -- only the shape of what it hands back lives here).

use serde::{Deserialize, Serialize};

/// A login seat identifier, e.g. `seat0`. Deliberately a thin wrapper
/// rather than its own validated type: seat identifiers are opaque
/// strings handed out by the session tracker and never parsed, only
/// compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seat(pub String);

impl Seat {
    pub fn as_str(&self) -> &str { &self.0 }
}

/// A unique identifier for a login session, as handed out by the
/// session-tracker collaborator. Opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str { &self.0 }
}

/// A login session. `is_active` is mutable over the session's lifetime
/// (switching virtual terminals, fast user switching, etc.) -- the
/// tracker is responsible for keeping this in sync (§4.7), this type just
/// carries whatever the tracker last observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identifier: SessionId,
    pub uid: u32,
    pub is_active: bool,
    pub is_local: bool,
    pub remote_host: Option<String>,
    pub seat: Seat,
}

impl Session {
    /// The caller category this session falls into for policy-default
    /// resolution (§4.6 step 2): `active` or `inactive`. A bare caller with
    /// no session at all is neither -- see `Subject::category` in
    /// `pk-engine`, which handles that third case.
    pub fn category(&self) -> SessionCategory {
        if self.is_active { SessionCategory::Active } else { SessionCategory::Inactive }
    }
}

/// Which of the three policy-default buckets (`spec.md` §3 "Action") a
/// subject falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionCategory {
    Any,
    Inactive,
    Active,
}
