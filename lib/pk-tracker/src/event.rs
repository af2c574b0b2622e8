//! The two change-signal families the tracker evicts/updates on
//! (`spec.md` §4.7).

/// A signal from the message-bus collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// `NameOwnerChanged` for `name`. Only an empty `new_owner` (the name
    /// dropped off the bus) evicts the cache entry; a non-empty one (the
    /// name just changed hands) is not acted on here.
    NameOwnerChanged { name: String, new_owner: Option<String> },
}

/// A signal from the session-tracker collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session was torn down -- evict every cached caller in that
    /// session, on any seat.
    SessionRemoved { session_id: String },
    /// The session's active-ness changed -- update cached callers'
    /// `session.is_active` in place rather than evicting.
    ActiveChanged { session_id: String, is_active: bool },
}
