//! The interfaces the tracker populates its cache from on a miss
//! (`spec.md` §1: the session-tracker and message-bus collaborators are
//! out of scope for this core, "referenced only through the interfaces
//! they expose").

use pk_identity::Caller;

/// Resolves a fresh [`Caller`] on a cache miss. A real daemon implements
/// this against its D-Bus connection (for bus names) and `/proc` or the
/// session tracker (for pids); tests substitute a fixed table.
pub trait CallerSource: Send {
    fn lookup_by_bus_name(&self, name: &str) -> Option<Caller>;
    fn lookup_by_pid(&self, pid: i64) -> Option<Caller>;
}

/// A `CallerSource` that answers from a fixed in-memory table. Used in
/// tests; also a reasonable stand-in for `POLICYKIT_DEBUG_CALLER`-style
/// fixtures outside of test builds.
#[derive(Debug, Clone, Default)]
pub struct StaticCallerSource {
    by_bus_name: Vec<(String, Caller)>,
    by_pid: Vec<(i64, Caller)>,
}

impl StaticCallerSource {
    pub fn new() -> Self { Self::default() }

    pub fn with_bus_name(mut self, name: impl Into<String>, caller: Caller) -> Self {
        self.by_bus_name.push((name.into(), caller));
        self
    }

    pub fn with_pid(mut self, pid: i64, caller: Caller) -> Self {
        self.by_pid.push((pid, caller));
        self
    }
}

impl CallerSource for StaticCallerSource {
    fn lookup_by_bus_name(&self, name: &str) -> Option<Caller> { self.by_bus_name.iter().find(|(n, _)| n == name).map(|(_, c)| c.clone()) }

    fn lookup_by_pid(&self, pid: i64) -> Option<Caller> { self.by_pid.iter().find(|(p, _)| *p == pid).map(|(_, c)| c.clone()) }
}
