//! The `Caller` value type: the identity of a requesting process as
//! reported by the message-bus collaborator, plus the bus-name and
//! security-label validation it depends on.

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;
use crate::session::Session;

/// A D-Bus connection name, either the bus-assigned unique form (`:1.42`)
/// or a well-known dotted form (`org.freedesktop.PolicyKit`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BusName(String);

impl BusName {
    pub fn new(name: impl Into<String>) -> Result<Self, IdentityError> {
        let name = name.into();
        if validate_bus_name(&name) { Ok(Self(name)) } else { Err(IdentityError::InvalidBusName(name)) }
    }

    pub fn as_str(&self) -> &str { &self.0 }

    /// True for the bus-assigned `:1.42`-style unique form.
    pub fn is_unique(&self) -> bool { self.0.starts_with(':') }
}

impl TryFrom<String> for BusName {
    type Error = IdentityError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<BusName> for String {
    fn from(value: BusName) -> Self { value.0 }
}

fn is_name_char(b: u8) -> bool { b.is_ascii_alphanumeric() || b == b'_' || b == b'-' }

/// Splits on `.` and checks each segment is non-empty and made only of
/// name characters; `unique` additionally allows segments to start with a
/// digit (the unique form uses numeric connection/serial components).
fn validate_segments(body: &str, unique: bool) -> bool {
    if body.is_empty() {
        return false;
    }
    let segments: Vec<&str> = body.split('.').collect();
    if segments.len() < 2 {
        return false;
    }
    for seg in segments {
        if seg.is_empty() {
            return false;
        }
        let bytes = seg.as_bytes();
        if !unique && bytes[0].is_ascii_digit() {
            return false;
        }
        if !bytes.iter().all(|&b| is_name_char(b)) {
            return false;
        }
    }
    true
}

/// Validates either the unique `:`-prefixed form or the well-known dotted
/// form of a bus name, per `spec.md` §4.1.
pub fn validate_bus_name(name: &str) -> bool {
    if let Some(rest) = name.strip_prefix(':') { validate_segments(rest, true) } else { validate_segments(name, false) }
}

/// An opaque caller-supplied security label (e.g. an SELinux context).
/// Validated with a permissive identifier rule: non-empty, printable,
/// no embedded whitespace or control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecurityLabel(String);

impl SecurityLabel {
    pub fn new(label: impl Into<String>) -> Result<Self, IdentityError> {
        let label = label.into();
        if !label.is_empty() && label.chars().all(|c| c.is_ascii_graphic() || c == ' ') && !label.starts_with(' ') && !label.ends_with(' ') {
            Ok(Self(label))
        } else {
            Err(IdentityError::InvalidSecurityLabel(label))
        }
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for SecurityLabel {
    type Error = IdentityError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<SecurityLabel> for String {
    fn from(value: SecurityLabel) -> Self { value.0 }
}

/// The kernel-reported start time of a process, in the kernel's own
/// (unspecified-to-us) clock ticks. Exists as its own type rather than a
/// bare `u64` so `(pid, start_time)` pairs can't be accidentally swapped
/// with a plain timestamp -- it is compared for equality only, never
/// arithmetic on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessStartTime(pub u64);

/// A requesting process, as reported by the message-bus collaborator.
///
/// `start_time` disambiguates against pid reuse: a `(pid, start_time)` pair
/// identifies one specific process invocation, never a later process that
/// happens to reuse the pid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub bus_name: Option<BusName>,
    pub uid: u32,
    pub pid: i64,
    pub start_time: ProcessStartTime,
    pub security_label: Option<SecurityLabel>,
    pub session: Option<Session>,
}

impl Caller {
    /// Builds a `Caller`, validating `pid > 0` (§3 invariant). All other
    /// fields were already validated by their own constructors.
    pub fn new(
        bus_name: Option<BusName>,
        uid: u32,
        pid: i64,
        start_time: ProcessStartTime,
        security_label: Option<SecurityLabel>,
        session: Option<Session>,
    ) -> Result<Self, IdentityError> {
        if pid <= 0 {
            return Err(IdentityError::InvalidPid(pid));
        }
        Ok(Self { bus_name, uid, pid, start_time, security_label, session })
    }

    /// The `(pid, start_time)` identity pair used as a cache/store key.
    pub fn process_key(&self) -> (i64, ProcessStartTime) { (self.pid, self.start_time) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_bus_names() {
        assert!(validate_bus_name(":1.42"));
        assert!(validate_bus_name("org.freedesktop.PolicyKit"));
    }

    #[test]
    fn rejects_malformed_bus_names() {
        assert!(!validate_bus_name(""));
        assert!(!validate_bus_name("nodoes"));
        assert!(!validate_bus_name("org..foo"));
        assert!(!validate_bus_name("1.foo"));
        assert!(!validate_bus_name("org.foo bar"));
    }

    #[test]
    fn caller_requires_positive_pid() {
        let err = Caller::new(None, 1000, 0, ProcessStartTime(1), None, None).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidPid(0)));
        assert!(Caller::new(None, 1000, 1, ProcessStartTime(1), None, None).is_ok());
    }
}
