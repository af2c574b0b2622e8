//! The authorization constraint algebra (`spec.md` §4.4): parsing,
//! matching and serializing the conditions attached to an explicit grant.

use std::fmt;
use std::path::{Path, PathBuf};

use pk_identity::Caller;
use thiserror::Error;

/// Maximum number of constraints a single grant may carry.
pub const MAX_CONSTRAINTS_PER_GRANT: usize = 64;

/// A single runtime condition restricting when a grant applies.
///
/// Equality is structural (`derive(PartialEq)`); a `Vec<Constraint>`'s
/// equality is therefore order-sensitive, which is a known limitation
/// carried over from the upstream implementation rather than fixed here --
/// see `spec.md` §9 "Constraint ordering sensitivity".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constraint {
    /// The caller's session must be local (not remote).
    Local,
    /// The caller's session must be active.
    Active,
    /// The caller's executable must equal this absolute path.
    Exe(PathBuf),
    /// The caller's security label must equal this string.
    SelinuxContext(String),
}

#[derive(Debug, Error)]
pub enum ConstraintError {
    #[error("unrecognised constraint token: {0:?}")]
    UnknownToken(String),
    #[error("exe constraint path must be absolute: {0:?}")]
    ExeNotAbsolute(String),
    #[error("constraint list exceeds the {MAX_CONSTRAINTS_PER_GRANT}-constraint limit: {0}")]
    TooManyConstraints(usize),
}

impl Constraint {
    /// Parses a single opaque token back into a `Constraint`. Inverse of
    /// [`Constraint::serialize`].
    pub fn parse(token: &str) -> Result<Self, ConstraintError> {
        match token {
            "local" => Ok(Constraint::Local),
            "active" => Ok(Constraint::Active),
            _ => {
                if let Some(path) = token.strip_prefix("exe:") {
                    if !path.starts_with('/') {
                        return Err(ConstraintError::ExeNotAbsolute(path.to_string()));
                    }
                    Ok(Constraint::Exe(PathBuf::from(path)))
                } else if let Some(label) = token.strip_prefix("selinux_context:") {
                    Ok(Constraint::SelinuxContext(label.to_string()))
                } else {
                    Err(ConstraintError::UnknownToken(token.to_string()))
                }
            },
        }
    }

    /// Serializes back to the opaque single-token form used on disk.
    pub fn serialize(&self) -> String {
        match self {
            Constraint::Local => "local".to_string(),
            Constraint::Active => "active".to_string(),
            Constraint::Exe(path) => format!("exe:{}", path.display()),
            Constraint::SelinuxContext(label) => format!("selinux_context:{label}"),
        }
    }

    /// Whether `caller` currently satisfies this constraint. `exe` is
    /// checked by resolving the caller's `/proc/<pid>/exe` symlink on
    /// Linux; on other platforms (or if the process has already exited,
    /// or `/proc` isn't mounted) an `Exe` constraint never matches, which
    /// is the safe default for an authorization check.
    pub fn matches(&self, caller: &Caller) -> bool {
        match self {
            Constraint::Local => caller.session.as_ref().is_some_and(|s| s.is_local),
            Constraint::Active => caller.session.as_ref().is_some_and(|s| s.is_active),
            Constraint::Exe(expected) => caller_exe_path(caller.pid).as_deref() == Some(expected.as_path()),
            Constraint::SelinuxContext(expected) => caller.security_label.as_ref().is_some_and(|l| l.as_str() == expected),
        }
    }
}

#[cfg(target_os = "linux")]
fn caller_exe_path(pid: i64) -> Option<PathBuf> { std::fs::read_link(format!("/proc/{pid}/exe")).ok() }

#[cfg(not(target_os = "linux"))]
fn caller_exe_path(_pid: i64) -> Option<PathBuf> { None }

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.serialize()) }
}

/// An ordered list of constraints, all of which must hold for the grant
/// they're attached to to apply. Order-sensitive for equality/dedup
/// purposes (see the note on [`Constraint`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet(Vec<Constraint>);

impl ConstraintSet {
    pub fn new(constraints: Vec<Constraint>) -> Result<Self, ConstraintError> {
        if constraints.len() > MAX_CONSTRAINTS_PER_GRANT {
            return Err(ConstraintError::TooManyConstraints(constraints.len()));
        }
        Ok(Self(constraints))
    }

    pub fn empty() -> Self { Self(Vec::new()) }

    pub fn as_slice(&self) -> &[Constraint] { &self.0 }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// True iff every constraint in the set is satisfied by `caller`.
    pub fn all_match(&self, caller: &Caller) -> bool { self.0.iter().all(|c| c.matches(caller)) }

    /// Parses a comma-separated constraint list, as accepted on the
    /// writer helper's command line (§6 "Process model").
    pub fn parse_comma_separated(raw: &str) -> Result<Self, ConstraintError> {
        if raw.is_empty() {
            return Ok(Self::empty());
        }
        let constraints: Result<Vec<Constraint>, ConstraintError> = raw.split(',').map(Constraint::parse).collect();
        Self::new(constraints?)
    }

    /// The strongest set of constraints `caller` currently satisfies, used
    /// when a grant is recorded without the caller specifying their own
    /// constraint list (the normal `pkexec`-style grant flow): a caller in
    /// an active, local session derives `[local, active]`; a caller whose
    /// executable can be resolved also gets an `exe:` constraint appended.
    pub fn derive_from_caller(caller: &Caller) -> Self {
        let mut constraints = Vec::new();
        if let Some(session) = &caller.session {
            if session.is_local {
                constraints.push(Constraint::Local);
            }
            if session.is_active {
                constraints.push(Constraint::Active);
            }
        }
        if let Some(exe) = caller_exe_path(caller.pid) {
            constraints.push(Constraint::Exe(exe));
        }
        if let Some(label) = &caller.security_label {
            constraints.push(Constraint::SelinuxContext(label.as_str().to_string()));
        }
        Self(constraints)
    }
}

pub fn exe_path_for_pid(pid: i64) -> Option<PathBuf> { caller_exe_path(pid) }
