//! The closed, ten-member decision result lattice.
//!
//! Mirrors `PolKitResult` from the upstream C implementation: a plain C
//! enum with a side table mapping each member to a canonical string. Here
//! the lifetime tier (`ResultTier`) that `auth_admin*`/`auth_self*` share is
//! pulled out into its own type so callers can match on "admin vs. self"
//! and "one-shot vs. keep-always" independently instead of re-deriving it
//! from string comparisons, the way `polkit-result.c` effectively forces
//! its callers to.

use std::fmt;

/// How long a granted `AdminAuth`/`SelfAuth` authorization should stick
/// around once the user authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultTier {
    /// Grants access exactly once to the originating process.
    OneShot,
    /// Grants access for the lifetime of the originating process.
    Session,
    /// Grants access for the remainder of the caller's login session.
    KeepSession,
    /// Grants access forever (an `always` scoped grant).
    KeepAlways,
}

/// A decision from the authority: one of ten distinct codes. Not a total
/// order by permissiveness — see `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// The action is not known, or no definite answer could be computed.
    Unknown,
    /// Access denied, with no path to obtaining it via authentication.
    No,
    /// Access granted outright.
    Yes,
    /// Access denied, but authenticating as an administrator grants it.
    AdminAuth(ResultTier),
    /// Access denied, but authenticating as the caller themself grants it.
    SelfAuth(ResultTier),
}

const TABLE: &[(Decision, &str)] = &[
    (Decision::Unknown, "unknown"),
    (Decision::No, "no"),
    (Decision::AdminAuth(ResultTier::Session), "auth_admin"),
    (Decision::AdminAuth(ResultTier::KeepSession), "auth_admin_keep_session"),
    (Decision::AdminAuth(ResultTier::KeepAlways), "auth_admin_keep_always"),
    (Decision::SelfAuth(ResultTier::Session), "auth_self"),
    (Decision::SelfAuth(ResultTier::KeepSession), "auth_self_keep_session"),
    (Decision::SelfAuth(ResultTier::KeepAlways), "auth_self_keep_always"),
    (Decision::Yes, "yes"),
    (Decision::AdminAuth(ResultTier::OneShot), "auth_admin_one_shot"),
    (Decision::SelfAuth(ResultTier::OneShot), "auth_self_one_shot"),
];

impl Decision {
    /// Gives the canonical string representation, as persisted in
    /// authorization store entries and `.policy` `<defaults>` blocks.
    pub fn to_name(self) -> &'static str {
        TABLE.iter().find(|(d, _)| *d == self).map(|(_, s)| *s).expect("Decision table is exhaustive over all variants")
    }

    /// Parses a canonical string back into a `Decision`. Returns `None` for
    /// any string not in the table, including stray whitespace or casing
    /// variants -- the mapping is exact, not forgiving.
    pub fn from_name(name: &str) -> Option<Decision> {
        TABLE.iter().find(|(_, s)| *s == name).map(|(d, _)| *d)
    }

    /// True for the four `AdminAuth`/`SelfAuth` variants -- the ones for
    /// which `pk_engine`'s admin-type resolution (§4.6) is meaningful.
    pub fn is_auth_required(self) -> bool { matches!(self, Decision::AdminAuth(_) | Decision::SelfAuth(_)) }

    /// True for `AdminAuth(_)` specifically.
    pub fn is_admin_auth(self) -> bool { matches!(self, Decision::AdminAuth(_)) }

    /// True for `SelfAuth(_)` specifically.
    pub fn is_self_auth(self) -> bool { matches!(self, Decision::SelfAuth(_)) }

    /// The lifetime tier of an `AdminAuth`/`SelfAuth` decision, if any.
    pub fn tier(self) -> Option<ResultTier> {
        match self {
            Decision::AdminAuth(t) | Decision::SelfAuth(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.to_name()) }
}
