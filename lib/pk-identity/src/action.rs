//! Action identifiers and the icon-name validation rule they share with
//! `.policy` parsing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Maximum length of a dotted action identifier, per `spec.md` §3.
pub const ACTION_ID_MAX_LEN: usize = 255;

/// A dotted privileged-operation identifier, e.g. `org.example.frotz.frob`.
///
/// Validated on construction against `^[a-z][a-zA-Z0-9]*(\.[a-zA-Z0-9]+)+$`
/// with total length `<= 255`; there is no way to obtain an `ActionId`
/// that doesn't satisfy this. Only the leading byte of the whole id is
/// required lowercase -- later bytes in any segment may be upper- or
/// lowercase, per `spec.md` §8's `org.freedesktop.Foo1` accept case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionId(String);

impl ActionId {
    /// Validates and wraps `id`. This is the only constructor.
    pub fn new(id: impl Into<String>) -> Result<Self, IdentityError> {
        let id = id.into();
        if validate(&id) { Ok(Self(id)) } else { Err(IdentityError::InvalidActionId(id)) }
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for ActionId {
    type Error = IdentityError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<ActionId> for String {
    fn from(value: ActionId) -> Self { value.0 }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl AsRef<str> for ActionId {
    fn as_ref(&self) -> &str { &self.0 }
}

/// `^[a-z][a-zA-Z0-9]*(\.[a-zA-Z0-9]+)+$`, length <= 255, hand-rolled the
/// way the upstream `polkit_action_validate_id` walks the string byte by
/// byte rather than compiling a regex for a grammar this small.
fn validate(id: &str) -> bool {
    if id.is_empty() || id.len() > ACTION_ID_MAX_LEN {
        return false;
    }

    let bytes = id.as_bytes();
    let mut segments = 0usize;
    let mut i = 0usize;

    // First segment: [a-z][a-zA-Z0-9]*
    if !bytes[i].is_ascii_lowercase() {
        return false;
    }
    i += 1;
    while i < bytes.len() && bytes[i] != b'.' {
        if !bytes[i].is_ascii_alphanumeric() {
            return false;
        }
        i += 1;
    }
    segments += 1;

    // Remaining segments: (\.[a-z0-9]+)+ -- letters after the leading
    // lowercase byte may be upper- or lowercase, matching the original's
    // `g_ascii_isalnum` scan (`spec.md` §8: `org.freedesktop.Foo1` accepts).
    while i < bytes.len() {
        if bytes[i] != b'.' {
            return false;
        }
        i += 1;
        let seg_start = i;
        while i < bytes.len() && bytes[i] != b'.' {
            if !bytes[i].is_ascii_alphanumeric() {
                return false;
            }
            i += 1;
        }
        if i == seg_start {
            // empty segment, e.g. "org..foo"
            return false;
        }
        segments += 1;
    }

    // Need at least two segments total: "foo" alone is rejected.
    segments >= 2
}

/// Validates an icon name per `spec.md` §3: must not look like a path and
/// must not end in a common raster-image suffix.
pub fn validate_icon_name(icon_name: &str) -> bool {
    if icon_name.ends_with(".png") || icon_name.ends_with(".jpg") {
        return false;
    }
    !icon_name.contains('/')
}
