//! The in-memory shape of a loaded configuration override tree.

use pk_identity::Decision;
use regex::Regex;

/// What a `<match>` node tests against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// `<match action="regex">` -- tested against the requested action id.
    Action,
    /// `<match user="regex">` -- tested against the caller's uid (as a
    /// decimal string) or their user name, either may match.
    User,
}

/// Which kind of principal a `define_admin_auth` rule names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAuthKind {
    User,
    Group,
}

/// A resolved `define_admin_auth` rule: who counts as an administrator
/// along the branch of the tree it appears on.
///
/// `original_source/src/polkit/polkit-config.c` keys this off the XML
/// attribute name (`user="..."` or `group="..."`). The data string itself
/// may additionally carry a `unix-user:`/`unix-group:` prefix (the same
/// convention used elsewhere in the suite to disambiguate identity
/// strings); a bare name defers to the attribute's own kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAuthRule {
    pub kind: AdminAuthKind,
    pub name: String,
}

impl AdminAuthRule {
    pub fn parse(attr_kind: AdminAuthKind, value: &str) -> Self {
        if let Some(name) = value.strip_prefix("unix-user:") {
            Self { kind: AdminAuthKind::User, name: name.to_string() }
        } else if let Some(name) = value.strip_prefix("unix-group:") {
            Self { kind: AdminAuthKind::Group, name: name.to_string() }
        } else {
            Self { kind: attr_kind, name: value.to_string() }
        }
    }
}

/// One node of the configuration tree. Mirrors the `NODE_TYPE_*` union in
/// `polkit-config.c`'s `ConfigNode`, minus the NOP variant -- unrecognised
/// elements are tracked during parsing (for depth bounding) but never
/// make it into the built tree.
#[derive(Debug, Clone)]
pub enum ConfigNode {
    /// The implicit root. Never appears except as the tree's single
    /// top-level node.
    Top { children: Vec<ConfigNode> },
    Match { kind: MatchKind, pattern: String, regex: Regex, children: Vec<ConfigNode> },
    Return { result: Decision },
    DefineAdminAuth { rule: AdminAuthRule },
}

impl ConfigNode {
    pub fn children(&self) -> &[ConfigNode] {
        match self {
            ConfigNode::Top { children } | ConfigNode::Match { children, .. } => children,
            ConfigNode::Return { .. } | ConfigNode::DefineAdminAuth { .. } => &[],
        }
    }
}

/// A fully loaded configuration override tree, or the implicit empty tree
/// when no configuration file is present.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    pub(crate) root: Option<ConfigNode>,
}

impl ConfigTree {
    pub(crate) fn from_root(root: ConfigNode) -> Self { Self { root: Some(root) } }

    /// The tree produced by an absent configuration file: every walk
    /// immediately yields `Unknown`, and no admin-auth rule is ever found.
    pub fn empty() -> Self { Self { root: None } }
}

impl Default for ConfigTree {
    fn default() -> Self { Self::empty() }
}
