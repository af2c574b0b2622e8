//! Admin-identity resolution (`spec.md` §4.6 "Admin type resolution"):
//! when the decision candidate is an `auth_admin*` result, work out who
//! counts as "an administrator" so the authentication agent can present
//! the right prompt. Grounded in
//! `original_source/tools/polkit-auth.c`'s use of
//! `polkit_config_determine_admin_auth_type`.

use pk_config::{determine_admin_auth, AdminAuthKind, ConfigTree};

/// Who counts as "administrator" along the branch of the configuration
/// tree reached for a given action/caller. At most one of `users`/
/// `groups` is non-empty, since `spec.md` §4.3 collects
/// `define_admin_auth` as a single last-writer-wins rule per branch, not
/// an accumulated set -- mirrors
/// `config_node_determine_admin_auth`'s single pair of out-params.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminIdentities {
    pub users: Vec<String>,
    pub groups: Vec<String>,
}

impl AdminIdentities {
    pub fn is_empty(&self) -> bool { self.users.is_empty() && self.groups.is_empty() }
}

/// Resolves the admin identities for `action_id`/`uid`/`user_name`, or
/// `None` if no `define_admin_auth` rule applies anywhere on the matching
/// branch of the configuration tree.
pub fn resolve_admin_identities(config: &ConfigTree, action_id: &str, uid: &str, user_name: &str) -> Option<AdminIdentities> {
    let rule = determine_admin_auth(config, action_id, uid, user_name)?;
    let mut identities = AdminIdentities::default();
    match rule.kind {
        AdminAuthKind::User => identities.users.push(rule.name.clone()),
        AdminAuthKind::Group => identities.groups.push(rule.name.clone()),
    }
    Some(identities)
}
