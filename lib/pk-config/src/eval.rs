//! Walks a [`ConfigTree`] to resolve an override result or an
//! administrator definition for a given action and caller identity.
//!
//! Mirrors `config_node_test`/`config_node_determine_admin_auth` in
//! `polkit-config.c`: depth-first, left-to-right, `<match>` nodes gate
//! recursion into their children and everything else is a leaf.

use pk_identity::Decision;

use crate::model::{AdminAuthRule, ConfigNode, ConfigTree, MatchKind};

fn node_matches(node: &ConfigNode, action_id: &str, uid: &str, user_name: &str) -> bool {
    match node {
        ConfigNode::Match { kind: MatchKind::Action, regex, .. } => regex.is_match(action_id),
        ConfigNode::Match { kind: MatchKind::User, regex, .. } => regex.is_match(uid) || regex.is_match(user_name),
        _ => false,
    }
}

/// Depth-first, left-to-right walk for a `<return>` result. The first
/// branch whose matches all hold and that reaches a `<return>` wins;
/// sibling branches after it are never visited.
fn walk_return(node: &ConfigNode, action_id: &str, uid: &str, user_name: &str) -> Option<Decision> {
    let recurse = match node {
        ConfigNode::Top { .. } => true,
        ConfigNode::Match { .. } => node_matches(node, action_id, uid, user_name),
        ConfigNode::Return { result } => return Some(*result),
        ConfigNode::DefineAdminAuth { .. } => false,
    };
    if !recurse {
        return None;
    }
    for child in node.children() {
        if let Some(result) = walk_return(child, action_id, uid, user_name) {
            return Some(result);
        }
    }
    None
}

/// Resolves the override result for `action_id`/`uid`/`user_name`, or
/// `None` if the tree has no configuration file loaded, or the walk never
/// reaches a matching `<return>`.
pub fn evaluate(tree: &ConfigTree, action_id: &str, uid: &str, user_name: &str) -> Option<Decision> {
    let root = tree.root.as_ref()?;
    walk_return(root, action_id, uid, user_name)
}

/// Convenience wrapper for callers that only have an action id (no
/// specific caller identity yet known, e.g. a session-scoped check).
pub fn evaluate_action(tree: &ConfigTree, action_id: &str) -> Option<Decision> { evaluate(tree, action_id, "", "") }

/// Convenience wrapper for callers with a concrete uid and user name.
pub fn evaluate_user(tree: &ConfigTree, action_id: &str, uid: &str, user_name: &str) -> Option<Decision> {
    evaluate(tree, action_id, uid, user_name)
}

/// Depth-first walk collecting every `define_admin_auth` that applies,
/// keeping the *last one visited* -- unlike [`walk_return`] this does not
/// stop recursing at the first matching node, matching the original's
/// `|| result_set` accumulation that keeps overwriting the out-params as
/// it continues through the whole subtree.
fn walk_admin_auth<'a>(node: &'a ConfigNode, action_id: &str, uid: &str, user_name: &str, found: &mut Option<&'a AdminAuthRule>) {
    let recurse = match node {
        ConfigNode::Top { .. } => true,
        ConfigNode::Match { .. } => node_matches(node, action_id, uid, user_name),
        ConfigNode::DefineAdminAuth { rule } => {
            *found = Some(rule);
            false
        },
        ConfigNode::Return { .. } => false,
    };
    if !recurse {
        return;
    }
    for child in node.children() {
        walk_admin_auth(child, action_id, uid, user_name, found);
    }
}

/// Resolves what "administrator" means along the branch of the tree
/// reached for `action_id`/`uid`/`user_name`. `None` if no
/// `define_admin_auth` rule applies anywhere in the matching branches.
pub fn determine_admin_auth<'a>(tree: &'a ConfigTree, action_id: &str, uid: &str, user_name: &str) -> Option<&'a AdminAuthRule> {
    let root = tree.root.as_ref()?;
    let mut found = None;
    walk_admin_auth(root, action_id, uid, user_name, &mut found);
    found
}
