//! The explicit-grant request path (`spec.md` §4.8 "specified here
//! because the grant flow depends on it", §6 "Process model", §7 error
//! kinds 5-8/10): the unprivileged half of a grant request -- permission
//! checks against the well-known meta-actions and the duplicate-grant
//! check -- mirrored on `_grant_internal` in
//! `original_source/src/polkit-grant/polkit-authorization-db-write.c`.
//! The privileged half that actually appends to the store is
//! `src/bin/pk-grant-helper.rs`, spawned here via [`pk_spawn::spawn_sync`]
//! exactly as `_grant_internal` spawns `polkit-explicit-grant-helper`.

use std::path::Path;

use pk_config::ConfigTree;
use pk_constraints::ConstraintSet;
use pk_identity::{ActionId, Decision};
use pk_policy::PolicyCache;
use pk_spawn::{spawn_sync, ExitOutcome, SpawnFlags};
use pk_store::{AuthStore, VisitControl};
use thiserror::Error;

use crate::engine::decide;
use crate::error::DecisionError;
use crate::subject::Subject;

/// Required to iterate another uid's store entries (`spec.md` §7.5).
pub const ACTION_READ_OTHERS: &str = "org.freedesktop.policykit.read";
/// Required to revoke another uid's store entries (`spec.md` §7.6).
pub const ACTION_REVOKE_OTHERS: &str = "org.freedesktop.policykit.revoke";
/// Required to grant an authorization to another uid, and to grant a
/// *positive* authorization to oneself (`spec.md` §7.7).
pub const ACTION_GRANT: &str = "org.freedesktop.policykit.grant";

/// Errors from the grant-request path: the explicit-grant counterpart of
/// `DecisionError`, covering the `spec.md` §7 error kinds that only arise
/// once a caller asks to read/revoke/grant on another uid's behalf.
#[derive(Debug, Error)]
pub enum GrantError {
    #[error(transparent)]
    Decision(#[from] DecisionError),

    #[error("failed to run the explicit-grant helper: {0}")]
    Helper(#[from] pk_spawn::SpawnError),

    /// `spec.md` §7.5.
    #[error("uid {requesting} is not authorized to read uid {target}'s authorizations (requires {ACTION_READ_OTHERS})")]
    NotAuthorizedToReadAuthorizationsForOtherUsers { requesting: u32, target: u32 },

    /// `spec.md` §7.6.
    #[error("uid {requesting} is not authorized to revoke uid {target}'s authorizations (requires {ACTION_REVOKE_OTHERS})")]
    NotAuthorizedToRevokeAuthorizationsFromOtherUsers { requesting: u32, target: u32 },

    /// `spec.md` §7.7: the writer helper refused, either because the
    /// invoking uid lacks the grant meta-action or because it crashed
    /// instead of exiting cleanly.
    #[error("uid {requesting} is not authorized to grant {action} to uid {target} (requires {ACTION_GRANT})")]
    NotAuthorizedToGrantAuthorization { requesting: u32, action: String, target: u32 },

    /// `spec.md` §7.8.
    #[error("an authorization for uid {target} for action {action} with this constraint set already exists")]
    AuthorizationAlreadyExists { target: u32, action: String },
}

/// Whether `requesting` currently holds `meta_action` per an ordinary
/// `decide()` call -- the same engine a mechanism's own authorization
/// check goes through, since the meta-actions are themselves declared
/// actions with their own `.policy` defaults, not a separate privilege
/// system.
fn meta_action_granted(policy: &PolicyCache, config: &ConfigTree, store: &AuthStore, meta_action: &str, requesting: &Subject) -> Result<bool, DecisionError> {
    let action_id = ActionId::new(meta_action).expect("meta-action identifiers are valid dotted names");
    Ok(decide(policy, config, store, &action_id, requesting, false)? == Decision::Yes)
}

/// Checks whether `requesting` may iterate `target`'s store entries.
/// Always permitted for one's own uid; otherwise gated on
/// `org.freedesktop.policykit.read`.
pub fn authorize_read_for_uid(policy: &PolicyCache, config: &ConfigTree, store: &AuthStore, requesting: &Subject, target: u32) -> Result<(), GrantError> {
    if requesting.uid() == target || meta_action_granted(policy, config, store, ACTION_READ_OTHERS, requesting)? {
        return Ok(());
    }
    Err(GrantError::NotAuthorizedToReadAuthorizationsForOtherUsers { requesting: requesting.uid(), target })
}

/// Checks whether `requesting` may revoke one of `target`'s store
/// entries. Always permitted for one's own uid; otherwise gated on
/// `org.freedesktop.policykit.revoke`.
pub fn authorize_revoke_for_uid(policy: &PolicyCache, config: &ConfigTree, store: &AuthStore, requesting: &Subject, target: u32) -> Result<(), GrantError> {
    if requesting.uid() == target || meta_action_granted(policy, config, store, ACTION_REVOKE_OTHERS, requesting)? {
        return Ok(());
    }
    Err(GrantError::NotAuthorizedToRevokeAuthorizationsFromOtherUsers { requesting: requesting.uid(), target })
}

/// Whether an entry of the requested polarity already exists for
/// `(target, action_id, constraints)` -- scanned the same way
/// `_check_auth_for_grant` walks `polkit_authorization_db_foreach_for_uid`
/// before recording a new one.
fn already_granted(store: &AuthStore, action_id: &ActionId, target: u32, constraints: &ConstraintSet, negative: bool) -> Result<bool, DecisionError> {
    let mut found = false;
    store.for_action_for_uid(action_id, target, |entry| {
        if entry.scope.is_negative() == negative && entry.constraints == *constraints {
            found = true;
            return VisitControl::Stop;
        }
        VisitControl::Continue
    })?;
    Ok(found)
}

/// Requests an explicit grant of `action_id`/`constraints` to `target`,
/// as `negative` (a `grant-negative` veto) or positive (a `grant`).
///
/// Mirrors `_grant_internal`: a duplicate check against the existing
/// store first (`AuthorizationAlreadyExists`), then a spawn of
/// `helper_path` with argv `[action_id, constraints, mode, target]`
/// (`spec.md` §6 "Process model") -- the helper is the one that performs
/// the requesting uid's own `org.freedesktop.policykit.grant` check (via
/// its real, not effective, uid) and the actual store append, since it is
/// the only process with write access to another uid's file. A self-grant
/// of a *negative* authorization is the one combination the helper
/// permits unconditionally, per the doc comment on
/// `polkit_authorization_db_grant_negative_to_uid`: "users may 'grant'
/// negative authorizations to themselves".
pub fn request_grant(
    policy: &PolicyCache,
    config: &ConfigTree,
    store: &AuthStore,
    helper_path: &Path,
    requesting: &Subject,
    target: u32,
    action_id: &ActionId,
    constraints: &ConstraintSet,
    negative: bool,
) -> Result<(), GrantError> {
    if already_granted(store, action_id, target, constraints, negative)? {
        return Err(GrantError::AuthorizationAlreadyExists { target, action: action_id.as_str().to_string() });
    }

    let constraint_arg = constraints.as_slice().iter().map(|c| c.serialize()).collect::<Vec<_>>().join(",");
    let mode = if negative { "uid-negative" } else { "uid" };
    let argv = vec![helper_path.to_string_lossy().into_owned(), action_id.as_str().to_string(), constraint_arg, mode.to_string(), target.to_string()];

    let outcome = spawn_sync(None, &argv, None, None, SpawnFlags::default())?;
    match outcome.status {
        ExitOutcome::Exited(0) => Ok(()),
        _ => Err(GrantError::NotAuthorizedToGrantAuthorization { requesting: requesting.uid(), action: action_id.as_str().to_string(), target }),
    }
}

#[cfg(test)]
mod tests {
    use pk_constraints::Constraint;
    use pk_identity::{Caller, ProcessStartTime};
    use pk_store::{DecimalUserNameResolver, Entry, Scope};
    use tempfile::tempdir;

    use super::*;

    fn policy_with_default(action: &str, default: Decision) -> PolicyCache {
        let xml = format!(
            r#"<policyconfig><action id="{action}"><defaults><allow_any>{d}</allow_any><allow_inactive>{d}</allow_inactive><allow_active>{d}</allow_active></defaults></action></policyconfig>"#,
            d = default.to_name()
        );
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.policy"), &xml).unwrap();
        PolicyCache::load(dir.path()).unwrap().0
    }

    fn requester(uid: u32) -> Subject { Subject::Caller(Caller::new(None, uid, 1, ProcessStartTime(1), None, None).unwrap()) }

    #[test]
    fn reading_own_store_never_needs_the_meta_action() {
        let policy = PolicyCache::empty();
        let config = ConfigTree::empty();
        let dir = tempdir().unwrap();
        let store = AuthStore::with_resolver(dir.path().join("p"), dir.path().join("t"), dir.path().join("misc/trig"), Box::new(DecimalUserNameResolver));
        assert!(authorize_read_for_uid(&policy, &config, &store, &requester(1000), 1000).is_ok());
    }

    #[test]
    fn reading_another_uids_store_without_the_meta_action_is_denied() {
        let policy = PolicyCache::empty();
        let config = ConfigTree::empty();
        let dir = tempdir().unwrap();
        let store = AuthStore::with_resolver(dir.path().join("p"), dir.path().join("t"), dir.path().join("misc/trig"), Box::new(DecimalUserNameResolver));
        let err = authorize_read_for_uid(&policy, &config, &store, &requester(1000), 2000).unwrap_err();
        assert!(matches!(err, GrantError::NotAuthorizedToReadAuthorizationsForOtherUsers { requesting: 1000, target: 2000 }));
    }

    #[test]
    fn reading_another_uids_store_with_the_meta_action_granted_succeeds() {
        let policy = policy_with_default(ACTION_READ_OTHERS, Decision::Yes);
        let config = ConfigTree::empty();
        let dir = tempdir().unwrap();
        let store = AuthStore::with_resolver(dir.path().join("p"), dir.path().join("t"), dir.path().join("misc/trig"), Box::new(DecimalUserNameResolver));
        assert!(authorize_read_for_uid(&policy, &config, &store, &requester(1000), 2000).is_ok());
    }

    #[test]
    fn duplicate_grant_is_rejected_before_the_helper_is_spawned() {
        let policy = PolicyCache::empty();
        let config = ConfigTree::empty();
        let dir = tempdir().unwrap();
        let store = AuthStore::with_resolver(dir.path().join("p"), dir.path().join("t"), dir.path().join("misc/trig"), Box::new(DecimalUserNameResolver));
        let action = ActionId::new("org.example.frob").unwrap();
        let constraints = ConstraintSet::new(vec![Constraint::Active]).unwrap();
        store.append(2000, &Entry { scope: Scope::Grant, action_id: action.clone(), when: 1, auth_as: None, granted_by: Some(0), constraints: constraints.clone() }).unwrap();

        // A nonexistent helper path would fail loudly if this were
        // reached -- the duplicate check must short-circuit first.
        let err = request_grant(&policy, &config, &store, Path::new("/no/such/helper"), &requester(0), 2000, &action, &constraints, false).unwrap_err();
        assert!(matches!(err, GrantError::AuthorizationAlreadyExists { .. }));
    }

    #[test]
    fn helper_nonzero_exit_is_not_authorized_to_grant() {
        let policy = PolicyCache::empty();
        let config = ConfigTree::empty();
        let dir = tempdir().unwrap();
        let store = AuthStore::with_resolver(dir.path().join("p"), dir.path().join("t"), dir.path().join("misc/trig"), Box::new(DecimalUserNameResolver));
        let action = ActionId::new("org.example.frob").unwrap();
        let constraints = ConstraintSet::empty();

        let err = request_grant(&policy, &config, &store, Path::new("/bin/false"), &requester(1000), 2000, &action, &constraints, false).unwrap_err();
        assert!(matches!(err, GrantError::NotAuthorizedToGrantAuthorization { .. }));
    }

    #[test]
    fn helper_clean_exit_succeeds_without_touching_the_store_here() {
        // The library side never appends on a successful helper exit --
        // that write belongs to the helper process, which runs with the
        // privileges to do it on the target uid's behalf.
        let policy = PolicyCache::empty();
        let config = ConfigTree::empty();
        let dir = tempdir().unwrap();
        let store = AuthStore::with_resolver(dir.path().join("p"), dir.path().join("t"), dir.path().join("misc/trig"), Box::new(DecimalUserNameResolver));
        let action = ActionId::new("org.example.frob").unwrap();
        let constraints = ConstraintSet::empty();

        request_grant(&policy, &config, &store, Path::new("/bin/true"), &requester(1000), 2000, &action, &constraints, false).unwrap();
        let mut seen = Vec::new();
        store.for_uid(2000, |e| {
            seen.push(e.clone());
            VisitControl::Continue
        }).unwrap();
        assert!(seen.is_empty());
    }
}
