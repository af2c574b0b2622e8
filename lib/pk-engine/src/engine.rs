//! `decide()`: the central decision function (`spec.md` §4.6).

use log::debug;
use pk_config::ConfigTree;
use pk_constraints::{Constraint, ConstraintSet};
use pk_identity::{ActionId, Decision};
use pk_policy::PolicyCache;
use pk_store::{AuthStore, Entry, Scope, VisitControl};

use crate::error::DecisionError;
use crate::subject::Subject;

/// Whether `constraints` hold for `subject`. A full `Caller` delegates to
/// `ConstraintSet::all_match`; a bare `Session` subject can only ever
/// satisfy `local`/`active` (no process identity exists to check `exe`/
/// `selinux_context` against, so those never match -- the safe default).
fn constraints_hold(constraints: &ConstraintSet, subject: &Subject) -> bool {
    if let Some(caller) = subject.caller() {
        return constraints.all_match(caller);
    }
    constraints.as_slice().iter().all(|c| match c {
        Constraint::Local => subject.session().is_some_and(|s| s.is_local),
        Constraint::Active => subject.session().is_some_and(|s| s.is_active),
        Constraint::Exe(_) | Constraint::SelinuxContext(_) => false,
    })
}

/// Whether `entry`'s scope currently applies to `subject`, independent of
/// its constraints: `process*` entries require an exact `(pid,
/// start_time)` match against a full `Caller`; `session` entries require
/// a session id match; `always`/`grant`/`grant-negative` always apply.
fn scope_applies(entry: &Entry, subject: &Subject) -> bool {
    match &entry.scope {
        Scope::ProcessOneShot { pid, pid_start_time } | Scope::Process { pid, pid_start_time } => {
            subject.process_key() == Some((*pid, *pid_start_time))
        },
        Scope::Session { session_id } => subject.session_id() == Some(session_id.as_str()),
        Scope::Always | Scope::Grant | Scope::GrantNegative => true,
    }
}

/// The outcome of walking the store for one `decide()` call.
struct GrantScan {
    granted: bool,
    denied: bool,
    /// A matching `process-one-shot` positive grant, consumed on success
    /// if the caller asked for `revoke_if_one_shot`.
    one_shot: Option<Entry>,
}

fn scan_grants(store: &AuthStore, action_id: &ActionId, subject: &Subject) -> Result<GrantScan, DecisionError> {
    let mut scan = GrantScan { granted: false, denied: false, one_shot: None };
    store.for_action_for_uid(action_id, subject.uid(), |entry| {
        if !scope_applies(entry, subject) || !constraints_hold(&entry.constraints, subject) {
            return VisitControl::Continue;
        }
        if entry.scope.is_negative() {
            scan.denied = true;
            return VisitControl::Stop;
        }
        scan.granted = true;
        if matches!(entry.scope, Scope::ProcessOneShot { .. }) {
            scan.one_shot = Some(entry.clone());
        }
        VisitControl::Continue
    })?;
    Ok(scan)
}

/// Resolves the policy-file implicit default for `action_id`/`subject`'s
/// category (`spec.md` §4.6 step 2's fallback when configuration doesn't
/// produce a concrete result). `Unknown` if the action isn't declared --
/// callers should have already returned early on that via step 1.
fn policy_default(policy: &PolicyCache, action_id: &str, subject: &Subject) -> Decision {
    let Some(action) = policy.get(action_id) else { return Decision::Unknown };
    use pk_identity::SessionCategory::*;
    match subject.category() {
        Any => action.defaults.allow_any,
        Inactive => action.defaults.allow_inactive,
        Active => action.defaults.allow_active,
    }
}

/// The central decision function (`spec.md` §4.6): composes the policy
/// cache, the configuration override tree and the authorization store
/// into a single [`Decision`], in the algorithm's specified strict order.
///
/// `revoke_if_one_shot`: if the final result used a matching
/// `process-one-shot` positive grant, atomically revoke it before
/// returning (step 5). Passing `false` leaves one-shot grants consumable
/// again by a later call -- useful for a caller that wants to *preview*
/// the decision without spending the grant.
pub fn decide(policy: &PolicyCache, config: &ConfigTree, store: &AuthStore, action_id: &ActionId, subject: &Subject, revoke_if_one_shot: bool) -> Result<Decision, DecisionError> {
    // Step 1: resolve the action.
    if policy.get(action_id.as_str()).is_none() {
        debug!("decide({action_id}): unknown action");
        return Ok(Decision::Unknown);
    }

    // Step 2: configuration override, else the policy-file default.
    let uid_str = subject.uid().to_string();
    let user_name = store.user_name_for_uid(subject.uid());
    let candidate = pk_config::evaluate_user(config, action_id.as_str(), &uid_str, &user_name).unwrap_or_else(|| policy_default(policy, action_id.as_str(), subject));

    // Step 3: explicit grants.
    let scan = scan_grants(store, action_id, subject)?;

    // Step 4: resolve.
    let result = if scan.denied {
        Decision::No
    } else if scan.granted {
        Decision::Yes
    } else {
        candidate
    };

    // Step 5: one-shot side effect. Only the grant that actually
    // produced `Yes` is eligible -- a one-shot entry that was shadowed by
    // a later negative grant must not be silently consumed.
    if !scan.denied {
        if let Some(one_shot) = scan.one_shot {
            if revoke_if_one_shot {
                debug!("decide({action_id}): consuming one-shot grant for uid {}", subject.uid());
                store.revoke_entry(subject.uid(), &one_shot)?;
            }
        }
    }

    debug!("decide({action_id}, uid={}) -> {result}", subject.uid());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use pk_config::parse_config;
    use pk_identity::{ProcessStartTime, ResultTier, Seat, Session, SessionId};
    use pk_store::{AuthStore, DecimalUserNameResolver};
    use tempfile::tempdir;

    use super::*;

    fn policy_with_default(action: &str, default: Decision) -> PolicyCache {
        let xml = format!(
            r#"<policyconfig><action id="{action}"><defaults><allow_any>{d}</allow_any><allow_inactive>{d}</allow_inactive><allow_active>{d}</allow_active></defaults></action></policyconfig>"#,
            d = default.to_name()
        );
        // PolicyCache has no direct "insert" constructor by design (it's
        // built wholesale from a directory); go through a temp dir so
        // this test exercises the real loader.
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.policy"), &xml).unwrap();
        PolicyCache::load(dir.path()).unwrap().0
    }

    fn empty_store(dir: &std::path::Path) -> AuthStore {
        AuthStore::with_resolver(dir.join("persistent"), dir.join("transient"), dir.join("misc/reload-trigger"), Box::new(DecimalUserNameResolver))
    }

    fn caller(uid: u32, pid: i64, start: u64, session: Option<Session>) -> Subject {
        Subject::Caller(pk_identity::Caller::new(None, uid, pid, ProcessStartTime(start), None, session).unwrap())
    }

    #[test]
    fn falls_back_to_policy_default_with_no_config_or_grants() {
        let policy = policy_with_default("org.example.foo", Decision::SelfAuth(ResultTier::Session));
        let config = ConfigTree::empty();
        let dir = tempdir().unwrap();
        let store = empty_store(dir.path());
        let action = ActionId::new("org.example.foo").unwrap();
        let subject = caller(1000, 1, 1, None);
        assert_eq!(decide(&policy, &config, &store, &action, &subject, true).unwrap(), Decision::SelfAuth(ResultTier::Session));
    }

    #[test]
    fn admin_auth_config_override_wins_over_policy_default() {
        let policy = policy_with_default("org.foo.bar", Decision::SelfAuth(ResultTier::Session));
        let config = parse_config(
            r#"<config><match action="org\.foo\..*"><return result="auth_admin_keep_session"/></match><define_admin_auth group="wheel"/></config>"#,
        )
        .unwrap();
        let dir = tempdir().unwrap();
        let store = empty_store(dir.path());
        let action = ActionId::new("org.foo.bar").unwrap();
        let subject = caller(1000, 1, 1, None);
        assert_eq!(decide(&policy, &config, &store, &action, &subject, true).unwrap(), Decision::AdminAuth(ResultTier::KeepSession));
        assert_eq!(
            crate::admin::resolve_admin_identities(&config, "org.foo.bar", "1000", "1000").unwrap().groups,
            vec!["wheel".to_string()]
        );
    }

    #[test]
    fn explicit_always_grant_dominates_admin_default() {
        let policy = policy_with_default("org.foo.bar", Decision::AdminAuth(ResultTier::Session));
        let config = ConfigTree::empty();
        let dir = tempdir().unwrap();
        let store = empty_store(dir.path());
        let action = ActionId::new("org.foo.bar").unwrap();
        store.append(1000, &Entry { scope: Scope::Always, action_id: action.clone(), when: 1, auth_as: Some(1000), granted_by: None, constraints: ConstraintSet::empty() }).unwrap();

        let subject = caller(1000, 1, 1, None);
        assert_eq!(decide(&policy, &config, &store, &action, &subject, true).unwrap(), Decision::Yes);
    }

    #[test]
    fn negative_grant_dominates_positive_grant() {
        let policy = policy_with_default("org.foo.bar", Decision::AdminAuth(ResultTier::Session));
        let config = ConfigTree::empty();
        let dir = tempdir().unwrap();
        let store = empty_store(dir.path());
        let action = ActionId::new("org.foo.bar").unwrap();
        store.append(1000, &Entry { scope: Scope::Always, action_id: action.clone(), when: 1, auth_as: Some(1000), granted_by: None, constraints: ConstraintSet::empty() }).unwrap();
        store.append(1000, &Entry { scope: Scope::GrantNegative, action_id: action.clone(), when: 2, auth_as: None, granted_by: Some(0), constraints: ConstraintSet::empty() }).unwrap();

        let subject = caller(1000, 1, 1, None);
        assert_eq!(decide(&policy, &config, &store, &action, &subject, true).unwrap(), Decision::No);
    }

    #[test]
    fn constraint_filter_requires_active_session() {
        let policy = policy_with_default("org.foo.bar", Decision::AdminAuth(ResultTier::Session));
        let config = ConfigTree::empty();
        let dir = tempdir().unwrap();
        let store = empty_store(dir.path());
        let action = ActionId::new("org.foo.bar").unwrap();
        store
            .append(1000, &Entry { scope: Scope::Always, action_id: action.clone(), when: 1, auth_as: Some(1000), granted_by: None, constraints: ConstraintSet::new(vec![Constraint::Active]).unwrap() })
            .unwrap();

        let session = |active: bool| Session { identifier: SessionId("s1".into()), uid: 1000, is_active: active, is_local: true, remote_host: None, seat: Seat("seat0".into()) };

        let inactive_subject = caller(1000, 1, 1, Some(session(false)));
        assert_eq!(decide(&policy, &config, &store, &action, &inactive_subject, true).unwrap(), Decision::AdminAuth(ResultTier::Session));

        let active_subject = caller(1000, 1, 1, Some(session(true)));
        assert_eq!(decide(&policy, &config, &store, &action, &active_subject, true).unwrap(), Decision::Yes);
    }

    #[test]
    fn one_shot_grant_is_consumed_after_use() {
        let policy = policy_with_default("org.foo.bar", Decision::AdminAuth(ResultTier::Session));
        let config = ConfigTree::empty();
        let dir = tempdir().unwrap();
        let store = empty_store(dir.path());
        let action = ActionId::new("org.foo.bar").unwrap();
        store
            .append(1000, &Entry { scope: Scope::ProcessOneShot { pid: 4242, pid_start_time: 99 }, action_id: action.clone(), when: 1, auth_as: Some(1000), granted_by: None, constraints: ConstraintSet::empty() })
            .unwrap();

        let subject = caller(1000, 4242, 99, None);
        assert_eq!(decide(&policy, &config, &store, &action, &subject, true).unwrap(), Decision::Yes);
        // Consumed: a second identical query sees the underlying default.
        assert_eq!(decide(&policy, &config, &store, &action, &subject, true).unwrap(), Decision::AdminAuth(ResultTier::Session));
    }

    #[test]
    fn one_shot_preview_without_revoke_can_be_reused() {
        let policy = policy_with_default("org.foo.bar", Decision::No);
        let config = ConfigTree::empty();
        let dir = tempdir().unwrap();
        let store = empty_store(dir.path());
        let action = ActionId::new("org.foo.bar").unwrap();
        store
            .append(1000, &Entry { scope: Scope::ProcessOneShot { pid: 1, pid_start_time: 1 }, action_id: action.clone(), when: 1, auth_as: Some(1000), granted_by: None, constraints: ConstraintSet::empty() })
            .unwrap();

        let subject = caller(1000, 1, 1, None);
        assert_eq!(decide(&policy, &config, &store, &action, &subject, false).unwrap(), Decision::Yes);
        assert_eq!(decide(&policy, &config, &store, &action, &subject, false).unwrap(), Decision::Yes);
    }

    #[test]
    fn unknown_action_is_unknown() {
        let policy = PolicyCache::empty();
        let config = ConfigTree::empty();
        let dir = tempdir().unwrap();
        let store = empty_store(dir.path());
        let action = ActionId::new("org.example.nope").unwrap();
        let subject = caller(1000, 1, 1, None);
        assert_eq!(decide(&policy, &config, &store, &action, &subject, true).unwrap(), Decision::Unknown);
    }
}
