//! [`AuthStore`]: the per-user append-only grant store, assembled from
//! the [`file`] append protocol, the [`fingerprint`] line codec, and a
//! [`resolver::UserNameResolver`] for turning uids into filenames.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, warn};
use pk_identity::ActionId;

use crate::error::StoreError;
use crate::file::{self, user_file_path};
use crate::fingerprint::{parse_entry, serialize_entry};
use crate::model::{Entry, Scope};
use crate::resolver::{SystemUserNameResolver, UserNameResolver};

/// Whether iteration or a visitor callback should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitControl {
    Continue,
    Stop,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum RootKind {
    Persistent,
    Transient,
}

struct CachedFile {
    /// Raw lines, in file order. `parsed` is `None` for comments, blank
    /// lines, and lines that failed to parse (reported once via
    /// `log::warn!` and then skipped, per `spec.md` §4.6).
    lines: Vec<(String, Option<Entry>)>,
    target_mtime: Option<SystemTime>,
    trigger_mtime: Option<SystemTime>,
}

/// The atomic, per-user authorization grant store (`spec.md` §4.5).
///
/// Not `Sync`: it caches parsed file contents behind a `RefCell`, per the
/// "each context object is single-owner" rule of `spec.md` §5. Callers on
/// separate threads should use separate `AuthStore`s (cheap: they're just
/// paths plus an in-memory cache) pointed at the same directories.
pub struct AuthStore {
    persistent_root: PathBuf,
    transient_root: PathBuf,
    reload_trigger: PathBuf,
    resolver: Box<dyn UserNameResolver>,
    cache: RefCell<HashMap<(RootKind, String), CachedFile>>,
}

impl AuthStore {
    pub fn new(persistent_root: impl Into<PathBuf>, transient_root: impl Into<PathBuf>, reload_trigger: impl Into<PathBuf>) -> Self {
        Self::with_resolver(persistent_root, transient_root, reload_trigger, Box::new(SystemUserNameResolver))
    }

    pub fn with_resolver(
        persistent_root: impl Into<PathBuf>,
        transient_root: impl Into<PathBuf>,
        reload_trigger: impl Into<PathBuf>,
        resolver: Box<dyn UserNameResolver>,
    ) -> Self {
        Self { persistent_root: persistent_root.into(), transient_root: transient_root.into(), reload_trigger: reload_trigger.into(), resolver, cache: RefCell::new(HashMap::new()) }
    }

    /// The user name this store's resolver associates with `uid` --
    /// exposed so callers (the decision engine's configuration-match
    /// step, `spec.md` §4.3's "the caller's numeric uid *or* their user
    /// name") can resolve a name without carrying their own resolver.
    pub fn user_name_for_uid(&self, uid: u32) -> String { self.resolver.name_for_uid(uid) }

    fn root_dir(&self, kind: RootKind) -> &Path {
        match kind {
            RootKind::Persistent => &self.persistent_root,
            RootKind::Transient => &self.transient_root,
        }
    }

    fn root_for_scope(scope: &Scope) -> RootKind { if scope.is_transient() { RootKind::Transient } else { RootKind::Persistent } }

    /// Re-reads `user_name`'s file under `kind` if its mtime or the
    /// reload-trigger's mtime has advanced since the last parse
    /// (`spec.md` §4.5 "Readers MUST re-read... on the next query
    /// following any observed change").
    fn ensure_fresh(&self, kind: RootKind, user_name: &str) -> Result<(), StoreError> {
        let target = user_file_path(self.root_dir(kind), user_name);
        let target_mtime = file::mtime(&target);
        let trigger_mtime = file::mtime(&self.reload_trigger);

        let mut cache = self.cache.borrow_mut();
        let key = (kind, user_name.to_string());
        let stale = match cache.get(&key) {
            None => true,
            Some(cached) => cached.target_mtime != target_mtime || cached.trigger_mtime != trigger_mtime,
        };
        if !stale {
            return Ok(());
        }

        let contents = file::read_existing(&target)?;
        let mut lines = Vec::new();
        for raw in contents.lines() {
            if raw.trim().is_empty() || raw.trim_start().starts_with('#') {
                lines.push((raw.to_string(), None));
                continue;
            }
            match parse_entry(raw) {
                Ok(entry) => lines.push((raw.to_string(), Some(entry))),
                Err(reason) => {
                    warn!("{}: skipping unparseable line: {reason}", target.display());
                    lines.push((raw.to_string(), None));
                },
            }
        }
        debug!("loaded {} line(s) ({} parsed) from {}", lines.len(), lines.iter().filter(|(_, e)| e.is_some()).count(), target.display());
        cache.insert(key, CachedFile { lines, target_mtime, trigger_mtime });
        Ok(())
    }

    fn visit_file<F: FnMut(&Entry) -> VisitControl>(&self, kind: RootKind, user_name: &str, mut visitor: F) -> Result<(), StoreError> {
        self.ensure_fresh(kind, user_name)?;
        let cache = self.cache.borrow();
        let Some(cached) = cache.get(&(kind, user_name.to_string())) else { return Ok(()) };
        for (_, entry) in &cached.lines {
            if let Some(entry) = entry {
                if visitor(entry) == VisitControl::Stop {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Visits every entry belonging to `uid`, across both roots.
    /// Snapshot-consistent per call: each root's file is (re)loaded once
    /// at the start of the call and the visitor walks that snapshot.
    pub fn for_uid(&self, uid: u32, mut visitor: impl FnMut(&Entry) -> VisitControl) -> Result<(), StoreError> {
        let user_name = self.resolver.name_for_uid(uid);
        let mut stopped = false;
        self.visit_file(RootKind::Persistent, &user_name, |e| {
            let r = if stopped { VisitControl::Stop } else { visitor(e) };
            if r == VisitControl::Stop {
                stopped = true;
            }
            r
        })?;
        if stopped {
            return Ok(());
        }
        self.visit_file(RootKind::Transient, &user_name, |e| visitor(e))
    }

    /// Visits only entries for `action_id` belonging to `uid`.
    pub fn for_action_for_uid(&self, action_id: &ActionId, uid: u32, mut visitor: impl FnMut(&Entry) -> VisitControl) -> Result<(), StoreError> {
        self.for_uid(uid, |e| if e.action_id == *action_id { visitor(e) } else { VisitControl::Continue })
    }

    /// Visits every entry for `action_id` across every user file on disk
    /// in either root (`spec.md` §4.5 "Iteration").
    pub fn for_action_all_uids(&self, action_id: &ActionId, mut visitor: impl FnMut(u32, &Entry) -> VisitControl) -> Result<(), StoreError> {
        let mut uids: Vec<u32> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for kind in [RootKind::Persistent, RootKind::Transient] {
            let dir = self.root_dir(kind);
            let Ok(read_dir) = std::fs::read_dir(dir) else { continue };
            for entry in read_dir.filter_map(|e| e.ok()) {
                let name = entry.file_name().to_string_lossy().to_string();
                let Some(stem) = name.strip_prefix("user-").and_then(|s| s.strip_suffix(".auths")) else { continue };
                if let Some(uid) = self.resolver.uid_for_name(stem) {
                    if seen.insert(uid) {
                        uids.push(uid);
                    }
                }
            }
        }
        uids.sort_unstable();

        'outer: for uid in uids {
            let mut stop = false;
            self.for_action_for_uid(action_id, uid, |e| {
                let r = visitor(uid, e);
                if r == VisitControl::Stop {
                    stop = true;
                }
                r
            })?;
            if stop {
                break 'outer;
            }
        }
        Ok(())
    }

    /// Appends `entry` to `uid`'s file in the root its scope belongs to,
    /// via the mkstemp-equivalent append protocol, then touches the
    /// reload-trigger.
    pub fn append(&self, uid: u32, entry: &Entry) -> Result<(), StoreError> {
        let kind = Self::root_for_scope(&entry.scope);
        let user_name = self.resolver.name_for_uid(uid);
        let target = user_file_path(self.root_dir(kind), &user_name);

        let existing = file::read_existing(&target)?;
        let mut new_contents = existing;
        if !new_contents.is_empty() && !new_contents.ends_with('\n') {
            new_contents.push('\n');
        }
        new_contents.push_str(&serialize_entry(entry));
        new_contents.push('\n');

        file::atomic_replace(&target, &new_contents)?;
        file::touch_reload_trigger(&self.reload_trigger)?;
        self.invalidate(kind, &user_name);
        Ok(())
    }

    /// Revokes the entry whose canonical fingerprint exactly matches
    /// `fingerprint`, searching both roots for `uid`. Idempotent:
    /// revoking an absent entry returns `Ok(())` without error
    /// (`spec.md` §4.5 "Revocation").
    pub fn revoke(&self, uid: u32, fingerprint: &str) -> Result<(), StoreError> {
        let user_name = self.resolver.name_for_uid(uid);
        for kind in [RootKind::Persistent, RootKind::Transient] {
            let target = user_file_path(self.root_dir(kind), &user_name);
            let existing = file::read_existing(&target)?;
            if !existing.lines().any(|l| l == fingerprint) {
                continue;
            }
            let new_contents: String = existing.lines().filter(|l| *l != fingerprint).map(|l| format!("{l}\n")).collect();
            file::atomic_replace(&target, &new_contents)?;
            file::touch_reload_trigger(&self.reload_trigger)?;
            self.invalidate(kind, &user_name);
            return Ok(());
        }
        Ok(())
    }

    /// Revokes the first entry matching `entry` by value (reserializing
    /// it to its canonical fingerprint first) -- a convenience over
    /// [`Self::revoke`] for callers that hold a parsed `Entry` rather
    /// than the raw line.
    pub fn revoke_entry(&self, uid: u32, entry: &Entry) -> Result<(), StoreError> { self.revoke(uid, &serialize_entry(entry)) }

    fn invalidate(&self, kind: RootKind, user_name: &str) { self.cache.borrow_mut().remove(&(kind, user_name.to_string())); }

    /// Clears every file under the transient root. `spec.md` §9 leaves
    /// the boot-time clearing mechanism unspecified; this crate exposes
    /// it as an explicit operation the daemon-equivalent caller invokes
    /// once it has determined a boot has happened, rather than running
    /// it implicitly from `AuthStore::new` (which may be called many
    /// times within a process's lifetime, e.g. in tests).
    pub fn purge_transient(&self) -> Result<(), StoreError> {
        let Ok(read_dir) = std::fs::read_dir(&self.transient_root) else { return Ok(()) };
        for entry in read_dir.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "auths") {
                std::fs::remove_file(&path).map_err(|source| StoreError::Io { path, source })?;
            }
        }
        self.cache.borrow_mut().retain(|(kind, _), _| *kind != RootKind::Transient);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pk_constraints::ConstraintSet;

    use super::*;
    use crate::resolver::DecimalUserNameResolver;

    fn store(dir: &Path) -> AuthStore {
        AuthStore::with_resolver(dir.join("persistent"), dir.join("transient"), dir.join("misc/reload-trigger"), Box::new(DecimalUserNameResolver))
    }

    fn always_entry(action: &str) -> Entry {
        Entry { scope: Scope::Always, action_id: ActionId::new(action).unwrap(), when: 1_700_000_000, auth_as: Some(1000), granted_by: None, constraints: ConstraintSet::empty() }
    }

    #[test]
    fn append_then_for_uid_sees_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let entry = always_entry("org.example.frob");
        store.append(1000, &entry).unwrap();

        let mut seen = Vec::new();
        store.for_uid(1000, |e| {
            seen.push(e.clone());
            VisitControl::Continue
        }).unwrap();
        assert_eq!(seen, vec![entry]);
    }

    #[test]
    fn revoke_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let entry = always_entry("org.example.frob");
        store.append(1000, &entry).unwrap();
        store.revoke_entry(1000, &entry).unwrap();

        let mut seen = Vec::new();
        store.for_uid(1000, |e| {
            seen.push(e.clone());
            VisitControl::Continue
        }).unwrap();
        assert!(seen.is_empty());

        // Revoking again is a no-op success, not an error.
        store.revoke_entry(1000, &entry).unwrap();
    }

    #[test]
    fn transient_entries_are_separated_from_persistent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let transient = Entry {
            scope: Scope::Process { pid: 42, pid_start_time: 1 },
            action_id: ActionId::new("org.example.frob").unwrap(),
            when: 1,
            auth_as: Some(1000),
            granted_by: None,
            constraints: ConstraintSet::empty(),
        };
        store.append(1000, &transient).unwrap();
        assert!(dir.path().join("transient/user-1000.auths").exists());
        assert!(!dir.path().join("persistent/user-1000.auths").exists());

        store.purge_transient().unwrap();
        let mut seen = Vec::new();
        store.for_uid(1000, |e| {
            seen.push(e.clone());
            VisitControl::Continue
        }).unwrap();
        assert!(seen.is_empty());
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("persistent")).unwrap();
        std::fs::write(dir.path().join("persistent/user-1000.auths"), "scope=bogus\nscope=always:action-id=org.example.a:when=1:auth-as=1000\n").unwrap();
        let store = store(dir.path());
        let mut seen = Vec::new();
        store.for_uid(1000, |e| {
            seen.push(e.clone());
            VisitControl::Continue
        }).unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn for_action_all_uids_enumerates_every_user_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.append(1000, &always_entry("org.example.frob")).unwrap();
        store.append(2000, &always_entry("org.example.frob")).unwrap();
        store.append(3000, &always_entry("org.example.other")).unwrap();

        let action = ActionId::new("org.example.frob").unwrap();
        let mut uids = Vec::new();
        store.for_action_all_uids(&action, |uid, _| {
            uids.push(uid);
            VisitControl::Continue
        }).unwrap();
        uids.sort_unstable();
        assert_eq!(uids, vec![1000, 2000]);
    }

    #[test]
    fn reload_trigger_forces_reparse_on_external_edit() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.append(1000, &always_entry("org.example.frob")).unwrap();

        // Simulate a concurrent writer appending a second line directly,
        // the way a separate process sharing this store's directories
        // would -- `store` must not see it until the trigger advances.
        let target = dir.path().join("persistent/user-1000.auths");
        let mut contents = std::fs::read_to_string(&target).unwrap();
        contents.push_str(&serialize_entry(&always_entry("org.example.second")));
        contents.push('\n');
        std::fs::write(&target, contents).unwrap();
        file::touch_reload_trigger(&dir.path().join("misc/reload-trigger")).unwrap();

        let mut seen = Vec::new();
        store.for_uid(1000, |e| {
            seen.push(e.action_id.as_str().to_string());
            VisitControl::Continue
        }).unwrap();
        assert_eq!(seen.len(), 2);
    }
}
