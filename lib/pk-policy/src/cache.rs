//! Loads an entire `<policy-dir>/*.policy` directory into an immutable,
//! indexed [`PolicyCache`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::PolicyLoadError;
use crate::model::{ActionDecl, Diagnostic};
use crate::parser::parse_policy_file;

/// An immutable, load-order-preserving index of every action declared
/// across a policy directory. Built once at engine init and replaced
/// wholesale on reload (`spec.md` §3 "Lifecycles") -- there is no
/// in-place mutation API.
#[derive(Debug, Clone)]
pub struct PolicyCache {
    actions: Vec<ActionDecl>,
    by_id: HashMap<String, usize>,
}

impl PolicyCache {
    /// Loads every `*.policy` file in `dir`. Either every file parses
    /// cleanly and action ids are unique across the whole directory, or
    /// the entire load fails -- there is no partial result.
    pub fn load(dir: impl AsRef<Path>) -> Result<(Self, Vec<Diagnostic>), PolicyLoadError> {
        let dir = dir.as_ref();
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|source| PolicyLoadError::Io { dir: dir.to_path_buf(), source })?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "policy"))
            .collect();
        // Deterministic load order, so "load order" iteration (§4.2) is
        // reproducible across runs rather than depending on readdir order.
        entries.sort();

        let mut actions: Vec<ActionDecl> = Vec::new();
        let mut by_id: HashMap<String, PathBuf> = HashMap::new();
        let mut diagnostics = Vec::new();

        for path in &entries {
            let contents = fs::read_to_string(path).map_err(|source| PolicyLoadError::Io { dir: dir.to_path_buf(), source })?;
            let (file_actions, file_diags) = parse_policy_file(path, &contents)?;
            diagnostics.extend(file_diags.iter().cloned());
            for diag in &file_diags {
                warn!("{}: {}", diag.file.display(), diag.message);
            }
            for action in file_actions {
                if let Some(first) = by_id.get(action.id.as_str()) {
                    return Err(PolicyLoadError::DuplicateActionId {
                        id: action.id.as_str().to_string(),
                        first: first.clone(),
                        second: path.clone(),
                    });
                }
                by_id.insert(action.id.as_str().to_string(), path.clone());
                actions.push(action);
            }
        }

        debug!("loaded {} action(s) from {} policy file(s) in {}", actions.len(), entries.len(), dir.display());

        let index: HashMap<String, usize> = actions.iter().enumerate().map(|(i, a)| (a.id.as_str().to_string(), i)).collect();
        Ok((Self { actions, by_id: index }, diagnostics))
    }

    /// An empty cache, useful as a starting snapshot before the first
    /// successful load, or in tests that don't need any actions declared.
    pub fn empty() -> Self { Self { actions: Vec::new(), by_id: HashMap::new() } }

    pub fn get(&self, action_id: &str) -> Option<&ActionDecl> { self.by_id.get(action_id).map(|&i| &self.actions[i]) }

    /// Iterates in load order (file sort order, then declaration order
    /// within a file).
    pub fn iter(&self) -> impl Iterator<Item = &ActionDecl> { self.actions.iter() }

    pub fn len(&self) -> usize { self.actions.len() }

    pub fn is_empty(&self) -> bool { self.actions.is_empty() }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;

    use tempfile::tempdir;

    use super::*;

    fn write_policy(dir: &Path, name: &str, contents: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn loads_directory_in_sorted_order() {
        let dir = tempdir().unwrap();
        write_policy(
            dir.path(),
            "b.policy",
            r#"<policyconfig><action id="org.example.b"><defaults><allow_any>no</allow_any><allow_inactive>no</allow_inactive><allow_active>yes</allow_active></defaults></action></policyconfig>"#,
        );
        write_policy(
            dir.path(),
            "a.policy",
            r#"<policyconfig><action id="org.example.a"><defaults><allow_any>no</allow_any><allow_inactive>no</allow_inactive><allow_active>yes</allow_active></defaults></action></policyconfig>"#,
        );
        let (cache, diags) = PolicyCache::load(dir.path()).unwrap();
        assert!(diags.is_empty());
        assert_eq!(cache.len(), 2);
        let ids: Vec<&str> = cache.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["org.example.a", "org.example.b"]);
    }

    #[test]
    fn duplicate_action_id_across_files_fails_whole_load() {
        let dir = tempdir().unwrap();
        let content = r#"<policyconfig><action id="org.example.dup"><defaults><allow_any>no</allow_any><allow_inactive>no</allow_inactive><allow_active>yes</allow_active></defaults></action></policyconfig>"#;
        write_policy(dir.path(), "one.policy", content);
        write_policy(dir.path(), "two.policy", content);
        assert!(matches!(PolicyCache::load(dir.path()), Err(PolicyLoadError::DuplicateActionId { .. })));
    }

    #[test]
    fn ignores_non_policy_files() {
        let dir = tempdir().unwrap();
        write_policy(dir.path(), "README.txt", "not xml at all");
        let (cache, _) = PolicyCache::load(dir.path()).unwrap();
        assert!(cache.is_empty());
    }
}
