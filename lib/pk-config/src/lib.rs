//! Configuration override loading and evaluation.
//!
//! Parses the `<config>`/`<match>`/`<return>`/`<define_admin_auth>`
//! override tree and walks it to resolve a [`pk_identity::Decision`] or an
//! administrator definition ahead of any policy-declared default.

pub mod error;
pub mod eval;
pub mod model;
pub mod parser;

use std::fs;
use std::path::Path;

pub use error::ConfigLoadError;
pub use eval::{determine_admin_auth, evaluate, evaluate_action, evaluate_user};
pub use model::{AdminAuthKind, AdminAuthRule, ConfigNode, ConfigTree, MatchKind};
pub use parser::parse_config;

/// Loads the configuration override file at `path`. A missing file is not
/// an error at this layer -- callers that want `ConfigTree::default()` on
/// a missing path should check existence themselves and fall back.
pub fn load_config_file(path: impl AsRef<Path>) -> Result<ConfigTree, ConfigLoadError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io { path: path.to_path_buf(), source })?;
    parse_config(&contents)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(load_config_file("/nonexistent/path/PolicyKit.conf"), Err(ConfigLoadError::Io { .. })));
    }

    #[test]
    fn loads_a_real_file_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"<config><match action=".*"><match user="0"><return result="yes"/></match></match></config>"#).unwrap();
        let tree = load_config_file(file.path()).unwrap();
        assert_eq!(evaluate_user(&tree, "org.example.anything", "0", "root"), Some(pk_identity::Decision::Yes));
    }

    #[test]
    fn default_tree_never_matches() {
        let tree = ConfigTree::default();
        assert_eq!(evaluate_action(&tree, "org.example.anything"), None);
        assert!(determine_admin_auth(&tree, "org.example.anything", "0", "root").is_none());
    }
}
