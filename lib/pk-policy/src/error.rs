use std::path::PathBuf;

use thiserror::Error;

/// Failures loading the `.policy` directory. Partial loads are never
/// returned as `Ok` -- either every file parses, or the whole load fails
/// (`spec.md` §4.2 invariant).
#[derive(Debug, Error)]
pub enum PolicyLoadError {
    #[error("{file}: malformed XML: {source}")]
    MalformedXml { file: PathBuf, #[source] source: quick_xml::Error },

    #[error("{file}: parser nesting exceeds the 32-element depth limit")]
    DepthOverflow { file: PathBuf },

    #[error("{file}: invalid action id {id:?}")]
    InvalidActionId { file: PathBuf, id: String },

    #[error("{file}: unknown result word {word:?} in action {action:?}")]
    UnknownResultWord { file: PathBuf, action: String, word: String },

    #[error("{file}: invalid icon name {icon:?} in action {action:?}")]
    InvalidIconName { file: PathBuf, action: String, icon: String },

    #[error("{file}: <action> missing required id attribute")]
    MissingActionId { file: PathBuf },

    #[error("{file}: <action id={action:?}> missing <defaults> block")]
    MissingDefaults { file: PathBuf, action: String },

    #[error("action {id:?} declared in both {first:?} and {second:?}")]
    DuplicateActionId { id: String, first: PathBuf, second: PathBuf },

    #[error("failed to read policy directory {dir:?}: {source}")]
    Io { dir: PathBuf, #[source] source: std::io::Error },
}
