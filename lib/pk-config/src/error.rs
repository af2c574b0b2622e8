use thiserror::Error;

/// Failures loading the configuration override file.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("malformed XML: {0}")]
    MalformedXml(#[source] quick_xml::Error),

    #[error("parser nesting exceeds the 32-element depth limit")]
    DepthOverflow,

    #[error("multiple <config> root elements")]
    MultipleRoots,

    #[error("<match> requires exactly one of action= or user=, found {0} attribute(s)")]
    MatchWrongAttrCount(usize),

    #[error("unknown match rule {0:?}")]
    UnknownMatchRule(String),

    #[error("invalid regular expression {pattern:?}: {source}")]
    InvalidRegex { pattern: String, #[source] source: regex::Error },

    #[error("<return> requires a result= attribute naming a known result")]
    MissingReturnResult,

    #[error("unknown return result {0:?}")]
    UnknownReturnResult(String),

    #[error("<define_admin_auth> requires exactly one of user= or group=, found {0} attribute(s)")]
    AdminAuthWrongAttrCount(usize),

    #[error("failed to read configuration file {path:?}: {source}")]
    Io { path: std::path::PathBuf, #[source] source: std::io::Error },
}
