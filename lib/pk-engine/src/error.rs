use thiserror::Error;

/// Errors from `decide()` and the admin-identity resolution helper.
/// Wraps the lower layers' own error types rather than flattening them
/// into a string, so a caller that cares can still match on the
/// underlying kind (`spec.md` §7 "Propagation").
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("failed to read the authorization store: {0}")]
    Store(#[from] pk_store::StoreError),

    /// `spec.md` §7.9: the subject doesn't support the requested
    /// operation -- e.g. a session-authorisation query against a
    /// `process`-scoped grant revocation.
    #[error("not supported for this subject: {0}")]
    NotSupported(String),
}
