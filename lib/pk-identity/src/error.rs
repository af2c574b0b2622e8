use thiserror::Error;

/// Validation failures for the identity value types. Construction of an
/// `ActionId`/`Caller`/`BusName`/`SecurityLabel` either succeeds outright or
/// fails with one of these -- never a type that later turns out malformed
/// at use time.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid action identifier: {0:?}")]
    InvalidActionId(String),

    #[error("invalid bus name: {0:?}")]
    InvalidBusName(String),

    #[error("invalid security label: {0:?}")]
    InvalidSecurityLabel(String),

    #[error("caller pid must be > 0, got {0}")]
    InvalidPid(i64),
}
