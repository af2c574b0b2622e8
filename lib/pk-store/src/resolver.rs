//! uid ⇄ user-name resolution, used to turn a numeric uid into the
//! `user-<name>.auths` filename `original_source/src/polkit-grant/
//! polkit-authorization-db-write.c` derives from `getpwuid()`, and back
//! again when [`crate::AuthStore::for_action_all_uids`] has to enumerate
//! every `user-*.auths` file on disk.
pub trait UserNameResolver: Send + Sync {
    fn name_for_uid(&self, uid: u32) -> String;

    /// Inverse of [`Self::name_for_uid`]. `None` if `name` doesn't
    /// correspond to any known uid -- the caller skips that file rather
    /// than failing the whole scan.
    fn uid_for_name(&self, name: &str) -> Option<u32>;
}

/// Looks up `uid` via the platform account database. Unlike the
/// original's unchecked `pw->pw_name` dereference, a uid with no
/// account entry falls back to its decimal form rather than crashing --
/// the store then simply has a file the system has no matching account
/// for, which is no worse than today's admin deleting an account out
/// from under an existing grant file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemUserNameResolver;

impl UserNameResolver for SystemUserNameResolver {
    #[cfg(unix)]
    fn name_for_uid(&self, uid: u32) -> String {
        match nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid)) {
            Ok(Some(user)) => user.name,
            _ => uid.to_string(),
        }
    }

    #[cfg(not(unix))]
    fn name_for_uid(&self, uid: u32) -> String { uid.to_string() }

    #[cfg(unix)]
    fn uid_for_name(&self, name: &str) -> Option<u32> {
        if let Ok(user) = nix::unistd::User::from_name(name) {
            if let Some(user) = user {
                return Some(user.uid.as_raw());
            }
        }
        name.parse().ok()
    }

    #[cfg(not(unix))]
    fn uid_for_name(&self, name: &str) -> Option<u32> { name.parse().ok() }
}

/// Always resolves to/from the decimal uid. Useful for tests and for
/// deployments that don't want a live account-database dependency.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalUserNameResolver;

impl UserNameResolver for DecimalUserNameResolver {
    fn name_for_uid(&self, uid: u32) -> String { uid.to_string() }

    fn uid_for_name(&self, name: &str) -> Option<u32> { name.parse().ok() }
}
