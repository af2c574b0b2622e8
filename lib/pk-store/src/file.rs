//! The on-disk append protocol (`spec.md` §4.5): read, write to a sibling
//! temp file, `fsync`, atomic `rename`, then touch the reload-trigger.
//! Locking is advisory (`flock` on a sibling `.lock` file, since locking
//! the target's own fd across a `rename` is meaningless once the fd and
//! the path have parted ways) and held only across the rewrite.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::error::StoreError;

/// Mode every `user-<name>.auths` file (and its lock sibling) is created
/// with: readable by owner and group, writable by neither -- the writer
/// helper is the only process ever meant to append.
pub const AUTHS_FILE_MODE: u32 = 0o464;

pub fn user_file_path(root: &Path, user_name: &str) -> PathBuf { root.join(format!("user-{user_name}.auths")) }

fn lock_file_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    target.with_file_name(name)
}

#[cfg(unix)]
fn with_lock<T>(target: &Path, f: impl FnOnce() -> Result<T, StoreError>) -> Result<T, StoreError> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::fd::AsRawFd;

    let lock_path = lock_file_path(target);
    let lock_file = OpenOptions::new().create(true).write(true).mode(AUTHS_FILE_MODE).open(&lock_path).map_err(|source| StoreError::Lock { path: lock_path.clone(), source })?;
    flock(lock_file.as_raw_fd(), FlockArg::LockExclusive).map_err(|e| StoreError::Lock { path: lock_path.clone(), source: std::io::Error::from(e) })?;
    let result = f();
    let _ = flock(lock_file.as_raw_fd(), FlockArg::Unlock);
    result
}

#[cfg(not(unix))]
fn with_lock<T>(_target: &Path, f: impl FnOnce() -> Result<T, StoreError>) -> Result<T, StoreError> { f() }

/// Reads the raw contents of `target`, or an empty string if it doesn't
/// exist yet (the "synthesise a header if absent" case of step 1).
pub fn read_existing(target: &Path) -> Result<String, StoreError> {
    match fs::read_to_string(target) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(source) => Err(StoreError::Io { path: target.to_path_buf(), source }),
    }
}

/// Replaces `target`'s contents with `new_contents` via mkstemp-equivalent
/// sibling temp file + `fsync` + atomic rename, under the advisory lock.
/// Does not touch the reload-trigger -- callers batch that separately so
/// a caller rewriting both the persistent and transient root in one
/// logical operation only triggers one reload.
pub fn atomic_replace(target: &Path, new_contents: &str) -> Result<(), StoreError> {
    with_lock(target, || {
        let dir = target.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|source| StoreError::Io { path: dir.to_path_buf(), source })?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| StoreError::TempFile { path: target.to_path_buf(), source })?;

        #[cfg(unix)]
        {
            let mut perms = tmp.as_file().metadata().map_err(|source| StoreError::Io { path: target.to_path_buf(), source })?.permissions();
            perms.set_mode(AUTHS_FILE_MODE);
            tmp.as_file().set_permissions(perms).map_err(|source| StoreError::Io { path: target.to_path_buf(), source })?;
        }

        tmp.write_all(new_contents.as_bytes()).map_err(|source| StoreError::Io { path: target.to_path_buf(), source })?;
        tmp.as_file().sync_all().map_err(|source| StoreError::Io { path: target.to_path_buf(), source })?;
        tmp.persist(target).map_err(|e| StoreError::Io { path: target.to_path_buf(), source: e.error })?;
        Ok(())
    })
}

/// `utimes`-touches the reload-trigger file, creating it if absent.
/// Readers re-read a user file whenever either its own mtime or this
/// file's mtime has advanced since their last parse (`spec.md` §4.5).
pub fn touch_reload_trigger(path: &Path) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| StoreError::Io { path: dir.to_path_buf(), source })?;
    }
    let now = std::time::SystemTime::now();
    if !path.exists() {
        File::create(path).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
    }
    let file = OpenOptions::new().write(true).open(path).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
    file.set_modified(now).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
    Ok(())
}

/// The mtime of `path`, or `None` if it doesn't exist -- a missing
/// reload-trigger is simply never-yet-touched, not an error.
pub fn mtime(path: &Path) -> Option<std::time::SystemTime> { fs::metadata(path).ok().and_then(|m| m.modified().ok()) }

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn atomic_replace_creates_and_overwrites() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("user-alice.auths");
        atomic_replace(&target, "# header\nline-one\n").unwrap();
        assert_eq!(read_existing(&target).unwrap(), "# header\nline-one\n");
        atomic_replace(&target, "# header\nline-one\nline-two\n").unwrap();
        assert_eq!(read_existing(&target).unwrap(), "# header\nline-one\nline-two\n");
    }

    #[test]
    fn read_existing_missing_file_is_empty_not_error() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("user-nobody.auths");
        assert_eq!(read_existing(&target).unwrap(), "");
    }

    #[test]
    fn touch_reload_trigger_advances_mtime() {
        let dir = tempdir().unwrap();
        let trigger = dir.path().join("reload-trigger");
        touch_reload_trigger(&trigger).unwrap();
        let first = mtime(&trigger).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        touch_reload_trigger(&trigger).unwrap();
        let second = mtime(&trigger).unwrap();
        assert!(second >= first);
    }
}
