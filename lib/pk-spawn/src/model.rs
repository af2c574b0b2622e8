/// Flags governing how the child's standard streams are wired, mirroring
/// `original_source/src/kit/kit-spawn.c`'s `KitSpawnFlags` bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnFlags {
    /// Leave the child's stdin attached to ours instead of binding it to
    /// the `stdin` bytes passed to [`crate::spawn_sync`] (or `/dev/null`
    /// when that argument is `None`).
    pub child_inherits_stdin: bool,
    /// Bind the child's stdout to `/dev/null` instead of capturing it.
    pub stdout_to_dev_null: bool,
    /// Bind the child's stderr to `/dev/null` instead of capturing it.
    pub stderr_to_dev_null: bool,
}

/// How the child process ended, mirroring the `WIFEXITED`/`WIFSIGNALED`
/// distinction `waitpid` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The child called `exit()` (or returned from `main`) with this
    /// status code.
    Exited(i32),
    /// The child was terminated by this signal number, e.g. because a
    /// parent-side failure triggered cancellation (`spec.md` §5
    /// "Cancellation").
    Signaled(i32),
}

impl ExitOutcome {
    /// True for a clean, zero-status exit.
    pub fn success(&self) -> bool { matches!(self, ExitOutcome::Exited(0)) }
}

/// The result of a completed [`crate::spawn_sync`] call: everything the
/// child wrote to its captured streams, plus how it ended.
#[derive(Debug, Clone)]
pub struct SpawnOutcome {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: ExitOutcome,
}
