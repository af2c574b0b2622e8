//! `spawn_sync` (`spec.md` §4.8): runs a child process to completion,
//! capturing its stdio. Grounded in
//! `original_source/src/kit/kit-spawn.c`'s `kit_spawn_sync`: reset
//! `SIGPIPE` to `SIG_DFL` in the child, close every inherited descriptor
//! above 2, `dup2` the capture pipes onto 0/1/2 (or bind `/dev/null`
//! when a stream isn't being captured), then `select()` over the open
//! pipes until EOF and `waitpid`.
//!
//! The `select()` loop is expressed here as one reader thread per
//! captured stream plus a writer thread for `stdin`, joined after
//! spawning; `std::process::Command::pre_exec` stands in for the
//! manual `fork()`-time setup, and `Command::spawn`'s own `io::Error`
//! already reports a failed `execve` distinctly from a normal exit, so
//! no `exit(128 + errno)` convention is needed on the Rust side.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;

use crate::error::SpawnError;
use crate::model::{ExitOutcome, SpawnFlags, SpawnOutcome};

#[cfg(unix)]
fn child_setup() -> io::Result<()> {
    // SAFETY: runs in the child between fork and exec; `signal`,
    // `sysconf` and `close` are all async-signal-safe.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        let max_fd = libc::sysconf(libc::_SC_OPEN_MAX);
        let max_fd = if max_fd < 0 { 1024 } else { max_fd };
        for fd in 3..max_fd {
            libc::close(fd as i32);
        }
    }
    Ok(())
}

#[cfg(unix)]
fn cancel(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let _ = kill(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
    let _ = child.wait();
}

#[cfg(unix)]
fn exit_outcome(status: std::process::ExitStatus) -> ExitOutcome {
    use std::os::unix::process::ExitStatusExt;

    match status.code() {
        Some(code) => ExitOutcome::Exited(code),
        None => ExitOutcome::Signaled(status.signal().unwrap_or(-1)),
    }
}

/// Runs `argv` to completion and returns everything it wrote to its
/// captured streams.
///
/// - `cwd`: working directory for the child; `None` inherits ours.
/// - `env`: if `Some`, replaces the child's environment entirely
///   (matching `kit_spawn_sync`'s explicit `env` array); `None`
///   inherits ours.
/// - `stdin`: bytes written to the child's stdin then closed, giving it
///   EOF. Ignored when `flags.child_inherits_stdin` is set.
///
/// On any failure after the child has started -- a stream write/read
/// error or a `waitpid` error -- the child is sent `SIGKILL` and reaped
/// before the error is returned (`spec.md` §5 "Cancellation").
pub fn spawn_sync(cwd: Option<&Path>, argv: &[String], env: Option<&HashMap<String, String>>, stdin: Option<&[u8]>, flags: SpawnFlags) -> Result<SpawnOutcome, SpawnError> {
    let (argv0, rest) = argv.split_first().ok_or(SpawnError::EmptyArgv)?;

    let mut command = Command::new(argv0);
    command.args(rest);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    if let Some(vars) = env {
        command.env_clear();
        command.envs(vars);
    }

    command.stdin(if flags.child_inherits_stdin {
        Stdio::inherit()
    } else if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    command.stdout(if flags.stdout_to_dev_null { Stdio::null() } else { Stdio::piped() });
    command.stderr(if flags.stderr_to_dev_null { Stdio::null() } else { Stdio::piped() });

    #[cfg(unix)]
    // SAFETY: `child_setup` only calls async-signal-safe libc functions.
    unsafe {
        command.pre_exec(child_setup);
    }

    let mut child = command.spawn().map_err(|source| SpawnError::Spawn { argv0: argv0.clone(), source })?;

    let stdin_writer = stdin.filter(|_| !flags.child_inherits_stdin).map(|bytes| {
        let mut pipe = child.stdin.take().expect("stdin was piped");
        let bytes = bytes.to_vec();
        thread::spawn(move || pipe.write_all(&bytes))
    });

    let stdout_reader = (!flags.stdout_to_dev_null).then(|| {
        let mut pipe = child.stdout.take().expect("stdout was piped");
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf).map(|_| buf)
        })
    });

    let stderr_reader = (!flags.stderr_to_dev_null).then(|| {
        let mut pipe = child.stderr.take().expect("stderr was piped");
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf).map(|_| buf)
        })
    });

    let outcome = (|| -> Result<SpawnOutcome, SpawnError> {
        if let Some(writer) = stdin_writer {
            writer.join().expect("stdin writer thread panicked").map_err(SpawnError::WriteStdin)?;
        }
        let stdout = match stdout_reader {
            Some(handle) => handle.join().expect("stdout reader thread panicked").map_err(|source| SpawnError::ReadStream { stream: "stdout", source })?,
            None => Vec::new(),
        };
        let stderr = match stderr_reader {
            Some(handle) => handle.join().expect("stderr reader thread panicked").map_err(|source| SpawnError::ReadStream { stream: "stderr", source })?,
            None => Vec::new(),
        };
        let status = child.wait().map_err(SpawnError::Wait)?;
        Ok(SpawnOutcome { stdout, stderr, status: exit_outcome(status) })
    })();

    match outcome {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            cancel(&mut child);
            Err(err)
        },
    }
}
