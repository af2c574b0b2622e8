use std::io;

use thiserror::Error;

/// Failures from [`crate::spawn_sync`] (`spec.md` §4.8).
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to spawn {argv0:?}: {source}")]
    Spawn { argv0: String, #[source] source: io::Error },

    #[error("failed to write to child stdin: {0}")]
    WriteStdin(#[source] io::Error),

    #[error("failed to read child {stream}: {source}")]
    ReadStream { stream: &'static str, #[source] source: io::Error },

    #[error("failed to wait for child: {0}")]
    Wait(#[source] io::Error),

    #[error("argv must contain at least the program name")]
    EmptyArgv,
}
