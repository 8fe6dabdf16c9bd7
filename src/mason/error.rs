use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Everything that can go wrong while building, cleaning or rebootstrapping.
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("build command for `{}` exited with {status}", .target.display())]
    CommandFailed { target: PathBuf, status: ExitStatus },

    #[error("could not wait for a build process: {source}")]
    Wait {
        #[source]
        source: io::Error,
    },

    #[error("could not remove `{}`: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not rename `{}` to `{}`: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("recompilation exited with {status}")]
    Recompile { status: ExitStatus },

    #[error("could not restore `{}`: {source}", .binary.display())]
    Restore {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The scheduler ran out of running processes while unbuilt targets
    /// remain, none of which is ready. Only a dependency cycle can cause
    /// this for a well-formed graph.
    #[error("dependency stall: {remaining} targets left but none is ready to build")]
    Stalled { remaining: usize },

    #[error("could not locate the running binary: {source}")]
    CurrentExe {
        #[source]
        source: io::Error,
    },
}
