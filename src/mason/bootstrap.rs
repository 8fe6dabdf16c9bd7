//! Self-rebuild protocol, in the spirit of tsoding's nob: when the build
//! program's own source outdates the running binary, recompile it in place
//! and re-exec it with the original arguments.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{self, Command};

use log::{error, info};

use crate::command::CommandLine;
use crate::error::Error;
use crate::freshness::is_stale;

/// Environment variable carrying the bootstrap step counter. Each
/// recompile-and-re-exec pass increments it, so a freshly built binary
/// knows which capabilities it may assume.
pub const BOOTSTRAP_STEP_ENV: &str = "MASON_BOOTSTRAP_STEP";

/// Bootstrap step the current invocation runs at; 0 on the first pass.
pub fn current_step() -> u32 {
    env::var(BOOTSTRAP_STEP_ENV)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

/// One stage of capability negotiation: once `marker` exists on disk, the
/// next recompile carries `flags`.
#[derive(Clone, Debug)]
struct Stage {
    marker: PathBuf,
    flags: Vec<String>,
}

/// Rebuild-yourself guard. Construct one at program entry, before any
/// other engine logic, since a successful rebuild replaces the running
/// process.
#[derive(Clone, Debug)]
pub struct Bootstrap {
    source: PathBuf,
    binary: Option<PathBuf>,
    compiler: Vec<String>,
    watch: Vec<PathBuf>,
    stages: Vec<Stage>,
}

impl Bootstrap {
    /// `source` is the build program's own source file.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            binary: None,
            compiler: vec!["rustc".into(), "--edition".into(), "2021".into()],
            watch: Vec::new(),
            stages: Vec::new(),
        }
    }

    /// Overrides the binary to replace; defaults to the running executable.
    pub fn binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    /// Replaces the recompilation command prefix. The full command is
    /// `compiler ++ stage flags ++ ["-o", binary, source]`.
    pub fn compiler(mut self, tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.compiler = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an extra input whose modification also forces a rebuild, e.g.
    /// a module the build program includes.
    pub fn watch(mut self, path: impl Into<PathBuf>) -> Self {
        self.watch.push(path.into());
        self
    }

    /// Registers a capability stage: once `marker` exists, recompilations
    /// carry `flags` and the step counter keeps advancing past it.
    pub fn stage(
        mut self,
        marker: impl Into<PathBuf>,
        flags: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.stages.push(Stage {
            marker: marker.into(),
            flags: flags.into_iter().map(Into::into).collect(),
        });
        self
    }

    fn binary_path(&self) -> Result<PathBuf, Error> {
        match &self.binary {
            Some(binary) => Ok(binary.clone()),
            None => env::current_exe().map_err(|source| Error::CurrentExe { source }),
        }
    }

    fn binary_is_stale(&self, binary: &Path) -> bool {
        is_stale(binary, &self.source) || self.watch.iter().any(|watched| is_stale(binary, watched))
    }

    /// Whether the binary is older than the program source or any watched
    /// input, i.e. whether [`rebuild_yourself`](Self::rebuild_yourself)
    /// would recompile.
    pub fn needs_rebuild(&self) -> Result<bool, Error> {
        let binary = self.binary_path()?;
        Ok(self.binary_is_stale(&binary))
    }

    /// Recompiles the binary in place. The previous binary is kept at
    /// `<binary>.old`; if the compiler fails it is moved back and the
    /// compiler failure is reported. A failed restore is its own, separate
    /// fatal error.
    pub fn recompile(&self) -> Result<(), Error> {
        let binary = self.binary_path()?;
        let backup = backup_path(&binary);
        fs::rename(&binary, &backup).map_err(|source| Error::Rename {
            from: binary.clone(),
            to: backup.clone(),
            source,
        })?;

        let mut command = CommandLine::from_tokens(self.compiler.iter().cloned());
        for stage in &self.stages {
            if stage.marker.exists() {
                command.args(stage.flags.iter().cloned());
            }
        }
        command
            .arg("-o")
            .arg(binary.display().to_string())
            .arg(self.source.display().to_string());

        let compiled = match command.run_sync() {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(Error::Recompile { status }),
            Err(err) => Err(err),
        };
        if let Err(err) = compiled {
            error!("Could not rebuild `{}`", binary.display());
            if let Err(source) = fs::rename(&backup, &binary) {
                error!("Could not restore `{}`", binary.display());
                return Err(Error::Restore { binary, source });
            }
            return Err(err);
        }
        Ok(())
    }

    /// Program-entry guard. Returns immediately when the binary is fresh.
    /// Otherwise recompiles, re-executes the new binary with the original
    /// arguments and one step further along, and exits with its status:
    /// on the rebuild path this function never returns.
    pub fn rebuild_yourself(&self) -> Result<(), Error> {
        let binary = self.binary_path()?;
        if !self.binary_is_stale(&binary) {
            return Ok(());
        }

        info!(
            "Rebuilding `{}` (bootstrap step {})",
            binary.display(),
            current_step()
        );
        self.recompile()?;

        let forwarded: Vec<OsString> = env::args_os().skip(1).collect();
        let status = Command::new(&binary)
            .args(&forwarded)
            .env(BOOTSTRAP_STEP_ENV, (current_step() + 1).to_string())
            .status()
            .map_err(|source| Error::Spawn {
                program: binary.display().to_string(),
                source,
            })?;
        process::exit(status.code().unwrap_or(1));
    }
}

fn backup_path(binary: &Path) -> PathBuf {
    let mut path = binary.to_path_buf().into_os_string();
    path.push(".old");
    PathBuf::from(path)
}
