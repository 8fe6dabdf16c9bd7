//! Thin wrapper around child process invocations.

use std::process::{Child, Command, ExitStatus, Stdio};

use itertools::Itertools;
use log::info;

use crate::error::Error;

/// An argv vector for one child process invocation: `argv[0]` is the
/// program, the rest are its arguments.
#[derive(Clone, Debug, Default)]
pub struct CommandLine {
    argv: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
        }
    }

    pub fn from_tokens(tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            argv: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.argv.push(arg.into());
        self
    }

    pub fn args(&mut self, args: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Spawns the command and waits for it. Exit status 0 means success,
    /// anything else is a failure; the value is not otherwise interpreted.
    pub fn run_sync(&self) -> Result<ExitStatus, Error> {
        let mut child = self.spawn()?;
        child.wait().map_err(|source| Error::Wait { source })
    }

    /// Spawns the command without waiting. The returned handle carries the
    /// process identifier used by the scheduler's process table.
    pub fn run_async(&self) -> Result<Child, Error> {
        self.spawn()
    }

    fn spawn(&self) -> Result<Child, Error> {
        assert!(!self.argv.is_empty(), "empty command line");
        info!("CMD `{}`", self.argv.iter().join(" "));
        Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| Error::Spawn {
                program: self.argv[0].clone(),
                source,
            })
    }
}
