//! The target graph: what gets built, from what, and with which command.

use std::fs;
use std::ops::Index;
use std::path::{Path, PathBuf};

use log::warn;

use crate::command::CommandLine;
use crate::error::Error;
use crate::freshness::is_stale;

/// Index of a target in its [`Graph`] arena. Copyable, never owning.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TargetId(pub(crate) usize);

/// One input of a target: a plain file, or another target's artifact.
///
/// `include_in_command` decides whether the resolved path is appended to
/// the generated build command. Pure dependencies such as headers must
/// trigger rebuilds without being handed to the compiler.
#[derive(Clone, Debug)]
pub enum Source {
    File {
        path: PathBuf,
        include_in_command: bool,
    },
    Target {
        id: TargetId,
        include_in_command: bool,
    },
}

impl Source {
    /// A file input that is passed to the build command.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Source::File {
            path: path.into(),
            include_in_command: true,
        }
    }

    /// A file input that only triggers rebuilds, e.g. a header.
    pub fn header(path: impl Into<PathBuf>) -> Self {
        Source::File {
            path: path.into(),
            include_in_command: false,
        }
    }

    /// Another target whose artifact is passed to the build command.
    pub fn target(id: TargetId) -> Self {
        Source::Target {
            id,
            include_in_command: true,
        }
    }
}

/// Per-run build state of a target. Written at most once per run.
///
/// The up-to-date/rebuilt split records whether an actual build command ran,
/// which is what dependents consult for cascade rebuilds through shared
/// (diamond) dependencies.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BuildState {
    Pending,
    UpToDate,
    Rebuilt,
}

impl BuildState {
    pub fn is_built(self) -> bool {
        !matches!(self, BuildState::Pending)
    }
}

/// A buildable artifact: its output path, the invariant part of its build
/// command, and the inputs it is generated from.
#[derive(Debug)]
pub struct Target {
    pub(crate) artifact: PathBuf,
    pub(crate) command_prefix: Vec<String>,
    pub(crate) sources: Vec<Source>,
    pub(crate) state: BuildState,
}

impl Target {
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    pub fn state(&self) -> BuildState {
        self.state
    }
}

/// Arena holding every target of one build description. Targets reference
/// each other by [`TargetId`], so the graph must be declared leaf-first.
///
/// The graph is assumed acyclic. The builder API cannot express a cycle
/// (a source can only name an already-created target), which is what makes
/// the schedulers' traversals safe.
#[derive(Debug, Default)]
pub struct Graph {
    pub(crate) targets: Vec<Target>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a target and returns its id for use in later [`Source::target`]
    /// references.
    pub fn target(
        &mut self,
        artifact: impl Into<PathBuf>,
        command_prefix: impl IntoIterator<Item = impl Into<String>>,
        sources: impl IntoIterator<Item = Source>,
    ) -> TargetId {
        let id = TargetId(self.targets.len());
        self.targets.push(Target {
            artifact: artifact.into(),
            command_prefix: command_prefix.into_iter().map(Into::into).collect(),
            sources: sources.into_iter().collect(),
            state: BuildState::Pending,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Returns every target to `Pending` so the same graph can drive
    /// another build pass.
    pub fn reset(&mut self) {
        for target in &mut self.targets {
            target.state = BuildState::Pending;
        }
    }

    pub(crate) fn set_state(&mut self, id: TargetId, state: BuildState) {
        self.targets[id.0].state = state;
    }

    /// Target-type sources of `id`, in declaration order.
    pub(crate) fn dependencies(&self, id: TargetId) -> impl Iterator<Item = TargetId> + '_ {
        self[id].sources.iter().filter_map(|source| match source {
            Source::Target { id, .. } => Some(*id),
            Source::File { .. } => None,
        })
    }

    /// Assembles the build command for `id`:
    /// `prefix ++ ["-o", artifact] ++ included source paths`, in source
    /// declaration order.
    pub(crate) fn build_command(&self, id: TargetId) -> CommandLine {
        let target = &self[id];
        let mut command = CommandLine::from_tokens(target.command_prefix.iter().cloned());
        command.arg("-o").arg(target.artifact.display().to_string());
        for source in &target.sources {
            match source {
                Source::File {
                    path,
                    include_in_command: true,
                } => {
                    command.arg(path.display().to_string());
                }
                Source::Target {
                    id,
                    include_in_command: true,
                } => {
                    command.arg(self[*id].artifact.display().to_string());
                }
                Source::File {
                    include_in_command: false,
                    ..
                }
                | Source::Target {
                    include_in_command: false,
                    ..
                } => {}
            }
        }
        command
    }

    /// Timestamp-only staleness of `id` against all of its sources. A
    /// dependency rebuilt this run may keep an old artifact timestamp, so
    /// callers must also consult [`BuildState::Rebuilt`] for the cascade.
    pub(crate) fn is_stale_target(&self, id: TargetId) -> bool {
        let target = &self[id];
        target.sources.iter().any(|source| match source {
            Source::File { path, .. } => is_stale(&target.artifact, path),
            Source::Target { id, .. } => is_stale(&target.artifact, &self[*id].artifact),
        })
    }

    /// Removes the artifact of `root` and of every target reachable from
    /// it, regardless of freshness.
    pub fn clean(&self, root: TargetId) -> Result<(), Error> {
        let mut visited = vec![false; self.targets.len()];
        self.clean_rec(root, &mut visited)
    }

    fn clean_rec(&self, id: TargetId, visited: &mut [bool]) -> Result<(), Error> {
        if std::mem::replace(&mut visited[id.0], true) {
            return Ok(());
        }
        let artifact = &self[id].artifact;
        if artifact.exists() {
            warn!("Removing `{}`", artifact.display());
            fs::remove_file(artifact).map_err(|source| Error::Remove {
                path: artifact.clone(),
                source,
            })?;
        }
        for dep in self.dependencies(id) {
            self.clean_rec(dep, visited)?;
        }
        Ok(())
    }
}

impl Index<TargetId> for Graph {
    type Output = Target;

    fn index(&self, id: TargetId) -> &Target {
        &self.targets[id.0]
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{BuildState, Graph, Source, TargetId};

    fn object_and_binary() -> (Graph, TargetId, TargetId) {
        let mut graph = Graph::new();
        let object = graph.target(
            "toto.o",
            ["cc", "-Wall", "-Werror", "-c"],
            [Source::header("toto.h"), Source::file("toto.c")],
        );
        let binary = graph.target("toto", ["cc", "-Wall", "-Werror"], [Source::target(object)]);
        (graph, object, binary)
    }

    #[test]
    fn command_assembly_skips_headers() {
        let (graph, object, binary) = object_and_binary();
        assert_eq!(
            graph.build_command(object).argv(),
            ["cc", "-Wall", "-Werror", "-c", "-o", "toto.o", "toto.c"]
        );
        assert_eq!(
            graph.build_command(binary).argv(),
            ["cc", "-Wall", "-Werror", "-o", "toto", "toto.o"]
        );
    }

    #[test]
    fn dependencies_lists_only_target_sources() {
        let (graph, object, binary) = object_and_binary();
        assert_eq!(graph.dependencies(binary).collect::<Vec<_>>(), [object]);
        assert_eq!(graph.dependencies(object).count(), 0);
    }

    #[test]
    fn reset_returns_targets_to_pending() {
        let (mut graph, object, binary) = object_and_binary();
        graph.set_state(object, BuildState::Rebuilt);
        graph.set_state(binary, BuildState::UpToDate);
        graph.reset();
        assert_eq!(graph[object].state(), BuildState::Pending);
        assert_eq!(graph[binary].state(), BuildState::Pending);
    }

    #[test]
    fn clean_removes_artifacts_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let object_path = dir.path().join("toto.o");
        let binary_path = dir.path().join("toto");
        fs::write(&object_path, "object").unwrap();
        fs::write(&binary_path, "binary").unwrap();

        let mut graph = Graph::new();
        let object = graph.target(&object_path, ["cc", "-c"], [Source::file("toto.c")]);
        let binary = graph.target(&binary_path, ["cc"], [Source::target(object)]);

        graph.clean(binary).unwrap();
        assert!(!binary_path.exists());
        assert!(!object_path.exists());

        // Cleaning an already-clean tree is fine.
        graph.clean(binary).unwrap();
    }
}
