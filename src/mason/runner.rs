//! Sequential, depth-first build executor: one build in flight at a time.

use crate::error::Error;
use crate::freshness::is_stale;
use crate::target::{BuildState, Graph, Source, TargetId};

/// Builds `root` and everything it depends on, depth-first, spawning one
/// synchronous build command per stale target.
///
/// Returns whether `root` itself was rebuilt. A nonzero build exit or a
/// spawn failure aborts the whole recursive build immediately.
pub fn build(graph: &mut Graph, root: TargetId, always_rebuild: bool) -> Result<bool, Error> {
    let mut needs_rebuild = always_rebuild;

    // Dependencies first; failures short-circuit before any process is
    // spawned for this target.
    for source in graph[root].sources.clone() {
        match source {
            Source::Target { id, .. } => {
                if !graph[id].state().is_built() {
                    build(graph, id, always_rebuild)?;
                }
                needs_rebuild |= graph[id].state() == BuildState::Rebuilt;
                needs_rebuild |= is_stale(graph[root].artifact(), graph[id].artifact());
            }
            Source::File { ref path, .. } => {
                needs_rebuild |= is_stale(graph[root].artifact(), path);
            }
        }
    }

    if !needs_rebuild {
        graph.set_state(root, BuildState::UpToDate);
        return Ok(false);
    }

    let status = graph.build_command(root).run_sync()?;
    if !status.success() {
        return Err(Error::CommandFailed {
            target: graph[root].artifact().to_path_buf(),
            status,
        });
    }
    graph.set_state(root, BuildState::Rebuilt);
    Ok(true)
}
