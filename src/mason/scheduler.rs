//! Multiprocess build scheduler.
//!
//! Keeps a worklist of not-yet-built targets and a bounded table of
//! in-flight build processes. Dependency targets are always finished before
//! a dependent's command is assembled; among independent targets no order
//! is guaranteed.

use std::process::{Child, ExitStatus};
use std::thread;
use std::time::Duration;

use crate::error::Error;
use crate::target::{BuildState, Graph, TargetId};

/// How often in-flight children are polled for completion. std has no
/// "wait for any child", so waiting is a `try_wait` sweep over the table.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

struct Slot {
    pid: u32,
    target: TargetId,
    child: Child,
}

/// Fixed-capacity, open-addressing map from process id to the target that
/// process is building. Capacity equals the configured concurrency, so a
/// full table on insert is a scheduler bug, not a runtime condition.
pub(crate) struct ProcessTable {
    slots: Vec<Option<Slot>>,
    len: usize,
}

impl ProcessTable {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        assert!(capacity >= 1, "process table needs at least one slot");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn insert(&mut self, child: Child, target: TargetId) {
        assert!(self.len < self.slots.len(), "process table is full");
        let pid = child.id();
        let mut i = pid as usize % self.slots.len();
        while self.slots[i].is_some() {
            i = (i + 1) % self.slots.len();
        }
        self.slots[i] = Some(Slot { pid, target, child });
        self.len += 1;
    }

    /// Probes the whole table rather than stopping at the first hole, so a
    /// lookup after `remove` is a well-defined `None` instead of depending
    /// on probe-sequence tombstones.
    fn position(&self, pid: u32) -> Option<usize> {
        let capacity = self.slots.len();
        let start = pid as usize % capacity;
        (0..capacity)
            .map(|k| (start + k) % capacity)
            .find(|&i| matches!(&self.slots[i], Some(slot) if slot.pid == pid))
    }

    pub(crate) fn get(&self, pid: u32) -> Option<TargetId> {
        self.position(pid)
            .map(|i| self.slots[i].as_ref().unwrap().target)
    }

    pub(crate) fn remove(&mut self, pid: u32) -> Option<(TargetId, Child)> {
        let i = self.position(pid)?;
        let slot = self.slots[i].take().unwrap();
        self.len -= 1;
        Some((slot.target, slot.child))
    }

    /// Blocks until any in-flight process exits and returns its pid and
    /// exit status. The entry stays in the table until the caller removes
    /// it.
    pub(crate) fn wait_any(&mut self) -> Result<(u32, ExitStatus), Error> {
        assert!(self.len > 0, "waiting on an empty process table");
        loop {
            for slot in self.slots.iter_mut().flatten() {
                match slot.child.try_wait() {
                    Ok(Some(status)) => return Ok((slot.pid, status)),
                    Ok(None) => {}
                    Err(source) => return Err(Error::Wait { source }),
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Pre-order traversal from `root`: the root first, then its dependencies
/// recursively, each reachable target exactly once. The worklist is
/// scanned back-to-front, so leaf-most targets are considered first.
fn worklist(graph: &Graph, root: TargetId) -> Vec<TargetId> {
    fn visit(graph: &Graph, id: TargetId, seen: &mut [bool], out: &mut Vec<TargetId>) {
        if std::mem::replace(&mut seen[id.0], true) {
            return;
        }
        out.push(id);
        for dep in graph.dependencies(id) {
            visit(graph, dep, seen, out);
        }
    }
    let mut seen = vec![false; graph.len()];
    let mut out = Vec::new();
    visit(graph, root, &mut seen, &mut out);
    out
}

/// Removes and returns the first target (scanning from the back) whose
/// target-type dependencies are all built, if any.
fn take_ready(graph: &Graph, worklist: &mut Vec<TargetId>) -> Option<TargetId> {
    let position = worklist
        .iter()
        .rposition(|&id| graph.dependencies(id).all(|dep| graph[dep].state().is_built()))?;
    Some(worklist.remove(position))
}

/// Builds a target graph with up to `jobs` concurrent build processes.
///
/// Produces the same final set of rebuilt artifacts as the sequential
/// [`build`](crate::build) executor for any acyclic graph and any
/// `jobs >= 1`; only the execution order differs.
pub struct Scheduler {
    jobs: usize,
    always_rebuild: bool,
}

impl Scheduler {
    pub fn new(jobs: usize) -> Self {
        assert!(jobs >= 1, "need at least one build process");
        Self {
            jobs,
            always_rebuild: false,
        }
    }

    /// Rebuild every target regardless of freshness.
    pub fn always_rebuild(mut self, always_rebuild: bool) -> Self {
        self.always_rebuild = always_rebuild;
        self
    }

    pub fn build(&self, graph: &mut Graph, root: TargetId) -> Result<(), Error> {
        let mut pending = worklist(graph, root);
        let mut table = ProcessTable::with_capacity(self.jobs);
        let mut first_error = None;

        while !pending.is_empty() && first_error.is_none() {
            // Admit work until the pool is full or nothing is ready.
            while table.len() < self.jobs {
                let Some(id) = take_ready(graph, &mut pending) else {
                    break;
                };
                // Same staleness rule as the sequential executor: own
                // timestamp comparison, or any dependency rebuilt this run.
                let rebuilt_dependency = graph
                    .dependencies(id)
                    .any(|dep| graph[dep].state() == BuildState::Rebuilt);
                if !self.always_rebuild && !rebuilt_dependency && !graph.is_stale_target(id) {
                    // Fresh targets never consume a pool slot.
                    graph.set_state(id, BuildState::UpToDate);
                    continue;
                }
                match graph.build_command(id).run_async() {
                    Ok(child) => table.insert(child, id),
                    Err(err) => {
                        first_error = Some(err);
                        break;
                    }
                }
            }

            if table.is_empty() {
                if first_error.is_some() {
                    break;
                }
                if pending.is_empty() {
                    break;
                }
                // Nothing running and nothing ready: the remaining targets
                // wait on each other. Report instead of spinning forever.
                return Err(Error::Stalled {
                    remaining: pending.len(),
                });
            }

            let (pid, status) = match table.wait_any() {
                Ok(exit) => exit,
                Err(err) => {
                    // A wait failure must not mask an earlier build failure.
                    first_error.get_or_insert(err);
                    break;
                }
            };
            let id = table.get(pid).expect("exited pid is in the table");
            table.remove(pid);
            graph.set_state(id, BuildState::Rebuilt);
            if !status.success() && first_error.is_none() {
                first_error = Some(Error::CommandFailed {
                    target: graph[id].artifact().to_path_buf(),
                    status,
                });
            }
        }

        // On failure, stop admitting work but let whatever is already
        // running finish; spawned children are never killed.
        while !table.is_empty() {
            let (pid, status) = match table.wait_any() {
                Ok(exit) => exit,
                Err(err) => {
                    first_error.get_or_insert(err);
                    break;
                }
            };
            let id = table.get(pid).expect("exited pid is in the table");
            table.remove(pid);
            graph.set_state(id, BuildState::Rebuilt);
            if !status.success() && first_error.is_none() {
                first_error = Some(Error::CommandFailed {
                    target: graph[id].artifact().to_path_buf(),
                    status,
                });
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
