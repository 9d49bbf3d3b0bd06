//! Concurrent graph walk.
//!
//! A node becomes ready once every node it waits for has completed. Ready
//! nodes run on the tokio runtime, at most `parallelism` at a time. A node
//! that reports an error diagnostic fails, and everything downstream of it
//! is skipped rather than run against missing inputs.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::addrs::Address;
use crate::diagnostics::Diagnostics;
use crate::error::WalkError;
use crate::graph::{FrozenGraph, Node, NodeId};
use crate::lang::Value;
use crate::plans::{ChangesSync, Contribution};

use super::values::WalkValues;

/// What one node produced.
#[derive(Debug, Default)]
pub struct NodeOutput {
    /// Values other nodes may read, merged when the node completes.
    pub values: Vec<(Address, Value)>,
    /// Plan entries, recorded when the node completes.
    pub contributions: Vec<Contribution>,
    /// Problems found. Any error fails the node.
    pub diagnostics: Diagnostics,
}

impl NodeOutput {
    /// An output carrying a single value.
    #[must_use]
    pub fn value(addr: Address, value: Value) -> Self {
        Self {
            values: vec![(addr, value)],
            ..Self::default()
        }
    }

    /// An output carrying only diagnostics.
    #[must_use]
    pub fn diagnostics(diagnostics: impl Into<Diagnostics>) -> Self {
        Self {
            diagnostics: diagnostics.into(),
            ..Self::default()
        }
    }
}

/// Executes one node of a walk.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Executes `node`, reading upstream results from `values`.
    ///
    /// # Errors
    ///
    /// Returns an error only for a violated internal invariant; such an
    /// error aborts the whole walk.
    async fn execute(&self, node: &Node, values: &WalkValues) -> Result<NodeOutput, WalkError>;
}

/// How a node ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Not yet run.
    Pending,
    /// Currently executing.
    Running,
    /// Ran without error diagnostics.
    Completed,
    /// Ran and reported an error.
    Failed,
    /// Not run because something upstream failed.
    Skipped,
}

/// Result of a walk.
#[derive(Debug, Default)]
pub struct WalkReport {
    /// Nodes that ran successfully, in completion order.
    pub completed: Vec<NodeId>,
    /// Nodes that reported errors.
    pub failed: Vec<NodeId>,
    /// Skipped nodes, each with the failed node that caused the skip.
    pub skipped: BTreeMap<NodeId, NodeId>,
    /// Whether the walk was cancelled before every node ran.
    pub interrupted: bool,
    /// Diagnostics of every node that ran.
    pub diagnostics: Diagnostics,
}

impl WalkReport {
    /// Returns true if every node ran and none failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.interrupted && self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Walks a frozen graph.
#[derive(Debug, Clone)]
pub struct Walker {
    parallelism: usize,
    cancel: CancellationToken,
    sink: Option<Arc<ChangesSync>>,
}

impl Walker {
    /// Creates a walker running up to `parallelism` nodes at once.
    #[must_use]
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
            cancel: CancellationToken::new(),
            sink: None,
        }
    }

    /// Uses `token` to stop scheduling new nodes.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Records node contributions into `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<ChangesSync>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The token that interrupts this walker.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Walks `graph`, running every node through `executor`.
    ///
    /// Cancellation stops new nodes from starting; nodes already running
    /// finish and their results are kept.
    ///
    /// # Errors
    ///
    /// Returns an error when a node reports a fatal error or a worker task
    /// is lost. Running nodes are aborted in that case.
    pub async fn walk(
        &self,
        graph: Arc<FrozenGraph>,
        executor: Arc<dyn NodeExecutor>,
        values: Arc<WalkValues>,
    ) -> Result<WalkReport, WalkError> {
        let mut states: HashMap<NodeId, NodeState> = HashMap::new();
        let mut waiting: HashMap<NodeId, usize> = HashMap::new();
        let mut ready: VecDeque<NodeId> = VecDeque::new();
        for &id in graph.topological_order() {
            states.insert(id, NodeState::Pending);
            let deps = graph.dependencies(id).len();
            waiting.insert(id, deps);
            if deps == 0 {
                ready.push_back(id);
            }
        }

        let mut report = WalkReport::default();
        let mut running: JoinSet<(NodeId, Result<NodeOutput, WalkError>)> = JoinSet::new();
        let mut in_flight: BTreeMap<NodeId, String> = BTreeMap::new();

        loop {
            if !report.interrupted && self.cancel.is_cancelled() {
                info!("Walk interrupted; waiting for {} running node(s)", running.len());
                report.interrupted = true;
            }
            if !report.interrupted {
                while running.len() < self.parallelism {
                    let Some(id) = ready.pop_front() else { break };
                    let Some(node) = graph.node(id).cloned() else {
                        return Err(WalkError::Fatal {
                            node: format!("#{}", id.index()),
                            message: String::from("scheduled node is not in the graph"),
                        });
                    };
                    debug!("Starting {node}");
                    states.insert(id, NodeState::Running);
                    in_flight.insert(id, node.name());
                    let executor = Arc::clone(&executor);
                    let values = Arc::clone(&values);
                    running.spawn(async move {
                        let result = executor.execute(&node, &values).await;
                        (id, result)
                    });
                }
            }

            if running.is_empty() {
                break;
            }

            let joined = tokio::select! {
                joined = running.join_next() => joined,
                () = self.cancel.cancelled(), if !report.interrupted => {
                    info!("Walk interrupted; waiting for running nodes");
                    report.interrupted = true;
                    continue;
                }
            };
            let Some(joined) = joined else { break };

            let (id, result) = match joined {
                Ok(done) => done,
                Err(err) => {
                    running.shutdown().await;
                    return Err(WalkError::WorkerLost {
                        node: in_flight.values().cloned().collect::<Vec<_>>().join(", "),
                        message: err.to_string(),
                    });
                }
            };
            in_flight.remove(&id);

            let output = match result {
                Ok(output) => output,
                Err(err) => {
                    warn!("Aborting walk: {err}");
                    running.shutdown().await;
                    return Err(err);
                }
            };

            let node = graph.node(id).ok_or_else(|| WalkError::Fatal {
                node: format!("#{}", id.index()),
                message: String::from("completed node is not in the graph"),
            })?;
            let diagnostics = output.diagnostics.with_default_subject(node.address());
            let failed = diagnostics.has_errors();
            if let Some(sink) = &self.sink {
                sink.record_all(output.contributions);
            }
            report.diagnostics.extend(diagnostics);

            if failed {
                debug!("{node} failed");
                states.insert(id, NodeState::Failed);
                report.failed.push(id);
                skip_downstream(&graph, id, &mut states, &mut report);
                continue;
            }

            values.extend(output.values);
            states.insert(id, NodeState::Completed);
            report.completed.push(id);
            for dependent in graph.dependents(id) {
                if states.get(&dependent) != Some(&NodeState::Pending) {
                    continue;
                }
                if let Some(count) = waiting.get_mut(&dependent) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        let pending = states.values().filter(|s| **s == NodeState::Pending).count();
        if pending > 0 && !report.interrupted {
            return Err(WalkError::Fatal {
                node: String::from("walker"),
                message: format!("{pending} node(s) never became ready"),
            });
        }

        info!(
            "Walk finished: {} completed, {} failed, {} skipped{}",
            report.completed.len(),
            report.failed.len(),
            report.skipped.len(),
            if report.interrupted { ", interrupted" } else { "" }
        );
        Ok(report)
    }
}

fn skip_downstream(graph: &FrozenGraph, failed: NodeId, states: &mut HashMap<NodeId, NodeState>, report: &mut WalkReport) {
    let mut stack = graph.dependents(failed);
    while let Some(id) = stack.pop() {
        if states.get(&id) == Some(&NodeState::Pending) {
            states.insert(id, NodeState::Skipped);
            report.skipped.insert(id, failed);
            stack.extend(graph.dependents(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostic;
    use crate::graph::{Graph, NodeKind};
    use parking_lot::Mutex;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn var(name: &str) -> Node {
        let addr = Address::root_variable(name);
        Node::new(NodeKind::Variable(addr.clone())).providing(addr)
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(String, bool)>>,
        fail: BTreeSet<String>,
        fatal: BTreeSet<String>,
        delay: Duration,
    }

    #[async_trait]
    impl NodeExecutor for Recorder {
        async fn execute(&self, node: &Node, _values: &WalkValues) -> Result<NodeOutput, WalkError> {
            let name = node.name();
            self.events.lock().push((name.clone(), true));
            if self.fatal.contains(&name) {
                return Err(WalkError::Fatal {
                    node: name,
                    message: String::from("boom"),
                });
            }
            tokio::time::sleep(self.delay).await;
            self.events.lock().push((name.clone(), false));
            if self.fail.contains(&name) {
                return Ok(NodeOutput::diagnostics(Diagnostic::error("failed", name)));
            }
            Ok(NodeOutput::value(node.address().clone(), Value::string(name)))
        }
    }

    /// a <- b <- d, a <- c <- d
    fn diamond() -> (Arc<FrozenGraph>, [NodeId; 4]) {
        let mut graph = Graph::new();
        let a = graph.add_node(var("a"));
        let b = graph.add_node(var("b"));
        let c = graph.add_node(var("c"));
        let d = graph.add_node(var("d"));
        for (consumer, provider) in [(b, a), (c, a), (d, b), (d, c)] {
            graph.add_dependency(consumer, provider).expect("edge");
        }
        (Arc::new(graph.freeze().expect("acyclic")), [a, b, c, d])
    }

    #[tokio::test]
    async fn test_dependencies_finish_before_dependents_start() {
        let (graph, _) = diamond();
        let recorder = Arc::new(Recorder {
            delay: Duration::from_millis(5),
            ..Recorder::default()
        });
        let values = Arc::new(WalkValues::new());
        let report = Walker::new(4)
            .walk(Arc::clone(&graph), recorder.clone(), Arc::clone(&values))
            .await
            .expect("walk");

        assert!(report.is_success());
        assert_eq!(report.completed.len(), 4);
        let events = recorder.events.lock().clone();
        let pos = |name: &str, start: bool| events.iter().position(|e| e.0 == name && e.1 == start).expect("event");
        for (id, node) in graph.nodes() {
            for dep in graph.dependencies(id) {
                let dep = graph.node(dep).expect("dep").name();
                assert!(pos(&dep, false) < pos(&node.name(), true), "{dep} must finish before {node}");
            }
        }
        assert_eq!(values.get(&Address::root_variable("d")), Some(Value::string("var.d")));
    }

    #[tokio::test]
    async fn test_failure_skips_downstream() {
        let (graph, [a, b, c, d]) = diamond();
        let recorder = Arc::new(Recorder {
            fail: BTreeSet::from([String::from("var.b")]),
            ..Recorder::default()
        });
        let report = Walker::new(2)
            .walk(graph, recorder, Arc::new(WalkValues::new()))
            .await
            .expect("walk");

        assert_eq!(report.failed, vec![b]);
        assert_eq!(report.skipped, BTreeMap::from([(d, b)]));
        assert!(report.completed.contains(&a));
        assert!(report.completed.contains(&c));
        assert!(report.diagnostics.has_errors());
    }

    #[tokio::test]
    async fn test_fatal_error_aborts() {
        let (graph, _) = diamond();
        let recorder = Arc::new(Recorder {
            fatal: BTreeSet::from([String::from("var.a")]),
            ..Recorder::default()
        });
        let err = Walker::new(2)
            .walk(graph, recorder, Arc::new(WalkValues::new()))
            .await
            .expect_err("fatal");
        assert!(matches!(err, WalkError::Fatal { node, .. } if node == "var.a"));
    }

    #[tokio::test]
    async fn test_cancelled_walk_is_interrupted() {
        let (graph, [a, ..]) = diamond();
        let recorder = Arc::new(Recorder::default());
        let walker = Walker::new(1);
        walker.cancellation().cancel();
        let report = walker
            .walk(graph, recorder, Arc::new(WalkValues::new()))
            .await
            .expect("walk");

        assert!(report.interrupted);
        assert!(!report.is_success());
        assert!(report.completed.len() <= 1);
        assert!(report.completed.iter().all(|id| *id == a));
    }

    #[tokio::test]
    async fn test_contributions_reach_sink() {
        struct Contributor;

        #[async_trait]
        impl NodeExecutor for Contributor {
            async fn execute(&self, node: &Node, _values: &WalkValues) -> Result<NodeOutput, WalkError> {
                Ok(NodeOutput {
                    contributions: vec![Contribution::Object(node.address().clone())],
                    ..NodeOutput::default()
                })
            }
        }

        let (graph, _) = diamond();
        let sink = Arc::new(ChangesSync::new());
        Walker::new(3)
            .with_sink(Arc::clone(&sink))
            .walk(graph, Arc::new(Contributor), Arc::new(WalkValues::new()))
            .await
            .expect("walk");
        assert_eq!(sink.take_collected().objects.len(), 4);
    }
}
