//! Explicit task graph for the answering pipeline.
//!
//! Stages are nodes with declared dependencies. The scheduler snapshots
//! the shared [`AgentState`] for each ready node, runs ready nodes
//! concurrently on a [`JoinSet`], and merges the typed [`StateUpdate`]s a
//! node returns before unblocking its dependents. Joins (the aggregate
//! barrier) fall out of the dependency edges.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use tokio::task::JoinSet;

use crate::agent::{AgentState, StateUpdate};

pub type NodeFuture = Pin<Box<dyn Future<Output = Result<Vec<StateUpdate>>> + Send>>;

struct TaskNode {
    name: &'static str,
    deps: Vec<&'static str>,
    run: Box<dyn Fn(AgentState) -> NodeFuture + Send>,
}

/// A directed acyclic graph of pipeline stages.
#[derive(Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage. `deps` name the stages whose updates must be merged
    /// into the state before this one runs.
    pub fn add_node<F>(&mut self, name: &'static str, deps: &[&'static str], run: F)
    where
        F: Fn(AgentState) -> NodeFuture + Send + 'static,
    {
        self.nodes.push(TaskNode {
            name,
            deps: deps.to_vec(),
            run: Box::new(run),
        });
    }

    /// Execute the graph to completion, returning the final merged state.
    /// Fails on unknown dependencies, cycles, or any node error.
    pub async fn run(self, mut state: AgentState) -> Result<AgentState> {
        let names: HashSet<&str> = self.nodes.iter().map(|n| n.name).collect();
        if names.len() != self.nodes.len() {
            bail!("Task graph has duplicate node names");
        }
        for node in &self.nodes {
            for dep in &node.deps {
                if !names.contains(dep) {
                    bail!("Node '{}' depends on unknown node '{dep}'", node.name);
                }
            }
        }

        let mut waiting = self.nodes;
        let mut finished: HashSet<&'static str> = HashSet::new();
        let mut running: JoinSet<(&'static str, Result<Vec<StateUpdate>>)> = JoinSet::new();

        loop {
            // Launch every node whose dependencies are all satisfied.
            let (ready, blocked): (Vec<_>, Vec<_>) = waiting
                .into_iter()
                .partition(|n| n.deps.iter().all(|d| finished.contains(d)));
            waiting = blocked;

            for node in ready {
                let future = (node.run)(state.clone());
                let name = node.name;
                running.spawn(async move { (name, future.await) });
            }

            if running.is_empty() {
                if waiting.is_empty() {
                    return Ok(state);
                }
                let stuck: Vec<&str> = waiting.iter().map(|n| n.name).collect();
                bail!("Task graph contains a cycle among: {stuck:?}");
            }

            let (name, result) = running
                .join_next()
                .await
                .expect("join_next on non-empty set")
                .context("Pipeline stage panicked")?;
            let updates = result.with_context(|| format!("Stage '{name}' failed"))?;
            for update in updates {
                state.apply(update);
            }
            finished.insert(name);
        }
    }
}
