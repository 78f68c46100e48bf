// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;

use crate::types::TaskName;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct dependencies: tasks that must succeed before this one can run.
    deps: Vec<TaskName>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskName>,
}

/// In-memory dependency graph of one workflow, keyed by task id.
///
/// Built through [`DagGraph::build`], which rejects unknown dependencies and
/// cycles, so every `DagGraph` in circulation is acyclic.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: HashMap<TaskName, DagNode>,
    /// Task ids in declaration order.
    order: Vec<TaskName>,
}

/// Why a graph could not be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    UnknownDependency { task: TaskName, dependency: TaskName },
    /// Task ids forming a cycle (a single id for a self-dependency).
    Cycle(Vec<TaskName>),
}

impl DagGraph {
    /// Build the graph from `(task, dependencies)` pairs in declaration order.
    ///
    /// Task ids are assumed unique; duplicate detection happens earlier.
    pub fn build<'a, I, D>(tasks: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = (&'a str, D)>,
        D: IntoIterator<Item = &'a str>,
    {
        let mut nodes: HashMap<TaskName, DagNode> = HashMap::new();
        let mut order = Vec::new();

        for (name, deps) in tasks {
            order.push(name.to_string());
            nodes.insert(
                name.to_string(),
                DagNode {
                    deps: deps.into_iter().map(str::to_string).collect(),
                    dependents: Vec::new(),
                },
            );
        }

        // Second pass: populate dependents based on deps.
        for name in order.iter() {
            let deps = nodes.get(name).map(|n| n.deps.clone()).unwrap_or_default();
            for dep in deps {
                match nodes.get_mut(&dep) {
                    Some(dep_node) => dep_node.dependents.push(name.clone()),
                    None => {
                        return Err(GraphError::UnknownDependency {
                            task: name.clone(),
                            dependency: dep,
                        });
                    }
                }
            }
        }

        let graph = Self { nodes, order };
        graph.check_acyclic()?;
        Ok(graph)
    }

    fn check_acyclic(&self) -> Result<(), GraphError> {
        // Edge direction: dep -> task.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.order.iter() {
            graph.add_node(name.as_str());
        }
        for name in self.order.iter() {
            for dep in self.dependencies_of(name) {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        if toposort(&graph, None).is_ok() {
            return Ok(());
        }

        // Name the offending cycle: the first strongly connected component
        // that has more than one member or a self-loop.
        let cycle = tarjan_scc(&graph)
            .into_iter()
            .find(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .unwrap_or_default();

        let members: HashSet<&str> = cycle.into_iter().collect();
        let named = self
            .order
            .iter()
            .filter(|name| members.contains(name.as_str()))
            .cloned()
            .collect();

        Err(GraphError::Cycle(named))
    }

    /// All task ids in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Every task reachable from `name` through dependent edges, excluding
    /// `name` itself, in breadth-first order.
    pub fn downstream_of(&self, name: &str) -> Vec<TaskName> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        let mut frontier: Vec<&str> = vec![name];

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for current in frontier {
                for dependent in self.dependents_of(current) {
                    if seen.insert(dependent.as_str()) {
                        out.push(dependent.clone());
                        next.push(dependent.as_str());
                    }
                }
            }
            frontier = next;
        }

        out
    }

    /// Tasks without dependencies.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.tasks()
            .filter(|name| self.dependencies_of(name).is_empty())
    }
}
