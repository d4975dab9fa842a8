//! Declarative task graph.
//!
//! Tasks are declared on a [`Blueprint`] by name, together with the names of
//! the tasks they depend on. Declaration order does not matter; the names are
//! resolved when the blueprint is turned into a [`TaskGraph`], which is where
//! duplicates, dangling prerequisites and cycles are rejected.

mod runner;

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;

use camino::Utf8PathBuf;
use petgraph::Graph;
use petgraph::graph::NodeIndex;
use petgraph::visit::{Dfs, Reversed};

use crate::core::TaskContext;
use crate::error::{GraphError, TaskError};

pub(crate) use runner::run_tasks_parallel;
pub use runner::{Diagnostics, RunSummary, TaskExecution};
#[cfg(feature = "live")]
pub(crate) use runner::watch;

/// What a finished task hands back to the runner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Files written by the task.
    pub artifacts: Vec<Utf8PathBuf>,
    /// Number of input files the task processed.
    pub processed: usize,
    /// Non-fatal problems, e.g. lint warnings.
    pub warnings: usize,
    /// Message for the developer, delivered through the notifier.
    pub notice: Option<String>,
}

/// Result from a single executed task.
pub type TaskResult = Result<Report, TaskError>;

type ActionPtr = Arc<dyn Fn(&TaskContext) -> TaskResult + Send + Sync>;

/// A node in the task graph.
pub struct Task {
    name: String,
    prerequisites: Vec<String>,
    /// `None` for aggregation tasks which only exist to group their
    /// prerequisites behind one name.
    action: Option<ActionPtr>,
}

impl Task {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prerequisites(&self) -> &[String] {
        &self.prerequisites
    }

    pub fn is_aggregate(&self) -> bool {
        self.action.is_none()
    }

    pub(crate) fn execute(&self, ctx: &TaskContext) -> TaskResult {
        match &self.action {
            Some(action) => action(ctx),
            None => Ok(Report::default()),
        }
    }
}

impl Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task({}, after: {:?})", self.name, self.prerequisites)
    }
}

/// The blueprint of a build.
///
/// # Example
///
/// ```rust
/// use camber::engine::{Blueprint, Report};
///
/// let mut blueprint = Blueprint::new();
/// blueprint.task("compile").run(|_| Ok(Report::default()));
/// blueprint.task("all").after(["compile"]).group();
///
/// let graph = blueprint.finish().unwrap();
/// assert_eq!(graph.names(), vec!["compile", "all"]);
/// ```
#[derive(Default)]
pub struct Blueprint {
    tasks: Vec<Task>,
}

impl Blueprint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts declaring a task called `name`.
    pub fn task(&mut self, name: impl Into<String>) -> TaskBuilder<'_> {
        TaskBuilder {
            blueprint: self,
            name: name.into(),
            prerequisites: Vec::new(),
        }
    }

    /// Resolves task names into a graph.
    pub fn finish(self) -> Result<TaskGraph, GraphError> {
        let mut graph = Graph::new();
        let mut index = HashMap::new();

        for task in self.tasks {
            let name = task.name.clone();
            if index.contains_key(&name) {
                return Err(GraphError::Duplicate(name));
            }
            index.insert(name, graph.add_node(task));
        }

        let mut edges = Vec::new();
        for target in graph.node_indices() {
            let task: &Task = &graph[target];
            for prerequisite in &task.prerequisites {
                let Some(&source) = index.get(prerequisite) else {
                    return Err(GraphError::UnknownPrerequisite {
                        task: task.name.clone(),
                        prerequisite: prerequisite.clone(),
                    });
                };
                edges.push((source, target));
            }
        }

        for (source, target) in edges {
            graph.update_edge(source, target, ());
        }

        let order = petgraph::algo::toposort(&graph, None)
            .map_err(|cycle| GraphError::Cycle(graph[cycle.node_id()].name.clone()))?;

        Ok(TaskGraph {
            graph,
            index,
            order,
        })
    }
}

/// Declares a single task; finish with [`TaskBuilder::run`] or
/// [`TaskBuilder::group`].
pub struct TaskBuilder<'a> {
    blueprint: &'a mut Blueprint,
    name: String,
    prerequisites: Vec<String>,
}

impl TaskBuilder<'_> {
    /// Tasks which must complete before this one starts.
    pub fn after<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites
            .extend(prerequisites.into_iter().map(Into::into));
        self
    }

    /// Registers the task with an action.
    pub fn run<F>(self, action: F)
    where
        F: Fn(&TaskContext) -> TaskResult + Send + Sync + 'static,
    {
        self.push(Some(Arc::new(action)));
    }

    /// Registers the task as a pure aggregation of its prerequisites.
    pub fn group(self) {
        self.push(None);
    }

    fn push(self, action: Option<ActionPtr>) {
        self.blueprint.tasks.push(Task {
            name: self.name,
            prerequisites: self.prerequisites,
            action,
        });
    }
}

/// A validated, acyclic task graph. Edges point from a prerequisite to the
/// task that depends on it.
pub struct TaskGraph {
    pub(crate) graph: Graph<Task, ()>,
    index: HashMap<String, NodeIndex>,
    order: Vec<NodeIndex>,
}

impl TaskGraph {
    /// Task names in a valid execution order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.graph[i].name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.index.get(name).map(|&i| &self.graph[i])
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<NodeIndex, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTask(name.to_string()))
    }

    /// Returns `target` together with everything it transitively depends on.
    pub fn plan(&self, target: &str) -> Result<HashSet<NodeIndex>, GraphError> {
        let start = self.lookup(target)?;
        let reversed = Reversed(&self.graph);

        let mut plan = HashSet::new();
        let mut dfs = Dfs::new(reversed, start);
        while let Some(nx) = dfs.next(reversed) {
            plan.insert(nx);
        }

        Ok(plan)
    }
}

impl Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.order.iter().map(|&i| &self.graph[i]))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &TaskContext) -> TaskResult {
        Ok(Report::default())
    }

    fn chain() -> TaskGraph {
        let mut blueprint = Blueprint::new();
        // declared out of order on purpose
        blueprint.task("styles").after(["lint"]).group();
        blueprint.task("lint").after(["minify"]).run(noop);
        blueprint.task("compile").run(noop);
        blueprint.task("minify").after(["compile"]).run(noop);
        blueprint.task("unrelated").run(noop);
        blueprint.finish().unwrap()
    }

    fn plan_names(graph: &TaskGraph, target: &str) -> Vec<String> {
        let mut names: Vec<_> = graph
            .plan(target)
            .unwrap()
            .into_iter()
            .map(|i| graph.graph[i].name().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_order_respects_prerequisites() {
        let graph = chain();
        let names = graph.names();
        let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();

        assert!(pos("compile") < pos("minify"));
        assert!(pos("minify") < pos("lint"));
        assert!(pos("lint") < pos("styles"));
    }

    #[test]
    fn test_plan_includes_transitive_prerequisites_only() {
        let graph = chain();
        assert_eq!(
            plan_names(&graph, "styles"),
            vec!["compile", "lint", "minify", "styles"]
        );
        assert_eq!(plan_names(&graph, "minify"), vec!["compile", "minify"]);
        assert_eq!(plan_names(&graph, "compile"), vec!["compile"]);
    }

    #[test]
    fn test_plan_unknown_target() {
        let graph = chain();
        assert!(matches!(graph.plan("nope"), Err(GraphError::UnknownTask(_))));
    }

    #[test]
    fn test_aggregate_task() {
        let graph = chain();
        assert!(graph.get("styles").unwrap().is_aggregate());
        assert!(!graph.get("lint").unwrap().is_aggregate());
        assert_eq!(graph.get("lint").unwrap().prerequisites(), ["minify"]);
    }

    #[test]
    fn test_duplicate_task() {
        let mut blueprint = Blueprint::new();
        blueprint.task("a").run(noop);
        blueprint.task("a").run(noop);
        assert!(matches!(blueprint.finish(), Err(GraphError::Duplicate(n)) if n == "a"));
    }

    #[test]
    fn test_unknown_prerequisite() {
        let mut blueprint = Blueprint::new();
        blueprint.task("a").after(["ghost"]).run(noop);
        assert!(matches!(
            blueprint.finish(),
            Err(GraphError::UnknownPrerequisite { prerequisite, .. }) if prerequisite == "ghost"
        ));
    }

    #[test]
    fn test_cycle() {
        let mut blueprint = Blueprint::new();
        blueprint.task("a").after(["b"]).run(noop);
        blueprint.task("b").after(["a"]).run(noop);
        assert!(matches!(blueprint.finish(), Err(GraphError::Cycle(_))));
    }
}
