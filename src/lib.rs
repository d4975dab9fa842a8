#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod config;
mod core;
pub mod engine;
mod error;
#[cfg(feature = "logging")]
mod logging;
pub mod notice;
pub mod tasks;

pub use crate::config::{CONFIG_FILE_NAME, LintConfig, PipelineConfig, SourceMapMode};
pub use crate::core::{Environment, TaskContext};
pub use crate::engine::{Blueprint, Diagnostics, Report, RunSummary, TaskGraph};
pub use crate::error::*;
#[cfg(feature = "logging")]
pub use crate::logging::init_logging;
pub use crate::notice::{MemoryNotifier, Notification, Notifier, TerminalNotifier};
pub use crate::tasks::lint::{Linter, Severity, Violation};

/// The stylesheet pipeline: a validated configuration, the task graph built
/// from it and the notifier that hears about finished and failed tasks.
///
/// ```no_run
/// use camber::{Pipeline, PipelineConfig};
///
/// let pipeline = Pipeline::new(PipelineConfig::default())?;
/// let summary = pipeline.run("styles")?;
/// println!("{} task(s) finished", summary.reports.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Pipeline {
    env: Environment,
    graph: TaskGraph,
    notifier: Box<dyn Notifier>,
}

impl Pipeline {
    /// Builds the standard `postcss` -> `css:minify` -> `sass:lint` ->
    /// `styles` chain.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::from_blueprint(config, tasks::blueprint())
    }

    /// Builds a pipeline around a custom set of tasks.
    pub fn from_blueprint(config: PipelineConfig, blueprint: Blueprint) -> Result<Self, PipelineError> {
        let env = Environment::new(config)?;
        let graph = blueprint.finish()?;

        Ok(Self {
            env,
            graph,
            notifier: Box::new(TerminalNotifier::default()),
        })
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.env.config
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Every task that can be invoked by name, in execution order.
    pub fn task_names(&self) -> Vec<&str> {
        let watch = cfg!(feature = "live").then_some(tasks::WATCH);
        self.graph.names().into_iter().chain(watch).collect()
    }

    /// Runs `target` and everything it depends on.
    pub fn run(&self, target: &str) -> Result<RunSummary, RunError> {
        let plan = self.graph.plan(target)?;
        tracing::info!("running '{}' ({} task(s))", target, plan.len());

        engine::run_tasks_parallel(&self.graph, &self.env, &plan, self.notifier.as_ref())
    }

    /// Runs `styles` once, then again whenever a watched file changes. Only
    /// returns when the watcher itself breaks down.
    #[cfg(feature = "live")]
    pub fn watch(&self) -> Result<(), WatchError> {
        engine::watch(self)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("env", &self.env)
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}
