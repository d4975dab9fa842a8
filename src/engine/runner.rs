mod diagnostics;
#[cfg(feature = "live")]
mod watch;

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError, channel};
use std::time::{Duration, Instant};

use petgraph::graph::NodeIndex;
use rayon::{Scope, Yield};
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::core::{Environment, TaskContext, as_overhead, get_style_run, get_style_task};
use crate::engine::{Report, TaskGraph};
use crate::error::{RunError, TaskError};
use crate::notice::Notifier;

#[cfg(feature = "live")]
pub(crate) use watch::watch;

pub use diagnostics::Diagnostics;

#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
}

/// Outcome of a successful run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Reports in completion order.
    pub reports: Vec<(String, Report)>,
    pub diagnostics: Diagnostics,
}

impl RunSummary {
    pub fn report(&self, name: &str) -> Option<&Report> {
        self.reports
            .iter()
            .find(|(task, _)| task == name)
            .map(|(_, report)| report)
    }
}

type Completion = (NodeIndex, Result<Report, TaskError>, Instant, Duration);

/// Executes the selected part of the task graph on the rayon pool.
///
/// A task is dispatched once every prerequisite in `nodes_to_run` has
/// returned from its action, so a dependent never observes a prerequisite
/// that is still writing its output.
///
/// 1. Tasks with no pending prerequisites are spawned.
/// 2. The calling thread waits on a channel for completions.
/// 3. Each successful completion decrements the counters of its dependents,
///    and a dependent whose counter reaches zero is spawned.
/// 4. The first failure stops dispatching. Tasks already in flight are still
///    awaited, then the failure is returned.
///
/// The scheduling loop stays on the calling thread and only the task actions
/// go to the pool, so a pool with a single worker still makes progress.
pub(crate) fn run_tasks_parallel(
    site: &TaskGraph,
    env: &Environment,
    nodes_to_run: &HashSet<NodeIndex>,
    notifier: &dyn Notifier,
) -> Result<RunSummary, RunError> {
    rayon::in_place_scope(|s| schedule(s, site, env, nodes_to_run, notifier))
}

fn schedule<'scope>(
    s: &Scope<'scope>,
    site: &'scope TaskGraph,
    env: &'scope Environment,
    nodes_to_run: &HashSet<NodeIndex>,
    notifier: &dyn Notifier,
) -> Result<RunSummary, RunError> {
    let mut dependents: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
    for edge in site.graph.raw_edges() {
        dependents
            .entry(edge.source())
            .or_default()
            .push(edge.target());
    }

    // A dependency only counts if it's also in the set of nodes to run.
    let mut dependency_counts: HashMap<NodeIndex, usize> = nodes_to_run
        .iter()
        .map(|&i| {
            (
                i,
                site.graph
                    .neighbors_directed(i, petgraph::Direction::Incoming)
                    .filter(|dep| nodes_to_run.contains(dep))
                    .count(),
            )
        })
        .collect();

    let total_tasks = nodes_to_run.len();
    if total_tasks == 0 {
        return Ok(RunSummary::default());
    }

    let root_span = tracing::span!(Level::INFO, "running_tasks");
    root_span.pb_set_length(total_tasks as u64);
    root_span.pb_set_style(&get_style_run());
    root_span.pb_set_message("Running tasks...");
    let _enter = root_span.enter();

    let started = Instant::now();
    let pb_style = get_style_task();

    let mut summary = RunSummary::default();
    let mut failure: Option<(String, TaskError)> = None;

    let (result_sender, result_receiver) = channel::<Completion>();

    let spawn_task = |index: NodeIndex| {
        let task = &site.graph[index];
        let sender = result_sender.clone();
        let pb_style = pb_style.clone();

        s.spawn(move |_| {
            let span = tracing::span!(Level::INFO, "task", name = task.name());
            span.pb_set_style(&pb_style);
            span.pb_set_message(&format!("Running {}", task.name()));
            let _enter = span.enter();

            let context = TaskContext {
                env,
                name: task.name(),
            };

            let start_time = Instant::now();

            // A panicking action only owns its own buffers, the shared
            // state it sees is immutable.
            let output = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                task.execute(&context)
            })) {
                Ok(result) => result,
                Err(panic) => {
                    let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        String::from("unknown payload")
                    };

                    Err(TaskError::Panic(msg))
                }
            };

            let elapsed = start_time.elapsed();

            // The scheduler keeps the receiver alive until every spawned
            // task has reported back.
            let _ = sender.send((index, output, start_time, elapsed));
        });
    };

    let mut in_flight = 0usize;
    for &node_index in nodes_to_run {
        if dependency_counts.get(&node_index).copied().unwrap_or(0) == 0 {
            spawn_task(node_index);
            in_flight += 1;
        }
    }

    while in_flight > 0 {
        let Some((completed_index, output, start, duration)) = next_completion(&result_receiver)
        else {
            break;
        };
        in_flight -= 1;
        root_span.pb_inc(1);

        let name = site.graph[completed_index].name().to_string();
        summary
            .diagnostics
            .execution_times
            .insert(completed_index, TaskExecution { start, duration });

        let report = match output {
            Ok(report) => report,
            Err(err) => {
                tracing::error!("task '{}' failed after {:.2?}", name, duration);
                notifier.failure(&name, &err);
                failure.get_or_insert((name, err));
                continue;
            }
        };

        tracing::info!("finished '{}' after {:.2?}", name, duration);
        if let Some(notice) = &report.notice {
            notifier.notice(&name, notice);
        }
        summary.reports.push((name, report));

        if failure.is_some() {
            continue;
        }

        if let Some(dependents_of_completed) = dependents.get(&completed_index) {
            for &index in dependents_of_completed {
                if let Some(count) = dependency_counts.get_mut(&index) {
                    *count -= 1;
                    if *count == 0 {
                        spawn_task(index);
                        in_flight += 1;
                    }
                }
            }
        }
    }

    if let Some((name, err)) = failure {
        return Err(RunError::Task(name, err));
    }

    tracing::info!("run complete {}", as_overhead(started));
    Ok(summary)
}

/// Waits for the next finished task.
///
/// Outside the pool this simply blocks. On a pool worker the wait runs
/// queued jobs instead, since the job being waited for may be queued behind
/// this very thread.
fn next_completion(rx: &Receiver<Completion>) -> Option<Completion> {
    loop {
        match rx.try_recv() {
            Ok(completion) => return Some(completion),
            Err(TryRecvError::Disconnected) => return None,
            Err(TryRecvError::Empty) => {}
        }

        match rayon::yield_now() {
            None => return rx.recv().ok(),
            Some(Yield::Executed) => {}
            Some(Yield::Idle) => match rx.recv_timeout(Duration::from_millis(1)) {
                Ok(completion) => return Some(completion),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return None,
            },
        }
    }
}
