use std::collections::HashMap;
use std::fmt::Write;

use petgraph::graph::NodeIndex;

use crate::engine::TaskGraph;
use crate::engine::TaskExecution;

/// Run diagnostics and performance metrics.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// A map of task node indices to their execution metrics.
    pub execution_times: HashMap<NodeIndex, TaskExecution>,
}

impl Diagnostics {
    /// Total wall time spent inside task actions.
    pub fn busy(&self) -> std::time::Duration {
        self.execution_times.values().map(|t| t.duration).sum()
    }

    /// Renders the task graph as a Mermaid diagram, color-coded by execution duration.
    ///
    /// * **Green**: Fast
    /// * **Yellow**: Moderate
    /// * **Red**: Slow
    /// * **Grey**: Not part of the run
    pub fn render_mermaid(&self, graph: &TaskGraph) -> String {
        let mut f = String::new();
        // writing into a String cannot fail
        let _ = self.write_mermaid(&mut f, graph);
        f
    }

    fn write_mermaid(&self, f: &mut String, graph: &TaskGraph) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        let times = &self.execution_times;
        let mut min_time = f64::MAX;
        let mut max_time = f64::MIN;

        for t in times.values() {
            let secs = t.duration.as_secs_f64();
            min_time = min_time.min(secs);
            max_time = max_time.max(secs);
        }

        if min_time > max_time {
            // No tasks ran
            min_time = 0.0;
            max_time = 0.0;
        }

        // Avoid divide by zero if all tasks took same time
        if (max_time - min_time).abs() < f64::EPSILON {
            max_time = min_time + 1.0;
        }

        for index in graph.graph.node_indices() {
            let task = &graph.graph[index];
            let name = task.name().replace('"', "\\\"");

            let (label_extra, color_code) = if let Some(exec) = times.get(&index) {
                let duration = exec.duration;
                let t = (duration.as_secs_f64() - min_time) / (max_time - min_time);

                // 0.0 (Green) -> 0.5 (Yellow) -> 1.0 (Red)
                let (r, g, b) = if t < 0.5 {
                    ((255.0 * t * 2.0) as u8, 255, 0)
                } else {
                    (255, (255.0 * (1.0 - (t - 0.5) * 2.0)) as u8, 0)
                };

                (
                    format!("{:.2?}", duration),
                    format!("#{:02X}{:02X}{:02X}", r, g, b),
                )
            } else {
                ("skipped".to_string(), "#D3D3D3".to_string())
            };

            writeln!(f, "    {}[\"{}\\n{}\"]", index.index(), name, label_extra)?;
            writeln!(f, "    style {} fill:{}", index.index(), color_code)?;
        }

        for edge in graph.graph.raw_edges() {
            writeln!(
                f,
                "    {} --> {}",
                edge.source().index(),
                edge.target().index()
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::engine::{Blueprint, Report};

    #[test]
    fn test_render_mermaid_marks_skipped_tasks() {
        let mut blueprint = Blueprint::new();
        blueprint.task("postcss").run(|_| Ok(Report::default()));
        blueprint.task("css:minify").after(["postcss"]).run(|_| Ok(Report::default()));
        let graph = blueprint.finish().unwrap();

        let mut diagnostics = Diagnostics::default();
        diagnostics.execution_times.insert(
            graph.lookup("postcss").unwrap(),
            TaskExecution {
                start: Instant::now(),
                duration: Duration::from_millis(3),
            },
        );

        let out = diagnostics.render_mermaid(&graph);
        assert!(out.starts_with("graph LR\n"));
        assert!(out.contains("[\"css:minify\\nskipped\"]"));
        assert!(out.contains("fill:#D3D3D3"));
        assert!(out.contains("0 --> 1"));
        assert_eq!(diagnostics.busy(), Duration::from_millis(3));
    }
}
