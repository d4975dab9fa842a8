use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use console::style;

use camber::{Diagnostics, Pipeline, PipelineConfig, tasks};

/// Builds the theme stylesheet.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Task to run: postcss, css:minify, sass:lint, styles or watch.
    #[arg(default_value = tasks::STYLES)]
    task: String,

    /// Project root, every configured path is relative to it.
    #[arg(long, default_value = ".")]
    root: Utf8PathBuf,

    /// Configuration file [default: <root>/camber.toml when present].
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    /// Print the available tasks and exit.
    #[arg(long)]
    list: bool,

    /// Print the task graph as a Mermaid diagram and exit.
    #[arg(long)]
    graph: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    #[cfg(feature = "logging")]
    camber::init_logging()?;

    let config = PipelineConfig::load(&args.root, args.config.as_deref())?;
    let pipeline = Pipeline::new(config)?;

    if args.list {
        for name in pipeline.task_names() {
            println!("{name}");
        }
        return Ok(());
    }

    if args.graph {
        print!("{}", Diagnostics::default().render_mermaid(pipeline.graph()));
        return Ok(());
    }

    if args.task == tasks::WATCH {
        return watch(&pipeline);
    }

    let summary = pipeline.run(&args.task)?;
    tracing::info!(
        "'{}' done, {} task(s) busy for {:.2?}",
        args.task,
        summary.reports.len(),
        summary.diagnostics.busy()
    );

    Ok(())
}

#[cfg(feature = "live")]
fn watch(pipeline: &Pipeline) -> anyhow::Result<()> {
    pipeline.watch()?;
    Ok(())
}

#[cfg(not(feature = "live"))]
fn watch(_: &Pipeline) -> anyhow::Result<()> {
    anyhow::bail!("'{}' needs camber built with the 'live' feature", tasks::WATCH)
}
