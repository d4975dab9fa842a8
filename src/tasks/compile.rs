use std::path::Path;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use grass::OutputStyle;

use crate::config::SourceMapMode;
use crate::core::{TaskContext, write_atomic};
use crate::engine::{Report, TaskResult};
use crate::error::TaskError;
use crate::tasks::prefix::{self, lines_to_string};
use crate::tasks::sourcemap::{Source, SourceMap, SourceMapBuilder};

/// Filesystem handed to grass which remembers every stylesheet it reads.
#[derive(Debug, Default)]
struct RecordingFs {
    read: Mutex<Vec<Source>>,
}

impl RecordingFs {
    fn into_sources(self) -> Vec<Source> {
        self.read.into_inner().unwrap_or_default()
    }
}

impl grass::Fs for RecordingFs {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        let data = std::fs::read(path)?;

        let path = Utf8PathBuf::from_path_buf(path.to_path_buf())
            .unwrap_or_else(|path| Utf8PathBuf::from(path.to_string_lossy().into_owned()));
        let content = String::from_utf8_lossy(&data).into_owned();

        if let Ok(mut read) = self.read.lock() {
            read.push(Source { path, content });
        }

        Ok(data)
    }
}

/// Compiles the entry stylesheet, prefixes it and writes it together with its
/// sourcemap. Nothing is written when compilation fails.
pub(crate) fn compile(ctx: &TaskContext) -> TaskResult {
    let config = ctx.config();
    let entry = config.resolve(&config.entry);
    let output = config.resolve(&config.output);

    if !entry.is_file() {
        return Err(TaskError::MissingEntry(entry));
    }

    let file_name = output.file_name().unwrap_or("style.css").to_string();
    let mut map = match config.sourcemap {
        SourceMapMode::None => None,
        _ => Some(SourceMapBuilder::new(file_name.clone(), &config.root)),
    };

    let fs = RecordingFs::default();
    let mut options = grass::Options::default()
        .style(OutputStyle::Expanded)
        .fs(&fs);

    for include in &config.include_paths {
        let path = config.resolve(include);
        if path.is_dir() {
            options = options.load_path(path);
        } else {
            tracing::warn!("include path {} does not exist, skipping", path);
        }
    }

    let css = grass::from_path(&entry, &options)?;
    drop(options);

    let sources = fs.into_sources();
    let processed = sources.len();
    tracing::debug!("compiled {} from {} stylesheet(s)", entry, processed);

    if let Some(map) = &mut map {
        map.add_sources(sources);
    }

    let lines = prefix::prefix(&css, ctx.env.targets);
    let mut text = lines_to_string(&lines);
    let mut artifacts = vec![output.clone()];

    if let Some(map) = map {
        let map = map.finalize(&css, &lines)?;

        match config.sourcemap {
            SourceMapMode::File => {
                let map_name = format!("{file_name}.map");
                let map_path = output.with_file_name(&map_name);
                write_atomic(&map_path, map.as_json().as_bytes())?;
                text.push_str(&SourceMap::file_comment(&map_name));
                artifacts.push(map_path);
            }
            _ => text.push_str(&map.inline_comment()),
        }
        text.push('\n');
    }

    if write_atomic(&output, text.as_bytes())? {
        tracing::info!("wrote {}", output);
    } else {
        tracing::info!("{} is up to date", output);
    }

    Ok(Report {
        artifacts,
        processed,
        ..Default::default()
    })
}
