use std::fmt::Display;
use std::fs;
use std::io;
use std::sync::LazyLock;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use console::Style;
use indicatif::ProgressStyle;

use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::tasks::lint::Linter;
use crate::tasks::prefix::Targets;

const ANSI_BLUE: Style = Style::new().blue();

static STYLE_TASK: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed}] {msg}")
        .expect("Error setting progress bar template")
});

static STYLE_RUN: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .expect("Error setting progress bar template")
        .progress_chars("=>-")
});

pub(crate) fn get_style_task() -> ProgressStyle {
    STYLE_TASK.clone()
}

pub(crate) fn get_style_run() -> ProgressStyle {
    STYLE_RUN.clone()
}

pub(crate) fn as_overhead(s: Instant) -> impl Display {
    let f = format!("(+{}ms)", s.elapsed().as_millis());
    ANSI_BLUE.apply_to(f)
}

/// A 32-byte BLAKE3 hash of an artifact, used to skip rewriting files whose
/// content did not change.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub(crate) fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub(crate) fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for byte in self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

/// Writes `data` to `path` through a temporary sibling file and a rename, so
/// readers see either the old or the new content. Returns `false` when the
/// file already held identical bytes and nothing was written.
pub(crate) fn write_atomic(path: &Utf8Path, data: &[u8]) -> io::Result<bool> {
    let hash = Hash32::hash(data);

    if let Ok(existing) = fs::read(path)
        && Hash32::hash(&existing) == hash
    {
        return Ok(false);
    }

    let dir = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir.to_path_buf(),
        _ => Utf8PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let name = path.file_name().unwrap_or("artifact");
    let temp = dir.join(format!(".{name}.{}.tmp", &hash.to_hex()[..12]));

    fs::write(&temp, data)?;
    if let Err(e) = fs::rename(&temp, path) {
        fs::remove_file(&temp).ok();
        return Err(e);
    }

    Ok(true)
}

/// Shared, validated state available to every task.
pub struct Environment {
    pub config: PipelineConfig,
    pub(crate) targets: Targets,
    pub(crate) linter: Linter,
}

impl Environment {
    /// Validates the configuration and prepares the derived settings.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        let targets = Targets::parse(&config.autoprefix)?;
        let linter = Linter::new(&config.lint)?;

        for pattern in config
            .lint_sources
            .iter()
            .chain(&config.lint_exclude)
            .chain(&config.watch)
        {
            glob::Pattern::new(pattern)?;
        }

        Ok(Self {
            config,
            targets,
            linter,
        })
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.config)
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

/// The context passed to every task action.
pub struct TaskContext<'a> {
    /// Configuration and derived settings.
    pub env: &'a Environment,
    /// Name of the running task.
    pub name: &'a str,
}

impl TaskContext<'_> {
    pub fn config(&self) -> &PipelineConfig {
        &self.env.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex_is_stable() {
        let a = Hash32::hash(b"body { color: red; }");
        let b = Hash32::hash(b"body { color: red; }");
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
        assert_ne!(a, Hash32::hash(b"body { color: blue; }"));
    }

    #[test]
    fn test_write_atomic_skips_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("nested/style.css")).unwrap();

        assert!(write_atomic(&path, b"a{}").unwrap());
        assert!(!write_atomic(&path, b"a{}").unwrap());
        assert!(write_atomic(&path, b"b{}").unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"b{}");

        // no temporary files are left behind
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_environment_rejects_bad_query() {
        let config = PipelineConfig {
            autoprefix: vec!["> 1%".into()],
            ..Default::default()
        };
        assert!(matches!(
            Environment::new(config),
            Err(ConfigError::Query(_))
        ));
    }
}
