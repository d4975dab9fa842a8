//! Pipeline configuration.
//!
//! Every path the pipeline touches comes from [`PipelineConfig`]. The record
//! can be built in code or read from `camber.toml` at the project root; keys
//! missing from the file keep the defaults below, which describe the theme
//! layout.

use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tasks::lint::Severity;

/// Name of the file looked up in the project root when no config path is given.
pub const CONFIG_FILE_NAME: &str = "camber.toml";

/// How the compile task attaches the sourcemap to its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapMode {
    /// Base64 data URL in a trailing comment.
    #[default]
    Inline,
    /// Companion `<output>.map` file referenced by a trailing comment.
    File,
    /// No sourcemap.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Project root, all other paths are relative to it.
    pub root: Utf8PathBuf,
    /// Sass entry stylesheet.
    pub entry: Utf8PathBuf,
    /// Extra Sass load paths (vendored mixin libraries).
    pub include_paths: Vec<Utf8PathBuf>,
    /// Expanded CSS output.
    pub output: Utf8PathBuf,
    /// Minified CSS output, never the same file as `output`.
    pub output_min: Utf8PathBuf,
    pub sourcemap: SourceMapMode,
    /// Globs selecting the Sass sources to lint.
    pub lint_sources: Vec<String>,
    /// Globs excluded from linting (vendored code).
    pub lint_exclude: Vec<String>,
    /// Globs watched in watch mode.
    pub watch: Vec<String>,
    /// Restrict minification to whitespace and comment removal.
    pub minify_safe: bool,
    /// Browser queries for vendor prefixing, e.g. `last 2 versions`.
    pub autoprefix: Vec<String>,
    /// Quiet period before a burst of file events triggers a rebuild.
    pub debounce_ms: u64,
    pub lint: LintConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from("."),
            entry: Utf8PathBuf::from("assets/sass/style.scss"),
            include_paths: vec![
                Utf8PathBuf::from("node_modules/bourbon/core"),
                Utf8PathBuf::from("node_modules/bourbon-neat/core"),
            ],
            output: Utf8PathBuf::from("style.css"),
            output_min: Utf8PathBuf::from("style.min.css"),
            sourcemap: SourceMapMode::default(),
            lint_sources: vec!["assets/sass/**/*.scss".into()],
            lint_exclude: vec![
                "assets/sass/base/html5-reset/_normalize.scss".into(),
                "assets/sass/utilities/animate/**/*.*".into(),
            ],
            watch: vec!["assets/sass/**/*.scss".into()],
            minify_safe: true,
            autoprefix: vec!["last 2 versions".into()],
            debounce_ms: 250,
            lint: LintConfig::default(),
        }
    }
}

/// `[lint]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LintConfig {
    /// Severity overrides keyed by rule name.
    pub rules: BTreeMap<String, Severity>,
    /// Spaces per indentation level.
    pub indent: usize,
    /// Deepest allowed selector nesting, top level rules are depth 0.
    pub max_nesting_depth: usize,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            rules: BTreeMap::new(),
            indent: 2,
            max_nesting_depth: 3,
        }
    }
}

impl PipelineConfig {
    /// Loads the configuration for the project at `root`.
    ///
    /// An explicit `path` must exist. Without one, `camber.toml` in the root
    /// is used when present, otherwise the defaults. The `root` argument
    /// always wins over a `root` key in the file.
    pub fn load(root: &Utf8Path, path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let implicit = root.join(CONFIG_FILE_NAME);

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if implicit.is_file() => Self::from_file(&implicit)?,
            None => Self::default(),
        };

        config.root = match clean(root) {
            clean if clean.as_str().is_empty() => Utf8PathBuf::from("."),
            clean => clean,
        };
        Ok(config)
    }

    fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_owned(), e))?;
        Self::from_toml(&text).map_err(|e| ConfigError::Parse(path.to_owned(), e))
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Resolves a project-relative path against the root.
    pub fn resolve(&self, path: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        self.root.join(path)
    }

    /// The root the way glob spells the paths it yields, with every `.`
    /// component dropped. Empty for the current directory.
    pub(crate) fn glob_root(&self) -> Utf8PathBuf {
        clean(&self.root)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn clean(path: &Utf8Path) -> Utf8PathBuf {
    path.components()
        .filter(|c| !matches!(c, Utf8Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_theme_layout() {
        let config = PipelineConfig::default();
        assert_eq!(config.entry, "assets/sass/style.scss");
        assert_eq!(config.output, "style.css");
        assert_eq!(config.output_min, "style.min.css");
        assert_eq!(config.lint_exclude.len(), 2);
        assert!(config.minify_safe);
        assert_eq!(config.sourcemap, SourceMapMode::Inline);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            output = "dist/theme.css"
            sourcemap = "file"

            [lint]
            indent = 4

            [lint.rules]
            no-ids = "warning"
            "#,
        )
        .unwrap();

        assert_eq!(config.output, "dist/theme.css");
        assert_eq!(config.output_min, "style.min.css");
        assert_eq!(config.sourcemap, SourceMapMode::File);
        assert_eq!(config.lint.indent, 4);
        assert_eq!(config.lint.max_nesting_depth, 3);
        assert_eq!(config.lint.rules.get("no-ids"), Some(&Severity::Warning));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(PipelineConfig::from_toml("outptu = \"x.css\"").is_err());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        let config = PipelineConfig::load(root, None).unwrap();
        assert_eq!(config.root, root);
        assert_eq!(config.resolve("style.css"), root.join("style.css"));
    }

    #[test]
    fn test_load_reads_implicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        fs::write(root.join(CONFIG_FILE_NAME), "debounce_ms = 50\nroot = \"elsewhere\"\n").unwrap();

        let config = PipelineConfig::load(root, None).unwrap();
        assert_eq!(config.debounce(), Duration::from_millis(50));
        assert_eq!(config.root, root);
    }

    #[test]
    fn test_load_drops_current_dir_components() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let dotted = Utf8PathBuf::from(format!("{root}/./"));

        assert_eq!(PipelineConfig::load(&dotted, None).unwrap().root, root);
        assert_eq!(PipelineConfig::load(Utf8Path::new("./"), None).unwrap().root, ".");
    }

    #[test]
    fn test_glob_root() {
        let config = PipelineConfig {
            root: Utf8PathBuf::from("./theme/./sub"),
            ..Default::default()
        };
        assert_eq!(config.glob_root(), "theme/sub");
        assert_eq!(PipelineConfig::default().glob_root(), "");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        let missing = root.join("nope.toml");
        let err = PipelineConfig::load(root, Some(missing.as_path())).unwrap_err();
        assert!(matches!(err, ConfigError::Read(..)));
    }
}
