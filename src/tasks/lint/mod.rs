//! Sass lint gate.
//!
//! Only Sass sources are linted, never generated CSS. Every file is checked
//! and every violation logged before the task decides whether it failed.

mod rules;
mod source;

use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::LintConfig;
use crate::core::TaskContext;
use crate::engine::{Report, TaskResult};
use crate::error::{ConfigError, TaskError};

use self::rules::Rule;
use self::source::Stylesheet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Off,
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Off => "off",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub file: Utf8PathBuf,
    pub line: usize,
    pub column: usize,
    pub rule: &'static str,
    pub severity: Severity,
    pub message: String,
}

impl Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{} {} {} ({})",
            self.file, self.line, self.column, self.severity, self.message, self.rule
        )
    }
}

/// The configured rule set.
pub struct Linter {
    rules: Vec<(Box<dyn Rule>, Severity)>,
}

impl Linter {
    /// Builds the rule set, applying severity overrides. Overrides for rules
    /// that don't exist are rejected.
    pub fn new(config: &LintConfig) -> Result<Self, ConfigError> {
        let available = rules::all(config);

        if let Some(name) = config
            .rules
            .keys()
            .find(|name| !available.iter().any(|rule| rule.name() == name.as_str()))
        {
            return Err(ConfigError::UnknownRule(name.clone()));
        }

        let rules = available
            .into_iter()
            .map(|rule| {
                let severity = config
                    .rules
                    .get(rule.name())
                    .copied()
                    .unwrap_or_else(|| rule.default_severity());
                (rule, severity)
            })
            .filter(|(_, severity)| *severity != Severity::Off)
            .collect();

        Ok(Self { rules })
    }

    /// Names of the active rules.
    pub fn rules(&self) -> impl Iterator<Item = (&'static str, Severity)> + '_ {
        self.rules.iter().map(|(rule, severity)| (rule.name(), *severity))
    }

    /// Checks one file. Violations are ordered by position.
    pub fn check(&self, file: &Utf8Path, text: &str) -> Vec<Violation> {
        let sheet = Stylesheet::parse(text);
        let mut violations = Vec::new();

        for (rule, severity) in &self.rules {
            let mut findings = Vec::new();
            rule.check(&sheet, &mut findings);

            for finding in findings {
                let (line, column) = sheet.locate(finding.offset);
                violations.push(Violation {
                    file: file.to_owned(),
                    line,
                    column,
                    rule: rule.name(),
                    severity: *severity,
                    message: finding.message,
                });
            }
        }

        violations.sort_by(|a, b| (a.line, a.column, a.rule).cmp(&(b.line, b.column, b.rule)));
        violations
    }
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Sass files selected by `lint_sources` minus `lint_exclude`, sorted.
fn collect_sources(ctx: &TaskContext) -> Result<BTreeSet<Utf8PathBuf>, TaskError> {
    let config = ctx.config();
    let exclude = config
        .lint_exclude
        .iter()
        .map(|p| Pattern::new(p))
        .collect::<Result<Vec<_>, _>>()?;

    let root = config.glob_root();
    let escaped = Utf8PathBuf::from(Pattern::escape(root.as_str()));

    let mut files = BTreeSet::new();
    for pattern in &config.lint_sources {
        for entry in glob::glob(escaped.join(pattern).as_str())? {
            let path = Utf8PathBuf::try_from(entry?)?;
            let relative = path.strip_prefix(&root).unwrap_or(&path);

            if exclude
                .iter()
                .any(|p| p.matches_with(relative.as_str(), MATCH_OPTIONS))
            {
                tracing::debug!("not linting excluded {}", relative);
                continue;
            }

            files.insert(path);
        }
    }

    Ok(files)
}

pub(crate) fn lint(ctx: &TaskContext) -> TaskResult {
    let config = ctx.config();
    let files = collect_sources(ctx)?;
    let root = config.glob_root();

    let checked = files
        .par_iter()
        .map(|path| -> Result<Vec<Violation>, TaskError> {
            let text = fs::read_to_string(path)?;
            let relative = path.strip_prefix(&root).unwrap_or(path);
            Ok(ctx.env.linter.check(relative, &text))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut errors = 0;
    let mut warnings = 0;

    for violation in checked.iter().flatten() {
        match violation.severity {
            Severity::Error => {
                errors += 1;
                tracing::error!("{}", violation);
            }
            Severity::Warning => {
                warnings += 1;
                tracing::warn!("{}", violation);
            }
            Severity::Off => {}
        }
    }

    tracing::info!(
        "linted {} file(s), {} error(s), {} warning(s)",
        files.len(),
        errors,
        warnings
    );

    if errors > 0 {
        return Err(TaskError::Lint { errors, warnings });
    }

    Ok(Report {
        processed: files.len(),
        warnings,
        ..Default::default()
    })
}
