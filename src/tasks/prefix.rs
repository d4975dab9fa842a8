//! Vendor prefixing for expanded CSS.
//!
//! Works on the expanded output of grass, where every declaration sits on a
//! line of its own. Each output line remembers which compiled line it came
//! from, which is what the sourcemap stage needs to map inserted lines.
//!
//! The prefix tables below are a small curated list, not browser usage data.
//! A `window` approximates how many releases back a browser still needed the
//! prefix when the entry was written. Only whole declarations and the listed
//! keyword values are prefixed: values that name other properties
//! (`transition: transform`) keep their unprefixed names, and at-rules such
//! as `@keyframes` never get a `@-webkit-` twin.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;

/// Browser targets, reduced to how many recent releases of each browser
/// must be supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Targets {
    versions: u32,
}

impl Targets {
    pub fn last(versions: u32) -> Self {
        Self { versions }
    }

    /// Parses queries of the form `last N versions` or `none`. Several
    /// queries combine to the widest one.
    pub fn parse<S: AsRef<str>>(queries: &[S]) -> Result<Self, ConfigError> {
        let mut versions = 0;

        for query in queries {
            let query = query.as_ref();
            let words: Vec<_> = query
                .split_whitespace()
                .map(str::to_ascii_lowercase)
                .collect();

            match words.as_slice() {
                [none] if none == "none" => {}
                [last, n, unit] if last == "last" && (unit == "versions" || unit == "version") => {
                    let n: u32 = n.parse().map_err(|_| ConfigError::Query(query.into()))?;
                    versions = versions.max(n);
                }
                _ => return Err(ConfigError::Query(query.into())),
            }
        }

        Ok(Self { versions })
    }

    fn wants(&self, window: u32) -> bool {
        self.versions >= window
    }
}

/// A prefixed property. `window` is the smallest `last N versions` that still
/// reaches a release requiring the prefix.
struct PropertyPrefix {
    property: &'static str,
    prefix: &'static str,
    window: u32,
}

/// A prefixed keyword value of an unprefixed property.
struct ValuePrefix {
    property: &'static str,
    value: &'static str,
    prefixed: &'static str,
    window: u32,
}

// Ordered the way the prefixed lines are emitted: -webkit-, -moz-, -ms-.
const PROPERTIES: &[PropertyPrefix] = &[
    PropertyPrefix { property: "appearance", prefix: "-webkit-", window: 1 },
    PropertyPrefix { property: "appearance", prefix: "-moz-", window: 1 },
    PropertyPrefix { property: "backdrop-filter", prefix: "-webkit-", window: 1 },
    PropertyPrefix { property: "box-decoration-break", prefix: "-webkit-", window: 1 },
    PropertyPrefix { property: "hyphens", prefix: "-webkit-", window: 1 },
    PropertyPrefix { property: "hyphens", prefix: "-ms-", window: 3 },
    PropertyPrefix { property: "mask", prefix: "-webkit-", window: 2 },
    PropertyPrefix { property: "mask-image", prefix: "-webkit-", window: 2 },
    PropertyPrefix { property: "mask-size", prefix: "-webkit-", window: 2 },
    PropertyPrefix { property: "text-size-adjust", prefix: "-webkit-", window: 1 },
    PropertyPrefix { property: "text-size-adjust", prefix: "-moz-", window: 1 },
    PropertyPrefix { property: "text-size-adjust", prefix: "-ms-", window: 3 },
    PropertyPrefix { property: "user-select", prefix: "-webkit-", window: 1 },
    PropertyPrefix { property: "user-select", prefix: "-moz-", window: 4 },
    PropertyPrefix { property: "user-select", prefix: "-ms-", window: 3 },
    PropertyPrefix { property: "clip-path", prefix: "-webkit-", window: 4 },
    PropertyPrefix { property: "transform", prefix: "-webkit-", window: 8 },
    PropertyPrefix { property: "transform", prefix: "-ms-", window: 5 },
    PropertyPrefix { property: "transition", prefix: "-webkit-", window: 8 },
    PropertyPrefix { property: "animation", prefix: "-webkit-", window: 8 },
    PropertyPrefix { property: "flex", prefix: "-webkit-", window: 8 },
    PropertyPrefix { property: "flex", prefix: "-ms-", window: 4 },
];

const VALUES: &[ValuePrefix] = &[
    ValuePrefix { property: "display", value: "flex", prefixed: "-webkit-box", window: 10 },
    ValuePrefix { property: "display", value: "flex", prefixed: "-ms-flexbox", window: 4 },
    ValuePrefix { property: "display", value: "inline-flex", prefixed: "-ms-inline-flexbox", window: 4 },
    ValuePrefix { property: "position", value: "sticky", prefixed: "-webkit-sticky", window: 2 },
];

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)(-?[a-zA-Z][a-zA-Z-]*)\s*:\s*(.*?);?\s*$").expect("valid declaration regex")
});

/// One output line and the index of the compiled line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Line {
    pub text: String,
    pub origin: usize,
}

pub(crate) fn lines_to_string(lines: &[Line]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&line.text);
        out.push('\n');
    }
    out
}

struct Declaration<'a> {
    indent: &'a str,
    property: &'a str,
    value: &'a str,
}

fn parse_declaration(line: &str) -> Option<Declaration<'_>> {
    let trimmed = line.trim();
    if trimmed.ends_with('{') || trimmed.starts_with('@') || trimmed.starts_with('}') {
        return None;
    }

    let caps = DECLARATION.captures(line)?;
    Some(Declaration {
        indent: caps.get(1)?.as_str(),
        property: caps.get(2)?.as_str(),
        value: caps.get(3)?.as_str(),
    })
}

/// Assigns every line to the block it belongs to and collects the
/// declarations each block already contains.
fn index_blocks(lines: &[&str]) -> (Vec<usize>, Vec<HashSet<String>>) {
    let mut owner = Vec::with_capacity(lines.len());
    let mut blocks = vec![HashSet::new()];
    let mut stack = vec![0];

    for line in lines {
        let trimmed = line.trim();

        if trimmed.ends_with('{') {
            blocks.push(HashSet::new());
            stack.push(blocks.len() - 1);
            owner.push(blocks.len() - 1);
            continue;
        }

        let current = stack.last().copied().unwrap_or(0);
        owner.push(current);

        if let Some(decl) = parse_declaration(line) {
            blocks[current].insert(decl.property.to_ascii_lowercase());
            blocks[current].insert(format!(
                "{}:{}",
                decl.property.to_ascii_lowercase(),
                decl.value.trim()
            ));
        }

        if trimmed.starts_with('}') && stack.len() > 1 {
            stack.pop();
        }
    }

    (owner, blocks)
}

/// Adds vendor-prefixed declarations in front of the declarations that need
/// them. A prefix the block already declares is never added again.
pub(crate) fn prefix(css: &str, targets: Targets) -> Vec<Line> {
    let compiled: Vec<&str> = css.lines().collect();
    let (owner, blocks) = index_blocks(&compiled);
    let mut out = Vec::with_capacity(compiled.len());

    for (origin, line) in compiled.iter().enumerate() {
        if let Some(decl) = parse_declaration(line) {
            let present = &blocks[owner[origin]];
            let property = decl.property.to_ascii_lowercase();

            for rule in PROPERTIES.iter().filter(|r| r.property == property) {
                let prefixed = format!("{}{}", rule.prefix, property);
                if targets.wants(rule.window) && !present.contains(&prefixed) {
                    out.push(Line {
                        text: format!("{}{}: {};", decl.indent, prefixed, decl.value),
                        origin,
                    });
                }
            }

            let (keyword, rest) = match decl.value.split_once(char::is_whitespace) {
                Some((keyword, rest)) => (keyword, Some(rest)),
                None => (decl.value, None),
            };

            for rule in VALUES
                .iter()
                .filter(|r| r.property == property && r.value.eq_ignore_ascii_case(keyword))
            {
                let value = match rest {
                    Some(rest) => format!("{} {}", rule.prefixed, rest),
                    None => rule.prefixed.to_string(),
                };
                if targets.wants(rule.window) && !present.contains(&format!("{property}:{value}")) {
                    out.push(Line {
                        text: format!("{}{}: {};", decl.indent, decl.property, value),
                        origin,
                    });
                }
            }
        }

        out.push(Line {
            text: line.to_string(),
            origin,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(css: &str, versions: u32) -> String {
        lines_to_string(&prefix(css, Targets::last(versions)))
    }

    #[test]
    fn test_parse_targets() {
        assert_eq!(Targets::parse(&["last 2 versions"]).unwrap(), Targets::last(2));
        assert_eq!(
            Targets::parse(&["Last 1 version", "last 4 versions"]).unwrap(),
            Targets::last(4)
        );
        assert_eq!(Targets::parse(&["none"]).unwrap(), Targets::last(0));
        assert_eq!(Targets::parse::<&str>(&[]).unwrap(), Targets::last(0));
        assert!(Targets::parse(&["> 1%"]).is_err());
        assert!(Targets::parse(&["last many versions"]).is_err());
    }

    #[test]
    fn test_prefixes_go_before_the_declaration() {
        let css = ".btn {\n  color: red;\n  user-select: none;\n}\n";
        assert_eq!(
            run(css, 2),
            ".btn {\n  color: red;\n  -webkit-user-select: none;\n  user-select: none;\n}\n"
        );
    }

    #[test]
    fn test_wider_window_adds_more_prefixes() {
        let css = "a {\n  user-select: none;\n}\n";
        let out = run(css, 4);
        assert!(out.contains("-webkit-user-select: none;"));
        assert!(out.contains("-moz-user-select: none;"));
        assert!(out.contains("-ms-user-select: none;"));
    }

    #[test]
    fn test_no_targets_is_identity() {
        let css = "a {\n  user-select: none;\n  display: flex;\n}\n";
        assert_eq!(run(css, 0), css);
    }

    #[test]
    fn test_existing_prefix_is_kept_not_duplicated() {
        let css = "a {\n  user-select: none;\n  -webkit-user-select: none;\n}\n";
        assert_eq!(run(css, 2), css);
    }

    #[test]
    fn test_value_prefix_keeps_important() {
        let css = "nav {\n  position: sticky !important;\n}\n";
        assert_eq!(
            run(css, 2),
            "nav {\n  position: -webkit-sticky !important;\n  position: sticky !important;\n}\n"
        );
    }

    #[test]
    fn test_nested_media_keeps_indent_and_origin() {
        let css = "@media (min-width: 800px) {\n  .a {\n    appearance: none;\n  }\n}\n";
        let lines = prefix(css, Targets::last(2));

        assert_eq!(lines[2].text, "    -webkit-appearance: none;");
        assert_eq!(lines[3].text, "    -moz-appearance: none;");
        assert_eq!(lines[2].origin, 2);
        assert_eq!(lines[4].origin, 2);
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn test_values_and_at_rules_are_not_rewritten() {
        let css = "a {\n  transition: transform 0.2s;\n}\n";
        assert_eq!(
            run(css, 10),
            "a {\n  -webkit-transition: transform 0.2s;\n  transition: transform 0.2s;\n}\n"
        );

        let keyframes = "@keyframes fade {\n  from {\n    opacity: 0;\n  }\n}\n";
        assert_eq!(run(keyframes, 10), keyframes);
    }

    #[test]
    fn test_selectors_are_untouched() {
        let css = "a:hover,\na:focus {\n  color: blue;\n}\n";
        assert_eq!(run(css, 10), css);
    }
}
