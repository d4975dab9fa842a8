use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::Severity;
use super::source::Stylesheet;
use crate::config::LintConfig;

/// A rule hit before it is given a severity and a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Finding {
    pub offset: usize,
    pub message: String,
}

pub(crate) trait Rule: Send + Sync {
    fn name(&self) -> &'static str;

    fn default_severity(&self) -> Severity;

    fn check(&self, sheet: &Stylesheet, out: &mut Vec<Finding>);
}

/// Every known rule, configured with the options from `[lint]`.
pub(crate) fn all(config: &LintConfig) -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(NoIds),
        Box::new(NoEmptyRulesets),
        Box::new(NoDuplicateProperties),
        Box::new(NoImportant),
        Box::new(NoTrailingWhitespace),
        Box::new(FinalNewline),
        Box::new(ZeroUnit),
        Box::new(HexLength),
        Box::new(HexNotation),
        Box::new(NoCssComments),
        Box::new(MaxNestingDepth {
            max: config.max_nesting_depth,
        }),
        Box::new(Indentation {
            size: config.indent,
        }),
    ]
}

static ID_SELECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#-?[A-Za-z_][\w-]*").expect("valid id regex"));

static IMPORTANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\s*important").expect("valid important regex"));

static ZERO_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w.#-])(0)(px|em|rem|ex|ch|vw|vh|vmin|vmax|cm|mm|in|pt|pc)\b")
        .expect("valid zero unit regex")
});

static HEX_COLOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#([0-9a-fA-F]{6}|[0-9a-fA-F]{3})\b").expect("valid hex color regex")
});

struct NoIds;

impl Rule for NoIds {
    fn name(&self) -> &'static str {
        "no-ids"
    }

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    fn check(&self, sheet: &Stylesheet, out: &mut Vec<Finding>) {
        for block in sheet.blocks.iter().filter(|b| b.is_ruleset()) {
            for m in ID_SELECTOR.find_iter(&block.header) {
                out.push(Finding {
                    offset: block.start + m.start(),
                    message: format!("ID selector '{}' is not allowed", m.as_str()),
                });
            }
        }
    }
}

struct NoEmptyRulesets;

impl Rule for NoEmptyRulesets {
    fn name(&self) -> &'static str {
        "no-empty-rulesets"
    }

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    fn check(&self, sheet: &Stylesheet, out: &mut Vec<Finding>) {
        for block in sheet.blocks.iter().filter(|b| b.is_ruleset()) {
            let Some(close) = block.close else {
                continue;
            };
            if sheet.masked[block.open + 1..close].trim().is_empty() {
                out.push(Finding {
                    offset: block.start,
                    message: format!("Ruleset '{}' is empty", block.header),
                });
            }
        }
    }
}

struct NoDuplicateProperties;

impl Rule for NoDuplicateProperties {
    fn name(&self) -> &'static str {
        "no-duplicate-properties"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, sheet: &Stylesheet, out: &mut Vec<Finding>) {
        let mut seen: HashSet<(usize, String)> = HashSet::new();

        for decl in &sheet.declarations {
            let Some(block) = decl.block else {
                continue;
            };
            if decl.is_variable() {
                continue;
            }
            if !seen.insert((block, decl.property.to_ascii_lowercase())) {
                out.push(Finding {
                    offset: decl.start,
                    message: format!("Property '{}' is declared more than once", decl.property),
                });
            }
        }
    }
}

struct NoImportant;

impl Rule for NoImportant {
    fn name(&self) -> &'static str {
        "no-important"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, sheet: &Stylesheet, out: &mut Vec<Finding>) {
        for m in IMPORTANT.find_iter(&sheet.masked) {
            out.push(Finding {
                offset: m.start(),
                message: "!important should not be used".into(),
            });
        }
    }
}

struct NoTrailingWhitespace;

impl Rule for NoTrailingWhitespace {
    fn name(&self) -> &'static str {
        "no-trailing-whitespace"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, sheet: &Stylesheet, out: &mut Vec<Finding>) {
        for (index, line) in sheet.lines.iter().enumerate() {
            let text = sheet.line_text(index);
            let kept = text.trim_end_matches([' ', '\t']);
            if kept.len() != text.len() {
                out.push(Finding {
                    offset: line.start + kept.len(),
                    message: "Trailing whitespace".into(),
                });
            }
        }
    }
}

struct FinalNewline;

impl Rule for FinalNewline {
    fn name(&self) -> &'static str {
        "final-newline"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, sheet: &Stylesheet, out: &mut Vec<Finding>) {
        if !sheet.text.is_empty() && !sheet.text.ends_with('\n') {
            out.push(Finding {
                offset: sheet.text.len(),
                message: "Files must end with a new line".into(),
            });
        }
    }
}

struct ZeroUnit;

impl Rule for ZeroUnit {
    fn name(&self) -> &'static str {
        "zero-unit"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, sheet: &Stylesheet, out: &mut Vec<Finding>) {
        for decl in &sheet.declarations {
            let value = &sheet.masked[decl.value_start..decl.value_start + decl.value.len()];
            for caps in ZERO_UNIT.captures_iter(value) {
                let (Some(zero), Some(unit)) = (caps.get(1), caps.get(2)) else {
                    continue;
                };
                out.push(Finding {
                    offset: decl.value_start + zero.start(),
                    message: format!("Unit '{}' is not needed on zero", unit.as_str()),
                });
            }
        }
    }
}

fn hex_colors<'s>(sheet: &'s Stylesheet) -> impl Iterator<Item = (usize, &'s str)> + 's {
    sheet.declarations.iter().flat_map(move |decl| {
        let value = &sheet.masked[decl.value_start..decl.value_start + decl.value.len()];
        HEX_COLOR
            .find_iter(value)
            .map(move |m| (decl.value_start + m.start(), m.as_str()))
    })
}

struct HexLength;

impl Rule for HexLength {
    fn name(&self) -> &'static str {
        "hex-length"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, sheet: &Stylesheet, out: &mut Vec<Finding>) {
        for (offset, color) in hex_colors(sheet) {
            let digits = color[1..].as_bytes();
            if digits.len() != 6 {
                continue;
            }

            let shortenable = digits
                .chunks(2)
                .all(|pair| pair[0].eq_ignore_ascii_case(&pair[1]));
            if shortenable {
                let short: String = digits.chunks(2).map(|pair| pair[0] as char).collect();
                out.push(Finding {
                    offset,
                    message: format!("Color '{color}' should be written as '#{short}'"),
                });
            }
        }
    }
}

struct HexNotation;

impl Rule for HexNotation {
    fn name(&self) -> &'static str {
        "hex-notation"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, sheet: &Stylesheet, out: &mut Vec<Finding>) {
        for (offset, color) in hex_colors(sheet) {
            if color.bytes().any(|b| b.is_ascii_uppercase()) {
                out.push(Finding {
                    offset,
                    message: format!(
                        "Color '{color}' should be written in lowercase as '{}'",
                        color.to_ascii_lowercase()
                    ),
                });
            }
        }
    }
}

struct NoCssComments;

impl Rule for NoCssComments {
    fn name(&self) -> &'static str {
        "no-css-comments"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, sheet: &Stylesheet, out: &mut Vec<Finding>) {
        // `/*!` marks comments that are meant to survive compilation
        for comment in sheet.comments.iter().filter(|c| c.block) {
            if !sheet.text[comment.start..].starts_with("/*!") {
                out.push(Finding {
                    offset: comment.start,
                    message: "Block comments end up in the CSS, use '//' instead".into(),
                });
            }
        }
    }
}

struct MaxNestingDepth {
    max: usize,
}

impl Rule for MaxNestingDepth {
    fn name(&self) -> &'static str {
        "max-nesting-depth"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, sheet: &Stylesheet, out: &mut Vec<Finding>) {
        for block in sheet.blocks.iter().filter(|b| b.is_ruleset()) {
            if block.nesting > self.max {
                out.push(Finding {
                    offset: block.start,
                    message: format!(
                        "Nesting depth {} exceeds the maximum of {}",
                        block.nesting, self.max
                    ),
                });
            }
        }
    }
}

struct Indentation {
    size: usize,
}

impl Rule for Indentation {
    fn name(&self) -> &'static str {
        "indentation"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, sheet: &Stylesheet, out: &mut Vec<Finding>) {
        for (index, line) in sheet.lines.iter().enumerate() {
            if line.continuation || sheet.inside_comment(line.start) {
                continue;
            }

            let text = sheet.line_text(index);
            let content = text.trim_start();
            if content.is_empty() {
                continue;
            }

            let indent = &text[..text.len() - content.len()];
            if indent.contains('\t') {
                out.push(Finding {
                    offset: line.start,
                    message: "Indentation must use spaces, not tabs".into(),
                });
                continue;
            }

            let first = line.start + indent.len();
            let closing = sheet.masked.as_bytes().get(first) == Some(&b'}');
            let depth = if closing {
                line.depth.saturating_sub(1)
            } else {
                line.depth
            };

            let expected = depth * self.size;
            if indent.len() != expected {
                out.push(Finding {
                    offset: line.start,
                    message: format!(
                        "Expected indentation of {expected} spaces but found {}",
                        indent.len()
                    ),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(rule: &dyn Rule, text: &str) -> Vec<(usize, usize)> {
        let sheet = Stylesheet::parse(text);
        let mut out = Vec::new();
        rule.check(&sheet, &mut out);
        out.into_iter().map(|f| sheet.locate(f.offset)).collect()
    }

    #[test]
    fn test_no_ids() {
        assert_eq!(run(&NoIds, "#header .a {\n  color: red;\n}\n"), vec![(1, 1)]);
        // strings, interpolation and colors are not ids
        assert!(run(&NoIds, "a[href=\"#top\"] {\n  color: #fff;\n}\n").is_empty());
        assert!(run(&NoIds, ".a-#{$b} {\n  x: y;\n}\n").is_empty());
        assert!(run(&NoIds, "@if $a == #fff {\n  .b {\n    x: y;\n  }\n}\n").is_empty());
    }

    #[test]
    fn test_no_empty_rulesets() {
        assert_eq!(run(&NoEmptyRulesets, ".a {\n}\n.b {\n  x: y;\n}\n"), vec![(1, 1)]);
        assert_eq!(run(&NoEmptyRulesets, ".a {\n  // todo\n}\n"), vec![(1, 1)]);
        assert!(run(&NoEmptyRulesets, ".a {\n  .b {\n    x: y;\n  }\n}\n").is_empty());
        assert!(run(&NoEmptyRulesets, ".a {\n  @include m;\n}\n").is_empty());
    }

    #[test]
    fn test_no_duplicate_properties() {
        let text = ".a {\n  color: red;\n  Color: blue;\n}\n.b {\n  color: red;\n}\n";
        assert_eq!(run(&NoDuplicateProperties, text), vec![(3, 3)]);
    }

    #[test]
    fn test_no_important() {
        let text = ".a {\n  color: red !important;\n  content: \"!important\";\n}\n";
        assert_eq!(run(&NoImportant, text), vec![(2, 14)]);
    }

    #[test]
    fn test_trailing_whitespace_and_final_newline() {
        assert_eq!(run(&NoTrailingWhitespace, ".a { \n  x: y;\t\n}\n"), vec![(1, 5), (2, 8)]);
        assert_eq!(run(&FinalNewline, ".a {\n}"), vec![(2, 2)]);
        assert!(run(&FinalNewline, "").is_empty());
    }

    #[test]
    fn test_zero_unit() {
        let text = ".a {\n  margin: 0px 10px 0.0em 0;\n  width: 0%;\n  $gap: 0rem;\n}\n";
        assert_eq!(run(&ZeroUnit, text), vec![(2, 11), (4, 9)]);
    }

    #[test]
    fn test_hex_rules() {
        let text = ".a {\n  color: #AABBCC;\n  background: #abcdef;\n  border-color: #FFF;\n}\n";
        assert_eq!(run(&HexLength, text), vec![(2, 10)]);
        assert_eq!(run(&HexNotation, text), vec![(2, 10), (4, 17)]);
    }

    #[test]
    fn test_no_css_comments() {
        let text = "/*! license */\n/* note */\n// fine\n.a {\n  x: y;\n}\n";
        assert_eq!(run(&NoCssComments, text), vec![(2, 1)]);
    }

    #[test]
    fn test_max_nesting_depth() {
        let text = ".a {\n  .b {\n    .c {\n      x: y;\n    }\n  }\n}\n";
        assert_eq!(run(&MaxNestingDepth { max: 1 }, text), vec![(3, 5)]);
        assert!(run(&MaxNestingDepth { max: 2 }, text).is_empty());
    }

    #[test]
    fn test_indentation() {
        let good = "$a: 1;\n.a,\n.b {\n  x: y;\n  @media print {\n    z: w;\n  }\n  /* multi\n     line */\n}\n";
        assert!(run(&Indentation { size: 2 }, good).is_empty());

        let bad = ".a {\n    x: y;\n\tz: w;\n  }\n";
        assert_eq!(run(&Indentation { size: 2 }, bad), vec![(2, 1), (3, 1), (4, 1)]);
        assert!(run(&Indentation { size: 4 }, ".a {\n    x: y;\n}\n").is_empty());
    }
}
