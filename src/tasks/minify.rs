use std::fs;
use std::io::ErrorKind;

use grass::OutputStyle;

use crate::core::{TaskContext, write_atomic};
use crate::engine::{Report, TaskResult};
use crate::error::TaskError;

pub(crate) const NOTICE: &str = "Styles are built.";

/// Minifies the stylesheet written by the compile task into its renamed
/// sibling. The expanded file is left untouched.
pub(crate) fn minify(ctx: &TaskContext) -> TaskResult {
    let config = ctx.config();
    let input = config.resolve(&config.output);
    let output = config.resolve(&config.output_min);

    let css = match fs::read_to_string(&input) {
        Ok(css) => css,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(TaskError::MissingArtifact(input)),
        Err(e) => return Err(e.into()),
    };

    let min = minify_css(&css, config.minify_safe)?;
    tracing::debug!("minified {} from {} to {} bytes", input, css.len(), min.len());

    write_atomic(&output, min.as_bytes())?;
    tracing::info!("wrote {}", output);

    Ok(Report {
        artifacts: vec![output],
        processed: 1,
        notice: Some(NOTICE.to_string()),
        ..Default::default()
    })
}

/// Strips whitespace and comments, keeping every rule in place. Without
/// `safe`, adjacent top-level rules with the same selector are also merged
/// and repeated declarations inside them collapsed.
pub(crate) fn minify_css(css: &str, safe: bool) -> Result<String, TaskError> {
    let options = grass::Options::default().style(OutputStyle::Compressed);
    let min = grass::from_string(css.to_owned(), &options)?;
    let min = min.trim_end().to_string();

    if safe {
        return Ok(min);
    }

    Ok(merge_adjacent(&min))
}

/// Splits compressed CSS into top-level statements, respecting strings.
fn top_level(css: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in css.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    out.push(&css[start..=i]);
                    start = i + 1;
                }
            }
            ';' if depth == 0 => {
                out.push(&css[start..=i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if start < css.len() {
        out.push(&css[start..]);
    }

    out
}

fn split_rule(rule: &str) -> Option<(&str, &str)> {
    if rule.starts_with('@') || !rule.ends_with('}') {
        return None;
    }
    let open = rule.find('{')?;
    let body = &rule[open + 1..rule.len() - 1];
    // nested blocks are not plain declaration lists
    if body.contains('{') {
        return None;
    }
    Some((&rule[..open], body))
}

fn merge_adjacent(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut pending: Option<(&str, Vec<&str>)> = None;

    let flush = |out: &mut String, pending: &mut Option<(&str, Vec<&str>)>| {
        if let Some((selector, decls)) = pending.take() {
            // the last occurrence of an identical declaration wins
            let mut kept: Vec<&str> = Vec::with_capacity(decls.len());
            for decl in decls.into_iter().rev() {
                if !kept.contains(&decl) {
                    kept.push(decl);
                }
            }
            kept.reverse();
            out.push_str(selector);
            out.push('{');
            out.push_str(&kept.join(";"));
            out.push('}');
        }
    };

    for statement in top_level(css) {
        match split_rule(statement) {
            Some((selector, body)) => {
                let decls = body.split(';').filter(|d| !d.is_empty());
                match &mut pending {
                    Some((current, list)) if *current == selector => list.extend(decls),
                    _ => {
                        flush(&mut out, &mut pending);
                        pending = Some((selector, decls.collect()));
                    }
                }
            }
            None => {
                flush(&mut out, &mut pending);
                out.push_str(statement);
            }
        }
    }
    flush(&mut out, &mut pending);

    out
}
