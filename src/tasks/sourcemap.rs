//! Source map v3 generation.
//!
//! grass does not report source positions, so every output line is resolved
//! against the Sass files the compiler actually read: selectors by their last
//! compound selector, declarations by their `property: value` text (or only
//! the property when the value came from a variable). Lines without a match
//! stay unmapped. Resolution prefers the first match at or after the previous
//! hit in the same file, which keeps mappings monotonic for ordinary sources.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::tasks::prefix::Line;

/// A Sass file read during compilation.
#[derive(Debug, Clone)]
pub(crate) struct Source {
    pub path: Utf8PathBuf,
    pub content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceMapV3<'a> {
    version: u8,
    file: &'a str,
    sources: Vec<&'a str>,
    sources_content: Vec<&'a str>,
    names: Vec<&'a str>,
    mappings: String,
}

/// Position in a source, zero based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Position {
    source: usize,
    line: usize,
    column: usize,
}

/// Collects sources during compilation and turns the final output into a
/// source map.
#[derive(Debug)]
pub(crate) struct SourceMapBuilder {
    file: String,
    root: Utf8PathBuf,
    sources: Vec<Source>,
}

impl SourceMapBuilder {
    /// `file` is the name of the generated stylesheet, `root` the directory
    /// source paths are made relative to.
    pub fn new(file: impl Into<String>, root: impl AsRef<Utf8Path>) -> Self {
        Self {
            file: file.into(),
            root: root.as_ref().to_path_buf(),
            sources: Vec::new(),
        }
    }

    pub fn add_sources(&mut self, sources: impl IntoIterator<Item = Source>) {
        for source in sources {
            if !self.sources.iter().any(|s| s.path == source.path) {
                self.sources.push(source);
            }
        }
    }

    /// Builds the map for `lines`, the prefixed output of `compiled`.
    pub fn finalize(self, compiled: &str, lines: &[Line]) -> Result<SourceMap, serde_json::Error> {
        let compiled: Vec<&str> = compiled.lines().collect();
        let names: Vec<String> = self
            .sources
            .iter()
            .map(|s| relative(&s.path, &self.root))
            .collect();

        let mut resolver = Resolver::new(&self.sources);
        let mut mappings = String::new();
        let mut prev = Position {
            source: 0,
            line: 0,
            column: 0,
        };

        // Inserted prefix lines share the origin of the line they precede, so
        // each compiled line is resolved once.
        let mut cache: Option<(usize, Option<Position>)> = None;

        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                mappings.push(';');
            }

            let pos = match cache {
                Some((origin, pos)) if origin == line.origin => pos,
                _ => {
                    let text = compiled.get(line.origin).copied().unwrap_or_default();
                    let pos = resolver.resolve(text);
                    cache = Some((line.origin, pos));
                    pos
                }
            };

            let Some(pos) = pos else {
                continue;
            };

            let indent = line.text.len() - line.text.trim_start().len();
            let generated_column = utf16_len(&line.text[..indent]);
            encode_vlq(&mut mappings, generated_column as i64);
            encode_vlq(&mut mappings, pos.source as i64 - prev.source as i64);
            encode_vlq(&mut mappings, pos.line as i64 - prev.line as i64);
            encode_vlq(&mut mappings, pos.column as i64 - prev.column as i64);
            prev = pos;
        }

        let map = SourceMapV3 {
            version: 3,
            file: &self.file,
            sources: names.iter().map(String::as_str).collect(),
            sources_content: self.sources.iter().map(|s| s.content.as_str()).collect(),
            names: Vec::new(),
            mappings,
        };

        Ok(SourceMap {
            json: serde_json::to_string(&map)?,
        })
    }
}

fn relative(path: &Utf8Path, root: &Utf8Path) -> String {
    path.strip_prefix(root).unwrap_or(path).as_str().replace('\\', "/")
}

/// A serialized source map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SourceMap {
    json: String,
}

impl SourceMap {
    pub fn as_json(&self) -> &str {
        &self.json
    }

    /// Trailing comment embedding the whole map.
    pub fn inline_comment(&self) -> String {
        format!(
            "/*# sourceMappingURL=data:application/json;charset=utf-8;base64,{} */",
            STANDARD.encode(self.json.as_bytes())
        )
    }

    /// Trailing comment pointing at a companion file.
    pub fn file_comment(map_name: &str) -> String {
        format!("/*# sourceMappingURL={map_name} */")
    }
}

struct Resolver<'a> {
    sources: &'a [Source],
    /// Byte offset of the last hit, per source.
    cursors: Vec<usize>,
}

impl<'a> Resolver<'a> {
    fn new(sources: &'a [Source]) -> Self {
        Self {
            sources,
            cursors: vec![0; sources.len()],
        }
    }

    fn resolve(&mut self, line: &str) -> Option<Position> {
        let probes = probes(line);
        for probe in &probes {
            if let Some(pos) = self.find(probe) {
                return Some(pos);
            }
        }
        None
    }

    fn find(&mut self, probe: &str) -> Option<Position> {
        // Forward from the cursor first, then from the start of the file.
        for pass in 0..2 {
            for (index, source) in self.sources.iter().enumerate() {
                let from = if pass == 0 { self.cursors[index] } else { 0 };
                let Some(found) = source.content.get(from..).and_then(|s| s.find(probe)) else {
                    continue;
                };
                let offset = from + found;
                self.cursors[index] = offset;
                return Some(position(&source.content, index, offset));
            }
        }
        None
    }
}

fn position(content: &str, source: usize, offset: usize) -> Position {
    let before = &content[..offset];
    let line = before.matches('\n').count();
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    Position {
        source,
        line,
        column: utf16_len(&before[line_start..]),
    }
}

/// Source map columns count UTF-16 code units.
fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Substrings worth looking for in the Sass sources, most specific first.
fn probes(line: &str) -> Vec<String> {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.starts_with('}') || trimmed.starts_with("/*") {
        return Vec::new();
    }

    if let Some(head) = trimmed.strip_suffix('{') {
        let head = head.trim();
        if head.starts_with('@') {
            return vec![head.to_string()];
        }
        // `.nav .item` compiled from a nested `.item` block
        let last = head
            .rsplit(',')
            .next()
            .and_then(|s| s.split_whitespace().last())
            .unwrap_or(head);
        let last = last.trim_start_matches('&');
        return vec![head.to_string(), last.to_string()];
    }

    if let Some((property, value)) = trimmed.split_once(':') {
        let property = property.trim();
        let value = value.trim().trim_end_matches(';').trim();
        return vec![
            format!("{property}: {value}"),
            format!("{property}:{value}"),
            format!("{property}:"),
        ];
    }

    // selector list continuation line, e.g. `a,`
    vec![trimmed.trim_end_matches(',').to_string()]
}

/// Appends `value` as a base64 VLQ.
fn encode_vlq(out: &mut String, value: i64) {
    const B64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let mut v = if value < 0 {
        ((-value as u64) << 1) | 1
    } else {
        (value as u64) << 1
    };

    loop {
        let mut digit = (v & 0b11111) as u8;
        v >>= 5;
        if v > 0 {
            digit |= 0b100000;
        }
        out.push(B64[digit as usize] as char);
        if v == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlq(value: i64) -> String {
        let mut s = String::new();
        encode_vlq(&mut s, value);
        s
    }

    #[test]
    fn test_vlq() {
        assert_eq!(vlq(0), "A");
        assert_eq!(vlq(1), "C");
        assert_eq!(vlq(-1), "D");
        assert_eq!(vlq(15), "e");
        assert_eq!(vlq(16), "gB");
        assert_eq!(vlq(-17), "jB");
        assert_eq!(vlq(1000), "w+B");
    }

    #[test]
    fn test_probes() {
        assert_eq!(probes("}"), Vec::<String>::new());
        assert_eq!(probes(".nav .item {"), vec![".nav .item", ".item"]);
        assert_eq!(probes("  color: red;")[0], "color: red");
        assert_eq!(probes("@media (min-width: 800px) {"), vec!["@media (min-width: 800px)"]);
    }

    fn source(path: &str, content: &str) -> Source {
        Source {
            path: Utf8PathBuf::from(path),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_finalize_maps_rules_and_prefixed_lines() {
        let compiled = ".btn {\n  user-select: none;\n}\n";
        let lines = vec![
            Line { text: ".btn {".into(), origin: 0 },
            Line { text: "  -webkit-user-select: none;".into(), origin: 1 },
            Line { text: "  user-select: none;".into(), origin: 1 },
            Line { text: "}".into(), origin: 2 },
        ];

        let mut builder = SourceMapBuilder::new("style.css", "/theme");
        builder.add_sources([
            source("/theme/assets/sass/_btn.scss", "// buttons\n.btn {\n    user-select: none;\n}\n"),
            source("/theme/assets/sass/_btn.scss", "duplicate is ignored"),
        ]);

        let map = builder.finalize(compiled, &lines).unwrap();
        let json: serde_json::Value = serde_json::from_str(map.as_json()).unwrap();

        assert_eq!(json["version"], 3);
        assert_eq!(json["file"], "style.css");
        assert_eq!(json["sources"][0], "assets/sass/_btn.scss");
        assert_eq!(json["sourcesContent"].as_array().unwrap().len(), 1);
        // .btn -> 1:0, both declarations -> 2:4, closing brace unmapped
        assert_eq!(json["mappings"], "AACA;EACI;EAAA;");
    }

    #[test]
    fn test_columns_count_utf16_units() {
        let content = "a {}\n.café, .naïve .🙂 .item {\n";
        let offset = content.find(".item").unwrap();

        let pos = position(content, 0, offset);
        assert_eq!(pos.line, 1);
        // 17 chars before `.item`, the emoji takes two units
        assert_eq!(pos.column, 18);
        assert_ne!(pos.column, offset - content.find('.').unwrap());
    }

    #[test]
    fn test_inline_comment_is_base64_data_url() {
        let map = SourceMap { json: "{}".into() };
        assert_eq!(
            map.inline_comment(),
            "/*# sourceMappingURL=data:application/json;charset=utf-8;base64,e30= */"
        );
        assert_eq!(
            SourceMap::file_comment("style.css.map"),
            "/*# sourceMappingURL=style.css.map */"
        );
    }
}
