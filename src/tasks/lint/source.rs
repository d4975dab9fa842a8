//! A shallow structural view of an SCSS file, just enough for linting.
//!
//! Comments and string contents are blanked out in a masked copy of the
//! text, so byte offsets stay valid while braces, semicolons and `#` inside
//! them no longer confuse the scanner.

/// A comment in the original text, `start..end` in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Comment {
    pub start: usize,
    pub end: usize,
    /// `/* */` rather than `//`.
    pub block: bool,
}

/// A `{ ... }` block.
#[derive(Debug, Clone)]
pub(crate) struct Block {
    /// Selector or at-rule prelude, trimmed.
    pub header: String,
    /// Offset of the first byte of `header`.
    pub start: usize,
    pub open: usize,
    pub close: Option<usize>,
    /// Number of enclosing rulesets.
    pub nesting: usize,
}

impl Block {
    /// Plain selector blocks, as opposed to at-rules and nested properties.
    pub fn is_ruleset(&self) -> bool {
        !self.header.is_empty() && !self.header.starts_with('@') && !self.header.ends_with(':')
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Declaration {
    pub property: String,
    pub value: String,
    pub start: usize,
    pub value_start: usize,
    /// Index of the enclosing block, `None` at the top level.
    pub block: Option<usize>,
}

impl Declaration {
    pub fn is_variable(&self) -> bool {
        self.property.starts_with('$')
    }
}

#[derive(Debug, Clone)]
pub(crate) struct LineInfo {
    pub start: usize,
    /// Block depth at the start of the line.
    pub depth: usize,
    /// The previous statement is still open, e.g. a selector list or a
    /// value spanning lines.
    pub continuation: bool,
}

#[derive(Debug)]
pub(crate) struct Stylesheet<'a> {
    pub text: &'a str,
    pub masked: String,
    pub comments: Vec<Comment>,
    pub blocks: Vec<Block>,
    pub declarations: Vec<Declaration>,
    pub lines: Vec<LineInfo>,
}

impl<'a> Stylesheet<'a> {
    pub fn parse(text: &'a str) -> Self {
        let (masked, comments) = mask(text);
        let mut sheet = Self {
            text,
            masked,
            comments,
            blocks: Vec::new(),
            declarations: Vec::new(),
            lines: Vec::new(),
        };
        sheet.scan();
        sheet
    }

    /// One-based line and column of a byte offset.
    pub fn locate(&self, offset: usize) -> (usize, usize) {
        let index = self
            .lines
            .partition_point(|line| line.start <= offset)
            .saturating_sub(1);
        let start = self.lines.get(index).map(|line| line.start).unwrap_or(0);
        let column = self
            .text
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        (index + 1, column + 1)
    }

    /// Text of line `index` without the line terminator.
    pub fn line_text(&self, index: usize) -> &'a str {
        let start = self.lines[index].start;
        let end = self
            .lines
            .get(index + 1)
            .map(|line| line.start - 1)
            .unwrap_or(self.text.len());
        self.text[start..end].trim_end_matches('\r')
    }

    /// Whether `offset` lies inside a block comment that started earlier.
    pub fn inside_comment(&self, offset: usize) -> bool {
        self.comments
            .iter()
            .any(|c| c.block && c.start < offset && offset < c.end)
    }

    fn scan(&mut self) {
        let bytes = self.masked.as_bytes();
        let mut stack: Vec<usize> = Vec::new();
        let mut interpolation = 0usize;
        let mut segment = 0usize;
        let mut last: Option<u8> = None;

        let mut blocks = Vec::new();
        let mut declarations = Vec::new();
        let mut lines = vec![LineInfo {
            start: 0,
            depth: 0,
            continuation: false,
        }];

        for (i, &b) in bytes.iter().enumerate() {
            if b == b'\n' {
                lines.push(LineInfo {
                    start: i + 1,
                    depth: stack.len(),
                    continuation: !matches!(last, None | Some(b'{' | b'}' | b';')),
                });
                continue;
            }

            match b {
                b'{' if interpolation > 0 || (i > 0 && bytes[i - 1] == b'#') => interpolation += 1,
                b'}' if interpolation > 0 => interpolation -= 1,
                _ if interpolation > 0 => {}
                b'{' => {
                    let raw = &self.masked[segment..i];
                    let header = raw.trim();
                    let start = segment + (raw.len() - raw.trim_start().len());
                    let nesting = stack
                        .iter()
                        .filter(|&&index| Block::is_ruleset(&blocks[index]))
                        .count();

                    blocks.push(Block {
                        header: header.to_string(),
                        start,
                        open: i,
                        close: None,
                        nesting,
                    });
                    stack.push(blocks.len() - 1);
                    segment = i + 1;
                }
                b'}' => {
                    statement(&self.masked, segment, i, stack.last().copied(), &mut declarations);
                    if let Some(index) = stack.pop() {
                        blocks[index].close = Some(i);
                    }
                    segment = i + 1;
                }
                b';' => {
                    statement(&self.masked, segment, i, stack.last().copied(), &mut declarations);
                    segment = i + 1;
                }
                _ => {}
            }

            if !b.is_ascii_whitespace() {
                last = Some(b);
            }
        }

        self.blocks = blocks;
        self.declarations = declarations;
        self.lines = lines;
    }
}

fn statement(
    masked: &str,
    start: usize,
    end: usize,
    block: Option<usize>,
    out: &mut Vec<Declaration>,
) {
    let raw = &masked[start..end];
    let text = raw.trim();
    if text.is_empty() || text.starts_with('@') {
        return;
    }

    let Some((property, value)) = text.split_once(':') else {
        return;
    };

    let lead = start + (raw.len() - raw.trim_start().len());
    let after = &text[property.len() + 1..];
    let value_start = lead + property.len() + 1 + (after.len() - after.trim_start().len());

    out.push(Declaration {
        property: property.trim().to_string(),
        value: value.trim().to_string(),
        start: lead,
        value_start,
        block,
    });
}

fn blank(out: &mut String, text: &str) {
    for c in text.chars() {
        if c == '\n' {
            out.push('\n');
        } else {
            out.extend(std::iter::repeat_n(' ', c.len_utf8()));
        }
    }
}

/// End of the string opened by `quote` at `open`, as (content end, string
/// end). Unterminated strings stop at the end of the line.
fn string_end(text: &str, open: usize, quote: char) -> (usize, usize) {
    let mut escaped = false;
    for (j, c) in text[open + 1..].char_indices() {
        let at = open + 1 + j;
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return (at, at + 1);
        } else if c == '\n' {
            return (at, at);
        }
    }
    (text.len(), text.len())
}

fn mask(text: &str) -> (String, Vec<Comment>) {
    let mut masked = String::with_capacity(text.len());
    let mut comments = Vec::new();
    let mut prev: Option<char> = None;
    let mut skip_to = 0usize;

    for (i, c) in text.char_indices() {
        if i < skip_to {
            continue;
        }

        let next = text[i + c.len_utf8()..].chars().next();

        match (c, next) {
            ('/', Some('*')) => {
                let end = text[i + 2..]
                    .find("*/")
                    .map(|e| i + 2 + e + 2)
                    .unwrap_or(text.len());
                blank(&mut masked, &text[i..end]);
                comments.push(Comment {
                    start: i,
                    end,
                    block: true,
                });
                skip_to = end;
            }
            // `url(http://...)` is not a comment
            ('/', Some('/')) if prev != Some(':') => {
                let end = text[i..].find('\n').map(|e| i + e).unwrap_or(text.len());
                blank(&mut masked, &text[i..end]);
                comments.push(Comment {
                    start: i,
                    end,
                    block: false,
                });
                skip_to = end;
            }
            ('"' | '\'', _) => {
                let (content_end, end) = string_end(text, i, c);
                masked.push(c);
                blank(&mut masked, &text[i + 1..content_end]);
                masked.push_str(&text[content_end..end]);
                skip_to = end;
                prev = Some(c);
            }
            _ => {
                masked.push(c);
                prev = Some(c);
            }
        }
    }

    (masked, comments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_keeps_offsets() {
        let text = "a { content: \"{;}\"; } // x { }\n/* é */b{}";
        let (masked, comments) = mask(text);

        assert_eq!(masked.len(), text.len());
        let blanks = " ".repeat(8);
        assert_eq!(masked, format!("a {{ content: \"   \"; }} {blanks}\n{blanks}b{{}}"));
        assert_eq!(comments.len(), 2);
        assert!(!comments[0].block);
        assert!(comments[1].block);
    }

    #[test]
    fn test_url_is_not_a_comment() {
        let (masked, comments) = mask("a { background: url(http://x/y.png); }");
        assert!(comments.is_empty());
        assert!(masked.contains("http://x"));
    }

    #[test]
    fn test_blocks_and_nesting() {
        let sheet = Stylesheet::parse(
            ".nav {\n  @media print {\n    .item { color: red; }\n  }\n  font: {\n    size: 1px;\n  }\n}\n",
        );
        let headers: Vec<_> = sheet.blocks.iter().map(|b| b.header.as_str()).collect();
        assert_eq!(headers, vec![".nav", "@media print", ".item", "font:"]);

        let item = &sheet.blocks[2];
        assert_eq!(item.nesting, 1);
        assert!(item.is_ruleset());
        assert!(!sheet.blocks[1].is_ruleset());
        assert!(!sheet.blocks[3].is_ruleset());
    }

    #[test]
    fn test_interpolation_is_not_a_block() {
        let sheet = Stylesheet::parse(".col-#{$i} {\n  width: #{$w}px;\n}\n");
        assert_eq!(sheet.blocks.len(), 1);
        assert_eq!(sheet.blocks[0].header, ".col-#{$i}");
        assert_eq!(sheet.declarations[0].property, "width");
        assert_eq!(sheet.declarations[0].value, "#{$w}px");
    }

    #[test]
    fn test_declarations_and_positions() {
        let text = "$base: #fff;\n.a {\n  color: $base;\n  @include m;\n  margin: 0\n}\n";
        let sheet = Stylesheet::parse(text);

        let names: Vec<_> = sheet.declarations.iter().map(|d| d.property.as_str()).collect();
        assert_eq!(names, vec!["$base", "color", "margin"]);
        assert!(sheet.declarations[0].is_variable());
        assert_eq!(sheet.declarations[0].block, None);
        assert_eq!(sheet.declarations[1].block, Some(0));

        let color = &sheet.declarations[1];
        assert_eq!(&text[color.value_start..color.value_start + 5], "$base");
        assert_eq!(sheet.locate(color.start), (3, 3));
    }

    #[test]
    fn test_line_info() {
        let sheet = Stylesheet::parse("a,\nb {\n  x: y;\n}\n");
        let depths: Vec<_> = sheet.lines.iter().map(|l| l.depth).collect();
        let continued: Vec<_> = sheet.lines.iter().map(|l| l.continuation).collect();

        assert_eq!(depths, vec![0, 0, 1, 1, 0]);
        assert_eq!(continued, vec![false, true, false, false, false]);
        assert_eq!(sheet.line_text(2), "  x: y;");
    }
}
