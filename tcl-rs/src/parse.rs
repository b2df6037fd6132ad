//! Script text scanning: character sources, word forms, and the
//! substitution-free list scanner.
//!
//! A statement is a sequence of words terminated by `;`, a newline, or end
//! of input.  Words take these forms:
//!
//! | Form        | Meaning                                                |
//! |-------------|--------------------------------------------------------|
//! | `{ ... }`   | Brace-quoted: verbatim, nests, may span lines          |
//! | `" ... "`   | Double-quoted: `[`, `$`, and `\` are processed         |
//! | `' ... '`   | Single-quoted: verbatim, single line                   |
//! | `[ ... ]`   | Command substitution                                   |
//! | `$name`     | Variable substitution (`${name}`, `$name(index)`)      |
//! | bare        | Unquoted; `[`, `$` processed, `\` quotes the next char |
//!
//! The interpreter-coupled readers (which perform `$`/`[]` substitution
//! against live state) live with the interpreter; this module holds the
//! pieces that need no interpreter: [`CharSource`], the backslash escape
//! table, [`string_to_list`], and [`is_complete_line`].

use std::fs::File;
use std::io::{BufRead, BufReader};

use crate::value::Value;

// ── Character classes ─────────────────────────────────────────────────────────

/// ASCII whitespace as the scanner sees it.
pub(crate) fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0b' | '\x0c' | '\r')
}

/// Characters allowed in a bare variable name (`$name`).  `:` is included
/// so qualified names like `$ns::x` scan as one token.
pub(crate) fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

// ── Character sources ─────────────────────────────────────────────────────────

/// A stream of characters being parsed: either an in-memory string or a
/// file read line by line.
///
/// File sources refill lazily: when the buffer is exhausted and the file has
/// more lines, the next line is appended, prefixed with the current
/// statement separator so that line boundaries terminate statements.  Lines
/// ending in `\` are joined with the following line (leading whitespace of
/// the continuation stripped) before they ever reach the scanner.
pub(crate) struct CharSource {
    chars: Vec<char>,
    pos: usize,
    input: Option<FileInput>,
}

struct FileInput {
    reader: BufReader<File>,
    done: bool,
}

impl CharSource {
    pub(crate) fn text(text: &str) -> Self {
        CharSource {
            chars: text.chars().collect(),
            pos: 0,
            input: None,
        }
    }

    pub(crate) fn file(file: File) -> Self {
        CharSource {
            chars: Vec::new(),
            pos: 0,
            input: Some(FileInput {
                reader: BufReader::new(file),
                done: false,
            }),
        }
    }

    /// Next character without consuming it.  Never refills.
    pub(crate) fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Consume and return the next buffered character.  Never refills.
    pub(crate) fn next_char(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    /// True when the source is exhausted.  For file sources this pulls the
    /// next line into the buffer first, joining `\`-continued lines and
    /// prefixing `separator` when earlier input has already been consumed.
    pub(crate) fn at_end(&mut self, separator: char) -> bool {
        loop {
            if self.pos < self.chars.len() {
                return false;
            }
            let Some(input) = &mut self.input else {
                return true;
            };
            if input.done {
                return true;
            }
            match read_joined_line(&mut input.reader) {
                Some(line) => {
                    if self.pos > 0 {
                        self.chars.push(separator);
                    }
                    self.chars.extend(line.chars());
                }
                None => input.done = true,
            }
        }
    }

    /// Decode a backslash escape starting at the cursor (the `\` itself
    /// already consumed).  Works on the buffer only; never refills.
    pub(crate) fn escape(&mut self) -> Option<char> {
        let mut pos = self.pos;
        let c = decode_escape(&self.chars, &mut pos)?;
        self.pos = pos;
        Some(c)
    }
}

/// Read one logical line: physical lines ending in `\` are joined with the
/// next line, a single space replacing the backslash and the continuation's
/// leading whitespace.
fn read_joined_line(reader: &mut BufReader<File>) -> Option<String> {
    let mut line = read_raw_line(reader)?;
    while line.ends_with('\\') {
        line.pop();
        let Some(next) = read_raw_line(reader) else {
            break;
        };
        line.push(' ');
        line.push_str(next.trim_start());
    }
    Some(line)
}

fn read_raw_line(reader: &mut BufReader<File>) -> Option<String> {
    let mut buf = String::new();
    match reader.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => {
            if buf.ends_with('\n') {
                buf.pop();
                if buf.ends_with('\r') {
                    buf.pop();
                }
            }
            Some(buf)
        }
    }
}

// ── Backslash escapes ─────────────────────────────────────────────────────────

/// Decode one backslash escape at `pos` (the character after the `\`),
/// advancing `pos` past it.  Returns `None` when the input ends at the
/// backslash.
///
/// Recognized: `\a \b \f \n \r \t \v`, up to three octal digits, and `\x`
/// followed by any run of hex digits (value wraps at a byte).  Anything
/// else stands for itself.
pub(crate) fn decode_escape(chars: &[char], pos: &mut usize) -> Option<char> {
    let c = *chars.get(*pos)?;
    *pos += 1;
    Some(match c {
        'a' => '\x07',
        'b' => '\x08',
        'f' => '\x0c',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\x0b',
        '0'..='7' => {
            let mut value = c as u8 - b'0';
            let mut num = 1;
            while num < 3 {
                match chars.get(*pos) {
                    Some(&d) if ('0'..='7').contains(&d) => {
                        value = value.wrapping_shl(3) | (d as u8 - b'0');
                        *pos += 1;
                        num += 1;
                    }
                    _ => break,
                }
            }
            char::from(value)
        }
        'x' => {
            let mut value: u8 = 0;
            while let Some(&d) = chars.get(*pos) {
                let nibble = match d {
                    '0'..='9' => d as u8 - b'0',
                    'a'..='f' => d as u8 - b'a',
                    'A'..='F' => d as u8 - b'A',
                    _ => break,
                };
                value = value.wrapping_shl(4) | nibble;
                *pos += 1;
            }
            char::from(value)
        }
        other => other,
    })
}

// ── List scanning ─────────────────────────────────────────────────────────────

/// Split a string into list elements without performing any substitution.
///
/// Elements are separated by whitespace.  `{...}` groups verbatim (nested
/// braces preserved), `"..."` groups with backslash escapes decoded, and in
/// bare words a backslash quotes the following character.  Malformed input
/// (an unterminated brace or quote) ends the scan; elements already
/// complete are kept.
pub fn string_to_list(text: &str) -> Vec<Value> {
    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0;
    let mut items = Vec::new();

    while pos < chars.len() {
        while pos < chars.len() && is_space(chars[pos]) {
            pos += 1;
        }
        if pos >= chars.len() {
            break;
        }
        match chars[pos] {
            '{' => {
                let Some(word) = scan_braced(&chars, &mut pos) else {
                    break;
                };
                items.push(Value::from(word));
            }
            '"' => {
                let Some(word) = scan_quoted(&chars, &mut pos) else {
                    break;
                };
                items.push(Value::from(word));
            }
            _ => {
                let mut word = String::new();
                while pos < chars.len() && !is_space(chars[pos]) {
                    let c = chars[pos];
                    pos += 1;
                    if c == '\\' {
                        if let Some(&next) = chars.get(pos) {
                            word.push(next);
                            pos += 1;
                        }
                    } else {
                        word.push(c);
                    }
                }
                items.push(Value::from(word));
            }
        }
    }
    items
}

/// Scan `{...}` starting at the opening brace; returns the body with nested
/// braces intact, or `None` if the closer is missing.
fn scan_braced(chars: &[char], pos: &mut usize) -> Option<String> {
    *pos += 1;
    let mut out = String::new();
    while *pos < chars.len() {
        match chars[*pos] {
            '}' => {
                *pos += 1;
                return Some(out);
            }
            '{' => {
                let inner = scan_braced(chars, pos)?;
                out.push('{');
                out.push_str(&inner);
                out.push('}');
            }
            c => {
                out.push(c);
                *pos += 1;
            }
        }
    }
    None
}

/// Scan `"..."` starting at the opening quote; backslash escapes are
/// decoded, nothing else is special.  `None` if the closer is missing.
fn scan_quoted(chars: &[char], pos: &mut usize) -> Option<String> {
    *pos += 1;
    let mut out = String::new();
    while *pos < chars.len() {
        match chars[*pos] {
            '"' => {
                *pos += 1;
                return Some(out);
            }
            '\\' => {
                *pos += 1;
                out.push(decode_escape(chars, pos)?);
            }
            c => {
                out.push(c);
                *pos += 1;
            }
        }
    }
    None
}

// ── Completeness check ────────────────────────────────────────────────────────

/// True when `text` has no unclosed `[`, `{`, `"`, or `'`.
///
/// Line editors use this to decide whether to keep prompting for
/// continuation lines before handing the accumulated text to the
/// interpreter.  A backslash skips the following character.
pub fn is_complete_line(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0;
    scan_complete(&chars, &mut pos, None)
}

fn scan_complete(chars: &[char], pos: &mut usize, end: Option<char>) -> bool {
    while *pos < chars.len() {
        let c = chars[*pos];
        if c == '[' {
            *pos += 1;
            if !scan_complete(chars, pos, Some(']')) {
                return false;
            }
            if chars.get(*pos) != Some(&']') {
                return false;
            }
            *pos += 1;
        } else if c == '{' {
            *pos += 1;
            if !scan_complete(chars, pos, Some('}')) {
                return false;
            }
            if chars.get(*pos) != Some(&'}') {
                return false;
            }
            *pos += 1;
        } else if end == Some(c) {
            return true;
        } else if c == '"' {
            *pos += 1;
            if !scan_complete(chars, pos, Some('"')) {
                return false;
            }
            if chars.get(*pos) != Some(&'"') {
                return false;
            }
            *pos += 1;
        } else if c == '\'' {
            *pos += 1;
            if !scan_complete(chars, pos, Some('\'')) {
                return false;
            }
            if chars.get(*pos) != Some(&'\'') {
                return false;
            }
            *pos += 1;
        } else if c == '\\' {
            *pos += 2;
        } else {
            *pos += 1;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn list_strings(text: &str) -> Vec<String> {
        string_to_list(text)
            .iter()
            .map(|v| v.to_string())
            .collect()
    }

    #[test]
    fn list_splits_on_whitespace() {
        assert_eq!(list_strings("a b  c"), ["a", "b", "c"]);
        assert_eq!(list_strings("  a\tb\nc  "), ["a", "b", "c"]);
        assert!(list_strings("").is_empty());
        assert!(list_strings("   ").is_empty());
    }

    #[test]
    fn list_braces_group_verbatim() {
        assert_eq!(list_strings("a {b c} d"), ["a", "b c", "d"]);
        assert_eq!(list_strings("{a {b c} d}"), ["a {b c} d"]);
        assert_eq!(list_strings(r#"{no $subst [here]}"#), ["no $subst [here]"]);
    }

    #[test]
    fn list_quotes_decode_escapes() {
        assert_eq!(list_strings(r#"a "b c" d"#), ["a", "b c", "d"]);
        assert_eq!(list_strings(r#""a\tb""#), ["a\tb"]);
        assert_eq!(list_strings(r#""$x [y]""#), ["$x [y]"]);
    }

    #[test]
    fn list_bare_backslash_quotes_next() {
        assert_eq!(list_strings(r"a\ b c"), ["a b", "c"]);
        assert_eq!(list_strings(r"x\{y"), ["x{y"]);
    }

    #[test]
    fn list_unterminated_group_stops_scan() {
        assert_eq!(list_strings("a {b"), ["a"]);
        assert_eq!(list_strings(r#"a "b"#), ["a"]);
    }

    #[test]
    fn escape_table() {
        fn esc(s: &str) -> Option<char> {
            let chars: Vec<char> = s.chars().collect();
            let mut pos = 0;
            decode_escape(&chars, &mut pos)
        }
        assert_eq!(esc("n"), Some('\n'));
        assert_eq!(esc("t"), Some('\t'));
        assert_eq!(esc("q"), Some('q'));
        assert_eq!(esc("101"), Some('A'));
        assert_eq!(esc("7"), Some('\x07'));
        assert_eq!(esc("x41"), Some('A'));
        assert_eq!(esc(""), None);
    }

    #[test]
    fn octal_escape_stops_at_three_digits() {
        let chars: Vec<char> = "1012".chars().collect();
        let mut pos = 0;
        assert_eq!(decode_escape(&chars, &mut pos), Some('A'));
        assert_eq!(pos, 3);
    }

    #[test]
    fn complete_line_balanced() {
        assert!(is_complete_line("set a 5"));
        assert!(is_complete_line("set a {b c}"));
        assert!(is_complete_line("puts [expr {1 + 2}]"));
        assert!(is_complete_line(r#"set a "b c""#));
        assert!(is_complete_line(""));
    }

    #[test]
    fn complete_line_unbalanced() {
        assert!(!is_complete_line("set a {b"));
        assert!(!is_complete_line("puts [expr {1 +"));
        assert!(!is_complete_line(r#"set a "b"#));
        assert!(!is_complete_line("set a 'b"));
    }

    #[test]
    fn complete_line_backslash_skips() {
        assert!(is_complete_line(r"puts \{"));
        assert!(is_complete_line(r"puts \"));
        assert!(!is_complete_line(r"puts {\}"));
    }

    #[test]
    fn text_source_reads_out() {
        let mut src = CharSource::text("ab");
        assert_eq!(src.peek(), Some('a'));
        assert_eq!(src.next_char(), Some('a'));
        assert_eq!(src.next_char(), Some('b'));
        assert_eq!(src.next_char(), None);
        assert!(src.at_end(';'));
    }

    #[test]
    fn file_source_injects_separator_between_lines() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "ab").unwrap();
        writeln!(tmp, "cd").unwrap();
        let mut src = CharSource::file(std::fs::File::open(tmp.path()).unwrap());

        assert!(!src.at_end(';'));
        assert_eq!(src.next_char(), Some('a'));
        assert_eq!(src.next_char(), Some('b'));
        assert!(!src.at_end(';'));
        assert_eq!(src.next_char(), Some(';'));
        assert_eq!(src.next_char(), Some('c'));
        assert_eq!(src.next_char(), Some('d'));
        assert!(src.at_end(';'));
    }

    #[test]
    fn file_source_joins_continuation_lines() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "set a \\\n   5\n").unwrap();
        let mut src = CharSource::file(std::fs::File::open(tmp.path()).unwrap());

        let mut text = String::new();
        while !src.at_end(';') {
            text.push(src.next_char().unwrap_or_default());
        }
        assert_eq!(text, "set a 5");
    }
}
