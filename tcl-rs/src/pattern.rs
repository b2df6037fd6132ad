//! Pattern matching for `string match`, `switch`, and `glob`.
//!
//! Two modes: glob (`*`, `?`, `[…]` classes, `\` escapes) and full
//! regular expressions.  Glob patterns are translated into anchored
//! regexes and compiled with the `regex` crate; regexp mode compiles
//! the source unchanged and matches unanchored.

use regex::{Regex, RegexBuilder};

// ── Public types ─────────────────────────────────────────────────────────────

/// Which matching algorithm a [`Pattern`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Glob,
    Regexp,
}

/// Error returned when a pattern cannot be compiled.
#[derive(Debug)]
pub enum PatternError {
    InvalidRegex(regex::Error),
}

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternError::InvalidRegex(e) => write!(f, "regex error: {e}"),
        }
    }
}

impl std::error::Error for PatternError {}

/// A compiled pattern ready for matching.
#[derive(Debug, Clone)]
pub struct Pattern {
    src: String,
    mode: MatchMode,
    re: Regex,
}

impl Pattern {
    /// Compile `src` using `mode`.  `nocase` makes matching
    /// case-insensitive in either mode.
    pub fn new(src: &str, mode: MatchMode, nocase: bool) -> Result<Self, PatternError> {
        let expr = match mode {
            MatchMode::Glob => glob_to_regex(src),
            MatchMode::Regexp => src.to_owned(),
        };
        let re = RegexBuilder::new(&expr)
            .case_insensitive(nocase)
            .build()
            .map_err(PatternError::InvalidRegex)?;
        Ok(Self {
            src: src.to_owned(),
            mode,
            re,
        })
    }

    /// The original source string.
    pub fn src(&self) -> &str {
        &self.src
    }

    /// The match mode.
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Returns `true` if this pattern matches `text`.
    pub fn matches(&self, text: &str) -> bool {
        self.re.is_match(text)
    }
}

/// Convenience wrapper: glob-match `text` against `pat`.  Returns
/// `false` for patterns that fail to compile (e.g. a reversed class
/// range), matching the forgiving behavior of the commands that use it.
pub fn glob_match(pat: &str, text: &str, nocase: bool) -> bool {
    Pattern::new(pat, MatchMode::Glob, nocase)
        .map(|p| p.matches(text))
        .unwrap_or(false)
}

// ── Glob translation ──────────────────────────────────────────────────────────

/// Translate a glob pattern into an anchored regex source string.
///
/// `*` → `.*`, `?` → `.`, `[…]` passes through as a character class
/// (leading `!` or `^` negates), `\x` matches `x` literally, and every
/// other character is escaped.
fn glob_to_regex(pat: &str) -> String {
    let mut re = String::with_capacity(pat.len() + 8);
    re.push('^');
    let mut chars = pat.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                let mut class = String::new();
                if matches!(chars.peek(), Some('!' | '^')) {
                    chars.next();
                    class.push('^');
                }
                // A leading `]` is literal, not the closing bracket.
                if chars.peek() == Some(&']') {
                    chars.next();
                    class.push_str("\\]");
                }
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            class.push('\\');
                            if let Some(next) = chars.next() {
                                class.push(next);
                            } else {
                                class.push('\\');
                            }
                        }
                        '[' => class.push_str("\\["),
                        c => class.push(c),
                    }
                }
                if closed {
                    re.push('[');
                    re.push_str(&class);
                    re.push(']');
                } else {
                    // Unterminated class: match the text literally.
                    re.push_str(&regex::escape("["));
                    re.push_str(&regex::escape(&class));
                }
            }
            '\\' => match chars.next() {
                Some(c) => re.push_str(&regex::escape(&c.to_string())),
                None => re.push_str("\\\\"),
            },
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    re
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_anything() {
        assert!(glob_match("*", "hello world", false));
        assert!(glob_match("*", "", false));
    }

    #[test]
    fn question_mark_single_char() {
        assert!(glob_match("h?llo", "hello", false));
        assert!(!glob_match("h?llo", "hllo", false));
    }

    #[test]
    fn anchored_both_ends() {
        assert!(!glob_match("world", "hello world", false));
        assert!(glob_match("*world", "hello world", false));
        assert!(glob_match("hello*", "hello world", false));
    }

    #[test]
    fn character_class() {
        assert!(glob_match("[aeiou]nce", "once", false));
        assert!(!glob_match("[aeiou]nce", "bnce", false));
        assert!(glob_match("[a-z]*", "tcl", false));
        assert!(glob_match("[!0-9]x", "ax", false));
        assert!(!glob_match("[!0-9]x", "1x", false));
    }

    #[test]
    fn escaped_metachars() {
        assert!(glob_match("a\\*b", "a*b", false));
        assert!(!glob_match("a\\*b", "axb", false));
        assert!(glob_match("a.b", "a.b", false));
        assert!(!glob_match("a.b", "axb", false));
    }

    #[test]
    fn case_sensitivity() {
        assert!(!glob_match("Hello", "hello", false));
        assert!(glob_match("Hello", "hello", true));
    }

    #[test]
    fn regexp_mode_unanchored() {
        let p = Pattern::new("b+c", MatchMode::Regexp, false).unwrap();
        assert!(p.matches("abbbcd"));
        assert!(!p.matches("acd"));
    }

    #[test]
    fn bad_regexp_reports() {
        assert!(Pattern::new("a(", MatchMode::Regexp, false).is_err());
    }

    #[test]
    fn bad_class_range_is_forgiven() {
        assert!(!glob_match("[z-a]", "m", false));
    }
}
