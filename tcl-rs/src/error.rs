//! Interpreter error types.
//!
//! Script-visible failures fall into a small taxonomy.  `Name`, `Arity`,
//! `Type`, and `Runtime` errors are catchable by the `catch` command;
//! `Syntax` marks malformed source text, which is reported on the error
//! sink and aborts the parse unit without ever reaching `catch`; `Exit`
//! carries the `exit` command's status code through every handler.

use std::error::Error;
use std::fmt;

/// An error raised while parsing or executing script text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TclError {
    /// Unknown variable, command, or proc.
    Name(String),
    /// Wrong number of arguments to a command or proc.
    Arity(String),
    /// A value refused a numeric or index coercion.
    Type(String),
    /// Any other script-level failure.
    Runtime(String),
    /// Malformed source text.  Reported, never caught.
    Syntax(String),
    /// Raised by `exit`; unwinds through `catch`.
    Exit(i32),
}

pub type TclResult<T> = Result<T, TclError>;

impl TclError {
    /// The message text as `catch` stores it.
    pub fn message(&self) -> String {
        match self {
            TclError::Name(m)
            | TclError::Arity(m)
            | TclError::Type(m)
            | TclError::Runtime(m)
            | TclError::Syntax(m) => m.clone(),
            TclError::Exit(code) => format!("exit {code}"),
        }
    }

    /// Whether `catch` may intercept this error.
    pub fn catchable(&self) -> bool {
        !matches!(self, TclError::Syntax(_) | TclError::Exit(_))
    }

    pub(crate) fn wrong_num_args(usage: &str) -> TclError {
        TclError::Arity(format!("wrong # args: should be \"{usage}\""))
    }

    pub(crate) fn bad_integer(got: &str) -> TclError {
        TclError::Type(format!("expected integer but got \"{got}\""))
    }

    pub(crate) fn bad_real(got: &str) -> TclError {
        TclError::Type(format!("expected number but got \"{got}\""))
    }

    pub(crate) fn bad_index(got: &str) -> TclError {
        TclError::Type(format!(
            "bad index \"{got}\": must be integer or end?-integer?"
        ))
    }

    pub(crate) fn unknown_command(name: &str) -> TclError {
        TclError::Name(format!("invalid command name \"{name}\""))
    }

    pub(crate) fn no_such_variable(name: &str) -> TclError {
        TclError::Name(format!("can't read \"{name}\": no such variable"))
    }
}

impl fmt::Display for TclError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl Error for TclError {}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_formats() {
        assert_eq!(
            TclError::wrong_num_args("set varName ?newValue?").message(),
            "wrong # args: should be \"set varName ?newValue?\""
        );
        assert_eq!(
            TclError::bad_integer("abc").message(),
            "expected integer but got \"abc\""
        );
        assert_eq!(
            TclError::unknown_command("nope").message(),
            "invalid command name \"nope\""
        );
        assert_eq!(
            TclError::no_such_variable("x").message(),
            "can't read \"x\": no such variable"
        );
    }

    #[test]
    fn catchable_split() {
        assert!(TclError::Name("x".into()).catchable());
        assert!(TclError::Runtime("x".into()).catchable());
        assert!(!TclError::Syntax("Unterminated string".into()).catchable());
        assert!(!TclError::Exit(0).catchable());
    }
}
