//! The interpreter.
//!
//! [`Interp`] owns every piece of live state: the scope stack, the active
//! character sources, open channels, pending timers, and the output
//! sinks.  Statement reading and evaluation interleave: the argument
//! readers perform `$` and `[...]` substitution against live state, so
//! parsing a line can dispatch commands and dispatching a command can
//! re-enter the parser.
//!
//! Script control flow travels as a [`Signal`] (break, continue, return)
//! checked by the statement loop and the looping builtins.  Errors travel
//! as [`TclError`] results; raising a catchable error tears the scope
//! stack down to the global scope before the error propagates, so only
//! the global scope is active by the time `catch` sees it.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::rc::Rc;

use crate::commands;
use crate::error::{TclError, TclResult};
use crate::expr::{format_number, DefaultEval, ExprEval};
use crate::history::CommandHistory;
use crate::os::{
    OsAccess, OutTarget, Pipeline, PipelineStage, ProcessResult, ProcessRunner, RealOs,
    RealRunner, StdinSource,
};
use crate::parse::{is_name_char, is_space, CharSource};
use crate::scope::{Proc, ScopeId, ScopePool, VarRef, Variable, GLOBAL_SCOPE};
use crate::value::Value;

/// Nested evaluations allowed before a runaway script is cut off.
const MAX_EVAL_DEPTH: u32 = 1000;

// ── Control-flow signal ───────────────────────────────────────────────────────

/// Pending script control flow, raised by `break`, `continue`, or
/// `return` and consumed by the innermost construct that handles it.
/// The statement loop stops executing while a signal is set.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) enum Signal {
    #[default]
    None,
    Break,
    Continue,
    /// Carries the `return` value; `Value::None` for a bare `return`.
    Return(Value),
}

// ── Command frames ────────────────────────────────────────────────────────────

/// One entry of the live builtin stack.  `break`/`continue` consult the
/// `iterates` flags of the enclosing frames to decide legality.
struct CommandFrame {
    iterates: bool,
}

// ── Channels ──────────────────────────────────────────────────────────────────

/// An open script channel: the backing file plus byte-wise read state.
/// Reads go a byte at a time so `gets` stops exactly at each newline.
pub(crate) struct TclFile {
    path: String,
    file: File,
    eof: bool,
}

impl TclFile {
    fn new(path: &str, file: File) -> Self {
        TclFile {
            path: path.to_owned(),
            file,
            eof: false,
        }
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn at_eof(&self) -> bool {
        self.eof
    }

    /// Read up to the next newline (consumed, not returned).  Hitting
    /// end of file marks the channel and returns what was gathered.
    pub(crate) fn read_line(&mut self) -> String {
        let mut line = String::new();
        let mut byte = [0u8; 1];
        loop {
            match self.file.read(&mut byte) {
                Ok(0) | Err(_) => {
                    self.eof = true;
                    break;
                }
                Ok(_) => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    line.push(byte[0] as char);
                }
            }
        }
        line
    }

    pub(crate) fn read_all(&mut self) -> String {
        let mut buf = Vec::new();
        let _ = self.file.read_to_end(&mut buf);
        self.eof = true;
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub(crate) fn read_chars(&mut self, n: usize) -> String {
        let mut buf = vec![0u8; n];
        let mut got = 0;
        while got < n {
            match self.file.read(&mut buf[got..]) {
                Ok(0) | Err(_) => {
                    self.eof = true;
                    break;
                }
                Ok(k) => got += k,
            }
        }
        String::from_utf8_lossy(&buf[..got]).into_owned()
    }

    /// Write errors are swallowed, matching stream-style output.
    pub(crate) fn write_str(&mut self, text: &str) {
        let _ = self.file.write_all(text.as_bytes());
    }

    pub(crate) fn flush(&mut self) {
        let _ = self.file.flush();
    }
}

// ── Timers ────────────────────────────────────────────────────────────────────

/// One pending `after` script.
struct Timer {
    deadline_us: i64,
    script: String,
}

// ── Interp ────────────────────────────────────────────────────────────────────

/// The interpreter.  Embedders drive it through [`Interp::parse_line`],
/// [`Interp::parse_string`], and [`Interp::parse_file`], and may swap
/// the output sinks and OS collaborators for captured or mocked ones.
pub struct Interp {
    scopes: ScopePool,
    scope_stack: Vec<ScopeId>,
    command_stack: Vec<CommandFrame>,
    proc_stack: Vec<String>,
    signal: Signal,
    sources: Vec<CharSource>,
    separator: char,
    depth: u32,
    debug: bool,
    history: CommandHistory,
    files: BTreeMap<String, TclFile>,
    stdin_eof: bool,
    timers: BTreeMap<String, Timer>,
    next_timer_id: u64,
    out: Box<dyn Write>,
    err: Box<dyn Write>,
    expr_eval: Box<dyn ExprEval>,
    os: Box<dyn OsAccess>,
    runner: Box<dyn ProcessRunner>,
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

impl Interp {
    pub fn new() -> Self {
        let mut scopes = ScopePool::new();
        let global = scopes.get_mut(GLOBAL_SCOPE);
        global.add_var("env", Rc::new(std::cell::RefCell::new(Variable::env())));
        global.add_value("argc", Value::from("0"));
        global.add_value("argv0", Value::from(""));
        global.add_value("argv", Value::List(Vec::new()));
        Interp {
            scopes,
            scope_stack: vec![GLOBAL_SCOPE],
            command_stack: Vec::new(),
            proc_stack: Vec::new(),
            signal: Signal::None,
            sources: Vec::new(),
            separator: ';',
            depth: 0,
            debug: false,
            history: CommandHistory::default(),
            files: BTreeMap::new(),
            stdin_eof: false,
            timers: BTreeMap::new(),
            next_timer_id: 0,
            out: Box::new(io::stdout()),
            err: Box::new(io::stderr()),
            expr_eval: Box::new(DefaultEval),
            os: Box::new(RealOs),
            runner: Box::new(RealRunner),
        }
    }

    /// Record the program name and script arguments as the `argv0`,
    /// `argc`, and `argv` globals.
    pub fn set_program_args(&mut self, argv0: &str, args: &[String]) {
        let global = self.scopes.get_mut(GLOBAL_SCOPE);
        global.add_value("argv0", Value::from(argv0));
        global.add_value("argc", Value::from(args.len() as i64));
        global.add_value(
            "argv",
            Value::List(args.iter().map(|a| Value::from(a.as_str())).collect()),
        );
    }

    /// Toggle the execution trace (`Exec:`/`Start:`/`End:` lines and
    /// per-statement results, on the error sink).
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Replace the standard output sink (`puts` and friends).
    pub fn set_out(&mut self, out: Box<dyn Write>) {
        self.out = out;
    }

    /// Replace the error sink (error reports and the debug trace).
    pub fn set_err(&mut self, err: Box<dyn Write>) {
        self.err = err;
    }

    pub fn set_expr_eval(&mut self, expr_eval: Box<dyn ExprEval>) {
        self.expr_eval = expr_eval;
    }

    pub fn set_os(&mut self, os: Box<dyn OsAccess>) {
        self.os = os;
    }

    pub fn set_runner(&mut self, runner: Box<dyn ProcessRunner>) {
        self.runner = runner;
    }

    pub(crate) fn os(&self) -> &dyn OsAccess {
        self.os.as_ref()
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    // ── Output sinks ──────────────────────────────────────────────────────────

    pub(crate) fn out_str(&mut self, text: &str) {
        let _ = write!(self.out, "{text}");
        let _ = self.out.flush();
    }

    pub(crate) fn out_line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{text}");
        let _ = self.out.flush();
    }

    pub(crate) fn err_str(&mut self, text: &str) {
        let _ = write!(self.err, "{text}");
        let _ = self.err.flush();
    }

    pub(crate) fn err_line(&mut self, text: &str) {
        let _ = writeln!(self.err, "{text}");
        let _ = self.err.flush();
    }

    pub(crate) fn flush_out(&mut self) {
        let _ = self.out.flush();
    }

    pub(crate) fn flush_err(&mut self) {
        let _ = self.err.flush();
    }

    // ── Top-level entry points ────────────────────────────────────────────────

    /// Evaluate one interactive line: the result of its last statement,
    /// with catchable errors reported on the error sink and consumed.
    /// The line is recorded in the history unless an error was thrown.
    pub fn parse_line(&mut self, line: &str) -> TclResult<Option<Value>> {
        match self.parse_string(line) {
            Ok(value) => {
                self.history.record(line);
                Ok(value)
            }
            Err(err) if err.catchable() => {
                self.err_line(&err.message());
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Evaluate script text and return the last statement's result.
    /// Parse failures are reported on the error sink and yield `None`;
    /// catchable errors propagate to the caller.
    pub fn parse_string(&mut self, text: &str) -> TclResult<Option<Value>> {
        self.sources.push(CharSource::text(text));
        let result = self.run_statements();
        self.sources.pop();
        match result {
            Err(TclError::Syntax(msg)) => {
                self.err_line(&msg);
                Ok(None)
            }
            other => other,
        }
    }

    /// Execute a script file statement by statement.  Returns `false`
    /// when the file was unreadable or malformed; an error thrown by a
    /// statement is reported, stops the file, and still returns `true`.
    pub fn parse_file(&mut self, path: &str) -> TclResult<bool> {
        if !self.os.stat(path).is_some_and(|st| st.is_file) {
            self.err_line(&format!("Invalid file {path}"));
            return Ok(false);
        }
        let file = match File::open(path) {
            Ok(file) => file,
            Err(_) => {
                self.err_line(&format!("Invalid file {path}"));
                return Ok(false);
            }
        };
        self.sources.push(CharSource::file(file));
        let mut rc = true;
        while !self.src_at_end() {
            let step = self
                .read_arg_list()
                .and_then(|args| self.eval_args(&args));
            match step {
                Ok(value) => {
                    if self.debug {
                        if let Some(value) = &value {
                            let text = value.to_string();
                            self.err_line(&text);
                        }
                    }
                }
                Err(TclError::Syntax(msg)) => {
                    self.err_line(&msg);
                    rc = false;
                    break;
                }
                Err(err) if err.catchable() => {
                    self.err_line(&err.message());
                    break;
                }
                Err(err) => {
                    self.sources.pop();
                    return Err(err);
                }
            }
        }
        self.sources.pop();
        Ok(rc)
    }

    /// The statement loop behind [`Interp::parse_string`]: evaluate until
    /// the source ends or a control-flow signal asks to stop.
    fn run_statements(&mut self) -> TclResult<Option<Value>> {
        let mut result = None;
        while !self.src_at_end() {
            let args = self.read_arg_list()?;
            result = self.eval_args(&args)?;
            if self.debug {
                if let Some(value) = &result {
                    let text = value.to_string();
                    self.err_line(&text);
                }
            }
            if self.signal != Signal::None {
                break;
            }
        }
        Ok(result)
    }

    // ── Source cursor ─────────────────────────────────────────────────────────

    fn src(&mut self) -> &mut CharSource {
        match self.sources.last_mut() {
            Some(src) => src,
            None => unreachable!("no active source"),
        }
    }

    /// End-of-source test; for file sources this is also the refill
    /// point, joining the next line on with the current separator.
    fn src_at_end(&mut self) -> bool {
        let separator = self.separator;
        match self.sources.last_mut() {
            Some(src) => src.at_end(separator),
            None => true,
        }
    }

    // ── Argument reading ──────────────────────────────────────────────────────

    /// Read one statement's worth of words, performing substitution.
    /// Consumes the terminating `;`/newline; returns at end of source.
    pub(crate) fn read_arg_list(&mut self) -> TclResult<Vec<Value>> {
        let mut args = Vec::new();
        while !self.src_at_end() {
            while matches!(self.src().peek(), Some(' ' | '\t')) {
                self.src().next_char();
            }
            if self.src_at_end() {
                return Ok(args);
            }
            let Some(c) = self.src().peek() else {
                continue;
            };
            match c {
                ';' | '\n' => {
                    self.src().next_char();
                    return Ok(args);
                }
                '[' => {
                    let words = self.read_exec_string()?;
                    let value = self.eval_args(&words)?;
                    let Some(value) = value else {
                        return Err(TclError::Syntax("Invalid value".to_owned()));
                    };
                    args.push(Value::from(value.to_string()));
                }
                ']' => {
                    // A stray closer ends the statement; leaving it
                    // unread would wedge the statement loop.
                    self.src().next_char();
                    return Ok(args);
                }
                '{' => {
                    let body = self.read_brace_string()?;
                    args.push(Value::from(body));
                }
                '"' => {
                    let text = self.read_double_quoted()?;
                    args.push(Value::from(text));
                }
                '\'' => {
                    let text = self.read_single_quoted()?;
                    args.push(Value::from(text));
                }
                '$' => {
                    self.src().next_char();
                    let value = self.read_variable_value()?;
                    let ends_word = match self.src().peek() {
                        None => true,
                        Some(c) => is_space(c) || c == ';',
                    };
                    if ends_word {
                        // A whole-word variable keeps its shape; lists
                        // and arrays pass through unstringified.
                        args.push(value);
                    } else {
                        let mut text = value.to_string();
                        text.push_str(&self.read_word(';')?);
                        args.push(Value::from(text));
                    }
                }
                _ => {
                    let word = self.read_word(';')?;
                    args.push(Value::from(word));
                }
            }
        }
        Ok(args)
    }

    /// Read the words of a `[...]` command substitution.  The opening
    /// bracket has been seen but not consumed; the closer is consumed.
    fn read_exec_string(&mut self) -> TclResult<Vec<Value>> {
        self.src().next_char();
        let mut args = Vec::new();
        loop {
            if self.src_at_end() {
                return Err(TclError::Syntax("Unterminated string".to_owned()));
            }
            while matches!(self.src().peek(), Some(c) if is_space(c)) {
                self.src().next_char();
            }
            let Some(c) = self.src().peek() else {
                continue;
            };
            match c {
                ']' => {
                    self.src().next_char();
                    return Ok(args);
                }
                '{' => {
                    let body = self.read_brace_string()?;
                    args.push(Value::from(body));
                }
                '"' => {
                    let text = self.read_double_quoted()?;
                    args.push(Value::from(text));
                }
                '\'' => {
                    let text = self.read_single_quoted()?;
                    args.push(Value::from(text));
                }
                _ => {
                    let word = self.read_word(']')?;
                    args.push(Value::from(word));
                }
            }
        }
    }

    /// Read `{...}` verbatim.  Statement separation switches to newline
    /// for the duration so a later re-parse of the captured text splits
    /// at line boundaries, not at embedded `;` text.
    fn read_brace_string(&mut self) -> TclResult<String> {
        let saved = self.separator;
        self.separator = '\n';
        let result = self.read_brace_body();
        self.separator = saved;
        result
    }

    fn read_brace_body(&mut self) -> TclResult<String> {
        self.src().next_char();
        let mut out = String::new();
        loop {
            if self.src_at_end() {
                return Err(TclError::Syntax("Unterminated string".to_owned()));
            }
            match self.src().peek() {
                Some('}') => {
                    self.src().next_char();
                    return Ok(out);
                }
                Some('{') => {
                    let inner = self.read_brace_body()?;
                    out.push('{');
                    out.push_str(&inner);
                    out.push('}');
                }
                Some(c) => {
                    self.src().next_char();
                    out.push(c);
                }
                None => {}
            }
        }
    }

    /// Read `"..."`: `[...]` and `$...` substitute, backslash escapes
    /// decode through the escape table.  Single line only.
    fn read_double_quoted(&mut self) -> TclResult<String> {
        self.src().next_char();
        let mut out = String::new();
        loop {
            match self.src().peek() {
                None => return Err(TclError::Syntax("Invalid char".to_owned())),
                Some('"') => {
                    self.src().next_char();
                    return Ok(out);
                }
                Some('[') => {
                    let words = self.read_exec_string()?;
                    let value = self.eval_args(&words)?;
                    let Some(value) = value else {
                        return Err(TclError::Syntax("Invalid value".to_owned()));
                    };
                    out.push_str(&value.to_string());
                }
                Some('$') => {
                    self.src().next_char();
                    let value = self.read_variable_value()?;
                    out.push_str(&value.to_string());
                }
                Some('\\') => {
                    self.src().next_char();
                    match self.src().escape() {
                        Some(c) => out.push(c),
                        None => {
                            return Err(TclError::Syntax("Invalid char after \\".to_owned()));
                        }
                    }
                }
                Some(c) => {
                    self.src().next_char();
                    out.push(c);
                }
            }
        }
    }

    /// Read `'...'` verbatim, no escapes.
    fn read_single_quoted(&mut self) -> TclResult<String> {
        self.src().next_char();
        let mut out = String::new();
        loop {
            match self.src().peek() {
                None => return Err(TclError::Syntax("Unterminated string".to_owned())),
                Some('\'') => {
                    self.src().next_char();
                    return Ok(out);
                }
                Some(c) => {
                    self.src().next_char();
                    out.push(c);
                }
            }
        }
    }

    /// Read a bare word up to whitespace or `end`.  `[...]` and `$...`
    /// substitute stringified; backslash yields the next character raw
    /// (no escape table, unlike double quotes).
    fn read_word(&mut self, end: char) -> TclResult<String> {
        let mut out = String::new();
        loop {
            if self.src_at_end() {
                return Ok(out);
            }
            let Some(c) = self.src().peek() else {
                continue;
            };
            if is_space(c) || c == end {
                return Ok(out);
            }
            match c {
                '[' => {
                    let words = self.read_exec_string()?;
                    let value = self.eval_args(&words)?;
                    let Some(value) = value else {
                        return Err(TclError::Syntax("Invalid value".to_owned()));
                    };
                    out.push_str(&value.to_string());
                }
                '$' => {
                    self.src().next_char();
                    let value = self.read_variable_value()?;
                    out.push_str(&value.to_string());
                }
                '\\' => {
                    self.src().next_char();
                    match self.src().next_char() {
                        Some(raw) => out.push(raw),
                        None => {
                            return Err(TclError::Syntax("Invalid char after \\".to_owned()));
                        }
                    }
                }
                _ => {
                    self.src().next_char();
                    out.push(c);
                }
            }
        }
    }

    // ── Variable substitution ─────────────────────────────────────────────────

    /// Read the reference after a consumed `$` and produce its value.
    /// A missing variable raises with the bare name; the index never
    /// appears in the message.
    fn read_variable_value(&mut self) -> TclResult<Value> {
        let (name, index) = self.read_variable_name()?;
        let value = match &index {
            Some(index) => self.array_var_value(&name, index),
            None => self.var_value(&name),
        };
        match value {
            Some(value) => Ok(value),
            None => self.raise(TclError::no_such_variable(&name)),
        }
    }

    /// Read `${name}`, a bare name of letters/digits/`_`/`:`, and an
    /// optional `(index)` suffix whose text receives `$` expansion.
    fn read_variable_name(&mut self) -> TclResult<(String, Option<String>)> {
        let name = if self.src().peek() == Some('{') {
            self.read_brace_string()?
        } else {
            let mut name = String::new();
            loop {
                if self.src_at_end() {
                    break;
                }
                match self.src().peek() {
                    Some(c) if is_name_char(c) => {
                        self.src().next_char();
                        name.push(c);
                    }
                    _ => break,
                }
            }
            name
        };

        if self.src().peek() != Some('(') {
            return Ok((name, None));
        }
        self.src().next_char();

        let mut raw = String::new();
        let mut depth = 1u32;
        loop {
            if self.src_at_end() {
                break;
            }
            let Some(c) = self.src().next_char() else {
                continue;
            };
            match c {
                '(' => {
                    depth += 1;
                    raw.push(c);
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    raw.push(c);
                }
                _ => raw.push(c),
            }
        }
        if depth != 0 {
            return Err(TclError::Syntax("Invalid () nesting".to_owned()));
        }
        let index = self.expand_dollars(&raw)?;
        Ok((name, Some(index)))
    }

    /// Apply `$` substitution alone to `text` (array index text and
    /// expression bodies).  A malformed reference ends the expansion
    /// quietly; a missing variable raises.
    pub(crate) fn expand_dollars(&mut self, text: &str) -> TclResult<String> {
        self.sources.push(CharSource::text(text));
        let result = self.expand_dollars_inner();
        self.sources.pop();
        result
    }

    fn expand_dollars_inner(&mut self) -> TclResult<String> {
        let mut out = String::new();
        loop {
            if self.src_at_end() {
                return Ok(out);
            }
            let Some(c) = self.src().next_char() else {
                continue;
            };
            if c == '$' {
                match self.read_variable_value() {
                    Ok(value) => out.push_str(&value.to_string()),
                    Err(TclError::Syntax(_)) => return Ok(out),
                    Err(err) => return Err(err),
                }
            } else {
                out.push(c);
            }
        }
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    /// Resolve a possibly qualified name to its variable.
    ///
    /// Any run of colons separates segments; a leading run forces the
    /// global scope.  Multi-segment names walk named child scopes from
    /// the global scope and look the final segment up in that scope
    /// only.  Unqualified names walk the parent chain from the active
    /// scope using the raw spelling.
    pub(crate) fn find_variable(&self, name: &str) -> Option<VarRef> {
        let chars: Vec<char> = name.chars().collect();
        let mut names: Vec<String> = Vec::new();
        let mut global = false;
        let mut pos = 0;
        while pos < chars.len() {
            if chars[pos] == ':' {
                while pos < chars.len() && chars[pos] == ':' {
                    pos += 1;
                }
                if names.is_empty() {
                    global = true;
                }
            }
            if pos < chars.len() {
                let start = pos;
                while pos < chars.len() && chars[pos] != ':' {
                    pos += 1;
                }
                names.push(chars[start..pos].iter().collect());
            }
        }

        if names.len() > 1 {
            let mut scope_id = GLOBAL_SCOPE;
            for part in &names[..names.len() - 1] {
                scope_id = self.scopes.get(scope_id).named_child(part)?;
            }
            self.scopes.get(scope_id).var(&names[names.len() - 1])
        } else if global {
            self.scopes.get(GLOBAL_SCOPE).var(names.first()?)
        } else {
            self.scopes.lookup_var(self.active_scope(), name)
        }
    }

    /// Read a whole variable.  `None` for a missing variable, a
    /// declared-but-empty one, and the `env` pseudo-variable (which
    /// only answers element reads).
    pub fn var_value(&self, name: &str) -> Option<Value> {
        let var = self.find_variable(name)?;
        let var = var.borrow();
        if var.is_env() {
            return None;
        }
        match var.value() {
            Value::None => None,
            value => Some(value.clone()),
        }
    }

    /// Attach a write observer to `name`, creating the variable in the
    /// active scope when it does not exist yet.  The callback runs
    /// synchronously after every successful plain or array store and
    /// receives the new value.  Returns the observer id, or `None` when
    /// `name` is qualified and its namespace does not exist.
    pub fn watch_variable(
        &mut self,
        name: &str,
        callback: impl Fn(&Value) + 'static,
    ) -> Option<u64> {
        if self.find_variable(name).is_none() && !name.contains(':') {
            self.set_variable_value(name, Value::None);
        }
        let var = self.find_variable(name)?;
        let id = var
            .borrow_mut()
            .add_observer(Rc::new(move |v: &Variable| callback(v.value())));
        Some(id)
    }

    /// Read one array slot.  `env(KEY)` answers from the process
    /// environment, empty string when the key is missing.
    pub(crate) fn array_var_value(&self, name: &str, index: &str) -> Option<Value> {
        let var = self.find_variable(name)?;
        let var = var.borrow();
        if var.is_env() {
            return Some(Value::from(self.os.env_var(index).unwrap_or_default()));
        }
        var.array_value(index)
    }

    /// Write `name`: update an existing binding anywhere on the parent
    /// chain, otherwise create it in the active scope.
    pub fn set_variable_value(&mut self, name: &str, value: Value) {
        let mut current = Some(self.active_scope());
        while let Some(id) = current {
            let scope = self.scopes.get(id);
            if let Some(var) = scope.var(name) {
                let mut var = var.borrow_mut();
                if !var.is_env() {
                    var.set_value(value);
                }
                return;
            }
            current = scope.parent();
        }
        let active = self.active_scope();
        self.scopes.get_mut(active).add_value(name, value);
    }

    /// Write one array slot through the lookup chain, auto-creating an
    /// array in the active scope on first write.
    pub(crate) fn set_array_variable_value(&mut self, name: &str, index: &str, value: Value) {
        match self.find_variable(name) {
            Some(var) => var.borrow_mut().set_array_value(index, value),
            None => {
                let mut map = BTreeMap::new();
                map.insert(index.to_owned(), value);
                self.set_variable_value(name, Value::Array(map));
            }
        }
    }

    // ── Scope-local variable access ───────────────────────────────────────────

    pub(crate) fn local_var(&self, name: &str) -> Option<VarRef> {
        self.scopes.get(self.active_scope()).var(name)
    }

    /// Write `name` in the active scope only: the store used by the
    /// commands that bind locals.
    pub(crate) fn set_local(&mut self, name: &str, value: Value) {
        let active = self.active_scope();
        let scope = self.scopes.get_mut(active);
        match scope.var(name) {
            Some(var) => {
                let mut var = var.borrow_mut();
                if !var.is_env() {
                    var.set_value(value);
                }
            }
            None => {
                scope.add_value(name, value);
            }
        }
    }

    /// Write one array slot in the active scope only.
    pub(crate) fn set_local_array(&mut self, name: &str, index: &str, value: Value) {
        let active = self.active_scope();
        let scope = self.scopes.get_mut(active);
        match scope.var(name) {
            Some(var) => var.borrow_mut().set_array_value(index, value),
            None => {
                let mut map = BTreeMap::new();
                map.insert(index.to_owned(), value);
                scope.add_value(name, Value::Array(map));
            }
        }
    }

    /// Bind `name` in the active scope, replacing any local binding.
    pub(crate) fn declare_local(&mut self, name: &str, value: Value) {
        let active = self.active_scope();
        self.scopes.get_mut(active).add_value(name, value);
    }

    /// Alias an existing variable into the active scope under `name`.
    pub(crate) fn add_local_alias(&mut self, name: &str, var: VarRef) {
        let active = self.active_scope();
        self.scopes.get_mut(active).add_var(name, var);
    }

    /// Fetch the global binding of `name`, creating an empty one on
    /// demand (the `global` command's fetch-or-create step).
    pub(crate) fn global_var_or_create(&mut self, name: &str) -> VarRef {
        let scope = self.scopes.get_mut(GLOBAL_SCOPE);
        match scope.var(name) {
            Some(var) => var,
            None => scope.add_value(name, Value::None),
        }
    }

    pub(crate) fn remove_local(&mut self, name: &str) {
        let active = self.active_scope();
        self.scopes.get_mut(active).remove_var(name);
    }

    /// Names bound in the global scope (`info globals`).
    pub fn global_var_names(&self) -> Vec<String> {
        self.scopes.get(GLOBAL_SCOPE).var_names()
    }

    /// Names bound in the active scope (`info vars`).
    pub fn active_var_names(&self) -> Vec<String> {
        self.scopes.get(self.active_scope()).var_names()
    }

    // ── Procedures ────────────────────────────────────────────────────────────

    /// Define a procedure in the active scope.
    pub fn define_proc(&mut self, name: &str, args: Vec<String>, body: Value) {
        let active = self.active_scope();
        self.scopes.get_mut(active).define_proc(name, args, body);
    }

    /// Find a procedure by walking the parent chain from the active
    /// scope.
    pub(crate) fn lookup_proc(&self, name: &str) -> Option<Rc<Proc>> {
        self.scopes.lookup_proc(self.active_scope(), name)
    }

    /// Procedures defined in the global scope (`info procs`).
    pub fn global_proc_names(&self) -> Vec<String> {
        self.scopes.get(GLOBAL_SCOPE).proc_names()
    }

    /// Names of the procedures currently executing, outermost first.
    pub fn active_procs(&self) -> &[String] {
        &self.proc_stack
    }

    /// The builtin roster (`info commands`).
    pub fn command_names(&self) -> Vec<String> {
        commands::names().map(str::to_owned).collect()
    }

    // ── Scope stack ───────────────────────────────────────────────────────────

    pub(crate) fn active_scope(&self) -> ScopeId {
        *self.scope_stack.last().unwrap_or(&GLOBAL_SCOPE)
    }

    /// Push a fresh call scope whose parent is the caller's active
    /// scope (dynamic scoping).
    pub(crate) fn push_call_scope(&mut self) -> ScopeId {
        let id = self.scopes.alloc(self.active_scope());
        self.scope_stack.push(id);
        id
    }

    /// Enter the named child scope of the active scope, creating it on
    /// first use (`namespace eval`).
    pub(crate) fn push_named_scope(&mut self, name: &str) -> ScopeId {
        let id = self.scopes.ensure_named_child(self.active_scope(), name);
        self.scope_stack.push(id);
        id
    }

    /// Pop the active scope.  The global floor stays put; a stack
    /// already emptied by an unwind makes this a no-op.
    pub(crate) fn pop_scope(&mut self) {
        if self.scope_stack.len() > 1 {
            if let Some(id) = self.scope_stack.pop() {
                self.scopes.release(id);
            }
        }
    }

    /// Tear the scope stack down to the global scope, releasing every
    /// popped frame.  Runs unconditionally when a catchable error is
    /// raised, wherever it will eventually be caught.
    pub(crate) fn unwind_scopes(&mut self) {
        while self.scope_stack.len() > 1 {
            if let Some(id) = self.scope_stack.pop() {
                self.scopes.release(id);
            }
        }
    }

    /// Raise a catchable error: unwind first, then propagate.
    pub(crate) fn raise<T>(&mut self, err: TclError) -> TclResult<T> {
        if err.catchable() {
            self.unwind_scopes();
        }
        Err(err)
    }

    // ── Control-flow signals ──────────────────────────────────────────────────

    pub(crate) fn signal(&self) -> &Signal {
        &self.signal
    }

    pub(crate) fn raise_signal(&mut self, signal: Signal) {
        self.signal = signal;
    }

    pub(crate) fn take_signal(&mut self) -> Signal {
        std::mem::take(&mut self.signal)
    }

    pub(crate) fn clear_break(&mut self) {
        if matches!(self.signal, Signal::Break) {
            self.signal = Signal::None;
        }
    }

    pub(crate) fn clear_continue(&mut self) {
        if matches!(self.signal, Signal::Continue) {
            self.signal = Signal::None;
        }
    }

    pub(crate) fn clear_loop_signals(&mut self) {
        if matches!(self.signal, Signal::Break | Signal::Continue) {
            self.signal = Signal::None;
        }
    }

    /// True when a loop body should stop iterating: `break` or `return`
    /// is pending (`return` keeps propagating outward afterwards).
    pub(crate) fn loop_interrupted(&self) -> bool {
        matches!(self.signal, Signal::Break | Signal::Return(_))
    }

    /// True when some enclosing command (not the one currently
    /// dispatching) iterates, so `break`/`continue` have a loop to act
    /// on.
    pub(crate) fn in_loop(&self) -> bool {
        let stack = &self.command_stack;
        stack[..stack.len().saturating_sub(1)]
            .iter()
            .any(|frame| frame.iterates)
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Resolve and execute one argument list: builtin, then procedure,
    /// then external program.  An empty list is a no-op.
    pub(crate) fn eval_args(&mut self, args: &[Value]) -> TclResult<Option<Value>> {
        if args.is_empty() {
            return Ok(None);
        }
        if self.depth >= MAX_EVAL_DEPTH {
            return self.raise(TclError::Runtime(
                "too many nested evaluations (infinite loop?)".to_owned(),
            ));
        }
        self.depth += 1;
        let result = self.dispatch(args);
        self.depth -= 1;
        match result {
            Err(err) if err.catchable() => {
                // Backstop for errors raised below the interpreter's
                // own raise sites (coercions and the like).
                self.unwind_scopes();
                Err(err)
            }
            other => other,
        }
    }

    fn dispatch(&mut self, args: &[Value]) -> TclResult<Option<Value>> {
        let name = args[0].to_string();
        if commands::is_builtin(&name) {
            if self.debug {
                let mut line = format!("Exec:{name}");
                for arg in &args[1..] {
                    line.push(' ');
                    line.push_str(&arg.to_string());
                }
                self.err_line(&line);
            }
            self.command_stack.push(CommandFrame {
                iterates: matches!(name.as_str(), "while" | "for" | "foreach"),
            });
            if self.debug {
                self.err_line(&format!("Start: {name}"));
            }
            let result = commands::call_builtin(self, &name, &args[1..]);
            if self.debug {
                self.err_line(&format!("End: {name}"));
            }
            self.command_stack.pop();
            result
        } else if let Some(proc) = self.lookup_proc(&name) {
            if self.debug {
                self.err_line(&format!("Start: {name}"));
            }
            self.proc_stack.push(name.clone());
            let result = self.exec_proc(&proc, &args[1..]);
            self.proc_stack.pop();
            if self.debug {
                self.err_line(&format!("End: {name}"));
            }
            result
        } else {
            self.exec_external(&name, &args[1..])
        }
    }

    /// Call a procedure: bind formals in a fresh scope, run the stored
    /// body, and consume a pending `return` as the call's result.
    fn exec_proc(&mut self, proc: &Rc<Proc>, args: &[Value]) -> TclResult<Option<Value>> {
        let formals = proc.args();
        let var_args = formals.last().is_some_and(|f| f == "args");
        let fixed = if var_args {
            formals.len() - 1
        } else {
            formals.len()
        };
        let mismatch = if var_args {
            args.len() < fixed
        } else {
            args.len() != formals.len()
        };
        if mismatch {
            let mut usage = proc.name().to_owned();
            for formal in formals {
                usage.push(' ');
                usage.push_str(formal);
            }
            return self.raise(TclError::wrong_num_args(&usage));
        }

        self.push_call_scope();
        for (formal, actual) in formals[..fixed].iter().zip(args) {
            self.set_local(formal, actual.clone());
        }
        if var_args {
            self.set_local("args", Value::List(args[fixed..].to_vec()));
        }

        let body = proc.body().to_string();
        let value = match self.parse_string(&body) {
            Ok(value) => value,
            // A catchable error already unwound this scope; exit just
            // propagates.
            Err(err) => return Err(err),
        };

        let result = if matches!(self.signal, Signal::Return(_)) {
            match self.take_signal() {
                Signal::Return(Value::None) => None,
                Signal::Return(ret) => Some(ret),
                _ => unreachable!(),
            }
        } else {
            value
        };
        self.pop_scope();
        Ok(result)
    }

    /// Dispatch an unknown name as an external pipeline, inheriting the
    /// interpreter's standard streams.  A nonzero exit status of the
    /// first stage is an error.
    fn exec_external(&mut self, name: &str, args: &[Value]) -> TclResult<Option<Value>> {
        let Some(path) = self.os.find_executable(name) else {
            return self.raise(TclError::unknown_command(name));
        };
        let pipeline = self.parse_pipeline(&path, args)?;
        let result = self.run_pipeline(&pipeline, false)?;
        if result.status != 0 {
            return self.raise(TclError::Runtime(format!(
                "child process exited abnormally ({})",
                result.status
            )));
        }
        Ok(None)
    }

    // ── Pipelines ─────────────────────────────────────────────────────────────

    /// Parse the pipe/redirection grammar into a [`Pipeline`]; shared
    /// by bare dispatch and the `exec` builtin.  `program` is the
    /// resolved path of the first stage.
    pub(crate) fn parse_pipeline(&mut self, program: &str, args: &[Value]) -> TclResult<Pipeline> {
        let mut pipeline = Pipeline::default();
        let mut stage = PipelineStage {
            program: program.to_owned(),
            args: Vec::new(),
            pipe_stderr: false,
        };
        let mut plain = false;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let text = arg.to_string();
            if plain {
                stage.args.push(text);
                continue;
            }
            match text.as_str() {
                "--" => plain = true,
                "|" | "|&" => {
                    let Some(next) = iter.next() else {
                        return self.raise(TclError::Runtime(
                            "illegal use of | or |& in command".to_owned(),
                        ));
                    };
                    stage.pipe_stderr = text == "|&";
                    let next_name = next.to_string();
                    let Some(path) = self.os.find_executable(&next_name) else {
                        return self.raise(TclError::Runtime(format!(
                            "couldn't execute \"{next_name}\" no such file or directory"
                        )));
                    };
                    pipeline.stages.push(std::mem::replace(
                        &mut stage,
                        PipelineStage {
                            program: path,
                            args: Vec::new(),
                            pipe_stderr: false,
                        },
                    ));
                }
                "<" => {
                    let src = self.operand(&text, &mut iter)?;
                    pipeline.stdin = StdinSource::File(src);
                }
                "<@" => {
                    let id = self.operand(&text, &mut iter)?;
                    pipeline.stdin = self.resolve_in_channel(&id)?;
                }
                "<<" => {
                    let literal = self.operand(&text, &mut iter)?;
                    pipeline.stdin = StdinSource::Literal(literal);
                }
                ">" | ">>" => {
                    let dest = self.operand(&text, &mut iter)?;
                    pipeline.stdout = Some(OutTarget::File {
                        path: dest,
                        append: text == ">>",
                    });
                }
                ">&" | ">>&" => {
                    let dest = self.operand(&text, &mut iter)?;
                    pipeline.stdout = Some(OutTarget::File {
                        path: dest,
                        append: text == ">>&",
                    });
                    pipeline.merge_stderr = true;
                }
                ">@" | ">&@" => {
                    let id = self.operand(&text, &mut iter)?;
                    pipeline.stdout = Some(self.resolve_out_channel(&id)?);
                    if text == ">&@" {
                        pipeline.merge_stderr = true;
                    }
                }
                "2>" | "2>>" => {
                    let dest = self.operand(&text, &mut iter)?;
                    pipeline.stderr = Some(OutTarget::File {
                        path: dest,
                        append: text == "2>>",
                    });
                }
                "2>@" => {
                    let id = self.operand(&text, &mut iter)?;
                    pipeline.stderr = Some(self.resolve_out_channel(&id)?);
                }
                "2>@1" => pipeline.stderr = Some(OutTarget::ToStdout),
                _ => stage.args.push(text),
            }
        }
        pipeline.stages.push(stage);
        Ok(pipeline)
    }

    fn operand(&mut self, op: &str, iter: &mut std::slice::Iter<'_, Value>) -> TclResult<String> {
        match iter.next() {
            Some(value) => Ok(value.to_string()),
            None => self.raise(TclError::Runtime(format!(
                "can't specify \"{op}\" as last word in command"
            ))),
        }
    }

    fn resolve_in_channel(&mut self, id: &str) -> TclResult<StdinSource> {
        if id == "stdin" {
            return Ok(StdinSource::Inherit);
        }
        match self.files.get_mut(id) {
            Some(file) => {
                file.flush();
                Ok(StdinSource::File(file.path().to_owned()))
            }
            None => self.raise(TclError::Runtime(format!(
                "can not find channel named \"{id}\""
            ))),
        }
    }

    /// A script channel hands its path to the child in append mode so
    /// the redirect continues where the channel's own writes left off.
    fn resolve_out_channel(&mut self, id: &str) -> TclResult<OutTarget> {
        match id {
            "stdout" => return Ok(OutTarget::ToStdout),
            "stderr" => return Ok(OutTarget::ToStderr),
            _ => {}
        }
        match self.files.get_mut(id) {
            Some(file) => {
                file.flush();
                Ok(OutTarget::File {
                    path: file.path().to_owned(),
                    append: true,
                })
            }
            None => self.raise(TclError::Runtime(format!(
                "can not find channel named \"{id}\""
            ))),
        }
    }

    pub(crate) fn run_pipeline(
        &mut self,
        pipeline: &Pipeline,
        capture: bool,
    ) -> TclResult<ProcessResult> {
        match self.runner.run(pipeline, capture) {
            Ok(result) => Ok(result),
            Err(msg) => self.raise(TclError::Runtime(msg)),
        }
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    /// Dollar-expand `text` and evaluate it as an arithmetic
    /// expression; near-integer results collapse to integer text.
    pub(crate) fn eval_expr_text(&mut self, text: &str) -> TclResult<Value> {
        let expanded = self.expand_dollars(text)?;
        match self.expr_eval.evaluate(&expanded) {
            Ok(result) => Ok(Value::from(format_number(result))),
            Err(_) => self.raise(TclError::Runtime(format!(
                "error in expression \"{expanded}\""
            ))),
        }
    }

    pub(crate) fn eval_condition(&mut self, text: &str) -> TclResult<bool> {
        Ok(self.eval_expr_text(text)?.to_bool())
    }

    // ── Channels ──────────────────────────────────────────────────────────────

    /// Open `path` and register the channel under a `fileN` handle.
    pub(crate) fn open_channel(&mut self, path: &str, mode: &str) -> TclResult<String> {
        let mut options = OpenOptions::new();
        match mode {
            "r" => {
                options.read(true);
            }
            "r+" => {
                options.read(true).write(true);
            }
            "w" => {
                options.write(true).create(true).truncate(true);
            }
            "w+" => {
                options.read(true).write(true).create(true).truncate(true);
            }
            "a" => {
                options.append(true).create(true);
            }
            "a+" => {
                options.read(true).append(true).create(true);
            }
            _ => return self.raise(TclError::Runtime("Open Failed".to_owned())),
        }
        match options.open(path) {
            Ok(file) => {
                let id = format!("file{}", file.as_raw_fd());
                self.files.insert(id.clone(), TclFile::new(path, file));
                Ok(id)
            }
            Err(err) => {
                let msg = match err.kind() {
                    io::ErrorKind::NotFound => "File does not exist",
                    io::ErrorKind::PermissionDenied => "No read permission for file",
                    _ => "Open Failed",
                };
                self.raise(TclError::Runtime(msg.to_owned()))
            }
        }
    }

    pub(crate) fn close_channel(&mut self, id: &str) -> bool {
        self.files.remove(id).is_some()
    }

    pub(crate) fn has_channel(&self, id: &str) -> bool {
        self.files.contains_key(id)
    }

    pub(crate) fn channel(&mut self, id: &str) -> TclResult<&mut TclFile> {
        if !self.files.contains_key(id) {
            return self.raise(TclError::Runtime(format!(
                "can not find channel named \"{id}\""
            )));
        }
        match self.files.get_mut(id) {
            Some(file) => Ok(file),
            None => unreachable!("channel vanished"),
        }
    }

    /// One line from the process's real standard input, end-of-line
    /// stripped.  A zero-byte read marks stdin as exhausted for `eof`.
    pub(crate) fn read_stdin_line(&mut self) -> String {
        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => self.stdin_eof = true,
            Ok(_) => {}
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        line
    }

    /// The rest of standard input as one string.
    pub(crate) fn read_stdin_all(&mut self) -> String {
        let mut buf = Vec::new();
        let _ = io::stdin().read_to_end(&mut buf);
        self.stdin_eof = true;
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Up to `n` bytes from standard input.
    pub(crate) fn read_stdin_chars(&mut self, n: usize) -> String {
        let mut buf = vec![0u8; n];
        let mut got = 0;
        let mut stdin = io::stdin();
        while got < n {
            match stdin.read(&mut buf[got..]) {
                Ok(0) | Err(_) => {
                    self.stdin_eof = true;
                    break;
                }
                Ok(k) => got += k,
            }
        }
        String::from_utf8_lossy(&buf[..got]).into_owned()
    }

    pub(crate) fn stdin_at_eof(&self) -> bool {
        self.stdin_eof
    }

    // ── Timers ────────────────────────────────────────────────────────────────

    /// Register a deferred script and return its `after#N` handle.
    pub(crate) fn add_timer(&mut self, ms: i64, script: &str) -> String {
        let (secs, usecs) = self.os.now_secs_usecs();
        let name = format!("after#{}", self.next_timer_id);
        self.next_timer_id += 1;
        self.timers.insert(
            name.clone(),
            Timer {
                deadline_us: secs * 1_000_000 + usecs + ms * 1000,
                script: script.to_owned(),
            },
        );
        name
    }

    /// Cancelling an unknown handle is not an error.
    pub(crate) fn cancel_timer(&mut self, name: &str) {
        self.timers.remove(name);
    }

    pub(crate) fn timer_names(&self) -> Vec<String> {
        self.timers.keys().cloned().collect()
    }

    pub(crate) fn timer_script(&self, name: &str) -> Option<String> {
        self.timers.get(name).map(|t| t.script.clone())
    }

    /// Dispatch every timer whose deadline has passed.  Each due timer
    /// is removed first, so a script that errors does not re-fire; the
    /// error is reported and the remaining due timers still run.
    pub(crate) fn run_timers(&mut self) -> TclResult<()> {
        let (secs, usecs) = self.os.now_secs_usecs();
        let now = secs * 1_000_000 + usecs;
        let due: Vec<String> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.deadline_us <= now)
            .map(|(name, _)| name.clone())
            .collect();
        for name in due {
            let Some(timer) = self.timers.remove(&name) else {
                continue;
            };
            match self.parse_string(&timer.script) {
                Ok(_) => {}
                Err(err) if err.catchable() => {
                    self.err_line(&err.message());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Clone, Default)]
    struct Sink(Rc<RefCell<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Sink {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    fn interp() -> (Interp, Sink, Sink) {
        let mut interp = Interp::new();
        let out = Sink::default();
        let err = Sink::default();
        interp.set_out(Box::new(out.clone()));
        interp.set_err(Box::new(err.clone()));
        (interp, out, err)
    }

    fn eval(interp: &mut Interp, script: &str) -> String {
        match interp.parse_string(script) {
            Ok(Some(value)) => value.to_string(),
            Ok(None) => String::new(),
            Err(err) => panic!("script failed: {}", err.message()),
        }
    }

    #[test]
    fn set_and_substitute() {
        let (mut tcl, _, _) = interp();
        assert_eq!(eval(&mut tcl, "set x 5"), "5");
        assert_eq!(eval(&mut tcl, "set y $x"), "5");
        assert_eq!(eval(&mut tcl, "set z a$x-b"), "a5-b");
    }

    #[test]
    fn bracket_substitution() {
        let (mut tcl, _, _) = interp();
        assert_eq!(eval(&mut tcl, "set x [expr 2 + 3]"), "5");
        assert_eq!(eval(&mut tcl, "set y pre[expr 1 + 1]post"), "pre2post");
    }

    #[test]
    fn quoting_forms() {
        let (mut tcl, _, _) = interp();
        eval(&mut tcl, "set v 7");
        assert_eq!(eval(&mut tcl, "set a \"v is $v\""), "v is 7");
        assert_eq!(eval(&mut tcl, "set b {v is $v}"), "v is $v");
        assert_eq!(eval(&mut tcl, "set c 'v is $v'"), "v is $v");
        assert_eq!(eval(&mut tcl, r#"set d "tab\there""#), "tab\there");
    }

    #[test]
    fn braces_nest_verbatim() {
        let (mut tcl, _, _) = interp();
        assert_eq!(eval(&mut tcl, "set x {a {b c} d}"), "a {b c} d");
    }

    #[test]
    fn whole_word_variable_keeps_list_shape() {
        let (mut tcl, _, _) = interp();
        eval(&mut tcl, "set l [list a b c]");
        assert_eq!(eval(&mut tcl, "llength $l"), "3");
    }

    #[test]
    fn array_element_substitution() {
        let (mut tcl, _, _) = interp();
        eval(&mut tcl, "set a(1) foo");
        eval(&mut tcl, "set idx 1");
        assert_eq!(eval(&mut tcl, "set result $a($idx)"), "foo");
    }

    #[test]
    fn missing_variable_reports_bare_name() {
        let (mut tcl, _, _) = interp();
        let err = tcl.parse_string("set x $nope(3)").unwrap_err();
        assert_eq!(err.message(), "can't read \"nope\": no such variable");
    }

    #[test]
    fn empty_variable_reads_as_missing() {
        let (mut tcl, _, _) = interp();
        eval(&mut tcl, "variable v");
        let err = tcl.parse_string("set x $v").unwrap_err();
        assert_eq!(err.message(), "can't read \"v\": no such variable");
    }

    #[test]
    fn statements_split_on_semicolon() {
        let (mut tcl, _, _) = interp();
        assert_eq!(eval(&mut tcl, "set a 1; set b 2; set c 3"), "3");
        assert_eq!(eval(&mut tcl, "set a"), "1");
    }

    #[test]
    fn syntax_failure_reported_not_thrown() {
        let (mut tcl, _, err) = interp();
        let result = tcl.parse_string("set x \"unterminated");
        assert!(matches!(result, Ok(None)));
        assert!(err.text().contains("Invalid char"));
    }

    #[test]
    fn stray_close_bracket_splits_statements() {
        let (mut tcl, _, _) = interp();
        assert_eq!(eval(&mut tcl, "set x 1 ] set y 2"), "2");
        assert_eq!(eval(&mut tcl, "set x"), "1");
        assert_eq!(eval(&mut tcl, "set y"), "2");
    }

    #[test]
    fn parse_line_reports_and_records() {
        let (mut tcl, _, err) = interp();
        let value = tcl.parse_line("nosuchcmd").unwrap();
        assert!(value.is_none());
        assert!(err.text().contains("invalid command name \"nosuchcmd\""));

        tcl.parse_line("set ok 1").unwrap();
        let lines: Vec<String> = tcl.history().entries().map(|(_, s)| s.to_owned()).collect();
        assert_eq!(lines, vec!["set ok 1".to_owned()]);
    }

    #[test]
    fn proc_call_binds_locals_dynamically() {
        let (mut tcl, _, _) = interp();
        eval(&mut tcl, "proc add {a b} { expr $a + $b }");
        assert_eq!(eval(&mut tcl, "add 2 3"), "5");
        // Formals do not leak into the calling scope.
        assert!(tcl.var_value("a").is_none());
    }

    #[test]
    fn proc_arity_mismatch() {
        let (mut tcl, _, _) = interp();
        eval(&mut tcl, "proc add {a b} { expr $a + $b }");
        let err = tcl.parse_string("add 1").unwrap_err();
        assert_eq!(err.message(), "wrong # args: should be \"add a b\"");
    }

    #[test]
    fn proc_var_args_collects_rest() {
        let (mut tcl, _, _) = interp();
        eval(&mut tcl, "proc count {first args} { llength $args }");
        assert_eq!(eval(&mut tcl, "count a b c d"), "3");
        assert_eq!(eval(&mut tcl, "count a"), "0");
    }

    #[test]
    fn return_value_becomes_call_result() {
        let (mut tcl, _, _) = interp();
        eval(&mut tcl, "proc pick {} { return chosen; set dead 1 }");
        assert_eq!(eval(&mut tcl, "set r [pick]"), "chosen");
        assert!(tcl.var_value("dead").is_none());
    }

    #[test]
    fn error_unwinds_to_global_scope() {
        let (mut tcl, _, _) = interp();
        eval(
            &mut tcl,
            "proc p {} { set inner 1; catch {nosuchcmd}; set after 2 }",
        );
        eval(&mut tcl, "p");
        // The raise tore down p's scope, so the statement after the
        // catch ran at global scope.
        assert_eq!(tcl.var_value("after").map(|v| v.to_string()), Some("2".to_owned()));
        assert!(tcl.var_value("inner").is_none());
    }

    #[test]
    fn global_aliases_share_one_binding() {
        let (mut tcl, _, _) = interp();
        eval(&mut tcl, "set g old");
        eval(&mut tcl, "proc repaint {} { global g; set g new }");
        eval(&mut tcl, "repaint");
        assert_eq!(eval(&mut tcl, "set g"), "new");
    }

    #[test]
    fn namespace_variables_are_qualified() {
        let (mut tcl, _, _) = interp();
        eval(&mut tcl, "namespace eval ns { variable v 5 }");
        assert_eq!(eval(&mut tcl, "set ns::v"), "5");
        assert!(tcl.var_value("v").is_none());
    }

    #[test]
    fn watch_variable_sees_each_write() {
        let (mut tcl, _, _) = interp();
        let log: Rc<RefCell<Vec<String>>> = Rc::default();
        let seen = log.clone();
        tcl.watch_variable("x", move |v| seen.borrow_mut().push(v.to_string()))
            .unwrap();
        eval(&mut tcl, "set x 1");
        eval(&mut tcl, "set x [expr $x + 1]");
        assert_eq!(*log.borrow(), vec!["1".to_owned(), "2".to_owned()]);
        // Qualified names attach only to existing namespace variables.
        assert!(tcl.watch_variable("nowhere::v", |_| ()).is_none());
    }

    #[test]
    fn debug_trace_marks_commands_and_procs() {
        let (mut tcl, _, err) = interp();
        tcl.set_debug(true);
        eval(&mut tcl, "proc greet {} { set x hi }");
        eval(&mut tcl, "greet");
        let trace = err.text();
        assert!(trace.contains("Exec:proc greet"));
        assert!(trace.contains("Start: greet"));
        assert!(trace.contains("End: greet"));
        assert!(trace.contains("Exec:set x hi"));
        assert!(tcl.active_procs().is_empty());
    }

    #[test]
    fn proc_stack_drains_after_an_error() {
        let (mut tcl, _, _) = interp();
        eval(&mut tcl, "proc outer {} { inner }");
        eval(&mut tcl, "proc inner {} { nosuchcmd }");
        assert_eq!(eval(&mut tcl, "catch {outer}"), "0");
        assert!(tcl.active_procs().is_empty());
    }

    #[test]
    fn env_reads_are_element_only() {
        let (mut tcl, _, _) = interp();
        std::env::set_var("TCL_RS_INTERP_TEST", "probe");
        assert_eq!(eval(&mut tcl, "set x $env(TCL_RS_INTERP_TEST)"), "probe");
        assert_eq!(eval(&mut tcl, "set y $env(TCL_RS_NO_SUCH_KEY)"), "");
        assert!(tcl.parse_string("set z $env").is_err());
    }

    #[test]
    fn expression_error_carries_expanded_text() {
        let (mut tcl, _, _) = interp();
        eval(&mut tcl, "set x garbage");
        let err = tcl.parse_string("expr $x + 1").unwrap_err();
        assert_eq!(err.message(), "error in expression \"garbage + 1\"");
    }

    #[test]
    fn runaway_recursion_is_cut_off() {
        // Deep interpreter nesting needs more native stack than the
        // test harness default.
        let worker = std::thread::Builder::new()
            .stack_size(32 * 1024 * 1024)
            .spawn(|| {
                let mut tcl = Interp::new();
                tcl.set_out(Box::new(io::sink()));
                tcl.set_err(Box::new(io::sink()));
                tcl.parse_string("proc spin {} { spin }").unwrap();
                tcl.parse_string("spin").unwrap_err().message()
            })
            .expect("spawn worker");
        let message = worker.join().expect("join worker");
        assert_eq!(message, "too many nested evaluations (infinite loop?)");
    }

    #[test]
    fn debug_trace_prints_exec_lines() {
        let (mut tcl, _, err) = interp();
        tcl.set_debug(true);
        eval(&mut tcl, "set x 5");
        let trace = err.text();
        assert!(trace.contains("Exec:set x 5"));
        assert!(trace.contains("Start: set"));
        assert!(trace.contains("End: set"));
    }

    #[test]
    fn pipeline_grammar_parses_operators() {
        let (mut tcl, _, _) = interp();
        let args = [
            Value::from("-n"),
            Value::from("hi"),
            Value::from(">"),
            Value::from("/tmp/out.txt"),
        ];
        let pipeline = tcl.parse_pipeline("/bin/echo", &args).unwrap();
        assert_eq!(pipeline.stages.len(), 1);
        assert_eq!(pipeline.stages[0].args, vec!["-n".to_owned(), "hi".to_owned()]);
        assert_eq!(
            pipeline.stdout,
            Some(OutTarget::File {
                path: "/tmp/out.txt".to_owned(),
                append: false
            })
        );

        let args = [
            Value::from("--"),
            Value::from(">"),
            Value::from("|"),
        ];
        let pipeline = tcl.parse_pipeline("/bin/echo", &args).unwrap();
        assert_eq!(
            pipeline.stages[0].args,
            vec![">".to_owned(), "|".to_owned()]
        );
    }

    #[test]
    fn pipeline_operand_errors() {
        let (mut tcl, _, _) = interp();
        let err = tcl
            .parse_pipeline("/bin/echo", &[Value::from(">")])
            .unwrap_err();
        assert_eq!(
            err.message(),
            "can't specify \">\" as last word in command"
        );
        let err = tcl
            .parse_pipeline("/bin/echo", &[Value::from("hi"), Value::from("|")])
            .unwrap_err();
        assert_eq!(err.message(), "illegal use of | or |& in command");
    }

    #[test]
    fn timers_fire_once_when_due() {
        let (mut tcl, _, _) = interp();
        let name = tcl.add_timer(0, "set fired 1");
        assert_eq!(name, "after#0");
        assert_eq!(tcl.timer_names(), vec!["after#0".to_owned()]);
        tcl.run_timers().unwrap();
        assert_eq!(eval(&mut tcl, "set fired"), "1");
        assert!(tcl.timer_names().is_empty());
    }
}
