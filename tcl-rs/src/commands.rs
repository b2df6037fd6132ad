//! The builtin command set.
//!
//! Every command receives its already-substituted arguments (the command
//! word itself stripped) and the interpreter, and produces an optional
//! result value.  Usage strings and `bad option` rosters are part of the
//! scripting surface; tests pin their exact wording.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use aho_corasick::{AhoCorasickBuilder, MatchKind};

use crate::error::{TclError, TclResult};
use crate::interp::{Interp, Signal};
use crate::os::AccessMode;
use crate::parse::{is_complete_line, is_space};
use crate::pattern::{glob_match, MatchMode, Pattern};
use crate::printf::format_values;
use crate::value::Value;

/// Registered command names, sorted.
pub(crate) const NAMES: [&str; 56] = [
    "#", "after", "append", "array", "break", "catch", "cd", "clock", "close", "continue", "eof",
    "eval", "exec", "exit", "expr", "file", "flush", "for", "foreach", "format", "gets", "glob",
    "global", "history", "if", "incr", "info", "join", "lappend", "lindex", "linsert", "list",
    "llength", "lrange", "lrepeat", "lreplace", "lsearch", "lset", "lsort", "namespace", "open",
    "package", "pid", "proc", "puts", "pwd", "read", "return", "set", "source", "string", "switch",
    "unset", "update", "variable", "while",
];

pub(crate) fn is_builtin(name: &str) -> bool {
    NAMES.binary_search(&name).is_ok()
}

pub(crate) fn names() -> impl Iterator<Item = &'static str> {
    NAMES.iter().copied()
}

/// Dispatch one builtin.  The caller has already checked
/// [`is_builtin`].
pub(crate) fn call_builtin(
    tcl: &mut Interp,
    name: &str,
    args: &[Value],
) -> TclResult<Option<Value>> {
    match name {
        "#" => Ok(None),
        "after" => cmd_after(tcl, args),
        "append" => cmd_append(tcl, args),
        "array" => cmd_array(tcl, args),
        "break" => cmd_break(tcl, args),
        "catch" => cmd_catch(tcl, args),
        "cd" => cmd_cd(tcl, args),
        "clock" => cmd_clock(tcl, args),
        "close" => cmd_close(tcl, args),
        "continue" => cmd_continue(tcl, args),
        "eof" => cmd_eof(tcl, args),
        "eval" => cmd_eval(tcl, args),
        "exec" => cmd_exec(tcl, args),
        "exit" => cmd_exit(tcl, args),
        "expr" => cmd_expr(tcl, args),
        "file" => cmd_file(tcl, args),
        "flush" => cmd_flush(tcl, args),
        "for" => cmd_for(tcl, args),
        "foreach" => cmd_foreach(tcl, args),
        "format" => cmd_format(tcl, args),
        "gets" => cmd_gets(tcl, args),
        "glob" => cmd_glob(tcl, args),
        "global" => cmd_global(tcl, args),
        "history" => cmd_history(tcl, args),
        "if" => cmd_if(tcl, args),
        "incr" => cmd_incr(tcl, args),
        "info" => cmd_info(tcl, args),
        "join" => cmd_join(tcl, args),
        "lappend" => cmd_lappend(tcl, args),
        "lindex" => cmd_lindex(tcl, args),
        "linsert" => cmd_linsert(tcl, args),
        "list" => Ok(Some(Value::List(args.to_vec()))),
        "llength" => cmd_llength(tcl, args),
        "lrange" => cmd_lrange(tcl, args),
        "lrepeat" => cmd_lrepeat(tcl, args),
        "lreplace" => cmd_lreplace(tcl, args),
        "lsearch" => cmd_lsearch(tcl, args),
        "lset" => cmd_lset(tcl, args),
        "lsort" => cmd_lsort(tcl, args),
        "namespace" => cmd_namespace(tcl, args),
        "open" => cmd_open(tcl, args),
        "package" => cmd_package(tcl, args),
        "pid" => cmd_pid(tcl, args),
        "proc" => cmd_proc(tcl, args),
        "puts" => cmd_puts(tcl, args),
        "pwd" => cmd_pwd(tcl, args),
        "read" => cmd_read(tcl, args),
        "return" => cmd_return(tcl, args),
        "set" => cmd_set(tcl, args),
        "source" => cmd_source(tcl, args),
        "string" => cmd_string(tcl, args),
        "switch" => cmd_switch(tcl, args),
        "unset" => cmd_unset(tcl, args),
        "update" => cmd_update(tcl, args),
        "variable" => cmd_variable(tcl, args),
        "while" => cmd_while(tcl, args),
        _ => unreachable!("not a builtin"),
    }
}

fn join_args(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&arg.to_string());
    }
    out
}

// ── Control flow ──────────────────────────────────────────────────────────────

fn cmd_if(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    let n = args.len();
    if n < 2 {
        return tcl.raise(TclError::Arity(
            "wrong # args: no expression after \"if\" argument".to_owned(),
        ));
    }
    let mut has_then = false;
    if args[1].to_string() == "then" {
        has_then = true;
        if n < 3 {
            return tcl.raise(TclError::Arity(
                "wrong # args: no script following \"then\" argument".to_owned(),
            ));
        }
    }
    if tcl.eval_condition(&args[0].to_string())? {
        let body = args[if has_then { 2 } else { 1 }].to_string();
        tcl.parse_string(&body)?;
        return Ok(None);
    }
    let mut pos = if has_then { 3 } else { 2 };
    while pos < n {
        let word = args[pos].to_string();
        if word == "elseif" {
            pos += 1;
            if pos >= n {
                return tcl.raise(TclError::Arity(
                    "wrong # args: no expression following \"elseif\" argument".to_owned(),
                ));
            }
            let cond = args[pos].to_string();
            if pos >= n - 1 {
                return tcl.raise(TclError::Arity(format!(
                    "wrong # args: no script following \"{cond}\" argument"
                )));
            }
            if tcl.eval_condition(&cond)? {
                let body = args[pos + 1].to_string();
                tcl.parse_string(&body)?;
                return Ok(None);
            }
            pos += 2;
        } else if word == "else" {
            pos += 1;
            if pos >= n {
                return tcl.raise(TclError::Arity(
                    "wrong # args: no script following \"else\" argument".to_owned(),
                ));
            }
            if pos < n - 1 {
                return tcl.raise(TclError::Arity(
                    "wrong # args: extra words after \"else\" clause in \"if\" command".to_owned(),
                ));
            }
            let body = args[pos].to_string();
            tcl.parse_string(&body)?;
            return Ok(None);
        } else {
            return tcl.raise(TclError::unknown_command(&word));
        }
    }
    Ok(None)
}

fn cmd_while(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() != 2 {
        return tcl.raise(TclError::wrong_num_args("while test command"));
    }
    let test = args[0].to_string();
    let body = args[1].to_string();
    tcl.clear_break();
    while tcl.eval_condition(&test)? {
        tcl.clear_continue();
        tcl.parse_string(&body)?;
        if tcl.loop_interrupted() {
            break;
        }
    }
    tcl.clear_break();
    tcl.clear_continue();
    Ok(None)
}

fn cmd_for(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() != 4 {
        return tcl.raise(TclError::wrong_num_args("for start test next command"));
    }
    let start = args[0].to_string();
    let test = args[1].to_string();
    let next = args[2].to_string();
    let body = args[3].to_string();
    tcl.clear_break();
    tcl.clear_continue();
    tcl.parse_string(&start)?;
    while tcl.eval_condition(&test)? {
        tcl.parse_string(&body)?;
        // `continue` is cleared before the step script so the step
        // still runs; it also runs once more after a `break`.
        tcl.clear_continue();
        tcl.parse_string(&next)?;
        if tcl.loop_interrupted() {
            break;
        }
    }
    tcl.clear_break();
    tcl.clear_continue();
    Ok(None)
}

fn cmd_foreach(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() != 3 {
        return tcl.raise(TclError::wrong_num_args(
            "foreach varList list ?varList list ...? command",
        ));
    }
    let vars: Vec<String> = args[0]
        .clone()
        .into_list()
        .iter()
        .map(|v| v.to_string())
        .collect();
    if vars.is_empty() {
        return tcl.raise(TclError::Runtime("foreach varlist is empty".to_owned()));
    }
    let values = args[1].clone().into_list();
    let body = args[2].to_string();
    tcl.clear_break();
    tcl.clear_continue();
    // Incomplete trailing groups are dropped.
    let iters = values.len() / vars.len();
    for i in 0..iters {
        for (j, var) in vars.iter().enumerate() {
            tcl.set_local(var, values[i * vars.len() + j].clone());
        }
        tcl.clear_continue();
        tcl.parse_string(&body)?;
        if tcl.loop_interrupted() {
            break;
        }
    }
    tcl.clear_break();
    tcl.clear_continue();
    Ok(None)
}

fn cmd_break(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if !args.is_empty() {
        return tcl.raise(TclError::wrong_num_args("break"));
    }
    if !tcl.in_loop() {
        return tcl.raise(TclError::Runtime(
            "invoked \"break\" outside of a loop".to_owned(),
        ));
    }
    tcl.raise_signal(Signal::Break);
    Ok(None)
}

fn cmd_continue(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if !args.is_empty() {
        return tcl.raise(TclError::wrong_num_args("continue"));
    }
    if !tcl.in_loop() {
        return tcl.raise(TclError::Runtime(
            "invoked \"continue\" outside of a loop".to_owned(),
        ));
    }
    tcl.raise_signal(Signal::Continue);
    Ok(None)
}

fn cmd_return(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    // Extra arguments are ignored.
    let value = args.first().cloned().unwrap_or(Value::None);
    tcl.raise_signal(Signal::Return(value));
    Ok(None)
}

fn cmd_catch(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args("catch command ?varName?"));
    }
    let script = args[0].to_string();
    let caught = match tcl.parse_string(&script) {
        Ok(_) => None,
        Err(err) if err.catchable() => Some(err.message()),
        Err(err) => return Err(err),
    };
    if let Some(msg) = &caught {
        if let Some(var) = args.get(1) {
            // The raise already unwound, so this lands in the global
            // scope.
            tcl.set_local(&var.to_string(), Value::from(msg.as_str()));
        }
    }
    Ok(Some(Value::from(caught.is_none())))
}

fn cmd_eval(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args("eval arg ?arg ...?"));
    }
    let script = join_args(args);
    tcl.parse_string(&script)
}

fn cmd_switch(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    let n = args.len();
    let mut is_glob = false;
    let mut is_regexp = false;
    let mut pos = 0;
    while pos < n {
        let arg = args[pos].to_string();
        if !arg.starts_with('-') {
            break;
        }
        pos += 1;
        match arg.as_str() {
            "--" => break,
            "-exact" => {}
            "-glob" => is_glob = true,
            "-regexp" => is_regexp = true,
            // Unknown switches are consumed without complaint.
            _ => {}
        }
    }
    if pos + 1 >= n {
        return tcl.raise(TclError::wrong_num_args(
            "switch ?switches? string pattern body ... ?default body?",
        ));
    }
    let subject = args[pos].to_string();
    pos += 1;

    let mut pairs: Vec<(String, Value)> = Vec::new();
    let extra;
    if pos == n - 1 {
        // Single-argument form: one list of pattern/body pairs.
        let items = args[pos].clone().into_list();
        let mut i = 0;
        while i + 1 < items.len() {
            pairs.push((items[i].to_string(), items[i + 1].clone()));
            i += 2;
        }
        extra = i < items.len();
    } else {
        let mut i = pos;
        while i + 1 < n {
            pairs.push((args[i].to_string(), args[i + 1].clone()));
            i += 2;
        }
        extra = i < n;
    }
    if extra {
        return tcl.raise(TclError::Runtime(
            "extra switch pattern with no body".to_owned(),
        ));
    }

    let count = pairs.len();
    for (i, (pattern, body)) in pairs.iter().enumerate() {
        // `default` only has its special meaning in the last slot.
        let matched = (i == count - 1 && pattern == "default")
            || if is_regexp {
                Pattern::new(pattern, MatchMode::Regexp, false)
                    .map(|p| p.matches(&subject))
                    .unwrap_or(false)
            } else if is_glob {
                glob_match(pattern, &subject, false)
            } else {
                subject == *pattern
            };
        if matched {
            tcl.parse_string(&body.to_string())?;
            break;
        }
    }
    Ok(None)
}

fn cmd_exit(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() > 1 {
        return tcl.raise(TclError::wrong_num_args("exit ?returnCode?"));
    }
    let code = match args.first() {
        Some(value) => value.to_int()? as i32,
        None => 0,
    };
    Err(TclError::Exit(code))
}

fn cmd_after(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args("after option ?arg arg ...?"));
    }
    let opt = args[0].to_string();
    match opt.as_str() {
        "cancel" => {
            if args.len() < 2 {
                return tcl.raise(TclError::wrong_num_args("after cancel id|command"));
            }
            for id in &args[1..] {
                tcl.cancel_timer(&id.to_string());
            }
            Ok(None)
        }
        "idle" => {
            if args.len() < 2 {
                return tcl.raise(TclError::wrong_num_args("after idle script script ..."));
            }
            let script = join_args(&args[1..]);
            Ok(Some(Value::from(tcl.add_timer(0, &script))))
        }
        "info" => {
            if args.len() == 1 {
                let names = tcl.timer_names().into_iter().map(Value::from).collect();
                return Ok(Some(Value::List(names)));
            }
            let mut entries = Vec::new();
            for id in &args[1..] {
                let id = id.to_string();
                match tcl.timer_script(&id) {
                    Some(script) => {
                        entries.push(Value::List(vec![Value::from(id), Value::from(script)]));
                    }
                    None => {
                        return tcl
                            .raise(TclError::Runtime(format!("event \"{id}\" doesn't exist")));
                    }
                }
            }
            Ok(Some(Value::List(entries)))
        }
        _ => {
            let Ok(ms) = args[0].to_int() else {
                return tcl.raise(TclError::Runtime(format!(
                    "bad argument \"{opt}\": must be cancel, idle, info, or a number"
                )));
            };
            if args.len() == 1 {
                tcl.os().sleep_ms(ms.max(0) as u64);
                Ok(None)
            } else {
                let script = join_args(&args[1..]);
                Ok(Some(Value::from(tcl.add_timer(ms, &script))))
            }
        }
    }
}

fn cmd_update(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() > 1 {
        return tcl.raise(TclError::wrong_num_args("update ?idletasks?"));
    }
    if let Some(arg) = args.first() {
        let arg = arg.to_string();
        if arg != "idletasks" {
            return tcl.raise(TclError::Runtime(format!(
                "bad option \"{arg}\": must be idletasks"
            )));
        }
    }
    tcl.run_timers()?;
    Ok(None)
}

// ── Variables ─────────────────────────────────────────────────────────────────

fn cmd_set(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() || args.len() > 2 {
        return Ok(None);
    }
    let spec = args[0].to_string();
    let array_form = match (spec.find('('), spec.rfind(')')) {
        (Some(p1), Some(p2)) if p2 == spec.len() - 1 => Some((p1, p2)),
        _ => None,
    };
    match array_form {
        Some((p1, p2)) => {
            let name = spec[..p1].to_owned();
            let index = spec[p1 + 1..p2].to_owned();
            if args.len() == 2 {
                tcl.set_array_variable_value(&name, &index, args[1].clone());
                Ok(Some(args[1].clone()))
            } else {
                match tcl.array_var_value(&name, &index) {
                    Some(value) => Ok(Some(value)),
                    None => tcl.raise(TclError::no_such_variable(&spec)),
                }
            }
        }
        None => {
            if args.len() == 2 {
                tcl.set_variable_value(&spec, args[1].clone());
                Ok(Some(args[1].clone()))
            } else {
                match tcl.var_value(&spec) {
                    Some(value) => Ok(Some(value)),
                    None => tcl.raise(TclError::no_such_variable(&spec)),
                }
            }
        }
    }
}

fn cmd_unset(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    for arg in args {
        tcl.remove_local(&arg.to_string());
    }
    Ok(None)
}

fn cmd_incr(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() || args.len() > 2 {
        return Ok(None);
    }
    let name = args[0].to_string();
    let Some(var) = tcl.local_var(&name) else {
        return tcl.raise(TclError::no_such_variable(&name));
    };
    let (base, base_ok) = match var.borrow().value().to_int() {
        Ok(n) => (n, true),
        // A non-integer current value counts as zero and blocks the
        // implicit +1.
        Err(_) => (0, false),
    };
    let result = if args.len() == 1 {
        if base_ok {
            base + 1
        } else {
            base
        }
    } else {
        match args[1].to_int() {
            Ok(inc) => base + inc,
            Err(_) => base,
        }
    };
    if !var.borrow().is_env() {
        var.borrow_mut().set_value(Value::from(result));
    }
    Ok(Some(Value::from(result)))
}

fn cmd_append(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() < 2 {
        return tcl.raise(TclError::wrong_num_args("append varName ?value value ...?"));
    }
    let name = args[0].to_string();
    match tcl.local_var(&name) {
        Some(var) => {
            for value in &args[1..] {
                var.borrow_mut().append_value(value.clone());
            }
        }
        None => {
            tcl.set_local(&name, args[1].clone());
            if let Some(var) = tcl.local_var(&name) {
                for value in &args[2..] {
                    var.borrow_mut().append_value(value.clone());
                }
            }
        }
    }
    Ok(None)
}

fn cmd_global(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args("global varName ?varName ...?"));
    }
    for arg in args {
        let name = arg.to_string();
        if tcl.local_var(&name).is_some() {
            return tcl.raise(TclError::Runtime(format!(
                "variable \"{name}\" already exists"
            )));
        }
        let var = tcl.global_var_or_create(&name);
        tcl.add_local_alias(&name, var);
    }
    Ok(None)
}

fn cmd_variable(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args(
            "variable ?name value...? name ?value?",
        ));
    }
    if args.len() == 1 {
        let name = args[0].to_string();
        if tcl.local_var(&name).is_none() {
            tcl.declare_local(&name, Value::None);
        }
        return Ok(None);
    }
    // Name/value pairs; a trailing odd name is dropped.
    let mut i = 0;
    while i + 1 < args.len() {
        tcl.set_local(&args[i].to_string(), args[i + 1].clone());
        i += 2;
    }
    Ok(None)
}

fn cmd_array(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() < 2 {
        return tcl.raise(TclError::wrong_num_args("array option arrayName ?arg ...?"));
    }
    let opt = args[0].to_string();
    let name = args[1].to_string();
    match opt.as_str() {
        "anymore" | "donesearch" | "nextelement" | "startsearch" | "statistics" => Ok(None),
        "exists" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("array exists arrayName"));
            }
            let is_array = tcl
                .local_var(&name)
                .is_some_and(|var| matches!(var.borrow().value(), Value::Array(_)));
            Ok(Some(Value::from(is_array)))
        }
        "get" => {
            let Some(var) = tcl.local_var(&name) else {
                return Ok(None);
            };
            let value = var.borrow().value().clone();
            match value {
                Value::Array(map) => {
                    let pairs = map
                        .into_iter()
                        .map(|(k, v)| Value::List(vec![Value::from(k), v]))
                        .collect();
                    Ok(Some(Value::List(pairs)))
                }
                _ => Ok(None),
            }
        }
        "names" => {
            let Some(var) = tcl.local_var(&name) else {
                return Ok(None);
            };
            let value = var.borrow().value().clone();
            match value {
                Value::Array(map) => Ok(Some(Value::List(
                    map.into_keys().map(Value::from).collect(),
                ))),
                _ => Ok(None),
            }
        }
        "size" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("array size arrayName"));
            }
            let size = tcl
                .local_var(&name)
                .map_or(0, |var| match var.borrow().value() {
                    Value::Array(map) => map.len() as i64,
                    _ => 0,
                });
            Ok(Some(Value::from(size)))
        }
        "set" => {
            if args.len() < 3 {
                return tcl.raise(TclError::wrong_num_args("array set arrayName list"));
            }
            let items = args[2].clone().into_list();
            if items.len() % 2 != 0 {
                return tcl.raise(TclError::Runtime(
                    "list must have an even number of elements".to_owned(),
                ));
            }
            let mut map = BTreeMap::new();
            let mut i = 0;
            while i + 1 < items.len() {
                map.insert(items[i].to_string(), items[i + 1].clone());
                i += 2;
            }
            tcl.set_local(&name, Value::Array(map));
            Ok(None)
        }
        "unset" => {
            tcl.remove_local(&name);
            Ok(None)
        }
        _ => tcl.raise(TclError::Runtime(format!(
            "bad option \"{opt}\": must be anymore, donesearch, exists, get, names, \
             nextelement, set, size, startsearch, statistics, or unset"
        ))),
    }
}

// ── Lists ─────────────────────────────────────────────────────────────────────

fn cmd_llength(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() != 1 {
        return tcl.raise(TclError::wrong_num_args("llength list"));
    }
    Ok(Some(Value::from(args[0].clone().into_list().len() as i64)))
}

fn cmd_lindex(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args("lindex list ?index...?"));
    }
    if args.len() == 1 {
        return Ok(Some(Value::List(args[0].clone().into_list())));
    }
    let ind = args[1].to_index()?;
    let items = args[0].clone().into_list();
    let len = items.len() as i64;
    let ind = if ind < 0 { len + ind } else { ind };
    if ind < 0 || ind >= len {
        return Ok(None);
    }
    Ok(Some(items[ind as usize].clone()))
}

fn cmd_linsert(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() < 3 {
        return tcl.raise(TclError::wrong_num_args(
            "linsert list index element ?element ...?",
        ));
    }
    let ind = args[1].to_index()?;
    let items = args[0].clone().into_list();
    let len = items.len() as i64;
    let ind = if ind < 0 { len + ind } else { ind };
    if ind < 0 || ind > len {
        return Ok(None);
    }
    let ind = ind as usize;
    let mut out = Vec::with_capacity(items.len() + args.len() - 2);
    out.extend_from_slice(&items[..ind]);
    out.extend(args[2..].iter().cloned());
    out.extend_from_slice(&items[ind..]);
    Ok(Some(Value::List(out)))
}

fn cmd_lrange(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() != 3 {
        return tcl.raise(TclError::wrong_num_args("lrange list first last"));
    }
    let items = args[0].clone().into_list();
    let len = items.len() as i64;
    let mut first = args[1].to_index()?;
    let mut last = args[2].to_index()?;
    if first < 0 {
        first += len;
    }
    if last < 0 {
        last += len;
    }
    let first = first.max(0);
    let last = last.min(len - 1);
    if first > last {
        return Ok(Some(Value::List(Vec::new())));
    }
    Ok(Some(Value::List(
        items[first as usize..=last as usize].to_vec(),
    )))
}

fn cmd_lrepeat(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() < 2 {
        return tcl.raise(TclError::wrong_num_args(
            "lrepeat positiveCount value ?value ...?",
        ));
    }
    let count = args[0].to_index()?;
    let mut out = Vec::new();
    for _ in 0..count.max(0) {
        out.extend(args[1..].iter().cloned());
    }
    Ok(Some(Value::List(out)))
}

fn cmd_lreplace(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() < 3 {
        return tcl.raise(TclError::wrong_num_args(
            "lreplace list first last ?element element ...?",
        ));
    }
    let items = args[0].clone().into_list();
    let len = items.len() as i64;
    let mut ind1 = args[1].to_index()?;
    let mut ind2 = args[2].to_index()?;
    if ind1 < 0 {
        ind1 += len;
    }
    if ind2 < 0 {
        ind2 += len;
    }
    if ind1 < 0 || ind1 >= len {
        return tcl.raise(TclError::Runtime(format!(
            "list doesn't contain element {ind1}"
        )));
    }
    if ind2 < 0 || ind2 >= len {
        return tcl.raise(TclError::Runtime(format!(
            "list doesn't contain element {ind2}"
        )));
    }
    let mut out = Vec::new();
    out.extend_from_slice(&items[..ind1 as usize]);
    out.extend(args[3..].iter().cloned());
    if ind2 + 1 < len {
        out.extend_from_slice(&items[(ind2 + 1) as usize..]);
    }
    Ok(Some(Value::List(out)))
}

fn cmd_lsearch(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() != 2 {
        return tcl.raise(TclError::wrong_num_args("lsearch ?options? list pattern"));
    }
    let items = args[0].clone().into_list();
    let found = items.iter().position(|item| item == &args[1]);
    Ok(Some(Value::from(found.map_or(-1, |i| i as i64))))
}

fn cmd_lappend(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args(
            "lappend varName ?value value ...?",
        ));
    }
    let name = args[0].to_string();
    if tcl.local_var(&name).is_none() {
        tcl.set_local(&name, Value::List(Vec::new()));
    }
    let Some(var) = tcl.local_var(&name) else {
        return Ok(None);
    };
    let mut items = var.borrow().value().clone().into_list();
    for value in &args[1..] {
        items.push(value.clone());
    }
    let list = Value::List(items);
    if !var.borrow().is_env() {
        var.borrow_mut().set_value(list.clone());
    }
    Ok(Some(list))
}

fn cmd_lset(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() < 2 {
        return tcl.raise(TclError::wrong_num_args(
            "lset listVar index ?index...? value",
        ));
    }
    let name = args[0].to_string();
    let Some(var) = tcl.local_var(&name) else {
        return tcl.raise(TclError::no_such_variable(&name));
    };
    if args.len() == 2 {
        if !var.borrow().is_env() {
            var.borrow_mut().set_value(args[1].clone());
        }
        return Ok(Some(args[1].clone()));
    }
    let value = args[args.len() - 1].clone();
    let indices = &args[1..args.len() - 1];
    let current = var.borrow().value().clone();
    let rebuilt = lset_rebuild(tcl, current, indices, value)?;
    if !var.borrow().is_env() {
        var.borrow_mut().set_value(rebuilt.clone());
    }
    Ok(Some(rebuilt))
}

/// Replace the element at the index path inside `current`, rebuilding
/// each level of list structure on the way out.
fn lset_rebuild(
    tcl: &mut Interp,
    current: Value,
    indices: &[Value],
    value: Value,
) -> TclResult<Value> {
    let Some((index, rest)) = indices.split_first() else {
        return Ok(value);
    };
    let mut items = current.into_list();
    let len = items.len() as i64;
    let mut ind = index.to_index()?;
    if ind < 0 {
        ind += len;
    }
    if ind < 0 || ind >= len {
        return tcl.raise(TclError::Runtime("list index out of range".to_owned()));
    }
    let inner = std::mem::take(&mut items[ind as usize]);
    items[ind as usize] = lset_rebuild(tcl, inner, rest, value)?;
    Ok(Value::List(items))
}

fn cmd_lsort(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() != 1 {
        return tcl.raise(TclError::wrong_num_args("lsort list"));
    }
    // Ordered-set semantics: sorting also drops duplicates.
    let set: BTreeSet<Value> = args[0].clone().into_list().into_iter().collect();
    Ok(Some(Value::List(set.into_iter().collect())))
}

fn cmd_join(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() || args.len() > 2 {
        return tcl.raise(TclError::wrong_num_args("join list ?joinString?"));
    }
    let sep = match args.get(1) {
        Some(sep) => sep.to_string(),
        None => " ".to_owned(),
    };
    let joined = args[0]
        .clone()
        .into_list()
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(&sep);
    Ok(Some(Value::from(joined)))
}

// ── Strings ───────────────────────────────────────────────────────────────────

fn cmd_string(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args("string option arg ?arg ...?"));
    }
    let opt = args[0].to_string();
    match opt.as_str() {
        "bytelength" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args(
                    "wrong # args: should be \"string bytelength string\"",
                ));
            }
            Ok(Some(Value::from(args[1].to_string().len() as i64)))
        }
        "compare" | "equal" => {
            if args.len() < 3 {
                return tcl.raise(TclError::wrong_num_args(&format!(
                    "string {opt} ?-nocase? ?-length int? string1 string2"
                )));
            }
            let mut nocase = false;
            let mut length: i64 = -1;
            let mut pos = 1;
            if pos < args.len() && args[pos].to_string() == "-nocase" {
                nocase = true;
                pos += 1;
            }
            if pos < args.len() && args[pos].to_string() == "-length" {
                pos += 1;
                if pos < args.len() {
                    let Ok(n) = args[pos].to_int() else {
                        return Ok(None);
                    };
                    length = n;
                    pos += 1;
                }
            }
            let mut str1 = args.get(pos).map(|v| v.to_string()).unwrap_or_default();
            let mut str2 = args.get(pos + 1).map(|v| v.to_string()).unwrap_or_default();
            if length >= 0 {
                str1 = str1.chars().take(length as usize).collect();
                str2 = str2.chars().take(length as usize).collect();
            }
            if nocase {
                str1 = str1.to_lowercase();
                str2 = str2.to_lowercase();
            }
            if opt == "equal" {
                Ok(Some(Value::from(str1 == str2)))
            } else {
                let cmp: i64 = match str1.cmp(&str2) {
                    Ordering::Less => -1,
                    Ordering::Equal => 0,
                    Ordering::Greater => 1,
                };
                Ok(Some(Value::from(cmp)))
            }
        }
        "first" => {
            if args.len() != 3 && args.len() != 4 {
                return tcl.raise(TclError::wrong_num_args(
                    "should be \"string first subString string ?startIndex?\"",
                ));
            }
            let sub = args[1].to_string();
            let text = args[2].to_string();
            Ok(Some(Value::from(
                text.find(&sub).map_or(-1, |p| p as i64),
            )))
        }
        "index" => {
            if args.len() != 3 && args.len() != 4 {
                return tcl.raise(TclError::wrong_num_args(
                    "should be \"string index string charIndex\"",
                ));
            }
            let text = args[1].to_string();
            let Ok(pos) = args[2].to_int() else {
                return Ok(None);
            };
            let chars: Vec<char> = text.chars().collect();
            if pos < 0 || pos >= chars.len() as i64 {
                return Ok(None);
            }
            Ok(Some(Value::from(chars[pos as usize].to_string())))
        }
        "last" => {
            if args.len() != 3 && args.len() != 4 {
                return tcl.raise(TclError::wrong_num_args(
                    "should be \"string last subString string ?startIndex?\"",
                ));
            }
            let sub = args[1].to_string();
            let text = args[2].to_string();
            Ok(Some(Value::from(
                text.rfind(&sub).map_or(-1, |p| p as i64),
            )))
        }
        "length" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("string length string"));
            }
            Ok(Some(Value::from(args[1].to_string().len() as i64)))
        }
        "map" => {
            let mut nocase = false;
            let mut pos = 1;
            if args.len() > 1 && args[1].to_string() == "-nocase" {
                nocase = true;
                pos += 1;
            }
            if args.len() - pos != 2 {
                return tcl.raise(TclError::wrong_num_args(
                    "string map ?-nocase? charMap string",
                ));
            }
            let mapping = args[pos].clone().into_list();
            if mapping.len() % 2 != 0 {
                return tcl.raise(TclError::Runtime("char map list unbalanced".to_owned()));
            }
            let text = args[pos + 1].to_string();
            if mapping.is_empty() {
                return Ok(Some(Value::from(text)));
            }
            let patterns: Vec<String> = mapping.iter().step_by(2).map(|v| v.to_string()).collect();
            let replacements: Vec<String> = mapping
                .iter()
                .skip(1)
                .step_by(2)
                .map(|v| v.to_string())
                .collect();
            let searcher = AhoCorasickBuilder::new()
                .match_kind(MatchKind::LeftmostFirst)
                .ascii_case_insensitive(nocase)
                .build(&patterns);
            Ok(Some(Value::from(
                searcher.replace_all(&text, &replacements),
            )))
        }
        "match" => {
            if args.len() < 3 {
                return tcl.raise(TclError::wrong_num_args(
                    "string match ?-nocase? pattern string",
                ));
            }
            let mut nocase = false;
            let mut pos = 1;
            if args[pos].to_string() == "-nocase" {
                nocase = true;
                pos += 1;
            }
            let pattern = args.get(pos).map(|v| v.to_string()).unwrap_or_default();
            let text = args.get(pos + 1).map(|v| v.to_string()).unwrap_or_default();
            Ok(Some(Value::from(glob_match(&pattern, &text, nocase))))
        }
        "range" => {
            if args.len() != 4 {
                return tcl.raise(TclError::wrong_num_args("string range string first last"));
            }
            let chars: Vec<char> = args[1].to_string().chars().collect();
            let len = chars.len() as i64;
            let mut first = args[2].to_index()?;
            let mut last = args[3].to_index()?;
            if first < 0 {
                first += len;
            }
            if last < 0 {
                last += len;
            }
            let first = first.max(0);
            let last = last.min(len - 1);
            if first > last {
                return Ok(Some(Value::from("")));
            }
            let out: String = chars[first as usize..=last as usize].iter().collect();
            Ok(Some(Value::from(out)))
        }
        "repeat" => {
            if args.len() != 3 {
                return tcl.raise(TclError::wrong_num_args("string repeat string count"));
            }
            let text = args[1].to_string();
            let count = args[2].to_int()?;
            Ok(Some(Value::from(text.repeat(count.max(0) as usize))))
        }
        "replace" => {
            if args.len() != 4 && args.len() != 5 {
                return tcl.raise(TclError::wrong_num_args(
                    "string replace string first last ?string?",
                ));
            }
            let chars: Vec<char> = args[1].to_string().chars().collect();
            let start = args[2].to_int()?;
            let end = args[3].to_int()?;
            let rep = args.get(4).map(|v| v.to_string()).unwrap_or_default();
            let len = chars.len() as i64;
            // An out-of-range endpoint drops that whole side.
            let left: String = if start >= 0 && start < len {
                chars[..start as usize].iter().collect()
            } else {
                String::new()
            };
            let right: String = if end >= 0 && end < len {
                chars[(end + 1) as usize..].iter().collect()
            } else {
                String::new()
            };
            Ok(Some(Value::from(format!("{left}{rep}{right}"))))
        }
        "tolower" | "toupper" | "totitle" => {
            if args.len() < 2 || args.len() > 4 {
                return tcl.raise(TclError::wrong_num_args(
                    "string tolower string ?first? ?last?",
                ));
            }
            let mut chars: Vec<char> = args[1].to_string().chars().collect();
            let len = chars.len() as i64;
            let start = match args.get(2) {
                Some(v) => v.to_int()?,
                None => 0,
            };
            let end = match args.get(3) {
                Some(v) => v.to_int()?,
                None => len,
            };
            let mut i = start.max(0);
            while i <= end && i < len {
                let c = chars[i as usize];
                chars[i as usize] = match opt.as_str() {
                    "tolower" => c.to_ascii_lowercase(),
                    "toupper" => c.to_ascii_uppercase(),
                    _ => {
                        if i == start {
                            c.to_ascii_uppercase()
                        } else {
                            c.to_ascii_lowercase()
                        }
                    }
                };
                i += 1;
            }
            Ok(Some(Value::from(chars.into_iter().collect::<String>())))
        }
        "trim" | "trimleft" | "trimright" => {
            if args.len() < 2 || args.len() > 3 {
                return tcl.raise(TclError::wrong_num_args(&format!(
                    "string {opt} string ?chars?"
                )));
            }
            let text = args[1].to_string();
            let set = args.get(2).map(|v| v.to_string());
            let in_set = |c: char| match &set {
                Some(set) => set.contains(c),
                None => is_space(c),
            };
            let trimmed = match opt.as_str() {
                "trim" => text.trim_matches(|c| in_set(c)),
                "trimleft" => text.trim_start_matches(|c| in_set(c)),
                _ => text.trim_end_matches(|c| in_set(c)),
            };
            Ok(Some(Value::from(trimmed)))
        }
        "is" | "wordend" | "wordstart" => Ok(None),
        _ => tcl.raise(TclError::Runtime(format!(
            "bad option \"{opt}\": must be bytelength, compare, equal, first, index, is, \
             last, length, map, match, range, repeat, replace, tolower, toupper, totitle, \
             trim, trimleft, trimright, wordend, or wordstart"
        ))),
    }
}

fn cmd_format(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args("format formatString ?arg arg ...?"));
    }
    let fmt = args[0].to_string();
    Ok(Some(Value::from(format_values(&fmt, &args[1..])?)))
}

// ── Expressions ───────────────────────────────────────────────────────────────

fn cmd_expr(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    let text = join_args(args);
    Ok(Some(tcl.eval_expr_text(&text)?))
}

// ── Procedures and introspection ──────────────────────────────────────────────

fn cmd_proc(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    // Anything but exactly three arguments is quietly ignored.
    if args.len() != 3 {
        return Ok(None);
    }
    let name = args[0].to_string();
    let formals: Vec<String> = args[1]
        .clone()
        .into_list()
        .iter()
        .map(|v| v.to_string())
        .collect();
    tcl.define_proc(&name, formals, args[2].clone());
    Ok(None)
}

fn cmd_info(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args("info option ?arg arg ...?"));
    }
    let opt = args[0].to_string();
    match opt.as_str() {
        "args" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("info args procname"));
            }
            let name = args[1].to_string();
            let Some(proc) = tcl.lookup_proc(&name) else {
                return tcl.raise(TclError::Name(format!("\"{name}\" is not a procedure")));
            };
            Ok(Some(Value::List(
                proc.args().iter().map(|a| Value::from(a.as_str())).collect(),
            )))
        }
        "body" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("info body procname"));
            }
            let name = args[1].to_string();
            let Some(proc) = tcl.lookup_proc(&name) else {
                return tcl.raise(TclError::Name(format!("\"{name}\" is not a procedure")));
            };
            Ok(Some(proc.body().clone()))
        }
        "cmdcount" => Ok(Some(Value::from(0i64))),
        "commands" => Ok(Some(Value::List(names().map(Value::from).collect()))),
        "complete" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("info complete command"));
            }
            Ok(Some(Value::from(is_complete_line(&args[1].to_string()))))
        }
        "exists" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("info exists command"));
            }
            Ok(Some(Value::from(
                tcl.local_var(&args[1].to_string()).is_some(),
            )))
        }
        "globals" => Ok(Some(Value::List(
            tcl.global_var_names().into_iter().map(Value::from).collect(),
        ))),
        "hostname" => Ok(Some(Value::from(tcl.os().hostname()))),
        "level" => Ok(Some(Value::from(0i64))),
        "procs" => Ok(Some(Value::List(
            tcl.global_proc_names().into_iter().map(Value::from).collect(),
        ))),
        "vars" => Ok(Some(Value::List(
            tcl.active_var_names().into_iter().map(Value::from).collect(),
        ))),
        // Everything else, recognized or not, answers nothing.
        _ => Ok(None),
    }
}

fn cmd_history(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        let entries: Vec<(u64, String)> = tcl
            .history()
            .entries()
            .map(|(number, command)| (number, command.to_owned()))
            .collect();
        for (number, command) in entries {
            tcl.out_line(&format!("{number} {command}"));
        }
        return Ok(None);
    }
    let opt = args[0].to_string();
    match opt.as_str() {
        "add" | "change" | "clear" | "event" | "info" | "keep" | "nextid" | "redo" => Ok(None),
        _ => tcl.raise(TclError::Runtime(format!(
            "bad option \"{opt}\": must be add, change, clear, event, info, keep, nextid, or redo"
        ))),
    }
}

fn cmd_package(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args(
            "should be \"package option ?arg ...?\"",
        ));
    }
    Ok(None)
}

fn cmd_namespace(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args("namespace subcommand ?arg ...?"));
    }
    let opt = args[0].to_string();
    match opt.as_str() {
        "eval" => {
            if args.len() < 3 {
                return tcl.raise(TclError::wrong_num_args("namespace eval name ?arg ...?"));
            }
            tcl.push_named_scope(&args[1].to_string());
            for script in &args[2..] {
                if let Err(err) = tcl.parse_string(&script.to_string()) {
                    tcl.pop_scope();
                    return Err(err);
                }
            }
            tcl.pop_scope();
            Ok(None)
        }
        "children" | "code" | "current" | "delete" | "exists" | "export" | "forget" | "import"
        | "inscope" | "origin" | "parent" | "qualifiers" | "tail" | "which" => Ok(None),
        _ => tcl.raise(TclError::Runtime(format!(
            "bad option \"{opt}\": must be children, code, current, delete, eval, exists, \
             export, forget, import, inscope, origin, parent, qualifiers, tail, or which"
        ))),
    }
}

// ── Files and channels ────────────────────────────────────────────────────────

fn cmd_open(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args(
            "open fileName ?access? ?permissions?",
        ));
    }
    let name = args[0].to_string();
    let access = match args.get(1) {
        Some(access) => access.to_string(),
        None => "r".to_owned(),
    };
    // Permissions must parse but are otherwise left to the umask.
    if let Some(perm) = args.get(2) {
        perm.to_int()?;
    }
    Ok(Some(Value::from(tcl.open_channel(&name, &access)?)))
}

fn cmd_close(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() != 1 {
        return tcl.raise(TclError::wrong_num_args("close channelId"));
    }
    tcl.close_channel(&args[0].to_string());
    Ok(None)
}

fn cmd_eof(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() != 1 {
        return tcl.raise(TclError::wrong_num_args("eof channelId"));
    }
    let id = args[0].to_string();
    let at_eof = if id == "stdin" {
        tcl.stdin_at_eof()
    } else {
        tcl.channel(&id)?.at_eof()
    };
    Ok(Some(Value::from(at_eof)))
}

fn cmd_flush(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() != 1 {
        return tcl.raise(TclError::wrong_num_args("flush channelId"));
    }
    let id = args[0].to_string();
    match id.as_str() {
        "stdout" => tcl.flush_out(),
        "stderr" => tcl.flush_err(),
        _ => tcl.channel(&id)?.flush(),
    }
    Ok(None)
}

fn cmd_gets(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() || args.len() > 2 {
        return tcl.raise(TclError::wrong_num_args("gets channelId ?varName?"));
    }
    let id = args[0].to_string();
    let line = if id == "stdin" {
        tcl.read_stdin_line()
    } else {
        tcl.channel(&id)?.read_line()
    };
    if args.len() == 2 {
        let len = line.len() as i64;
        tcl.set_local(&args[1].to_string(), Value::from(line));
        Ok(Some(Value::from(len)))
    } else {
        Ok(Some(Value::from(line)))
    }
}

fn cmd_read(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    let mut pos = 0;
    let mut n = args.len();
    // `-nonewline` is accepted and ignored.
    if n > 1 && args[0].to_string() == "-nonewline" {
        pos += 1;
        n -= 1;
    }
    if n != 1 && n != 2 {
        return tcl.raise(TclError::wrong_num_args(
            "read channelId ?numChars?\" or \"read ?-nonewline? channelId",
        ));
    }
    let id = args[pos].to_string();
    let count = match n {
        2 => Some(args[pos + 1].to_int()?),
        _ => None,
    };
    let text = if id == "stdin" {
        match count {
            Some(c) => tcl.read_stdin_chars(c.max(0) as usize),
            None => tcl.read_stdin_all(),
        }
    } else {
        let file = tcl.channel(&id)?;
        match count {
            Some(c) => file.read_chars(c.max(0) as usize),
            None => file.read_all(),
        }
    };
    Ok(Some(Value::from(text)))
}

fn cmd_puts(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    enum Target {
        Out,
        Err,
        Channel(String),
    }

    let mut pos = 0;
    let mut n = args.len();
    let mut newline = true;
    if n > 1 && args[0].to_string() == "-nonewline" {
        newline = false;
        pos += 1;
        n -= 1;
    }
    let mut target = Target::Out;
    if n > 1 {
        let id = args[pos].to_string();
        pos += 1;
        n -= 1;
        target = match id.as_str() {
            "stdout" => Target::Out,
            "stderr" => Target::Err,
            _ => {
                if !tcl.has_channel(&id) {
                    return tcl.raise(TclError::Runtime(format!(
                        "can not find channel named \"{id}\""
                    )));
                }
                Target::Channel(id)
            }
        };
    }
    if n == 1 {
        let text = args[pos].to_string();
        match &target {
            Target::Out => tcl.out_str(&text),
            Target::Err => tcl.err_str(&text),
            Target::Channel(id) => tcl.channel(id)?.write_str(&text),
        }
    }
    if newline {
        match &target {
            Target::Out => tcl.out_str("\n"),
            Target::Err => tcl.err_str("\n"),
            Target::Channel(id) => tcl.channel(id)?.write_str("\n"),
        }
    }
    Ok(None)
}

fn cmd_file(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args("file option ?arg ...?"));
    }
    let opt = args[0].to_string();
    match opt.as_str() {
        "atime" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("file atime name ?time?"));
            }
            let atime = tcl.os().stat(&args[1].to_string()).map_or(0, |st| st.atime);
            Ok(Some(Value::from(atime)))
        }
        "attributes" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args(
                    "file attributes name ?option? ?value? ?option value ...?",
                ));
            }
            let name = args[1].to_string();
            let Some(st) = tcl.os().stat(&name) else {
                return tcl.raise(TclError::wrong_num_args(&format!(
                    "could not read \"{name}\": no such file or directory"
                )));
            };
            let owner = tcl.os().user_name(st.uid).unwrap_or_default();
            let group = tcl.os().group_name(st.gid).unwrap_or_default();
            Ok(Some(Value::from(format!(
                "-group {group} -owner {owner} -permissions 0{:o}",
                st.mode & 0o7777
            ))))
        }
        "channels" => {
            if args.len() == 1 {
                Ok(Some(Value::List(vec![
                    Value::from("stdin"),
                    Value::from("stdout"),
                    Value::from("stderr"),
                ])))
            } else {
                Ok(Some(Value::List(Vec::new())))
            }
        }
        "executable" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("file isdirectory name"));
            }
            Ok(Some(Value::from(
                tcl.os().access(&args[1].to_string(), AccessMode::Execute),
            )))
        }
        "exists" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("file exists name"));
            }
            Ok(Some(Value::from(
                tcl.os().stat(&args[1].to_string()).is_some(),
            )))
        }
        "extension" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("file isdirectory name"));
            }
            let name = args[1].to_string();
            let tail_start = name.rfind('/').map_or(0, |p| p + 1);
            let ext = match name[tail_start..].rfind('.') {
                Some(p) => format!(".{}", &name[tail_start + p + 1..]),
                None => String::new(),
            };
            Ok(Some(Value::from(ext)))
        }
        "isdirectory" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("file isdirectory name"));
            }
            Ok(Some(Value::from(
                tcl.os()
                    .stat(&args[1].to_string())
                    .is_some_and(|st| st.is_dir),
            )))
        }
        "isfile" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("file isregular name"));
            }
            Ok(Some(Value::from(
                tcl.os()
                    .stat(&args[1].to_string())
                    .is_some_and(|st| st.is_file),
            )))
        }
        "mtime" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("file atime name ?time?"));
            }
            let mtime = tcl.os().stat(&args[1].to_string()).map_or(0, |st| st.mtime);
            Ok(Some(Value::from(mtime)))
        }
        "owned" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("file isregular name"));
            }
            Ok(Some(Value::from(tcl.os().is_owned(&args[1].to_string()))))
        }
        "readable" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("file isdirectory name"));
            }
            Ok(Some(Value::from(
                tcl.os().access(&args[1].to_string(), AccessMode::Read),
            )))
        }
        "size" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("file size name"));
            }
            let size = tcl
                .os()
                .stat(&args[1].to_string())
                .map_or(0, |st| st.size as i64);
            Ok(Some(Value::from(size)))
        }
        "writable" => {
            if args.len() != 2 {
                return tcl.raise(TclError::wrong_num_args("file isdirectory name"));
            }
            Ok(Some(Value::from(
                tcl.os().access(&args[1].to_string(), AccessMode::Write),
            )))
        }
        "copy" | "delete" | "dirname" | "join" | "link" | "lstat" | "mkdir" | "nativename"
        | "normalize" | "pathtype" | "readlink" | "rename" | "rootname" | "separator" | "split"
        | "stat" | "system" | "tail" | "type" | "volumes" => Ok(None),
        _ => tcl.raise(TclError::Runtime(format!(
            "bad option \"{opt}\": must be atime, attributes, channels, copy, delete, \
             dirname, executable, exists, extension, isdirectory, isfile, join, link, lstat, \
             mtime, mkdir, nativename, normalize, owned, pathtype, readable, readlink, \
             rename, rootname, separator, size, split, stat, system, tail, type, volumes, \
             or writable"
        ))),
    }
}

// ── OS access ─────────────────────────────────────────────────────────────────

fn cmd_cd(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    let dir = match args.len() {
        0 => tcl.os().home_dir().unwrap_or_default(),
        1 => args[0].to_string(),
        _ => return tcl.raise(TclError::wrong_num_args("cd ?dirName?")),
    };
    if !tcl.os().chdir(&dir) {
        return tcl.raise(TclError::Runtime(format!(
            "couldn't change working directory to \"{dir}\": no such file or directory"
        )));
    }
    Ok(None)
}

fn cmd_pwd(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if !args.is_empty() {
        return tcl.raise(TclError::wrong_num_args("pwd"));
    }
    Ok(Some(Value::from(tcl.os().cwd().unwrap_or_default())))
}

fn cmd_pid(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    // One argument is tolerated (and ignored); more is an error.
    if args.len() > 1 {
        return tcl.raise(TclError::wrong_num_args("pid"));
    }
    Ok(Some(Value::from(tcl.os().pid() as i64)))
}

fn cmd_clock(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() != 1 {
        return tcl.raise(TclError::wrong_num_args("clock option ?arg ...?"));
    }
    let opt = args[0].to_string();
    match opt.as_str() {
        "clicks" => {
            let (secs, usecs) = tcl.os().now_secs_usecs();
            Ok(Some(Value::from(format!("{secs}{usecs:06}"))))
        }
        "format" | "scan" => Ok(None),
        "seconds" => {
            let (secs, _) = tcl.os().now_secs_usecs();
            Ok(Some(Value::from(secs)))
        }
        _ => tcl.raise(TclError::Runtime(format!(
            "bad option \"{opt}\": must be clicks, format, scan, or seconds"
        ))),
    }
}

fn cmd_glob(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args("glob ?switches? name ?name ...?"));
    }
    let mut complain = true;
    let mut directory = String::new();
    let mut pos = 0;
    while pos < args.len() {
        let arg = args[pos].to_string();
        if !arg.starts_with('-') {
            break;
        }
        pos += 1;
        match arg.as_str() {
            "--" => break,
            "-join" | "-tails" => {}
            "-nocomplain" => complain = false,
            "-directory" => {
                if pos < args.len() {
                    directory = args[pos].to_string();
                    pos += 1;
                }
            }
            "-path" | "-types" => {
                // Recognized; the operand is consumed but unused.
                if pos < args.len() {
                    pos += 1;
                }
            }
            _ => {
                return tcl.raise(TclError::Runtime(format!(
                    "bad option \"{arg}\": must be -directory, -join, -nocomplain, -path, \
                     -tails, -types, or --"
                )));
            }
        }
    }
    let patterns: Vec<String> = args[pos..].iter().map(|a| a.to_string()).collect();
    let joined = patterns.join(" ");

    let saved_dir = if directory.is_empty() {
        None
    } else {
        let saved = tcl.os().cwd();
        if !tcl.os().chdir(&directory) {
            if complain {
                return tcl.raise(TclError::Runtime(format!(
                    "no files matched glob patterns \"{joined}\""
                )));
            }
            return Ok(None);
        }
        saved
    };

    let mut files = Vec::new();
    for pattern in &patterns {
        // Dotfiles only match patterns that ask for them.
        let want_hidden = pattern.starts_with('.');
        for name in tcl.os().list_dir(".") {
            if name.starts_with('.') && !want_hidden {
                continue;
            }
            if glob_match(pattern, &name, false) {
                files.push(Value::from(name));
            }
        }
    }

    if let Some(saved) = saved_dir {
        tcl.os().chdir(&saved);
    }

    if files.is_empty() {
        if complain {
            return tcl.raise(TclError::Runtime(format!(
                "no files matched glob patterns \"{joined}\""
            )));
        }
        return Ok(None);
    }
    Ok(Some(Value::List(files)))
}

fn cmd_exec(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.is_empty() {
        return tcl.raise(TclError::wrong_num_args("exec ?switches? arg ?arg ...?"));
    }
    let name = args[0].to_string();
    let Some(path) = tcl.os().find_executable(&name) else {
        return tcl.raise(TclError::Runtime(format!(
            "couldn't execute \"{name}\" no such file or directory"
        )));
    };
    let pipeline = tcl.parse_pipeline(&path, &args[1..])?;
    let result = tcl.run_pipeline(&pipeline, true)?;
    Ok(Some(Value::from(result.stdout.trim().to_owned())))
}

fn cmd_source(tcl: &mut Interp, args: &[Value]) -> TclResult<Option<Value>> {
    if args.len() != 1 {
        return tcl.raise(TclError::wrong_num_args("source fileName"));
    }
    tcl.parse_file(&args[0].to_string())?;
    Ok(None)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn interp() -> Interp {
        let mut tcl = Interp::new();
        tcl.set_out(Box::new(io::sink()));
        tcl.set_err(Box::new(io::sink()));
        tcl
    }

    fn eval(tcl: &mut Interp, script: &str) -> String {
        match tcl.parse_string(script) {
            Ok(Some(value)) => value.to_string(),
            Ok(None) => String::new(),
            Err(err) => panic!("script failed: {}", err.message()),
        }
    }

    fn eval_err(tcl: &mut Interp, script: &str) -> String {
        match tcl.parse_string(script) {
            Err(err) => err.message(),
            Ok(other) => panic!("expected an error, got {other:?}"),
        }
    }

    #[test]
    fn roster_is_sorted_and_dispatches() {
        let mut sorted = NAMES.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, NAMES.to_vec());
        assert!(is_builtin("set"));
        assert!(is_builtin("#"));
        assert!(!is_builtin("echo"));
        assert!(!is_builtin("upvar"));
    }

    #[test]
    fn incr_counts_and_quirks() {
        let mut tcl = interp();
        eval(&mut tcl, "set x 5");
        assert_eq!(eval(&mut tcl, "incr x"), "6");
        assert_eq!(eval(&mut tcl, "incr x 3"), "9");
        assert_eq!(eval(&mut tcl, "set x"), "9");
        // A non-integer value counts as zero and skips the implicit +1.
        eval(&mut tcl, "set s hello");
        assert_eq!(eval(&mut tcl, "incr s"), "0");
        assert_eq!(eval(&mut tcl, "incr s 4"), "4");
        assert_eq!(
            eval_err(&mut tcl, "incr nope"),
            "can't read \"nope\": no such variable"
        );
        // Bad arity is silently ignored.
        assert_eq!(eval(&mut tcl, "incr a b c"), "");
    }

    #[test]
    fn set_reads_raise_on_missing() {
        let mut tcl = interp();
        assert_eq!(
            eval_err(&mut tcl, "set nope"),
            "can't read \"nope\": no such variable"
        );
        eval(&mut tcl, "set a(k) v");
        assert_eq!(eval(&mut tcl, "set a(k)"), "v");
        assert_eq!(
            eval_err(&mut tcl, "set a(missing)"),
            "can't read \"a(missing)\": no such variable"
        );
    }

    #[test]
    fn append_concatenates_strings_and_lists() {
        let mut tcl = interp();
        eval(&mut tcl, "append out abc; append out de f");
        assert_eq!(eval(&mut tcl, "set out"), "abcdef");
        eval(&mut tcl, "set l [list a]");
        eval(&mut tcl, "append l b");
        assert_eq!(eval(&mut tcl, "llength $l"), "2");
        assert_eq!(
            eval_err(&mut tcl, "append justname"),
            "wrong # args: should be \"append varName ?value value ...?\""
        );
    }

    #[test]
    fn list_commands_roundtrip() {
        let mut tcl = interp();
        assert_eq!(eval(&mut tcl, "list a b c"), "a b c");
        assert_eq!(eval(&mut tcl, "llength {a b c}"), "3");
        assert_eq!(eval(&mut tcl, "lindex {a b c} 1"), "b");
        assert_eq!(eval(&mut tcl, "lindex {a b c} end"), "c");
        assert_eq!(eval(&mut tcl, "lindex {a b c} 7"), "");
        assert_eq!(eval(&mut tcl, "linsert {a c} 1 b"), "a b c");
        assert_eq!(eval(&mut tcl, "lrange {a b c d} 1 2"), "b c");
        assert_eq!(eval(&mut tcl, "lrange {a b c d} 2 end"), "c d");
        assert_eq!(eval(&mut tcl, "lrepeat 2 x y"), "x y x y");
        assert_eq!(eval(&mut tcl, "lreplace {a b c} 1 1 B"), "a B c");
        assert_eq!(eval(&mut tcl, "lsearch {a b c} b"), "1");
        assert_eq!(eval(&mut tcl, "lsearch {a b c} z"), "-1");
        assert_eq!(eval(&mut tcl, "join {a b c} -"), "a-b-c");
    }

    #[test]
    fn lreplace_out_of_range_reports_normalized_index() {
        let mut tcl = interp();
        assert_eq!(
            eval_err(&mut tcl, "lreplace {a b} 5 5 x"),
            "list doesn't contain element 5"
        );
        assert_eq!(
            eval_err(&mut tcl, "lreplace {a b} end-9 0 x"),
            "list doesn't contain element -8"
        );
    }

    #[test]
    fn lappend_creates_and_stores_back() {
        let mut tcl = interp();
        assert_eq!(eval(&mut tcl, "lappend fresh a b"), "a b");
        assert_eq!(eval(&mut tcl, "llength $fresh"), "2");
        eval(&mut tcl, "set s \"x y\"");
        assert_eq!(eval(&mut tcl, "lappend s z"), "x y z");
    }

    #[test]
    fn lset_traverses_nested_lists() {
        let mut tcl = interp();
        eval(&mut tcl, "set l {a {b c} d}");
        assert_eq!(eval(&mut tcl, "lset l 1 0 B"), "a {B c} d");
        assert_eq!(eval(&mut tcl, "set l"), "a {B c} d");
        assert_eq!(
            eval_err(&mut tcl, "lset l 9 x"),
            "list index out of range"
        );
    }

    #[test]
    fn lsort_orders_and_deduplicates() {
        let mut tcl = interp();
        assert_eq!(eval(&mut tcl, "lsort {3 1 2 1}"), "1 2 3");
        assert_eq!(eval(&mut tcl, "lsort {b a c}"), "a b c");
    }

    #[test]
    fn array_commands_over_the_array_tag() {
        let mut tcl = interp();
        eval(&mut tcl, "array set colors {red ff0000 green 00ff00}");
        assert_eq!(eval(&mut tcl, "array exists colors"), "1");
        assert_eq!(eval(&mut tcl, "array exists nope"), "0");
        assert_eq!(eval(&mut tcl, "array names colors"), "green red");
        assert_eq!(eval(&mut tcl, "array size colors"), "2");
        assert_eq!(
            eval(&mut tcl, "array get colors"),
            "{green 00ff00} {red ff0000}"
        );
        eval(&mut tcl, "array unset colors");
        assert_eq!(eval(&mut tcl, "array exists colors"), "0");
        assert_eq!(
            eval_err(&mut tcl, "array set odd {a b c}"),
            "list must have an even number of elements"
        );
        assert_eq!(
            eval_err(&mut tcl, "array wrong x"),
            "bad option \"wrong\": must be anymore, donesearch, exists, get, names, \
             nextelement, set, size, startsearch, statistics, or unset"
        );
    }

    #[test]
    fn string_subcommands() {
        let mut tcl = interp();
        assert_eq!(eval(&mut tcl, "string length hello"), "5");
        assert_eq!(eval(&mut tcl, "string bytelength hello"), "5");
        assert_eq!(eval(&mut tcl, "string index hello 1"), "e");
        assert_eq!(eval(&mut tcl, "string index hello 9"), "");
        assert_eq!(eval(&mut tcl, "string first ll hello"), "2");
        assert_eq!(eval(&mut tcl, "string first zz hello"), "-1");
        assert_eq!(eval(&mut tcl, "string last l hello"), "3");
        assert_eq!(eval(&mut tcl, "string range hello 1 3"), "ell");
        assert_eq!(eval(&mut tcl, "string range hello 1 end"), "ello");
        assert_eq!(eval(&mut tcl, "string repeat ab 3"), "ababab");
        assert_eq!(eval(&mut tcl, "string replace hello 1 3 u"), "huo");
        assert_eq!(eval(&mut tcl, "string tolower HeLLo"), "hello");
        assert_eq!(eval(&mut tcl, "string toupper HeLLo"), "HELLO");
        assert_eq!(eval(&mut tcl, "string totitle hELLO"), "Hello");
        assert_eq!(eval(&mut tcl, "string trim {  pad  }"), "pad");
        assert_eq!(eval(&mut tcl, "string trimleft xxabxx x"), "abxx");
        assert_eq!(eval(&mut tcl, "string trimright xxabxx x"), "xxab");
    }

    #[test]
    fn string_compare_and_equal() {
        let mut tcl = interp();
        assert_eq!(eval(&mut tcl, "string compare apple banana"), "-1");
        assert_eq!(eval(&mut tcl, "string compare same same"), "0");
        assert_eq!(eval(&mut tcl, "string compare b a"), "1");
        assert_eq!(eval(&mut tcl, "string equal same same"), "1");
        assert_eq!(eval(&mut tcl, "string equal a b"), "0");
        assert_eq!(eval(&mut tcl, "string equal -nocase ABC abc"), "1");
        assert_eq!(eval(&mut tcl, "string compare -length 2 abXX abYY"), "0");
    }

    #[test]
    fn string_match_globs() {
        let mut tcl = interp();
        assert_eq!(eval(&mut tcl, "string match h*o hello"), "1");
        assert_eq!(eval(&mut tcl, "string match h?llo hello"), "1");
        assert_eq!(eval(&mut tcl, "string match world hello"), "0");
        assert_eq!(eval(&mut tcl, "string match -nocase HEL* hello"), "1");
    }

    #[test]
    fn string_map_leftmost_first() {
        let mut tcl = interp();
        assert_eq!(eval(&mut tcl, "string map {ab X a Y} aabb"), "YXb");
        assert_eq!(eval(&mut tcl, "string map {l L} hello"), "heLLo");
        assert_eq!(eval(&mut tcl, "string map -nocase {l L} heLlo"), "heLLo");
        assert_eq!(
            eval_err(&mut tcl, "string map {a} text"),
            "char map list unbalanced"
        );
    }

    #[test]
    fn string_usage_quirks() {
        let mut tcl = interp();
        // Doubled wrapper on bytelength, copy-pasted name on toupper.
        assert_eq!(
            eval_err(&mut tcl, "string bytelength"),
            "wrong # args: should be \"wrong # args: should be \"string bytelength string\"\""
        );
        assert_eq!(
            eval_err(&mut tcl, "string toupper"),
            "wrong # args: should be \"string tolower string ?first? ?last?\""
        );
        assert_eq!(
            eval_err(&mut tcl, "string wrong x"),
            "bad option \"wrong\": must be bytelength, compare, equal, first, index, is, \
             last, length, map, match, range, repeat, replace, tolower, toupper, totitle, \
             trim, trimleft, trimright, wordend, or wordstart"
        );
    }

    #[test]
    fn if_elseif_else_chains() {
        let mut tcl = interp();
        eval(&mut tcl, "if {1 > 0} { set r yes } else { set r no }");
        assert_eq!(eval(&mut tcl, "set r"), "yes");
        eval(
            &mut tcl,
            "if {0} { set r a } elseif {1} { set r b } else { set r c }",
        );
        assert_eq!(eval(&mut tcl, "set r"), "b");
        eval(&mut tcl, "if 0 then { set r then } else { set r other }");
        assert_eq!(eval(&mut tcl, "set r"), "other");
        assert_eq!(
            eval_err(&mut tcl, "if"),
            "wrong # args: no expression after \"if\" argument"
        );
        assert_eq!(
            eval_err(&mut tcl, "if {1} { set r x } garbage { set r y }"),
            "invalid command name \"garbage\""
        );
    }

    #[test]
    fn while_and_for_loop() {
        let mut tcl = interp();
        eval(&mut tcl, "set i 0; set sum 0");
        eval(
            &mut tcl,
            "while {$i < 5} { set sum [expr $sum + $i]; incr i }",
        );
        assert_eq!(eval(&mut tcl, "set sum"), "10");
        eval(
            &mut tcl,
            "set out {}; for {set j 0} {$j < 3} {incr j} { lappend out $j }",
        );
        assert_eq!(eval(&mut tcl, "set out"), "0 1 2");
    }

    #[test]
    fn break_and_continue_inside_loops() {
        let mut tcl = interp();
        eval(
            &mut tcl,
            "set out {}; foreach x {1 2 3 4 5} { if {$x == 3} { break }; lappend out $x }",
        );
        assert_eq!(eval(&mut tcl, "set out"), "1 2");
        eval(
            &mut tcl,
            "set out {}; foreach x {1 2 3 4} { if {$x == 2} { continue }; lappend out $x }",
        );
        assert_eq!(eval(&mut tcl, "set out"), "1 3 4");
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let mut tcl = interp();
        assert_eq!(
            eval_err(&mut tcl, "break"),
            "invoked \"break\" outside of a loop"
        );
        assert_eq!(
            eval_err(&mut tcl, "continue"),
            "invoked \"continue\" outside of a loop"
        );
    }

    #[test]
    fn foreach_pairs_vars() {
        let mut tcl = interp();
        eval(
            &mut tcl,
            "set out {}; foreach {x y} {1 2 3 4} { lappend out \"$x-$y\" }",
        );
        assert_eq!(eval(&mut tcl, "set out"), "1-2 3-4");
        // An incomplete trailing group is dropped.
        eval(
            &mut tcl,
            "set out {}; foreach {x y} {1 2 3} { lappend out \"$x-$y\" }",
        );
        assert_eq!(eval(&mut tcl, "set out"), "1-2");
        assert_eq!(
            eval_err(&mut tcl, "foreach {} {1 2} {}"),
            "foreach varlist is empty"
        );
    }

    #[test]
    fn catch_returns_inverted_flag() {
        let mut tcl = interp();
        assert_eq!(eval(&mut tcl, "catch {set ok 1} msg"), "1");
        assert_eq!(eval(&mut tcl, "catch {nosuchcmd} msg"), "0");
        let msg = eval(&mut tcl, "set msg");
        assert!(msg.contains("invalid command name"));
    }

    #[test]
    fn switch_matches_exact_glob_regexp_default() {
        let mut tcl = interp();
        eval(&mut tcl, "switch b {a {set r A} b {set r B} default {set r D}}");
        assert_eq!(eval(&mut tcl, "set r"), "B");
        eval(&mut tcl, "switch zz {a {set r A} default {set r D}}");
        assert_eq!(eval(&mut tcl, "set r"), "D");
        eval(&mut tcl, "switch -glob hello {h*o {set r G} default {set r D}}");
        assert_eq!(eval(&mut tcl, "set r"), "G");
        eval(
            &mut tcl,
            "switch -regexp abc123 {{[0-9]+} {set r R} default {set r D}}",
        );
        assert_eq!(eval(&mut tcl, "set r"), "R");
        assert_eq!(
            eval_err(&mut tcl, "switch x {a {set r A} b}"),
            "extra switch pattern with no body"
        );
    }

    #[test]
    fn eval_joins_and_runs() {
        let mut tcl = interp();
        assert_eq!(eval(&mut tcl, "eval set joined 5"), "5");
        assert_eq!(eval(&mut tcl, "set joined"), "5");
    }

    #[test]
    fn expr_formats_near_integers() {
        let mut tcl = interp();
        assert_eq!(eval(&mut tcl, "expr 2 + 3"), "5");
        assert_eq!(eval(&mut tcl, "expr 7 / 2.0"), "3.5");
        assert_eq!(eval(&mut tcl, "expr (1 + 2) * 3"), "9");
    }

    #[test]
    fn format_renders_directives() {
        let mut tcl = interp();
        assert_eq!(eval(&mut tcl, "format %d-%s 42 x"), "42-x");
        assert_eq!(eval(&mut tcl, "format %05d 7"), "00007");
        assert_eq!(eval(&mut tcl, "format %.2f 3.14159"), "3.14");
    }

    #[test]
    fn info_family() {
        let mut tcl = interp();
        eval(&mut tcl, "proc greet {name} { return hi-$name }");
        assert_eq!(eval(&mut tcl, "info args greet"), "name");
        assert_eq!(eval(&mut tcl, "info body greet"), " return hi-$name ");
        assert_eq!(
            eval_err(&mut tcl, "info args nosuch"),
            "\"nosuch\" is not a procedure"
        );
        assert_eq!(eval(&mut tcl, "info exists greetvar"), "0");
        eval(&mut tcl, "set greetvar 1");
        assert_eq!(eval(&mut tcl, "info exists greetvar"), "1");
        assert_eq!(eval(&mut tcl, "info complete {set x 1}"), "1");
        assert_eq!(eval(&mut tcl, "info complete \"set x \\{\""), "0");
        assert_eq!(eval(&mut tcl, "info level"), "0");
        let commands = eval(&mut tcl, "info commands");
        assert!(commands.contains("set"));
        assert!(commands.contains("while"));
        let procs = eval(&mut tcl, "info procs");
        assert!(procs.contains("greet"));
        // Unknown subcommands fall through silently.
        assert_eq!(eval(&mut tcl, "info nonsense"), "");
    }

    #[test]
    fn namespace_eval_runs_each_script() {
        let mut tcl = interp();
        eval(&mut tcl, "namespace eval ns {variable a 1} {variable b 2}");
        assert_eq!(eval(&mut tcl, "set ns::a"), "1");
        assert_eq!(eval(&mut tcl, "set ns::b"), "2");
        assert_eq!(
            eval_err(&mut tcl, "namespace wrong"),
            "bad option \"wrong\": must be children, code, current, delete, eval, exists, \
             export, forget, import, inscope, origin, parent, qualifiers, tail, or which"
        );
    }

    #[test]
    fn global_shares_binding_and_rejects_locals() {
        let mut tcl = interp();
        eval(&mut tcl, "set shared before");
        eval(&mut tcl, "proc touch {} { global shared; set shared after }");
        eval(&mut tcl, "touch");
        assert_eq!(eval(&mut tcl, "set shared"), "after");
        assert_eq!(
            eval_err(&mut tcl, "proc bad {} { set x 1; global x }; bad"),
            "variable \"x\" already exists"
        );
    }

    #[test]
    fn variable_declares_and_pairs() {
        let mut tcl = interp();
        eval(&mut tcl, "variable pairs one 1 two 2 dropped");
        assert_eq!(eval(&mut tcl, "set one"), "1");
        assert_eq!(eval(&mut tcl, "set two"), "2");
        // The trailing odd name was ignored.
        assert_eq!(eval(&mut tcl, "info exists dropped"), "0");
    }

    #[test]
    fn unset_removes_local_bindings() {
        let mut tcl = interp();
        eval(&mut tcl, "set gone 1");
        eval(&mut tcl, "unset gone");
        assert_eq!(eval(&mut tcl, "info exists gone"), "0");
        // Unknown names are not an error.
        eval(&mut tcl, "unset neverwas");
    }

    #[test]
    fn proc_bad_arity_is_silent() {
        let mut tcl = interp();
        assert_eq!(eval(&mut tcl, "proc half {} "), "");
        assert_eq!(eval(&mut tcl, "info procs"), "");
    }

    #[test]
    fn return_ignores_extra_arguments() {
        let mut tcl = interp();
        eval(&mut tcl, "proc first {} { return a b c }");
        assert_eq!(eval(&mut tcl, "first"), "a");
    }

    #[test]
    fn after_registers_and_inspects_timers() {
        let mut tcl = interp();
        let name = eval(&mut tcl, "after 10000 set fired 1");
        assert_eq!(name, "after#0");
        assert_eq!(eval(&mut tcl, "after info"), "after#0");
        assert_eq!(eval(&mut tcl, "after info after#0"), "{after#0 {set fired 1}}");
        eval(&mut tcl, "after cancel after#0");
        assert_eq!(eval(&mut tcl, "after info"), "");
        assert_eq!(
            eval_err(&mut tcl, "after info after#9"),
            "event \"after#9\" doesn't exist"
        );
        assert_eq!(
            eval_err(&mut tcl, "after nonsense"),
            "bad argument \"nonsense\": must be cancel, idle, info, or a number"
        );
    }

    #[test]
    fn update_drains_due_timers() {
        let mut tcl = interp();
        eval(&mut tcl, "after 0 set fired 1");
        eval(&mut tcl, "update");
        assert_eq!(eval(&mut tcl, "set fired"), "1");
        assert_eq!(
            eval_err(&mut tcl, "update nonsense"),
            "bad option \"nonsense\": must be idletasks"
        );
    }

    #[test]
    fn clock_options() {
        let mut tcl = interp();
        let seconds = eval(&mut tcl, "clock seconds");
        assert!(seconds.parse::<i64>().unwrap() > 0);
        let clicks = eval(&mut tcl, "clock clicks");
        assert!(clicks.len() > seconds.len());
        assert_eq!(eval(&mut tcl, "clock format"), "");
        assert_eq!(
            eval_err(&mut tcl, "clock wrong"),
            "bad option \"wrong\": must be clicks, format, scan, or seconds"
        );
    }

    #[test]
    fn package_usage_is_doubled() {
        let mut tcl = interp();
        assert_eq!(
            eval_err(&mut tcl, "package"),
            "wrong # args: should be \"should be \"package option ?arg ...?\"\""
        );
        assert_eq!(eval(&mut tcl, "package require missing"), "");
    }

    #[test]
    fn exit_carries_the_status_code() {
        let mut tcl = interp();
        assert_eq!(tcl.parse_string("exit 3"), Err(TclError::Exit(3)));
        assert_eq!(tcl.parse_string("exit"), Err(TclError::Exit(0)));
        // Not interceptable by catch.
        assert_eq!(tcl.parse_string("catch {exit 7}"), Err(TclError::Exit(7)));
    }

    #[test]
    fn history_lists_entries() {
        let mut tcl = interp();
        tcl.parse_line("set a 1").unwrap();
        tcl.parse_line("set b 2").unwrap();
        assert_eq!(
            eval_err(&mut tcl, "history wrong"),
            "bad option \"wrong\": must be add, change, clear, event, info, keep, nextid, or redo"
        );
        assert_eq!(eval(&mut tcl, "history keep 50"), "");
    }
}
