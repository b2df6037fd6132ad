//! An embeddable command language interpreter.
//!
//! Scripts are white-space separated words grouped by `{…}`, `"…"`, and
//! `'…'`, with `[…]` command substitution and `$name` variable
//! substitution.  Values share one string-flavored model
//! ([`Value`]) and flow through a builtin command set plus
//! script-defined procedures.
//!
//! ```
//! use tcl::{Interp, Value};
//!
//! let mut tcl = Interp::new();
//! let result = tcl.parse_string("set a [expr 2 + 3]").unwrap();
//! assert_eq!(result, Some(Value::from("5")));
//! ```
//!
//! Embedders can swap out the output sinks, the OS surface
//! ([`os::OsAccess`]), the pipeline runner ([`os::ProcessRunner`]) and
//! the arithmetic engine ([`expr::ExprEval`]) for captured or mocked
//! implementations.

pub mod cli;
mod commands;
pub mod error;
pub mod expr;
pub mod history;
pub mod interp;
pub mod os;
pub mod parse;
pub mod pattern;
mod printf;
mod scope;
pub mod value;

pub use error::{TclError, TclResult};
pub use interp::Interp;
pub use value::Value;
