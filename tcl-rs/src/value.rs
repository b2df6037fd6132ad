//! Runtime value type for the interpreter.
//!
//! Every value the language touches has one of four shapes: the empty
//! value, a string, a list, or an associative array.  Numbers are not a
//! distinct shape; they live as strings and are parsed on demand.
//! `Clone` is a deep copy, and stores always clone, so two stored
//! values never alias.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{TclError, TclResult};

/// A runtime value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Value {
    /// The empty result (distinct from the empty string).
    #[default]
    None,
    Str(String),
    List(Vec<Value>),
    /// Keys iterate in ascending order.
    Array(BTreeMap<String, Value>),
}

/// Whether a rendered list element needs `{}` wrapping.
pub(crate) fn needs_braces(s: &str) -> bool {
    s.is_empty() || s.chars().any(crate::parse::is_space)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => Ok(()),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    let s = item.to_string();
                    if needs_braces(&s) {
                        write!(f, "{{{s}}}")?;
                    } else {
                        f.write_str(&s)?;
                    }
                }
                Ok(())
            }
            Value::Array(map) => {
                f.write_str("{")?;
                for (k, v) in map {
                    write!(f, " {k}={v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Value {
    fn tag_rank(&self) -> u8 {
        match self {
            Value::None => 0,
            Value::Str(_) => 1,
            Value::Array(_) => 2,
            Value::List(_) => 3,
        }
    }

    /// Truthiness: strings parse as integers, reals, or the usual
    /// boolean tokens (anything else is silently false); lists and
    /// arrays are true when non-empty.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::None => false,
            Value::Str(s) => parse_bool(s),
            Value::List(items) => !items.is_empty(),
            Value::Array(map) => !map.is_empty(),
        }
    }

    /// Integer coercion.  Only strings coerce.
    pub fn to_int(&self) -> TclResult<i64> {
        if let Value::Str(s) = self {
            if let Ok(n) = s.trim().parse::<i64>() {
                return Ok(n);
            }
        }
        Err(TclError::bad_integer(&self.to_string()))
    }

    /// Real coercion.  Only strings coerce.
    pub fn to_real(&self) -> TclResult<f64> {
        if let Value::Str(s) = self {
            if let Ok(x) = s.trim().parse::<f64>() {
                return Ok(x);
            }
        }
        Err(TclError::bad_real(&self.to_string()))
    }

    /// List-index coercion: an integer, `end` (-1), or `end-N` (-N-1).
    /// Negative results index from the end; resolution against a
    /// concrete length is the caller's business.
    pub fn to_index(&self) -> TclResult<i64> {
        let text = self.to_string();
        let t = text.trim();
        if let Ok(n) = t.parse::<i64>() {
            return Ok(n);
        }
        if t == "end" {
            return Ok(-1);
        }
        if let Some(rest) = t.strip_prefix("end-") {
            if !rest.is_empty() {
                // An unparsable offset degrades to index 0 rather than
                // raising; only a bare "end-" is rejected.
                return Ok(match rest.parse::<i64>() {
                    Ok(n) => -n - 1,
                    Err(_) => 0,
                });
            }
        }
        Err(TclError::bad_index(&text))
    }

    /// View as list elements: lists pass through, everything else is
    /// parsed from its string rendering.
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Value::List(items) => items,
            Value::None => Vec::new(),
            other => crate::parse::string_to_list(&other.to_string()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }
}

fn parse_bool(s: &str) -> bool {
    let t = s.trim();
    if let Ok(n) = t.parse::<i64>() {
        return n != 0;
    }
    if let Ok(x) = t.parse::<f64>() {
        return x != 0.0;
    }
    matches!(
        t.to_ascii_lowercase().as_str(),
        "true" | "yes" | "on"
    )
}

// Total order: tag rank first, then per-tag comparison.  Lists compare
// element-wise and then by length; arrays compare key/value pairs in
// key order and then by entry count.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::None, Value::None) => Ordering::Equal,
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Array(a), Value::Array(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let ord = ka.cmp(kb).then_with(|| va.cmp(vb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.tag_rank().cmp(&other.tag_rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Str(n.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Str(if b { "1" } else { "0" }.to_owned())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
