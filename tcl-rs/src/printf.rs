//! `%`-directive formatting for the `format` command.
//!
//! Supports the printf conversions `d i u c s f e E g G x X o %` with
//! the `-`, `+`, space, `0`, and `#` flags, numeric width and
//! precision, and `*` to take either from the argument list.

use crate::error::{TclError, TclResult};
use crate::value::Value;

/// Format `fmt`, consuming `args` left to right.  A conversion with no
/// argument left, or whose argument does not parse, formats the zero
/// value of its type rather than raising.
pub fn format_values(fmt: &str, args: &[Value]) -> TclResult<String> {
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    let mut next_arg = 0usize;

    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }

        // Flags
        let mut minus = false;
        let mut plus = false;
        let mut space = false;
        let mut zero = false;
        let mut alt = false;
        loop {
            match chars.peek() {
                Some('-') => minus = true,
                Some('+') => plus = true,
                Some(' ') => space = true,
                Some('0') => zero = true,
                Some('#') => alt = true,
                _ => break,
            }
            chars.next();
        }

        // Width
        let mut width: Option<usize> = None;
        if chars.peek() == Some(&'*') {
            chars.next();
            let n = int_arg(args, &mut next_arg);
            if n < 0 {
                minus = true;
                width = Some(n.unsigned_abs() as usize);
            } else {
                width = Some(n as usize);
            }
        } else {
            let mut digits = String::new();
            while matches!(chars.peek(), Some(c) if c.is_ascii_digit()) {
                digits.push(chars.next().unwrap_or('0'));
            }
            if !digits.is_empty() {
                width = digits.parse().ok();
            }
        }

        // Precision
        let mut precision: Option<usize> = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            if chars.peek() == Some(&'*') {
                chars.next();
                let n = int_arg(args, &mut next_arg);
                precision = Some(n.max(0) as usize);
            } else {
                let mut digits = String::new();
                while matches!(chars.peek(), Some(c) if c.is_ascii_digit()) {
                    digits.push(chars.next().unwrap_or('0'));
                }
                precision = Some(digits.parse().unwrap_or(0));
            }
        }

        let conv = chars.next().ok_or_else(|| {
            TclError::Runtime("format string ended in middle of field specifier".to_owned())
        })?;

        let piece = match conv {
            '%' => {
                out.push('%');
                continue;
            }
            'd' | 'i' => {
                let n = int_arg(args, &mut next_arg);
                with_sign(n.to_string(), n >= 0, plus, space)
            }
            'u' => {
                let n = int_arg(args, &mut next_arg);
                (n as u64).to_string()
            }
            'x' => {
                let n = int_arg(args, &mut next_arg);
                let body = format!("{n:x}");
                if alt && n != 0 {
                    format!("0x{body}")
                } else {
                    body
                }
            }
            'X' => {
                let n = int_arg(args, &mut next_arg);
                let body = format!("{n:X}");
                if alt && n != 0 {
                    format!("0X{body}")
                } else {
                    body
                }
            }
            'o' => {
                let n = int_arg(args, &mut next_arg);
                let body = format!("{n:o}");
                if alt && n != 0 {
                    format!("0{body}")
                } else {
                    body
                }
            }
            'c' => {
                let n = int_arg(args, &mut next_arg);
                char::from_u32(n as u32).unwrap_or('\u{fffd}').to_string()
            }
            's' => {
                let s = str_arg(args, &mut next_arg);
                match precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s,
                }
            }
            'f' => {
                let x = real_arg(args, &mut next_arg);
                with_sign(
                    format!("{:.*}", precision.unwrap_or(6), x),
                    x >= 0.0,
                    plus,
                    space,
                )
            }
            'e' | 'E' => {
                let x = real_arg(args, &mut next_arg);
                with_sign(
                    format_exp(x, precision.unwrap_or(6), conv == 'E'),
                    x >= 0.0,
                    plus,
                    space,
                )
            }
            'g' | 'G' => {
                let x = real_arg(args, &mut next_arg);
                with_sign(
                    format_general(x, precision.unwrap_or(6), conv == 'G'),
                    x >= 0.0,
                    plus,
                    space,
                )
            }
            c => {
                return Err(TclError::Runtime(format!("bad field specifier \"{c}\"")));
            }
        };

        out.push_str(&pad(piece, width, minus, zero, conv != 's'));
    }

    Ok(out)
}

fn next_arg<'a>(args: &'a [Value], next: &mut usize) -> Option<&'a Value> {
    let arg = args.get(*next)?;
    *next += 1;
    Some(arg)
}

fn int_arg(args: &[Value], next: &mut usize) -> i64 {
    next_arg(args, next)
        .and_then(|v| v.to_int().ok())
        .unwrap_or(0)
}

fn real_arg(args: &[Value], next: &mut usize) -> f64 {
    next_arg(args, next)
        .and_then(|v| v.to_real().ok())
        .unwrap_or(0.0)
}

fn str_arg(args: &[Value], next: &mut usize) -> String {
    next_arg(args, next)
        .map(|v| v.to_string())
        .unwrap_or_default()
}

fn with_sign(body: String, non_negative: bool, plus: bool, space: bool) -> String {
    if non_negative && plus {
        format!("+{body}")
    } else if non_negative && space {
        format!(" {body}")
    } else {
        body
    }
}

fn pad(s: String, width: Option<usize>, minus: bool, zero: bool, numeric: bool) -> String {
    let Some(w) = width else { return s };
    let len = s.chars().count();
    if len >= w {
        return s;
    }
    let fill = w - len;
    if minus {
        let mut s = s;
        s.push_str(&" ".repeat(fill));
        s
    } else if zero && numeric {
        // Zero padding goes after any sign.
        if let Some(rest) = s.strip_prefix('-') {
            format!("-{}{rest}", "0".repeat(fill))
        } else if let Some(rest) = s.strip_prefix('+') {
            format!("+{}{rest}", "0".repeat(fill))
        } else {
            format!("{}{s}", "0".repeat(fill))
        }
    } else {
        format!("{}{s}", " ".repeat(fill))
    }
}

/// `%e`: mantissa with `prec` decimals, exponent at least two digits.
fn format_exp(x: f64, prec: usize, upper: bool) -> String {
    let s = format!("{x:.prec$e}");
    let Some(idx) = s.find('e') else { return s };
    let mant = &s[..idx];
    let exp = &s[idx + 1..];
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(d) => ("-", d),
        None => ("+", exp),
    };
    let e = if upper { 'E' } else { 'e' };
    format!("{mant}{e}{sign}{digits:0>2}")
}

/// `%g`: `prec` significant digits, trailing zeros stripped, switching
/// to exponent form for very large or very small magnitudes.
fn format_general(x: f64, prec: usize, upper: bool) -> String {
    let p = prec.max(1);
    let exp = if x == 0.0 {
        0
    } else {
        x.abs().log10().floor() as i32
    };
    if exp < -4 || exp >= p as i32 {
        let s = format_exp(x, p - 1, upper);
        let e = if upper { 'E' } else { 'e' };
        match s.find(e) {
            Some(idx) => {
                let mant = strip_zeros(&s[..idx]);
                format!("{mant}{}", &s[idx..])
            }
            None => s,
        }
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        strip_zeros(&format!("{x:.decimals$}")).to_owned()
    }
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(f: &str, args: &[&str]) -> String {
        let vals: Vec<Value> = args.iter().map(|&s| Value::from(s)).collect();
        format_values(f, &vals).unwrap()
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(fmt("hello", &[]), "hello");
        assert_eq!(fmt("100%%", &[]), "100%");
    }

    #[test]
    fn integer_conversions() {
        assert_eq!(fmt("%d", &["42"]), "42");
        assert_eq!(fmt("%d", &["-7"]), "-7");
        assert_eq!(fmt("%5d", &["42"]), "   42");
        assert_eq!(fmt("%-5d|", &["42"]), "42   |");
        assert_eq!(fmt("%05d", &["-42"]), "-0042");
        assert_eq!(fmt("%+d", &["42"]), "+42");
    }

    #[test]
    fn hex_octal() {
        assert_eq!(fmt("%x", &["255"]), "ff");
        assert_eq!(fmt("%X", &["255"]), "FF");
        assert_eq!(fmt("%#x", &["255"]), "0xff");
        assert_eq!(fmt("%o", &["8"]), "10");
    }

    #[test]
    fn string_conversion() {
        assert_eq!(fmt("[%8s]", &["hi"]), "[      hi]");
        assert_eq!(fmt("[%-8s]", &["hi"]), "[hi      ]");
        assert_eq!(fmt("%.3s", &["hello"]), "hel");
    }

    #[test]
    fn char_conversion() {
        assert_eq!(fmt("%c", &["65"]), "A");
    }

    #[test]
    fn float_conversions() {
        assert_eq!(fmt("%f", &["2.5"]), "2.500000");
        assert_eq!(fmt("%.2f", &["3.14159"]), "3.14");
        assert_eq!(fmt("%e", &["250"]), "2.500000e+02");
        assert_eq!(fmt("%g", &["0.0001"]), "0.0001");
        assert_eq!(fmt("%g", &["100000000"]), "1e+08");
    }

    #[test]
    fn star_width() {
        assert_eq!(fmt("%*d", &["6", "42"]), "    42");
        assert_eq!(fmt("%.*f", &["1", "2.55"]), "2.5");
    }

    #[test]
    fn exhausted_or_unparsable_arguments_format_zero_values() {
        assert_eq!(fmt("%d %d", &["1"]), "1 0");
        assert_eq!(fmt("<%s>", &[]), "<>");
        assert_eq!(fmt("%f", &[]), "0.000000");
        assert_eq!(fmt("%d", &["abc"]), "0");
    }

    #[test]
    fn bad_specifier_errors() {
        assert!(format_values("%q", &[Value::from("1")]).is_err());
        assert!(format_values("%", &[]).is_err());
    }
}
