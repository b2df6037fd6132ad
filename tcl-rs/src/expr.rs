//! Numeric expression lexer, AST, parser, and evaluator.
//!
//! Backs the `expr` command and every condition context (`if`, `while`,
//! `for`).  The input has already had `$` substitution applied; this
//! module sees plain arithmetic text.
//!
//! Operator precedence (lowest → highest):
//!   ternary  →  or  →  and  →  bitor  →  bitxor  →  bitand  →
//!   equality  →  relational  →  shift  →  additive  →
//!   multiplicative  →  unary  →  primary
//!
//! All arithmetic runs in `f64`; bitwise and shift operators truncate
//! through `i64`.  Callers format results with [`format_number`], which
//! collapses near-integers to integer text.

/// Dependency-injection seam for expression evaluation.
///
/// The interpreter calls this on dollar-expanded text; embedders can
/// swap in their own evaluator.
pub trait ExprEval {
    fn evaluate(&self, text: &str) -> Result<f64, String>;
}

/// The built-in evaluator.
#[derive(Debug, Default)]
pub struct DefaultEval;

impl ExprEval for DefaultEval {
    fn evaluate(&self, text: &str) -> Result<f64, String> {
        let tokens = Lexer::new(text).tokenize();
        let mut parser = Parser::new(tokens);
        let ast = parser.parse_expr()?;
        parser.expect_eof()?;
        eval(&ast)
    }
}

/// Render an expression result: values within 1e-6 of an integer print
/// as that integer, everything else prints as a real.
pub fn format_number(r: f64) -> String {
    let ires = (r.abs() + 1e-6) as i64;
    if (r.abs() - ires as f64).abs() > 1e-6 {
        r.to_string()
    } else if r < 0.0 {
        (-ires).to_string()
    } else {
        ires.to_string()
    }
}

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Tilde,
    Ampersand,
    Pipe,
    Caret,
    ShiftLeft,
    ShiftRight,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Question,
    Colon,
    LParen,
    RParen,
    Unknown(char),
    Eof,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.src.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn eat(&mut self, ch: u8) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn read_number(&mut self, first: u8) -> Token {
        let mut s = String::new();
        s.push(first as char);

        // Hex literal
        if first == b'0' && matches!(self.peek(), Some(b'x' | b'X')) {
            self.advance();
            let mut hex = String::new();
            while matches!(self.peek(), Some(b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F')) {
                hex.push(self.advance().unwrap_or(b'0') as char);
            }
            return Token::Num(i64::from_str_radix(&hex, 16).unwrap_or(0) as f64);
        }

        while matches!(self.peek(), Some(b'0'..=b'9')) {
            s.push(self.advance().unwrap_or(b'0') as char);
        }
        if self.peek() == Some(b'.') && matches!(self.peek2(), Some(b'0'..=b'9')) {
            s.push(self.advance().unwrap_or(b'.') as char);
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                s.push(self.advance().unwrap_or(b'0') as char);
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let save = self.pos;
            let mut exp = String::new();
            exp.push(self.advance().unwrap_or(b'e') as char);
            if matches!(self.peek(), Some(b'+' | b'-')) {
                exp.push(self.advance().unwrap_or(b'+') as char);
            }
            if matches!(self.peek(), Some(b'0'..=b'9')) {
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    exp.push(self.advance().unwrap_or(b'0') as char);
                }
                s.push_str(&exp);
            } else {
                self.pos = save;
            }
        }

        Token::Num(s.parse().unwrap_or(0.0))
    }

    fn next_token(&mut self) -> Token {
        self.skip_ws();
        let ch = match self.advance() {
            None => return Token::Eof,
            Some(c) => c,
        };

        match ch {
            b'0'..=b'9' => self.read_number(ch),
            b'.' if matches!(self.peek(), Some(b'0'..=b'9')) => self.read_number(b'.'),
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'%' => Token::Percent,
            b'~' => Token::Tilde,
            b'^' => Token::Caret,
            b'!' => {
                if self.eat(b'=') {
                    Token::Ne
                } else {
                    Token::Bang
                }
            }
            b'&' => {
                if self.eat(b'&') {
                    Token::And
                } else {
                    Token::Ampersand
                }
            }
            b'|' => {
                if self.eat(b'|') {
                    Token::Or
                } else {
                    Token::Pipe
                }
            }
            b'<' => {
                if self.eat(b'<') {
                    Token::ShiftLeft
                } else if self.eat(b'=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            b'>' => {
                if self.eat(b'>') {
                    Token::ShiftRight
                } else if self.eat(b'=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            b'=' => {
                if self.eat(b'=') {
                    Token::Eq
                } else {
                    Token::Unknown('=')
                }
            }
            b'?' => Token::Question,
            b':' => Token::Colon,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            c => Token::Unknown(c as char),
        }
    }

    fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let t = self.next_token();
            let done = matches!(t, Token::Eof);
            tokens.push(t);
            if done {
                break;
            }
        }
        tokens
    }
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy)]
enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone)]
enum Expr {
    Num(f64),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

// ── Parser ────────────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_eof(&self) -> Result<(), String> {
        match self.peek() {
            Token::Eof => Ok(()),
            t => Err(format!("unexpected token {t:?}")),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, String> {
        let cond = self.parse_or()?;
        if self.eat(&Token::Question) {
            let then = self.parse_ternary()?;
            if !self.eat(&Token::Colon) {
                return Err("expected ':' in conditional".to_owned());
            }
            let alt = self.parse_ternary()?;
            return Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(alt)));
        }
        Ok(cond)
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_bitor()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_bitor()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_bitxor()?;
        while self.eat(&Token::Pipe) {
            let rhs = self.parse_bitxor()?;
            lhs = Expr::Binary(BinOp::BitOr, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_bitand()?;
        while self.eat(&Token::Caret) {
            let rhs = self.parse_bitand()?;
            lhs = Expr::Binary(BinOp::BitXor, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&Token::Ampersand) {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinOp::BitAnd, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::ShiftLeft => BinOp::Shl,
                Token::ShiftRight => BinOp::Shr,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        let op = match self.peek() {
            Token::Minus => Some(UnaryOp::Neg),
            Token::Plus => None,
            Token::Bang => Some(UnaryOp::Not),
            Token::Tilde => Some(UnaryOp::BitNot),
            _ => return self.parse_primary(),
        };
        self.advance();
        let inner = self.parse_unary()?;
        Ok(match op {
            Some(op) => Expr::Unary(op, Box::new(inner)),
            None => inner,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Token::Num(n) => Ok(Expr::Num(n)),
            Token::LParen => {
                let inner = self.parse_expr()?;
                if !self.eat(&Token::RParen) {
                    return Err("expected ')'".to_owned());
                }
                Ok(inner)
            }
            t => Err(format!("unexpected token {t:?}")),
        }
    }
}

// ── Evaluation ────────────────────────────────────────────────────────────────

fn eval(expr: &Expr) -> Result<f64, String> {
    Ok(match expr {
        Expr::Num(n) => *n,
        Expr::Unary(op, inner) => {
            let v = eval(inner)?;
            match op {
                UnaryOp::Neg => -v,
                UnaryOp::Not => {
                    if v == 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                }
                UnaryOp::BitNot => !(v as i64) as f64,
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            // Logical operators short-circuit.
            match op {
                BinOp::And => {
                    let a = eval(lhs)?;
                    if a == 0.0 {
                        return Ok(0.0);
                    }
                    return Ok(if eval(rhs)? != 0.0 { 1.0 } else { 0.0 });
                }
                BinOp::Or => {
                    let a = eval(lhs)?;
                    if a != 0.0 {
                        return Ok(1.0);
                    }
                    return Ok(if eval(rhs)? != 0.0 { 1.0 } else { 0.0 });
                }
                _ => {}
            }
            let a = eval(lhs)?;
            let b = eval(rhs)?;
            match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => {
                    if b == 0.0 {
                        return Err("division by zero".to_owned());
                    }
                    a / b
                }
                BinOp::Rem => {
                    if b as i64 == 0 {
                        return Err("modulo by zero".to_owned());
                    }
                    ((a as i64) % (b as i64)) as f64
                }
                BinOp::Eq => bool_num(a == b),
                BinOp::Ne => bool_num(a != b),
                BinOp::Lt => bool_num(a < b),
                BinOp::Le => bool_num(a <= b),
                BinOp::Gt => bool_num(a > b),
                BinOp::Ge => bool_num(a >= b),
                BinOp::BitAnd => ((a as i64) & (b as i64)) as f64,
                BinOp::BitOr => ((a as i64) | (b as i64)) as f64,
                BinOp::BitXor => ((a as i64) ^ (b as i64)) as f64,
                BinOp::Shl => ((a as i64) << (b as i64 & 63)) as f64,
                BinOp::Shr => ((a as i64) >> (b as i64 & 63)) as f64,
                BinOp::And | BinOp::Or => unreachable!(),
            }
        }
        Expr::Ternary(cond, then, alt) => {
            if eval(cond)? != 0.0 {
                eval(then)?
            } else {
                eval(alt)?
            }
        }
    })
}

fn bool_num(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(text: &str) -> f64 {
        DefaultEval.evaluate(text).unwrap()
    }

    #[test]
    fn precedence() {
        assert_eq!(ev("2 + 3 * 4"), 14.0);
        assert_eq!(ev("(2 + 3) * 4"), 20.0);
        assert_eq!(ev("2 - 3 - 4"), -5.0);
    }

    #[test]
    fn division_is_real() {
        assert_eq!(ev("5 / 2"), 2.5);
    }

    #[test]
    fn division_by_zero() {
        assert!(DefaultEval.evaluate("1 / 0").is_err());
        assert!(DefaultEval.evaluate("1 % 0").is_err());
    }

    #[test]
    fn comparisons_yield_unit() {
        assert_eq!(ev("3 < 5"), 1.0);
        assert_eq!(ev("3 > 5"), 0.0);
        assert_eq!(ev("3 == 3"), 1.0);
        assert_eq!(ev("3 != 3"), 0.0);
        assert_eq!(ev("3 <= 3"), 1.0);
        assert_eq!(ev("3 >= 4"), 0.0);
    }

    #[test]
    fn logical_short_circuit() {
        assert_eq!(ev("0 && (1 / 0)"), 0.0);
        assert_eq!(ev("1 || (1 / 0)"), 1.0);
        assert_eq!(ev("!0"), 1.0);
    }

    #[test]
    fn bit_operations() {
        assert_eq!(ev("6 & 3"), 2.0);
        assert_eq!(ev("6 | 3"), 7.0);
        assert_eq!(ev("6 ^ 3"), 5.0);
        assert_eq!(ev("1 << 4"), 16.0);
        assert_eq!(ev("16 >> 2"), 4.0);
        assert_eq!(ev("~0"), -1.0);
    }

    #[test]
    fn unary_and_hex() {
        assert_eq!(ev("-5 + 3"), -2.0);
        assert_eq!(ev("- -5"), 5.0);
        assert_eq!(ev("0xff"), 255.0);
    }

    #[test]
    fn ternary() {
        assert_eq!(ev("1 ? 10 : 20"), 10.0);
        assert_eq!(ev("0 ? 10 : 20"), 20.0);
    }

    #[test]
    fn reals_and_exponents() {
        assert_eq!(ev("2.5 * 2"), 5.0);
        assert_eq!(ev("1e3"), 1000.0);
        assert_eq!(ev("1.5e-1"), 0.15);
    }

    #[test]
    fn rejects_garbage() {
        assert!(DefaultEval.evaluate("").is_err());
        assert!(DefaultEval.evaluate("1 +").is_err());
        assert!(DefaultEval.evaluate("foo").is_err());
        assert!(DefaultEval.evaluate("1 2").is_err());
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(4.9999999), "5");
        assert_eq!(format_number(0.0), "0");
    }
}
