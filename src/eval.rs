//! Expression evaluator seam.
//!
//! Full expression evaluation (the `$EVAL()` function and exotic `if`
//! tests) belongs to an external evaluator; the engine only defines the
//! [`ExprEval`] trait it calls through. The shipped [`ArithEval`] covers
//! the arithmetic subset config files actually use, e.g. `$(VANILLA)*2`
//! or `$(STANDARD)-$(VM)` after macro expansion; everything beyond that
//! reports [`EvalError::Unsupported`].

use crate::error::{EvalError, EvalResult};

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
}

impl EvalValue {
    /// Boolean interpretation, when one exists.
    pub fn truthy(&self) -> Option<bool> {
        match self {
            EvalValue::Bool(b) => Some(*b),
            EvalValue::Int(n) => Some(*n != 0),
            EvalValue::Real(r) => Some(*r != 0.0),
            EvalValue::Str(_) => None,
        }
    }
}

impl std::fmt::Display for EvalValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalValue::Bool(b) => write!(f, "{b}"),
            EvalValue::Int(n) => write!(f, "{n}"),
            EvalValue::Real(r) => write!(f, "{r}"),
            EvalValue::Str(s) => write!(f, "{s}"),
        }
    }
}

/// External expression evaluator interface.
pub trait ExprEval {
    fn eval(&self, expr: &str) -> EvalResult<EvalValue>;
}

/// Built-in arithmetic evaluator: `+ - * /`, unary minus, parentheses,
/// integer and real literals. Integer arithmetic stays integral until a
/// real literal or an inexact division forces promotion.
pub struct ArithEval;

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Real(f64),
}

impl Num {
    fn as_real(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Real(r) => r,
        }
    }
}

impl ExprEval for ArithEval {
    fn eval(&self, expr: &str) -> EvalResult<EvalValue> {
        let mut parser = Parser {
            expr,
            bytes: expr.as_bytes(),
            pos: 0,
        };
        let value = parser.expr()?;
        parser.skip_ws();
        if parser.pos != parser.bytes.len() {
            return Err(parser.unsupported("trailing characters"));
        }
        Ok(match value {
            Num::Int(n) => EvalValue::Int(n),
            Num::Real(r) => EvalValue::Real(r),
        })
    }
}

struct Parser<'a> {
    expr: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn unsupported(&self, msg: &str) -> EvalError {
        EvalError::Unsupported {
            expr: self.expr.to_string(),
            msg: msg.to_string(),
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.bytes.get(self.pos).copied()
    }

    fn expr(&mut self) -> EvalResult<Num> {
        let mut lhs = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = match (lhs, rhs) {
                (Num::Int(a), Num::Int(b)) => {
                    let exact = if op == b'+' {
                        a.checked_add(b)
                    } else {
                        a.checked_sub(b)
                    };
                    match exact {
                        Some(n) => Num::Int(n),
                        None => Num::Real(if op == b'+' {
                            a as f64 + b as f64
                        } else {
                            a as f64 - b as f64
                        }),
                    }
                }
                (a, b) => Num::Real(if op == b'+' {
                    a.as_real() + b.as_real()
                } else {
                    a.as_real() - b.as_real()
                }),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> EvalResult<Num> {
        let mut lhs = self.factor()?;
        while let Some(op @ (b'*' | b'/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = match op {
                b'*' => match (lhs, rhs) {
                    (Num::Int(a), Num::Int(b)) => match a.checked_mul(b) {
                        Some(n) => Num::Int(n),
                        None => Num::Real(a as f64 * b as f64),
                    },
                    (a, b) => Num::Real(a.as_real() * b.as_real()),
                },
                _ => match (lhs, rhs) {
                    (_, Num::Int(0)) => return Err(self.unsupported("division by zero")),
                    (Num::Int(a), Num::Int(b)) if a % b == 0 => Num::Int(a / b),
                    (a, b) => {
                        if b.as_real() == 0.0 {
                            return Err(self.unsupported("division by zero"));
                        }
                        Num::Real(a.as_real() / b.as_real())
                    }
                },
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> EvalResult<Num> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                Ok(match self.factor()? {
                    Num::Int(n) => Num::Int(-n),
                    Num::Real(r) => Num::Real(-r),
                })
            }
            Some(b'(') => {
                self.pos += 1;
                let inner = self.expr()?;
                if self.peek() != Some(b')') {
                    return Err(self.unsupported("missing ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(_) => Err(self.unsupported("unknown symbol")),
            None => Err(self.unsupported("unexpected end of expression")),
        }
    }

    fn number(&mut self) -> EvalResult<Num> {
        let start = self.pos;
        let mut is_real = false;
        while let Some(&c) = self.bytes.get(self.pos) {
            match c {
                b'0'..=b'9' => self.pos += 1,
                b'.' => {
                    is_real = true;
                    self.pos += 1;
                }
                b'e' | b'E' => {
                    is_real = true;
                    self.pos += 1;
                    if matches!(self.bytes.get(self.pos), Some(b'+' | b'-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let text = &self.expr[start..self.pos];
        if is_real {
            text.parse::<f64>()
                .map(Num::Real)
                .map_err(|_| self.unsupported("malformed number"))
        } else {
            text.parse::<i64>()
                .map(Num::Int)
                .map_err(|_| self.unsupported("malformed number"))
        }
    }
}
