//! Conditional-compilation state machine.
//!
//! Implements the line-oriented `if` / `elif` / `else` / `endif` grammar as
//! a bounded-depth bit machine: four same-width bit-fields instead of a
//! vector stack, so nesting-depth checks are O(1) and allocation-free.
//!
//! - `state`: enabled bit per nesting level
//! - `estate`: "some branch at this level already matched" per level
//! - `istate`: "an `if` at this level is still open, no `else` seen"
//! - `top`: single set bit marking the current nesting depth
//!
//! Bit 0 is the outermost scope and is always enabled; a line is live iff
//! every bit from `top` down to bit 0 is set in `state`.

use crate::error::{EvalError, ParseErrorKind};
use crate::eval::ExprEval;
use crate::expand::MacroExpander;
use crate::scope::{EvalContext, lookup_macro};
use crate::table::MacroSet;

/// Maximum nesting depth: one bit per level, bit 0 reserved for the
/// outermost scope and the sign bit left alone.
pub const MAX_IF_DEPTH: u32 = 62;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalStack {
    state: u64,
    estate: u64,
    istate: u64,
    top: u64,
}

impl Default for ConditionalStack {
    fn default() -> Self {
        Self {
            state: 1,
            estate: 1,
            istate: 0,
            top: 1,
        }
    }
}

impl ConditionalStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one nesting level for an `if` with the given test result.
    pub fn begin_if(&mut self, test: bool) -> Result<(), ParseErrorKind> {
        if self.top >= 1 << MAX_IF_DEPTH {
            return Err(ParseErrorKind::IfNestingTooDeep);
        }
        self.top <<= 1;
        if test {
            self.state |= self.top;
            self.estate |= self.top;
        } else {
            self.state &= !self.top;
            self.estate &= !self.top;
        }
        self.istate |= self.top;
        Ok(())
    }

    /// True when an `elif`/`else` at the current level still needs its test
    /// evaluated: the `if` is open and no earlier branch matched.
    pub fn needs_test(&self) -> bool {
        self.istate & self.top != 0 && self.estate & self.top == 0
    }

    /// Take the `elif` branch with the given test result. The caller must
    /// not evaluate the test when an earlier branch already matched; pass
    /// `false` in that case (see [`ConditionalStack::needs_test`]).
    pub fn begin_elif(&mut self, test: bool) -> Result<(), ParseErrorKind> {
        if self.top == 1 {
            return Err(ParseErrorKind::ElifWithoutIf);
        }
        if self.istate & self.top == 0 {
            return Err(ParseErrorKind::ElifAfterElse);
        }
        if self.estate & self.top != 0 {
            self.state &= !self.top;
        } else if test {
            self.state |= self.top;
            self.estate |= self.top;
        } else {
            self.state &= !self.top;
        }
        Ok(())
    }

    /// Take the `else` branch: enabled iff no earlier branch matched.
    pub fn begin_else(&mut self) -> Result<(), ParseErrorKind> {
        if self.top == 1 || self.istate & self.top == 0 {
            return Err(ParseErrorKind::ElseWithoutIf);
        }
        self.istate &= !self.top;
        if self.estate & self.top != 0 {
            self.state &= !self.top;
        } else {
            self.state |= self.top;
            self.estate |= self.top;
        }
        Ok(())
    }

    /// Pop one nesting level.
    pub fn end_if(&mut self) -> Result<(), ParseErrorKind> {
        if self.top == 1 {
            return Err(ParseErrorKind::EndifWithoutIf);
        }
        self.istate &= !self.top;
        self.state &= !self.top;
        self.estate &= !self.top;
        self.top >>= 1;
        Ok(())
    }

    /// True iff every level from the outermost down to the current one is
    /// enabled.
    pub fn enabled(&self) -> bool {
        let mask = self.top | (self.top - 1);
        self.state & mask == mask
    }

    /// True iff every level *surrounding* the current `if` is enabled; used
    /// to avoid evaluating tests inside dead code.
    pub fn outer_enabled(&self) -> bool {
        let mask = self.top - 1;
        self.state & mask == mask
    }

    /// True while at least one `if` is open.
    pub fn inside_if(&self) -> bool {
        self.top != 1
    }

    /// Current nesting depth, zero at top level.
    pub fn depth(&self) -> u32 {
        self.top.trailing_zeros()
    }
}

/// A recognized conditional directive line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondDirective<'a> {
    If(&'a str),
    Elif(&'a str),
    Else,
    Endif,
    /// `else`/`endif` followed by trailing text.
    Malformed(&'a str),
}

/// Recognize `if` / `elif` / `else` / `endif` at the start of a trimmed
/// logical line. Keywords are case-insensitive.
pub fn recognize_directive(line: &str) -> Option<CondDirective<'_>> {
    let end = line
        .find(|c: char| c.is_whitespace())
        .unwrap_or(line.len());
    let (word, rest) = line.split_at(end);
    let rest = rest.trim();
    if word.eq_ignore_ascii_case("if") {
        Some(CondDirective::If(rest))
    } else if word.eq_ignore_ascii_case("elif") {
        Some(CondDirective::Elif(rest))
    } else if word.eq_ignore_ascii_case("else") {
        if rest.is_empty() {
            Some(CondDirective::Else)
        } else {
            Some(CondDirective::Malformed("else"))
        }
    } else if word.eq_ignore_ascii_case("endif") {
        if rest.is_empty() {
            Some(CondDirective::Endif)
        } else {
            Some(CondDirective::Malformed("endif"))
        }
    } else {
        None
    }
}

fn parse_version(text: &str) -> Option<(u64, u64, u64)> {
    let mut parts = text.split('.');
    let major = parts.next()?.trim().parse().ok()?;
    let minor = match parts.next() {
        Some(p) => p.trim().parse().ok()?,
        None => 0,
    };
    let patch = match parts.next() {
        Some(p) => p.trim().parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

/// Evaluate a guarded `if`/`elif` boolean test.
///
/// Handles `true`/`false`/`yes`/`no`, integer literals, any number of
/// leading `!` negations, `defined NAME`, and `version <op> X.Y[.Z]`.
/// Anything else is macro-expanded, re-tried as a literal, and finally
/// handed to the expression evaluator.
pub fn eval_condition(
    expr: &str,
    set: &MacroSet,
    ctx: &EvalContext,
    eval: &dyn ExprEval,
    version: (u64, u64, u64),
) -> Result<bool, EvalError> {
    let mut text = expr.trim();
    let mut negate = false;
    while let Some(rest) = text.strip_prefix('!') {
        negate = !negate;
        text = rest.trim_start();
    }
    if text.is_empty() {
        return Err(EvalError::Unsupported {
            expr: expr.to_string(),
            msg: "empty condition".to_string(),
        });
    }

    let value = if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("yes") {
        true
    } else if text.eq_ignore_ascii_case("false") || text.eq_ignore_ascii_case("no") {
        false
    } else if let Ok(n) = text.parse::<i64>() {
        n != 0
    } else if let Some(rest) = strip_keyword(text, "defined") {
        let name = rest.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(EvalError::Unsupported {
                expr: expr.to_string(),
                msg: "defined requires a single parameter name".to_string(),
            });
        }
        let quiet = ctx.with_use_mask(0);
        lookup_macro(name, set, &quiet).is_some()
    } else if let Some(rest) = strip_keyword(text, "version") {
        eval_version_test(expr, rest.trim(), version)?
    } else {
        // Expand macro references, then retry as a literal before
        // delegating to the expression evaluator.
        let expanded = MacroExpander::with_eval(set, eval).expand_all(text, ctx)?;
        let expanded = expanded.trim();
        if expanded.eq_ignore_ascii_case("true") || expanded.eq_ignore_ascii_case("yes") {
            true
        } else if expanded.eq_ignore_ascii_case("false")
            || expanded.eq_ignore_ascii_case("no")
            || expanded.is_empty()
        {
            false
        } else if let Ok(n) = expanded.parse::<i64>() {
            n != 0
        } else {
            let value = eval.eval(expanded)?;
            value.truthy().ok_or_else(|| EvalError::Unsupported {
                expr: expr.to_string(),
                msg: "condition did not evaluate to a boolean".to_string(),
            })?
        }
    };

    Ok(value != negate)
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = text.get(..keyword.len())?;
    if rest.eq_ignore_ascii_case(keyword) {
        let tail = &text[keyword.len()..];
        if tail.starts_with(char::is_whitespace) {
            return Some(tail);
        }
    }
    None
}

fn eval_version_test(
    expr: &str,
    rest: &str,
    version: (u64, u64, u64),
) -> Result<bool, EvalError> {
    let op_end = rest
        .find(|c: char| c != '<' && c != '>' && c != '=' && c != '!')
        .unwrap_or(rest.len());
    let (op, tail) = rest.split_at(op_end);
    let wanted = parse_version(tail.trim()).ok_or_else(|| EvalError::Unsupported {
        expr: expr.to_string(),
        msg: "malformed version number".to_string(),
    })?;
    let result = match op {
        "<" => version < wanted,
        "<=" => version <= wanted,
        ">" => version > wanted,
        ">=" => version >= wanted,
        "==" | "" => version == wanted,
        "!=" => version != wanted,
        _ => {
            return Err(EvalError::Unsupported {
                expr: expr.to_string(),
                msg: format!("unknown version comparison '{op}'"),
            });
        }
    };
    Ok(result)
}
