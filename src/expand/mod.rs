//! Recursive macro-substitution engine.
//!
//! Scans text for `$`-references, replaces each with its evaluated value,
//! and repeats until none remain. Substitution is index-based over an owned
//! buffer: each match splices a replacement between the segment boundaries
//! and scanning resumes at the spliced text so nested references expand.
//!
//! Recognized forms: `$(name)` and `$(name:default)` plain references,
//! `$$(...)` pass-through references left for a downstream consumer, the
//! `$(DOLLAR)` literal escape, and the built-in function family dispatched
//! through a sorted `const` table (`$ENV`, `$CHOICE`, `$SUBSTR`, `$INT`,
//! `$REAL`, `$RANDOM_CHOICE`, `$RANDOM_INTEGER`, `$EVAL`, and `$F` with its
//! filename-decomposition flags).

mod fileparts;
mod fmtnum;
mod funcs;

use std::ops::Range;

use crate::error::{EvalError, EvalResult};
use crate::eval::{ArithEval, ExprEval};
use crate::scope::{EvalContext, lookup_macro};
use crate::table::MacroSet;

pub use fileparts::FileFlags;

/// Substitution-count budget for one `expand_all` call. Mutually recursive
/// macro definitions hit this instead of hanging.
pub const MAX_EXPAND_STEPS: usize = 10_000;
/// Output-size budget for one `expand_all` call.
pub const MAX_EXPAND_BYTES: usize = 1 << 20;

static DEFAULT_EVAL: ArithEval = ArithEval;

/// Identifier characters allowed in a macro name.
fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || c == b'/'
}

/// `$$()` bodies additionally allow a colon.
fn is_dd_char(c: u8) -> bool {
    is_ident_char(c) || c == b':'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FuncKind {
    Choice,
    Env,
    Eval,
    File,
    Int,
    RandomChoice,
    RandomInteger,
    Real,
    Substr,
}

/// Built-in function dispatch table, sorted by name for binary search.
/// `$F` is handled separately because its flag letters vary.
const FUNCTIONS: &[(&str, FuncKind)] = &[
    ("CHOICE", FuncKind::Choice),
    ("ENV", FuncKind::Env),
    ("EVAL", FuncKind::Eval),
    ("INT", FuncKind::Int),
    ("RANDOM_CHOICE", FuncKind::RandomChoice),
    ("RANDOM_INTEGER", FuncKind::RandomInteger),
    ("REAL", FuncKind::Real),
    ("SUBSTR", FuncKind::Substr),
];

/// The recursive text-substitution engine. Borrows the table (and through
/// it the defaults) plus an expression evaluator for arithmetic arguments.
pub struct MacroExpander<'a> {
    set: &'a MacroSet,
    eval: &'a dyn ExprEval,
}

impl<'a> MacroExpander<'a> {
    pub fn new(set: &'a MacroSet) -> Self {
        Self {
            set,
            eval: &DEFAULT_EVAL,
        }
    }

    pub fn with_eval(set: &'a MacroSet, eval: &'a dyn ExprEval) -> Self {
        Self { set, eval }
    }

    pub(crate) fn set(&self) -> &'a MacroSet {
        self.set
    }

    pub(crate) fn evaluator(&self) -> &'a dyn ExprEval {
        self.eval
    }

    /// Fully expand every recognized reference in `text`.
    ///
    /// Undefined plain references expand to their `:default` clause or to
    /// the empty string; `$$(...)` references are preserved untouched. The
    /// `$(DOLLAR)` escape becomes a single `$` only in a final pass, after
    /// all functional expansion, so the result cannot reintroduce a live
    /// reference.
    pub fn expand_all(&self, text: &str, ctx: &EvalContext) -> EvalResult<String> {
        let mut buf = text.to_string();
        let mut pos = 0;
        let mut steps = 0usize;

        while pos < buf.len() {
            let Some(found) = buf[pos..].find('$') else {
                break;
            };
            let at = pos + found;
            let bytes = buf.as_bytes();

            if bytes.get(at + 1) == Some(&b'$') {
                // Double-dollar reference: recognize and skip, never expand.
                pos = scan_dollar_dollar(bytes, at).unwrap_or(at + 2);
                continue;
            }

            if bytes.get(at + 1) == Some(&b'(') {
                let Some(body) = scan_plain_body(bytes, at + 1) else {
                    pos = at + 1;
                    continue;
                };
                let name = &buf[body.name.clone()];
                if body.default.is_none() && name.eq_ignore_ascii_case("DOLLAR") {
                    // Left in place for the final escape pass.
                    pos = body.end;
                    continue;
                }
                let replacement = match lookup_macro(name, self.set, ctx) {
                    Some(value) => value.to_string(),
                    None => body
                        .default
                        .as_ref()
                        .map(|r| buf[r.clone()].to_string())
                        .unwrap_or_default(),
                };
                buf.replace_range(at..body.end, &replacement);
                pos = at;
                steps += 1;
                check_budget(steps, buf.len())?;
                continue;
            }

            match scan_function(&buf, at) {
                Some(func) => {
                    let replacement = self.dispatch(
                        func.kind,
                        &buf[func.flags.clone()],
                        &buf[func.body.clone()],
                        ctx,
                    )?;
                    buf.replace_range(at..func.end, &replacement);
                    pos = at;
                    steps += 1;
                    check_budget(steps, buf.len())?;
                }
                None => pos = at + 1,
            }
        }

        replace_dollar_escape(&mut buf);
        Ok(buf)
    }

    /// Expand only references to `self_name` (or `self_name` with the
    /// active subsystem/local-name prefix stripped), leaving every other
    /// reference untouched, including `$(DOLLAR)` and all functions.
    ///
    /// Each matching occurrence is replaced exactly once with the macro's
    /// current scope-resolved value, so `FOO = $(FOO) suffix` grows the
    /// existing text without triggering full expansion.
    pub fn expand_self(
        &self,
        text: &str,
        self_name: &str,
        ctx: &EvalContext,
    ) -> EvalResult<String> {
        let selfless = self_name.split_once('.').and_then(|(prefix, rest)| {
            let matches = |scope: Option<&str>| {
                scope.is_some_and(|s| s.eq_ignore_ascii_case(prefix))
            };
            if matches(ctx.local_name) || matches(ctx.subsys) {
                Some(rest)
            } else {
                None
            }
        });

        let mut buf = text.to_string();
        let mut pos = 0;

        while pos < buf.len() {
            let Some(found) = buf[pos..].find('$') else {
                break;
            };
            let at = pos + found;
            let bytes = buf.as_bytes();

            if bytes.get(at + 1) == Some(&b'$') {
                pos = scan_dollar_dollar(bytes, at).unwrap_or(at + 2);
                continue;
            }

            if bytes.get(at + 1) == Some(&b'(') {
                let Some(body) = scan_plain_body(bytes, at + 1) else {
                    pos = at + 1;
                    continue;
                };
                let name = &buf[body.name.clone()];
                let is_self = body.default.is_none()
                    && (name.eq_ignore_ascii_case(self_name)
                        || selfless.is_some_and(|s| name.eq_ignore_ascii_case(s)));
                if !is_self {
                    pos = body.end;
                    continue;
                }
                let replacement = lookup_macro(name, self.set, ctx)
                    .unwrap_or_default()
                    .to_string();
                buf.replace_range(at..body.end, &replacement);
                // Resume after the splice: every occurrence is substituted
                // exactly once, which is what bounds this loop.
                pos = at + replacement.len();
                continue;
            }

            pos = match scan_function(&buf, at) {
                Some(func) => func.end,
                None => at + 1,
            };
        }

        Ok(buf)
    }

    fn dispatch(
        &self,
        kind: FuncKind,
        flags: &str,
        body: &str,
        ctx: &EvalContext,
    ) -> EvalResult<String> {
        match kind {
            FuncKind::Env => self.func_env(body),
            FuncKind::RandomChoice => self.func_random_choice(body, ctx),
            FuncKind::RandomInteger => self.func_random_integer(body, ctx),
            FuncKind::Choice => self.func_choice(body, ctx),
            FuncKind::Substr => self.func_substr(body, ctx),
            FuncKind::Int => self.func_int(body, ctx),
            FuncKind::Real => self.func_real(body, ctx),
            FuncKind::Eval => self.func_eval(body, ctx),
            FuncKind::File => self.func_file(flags, body, ctx),
        }
    }
}

fn check_budget(steps: usize, len: usize) -> EvalResult<()> {
    if steps > MAX_EXPAND_STEPS {
        return Err(EvalError::ExpansionOverflow {
            limit: MAX_EXPAND_STEPS,
            what: "substitutions",
        });
    }
    if len > MAX_EXPAND_BYTES {
        return Err(EvalError::ExpansionOverflow {
            limit: MAX_EXPAND_BYTES,
            what: "bytes",
        });
    }
    Ok(())
}

struct PlainBody {
    name: Range<usize>,
    default: Option<Range<usize>>,
    /// Index one past the closing paren.
    end: usize,
}

/// Scan a `$(name)` / `$(name:default)` body. `open` is the index of the
/// opening paren. The name allows identifier characters only; after a `:`
/// the default clause allows anything up to the matching paren, including
/// nested `$(...)`.
fn scan_plain_body(bytes: &[u8], open: usize) -> Option<PlainBody> {
    let name_start = open + 1;
    let mut i = name_start;
    while i < bytes.len() && is_ident_char(bytes[i]) {
        i += 1;
    }
    if i == name_start {
        return None;
    }
    match bytes.get(i) {
        Some(b')') => Some(PlainBody {
            name: name_start..i,
            default: None,
            end: i + 1,
        }),
        Some(b':') => {
            let default_start = i + 1;
            let mut depth = 1u32;
            let mut j = default_start;
            while j < bytes.len() {
                match bytes[j] {
                    b'(' => depth += 1,
                    b')' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(PlainBody {
                                name: name_start..i,
                                default: Some(default_start..j),
                                end: j + 1,
                            });
                        }
                    }
                    _ => {}
                }
                j += 1;
            }
            None
        }
        _ => None,
    }
}

/// Scan a `$$(name)`, `$$(name:default)` or `$$([expr])` reference starting
/// at the first `$`. Returns the index one past the end, or `None` when the
/// text is not a well-formed double-dollar reference.
fn scan_dollar_dollar(bytes: &[u8], at: usize) -> Option<usize> {
    if bytes.get(at + 2) != Some(&b'(') {
        return None;
    }
    if bytes.get(at + 3) == Some(&b'[') {
        // Bracketed expression form: no nesting smarts needed, just locate
        // the literal "])" terminator.
        let rest = &bytes[at + 3..];
        let close = rest.windows(2).position(|w| w == b"])")?;
        return Some(at + 3 + close + 2);
    }
    let mut i = at + 3;
    while i < bytes.len() && is_dd_char(bytes[i]) {
        i += 1;
    }
    if bytes.get(i) == Some(&b')') {
        Some(i + 1)
    } else {
        None
    }
}

struct FuncRef {
    kind: FuncKind,
    flags: Range<usize>,
    body: Range<usize>,
    /// Index one past the closing paren.
    end: usize,
}

/// Scan a `$NAME(body)` built-in function reference starting at the `$`.
/// Function names are matched case-sensitively against the dispatch table;
/// `$F` takes its flag letters between the `F` and the paren. The body runs
/// to the matching close paren, nested parens allowed.
fn scan_function(buf: &str, at: usize) -> Option<FuncRef> {
    let bytes = buf.as_bytes();
    let word_start = at + 1;
    let mut i = word_start;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    if i == word_start || bytes.get(i) != Some(&b'(') {
        return None;
    }
    let word = &buf[word_start..i];

    let (kind, flags) = if let Ok(pos) = FUNCTIONS.binary_search_by(|entry| entry.0.cmp(word)) {
        (FUNCTIONS[pos].1, i..i)
    } else if word.starts_with('F')
        && word.len() > 1
        && word[1..].bytes().all(fileparts::is_file_flag)
    {
        (FuncKind::File, word_start + 1..i)
    } else if word == "F" {
        (FuncKind::File, i..i)
    } else {
        return None;
    };

    let body_start = i + 1;
    let mut depth = 1u32;
    let mut j = body_start;
    while j < bytes.len() {
        match bytes[j] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(FuncRef {
                        kind,
                        flags,
                        body: body_start..j,
                        end: j + 1,
                    });
                }
            }
            _ => {}
        }
        j += 1;
    }
    None
}

/// Replace every literal `$(DOLLAR)` (case-insensitive) with a single `$`.
fn replace_dollar_escape(buf: &mut String) {
    const ESCAPE_LEN: usize = "$(DOLLAR)".len();
    let mut pos = 0;
    while pos + ESCAPE_LEN <= buf.len() {
        let Some(found) = buf[pos..].find('$') else {
            return;
        };
        let at = pos + found;
        if buf[at..]
            .get(..ESCAPE_LEN)
            .is_some_and(|s| s.eq_ignore_ascii_case("$(DOLLAR)"))
        {
            buf.replace_range(at..at + ESCAPE_LEN, "$");
            pos = at + 1;
        } else {
            pos = at + 1;
        }
    }
}

/// Split a function body on top-level commas, leaving text inside nested
/// parens intact. Pieces are not trimmed; format arguments keep their
/// leading spaces.
pub(crate) fn split_args(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0u32;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}
