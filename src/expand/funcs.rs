//! Built-in macro function handlers.
//!
//! Every function that takes a `name` argument first resolves it through
//! the scope chain and fully expands the resolved value before operating on
//! it; functions never see unexpanded text. Numeric arguments may be
//! literals, macro names resolving to numbers, or arithmetic handed to the
//! expression evaluator.

use rand::Rng;

use super::{MacroExpander, fileparts, fmtnum, split_args};
use crate::error::{EvalError, EvalResult};
use crate::eval::EvalValue;
use crate::scope::{EvalContext, lookup_macro};

/// True when `text` could be a numeric literal rather than a macro name.
fn looks_numeric(text: &str) -> bool {
    text.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+' || c == '.')
}

impl MacroExpander<'_> {
    /// Resolve `name` through the scope chain and fully expand the result.
    fn resolve_expanded(&self, name: &str, ctx: &EvalContext) -> EvalResult<Option<String>> {
        match lookup_macro(name, self.set(), ctx) {
            Some(value) if value.contains('$') => self.expand_all(value, ctx).map(Some),
            Some(value) => Ok(Some(value.to_string())),
            None => Ok(None),
        }
    }

    /// Numeric argument: literal, macro resolving to a number, or
    /// arithmetic the evaluator can handle (`$(VANILLA)-2` style).
    fn arg_num(
        &self,
        func: &'static str,
        text: &str,
        ctx: &EvalContext,
    ) -> EvalResult<EvalValue> {
        let raw = text.trim();
        if looks_numeric(raw) {
            if let Ok(n) = raw.parse::<i64>() {
                return Ok(EvalValue::Int(n));
            }
            if let Ok(r) = raw.parse::<f64>() {
                return Ok(EvalValue::Real(r));
            }
        }
        let target = match self.resolve_expanded(raw, ctx)? {
            Some(value) => value,
            None => raw.to_string(),
        };
        let resolved = target.trim();
        if let Ok(n) = resolved.parse::<i64>() {
            return Ok(EvalValue::Int(n));
        }
        if looks_numeric(resolved) {
            if let Ok(r) = resolved.parse::<f64>() {
                return Ok(EvalValue::Real(r));
            }
        }
        match self.evaluator().eval(resolved) {
            Ok(value @ (EvalValue::Int(_) | EvalValue::Real(_))) => Ok(value),
            Ok(EvalValue::Bool(b)) => Ok(EvalValue::Int(b as i64)),
            _ => Err(EvalError::BadArgument {
                func,
                msg: format!("'{raw}' is not a number"),
            }),
        }
    }

    fn arg_int(&self, func: &'static str, text: &str, ctx: &EvalContext) -> EvalResult<i64> {
        Ok(match self.arg_num(func, text, ctx)? {
            EvalValue::Int(n) => n,
            EvalValue::Real(r) => r as i64,
            _ => 0,
        })
    }

    /// `$ENV(name)` / `$ENV(name:default)`. A missing or empty variable
    /// falls back to the default; with no default the result is the
    /// literal string `UNDEFINED`.
    pub(super) fn func_env(&self, body: &str) -> EvalResult<String> {
        let (name, default) = match body.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (body, None),
        };
        match std::env::var(name) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Ok(default.unwrap_or("UNDEFINED").to_string()),
        }
    }

    /// `$RANDOM_CHOICE(a,b,c,...)`: uniform random pick. A single
    /// comma-free token naming a macro whose value is a comma-separated
    /// list uses that list instead.
    pub(super) fn func_random_choice(&self, body: &str, ctx: &EvalContext) -> EvalResult<String> {
        if body.trim().is_empty() {
            return Err(EvalError::BadArgument {
                func: "RANDOM_CHOICE",
                msg: "empty choice list".to_string(),
            });
        }
        let args = split_args(body);
        let resolved;
        let items: Vec<&str> = if args.len() == 1 {
            match self.resolve_expanded(args[0].trim(), ctx)? {
                Some(value) => {
                    resolved = value;
                    resolved.split(',').map(str::trim).collect()
                }
                None => vec![args[0].trim()],
            }
        } else {
            args.iter().map(|a| a.trim()).collect()
        };
        let pick = rand::thread_rng().gen_range(0..items.len());
        Ok(items[pick].to_string())
    }

    /// `$RANDOM_INTEGER(min,max[,step])`: `min + k*step` for uniform
    /// random `k` in `[0, (max-min+step)/step)`.
    pub(super) fn func_random_integer(
        &self,
        body: &str,
        ctx: &EvalContext,
    ) -> EvalResult<String> {
        let args = split_args(body);
        if args.len() < 2 || args.len() > 3 {
            return Err(EvalError::BadArgument {
                func: "RANDOM_INTEGER",
                msg: "expected min,max[,step]".to_string(),
            });
        }
        let min = self.arg_int("RANDOM_INTEGER", args[0], ctx)?;
        let max = self.arg_int("RANDOM_INTEGER", args[1], ctx)?;
        let step = match args.get(2) {
            Some(arg) => self.arg_int("RANDOM_INTEGER", arg, ctx)?,
            None => 1,
        };
        if step < 1 {
            return Err(EvalError::BadArgument {
                func: "RANDOM_INTEGER",
                msg: format!("invalid step {step}"),
            });
        }
        if min > max {
            return Err(EvalError::InvalidRange { min, max });
        }
        let num = (max - min + step) / step;
        let k = rand::thread_rng().gen_range(0..num);
        Ok((min + k * step).to_string())
    }

    /// `$CHOICE(index, list_name)` / `$CHOICE(index, item1, item2, ...)`.
    /// An out-of-range index is a reported evaluation error.
    pub(super) fn func_choice(&self, body: &str, ctx: &EvalContext) -> EvalResult<String> {
        let args = split_args(body);
        if args.len() < 2 {
            return Err(EvalError::BadArgument {
                func: "CHOICE",
                msg: "expected index and choice list".to_string(),
            });
        }
        let index = self.arg_int("CHOICE", args[0], ctx)?;
        let resolved;
        let items: Vec<&str> = if args.len() == 2 {
            match self.resolve_expanded(args[1].trim(), ctx)? {
                Some(value) => {
                    resolved = value;
                    resolved.split(',').map(str::trim).collect()
                }
                None => vec![args[1].trim()],
            }
        } else {
            args[1..].iter().map(|a| a.trim()).collect()
        };
        if index < 0 || index as usize >= items.len() {
            return Err(EvalError::ChoiceOutOfRange {
                index,
                count: items.len(),
            });
        }
        Ok(items[index as usize].to_string())
    }

    /// `$SUBSTR(name[,start[,length]])`: negative start/length count back
    /// from the end of the string, clamped to valid bounds.
    pub(super) fn func_substr(&self, body: &str, ctx: &EvalContext) -> EvalResult<String> {
        let args = split_args(body);
        if args.is_empty() || args.len() > 3 {
            return Err(EvalError::BadArgument {
                func: "SUBSTR",
                msg: "expected name[,start[,length]]".to_string(),
            });
        }
        let value = self
            .resolve_expanded(args[0].trim(), ctx)?
            .unwrap_or_default();
        let start = match args.get(1) {
            Some(arg) => self.arg_int("SUBSTR", arg, ctx)?,
            None => 0,
        };
        let length = match args.get(2) {
            Some(arg) => Some(self.arg_int("SUBSTR", arg, ctx)?),
            None => None,
        };

        let chars: Vec<char> = value.chars().collect();
        let n = chars.len() as i64;
        let begin = if start < 0 {
            (n + start).max(0)
        } else {
            start.min(n)
        };
        let end = match length {
            None => n,
            Some(len) if len >= 0 => (begin + len).min(n),
            Some(len) => (n + len).max(begin),
        };
        if end <= begin {
            return Ok(String::new());
        }
        Ok(chars[begin as usize..end as usize].iter().collect())
    }

    /// `$INT(name[,format])`: resolve, coerce to integer (truncating),
    /// reformat with an optional printf-style integer format.
    pub(super) fn func_int(&self, body: &str, ctx: &EvalContext) -> EvalResult<String> {
        let args = split_args(body);
        if args.is_empty() || args.len() > 2 {
            return Err(EvalError::BadArgument {
                func: "INT",
                msg: "expected name[,format]".to_string(),
            });
        }
        let value = match self.arg_num("INT", args[0], ctx)? {
            EvalValue::Int(n) => n,
            EvalValue::Real(r) => r as i64,
            _ => 0,
        };
        match args.get(1) {
            Some(fmt) => fmtnum::format_int(fmt, value),
            None => Ok(value.to_string()),
        }
    }

    /// `$REAL(name[,format])`: like `$INT` but coercing to a real.
    pub(super) fn func_real(&self, body: &str, ctx: &EvalContext) -> EvalResult<String> {
        let args = split_args(body);
        if args.is_empty() || args.len() > 2 {
            return Err(EvalError::BadArgument {
                func: "REAL",
                msg: "expected name[,format]".to_string(),
            });
        }
        let value = match self.arg_num("REAL", args[0], ctx)? {
            EvalValue::Int(n) => n as f64,
            EvalValue::Real(r) => r,
            _ => 0.0,
        };
        match args.get(1) {
            Some(fmt) => fmtnum::format_real(fmt, value),
            None => Ok(value.to_string()),
        }
    }

    /// `$EVAL(expr)`: delegated to the external expression evaluator. An
    /// expression the evaluator cannot handle yields `undefined`, matching
    /// how unresolvable attribute references evaluate downstream.
    pub(super) fn func_eval(&self, body: &str, ctx: &EvalContext) -> EvalResult<String> {
        let text = body.trim();
        let target = match self.resolve_expanded(text, ctx)? {
            Some(value) => value,
            None => text.to_string(),
        };
        match self.evaluator().eval(target.trim()) {
            Ok(value) => Ok(value.to_string()),
            Err(EvalError::Unsupported { .. }) => Ok("undefined".to_string()),
            Err(err) => Err(err),
        }
    }

    /// `$F[flags](name)`: filename decomposition.
    pub(super) fn func_file(
        &self,
        flags: &str,
        body: &str,
        ctx: &EvalContext,
    ) -> EvalResult<String> {
        let flags = fileparts::FileFlags::parse(flags).ok_or_else(|| EvalError::BadArgument {
            func: "F",
            msg: format!("unknown file flag in '{flags}'"),
        })?;
        let value = self
            .resolve_expanded(body.trim(), ctx)?
            .unwrap_or_default();
        Ok(fileparts::decompose(&value, &flags, ctx.cwd))
    }
}
