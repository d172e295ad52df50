//! Structured error types for parsing and macro evaluation.
//!
//! Two layers: [`EvalError`] covers failures inside a single macro expansion
//! (bad function arguments, out-of-range indexes, runaway expansion), while
//! [`ConfigError`] covers everything the parser can report, always carrying
//! the originating source name and 1-based line number.

use thiserror::Error;

/// Errors raised while expanding a macro reference or built-in function.
///
/// These are recoverable: the caller may abort only the offending assignment
/// and keep parsing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// A built-in function was given an argument it cannot use.
    #[error("${func}(): {msg}")]
    BadArgument { func: &'static str, msg: String },

    /// `$CHOICE()` index outside the item list.
    #[error("$CHOICE(): index {index} is out of range for {count} items")]
    ChoiceOutOfRange { index: i64, count: usize },

    /// `$RANDOM_INTEGER()` with min > max.
    #[error("$RANDOM_INTEGER(): min {min} is greater than max {max}")]
    InvalidRange { min: i64, max: i64 },

    /// A printf-style format string that is missing, doubled, or of the
    /// wrong numeric kind.
    #[error("invalid {kind} format '{fmt}'")]
    BadFormat { kind: &'static str, fmt: String },

    /// The expression evaluator was handed something it does not implement.
    #[error("unsupported expression '{expr}': {msg}")]
    Unsupported { expr: String, msg: String },

    /// Expansion exceeded the substitution-count or output-size budget.
    /// Almost always indicates mutually recursive macro definitions.
    #[error("macro expansion exceeded {limit} {what}")]
    ExpansionOverflow { limit: usize, what: &'static str },
}

/// Structural problems with a single config line.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("syntax error: missing '=' operator")]
    MissingOperator,

    #[error("illegal identifier '{0}'")]
    IllegalName(String),

    #[error("'{0} : value' assignment syntax is no longer supported, use '='")]
    ColonAssignment(String),

    #[error("elif without matching if")]
    ElifWithoutIf,

    #[error("elif after else")]
    ElifAfterElse,

    #[error("else without matching if")]
    ElseWithoutIf,

    #[error("endif without matching if")]
    EndifWithoutIf,

    #[error("if without matching endif")]
    UnclosedIf,

    #[error("if statements nested too deep")]
    IfNestingTooDeep,

    #[error("invalid condition '{0}': {1}")]
    BadCondition(String, String),

    #[error("use '{0}' has no items; expected use {0}:<item>")]
    MetaknobItemRequired(String),

    #[error("unknown metaknob {category}:{item}")]
    UnknownMetaknob { category: String, item: String },

    #[error("malformed include directive")]
    MalformedInclude,
}

/// Top-level error type for a config-load pass.
///
/// `Parse`, `Eval` and `Include` errors are collected by the parser and the
/// pass continues (unless configured to stop at the first error);
/// `NestingTooDeep` and `Io` abort the pass.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Structural parse error: the line is discarded, the pass continues.
    #[error("{source_name}, line {line}: {kind}")]
    Parse {
        source_name: String,
        line: u32,
        kind: ParseErrorKind,
    },

    /// A macro evaluation failed; only the offending assignment is aborted.
    #[error("{source_name}, line {line}: {error}")]
    Eval {
        source_name: String,
        line: u32,
        #[source]
        error: EvalError,
    },

    /// Metaknob or include recursion exceeded the depth limit. This is a
    /// configuration design flaw, not a typo, and aborts the whole pass.
    #[error("{source_name}, line {line}: nesting too deep (limit {limit})")]
    NestingTooDeep {
        source_name: String,
        line: u32,
        limit: usize,
    },

    /// An include source could not be opened or read. Fatal to that include
    /// only; the surrounding pass continues.
    #[error("{source_name}, line {line}: can't open '{included}': {error}")]
    Include {
        source_name: String,
        line: u32,
        included: String,
        #[source]
        error: std::io::Error,
    },

    /// I/O failure reading the source itself.
    #[error("error reading {source_name}: {error}")]
    Io {
        source_name: String,
        #[source]
        error: std::io::Error,
    },

    /// An error that originated inside a metaknob body, wrapped so the
    /// report names the metaknob and item that triggered it.
    #[error("use {category}:{item}: {inner}")]
    Metaknob {
        category: String,
        item: String,
        #[source]
        inner: Box<ConfigError>,
    },
}

impl ConfigError {
    /// True for errors that must abort the whole pass regardless of the
    /// caller's continue-on-error policy.
    pub fn is_fatal(&self) -> bool {
        match self {
            ConfigError::NestingTooDeep { .. } | ConfigError::Io { .. } => true,
            ConfigError::Metaknob { inner, .. } => inner.is_fatal(),
            _ => false,
        }
    }
}

/// Result type for macro evaluation.
pub type EvalResult<T> = std::result::Result<T, EvalError>;
