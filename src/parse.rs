//! Top-level config parser.
//!
//! Drives the whole pipeline for each logical line: conditional-state
//! updates, line classification (assignment, metaknob `use`, `include`),
//! self-reference expansion of assigned values, and insertion into the
//! macro table. Values are stored partially expanded; full `$(...)`
//! resolution of other names happens lazily at read time.
//!
//! Structural errors are collected and the pass continues unless the
//! caller asked to stop at the first one; metaknob/include recursion
//! exceeding the depth limit always aborts the pass.

use tracing::{debug, warn};

use crate::cond::{self, CondDirective, ConditionalStack};
use crate::error::{ConfigError, ParseErrorKind};
use crate::eval::{ArithEval, ExprEval};
use crate::expand::MacroExpander;
use crate::metaknobs::{BuiltinMetaknobs, MetaknobService};
use crate::reader::{FsOpener, IncludeKind, LineReader, LineSource, SourceOpener};
use crate::scope::EvalContext;
use crate::source::{MetaknobRef, SourceId, SourceRef};
use crate::table::MacroSet;

/// Depth limit shared by metaknob and include recursion.
pub const MAX_NESTING_DEPTH: usize = 20;

/// Policy for the deprecated `name : value` assignment syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColonPolicy {
    /// Accept silently.
    Allow,
    /// Accept but log a warning.
    #[default]
    Warn,
    /// Report a structural error and drop the line.
    Reject,
}

/// Caller-tunable parse behavior.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub colon_policy: ColonPolicy,
    /// Return the first collected error instead of continuing the pass.
    pub stop_on_error: bool,
    pub max_nesting: usize,
    /// Engine version reported to `if version` tests.
    pub version: (u64, u64, u64),
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            colon_policy: ColonPolicy::default(),
            stop_on_error: false,
            max_nesting: MAX_NESTING_DEPTH,
            version: engine_version(),
        }
    }
}

fn engine_version() -> (u64, u64, u64) {
    let mut parts = env!("CARGO_PKG_VERSION")
        .split('.')
        .map(|p| p.parse().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

/// A legal knob name: identifier characters only, at most one scope dot.
fn is_valid_param_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || c == b'/')
        && name.bytes().filter(|&c| c == b'.').count() <= 1
}

/// Split `name OP value`; the operator is the first top-level `=` or `:`.
fn split_assignment(line: &str) -> Option<(&str, char, &str)> {
    let op_idx = line.find(['=', ':'])?;
    let op = line.as_bytes()[op_idx] as char;
    let name = line[..op_idx].trim();
    let value = line[op_idx + 1..].trim();
    Some((name, op, value))
}

/// Strip a leading keyword (case-insensitive) followed by whitespace or end
/// of line.
fn after_keyword<'t>(line: &'t str, keyword: &str) -> Option<&'t str> {
    let head = line.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &line[keyword.len()..];
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

/// Parse the tail of an `include` directive: optional `output`/`command`
/// keyword, then `:` and the source spec.
fn parse_include_spec(rest: &str) -> Option<(IncludeKind, &str)> {
    let rest = rest.trim_start();
    let (kind, rest) = if let Some(tail) = strip_word(rest, "command") {
        (IncludeKind::Command, tail)
    } else if let Some(tail) = strip_word(rest, "output") {
        (IncludeKind::Command, tail)
    } else {
        (IncludeKind::File, rest)
    };
    let rest = rest.trim_start().strip_prefix(':')?;
    let spec = rest.trim();
    if spec.is_empty() { None } else { Some((kind, spec)) }
}

fn strip_word<'t>(text: &'t str, word: &str) -> Option<&'t str> {
    let head = text.get(..word.len())?;
    if head.eq_ignore_ascii_case(word) {
        let tail = &text[word.len()..];
        if tail.is_empty() || tail.starts_with(char::is_whitespace) || tail.starts_with(':') {
            return Some(tail);
        }
    }
    None
}

static DEFAULT_METAKNOBS: BuiltinMetaknobs = BuiltinMetaknobs;
static DEFAULT_OPENER: FsOpener = FsOpener;
static DEFAULT_EVAL: ArithEval = ArithEval;

#[derive(Clone, Copy)]
struct MetaknobScope {
    id: u32,
    src: SourceId,
    use_line: u32,
}

/// The config-load driver. Owns nothing but the error list; the table and
/// the collaborator services are borrowed for the duration of one pass.
pub struct ConfigParser<'a> {
    set: &'a mut MacroSet,
    metaknobs: &'a dyn MetaknobService,
    opener: &'a dyn SourceOpener,
    eval: &'a dyn ExprEval,
    options: ParseOptions,
    errors: Vec<ConfigError>,
    metaknob_count: u32,
    metaknob_scope: Option<MetaknobScope>,
}

impl<'a> ConfigParser<'a> {
    pub fn new(set: &'a mut MacroSet) -> Self {
        Self {
            set,
            metaknobs: &DEFAULT_METAKNOBS,
            opener: &DEFAULT_OPENER,
            eval: &DEFAULT_EVAL,
            options: ParseOptions::default(),
            errors: Vec::new(),
            metaknob_count: 0,
            metaknob_scope: None,
        }
    }

    pub fn with_metaknobs(mut self, metaknobs: &'a dyn MetaknobService) -> Self {
        self.metaknobs = metaknobs;
        self
    }

    pub fn with_opener(mut self, opener: &'a dyn SourceOpener) -> Self {
        self.opener = opener;
        self
    }

    pub fn with_eval(mut self, eval: &'a dyn ExprEval) -> Self {
        self.eval = eval;
        self
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    /// Errors collected so far (structural, evaluation, include failures).
    pub fn errors(&self) -> &[ConfigError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ConfigError> {
        self.errors
    }

    /// Parse a config source named on the command line or in a root
    /// config: a file path, or a command when it ends with `|`.
    pub fn parse_path(&mut self, path: &str, ctx: &EvalContext) -> Result<(), ConfigError> {
        let trimmed = path.trim();
        let (kind, spec) = match trimmed.strip_suffix('|') {
            Some(cmd) => (IncludeKind::Command, cmd.trim()),
            None => (IncludeKind::File, trimmed),
        };
        let mut lines = self
            .opener
            .open(kind, spec)
            .map_err(|error| ConfigError::Io {
                source_name: trimmed.to_string(),
                error,
            })?;
        let src = self
            .set
            .sources_mut()
            .add(trimmed, kind == IncludeKind::Command, false);
        debug!(source = trimmed, "parsing config source");
        self.parse_source(lines.as_mut(), src, ctx, 0)
    }

    /// Parse an in-memory config string under the given display name.
    pub fn parse_str(
        &mut self,
        text: &str,
        name: &str,
        ctx: &EvalContext,
    ) -> Result<(), ConfigError> {
        let mut lines = LineReader::from_string(text);
        let src = self.set.sources_mut().add(name, false, false);
        self.parse_source(&mut lines, src, ctx, 0)
    }

    fn display(&self, src: SourceId) -> String {
        self.set.sources().display_name(src).to_string()
    }

    /// Record a non-fatal error, or propagate it when it is fatal or the
    /// caller asked to stop at the first error.
    fn report(&mut self, err: ConfigError) -> Result<(), ConfigError> {
        if err.is_fatal() || self.options.stop_on_error {
            return Err(err);
        }
        warn!("{err}");
        self.errors.push(err);
        Ok(())
    }

    fn source_ref(&self, src: SourceId, line: u32) -> SourceRef {
        match self.metaknob_scope {
            Some(scope) if scope.src == src => SourceRef {
                id: src,
                line: scope.use_line,
                metaknob: Some(MetaknobRef {
                    id: scope.id,
                    offset: line,
                }),
            },
            _ => SourceRef::new(src, line),
        }
    }

    fn parse_source(
        &mut self,
        lines: &mut dyn LineSource,
        src: SourceId,
        ctx: &EvalContext,
        depth: usize,
    ) -> Result<(), ConfigError> {
        let mut cond_stack = ConditionalStack::new();
        let mut last_line = 0;
        loop {
            let text = match lines.next_logical_line() {
                Ok(Some(text)) => text,
                Ok(None) => break,
                Err(error) => {
                    return Err(ConfigError::Io {
                        source_name: self.display(src),
                        error,
                    });
                }
            };
            let line = lines.line();
            last_line = line;
            self.set.sources_mut().set_line(src, line);

            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if let Some(directive) = cond::recognize_directive(trimmed) {
                self.handle_directive(directive, &mut cond_stack, src, line, ctx)?;
                continue;
            }
            if !cond_stack.enabled() {
                continue;
            }

            if let Some(rest) = after_keyword(trimmed, "use") {
                if !rest.trim_start().starts_with(['=', ':']) {
                    self.handle_metaknob(rest.trim(), src, line, ctx, depth)?;
                    continue;
                }
            }
            if let Some(rest) = after_keyword(trimmed, "include") {
                if !rest.trim_start().starts_with('=') {
                    match parse_include_spec(rest) {
                        Some((kind, spec)) => {
                            let spec = spec.to_string();
                            self.handle_include(kind, &spec, src, line, ctx, depth)?;
                        }
                        None => {
                            self.report(ConfigError::Parse {
                                source_name: self.display(src),
                                line,
                                kind: ParseErrorKind::MalformedInclude,
                            })?;
                        }
                    }
                    continue;
                }
            }

            self.handle_assignment(trimmed, src, line, ctx)?;
        }

        if cond_stack.inside_if() {
            self.report(ConfigError::Parse {
                source_name: self.display(src),
                line: last_line,
                kind: ParseErrorKind::UnclosedIf,
            })?;
        }
        Ok(())
    }

    fn eval_test(
        &mut self,
        expr: &str,
        src: SourceId,
        line: u32,
        ctx: &EvalContext,
    ) -> Result<bool, ConfigError> {
        match cond::eval_condition(expr, self.set, ctx, self.eval, self.options.version) {
            Ok(result) => Ok(result),
            Err(err) => {
                self.report(ConfigError::Parse {
                    source_name: self.display(src),
                    line,
                    kind: ParseErrorKind::BadCondition(expr.to_string(), err.to_string()),
                })?;
                Ok(false)
            }
        }
    }

    fn handle_directive(
        &mut self,
        directive: CondDirective<'_>,
        cond_stack: &mut ConditionalStack,
        src: SourceId,
        line: u32,
        ctx: &EvalContext,
    ) -> Result<(), ConfigError> {
        let result = match directive {
            CondDirective::If(expr) => {
                // Tests inside dead code are never evaluated.
                let test = if cond_stack.enabled() {
                    self.eval_test(expr, src, line, ctx)?
                } else {
                    false
                };
                cond_stack.begin_if(test)
            }
            CondDirective::Elif(expr) => {
                let test = if cond_stack.needs_test() && cond_stack.outer_enabled() {
                    self.eval_test(expr, src, line, ctx)?
                } else {
                    false
                };
                cond_stack.begin_elif(test)
            }
            CondDirective::Else => cond_stack.begin_else(),
            CondDirective::Endif => cond_stack.end_if(),
            CondDirective::Malformed(keyword) => Err(ParseErrorKind::BadCondition(
                keyword.to_string(),
                "unexpected text after keyword".to_string(),
            )),
        };
        if let Err(kind) = result {
            self.report(ConfigError::Parse {
                source_name: self.display(src),
                line,
                kind,
            })?;
        }
        Ok(())
    }

    fn handle_assignment(
        &mut self,
        line_text: &str,
        src: SourceId,
        line: u32,
        ctx: &EvalContext,
    ) -> Result<(), ConfigError> {
        let Some((name, op, value)) = split_assignment(line_text) else {
            return self.report(ConfigError::Parse {
                source_name: self.display(src),
                line,
                kind: ParseErrorKind::MissingOperator,
            });
        };
        if !is_valid_param_name(name) {
            return self.report(ConfigError::Parse {
                source_name: self.display(src),
                line,
                kind: ParseErrorKind::IllegalName(name.to_string()),
            });
        }
        if op == ':' {
            match self.options.colon_policy {
                ColonPolicy::Allow => {}
                ColonPolicy::Warn => {
                    warn!(
                        "{}, line {}: '{} : value' syntax is deprecated, use '='",
                        self.display(src),
                        line,
                        name
                    );
                }
                ColonPolicy::Reject => {
                    return self.report(ConfigError::Parse {
                        source_name: self.display(src),
                        line,
                        kind: ParseErrorKind::ColonAssignment(name.to_string()),
                    });
                }
            }
        }

        // Only self-references are resolved now; everything else stays raw
        // in the table and resolves at read time.
        let expanded = match MacroExpander::with_eval(self.set, self.eval)
            .expand_self(value, name, ctx)
        {
            Ok(expanded) => expanded,
            Err(error) => {
                return self.report(ConfigError::Eval {
                    source_name: self.display(src),
                    line,
                    error,
                });
            }
        };
        let source = self.source_ref(src, line);
        if let Err(error) = self.set.insert(name, &expanded, source, ctx) {
            return self.report(ConfigError::Eval {
                source_name: self.display(src),
                line,
                error,
            });
        }
        Ok(())
    }

    fn handle_metaknob(
        &mut self,
        rest: &str,
        src: SourceId,
        line: u32,
        ctx: &EvalContext,
        depth: usize,
    ) -> Result<(), ConfigError> {
        let (category, items) = match rest.split_once(':') {
            Some((category, items)) => (category.trim(), items),
            None => (rest.trim(), ""),
        };
        let items: Vec<&str> = items
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect();
        if category.is_empty() || items.is_empty() {
            return self.report(ConfigError::Parse {
                source_name: self.display(src),
                line,
                kind: ParseErrorKind::MetaknobItemRequired(category.to_string()),
            });
        }

        for item in items {
            let Some(fragment) = self.metaknobs.resolve(category, item) else {
                self.report(ConfigError::Parse {
                    source_name: self.display(src),
                    line,
                    kind: ParseErrorKind::UnknownMetaknob {
                        category: category.to_string(),
                        item: item.to_string(),
                    },
                })?;
                continue;
            };
            if depth + 1 > self.options.max_nesting {
                return Err(ConfigError::NestingTooDeep {
                    source_name: self.display(src),
                    line,
                    limit: self.options.max_nesting,
                });
            }
            let fragment = fragment.to_string();
            self.metaknob_count += 1;
            let saved_scope = self.metaknob_scope;
            self.metaknob_scope = Some(MetaknobScope {
                id: self.metaknob_count,
                src,
                use_line: line,
            });
            debug!(category, item, "expanding metaknob");

            let before = self.errors.len();
            let mut sub = LineReader::from_string(&fragment);
            let result = self.parse_source(&mut sub, src, ctx, depth + 1);
            self.metaknob_scope = saved_scope;

            // Errors from inside the body are reported against the
            // metaknob that triggered them.
            let tail = self.errors.split_off(before);
            self.errors
                .extend(tail.into_iter().map(|inner| ConfigError::Metaknob {
                    category: category.to_string(),
                    item: item.to_string(),
                    inner: Box::new(inner),
                }));
            if let Err(inner) = result {
                return Err(ConfigError::Metaknob {
                    category: category.to_string(),
                    item: item.to_string(),
                    inner: Box::new(inner),
                });
            }
        }
        Ok(())
    }

    fn handle_include(
        &mut self,
        kind: IncludeKind,
        spec: &str,
        src: SourceId,
        line: u32,
        ctx: &EvalContext,
        depth: usize,
    ) -> Result<(), ConfigError> {
        // Include targets may themselves use macros.
        let expanded = match MacroExpander::with_eval(self.set, self.eval).expand_all(spec, ctx) {
            Ok(expanded) => expanded,
            Err(error) => {
                return self.report(ConfigError::Eval {
                    source_name: self.display(src),
                    line,
                    error,
                });
            }
        };
        let trimmed = expanded.trim();
        let (kind, target) = match trimmed.strip_suffix('|') {
            Some(cmd) => (IncludeKind::Command, cmd.trim()),
            None => (kind, trimmed),
        };
        if depth + 1 > self.options.max_nesting {
            return Err(ConfigError::NestingTooDeep {
                source_name: self.display(src),
                line,
                limit: self.options.max_nesting,
            });
        }
        match self.opener.open(kind, target) {
            Err(error) => self.report(ConfigError::Include {
                source_name: self.display(src),
                line,
                included: target.to_string(),
                error,
            }),
            Ok(mut lines) => {
                let child =
                    self.set
                        .sources_mut()
                        .add(target, kind == IncludeKind::Command, true);
                debug!(source = target, "parsing include");
                self.parse_source(lines.as_mut(), child, ctx, depth + 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::NoDefaults;
    use crate::scope::lookup_macro;

    fn parse(text: &str) -> (MacroSet, Vec<ConfigError>) {
        let mut set = MacroSet::with_defaults(Box::new(NoDefaults));
        let mut parser = ConfigParser::new(&mut set);
        let ctx = EvalContext::default();
        parser.parse_str(text, "test.conf", &ctx).unwrap();
        let errors = parser.into_errors();
        (set, errors)
    }

    fn lookup(set: &MacroSet, name: &str) -> Option<String> {
        lookup_macro(name, set, &EvalContext::default()).map(str::to_string)
    }

    #[test]
    fn test_simple_assignments() {
        let (set, errors) = parse("FOO = bar\nBAZ=quux\n");
        assert!(errors.is_empty());
        assert_eq!(lookup(&set, "FOO").as_deref(), Some("bar"));
        assert_eq!(lookup(&set, "BAZ").as_deref(), Some("quux"));
    }

    #[test]
    fn test_last_wins() {
        let (set, _) = parse("FOO= bar\nFOO = baz\n");
        assert_eq!(lookup(&set, "FOO").as_deref(), Some("baz"));
    }

    #[test]
    fn test_self_substitution() {
        let (set, _) = parse("FOO= bar\nFOO = $(FOO) baz\n");
        assert_eq!(lookup(&set, "FOO").as_deref(), Some("bar baz"));
    }

    #[test]
    fn test_value_stored_raw_for_lazy_expansion() {
        let (set, _) = parse("A = 1\nB = $(A)\nA = 2\n");
        // B keeps the reference and resolves at read time.
        assert_eq!(set.find("B", None), Some("$(A)"));
        let expanded = MacroExpander::new(&set)
            .expand_all("$(B)", &EvalContext::default())
            .unwrap();
        assert_eq!(expanded, "2");
    }

    #[test]
    fn test_missing_operator_is_reported_and_skipped() {
        let (set, errors) = parse("not an assignment\nFOO = bar\n");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            ConfigError::Parse {
                kind: ParseErrorKind::MissingOperator,
                line: 1,
                ..
            }
        ));
        assert_eq!(lookup(&set, "FOO").as_deref(), Some("bar"));
    }

    #[test]
    fn test_illegal_name() {
        let (_, errors) = parse("FOO BAR = baz\n");
        assert!(matches!(
            errors[0],
            ConfigError::Parse {
                kind: ParseErrorKind::IllegalName(_),
                ..
            }
        ));
        let (_, errors) = parse("A.B.C = x\n");
        assert!(matches!(
            errors[0],
            ConfigError::Parse {
                kind: ParseErrorKind::IllegalName(_),
                ..
            }
        ));
    }

    #[test]
    fn test_colon_assignment_policies() {
        let (set, errors) = parse("FOO : bar\n");
        assert!(errors.is_empty());
        assert_eq!(lookup(&set, "FOO").as_deref(), Some("bar"));

        let mut set = MacroSet::with_defaults(Box::new(NoDefaults));
        let options = ParseOptions {
            colon_policy: ColonPolicy::Reject,
            ..ParseOptions::default()
        };
        let mut parser = ConfigParser::new(&mut set).with_options(options);
        parser
            .parse_str("FOO : bar\n", "test.conf", &EvalContext::default())
            .unwrap();
        assert!(matches!(
            parser.errors()[0],
            ConfigError::Parse {
                kind: ParseErrorKind::ColonAssignment(_),
                ..
            }
        ));
        assert!(set.is_empty());
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let (set, errors) = parse("# comment\n\n   \nFOO = bar\n  # indented comment\n");
        assert!(errors.is_empty());
        assert_eq!(set.len(), 1);
        assert_eq!(lookup(&set, "FOO").as_deref(), Some("bar"));
    }

    #[test]
    fn test_conditional_first_branch() {
        let (set, _) = parse("if 1\nA=1\nelif 1\nA=2\nelse\nA=3\nendif\n");
        assert_eq!(lookup(&set, "A").as_deref(), Some("1"));
    }

    #[test]
    fn test_conditional_elif_branch() {
        let (set, _) = parse("if 0\nA=1\nelif 1\nA=2\nelse\nA=3\nendif\n");
        assert_eq!(lookup(&set, "A").as_deref(), Some("2"));
    }

    #[test]
    fn test_conditional_else_branch() {
        let (set, _) = parse("if 0\nA=1\nelif 0\nA=2\nelse\nA=3\nendif\n");
        assert_eq!(lookup(&set, "A").as_deref(), Some("3"));
    }

    #[test]
    fn test_unmatched_endif_is_structural_error() {
        let (set, errors) = parse("endif\nA = 1\n");
        assert!(matches!(
            errors[0],
            ConfigError::Parse {
                kind: ParseErrorKind::EndifWithoutIf,
                ..
            }
        ));
        assert_eq!(lookup(&set, "A").as_deref(), Some("1"));
    }

    #[test]
    fn test_unclosed_if_reported() {
        let (_, errors) = parse("if 1\nA = 1\n");
        assert!(matches!(
            errors[0],
            ConfigError::Parse {
                kind: ParseErrorKind::UnclosedIf,
                ..
            }
        ));
    }

    #[test]
    fn test_nested_conditionals() {
        let input = "if 1\n  if 0\n    A = inner\n  else\n    A = outer\n  endif\nendif\n";
        let (set, errors) = parse(input);
        assert!(errors.is_empty());
        assert_eq!(lookup(&set, "A").as_deref(), Some("outer"));
    }

    #[test]
    fn test_dead_branch_tests_not_evaluated() {
        // The inner condition is garbage but sits in dead code.
        let input = "if 0\nif $CHOICE(99,a)\nA = 1\nendif\nendif\n";
        let (_, errors) = parse(input);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn test_defined_condition() {
        let (set, _) = parse("FOO = 1\nif defined FOO\nA = yes\nelse\nA = no\nendif\n");
        assert_eq!(lookup(&set, "A").as_deref(), Some("yes"));
        let (set, _) = parse("if defined NOPE\nA = yes\nelse\nA = no\nendif\n");
        assert_eq!(lookup(&set, "A").as_deref(), Some("no"));
    }

    #[test]
    fn test_metaknob_expands_assignments() {
        let mut set = MacroSet::with_defaults(Box::new(NoDefaults));
        let mut parser = ConfigParser::new(&mut set);
        parser
            .parse_str(
                "use POLICY : Always_Run_Jobs\n",
                "test.conf",
                &EvalContext::default(),
            )
            .unwrap();
        assert!(parser.errors().is_empty());
        drop(parser);
        assert_eq!(set.find("START", None), Some("true"));
        assert_eq!(set.find("PREEMPT", None), Some("false"));
        let (_, _, meta) = set
            .iter()
            .find(|(name, _, _)| name.eq_ignore_ascii_case("START"))
            .unwrap();
        let knob = meta.metaknob.unwrap();
        assert_eq!(knob.id, 1);
        assert!(knob.offset >= 1);
    }

    #[test]
    fn test_metaknob_multiple_items() {
        let mut set = MacroSet::with_defaults(Box::new(NoDefaults));
        let mut parser = ConfigParser::new(&mut set);
        parser
            .parse_str(
                "use ROLE : Execute, Submit\n",
                "test.conf",
                &EvalContext::default(),
            )
            .unwrap();
        assert!(parser.errors().is_empty());
        drop(parser);
        // Execute appends STARTD, then Submit appends SCHEDD to the result.
        assert_eq!(set.find("DAEMON_LIST", None), Some(" STARTD SCHEDD"));
    }

    #[test]
    fn test_unknown_metaknob_reports_category_and_item() {
        let (_, errors) = parse("use ROLE : NoSuchThing\n");
        let msg = errors[0].to_string();
        assert!(msg.contains("ROLE"));
        assert!(msg.contains("NoSuchThing"));
    }

    #[test]
    fn test_metaknob_without_items() {
        let (_, errors) = parse("use ROLE\n");
        assert!(matches!(
            errors[0],
            ConfigError::Parse {
                kind: ParseErrorKind::MetaknobItemRequired(_),
                ..
            }
        ));
    }

    #[test]
    fn test_use_as_plain_knob_name_still_assigns() {
        let (set, errors) = parse("use = 5\n");
        assert!(errors.is_empty());
        assert_eq!(lookup(&set, "use").as_deref(), Some("5"));
    }

    #[test]
    fn test_metaknob_errors_are_wrapped() {
        struct BrokenKnobs;
        impl MetaknobService for BrokenKnobs {
            fn resolve(&self, _: &str, _: &str) -> Option<&str> {
                Some("this line has no operator\n")
            }
        }
        let mut set = MacroSet::with_defaults(Box::new(NoDefaults));
        let mut parser = ConfigParser::new(&mut set).with_metaknobs(&BrokenKnobs);
        parser
            .parse_str("use ROLE : Execute\n", "test.conf", &EvalContext::default())
            .unwrap();
        let errors = parser.into_errors();
        assert!(matches!(errors[0], ConfigError::Metaknob { .. }));
        assert!(errors[0].to_string().starts_with("use ROLE:Execute"));
    }

    #[test]
    fn test_eval_error_surfaces_at_read_time() {
        use crate::error::EvalError;

        // Parsing stores the raw value; the bad reference only fails the
        // read that expands it, not the pass.
        let (set, errors) = parse("A = $CHOICE(9,x,y)\nB = fine\n");
        assert!(errors.is_empty());
        let result = MacroExpander::new(&set).expand_all("$(A)", &EvalContext::default());
        assert!(matches!(
            result,
            Err(EvalError::ChoiceOutOfRange { index: 9, count: 2 })
        ));
        assert_eq!(lookup(&set, "B").as_deref(), Some("fine"));
    }

    #[test]
    fn test_stop_on_error() {
        let mut set = MacroSet::with_defaults(Box::new(NoDefaults));
        let options = ParseOptions {
            stop_on_error: true,
            ..ParseOptions::default()
        };
        let mut parser = ConfigParser::new(&mut set).with_options(options);
        let result = parser.parse_str(
            "garbage line\nFOO = bar\n",
            "test.conf",
            &EvalContext::default(),
        );
        assert!(result.is_err());
        drop(parser);
        assert!(set.is_empty());
    }

    #[test]
    fn test_source_and_line_recorded() {
        let (set, _) = parse("\n\nFOO = bar\n");
        let (_, _, meta) = set.iter().next().unwrap();
        assert_eq!(meta.source_line, 3);
        assert_eq!(set.sources().display_name(meta.source_id), "test.conf");
    }
}
