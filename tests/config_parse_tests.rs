//! Integration tests for the config parser: includes, metaknobs,
//! conditionals, and error collection over real files.

use knobset::error::{ConfigError, ParseErrorKind};
use knobset::parse::{ConfigParser, ParseOptions};
use knobset::scope::{EvalContext, lookup_macro};
use knobset::table::MacroSet;
use tempfile::TempDir;

fn parse_text(text: &str) -> (MacroSet, Vec<ConfigError>) {
    let mut set = MacroSet::new();
    let mut parser = ConfigParser::new(&mut set);
    parser
        .parse_str(text, "test.conf", &EvalContext::default())
        .expect("parse should not be fatal");
    let errors = parser.into_errors();
    (set, errors)
}

fn lookup(set: &MacroSet, name: &str) -> Option<String> {
    lookup_macro(name, set, &EvalContext::default()).map(str::to_string)
}

#[test]
fn test_scope_precedence_through_parse() {
    let (set, errors) = parse_text("FOO = bar\nMASTER.FOO = mar\n");
    assert!(errors.is_empty());
    let master = EvalContext::default().with_subsys("MASTER");
    let schedd = EvalContext::default().with_subsys("SCHEDD");
    assert_eq!(lookup_macro("FOO", &set, &master), Some("mar"));
    assert_eq!(lookup_macro("FOO", &set, &schedd), Some("bar"));
}

#[test]
fn test_self_substitution_with_scopes() {
    // The self-reference picks up the subsystem-scoped value when the
    // parse runs under that subsystem.
    let input = "FOO=bar\nMASTER.FOO= MAR\nFOO = $(FOO) baz\n";

    let (set, _) = parse_text(input);
    assert_eq!(set.find("FOO", None), Some("bar baz"));
    assert_eq!(set.find("FOO", Some("MASTER")), Some("MAR"));

    let mut set = MacroSet::new();
    let ctx = EvalContext::default().with_subsys("MASTER");
    let mut parser = ConfigParser::new(&mut set);
    parser.parse_str(input, "test.conf", &ctx).unwrap();
    drop(parser);
    assert_eq!(set.find("FOO", None), Some("MAR baz"));
}

#[test]
fn test_include_file() {
    let dir = TempDir::new().unwrap();
    let inc = dir.path().join("extra.conf");
    std::fs::write(&inc, "FROM_INCLUDE = yes\n").unwrap();

    let main = format!("LOCAL = 1\ninclude : {}\n", inc.display());
    let (set, errors) = parse_text(&main);
    assert!(errors.is_empty(), "unexpected: {errors:?}");
    assert_eq!(lookup(&set, "FROM_INCLUDE").as_deref(), Some("yes"));
    assert_eq!(lookup(&set, "LOCAL").as_deref(), Some("1"));

    // Entries from the nested source are flagged as inside an include.
    let inside = |name: &str| {
        set.iter()
            .find(|(n, _, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, _, meta)| meta.is_inside)
            .unwrap()
    };
    assert!(inside("FROM_INCLUDE"));
    assert!(!inside("LOCAL"));
}

#[test]
fn test_include_target_is_macro_expanded() {
    let dir = TempDir::new().unwrap();
    let inc = dir.path().join("sub.conf");
    std::fs::write(&inc, "NESTED = here\n").unwrap();

    let main = format!(
        "CONF_DIR = {}\ninclude : $(CONF_DIR)/sub.conf\n",
        dir.path().display()
    );
    let (set, errors) = parse_text(&main);
    assert!(errors.is_empty(), "unexpected: {errors:?}");
    assert_eq!(lookup(&set, "NESTED").as_deref(), Some("here"));
}

#[test]
fn test_include_command() {
    let (set, errors) = parse_text("include command : echo PIPED = 12\n");
    assert!(errors.is_empty(), "unexpected: {errors:?}");
    assert_eq!(lookup(&set, "PIPED").as_deref(), Some("12"));
}

#[test]
fn test_include_missing_file_is_reported_not_fatal() {
    let (set, errors) = parse_text("include : /no/such/file.conf\nAFTER = 1\n");
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ConfigError::Include { .. }));
    assert!(errors[0].to_string().contains("/no/such/file.conf"));
    assert_eq!(lookup(&set, "AFTER").as_deref(), Some("1"));
}

#[test]
fn test_include_recursion_limit_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("loop.conf");
    std::fs::write(&path, format!("include : {}\n", path.display())).unwrap();

    let mut set = MacroSet::new();
    let mut parser = ConfigParser::new(&mut set);
    let result = parser.parse_path(&path.display().to_string(), &EvalContext::default());
    assert!(matches!(result, Err(ConfigError::NestingTooDeep { .. })));
}

#[test]
fn test_metaknob_with_defaults() {
    // DAEMON_LIST defaults to MASTER; the role bundles append to it.
    let (set, errors) = parse_text("use ROLE : Personal\n");
    assert!(errors.is_empty(), "unexpected: {errors:?}");
    assert_eq!(
        lookup(&set, "DAEMON_LIST").as_deref(),
        Some("MASTER COLLECTOR NEGOTIATOR STARTD SCHEDD")
    );
    assert_eq!(lookup(&set, "CENTRAL_MANAGER").as_deref(), Some("127.0.0.1"));
}

#[test]
fn test_metaknob_error_names_the_knob_and_item() {
    let (_, errors) = parse_text("use FEATURE : NotAThing\n");
    assert_eq!(errors.len(), 1);
    let msg = errors[0].to_string();
    assert!(msg.contains("FEATURE"), "got: {msg}");
    assert!(msg.contains("NotAThing"), "got: {msg}");
}

#[test]
fn test_conditionals_gate_metaknobs_and_includes() {
    let (set, errors) = parse_text(
        "if false\nuse ROLE : Personal\ninclude : /no/such/file\nendif\nA = 1\n",
    );
    assert!(errors.is_empty(), "unexpected: {errors:?}");
    assert_eq!(lookup(&set, "NETWORK_INTERFACE"), None);
    assert_eq!(lookup(&set, "A").as_deref(), Some("1"));
}

#[test]
fn test_conditional_version_test() {
    let mut set = MacroSet::new();
    let options = ParseOptions {
        version: (9, 4, 1),
        ..ParseOptions::default()
    };
    let mut parser = ConfigParser::new(&mut set).with_options(options);
    parser
        .parse_str(
            "if version >= 9.0\nNEW_STYLE = 1\nelse\nNEW_STYLE = 0\nendif\n",
            "test.conf",
            &EvalContext::default(),
        )
        .unwrap();
    assert!(parser.errors().is_empty());
    drop(parser);
    assert_eq!(set.find("NEW_STYLE", None), Some("1"));
}

#[test]
fn test_continuation_lines_join() {
    let (set, errors) = parse_text("LIST = one, \\\ntwo, \\\nthree\n");
    assert!(errors.is_empty());
    assert_eq!(lookup(&set, "LIST").as_deref(), Some("one, two, three"));
}

#[test]
fn test_errors_carry_source_name_and_line() {
    let (_, errors) = parse_text("GOOD = 1\n???\n");
    assert_eq!(errors.len(), 1);
    let msg = errors[0].to_string();
    assert!(msg.contains("test.conf"), "got: {msg}");
    assert!(msg.contains("line 2"), "got: {msg}");
}

#[test]
fn test_multiple_errors_collected() {
    let (set, errors) = parse_text("bad line one\nGOOD = 1\nendif\nuse ROLE\n");
    assert_eq!(errors.len(), 3);
    assert_eq!(lookup(&set, "GOOD").as_deref(), Some("1"));
    assert!(matches!(
        errors[1],
        ConfigError::Parse {
            kind: ParseErrorKind::EndifWithoutIf,
            ..
        }
    ));
}

#[test]
fn test_default_matching_assignment_not_stored() {
    // VANILLA's built-in default is 5: assigning exactly that is skipped,
    // the value stays reachable through the defaults service.
    let (set, _) = parse_text("VANILLA = 5\n");
    assert_eq!(set.find("VANILLA", None), None);
    assert_eq!(lookup(&set, "VANILLA").as_deref(), Some("5"));
}

#[test]
fn test_optimize_between_loads() {
    let mut set = MacroSet::new();
    let ctx = EvalContext::default();
    let mut parser = ConfigParser::new(&mut set);
    parser.parse_str("A = 1\nB = 2\nC = 3\n", "one.conf", &ctx).unwrap();
    drop(parser);
    set.optimize();
    let mut parser = ConfigParser::new(&mut set);
    parser.parse_str("B = 20\nD = 4\n", "two.conf", &ctx).unwrap();
    drop(parser);

    assert_eq!(set.find("A", None), Some("1"));
    assert_eq!(set.find("B", None), Some("20"));
    assert_eq!(set.find("D", None), Some("4"));
}

#[test]
fn test_table_reset_between_reconfigures() {
    let mut set = MacroSet::new();
    let ctx = EvalContext::default();
    let mut parser = ConfigParser::new(&mut set);
    parser.parse_str("A = 1\n", "one.conf", &ctx).unwrap();
    drop(parser);
    set.clear();
    assert!(set.is_empty());
    let mut parser = ConfigParser::new(&mut set);
    parser.parse_str("B = 2\n", "two.conf", &ctx).unwrap();
    drop(parser);
    assert_eq!(set.find("A", None), None);
    assert_eq!(set.find("B", None), Some("2"));
}
