//! knobset command-line tool.
//!
//! Parses one or more config sources and then queries or dumps the
//! resulting macro table the way a consuming daemon would see it.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use knobset::detect::{ENV_PREFIX, seed_detected, seed_environment};
use knobset::expand::MacroExpander;
use knobset::parse::{ColonPolicy, ConfigParser, ParseOptions};
use knobset::scope::{EvalContext, REF_COUNT, USE_COUNT, lookup_macro};
use knobset::table::MacroSet;
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Layered macro-expansion engine for cluster configuration files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config source: a file path, or a command ending in '|' (repeatable)
    #[arg(short, long = "config", global = true)]
    config: Vec<String>,

    /// Subsystem scope for lookups (e.g. MASTER)
    #[arg(short, long, global = true)]
    subsystem: Option<String>,

    /// Instance-specific local-name scope, more specific than --subsystem
    #[arg(short, long, global = true)]
    local_name: Option<String>,

    /// Stop at the first parse error instead of collecting and continuing
    #[arg(long, global = true)]
    strict: bool,

    /// Reject the deprecated 'name : value' assignment syntax
    #[arg(long, global = true)]
    reject_colon: bool,

    /// Skip seeding detected values and KNOBSET_* environment overrides
    #[arg(long, global = true)]
    bare: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up knobs and print their expanded values
    Get {
        /// Knob names, optionally scoped (SUBSYS.NAME)
        #[arg(required = true)]
        names: Vec<String>,

        /// Print raw table values without expanding references
        #[arg(long)]
        raw: bool,
    },

    /// Dump the whole table (default when no subcommand is given)
    Dump {
        /// Only show knobs whose name matches this pattern
        pattern: Option<String>,

        /// Emit JSON with per-entry metadata instead of name = value lines
        #[arg(long)]
        json: bool,
    },

    /// Expand macro references in an arbitrary string
    Expand { text: String },
}

/// One table entry in `dump --json` output.
#[derive(Serialize)]
struct DumpEntry<'a> {
    name: &'a str,
    raw_value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    source: &'a str,
    line: u32,
    use_count: u32,
    ref_count: u32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.config.is_empty() {
        bail!("no config sources; pass at least one --config <FILE|COMMAND|>");
    }

    let mut set = MacroSet::new();
    if !cli.bare {
        seed_detected(&mut set);
        seed_environment(&mut set, ENV_PREFIX);
    }

    let cwd = std::env::current_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut ctx = EvalContext::new().with_cwd(&cwd);
    if let Some(subsystem) = cli.subsystem.as_deref() {
        ctx = ctx.with_subsys(subsystem);
    }
    if let Some(local_name) = cli.local_name.as_deref() {
        ctx = ctx.with_local_name(local_name);
    }

    let options = ParseOptions {
        stop_on_error: cli.strict,
        colon_policy: if cli.reject_colon {
            ColonPolicy::Reject
        } else {
            ColonPolicy::Warn
        },
        ..ParseOptions::default()
    };

    let error_count = {
        let mut parser = ConfigParser::new(&mut set).with_options(options);
        for source in &cli.config {
            parser
                .parse_path(source, &ctx)
                .with_context(|| format!("failed to parse {source}"))?;
        }
        for err in parser.errors() {
            eprintln!("{err}");
        }
        parser.errors().len()
    };
    set.optimize();

    match cli.command.unwrap_or(Command::Dump {
        pattern: None,
        json: false,
    }) {
        Command::Get { names, raw } => {
            let query_ctx = ctx.with_use_mask(USE_COUNT | REF_COUNT);
            for name in &names {
                match lookup_macro(name, &set, &query_ctx) {
                    None => bail!("{name} is not defined"),
                    Some(value) if raw => println!("{value}"),
                    Some(value) => {
                        let expanded = MacroExpander::new(&set)
                            .expand_all(value, &ctx)
                            .with_context(|| format!("failed to expand {name}"))?;
                        println!("{expanded}");
                    }
                }
            }
        }
        Command::Dump { pattern, json } => {
            let matcher = match pattern.as_deref() {
                Some(p) => Some(
                    regex_lite::Regex::new(&format!("(?i){p}"))
                        .with_context(|| format!("bad dump pattern '{p}'"))?,
                ),
                None => None,
            };
            let expander = MacroExpander::new(&set);
            let mut entries = Vec::new();
            for (name, raw_value, meta) in set.iter() {
                if matcher.as_ref().is_some_and(|m| !m.is_match(name)) {
                    continue;
                }
                if json {
                    let value = match expander.expand_all(raw_value, &ctx) {
                        Ok(value) => Some(value),
                        Err(err) => {
                            warn!("{name} does not expand: {err}");
                            None
                        }
                    };
                    entries.push(DumpEntry {
                        name,
                        raw_value,
                        value,
                        source: set.sources().display_name(meta.source_id),
                        line: meta.source_line,
                        use_count: meta.use_count.get(),
                        ref_count: meta.ref_count.get(),
                    });
                } else {
                    println!("{name} = {raw_value}");
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
        }
        Command::Expand { text } => {
            let expanded = MacroExpander::new(&set)
                .expand_all(&text, &ctx)
                .context("expansion failed")?;
            println!("{expanded}");
        }
    }

    if error_count > 0 {
        bail!("{error_count} config error(s)");
    }
    Ok(())
}
