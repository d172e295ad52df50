//! Table pre-population: detected values and environment overrides.
//!
//! Before any config file is read, the table is seeded with values the
//! engine can detect on its own (registered under the `<Detected>` source)
//! and with overrides taken from process environment variables carrying the
//! reserved prefix (under `<Environment>`).

use tracing::{debug, warn};

use crate::scope::EvalContext;
use crate::source::{DETECTED_SOURCE, ENVIRONMENT_SOURCE, SourceRef};
use crate::table::MacroSet;

/// Environment variables with this prefix become macro overrides:
/// `KNOBSET_COLLECTOR_HOST=x` sets `COLLECTOR_HOST = x`.
pub const ENV_PREFIX: &str = "KNOBSET_";

/// Seed detected values: `TILDE` (home directory) and `HOSTNAME`.
pub fn seed_detected(set: &mut MacroSet) {
    let ctx = EvalContext::default();
    let src = SourceRef::new(DETECTED_SOURCE, 0);

    if let Some(home) = dirs::home_dir() {
        let home = home.to_string_lossy();
        if let Err(err) = set.insert("TILDE", &home, src, &ctx) {
            warn!("failed to seed TILDE: {err}");
        }
    }

    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    if let Err(err) = set.insert("HOSTNAME", &hostname, src, &ctx) {
        warn!("failed to seed HOSTNAME: {err}");
    }
}

/// Seed overrides from environment variables beginning with `prefix`.
pub fn seed_environment(set: &mut MacroSet, prefix: &str) {
    let ctx = EvalContext::default();
    let src = SourceRef::new(ENVIRONMENT_SOURCE, 0);
    for (key, value) in std::env::vars() {
        let Some(name) = key.strip_prefix(prefix) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        debug!(name, "environment override");
        if let Err(err) = set.insert(name, &value, src, &ctx) {
            warn!("ignoring environment override {key}: {err}");
        }
    }
}
