//! Read-only lookup of built-in parameter defaults.
//!
//! The defaults table describes every parameter the toolkit knows about.
//! The engine consumes it through the [`DefaultsService`] trait so tests and
//! embedders can substitute their own table; the shipped [`ParamDefaults`]
//! wraps a `const` sorted slice and binary-searches it.

use std::cmp::Ordering;

/// Case-insensitive (ASCII) ordering for parameter names. This is the one
/// ordering used everywhere keys are sorted or compared.
pub(crate) fn cmp_param_names(a: &str, b: &str) -> Ordering {
    let mut ai = a.bytes().map(|c| c.to_ascii_lowercase());
    let mut bi = b.bytes().map(|c| c.to_ascii_lowercase());
    loop {
        match (ai.next(), bi.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match x.cmp(&y) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

/// A successful defaults lookup: the table index (stored in macro metadata
/// to link an entry back to its default) and the default value text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultHit<'a> {
    pub id: usize,
    pub value: &'a str,
}

/// Read-only defaults lookup service.
pub trait DefaultsService {
    /// Look up a bare parameter name.
    fn lookup(&self, name: &str) -> Option<DefaultHit<'_>>;

    /// Look up a subsystem- or local-name-scoped parameter.
    fn lookup_scoped(&self, prefix: &str, name: &str) -> Option<DefaultHit<'_>> {
        let key = format!("{prefix}.{name}");
        self.lookup(&key)
    }
}

/// Defaults table for the shipped parameter set.
///
/// Entries must be sorted by [`cmp_param_names`]; scoped defaults use a
/// `SUBSYS.NAME` key. Construction is checked in debug builds.
pub struct ParamDefaults {
    table: &'static [(&'static str, &'static str)],
}

/// Built-in parameter defaults. Values may reference other parameters; they
/// are expanded lazily at read time like any other raw value.
const BUILTIN_DEFAULTS: &[(&str, &str)] = &[
    ("BIN", "$(RELEASE_DIR)/bin"),
    ("CENTRAL_MANAGER", "central-manager"),
    ("COLLECTOR_HOST", "$(CENTRAL_MANAGER)"),
    ("DAEMON_LIST", "MASTER"),
    ("HISTORY", "$(SPOOL)/history"),
    ("LOCAL_DIR", "$(TILDE)"),
    ("LOG", "$(LOCAL_DIR)/log"),
    ("MASTER", "$(SBIN)/cluster_master"),
    ("MASTER.PID_SNAPSHOT_INTERVAL", "60"),
    ("MASTER.UPDATE_INTERVAL", "300"),
    ("MAX_JOB_RETIREMENT_TIME", "0"),
    ("NEGOTIATOR_INTERVAL", "60"),
    ("PID_SNAPSHOT_INTERVAL", "15"),
    ("RELEASE_DIR", "/usr"),
    ("RUN", "$(LOCAL_DIR)/run"),
    ("SBIN", "$(RELEASE_DIR)/sbin"),
    ("SPOOL", "$(LOCAL_DIR)/spool"),
    ("STANDARD", "1"),
    ("UPDATE_INTERVAL", "300"),
    ("VANILLA", "5"),
];

impl ParamDefaults {
    /// The shipped defaults table.
    pub fn builtin() -> Self {
        Self::new(BUILTIN_DEFAULTS)
    }

    /// Wrap a caller-supplied sorted table.
    pub fn new(table: &'static [(&'static str, &'static str)]) -> Self {
        debug_assert!(
            table
                .windows(2)
                .all(|w| cmp_param_names(w[0].0, w[1].0) == Ordering::Less),
            "defaults table must be sorted case-insensitively with unique keys"
        );
        Self { table }
    }
}

impl DefaultsService for ParamDefaults {
    fn lookup(&self, name: &str) -> Option<DefaultHit<'_>> {
        let idx = self
            .table
            .binary_search_by(|(key, _)| cmp_param_names(key, name))
            .ok()?;
        Some(DefaultHit {
            id: idx,
            value: self.table[idx].1,
        })
    }
}

/// Empty defaults, for tests and for tools that want the table contents
/// only.
pub struct NoDefaults;

impl DefaultsService for NoDefaults {
    fn lookup(&self, _name: &str) -> Option<DefaultHit<'_>> {
        None
    }
}
