//! Provenance tracking for config declarations.
//!
//! Every macro inserted into the table records which source it came from and
//! at which line, so diagnostics and the `dump` tool can say where a value
//! was set. A small fixed set of synthetic sources is pre-registered for
//! values that do not come from any file.

use serde::Serialize;

/// Identifier of a registered [`MacroSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceId(pub(crate) u32);

/// Values detected at startup (hostname, home directory).
pub const DETECTED_SOURCE: SourceId = SourceId(0);
/// Values that come from the built-in defaults table.
pub const DEFAULT_SOURCE: SourceId = SourceId(1);
/// Values taken from process environment overrides.
pub const ENVIRONMENT_SOURCE: SourceId = SourceId(2);
/// Runtime overrides applied after the normal pass.
pub const OVER_SOURCE: SourceId = SourceId(3);

/// One origin of config declarations: a file, a piped command, a metaknob
/// body, or one of the synthetic sources above.
#[derive(Debug, Clone, Serialize)]
pub struct MacroSource {
    pub id: SourceId,
    /// Filename, command line, or synthetic tag.
    pub display_name: String,
    /// Line counter, updated as the source is consumed.
    pub line: u32,
    /// True if this source is a subprocess pipe rather than a file.
    pub is_command: bool,
    /// True if this source was reached through a nested `include`.
    pub is_inside: bool,
}

/// Position a macro was declared at, handed to
/// [`crate::table::MacroSet::insert`] by the parser.
#[derive(Debug, Clone, Copy)]
pub struct SourceRef {
    pub id: SourceId,
    pub line: u32,
    /// Set only while expanding inside a metaknob body.
    pub metaknob: Option<MetaknobRef>,
}

impl SourceRef {
    pub fn new(id: SourceId, line: u32) -> Self {
        Self {
            id,
            line,
            metaknob: None,
        }
    }
}

/// Which metaknob expansion a declaration came from: `id` is the ordinal of
/// the `use` directive within the pass, `offset` the line within its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaknobRef {
    pub id: u32,
    pub offset: u32,
}

/// Registry of every source consulted during a config pass.
#[derive(Debug)]
pub struct SourceTable {
    sources: Vec<MacroSource>,
}

impl SourceTable {
    /// Create a registry with the synthetic sources pre-registered at their
    /// reserved ids.
    pub fn new() -> Self {
        let mut table = Self {
            sources: Vec::new(),
        };
        for name in ["<Detected>", "<Default>", "<Environment>", "<Over>"] {
            let id = SourceId(table.sources.len() as u32);
            table.sources.push(MacroSource {
                id,
                display_name: name.to_string(),
                line: 0,
                is_command: false,
                is_inside: false,
            });
        }
        table
    }

    /// Register a new file or command source and return its id.
    pub fn add(&mut self, display_name: &str, is_command: bool, is_inside: bool) -> SourceId {
        let id = SourceId(self.sources.len() as u32);
        self.sources.push(MacroSource {
            id,
            display_name: display_name.to_string(),
            line: 0,
            is_command,
            is_inside,
        });
        id
    }

    pub fn get(&self, id: SourceId) -> &MacroSource {
        &self.sources[id.0 as usize]
    }

    pub fn set_line(&mut self, id: SourceId, line: u32) {
        self.sources[id.0 as usize].line = line;
    }

    /// Display name for diagnostics.
    pub fn display_name(&self, id: SourceId) -> &str {
        &self.sources[id.0 as usize].display_name
    }

    pub fn iter(&self) -> impl Iterator<Item = &MacroSource> {
        self.sources.iter()
    }
}

impl Default for SourceTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_sources_reserved() {
        let table = SourceTable::new();
        assert_eq!(table.display_name(DETECTED_SOURCE), "<Detected>");
        assert_eq!(table.display_name(DEFAULT_SOURCE), "<Default>");
        assert_eq!(table.display_name(ENVIRONMENT_SOURCE), "<Environment>");
        assert_eq!(table.display_name(OVER_SOURCE), "<Over>");
    }

    #[test]
    fn test_add_assigns_fresh_ids() {
        let mut table = SourceTable::new();
        let a = table.add("/etc/cluster/root.conf", false, false);
        let b = table.add("probe_node |", true, true);
        assert_ne!(a, b);
        assert!(!table.get(a).is_command);
        assert!(table.get(b).is_command);
        assert!(table.get(b).is_inside);
    }
}
