//! The macro symbol table.
//!
//! A [`MacroSet`] is an ordered collection of (key, raw value) pairs with
//! parallel per-entry metadata. Keys are case-insensitive and may carry a
//! `SUBSYS.NAME` prefix; re-declaring a key replaces the raw value (last
//! wins). Entries `[0, sorted_prefix)` are kept in case-insensitive key
//! order and binary-searched; recent appends sit in an unsorted suffix that
//! is scanned linearly until [`MacroSet::optimize`] folds it in.
//!
//! Raw values are stored partially expanded: only self-references are
//! resolved at insert time, everything else is resolved lazily at read time
//! by the expander.

use std::cell::Cell;

use crate::arena::{ArenaId, StringArena};
use crate::defaults::{DefaultsService, ParamDefaults, cmp_param_names};
use crate::error::EvalResult;
use crate::expand::MacroExpander;
use crate::scope::EvalContext;
use crate::source::{MetaknobRef, SourceId, SourceRef, SourceTable};

/// One macro: interned key and raw (partially expanded) value.
#[derive(Debug, Clone, Copy)]
pub struct MacroItem {
    key: ArenaId,
    raw_value: ArenaId,
}

/// Per-entry bookkeeping, parallel to [`MacroItem`].
#[derive(Debug, Clone)]
pub struct MacroMeta {
    pub source_id: SourceId,
    pub source_line: u32,
    /// Set only for entries declared inside a metaknob body.
    pub metaknob: Option<MetaknobRef>,
    /// Times the value was handed to a consumer.
    pub use_count: Cell<u32>,
    /// Times the macro was referenced during expansion of another value.
    pub ref_count: Cell<u32>,
    /// True if the declared value was textually identical to the default.
    pub matches_default: bool,
    /// Link into the defaults table, when a default with this name exists.
    pub default_id: Option<usize>,
    /// True if declared while unwinding a nested `include`.
    pub is_inside: bool,
}

/// Paths compare case-insensitively on Windows, so a re-declared default is
/// still "the same value" there even if the case changed.
#[cfg(windows)]
fn values_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(not(windows))]
fn values_match(a: &str, b: &str) -> bool {
    a == b
}

/// The macro symbol table for one config pass.
pub struct MacroSet {
    arena: StringArena,
    items: Vec<MacroItem>,
    metas: Vec<MacroMeta>,
    sources: SourceTable,
    sorted_prefix: usize,
    /// Keep entries whose value matches their default instead of skipping
    /// them (the default is reachable through the defaults service anyway).
    retain_defaults: bool,
    defaults: Box<dyn DefaultsService>,
}

impl std::fmt::Debug for MacroSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacroSet")
            .field("len", &self.items.len())
            .field("sorted_prefix", &self.sorted_prefix)
            .finish()
    }
}

impl MacroSet {
    /// A fresh table backed by the built-in defaults.
    pub fn new() -> Self {
        Self::with_defaults(Box::new(ParamDefaults::builtin()))
    }

    /// A fresh table backed by a caller-supplied defaults service.
    pub fn with_defaults(defaults: Box<dyn DefaultsService>) -> Self {
        Self {
            arena: StringArena::new(),
            items: Vec::new(),
            metas: Vec::new(),
            sources: SourceTable::new(),
            sorted_prefix: 0,
            retain_defaults: false,
            defaults,
        }
    }

    /// Keep entries even when their value matches the default.
    pub fn retain_defaults(mut self, keep: bool) -> Self {
        self.retain_defaults = keep;
        self
    }

    pub fn defaults(&self) -> &dyn DefaultsService {
        self.defaults.as_ref()
    }

    pub fn sources(&self) -> &SourceTable {
        &self.sources
    }

    pub fn sources_mut(&mut self) -> &mut SourceTable {
        &mut self.sources
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find the raw value stored for `name`, optionally under a scope
    /// prefix. Compares case-insensitively; searches the sorted region with
    /// binary search, then the unsorted suffix linearly.
    pub fn find(&self, name: &str, prefix: Option<&str>) -> Option<&str> {
        let idx = match prefix {
            Some(p) => self.find_entry(&format!("{p}.{name}"))?,
            None => self.find_entry(name)?,
        };
        Some(self.arena.get(self.items[idx].raw_value))
    }

    pub(crate) fn find_entry(&self, key: &str) -> Option<usize> {
        let sorted = &self.items[..self.sorted_prefix];
        if let Ok(i) = sorted.binary_search_by(|item| {
            cmp_param_names(self.arena.get(item.key), key)
        }) {
            return Some(i);
        }
        self.items[self.sorted_prefix..]
            .iter()
            .position(|item| {
                cmp_param_names(self.arena.get(item.key), key) == std::cmp::Ordering::Equal
            })
            .map(|p| p + self.sorted_prefix)
    }

    pub(crate) fn entry_value(&self, idx: usize) -> &str {
        self.arena.get(self.items[idx].raw_value)
    }

    /// Insert or replace a macro.
    ///
    /// Self-references in `value` are expanded against the macro's current
    /// value first, so `FOO = $(FOO) extra` grows the existing text. For an
    /// existing key the raw value is replaced only if it actually changed,
    /// but the metadata is refreshed either way. A brand-new entry whose
    /// value matches its default is skipped entirely unless the table was
    /// configured to retain those.
    pub fn insert(
        &mut self,
        name: &str,
        value: &str,
        source: SourceRef,
        ctx: &EvalContext,
    ) -> EvalResult<()> {
        let expanded = if value.contains('$') {
            MacroExpander::new(self).expand_self(value, name, ctx)?
        } else {
            value.to_string()
        };
        let is_inside = self.sources.get(source.id).is_inside;
        let default_hit = match name.split_once('.') {
            Some((prefix, rest)) => self.defaults.lookup_scoped(prefix, rest),
            None => self.defaults.lookup(name),
        };
        let default_id = default_hit.map(|h| h.id);
        let matches_default = default_hit.is_some_and(|h| values_match(&expanded, h.value));

        if let Some(idx) = self.find_entry(name) {
            if !values_match(&expanded, self.entry_value(idx)) {
                self.items[idx].raw_value = self.arena.insert(&expanded);
            }
            let meta = &mut self.metas[idx];
            meta.source_id = source.id;
            meta.source_line = source.line;
            meta.metaknob = source.metaknob;
            meta.matches_default = matches_default;
            meta.default_id = default_id;
            meta.is_inside = is_inside;
            return Ok(());
        }

        if matches_default && !self.retain_defaults {
            // Still reachable through the defaults service.
            return Ok(());
        }

        let key = self.arena.insert(name);
        let raw_value = self.arena.insert(&expanded);
        self.items.push(MacroItem { key, raw_value });
        self.metas.push(MacroMeta {
            source_id: source.id,
            source_line: source.line,
            metaknob: source.metaknob,
            use_count: Cell::new(0),
            ref_count: Cell::new(0),
            matches_default,
            default_id,
            is_inside,
        });
        Ok(())
    }

    /// Fold the unsorted suffix into the sorted prefix. Called between
    /// config loads so subsequent lookups are all binary searches.
    pub fn optimize(&mut self) {
        if self.sorted_prefix == self.items.len() {
            return;
        }
        let mut order: Vec<usize> = (0..self.items.len()).collect();
        order.sort_by(|&a, &b| {
            cmp_param_names(
                self.arena.get(self.items[a].key),
                self.arena.get(self.items[b].key),
            )
        });
        let items: Vec<MacroItem> = order.iter().map(|&i| self.items[i]).collect();
        let metas: Vec<MacroMeta> = order.iter().map(|&i| self.metas[i].clone()).collect();
        self.items = items;
        self.metas = metas;
        self.sorted_prefix = self.items.len();
    }

    /// Reset the table for a reconfigure pass: entries, arena and source
    /// registry are all dropped.
    pub fn clear(&mut self) {
        self.items.clear();
        self.metas.clear();
        self.arena.clear();
        self.sources = SourceTable::new();
        self.sorted_prefix = 0;
    }

    pub(crate) fn bump_counters(&self, idx: usize, use_mask: u8) {
        let meta = &self.metas[idx];
        if use_mask & crate::scope::USE_COUNT != 0 {
            meta.use_count.set(meta.use_count.get() + 1);
        }
        if use_mask & crate::scope::REF_COUNT != 0 {
            meta.ref_count.set(meta.ref_count.get() + 1);
        }
    }

    pub fn increment_use(&self, name: &str) {
        if let Some(idx) = self.find_entry(name) {
            self.bump_counters(idx, crate::scope::USE_COUNT);
        }
    }

    pub fn increment_ref(&self, name: &str) {
        if let Some(idx) = self.find_entry(name) {
            self.bump_counters(idx, crate::scope::REF_COUNT);
        }
    }

    pub fn get_use_count(&self, name: &str) -> u32 {
        self.find_entry(name)
            .map(|idx| self.metas[idx].use_count.get())
            .unwrap_or(0)
    }

    pub fn get_ref_count(&self, name: &str) -> u32 {
        self.find_entry(name)
            .map(|idx| self.metas[idx].ref_count.get())
            .unwrap_or(0)
    }

    pub fn clear_use_count(&self, name: &str) {
        if let Some(idx) = self.find_entry(name) {
            self.metas[idx].use_count.set(0);
        }
    }

    /// Iterate over (key, raw value, metadata) in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &MacroMeta)> {
        self.items.iter().zip(self.metas.iter()).map(|(item, meta)| {
            (
                self.arena.get(item.key),
                self.arena.get(item.raw_value),
                meta,
            )
        })
    }
}

impl Default for MacroSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::NoDefaults;
    use crate::source::SourceRef;

    fn set() -> MacroSet {
        MacroSet::with_defaults(Box::new(NoDefaults))
    }

    fn src(line: u32) -> SourceRef {
        SourceRef::new(crate::source::OVER_SOURCE, line)
    }

    #[test]
    fn test_last_wins() {
        let mut table = set();
        let ctx = EvalContext::default();
        table.insert("FOO", "bar", src(1), &ctx).unwrap();
        table.insert("FOO", "baz", src(2), &ctx).unwrap();
        assert_eq!(table.find("FOO", None), Some("baz"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let mut table = set();
        let ctx = EvalContext::default();
        table.insert("Spool_Dir", "/var/spool", src(1), &ctx).unwrap();
        assert_eq!(table.find("SPOOL_DIR", None), Some("/var/spool"));
        assert_eq!(table.find("spool_dir", None), Some("/var/spool"));
    }

    #[test]
    fn test_scoped_keys_are_distinct() {
        let mut table = set();
        let ctx = EvalContext::default();
        table.insert("FOO", "bar", src(1), &ctx).unwrap();
        table.insert("MASTER.FOO", "mar", src(2), &ctx).unwrap();
        assert_eq!(table.find("FOO", None), Some("bar"));
        assert_eq!(table.find("FOO", Some("MASTER")), Some("mar"));
        assert_eq!(table.find("FOO", Some("SCHEDD")), None);
    }

    #[test]
    fn test_self_expansion_on_replace() {
        let mut table = set();
        let ctx = EvalContext::default();
        table.insert("FOO", "bar", src(1), &ctx).unwrap();
        table.insert("FOO", "$(FOO) baz", src(2), &ctx).unwrap();
        assert_eq!(table.find("FOO", None), Some("bar baz"));
    }

    #[test]
    fn test_metadata_refreshed_on_replace() {
        let mut table = set();
        let ctx = EvalContext::default();
        table.insert("FOO", "bar", src(3), &ctx).unwrap();
        table.insert("FOO", "bar", src(9), &ctx).unwrap();
        let (_, _, meta) = table.iter().next().unwrap();
        assert_eq!(meta.source_line, 9);
    }

    #[test]
    fn test_default_matching_insert_is_skipped() {
        let mut table = MacroSet::new();
        let ctx = EvalContext::default();
        table.insert("VANILLA", "5", src(1), &ctx).unwrap();
        assert!(table.is_empty());
        // A non-default value is kept.
        table.insert("VANILLA", "7", src(2), &ctx).unwrap();
        assert_eq!(table.find("VANILLA", None), Some("7"));
    }

    #[test]
    fn test_default_matching_insert_retained_when_configured() {
        let mut table = MacroSet::new().retain_defaults(true);
        let ctx = EvalContext::default();
        table.insert("VANILLA", "5", src(1), &ctx).unwrap();
        assert_eq!(table.find("VANILLA", None), Some("5"));
        let (_, _, meta) = table.iter().next().unwrap();
        assert!(meta.matches_default);
        assert!(meta.default_id.is_some());
    }

    #[test]
    fn test_optimize_preserves_lookups() {
        let mut table = set();
        let ctx = EvalContext::default();
        for (i, name) in ["ZEBRA", "apple", "Mango", "banana"].iter().enumerate() {
            table.insert(name, "x", src(i as u32), &ctx).unwrap();
        }
        table.optimize();
        table.insert("cherry", "y", src(9), &ctx).unwrap();
        // One entry in the unsorted tail, rest sorted.
        for name in ["zebra", "APPLE", "mango", "BANANA"] {
            assert!(table.find(name, None).is_some(), "lost {name}");
        }
        assert_eq!(table.find("CHERRY", None), Some("y"));
    }

    #[test]
    fn test_use_and_ref_counters() {
        let mut table = set();
        let ctx = EvalContext::default();
        table.insert("FOO", "bar", src(1), &ctx).unwrap();
        table.increment_use("FOO");
        table.increment_use("FOO");
        table.increment_ref("FOO");
        assert_eq!(table.get_use_count("FOO"), 2);
        assert_eq!(table.get_ref_count("FOO"), 1);
        table.clear_use_count("FOO");
        assert_eq!(table.get_use_count("FOO"), 0);
        // Unknown names are a quiet no-op.
        table.increment_use("MISSING");
        assert_eq!(table.get_use_count("MISSING"), 0);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut table = set();
        let ctx = EvalContext::default();
        table.insert("FOO", "bar", src(1), &ctx).unwrap();
        table.optimize();
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.find("FOO", None), None);
    }
}
