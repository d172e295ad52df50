//! Layered scope resolution.
//!
//! A macro reference is resolved by walking scopes from most to least
//! specific: instance-local name, then subsystem, then the generic name,
//! consulting the macro table before the defaults service at every layer.
//! An explicit config-file assignment therefore always outranks a default
//! at the same layer, and an explicitly empty value is a definition that
//! short-circuits the chain.

use crate::table::MacroSet;

/// `use_mask` bit: count this lookup as a consumer use.
pub const USE_COUNT: u8 = 0x1;
/// `use_mask` bit: count this lookup as an expansion reference.
pub const REF_COUNT: u8 = 0x2;

/// Ephemeral evaluation context, passed by value through the lookup and
/// expansion call chains and never stored.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    /// Logical role of the consuming daemon, e.g. `MASTER`.
    pub subsys: Option<&'a str>,
    /// Instance-specific override scope, more specific than `subsys`.
    pub local_name: Option<&'a str>,
    /// Which counters a table hit should bump.
    pub use_mask: u8,
    /// Skip the final bare-name defaults layer.
    pub without_default: bool,
    /// Directory used to absolutize relative paths in `$F` expansion.
    pub cwd: &'a str,
}

impl Default for EvalContext<'_> {
    fn default() -> Self {
        Self {
            subsys: None,
            local_name: None,
            use_mask: REF_COUNT,
            without_default: false,
            cwd: "",
        }
    }
}

impl<'a> EvalContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subsys(mut self, subsys: &'a str) -> Self {
        self.subsys = Some(subsys);
        self
    }

    pub fn with_local_name(mut self, local_name: &'a str) -> Self {
        self.local_name = Some(local_name);
        self
    }

    pub fn with_use_mask(mut self, use_mask: u8) -> Self {
        self.use_mask = use_mask;
        self
    }

    pub fn with_cwd(mut self, cwd: &'a str) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn without_default(mut self) -> Self {
        self.without_default = true;
        self
    }
}

fn table_hit<'s>(key: &str, set: &'s MacroSet, ctx: &EvalContext) -> Option<&'s str> {
    let idx = set.find_entry(key)?;
    set.bump_counters(idx, ctx.use_mask);
    Some(set.entry_value(idx))
}

/// Resolve `name` through the layered scope chain.
///
/// A name that already carries a `.` prefix bypasses the chain: it is
/// looked up verbatim in the table, then as a scoped default. Returns
/// `None` only when every layer misses.
pub fn lookup_macro<'s>(name: &str, set: &'s MacroSet, ctx: &EvalContext) -> Option<&'s str> {
    if let Some((prefix, rest)) = name.split_once('.') {
        if let Some(value) = table_hit(name, set, ctx) {
            return Some(value);
        }
        return set.defaults().lookup_scoped(prefix, rest).map(|h| h.value);
    }

    // Local name, the most specific scope. Skipped when the name being
    // resolved is the local name itself, which would only self-match.
    if let Some(local) = ctx.local_name {
        if !local.eq_ignore_ascii_case(name) {
            if let Some(value) = table_hit(&format!("{local}.{name}"), set, ctx) {
                return Some(value);
            }
            if let Some(hit) = set.defaults().lookup_scoped(local, name) {
                return Some(hit.value);
            }
        }
    }

    if let Some(subsys) = ctx.subsys {
        if !subsys.eq_ignore_ascii_case(name) {
            if let Some(value) = table_hit(&format!("{subsys}.{name}"), set, ctx) {
                return Some(value);
            }
            if let Some(hit) = set.defaults().lookup_scoped(subsys, name) {
                return Some(hit.value);
            }
        }
    }

    if let Some(value) = table_hit(name, set, ctx) {
        return Some(value);
    }

    if !ctx.without_default {
        if let Some(hit) = set.defaults().lookup(name) {
            return Some(hit.value);
        }
    }

    None
}
