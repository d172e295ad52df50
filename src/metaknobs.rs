//! Metaknob resolution.
//!
//! A metaknob is a named, pre-packaged bundle of knob assignments invoked
//! with `use category:item`. The parser resolves each item to a config
//! fragment through [`MetaknobService`] and feeds the fragment back into
//! itself. [`BuiltinMetaknobs`] carries the shipped bundles.

/// Resolver for `use category:item` directives.
pub trait MetaknobService {
    /// Return the config fragment for a category/item pair, or `None` when
    /// the pair is unknown. Matching is case-insensitive.
    fn resolve(&self, category: &str, item: &str) -> Option<&str>;
}

/// Shipped metaknob bundles: (category, item, fragment).
const METAKNOBS: &[(&str, &str, &str)] = &[
    (
        "ROLE",
        "CentralManager",
        "DAEMON_LIST = $(DAEMON_LIST) COLLECTOR NEGOTIATOR\n",
    ),
    (
        "ROLE",
        "Execute",
        "DAEMON_LIST = $(DAEMON_LIST) STARTD\n",
    ),
    (
        "ROLE",
        "Submit",
        "DAEMON_LIST = $(DAEMON_LIST) SCHEDD\n",
    ),
    (
        "ROLE",
        "Personal",
        "DAEMON_LIST = $(DAEMON_LIST) COLLECTOR NEGOTIATOR STARTD SCHEDD\n\
         CENTRAL_MANAGER = 127.0.0.1\n\
         NETWORK_INTERFACE = 127.0.0.1\n",
    ),
    (
        "FEATURE",
        "PartitionableSlot",
        "NUM_SLOTS = 1\n\
         NUM_SLOTS_TYPE_1 = 1\n\
         SLOT_TYPE_1 = 100%\n\
         SLOT_TYPE_1_PARTITIONABLE = true\n",
    ),
    (
        "FEATURE",
        "GPUs",
        "MACHINE_RESOURCE_NAMES = $(MACHINE_RESOURCE_NAMES) GPUs\n\
         MACHINE_RESOURCE_INVENTORY_GPUs = $(BIN)/probe_gpus\n",
    ),
    (
        "POLICY",
        "Always_Run_Jobs",
        "START = true\n\
         SUSPEND = false\n\
         PREEMPT = false\n\
         KILL = false\n",
    ),
    (
        "POLICY",
        "Desktop",
        "POLICY_INPUT = desktop\n\
         START = KeyboardIdle > $(StartIdleTime:900)\n\
         SUSPEND = $(CPUBusy) && KeyboardIdle < $(StartIdleTime:900)\n",
    ),
];

/// The shipped metaknob table.
pub struct BuiltinMetaknobs;

impl MetaknobService for BuiltinMetaknobs {
    fn resolve(&self, category: &str, item: &str) -> Option<&str> {
        METAKNOBS
            .iter()
            .find(|(c, i, _)| c.eq_ignore_ascii_case(category) && i.eq_ignore_ascii_case(item))
            .map(|(_, _, fragment)| *fragment)
    }
}
