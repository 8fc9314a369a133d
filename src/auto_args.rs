//! Auto-argument registry
//!
//! Default argument and return-value capture specifications applied when a
//! user's filter token names a function but gives no explicit spec. Keyed
//! by exact symbol name; seeded lazily from the built-in lists below the
//! first time argument/retval resolution runs. Registry entries always
//! merge as exact, so they are never displaced by pattern-derived specs.

use crate::arch::HostProbes;
use crate::trigger::{self, Trigger};
use std::collections::BTreeMap;
use tracing::debug;

/// Built-in default argument specs for well-known libc entry points, in the
/// same `name@spec,...` token grammar the user-facing filters use.
pub const DEFAULT_AUTO_ARGS: &str = "\
    malloc@arg1;\
    free@arg1/x;\
    calloc@arg1,arg2;\
    realloc@arg1/x,arg2;\
    memcpy@arg1/x,arg2/x,arg3;\
    memmove@arg1/x,arg2/x,arg3;\
    memset@arg1/x,arg2,arg3;\
    strcpy@arg1/s,arg2/s;\
    strncpy@arg1/s,arg2/s,arg3;\
    strcat@arg1/s,arg2/s;\
    strcmp@arg1/s,arg2/s;\
    strncmp@arg1/s,arg2/s,arg3;\
    strlen@arg1/s;\
    strstr@arg1/s,arg2/s;\
    open@arg1/s,arg2;\
    fopen@arg1/s,arg2/s;\
    read@arg1,arg3;\
    write@arg1,arg3;\
    close@arg1;\
    puts@arg1/s;\
    fputs@arg1/s;\
    exit@arg1";

/// Built-in default return-value specs, same grammar.
pub const DEFAULT_AUTO_RETVALS: &str = "\
    malloc@retval/x;\
    calloc@retval/x;\
    realloc@retval/x;\
    strcpy@retval/s;\
    strcat@retval/s;\
    strstr@retval/s;\
    strcmp@retval/i32;\
    strncmp@retval/i32;\
    strlen@retval;\
    open@retval/i32;\
    fopen@retval/x;\
    read@retval/i;\
    write@retval/i;\
    close@retval/i32";

/// Name-keyed registries of default triggers, one for arguments and one for
/// return values.
#[derive(Debug, Default)]
pub struct AutoArgRegistry {
    args: BTreeMap<String, Trigger>,
    rvals: BTreeMap<String, Trigger>,
    seeded: bool,
}

impl AutoArgRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate both registries from the built-in lists. Runs once; later
    /// calls are no-ops until `clear`.
    pub(crate) fn ensure_seeded(&mut self, probes: &HostProbes) {
        if self.seeded {
            return;
        }
        self.seeded = true;

        seed_list(&mut self.args, DEFAULT_AUTO_ARGS, probes);
        seed_list(&mut self.rvals, DEFAULT_AUTO_RETVALS, probes);

        debug!(
            "auto-args seeded: {} argument entries, {} retval entries",
            self.args.len(),
            self.rvals.len()
        );
    }

    /// Exact-name lookup in the argument or return-value registry.
    pub fn lookup(&self, name: &str, retval: bool) -> Option<&Trigger> {
        if retval {
            self.rvals.get(name)
        } else {
            self.args.get(name)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.rvals.is_empty()
    }

    /// Drop all entries; the next `ensure_seeded` repopulates.
    pub fn clear(&mut self) {
        self.args.clear();
        self.rvals.clear();
        self.seeded = false;
    }
}

fn seed_list(root: &mut BTreeMap<String, Trigger>, list: &str, probes: &HostProbes) {
    for token in list.split(';').filter(|token| !token.is_empty()) {
        let mut tr = Trigger::default();
        match trigger::parse_trigger_action(token, &mut tr, probes) {
            Ok((name, _)) => {
                root.entry(name.to_string())
                    .or_default()
                    .merge_from(&tr, true);
            }
            Err(err) => debug!("skipping auto-argument '{token}': {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arg_spec::{ArgFormat, ArgLocation, RETVAL_IDX};
    use crate::trigger::TriggerFlags;

    fn seeded() -> AutoArgRegistry {
        let mut registry = AutoArgRegistry::new();
        registry.ensure_seeded(&HostProbes::fixed(false, false));
        registry
    }

    #[test]
    fn test_seeding_is_lazy_and_idempotent() {
        let mut registry = AutoArgRegistry::new();
        assert!(registry.is_empty());

        let probes = HostProbes::fixed(false, false);
        registry.ensure_seeded(&probes);
        let count = registry.args.len();
        registry.ensure_seeded(&probes);
        assert_eq!(registry.args.len(), count);
    }

    #[test]
    fn test_argument_lookup() {
        let registry = seeded();
        let tr = registry.lookup("strcpy", false).unwrap();
        assert!(tr.flags.contains(TriggerFlags::ARGUMENT));
        assert_eq!(tr.args.len(), 2);
        assert_eq!(tr.args[0].loc, ArgLocation::Index(1));
        assert_eq!(tr.args[0].fmt, ArgFormat::Str);
        assert!(tr.args[0].exact);

        assert!(registry.lookup("no_such_function", false).is_none());
    }

    #[test]
    fn test_retval_lookup() {
        let registry = seeded();
        let tr = registry.lookup("malloc", true).unwrap();
        assert!(tr.flags.contains(TriggerFlags::RETVAL));
        assert_eq!(tr.args[0].loc, ArgLocation::Index(RETVAL_IDX));
        assert_eq!(tr.args[0].fmt, ArgFormat::Hex);

        // argument and retval registries are separate namespaces
        assert!(registry.lookup("close", false).is_some());
        assert!(registry.lookup("puts", true).is_none());
    }

    #[test]
    fn test_clear_then_reseed() {
        let mut registry = seeded();
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.lookup("malloc", false).is_none());

        registry.ensure_seeded(&HostProbes::fixed(false, false));
        assert!(registry.lookup("malloc", false).is_some());
    }
}
