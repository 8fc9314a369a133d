//! Resolution driver
//!
//! Turns semicolon-separated specification strings into a populated
//! `FilterStore`. Each token names a symbol (literal or regex pattern),
//! optionally negated with `!` and optionally carrying an `@action,...`
//! list; names resolve against the traced process' symbol tables, scoped
//! by a module qualifier when one is given.
//!
//! The driver is deliberately forgiving: a malformed token is logged and
//! skipped, a name that resolves to nothing adds no entries, and only the
//! surviving tokens contribute to the overall filter mode.

use crate::arch::HostProbes;
use crate::auto_args::AutoArgRegistry;
use crate::filter::{FilterEntry, FilterStore};
use crate::symtab::{SymbolTable, SymbolTables};
use crate::trigger::{self, FilterMode, Trigger, TriggerFlags};
use regex::Regex;
use tracing::{debug, warn};

/// Characters marking a token as a regex pattern rather than a literal name.
const REGEX_CHARS: &[char] = &['.', '?', '*', '+', '^', '$', '|', '(', ')', '[', ']'];

/// One resolution context: the filter store under construction, the
/// auto-argument registry backing it, and the host probes the parsers
/// consult. Construction happens through the `setup_*` methods; once those
/// are done, `match_address` is the read-only hot path.
#[derive(Debug)]
pub struct FilterSession {
    store: FilterStore,
    auto_args: AutoArgRegistry,
    probes: HostProbes,
}

impl FilterSession {
    /// Session with probes detected from the running host.
    pub fn new() -> Self {
        Self::with_probes(HostProbes::detect())
    }

    /// Session with caller-supplied probes (tests, cross-target setups).
    pub fn with_probes(probes: HostProbes) -> Self {
        Self {
            store: FilterStore::new(),
            auto_args: AutoArgRegistry::new(),
            probes,
        }
    }

    /// Resolve a filter specification (`-F`/`-N` style). Matched tokens set
    /// the FILTER flag on their entries and aggregate into `mode`: any
    /// positive match forces `In`, otherwise any negated match yields `Out`.
    pub fn setup_filter(
        &mut self,
        spec: &str,
        symtabs: &SymbolTables,
        mode: &mut Option<FilterMode>,
    ) {
        self.setup_triggers(spec, symtabs, TriggerFlags::FILTER, Some(mode));
    }

    /// Resolve a trigger specification (`FUNC@action` style) with no filter
    /// polarity.
    pub fn setup_trigger(&mut self, spec: &str, symtabs: &SymbolTables) {
        self.setup_triggers(spec, symtabs, TriggerFlags::empty(), None);
    }

    /// Resolve an argument-capture specification, falling back to the
    /// auto-argument registry for tokens without an explicit `arg` spec.
    pub fn setup_argument(&mut self, spec: &str, symtabs: &SymbolTables) {
        self.auto_args.ensure_seeded(&self.probes);
        self.setup_value_spec(spec, symtabs, false);
    }

    /// Resolve a return-value specification, falling back to the
    /// auto-retval registry for tokens without an explicit `retval` spec.
    pub fn setup_retval(&mut self, spec: &str, symtabs: &SymbolTables) {
        self.auto_args.ensure_seeded(&self.probes);
        self.setup_value_spec(spec, symtabs, true);
    }

    /// Hot-path lookup: resolve an instruction address to its filter entry.
    pub fn match_address(&self, ip: u64) -> Option<&FilterEntry> {
        self.store.match_address(ip)
    }

    pub fn store(&self) -> &FilterStore {
        &self.store
    }

    pub fn auto_args(&self) -> &AutoArgRegistry {
        &self.auto_args
    }

    /// Tear down the store and the registry state populated for it.
    pub fn clear(&mut self) {
        self.store.clear();
        self.auto_args.clear();
    }

    fn setup_triggers(
        &mut self,
        spec: &str,
        symtabs: &SymbolTables,
        flags: TriggerFlags,
        mut mode: Option<&mut Option<FilterMode>>,
    ) {
        for token in spec.split(';').filter(|token| !token.is_empty()) {
            let mut tr = Trigger {
                flags,
                ..Trigger::default()
            };

            let (name, module) = match trigger::parse_trigger_action(token, &mut tr, &self.probes)
            {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!("skipping invalid token '{token}': {err}");
                    continue;
                }
            };

            // kernel symbols belong to a different tracer layer
            if module
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case("kernel"))
            {
                continue;
            }

            let name = match name.strip_prefix('!') {
                Some(stripped) => {
                    tr.fmode = FilterMode::Out;
                    stripped
                }
                None => {
                    if mode.is_some() {
                        tr.fmode = FilterMode::In;
                    }
                    name
                }
            };

            let matched =
                self.add_trigger_scoped(symtabs, name, module.as_deref(), is_regex(name), &tr);

            if matched > 0 {
                if let Some(mode) = mode.as_deref_mut() {
                    if tr.fmode == FilterMode::In {
                        *mode = Some(FilterMode::In);
                    } else if mode.is_none() {
                        *mode = Some(FilterMode::Out);
                    }
                }
            }
        }
    }

    fn setup_value_spec(&mut self, spec: &str, symtabs: &SymbolTables, is_retval: bool) {
        for token in spec.split(';').filter(|token| !token.is_empty()) {
            let mut tr = Trigger::default();

            let (name, module) = match trigger::parse_trigger_action(token, &mut tr, &self.probes)
            {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!("skipping invalid token '{token}': {err}");
                    continue;
                }
            };

            if module
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case("kernel"))
            {
                continue;
            }

            let regex = is_regex(name);
            let has_spec = if is_retval {
                tr.flags.contains(TriggerFlags::RETVAL)
            } else {
                tr.flags.contains(TriggerFlags::ARGUMENT)
            };

            // no explicit spec given: fall back to auto-arguments
            if !has_spec {
                if regex {
                    self.expand_auto_specs(symtabs, name, module.as_deref(), is_retval);
                    continue;
                }

                let Some(auto) = self.auto_args.lookup(name, is_retval) else {
                    continue;
                };
                let auto = auto.clone();
                self.add_trigger_scoped(symtabs, name, module.as_deref(), false, &auto);
                continue;
            }

            self.add_trigger_scoped(symtabs, name, module.as_deref(), regex, &tr);
        }
    }

    /// Resolve one name over the tables selected by the module qualifier
    /// and insert a filter entry per matched symbol. Returns the number of
    /// entries added or merged.
    fn add_trigger_scoped(
        &mut self,
        symtabs: &SymbolTables,
        name: &str,
        module: Option<&str>,
        regex: bool,
        tr: &Trigger,
    ) -> usize {
        let mut matched = 0;
        for table in scoped_tables(symtabs, module) {
            matched += if regex {
                self.add_regex_filter(table, name, tr)
            } else {
                self.add_exact_filter(table, name, tr)
            };
        }
        matched
    }

    fn add_exact_filter(&mut self, table: &SymbolTable, name: &str, tr: &Trigger) -> usize {
        match table.find_name(name) {
            Some(sym) => {
                self.store
                    .insert(&sym.name, sym.addr, sym.addr + sym.size, tr, true);
                1
            }
            None => 0,
        }
    }

    fn add_regex_filter(&mut self, table: &SymbolTable, pattern: &str, tr: &Trigger) -> usize {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(err) => {
                debug!("regex pattern failed: {pattern}: {err}");
                return 0;
            }
        };

        let mut matched = 0;
        for sym in table {
            if !re.is_match(&sym.name) {
                continue;
            }
            self.store
                .insert(&sym.name, sym.addr, sym.addr + sym.size, tr, false);
            matched += 1;
        }
        matched
    }

    /// Expand a pattern token with no explicit spec: every symbol in scope
    /// that matches the pattern and has a registry entry under its own name
    /// gets that entry applied as exact. Symbols with no registry entry are
    /// silently left alone, consistent with unresolved names generally.
    fn expand_auto_specs(
        &mut self,
        symtabs: &SymbolTables,
        pattern: &str,
        module: Option<&str>,
        is_retval: bool,
    ) {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(err) => {
                debug!("regex pattern failed: {pattern}: {err}");
                return;
            }
        };

        let mut hits = 0;
        for table in scoped_tables(symtabs, module) {
            for sym in table {
                if !re.is_match(&sym.name) {
                    continue;
                }
                let Some(auto) = self.auto_args.lookup(&sym.name, is_retval) else {
                    continue;
                };
                let auto = auto.clone();
                self.store
                    .insert(&sym.name, sym.addr, sym.addr + sym.size, &auto, true);
                hits += 1;
            }
        }
        debug!("auto-argument pattern '{pattern}' applied to {hits} symbols");
    }
}

impl Default for FilterSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Select the symbol tables a module qualifier scopes resolution to.
fn scoped_tables<'a>(symtabs: &'a SymbolTables, module: Option<&str>) -> Vec<&'a SymbolTable> {
    match module {
        Some(module) => {
            if symtabs.is_main_binary(module) {
                vec![&symtabs.symtab, &symtabs.dsymtab]
            } else if module.eq_ignore_ascii_case("plt") {
                vec![&symtabs.dsymtab]
            } else if let Some(map) = symtabs.find_map(module) {
                vec![&map.symtab]
            } else {
                Vec::new()
            }
        }
        None => {
            let mut tables = vec![&symtabs.symtab, &symtabs.dsymtab];
            tables.extend(symtabs.maps.iter().map(|map| &map.symtab));
            tables
        }
    }
}

fn is_regex(name: &str) -> bool {
    name.contains(REGEX_CHARS)
}

/// Remove `@kernel`-tagged tokens from a specification string, preserving
/// the order and separators of the survivors. Collaborators use this to
/// forward the same specification to a kernel-side tracer that must not see
/// user-space-only tokens.
pub fn clear_kernel_spec(spec: &str) -> String {
    if !spec.contains("@kernel") {
        return spec.to_string();
    }

    spec.split(';')
        .filter(|token| !token.is_empty() && !token.contains("@kernel"))
        .collect::<Vec<_>>()
        .join(";")
}
