//! Address-keyed filter/trigger store
//!
//! Holds one merged trigger per matched function, keyed by the start of the
//! function's address interval. Built once during setup; the tracing hot
//! path only calls `match_address`, which takes `&self` and is safe for
//! concurrent readers once construction has finished.

use crate::trigger::{Trigger, TriggerFlags};
use std::collections::BTreeMap;
use tracing::debug;

/// One filtered function: its name, address interval `[start, end)` and the
/// merged trigger accumulated across every token that matched it.
#[derive(Debug, Clone)]
pub struct FilterEntry {
    pub name: String,
    pub start: u64,
    pub end: u64,
    pub trigger: Trigger,
}

impl FilterEntry {
    fn contains(&self, ip: u64) -> bool {
        self.start <= ip && ip < self.end
    }
}

/// Interval-keyed store of filter entries. Intervals of distinct entries do
/// not overlap; that is guaranteed by the symbol tables feeding the store
/// and not re-validated here.
#[derive(Debug, Clone, Default)]
pub struct FilterStore {
    entries: BTreeMap<u64, FilterEntry>,
}

impl FilterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a trigger for a function. Two insertions sharing a start
    /// address are the same function; their triggers merge instead of
    /// creating a duplicate entry.
    pub fn insert(&mut self, name: &str, start: u64, end: u64, tr: &Trigger, exact: bool) {
        debug!("add filter for {name} [{start:#x}, {end:#x})");

        match self.entries.entry(start) {
            std::collections::btree_map::Entry::Occupied(mut occupied) => {
                occupied.get_mut().trigger.merge_from(tr, exact);
            }
            std::collections::btree_map::Entry::Vacant(vacant) => {
                let mut entry = FilterEntry {
                    name: name.to_string(),
                    start,
                    end,
                    trigger: Trigger::default(),
                };
                entry.trigger.merge_from(tr, exact);
                vacant.insert(entry);
            }
        }
    }

    /// Resolve an instruction address to the unique entry whose interval
    /// contains it.
    pub fn match_address(&self, ip: u64) -> Option<&FilterEntry> {
        let (_, entry) = self.entries.range(..=ip).next_back()?;
        if entry.contains(ip) {
            debug!("filter match: {}", entry.name);
            Some(entry)
        } else {
            None
        }
    }

    /// Entries in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = &FilterEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and its owned argument specs.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Log every entry with a trigger summary.
    pub fn dump(&self) {
        for entry in self.iter() {
            debug!("{:#x}-{:#x}: {}", entry.start, entry.end, entry.name);
            dump_trigger(&entry.trigger);
        }
    }
}

fn dump_trigger(tr: &Trigger) {
    if tr.flags.contains(TriggerFlags::DEPTH) {
        debug!("\ttrigger: depth {}", tr.depth);
    }
    if tr.flags.contains(TriggerFlags::FILTER) {
        debug!("\ttrigger: filter {:?}", tr.fmode);
    }
    if tr.flags.contains(TriggerFlags::BACKTRACE) {
        debug!("\ttrigger: backtrace");
    }
    if tr.flags.contains(TriggerFlags::TRACE) {
        debug!("\ttrigger: trace");
    }
    if tr.flags.contains(TriggerFlags::TRACE_ON) {
        debug!("\ttrigger: trace_on");
    }
    if tr.flags.contains(TriggerFlags::TRACE_OFF) {
        debug!("\ttrigger: trace_off");
    }
    if tr.flags.contains(TriggerFlags::RECOVER) {
        debug!("\ttrigger: recover");
    }
    if tr.flags.contains(TriggerFlags::FINISH) {
        debug!("\ttrigger: finish");
    }
    if tr.flags.contains(TriggerFlags::ARGUMENT) {
        debug!("\ttrigger: argument");
        for arg in tr.arg_specs() {
            debug!("\t\t {:?}: {:?} x{}", arg.loc, arg.fmt, arg.size as u32 * 8);
        }
    }
    if tr.flags.contains(TriggerFlags::RETVAL) {
        debug!("\ttrigger: return value");
        if let Some(arg) = tr.retval_spec() {
            debug!("\t\t retval: {:?} x{}", arg.fmt, arg.size as u32 * 8);
        }
    }
    if tr.flags.contains(TriggerFlags::COLOR) {
        debug!("\ttrigger: color {:?}", tr.color);
    }
    if tr.flags.contains(TriggerFlags::TIME_FILTER) {
        debug!("\ttrigger: time filter {}", tr.time_ns);
    }
    if tr.flags.contains(TriggerFlags::READ) {
        debug!("\ttrigger: read ({})", tr.read);
    }
}
