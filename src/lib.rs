//! Trazar - filter and trigger resolution for function-call tracing
//!
//! This library turns user-supplied filter specifications like
//! `foo::bar@depth=2,arg1/x64` into an address-keyed lookup structure a
//! call interceptor queries once per traced function entry, deciding
//! whether to trace and what metadata to capture.
//!
//! Core pieces:
//! - Argument-spec and trigger-action parsers for the filter grammar
//! - An interval-keyed filter store with deterministic merge semantics
//! - An auto-argument registry supplying default capture specs by name
//! - A resolution driver binding names to symbols, exact or by regex
//!
//! Symbol loading, call interception and output formatting live in the
//! consuming tracer; this crate only resolves specifications.

pub mod arch;
pub mod arg_spec;
pub mod auto_args;
pub mod filter;
pub mod resolver;
pub mod symtab;
pub mod trigger;

pub use arch::HostProbes;
pub use arg_spec::{ArgFormat, ArgLocation, ArgSpec, RETVAL_IDX};
pub use auto_args::AutoArgRegistry;
pub use filter::{FilterEntry, FilterStore};
pub use resolver::{clear_kernel_spec, FilterSession};
pub use symtab::{ModuleMap, Symbol, SymbolTable, SymbolTables};
pub use trigger::{
    ColorCode, FilterMode, ReadTypes, Trigger, TriggerFlags, MAX_FILTER_DEPTH,
};
