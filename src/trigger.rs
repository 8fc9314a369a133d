//! Trigger descriptors and the `@action,...` grammar
//!
//! A trigger is the accumulated set of behaviors attached to a matched
//! function: filtering, depth limits, backtraces, trace on/off switching,
//! argument/retval capture, colors, time thresholds and resource reads.
//!
//! `parse_trigger_action` consumes the action list of one filter token
//! (everything after `@`), delegating `arg`/`fparg`/`retval` items to the
//! argument-spec parser. Items that match no known action are treated as a
//! module qualifier scoping symbol resolution for the token.

use crate::arch::HostProbes;
use crate::arg_spec::{self, ArgLocation, ArgSpec, ArgSpecError};
use bitflags::bitflags;
use std::fmt;
use thiserror::Error;

/// Upper bound for `depth=` triggers, matching the tracer's record stack.
pub const MAX_FILTER_DEPTH: u32 = 1024;

bitflags! {
    /// Independent trigger capabilities. Merging is a bitwise OR, except
    /// that TRACE_ON and TRACE_OFF are mutually exclusive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TriggerFlags: u32 {
        const FILTER      = 1 << 0;
        const DEPTH       = 1 << 1;
        const BACKTRACE   = 1 << 2;
        const TRACE       = 1 << 3;
        const TRACE_ON    = 1 << 4;
        const TRACE_OFF   = 1 << 5;
        const ARGUMENT    = 1 << 6;
        const RETVAL      = 1 << 7;
        const RECOVER     = 1 << 8;
        const FINISH      = 1 << 9;
        const COLOR       = 1 << 10;
        const TIME_FILTER = 1 << 11;
        const READ        = 1 << 12;
    }
}

bitflags! {
    /// Resource reads requested via `read=`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ReadTypes: u32 {
        const PROC_STATM = 1 << 0;
        const PAGE_FAULT = 1 << 1;
    }
}

impl fmt::Display for ReadTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut sep = "";
        if self.contains(ReadTypes::PROC_STATM) {
            write!(f, "proc/statm")?;
            sep = "|";
        }
        if self.contains(ReadTypes::PAGE_FAULT) {
            write!(f, "{sep}page-fault")?;
        }
        Ok(())
    }
}

/// Per-function filter polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    In,
    Out,
}

/// Named output colors accepted by `color=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorCode {
    Red,
    Green,
    Blue,
    Yellow,
    Magenta,
    Cyan,
    Bold,
    Gray,
}

impl ColorCode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "red" => Some(Self::Red),
            "green" => Some(Self::Green),
            "blue" => Some(Self::Blue),
            "yellow" => Some(Self::Yellow),
            "magenta" => Some(Self::Magenta),
            "cyan" => Some(Self::Cyan),
            "bold" => Some(Self::Bold),
            "gray" => Some(Self::Gray),
            _ => None,
        }
    }
}

/// Accumulated trigger state for one function.
///
/// Scalar fields are meaningful only while their flag is set. `color` stays
/// `None` when `color=` named an unknown color even though COLOR is set;
/// downstream consumers treat that as "requested but meaningless".
#[derive(Debug, Clone, Default)]
pub struct Trigger {
    pub flags: TriggerFlags,
    pub depth: u32,
    pub fmode: FilterMode,
    pub color: Option<ColorCode>,
    pub time_ns: u64,
    pub read: ReadTypes,
    pub args: Vec<ArgSpec>,
}

impl Trigger {
    /// Merge another trigger into this one. Flags accumulate; TRACE_ON and
    /// TRACE_OFF displace each other; scalar fields are copied only when the
    /// incoming trigger carries their flag. Argument specs merge per slot
    /// with exact-match precedence.
    pub(crate) fn merge_from(&mut self, other: &Trigger, exact: bool) {
        self.flags |= other.flags;

        if other.flags.contains(TriggerFlags::DEPTH) {
            self.depth = other.depth;
        }
        if other.flags.contains(TriggerFlags::FILTER) {
            self.fmode = other.fmode;
        }

        if other.flags.contains(TriggerFlags::TRACE_ON) {
            self.flags.remove(TriggerFlags::TRACE_OFF);
        }
        if other.flags.contains(TriggerFlags::TRACE_OFF) {
            self.flags.remove(TriggerFlags::TRACE_ON);
        }

        if other
            .flags
            .intersects(TriggerFlags::ARGUMENT | TriggerFlags::RETVAL)
        {
            for arg in &other.args {
                merge_arg_spec(&mut self.args, arg, exact);
            }
        }

        if other.flags.contains(TriggerFlags::COLOR) {
            self.color = other.color;
        }
        if other.flags.contains(TriggerFlags::TIME_FILTER) {
            self.time_ns = other.time_ns;
        }
        if other.flags.contains(TriggerFlags::READ) {
            self.read = other.read;
        }
    }

    /// Argument specs ordered by location, return-value entries excluded.
    pub fn arg_specs(&self) -> impl Iterator<Item = &ArgSpec> {
        self.args
            .iter()
            .filter(|arg| arg.loc != ArgLocation::Index(arg_spec::RETVAL_IDX))
    }

    /// The return-value spec, if one was given.
    pub fn retval_spec(&self) -> Option<&ArgSpec> {
        self.args
            .iter()
            .find(|arg| arg.loc == ArgLocation::Index(arg_spec::RETVAL_IDX))
    }
}

/// Merge one spec into a slot-unique, location-sorted list. An exact spec
/// overwrites whatever occupied its slot; a pattern-derived spec never
/// overwrites an exact one.
fn merge_arg_spec(args: &mut Vec<ArgSpec>, arg: &ArgSpec, exact: bool) {
    if let Some(old) = args.iter_mut().find(|old| old.loc == arg.loc) {
        if exact || !old.exact {
            old.fmt = arg.fmt;
            old.size = arg.size;
            old.exact = exact;
        }
        return;
    }

    let mut new = arg.clone();
    new.exact = exact;
    let pos = args
        .iter()
        .position(|old| old.loc > new.loc)
        .unwrap_or(args.len());
    args.insert(pos, new);
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error(transparent)]
    Arg(#[from] ArgSpecError),

    #[error("invalid trigger depth: {0}")]
    InvalidDepth(String),

    #[error("invalid time filter: {0}")]
    InvalidTime(String),
}

/// Parse the `@action,...` suffix of one filter token into `tr`.
///
/// Returns the symbol name part (before `@`) and the module qualifier if
/// one was given; with several qualifiers the last wins. A failing action
/// item fails the whole token.
pub fn parse_trigger_action<'a>(
    token: &'a str,
    tr: &mut Trigger,
    probes: &HostProbes,
) -> Result<(&'a str, Option<String>), TriggerError> {
    let Some((name, actions)) = token.split_once('@') else {
        return Ok((token, None));
    };

    let mut module = None;

    for item in actions.split(',') {
        if let Some(value) = strip_prefix_icase(item, "depth=") {
            let depth: u32 = value
                .parse()
                .map_err(|_| TriggerError::InvalidDepth(value.to_string()))?;
            if depth > MAX_FILTER_DEPTH {
                return Err(TriggerError::InvalidDepth(value.to_string()));
            }
            tr.flags |= TriggerFlags::DEPTH;
            tr.depth = depth;
            continue;
        }
        if item.eq_ignore_ascii_case("backtrace") {
            tr.flags |= TriggerFlags::BACKTRACE;
            continue;
        }
        if let Some(rest) = strip_prefix_icase(item, "trace") {
            let rest = rest.strip_prefix(['_', '-']).unwrap_or(rest);
            if rest.is_empty() {
                tr.flags |= TriggerFlags::TRACE;
            } else if rest.eq_ignore_ascii_case("on") {
                tr.flags |= TriggerFlags::TRACE_ON;
            } else if rest.eq_ignore_ascii_case("off") {
                tr.flags |= TriggerFlags::TRACE_OFF;
            }
            // anything else after "trace" is silently ignored
            continue;
        }
        if strip_prefix_icase(item, "fparg").is_some() {
            let arg = arg_spec::parse_float_argument_spec(item, probes)?;
            tr.flags |= TriggerFlags::ARGUMENT;
            tr.args.push(arg);
            continue;
        }
        if strip_prefix_icase(item, "arg").is_some() {
            let arg = arg_spec::parse_argument_spec(item, probes)?;
            tr.flags |= TriggerFlags::ARGUMENT;
            tr.args.push(arg);
            continue;
        }
        if strip_prefix_icase(item, "retval").is_some() {
            let arg = arg_spec::parse_retval_spec(item, probes)?;
            tr.flags |= TriggerFlags::RETVAL;
            tr.args.push(arg);
            continue;
        }
        if item.eq_ignore_ascii_case("recover") {
            tr.flags |= TriggerFlags::RECOVER;
            continue;
        }
        if item.eq_ignore_ascii_case("finish") {
            tr.flags |= TriggerFlags::FINISH;
            continue;
        }
        if let Some(color) = strip_prefix_icase(item, "color=") {
            tr.flags |= TriggerFlags::COLOR;
            // unknown color names are accepted but have no effect
            tr.color = ColorCode::from_name(color);
            continue;
        }
        if let Some(value) = strip_prefix_icase(item, "time=") {
            tr.flags |= TriggerFlags::TIME_FILTER;
            tr.time_ns = parse_time(value, 3)?;
            continue;
        }
        if let Some(kind) = item.strip_prefix("read=") {
            tr.read |= parse_read_type(kind);
            // set READ only once a recognized kind accumulated
            if !tr.read.is_empty() {
                tr.flags |= TriggerFlags::READ;
            }
            continue;
        }

        module = Some(item.to_string());
    }

    Ok((name, module))
}

fn parse_read_type(kind: &str) -> ReadTypes {
    match kind {
        "proc/statm" => ReadTypes::PROC_STATM,
        "page-fault" => ReadTypes::PAGE_FAULT,
        _ => ReadTypes::empty(),
    }
}

/// Parse a duration like `10us`, `1.5ms` or `300` (nanoseconds) into
/// nanoseconds, keeping at most `limited_digits` fraction digits.
pub(crate) fn parse_time(value: &str, limited_digits: u32) -> Result<u64, TriggerError> {
    let (int_part, rest) = split_digits(value);
    let whole: u64 = int_part.parse().unwrap_or(0);

    let (frac, frac_len, rest) = if let Some(decimals) = rest.strip_prefix('.') {
        let (digits, tail) = split_digits(decimals);
        if digits.is_empty() || digits.len() as u32 > limited_digits {
            return Err(TriggerError::InvalidTime(value.to_string()));
        }
        (digits.parse::<u64>().unwrap_or(0), digits.len() as u32, tail)
    } else {
        (0, 0, rest)
    };

    let scale: u64 = if rest.is_empty() || rest.eq_ignore_ascii_case("ns") {
        1
    } else if rest.eq_ignore_ascii_case("us") {
        1_000
    } else if rest.eq_ignore_ascii_case("ms") {
        1_000_000
    } else if rest.eq_ignore_ascii_case("s") {
        1_000_000_000
    } else if rest.eq_ignore_ascii_case("m") {
        60_000_000_000
    } else {
        return Err(TriggerError::InvalidTime(value.to_string()));
    };

    let frac_ns = if frac_len == 0 {
        0
    } else {
        frac * scale / 10u64.pow(frac_len)
    };
    Ok(whole.saturating_mul(scale).saturating_add(frac_ns))
}

fn strip_prefix_icase<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

fn split_digits(text: &str) -> (&str, &str) {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    text.split_at(end)
}
