//! Argument capture specifications
//!
//! Parses the per-value grammar of trigger actions into structured capture
//! descriptors:
//! - `arg2/x64%stack+1` - second argument, hex, 64 bits, from the stack
//! - `retval/s32` - return value displayed as a 32-bit string pointer
//! - `fparg1/64%xmm0` - first FP argument, double, from a register
//!
//! The suffix grammar is `['/' FMT [BITS]] ['%' LOCATOR]` where FMT is one
//! of `iuxscfS` and LOCATOR is `stack<offset>` or a register name.

use crate::arch::{self, HostProbes};
use std::sync::Once;
use thiserror::Error;
use tracing::warn;

/// Reserved index marking a return-value spec; user arguments are 1-based.
pub const RETVAL_IDX: u32 = 0;

/// Default capture width: the native word size in bytes.
const WORD_SIZE: u8 = 8;

/// Recoverable parse failures; the offending token is skipped, the rest of
/// the specification string is still processed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgSpecError {
    #[error("unsupported argument type: {0}")]
    UnsupportedType(String),

    #[error("unsupported argument size: {0}")]
    UnsupportedSize(String),

    #[error("unknown register name: {0}")]
    UnknownRegister(String),

    #[error("invalid argument index: {0}")]
    InvalidIndex(String),

    #[error("std::string display for libc++ is not supported")]
    StdStringUnsupported,
}

/// Display format of one captured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgFormat {
    #[default]
    Auto,
    Sint,
    Uint,
    Hex,
    Str,
    Char,
    Float,
    StdString,
}

/// Where a captured value lives at function entry/exit.
///
/// Return values use `Index(RETVAL_IDX)`. The derived ordering (variant
/// first, payload second) is the canonical sort order of a spec list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArgLocation {
    /// Calling-convention slot by 1-based argument index.
    Index(u32),
    /// Architecture FP argument slot by 1-based index.
    FloatIndex(u32),
    /// Explicit register, by index into the argument register table.
    Register(u32),
    /// Stack slot, in words relative to the frame.
    Stack(i32),
}

/// One captured value: location, display format, byte width, and whether it
/// came from an exact-name match (exact specs win merge conflicts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    pub loc: ArgLocation,
    pub fmt: ArgFormat,
    pub size: u8,
    pub exact: bool,
}

/// Parse an `arg<N>[/spec]` action item. The digit must follow immediately
/// after the `arg` prefix.
pub fn parse_argument_spec(item: &str, probes: &HostProbes) -> Result<ArgSpec, ArgSpecError> {
    let (idx, suffix) = split_index(&item[3..]).ok_or_else(|| {
        warn!("skipping invalid argument: {item}");
        ArgSpecError::InvalidIndex(item.to_string())
    })?;

    parse_spec(item, suffix, ArgLocation::Index(idx), probes)
}

/// Parse a `retval[/spec]` action item.
pub fn parse_retval_spec(item: &str, probes: &HostProbes) -> Result<ArgSpec, ArgSpecError> {
    let suffix = &item[6..];

    parse_spec(item, suffix, ArgLocation::Index(RETVAL_IDX), probes)
}

/// Parse an `fparg<N>[/size][%locator]` action item. Unlike `arg<N>`, the
/// format is fixed to float and the width is given directly in bits.
pub fn parse_float_argument_spec(
    item: &str,
    probes: &HostProbes,
) -> Result<ArgSpec, ArgSpecError> {
    let (idx, mut rest) = split_index(&item[5..]).ok_or_else(|| {
        warn!("skipping invalid argument: {item}");
        ArgSpecError::InvalidIndex(item.to_string())
    })?;

    let mut loc = ArgLocation::FloatIndex(idx);
    let mut size = WORD_SIZE;

    if let Some(width) = rest.strip_prefix('/') {
        let (digits, tail) = split_digits(width);
        let bits: u32 = digits
            .parse()
            .map_err(|_| ArgSpecError::UnsupportedSize(item.to_string()))?;

        let bits = match bits {
            32 | 64 => bits,
            // long double folds into double on this machine
            80 if probes.long_double_narrowed() => 64,
            80 => 80,
            _ => return Err(ArgSpecError::UnsupportedSize(item.to_string())),
        };
        size = (bits / 8) as u8;
        rest = tail;
    }

    if let Some(locator) = rest.strip_prefix('%') {
        loc = parse_locator(item, locator)?;
    }

    Ok(ArgSpec {
        loc,
        fmt: ArgFormat::Float,
        size,
        exact: false,
    })
}

/// Parse the common `['/' FMT [BITS]] ['%' LOCATOR]` suffix shared by
/// `arg<N>` and `retval`.
fn parse_spec(
    item: &str,
    suffix: &str,
    mut loc: ArgLocation,
    probes: &HostProbes,
) -> Result<ArgSpec, ArgSpecError> {
    let mut fmt = ArgFormat::Auto;
    let mut size = WORD_SIZE;
    let mut rest = suffix;

    if !rest.is_empty() && !rest.starts_with(['/', '%']) {
        warn!("unsupported argument type: {item}");
        return Err(ArgSpecError::UnsupportedType(item.to_string()));
    }

    if let Some(spec) = rest.strip_prefix('/') {
        let letter = spec.chars().next();
        match letter {
            Some('i') => fmt = ArgFormat::Sint,
            Some('u') => fmt = ArgFormat::Uint,
            Some('x') => fmt = ArgFormat::Hex,
            Some('s') => fmt = ArgFormat::Str,
            Some('c') => {
                fmt = ArgFormat::Char;
                size = 1;
            }
            Some('f') => {
                fmt = ArgFormat::Float;
                size = 8;
            }
            Some('S') => {
                if probes.libcxx_loaded() {
                    static WARNED: Once = Once::new();
                    WARNED.call_once(|| {
                        warn!("std::string display for libc++.so is not supported");
                    });
                    return Err(ArgSpecError::StdStringUnsupported);
                }
                fmt = ArgFormat::StdString;
            }
            _ => {
                warn!("unsupported argument type: {item}");
                return Err(ArgSpecError::UnsupportedType(item.to_string()));
            }
        }

        rest = &spec[1..];
        if !rest.is_empty() && !rest.starts_with('%') {
            let (digits, tail) = split_digits(rest);
            let bits: u32 = digits
                .parse()
                .map_err(|_| ArgSpecError::UnsupportedSize(item.to_string()))?;

            match bits {
                8 | 16 | 32 | 64 => size = (bits / 8) as u8,
                80 if fmt == ArgFormat::Float => size = 10,
                _ => {
                    warn!("unsupported argument size: {item}");
                    return Err(ArgSpecError::UnsupportedSize(item.to_string()));
                }
            }
            rest = tail;
        }
    }

    if let Some(locator) = rest.strip_prefix('%') {
        loc = parse_locator(item, locator)?;
    }

    // long double folds into double on this machine
    if fmt == ArgFormat::Float && size == 10 && probes.long_double_narrowed() {
        size = 8;
    }

    Ok(ArgSpec {
        loc,
        fmt,
        size,
        exact: false,
    })
}

/// Parse a `%stack<offset>` or `%<register>` locator.
fn parse_locator(item: &str, locator: &str) -> Result<ArgLocation, ArgSpecError> {
    if let Some(offset) = locator.strip_prefix("stack") {
        let words = offset
            .strip_prefix('+')
            .unwrap_or(offset)
            .parse()
            .unwrap_or(0);
        return Ok(ArgLocation::Stack(words));
    }

    match arch::register_index(locator) {
        Some(reg) => Ok(ArgLocation::Register(reg)),
        None => {
            warn!("unknown register name: {item}");
            Err(ArgSpecError::UnknownRegister(item.to_string()))
        }
    }
}

/// Split a leading decimal index off a token; `None` unless the first
/// character is a digit.
fn split_index(text: &str) -> Option<(u32, &str)> {
    if !text.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let (digits, rest) = split_digits(text);
    digits.parse().ok().map(|idx| (idx, rest))
}

fn split_digits(text: &str) -> (&str, &str) {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    text.split_at(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probes() -> HostProbes {
        HostProbes::fixed(false, false)
    }

    #[test]
    fn test_plain_argument() {
        let arg = parse_argument_spec("arg1", &probes()).unwrap();
        assert_eq!(arg.loc, ArgLocation::Index(1));
        assert_eq!(arg.fmt, ArgFormat::Auto);
        assert_eq!(arg.size, 8);
    }

    #[test]
    fn test_format_and_width() {
        let arg = parse_argument_spec("arg2/x64", &probes()).unwrap();
        assert_eq!(arg.loc, ArgLocation::Index(2));
        assert_eq!(arg.fmt, ArgFormat::Hex);
        assert_eq!(arg.size, 8);

        let arg = parse_argument_spec("arg1/i16", &probes()).unwrap();
        assert_eq!(arg.fmt, ArgFormat::Sint);
        assert_eq!(arg.size, 2);
    }

    #[test]
    fn test_char_and_float_force_width() {
        let arg = parse_argument_spec("arg1/c", &probes()).unwrap();
        assert_eq!(arg.fmt, ArgFormat::Char);
        assert_eq!(arg.size, 1);

        let arg = parse_argument_spec("arg1/f", &probes()).unwrap();
        assert_eq!(arg.fmt, ArgFormat::Float);
        assert_eq!(arg.size, 8);
    }

    #[test]
    fn test_extended_float_width() {
        let arg = parse_argument_spec("arg1/f80", &probes()).unwrap();
        assert_eq!(arg.size, 10);

        // 80 bits is only valid for floats
        let err = parse_argument_spec("arg1/x80", &probes()).unwrap_err();
        assert!(matches!(err, ArgSpecError::UnsupportedSize(_)));
    }

    #[test]
    fn test_extended_float_narrowed_on_arm() {
        let probes = HostProbes::fixed(true, false);
        let arg = parse_argument_spec("arg1/f80", &probes).unwrap();
        assert_eq!(arg.size, 8);

        let arg = parse_float_argument_spec("fparg1/80", &probes).unwrap();
        assert_eq!(arg.size, 8);
    }

    #[test]
    fn test_stack_locator() {
        let arg = parse_argument_spec("arg3/x64%stack+1", &probes()).unwrap();
        assert_eq!(arg.loc, ArgLocation::Stack(1));
        assert_eq!(arg.fmt, ArgFormat::Hex);

        let arg = parse_argument_spec("arg1%stack-2", &probes()).unwrap();
        assert_eq!(arg.loc, ArgLocation::Stack(-2));
    }

    #[test]
    fn test_register_locator() {
        let arg = parse_argument_spec("arg1%rdi", &probes()).unwrap();
        assert_eq!(arg.loc, ArgLocation::Register(0));

        let err = parse_argument_spec("arg1%rip", &probes()).unwrap_err();
        assert!(matches!(err, ArgSpecError::UnknownRegister(_)));
    }

    #[test]
    fn test_invalid_type_and_index() {
        let err = parse_argument_spec("arg1/z", &probes()).unwrap_err();
        assert!(matches!(err, ArgSpecError::UnsupportedType(_)));

        let err = parse_argument_spec("argx", &probes()).unwrap_err();
        assert!(matches!(err, ArgSpecError::InvalidIndex(_)));
    }

    #[test]
    fn test_unusual_width_rejected() {
        let err = parse_argument_spec("arg1/i24", &probes()).unwrap_err();
        assert!(matches!(err, ArgSpecError::UnsupportedSize(_)));
    }

    #[test]
    fn test_std_string_requires_supported_runtime() {
        let arg = parse_argument_spec("arg1/S", &probes()).unwrap();
        assert_eq!(arg.fmt, ArgFormat::StdString);

        let libcxx = HostProbes::fixed(false, true);
        let err = parse_argument_spec("arg1/S", &libcxx).unwrap_err();
        assert_eq!(err, ArgSpecError::StdStringUnsupported);
    }

    #[test]
    fn test_retval_spec() {
        let arg = parse_retval_spec("retval", &probes()).unwrap();
        assert_eq!(arg.loc, ArgLocation::Index(RETVAL_IDX));
        assert_eq!(arg.fmt, ArgFormat::Auto);

        let arg = parse_retval_spec("retval/s32", &probes()).unwrap();
        assert_eq!(arg.fmt, ArgFormat::Str);
        assert_eq!(arg.size, 4);

        let err = parse_retval_spec("retvalx", &probes()).unwrap_err();
        assert!(matches!(err, ArgSpecError::UnsupportedType(_)));
    }

    #[test]
    fn test_float_argument_spec() {
        let arg = parse_float_argument_spec("fparg1", &probes()).unwrap();
        assert_eq!(arg.loc, ArgLocation::FloatIndex(1));
        assert_eq!(arg.fmt, ArgFormat::Float);
        assert_eq!(arg.size, 8);

        let arg = parse_float_argument_spec("fparg2/32", &probes()).unwrap();
        assert_eq!(arg.size, 4);

        let arg = parse_float_argument_spec("fparg1/64%xmm0", &probes()).unwrap();
        assert_eq!(arg.loc, ArgLocation::Register(6));
        assert_eq!(arg.size, 8);

        let err = parse_float_argument_spec("fparg1/48", &probes()).unwrap_err();
        assert!(matches!(err, ArgSpecError::UnsupportedSize(_)));

        let err = parse_float_argument_spec("fpargX", &probes()).unwrap_err();
        assert!(matches!(err, ArgSpecError::InvalidIndex(_)));
    }

    #[test]
    fn test_location_ordering() {
        // canonical sort order: index args, FP args, registers, stack slots
        let mut locs = vec![
            ArgLocation::Stack(1),
            ArgLocation::Register(2),
            ArgLocation::FloatIndex(1),
            ArgLocation::Index(2),
            ArgLocation::Index(1),
        ];
        locs.sort();
        assert_eq!(
            locs,
            vec![
                ArgLocation::Index(1),
                ArgLocation::Index(2),
                ArgLocation::FloatIndex(1),
                ArgLocation::Register(2),
                ArgLocation::Stack(1),
            ]
        );
    }
}
