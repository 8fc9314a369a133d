//! Architecture collaborators for argument resolution
//!
//! Provides the register-name table used by `%<reg>` locators and the host
//! probes the parsers consult: whether the machine narrows 80-bit long
//! double to double (ARM), and whether a given shared object is loaded in
//! the current process.

use std::ffi::CStr;
use std::sync::OnceLock;

/// Argument registers addressable from a `%<name>` locator, in index order.
/// Integer registers first (SysV calling convention order), then FP registers.
const ARG_REGISTERS: &[&str] = &[
    "rdi", "rsi", "rdx", "rcx", "r8", "r9", // integer args
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7",
];

/// Resolve a register name to its index in the argument register table.
pub fn register_index(name: &str) -> Option<u32> {
    ARG_REGISTERS
        .iter()
        .position(|reg| *reg == name)
        .map(|idx| idx as u32)
}

/// Memoized host facts needed while parsing argument specs.
///
/// The machine probe is computed eagerly at construction; the shared-object
/// probe walks the loaded objects and is computed lazily on first use, then
/// cached for the lifetime of the probes.
#[derive(Debug)]
pub struct HostProbes {
    long_double_narrowed: bool,
    libcxx_loaded: OnceLock<bool>,
}

impl HostProbes {
    /// Probe the running host.
    pub fn detect() -> Self {
        let machine = nix::sys::utsname::uname()
            .map(|uts| uts.machine().to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            long_double_narrowed: machine.starts_with("arm"),
            libcxx_loaded: OnceLock::new(),
        }
    }

    /// Probes with fixed answers, for tests and cross-target setups.
    pub fn fixed(long_double_narrowed: bool, libcxx_loaded: bool) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(libcxx_loaded);
        Self {
            long_double_narrowed,
            libcxx_loaded: cell,
        }
    }

    /// Whether this machine folds 80-bit extended floats into double.
    pub fn long_double_narrowed(&self) -> bool {
        self.long_double_narrowed
    }

    /// Whether `libc++.so` is loaded in the current process.
    pub fn libcxx_loaded(&self) -> bool {
        *self
            .libcxx_loaded
            .get_or_init(|| shared_object_loaded("libc++.so"))
    }
}

struct SearchState<'a> {
    soname: &'a str,
    found: bool,
}

unsafe extern "C" fn check_object_cb(
    info: *mut libc::dl_phdr_info,
    _size: libc::size_t,
    data: *mut libc::c_void,
) -> libc::c_int {
    let state = unsafe { &mut *data.cast::<SearchState<'_>>() };
    let name = unsafe { (*info).dlpi_name };
    if name.is_null() {
        return 0;
    }

    let path = unsafe { CStr::from_ptr(name) }.to_string_lossy();
    let base = path.rsplit('/').next().unwrap_or("");
    if base.starts_with(state.soname) {
        state.found = true;
        return 1; // stop iteration
    }
    0
}

/// Check whether a shared object with the given basename is currently
/// mapped into this process.
fn shared_object_loaded(soname: &str) -> bool {
    let mut state = SearchState {
        soname,
        found: false,
    };

    unsafe {
        libc::dl_iterate_phdr(
            Some(check_object_cb),
            (&mut state as *mut SearchState<'_>).cast::<libc::c_void>(),
        );
    }

    state.found
}
