//! # QEMU Development and Debug Support (ARM)
//!
//! Early-boot diagnostics for kernels running under QEMU's ARM system
//! emulation. Output goes to the host through the **semihosting** console
//! (`SYS_WRITEC`), which works before any UART is configured and does not
//! depend on the translation tables being live.
//!
//! ## Core Components
//!
//! * [`QemuLogger`]: a `log::Log` implementation that formats records as
//!   `"[LEVEL] target: message\n"` without allocating.
//! * [`qemu_fmt::QemuSink`]: a `fmt::Write` over the same console.
//!
//! ## Feature System
//!
//! The `enabled` feature (default) compiles the semihosting call in. Without
//! it, or on non-ARM hosts (unit tests), every write is a no-op.
//!
//! ## Host-Side Configuration
//!
//! ```bash
//! qemu-system-arm -M virt -cpu cortex-a15 -semihosting -nographic -kernel boot.elf
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::{QemuLogger, write_record};

pub mod qemu_fmt {
    use core::fmt::{self, Write};

    /// Semihosting operation: write one character to the debug console.
    #[cfg(all(feature = "enabled", target_arch = "arm"))]
    const SYS_WRITEC: u32 = 0x03;

    /// Write a single character to the semihosting console.
    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn dbg_putc(c: u8) {
        #[cfg(all(feature = "enabled", target_arch = "arm"))]
        // SAFETY: `SYS_WRITEC` reads one byte through r1, which points at `c`.
        unsafe {
            semihost(SYS_WRITEC, &raw const c);
        }
        #[cfg(not(all(feature = "enabled", target_arch = "arm")))]
        let _ = c;
    }

    /// Issue a semihosting call in A32 state.
    #[cfg(all(feature = "enabled", target_arch = "arm"))]
    #[allow(clippy::inline_always)]
    #[inline(always)]
    unsafe fn semihost(op: u32, param: *const u8) {
        // SAFETY: the debugger services the trap; `param` validity is the
        // caller's contract for `op`.
        unsafe {
            core::arch::asm!(
            "svc #0x123456",
            inout("r0") op => _,
            in("r1") param,
            options(nostack, preserves_flags)
            );
        }
    }

    pub struct QemuSink;

    impl Write for QemuSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for b in s.bytes() {
                dbg_putc(b);
            }
            Ok(())
        }
    }
}
