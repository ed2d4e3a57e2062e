use crate::qemu_fmt::QemuSink;
use core::fmt::{self, Write};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct QemuLogger {
    max_level: LevelFilter,
}

impl QemuLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Call this once during early init.
    #[allow(clippy::missing_errors_doc)]
    pub fn init(self) -> Result<(), SetLoggerError> {
        // No allocator this early; the logger lives in a static.
        static mut LOGGER: Option<QemuLogger> = None;

        let max_level = self.max_level;
        // SAFETY: boot runs single-threaded and `init` is called once.
        let logger: &'static QemuLogger = unsafe { (*&raw mut LOGGER).insert(self) };
        log::set_logger(logger)?;
        log::set_max_level(max_level);
        Ok(())
    }
}

/// Format a record as `"[LEVEL] target: message\n"` into `out`.
///
/// # Errors
/// Propagates errors of the underlying writer.
pub fn write_record<W: Write>(out: &mut W, record: &Record) -> fmt::Result {
    writeln!(
        out,
        "[{}] {}: {}",
        record.level(),
        record.target(),
        record.args()
    )
}

impl Log for QemuLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _ = write_record(&mut QemuSink, record);
    }

    fn flush(&self) {
        // no-op for the semihosting console
    }
}
