use core::fmt::{self, Write};
use core::sync::atomic::{AtomicUsize, Ordering};
use std::io::Write as _;

use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

use crate::kernel::KERNEL;
use crate::{Handle, KResult, SysErr};

/// Number of most recent bytes of debug output the kernel keeps
const DEBUG_LOG_CAPACITY: usize = 0x10000;

static DEBUG_LOG: Mutex<Vec<u8>> = Mutex::new(Vec::new());

/// Prints `data` to the kernel debug log
pub fn debug_print(data: &[u8]) {
    {
        let mut log = DEBUG_LOG.lock();
        log.extend_from_slice(data);
        if log.len() > DEBUG_LOG_CAPACITY {
            let excess = log.len() - DEBUG_LOG_CAPACITY;
            log.drain(..excess);
        }
    }

    let mut stderr = std::io::stderr().lock();
    // the debug log is best effort, there is nowhere to report a failed write
    stderr.write_all(data).ok();
}

/// Returns a copy of the most recent debug output, oldest bytes first
pub fn read_debug_log() -> Vec<u8> {
    DEBUG_LOG.lock().clone()
}

/// A writer which writes output to the debug_print syscall
struct DebugWriter;

impl Write for DebugWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        debug_print(s.as_bytes());
        Ok(())
    }
}

static DEBUG_WRITER: Mutex<DebugWriter> = Mutex::new(DebugWriter);

#[doc(hidden)]
pub fn _dprint(args: fmt::Arguments) {
    // DebugWriter never fails
    DEBUG_WRITER.lock().write_fmt(args).ok();
}

#[macro_export]
macro_rules! dprint {
    ($($arg:tt)*) => ($crate::_dprint(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! dprintln {
    () => ($crate::dprint!("\n"));
    ($($arg:tt)*) => ($crate::dprint!("{}\n", format_args!($($arg)*)));
}

/// Logger which writes records to the kernel debug log
pub struct DebugLogger {
    max_level: AtomicUsize,
}

impl DebugLogger {
    pub const fn new(max_level: LevelFilter) -> Self {
        DebugLogger {
            max_level: AtomicUsize::new(max_level as usize),
        }
    }

    pub fn set_max_level(&self, max_level: LevelFilter) {
        self.max_level.store(max_level as usize, Ordering::Relaxed);
    }
}

impl Log for DebugLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() as usize <= self.max_level.load(Ordering::Relaxed)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        _dprint(format_args!("[{:<5} {}] {}\n", record.level(), record.target(), record.args()));
    }

    fn flush(&self) {}
}

static LOGGER: spin::Once<DebugLogger> = spin::Once::new();

/// Installs [`DebugLogger`] as the global logger
///
/// Only the first call installs a logger, later calls only change the maximum level
pub fn init_logger(max_level: LevelFilter) {
    let logger = LOGGER.call_once(|| DebugLogger::new(max_level));
    logger.set_max_level(max_level);
    // fails if another logger is already installed, which is fine
    log::set_logger(logger).ok();
    log::set_max_level(max_level);
}

/// Fires interrupt `name`, signaling every interrupt event bound to it
///
/// This stands in for hardware on hosted targets
pub fn raise_interrupt(name: u32) {
    let mut kernel = KERNEL.lock();

    for object in kernel.objects.interrupt_events(name) {
        // interrupt_events only returns interrupt event objects
        let _ = kernel.set_signaled(object, true);
    }
}

/// Asks the kernel to preempt the thread referred to by `thread`
///
/// If the thread's disable count is non zero, the preemption is deferred by setting its interrupt flag instead
pub fn request_preemption(thread: Handle) -> KResult<()> {
    let kernel = KERNEL.lock();

    let thread = kernel.thread_by_handle(thread)?.ok_or(SysErr::InvalidState)?;
    let tlr = &kernel.thread(thread).thread.tlr;
    if tlr.disable_count() > 0 {
        tlr.interrupt_flag.store(true, core::sync::atomic::Ordering::Release);
    }
    Ok(())
}
