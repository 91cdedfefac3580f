use log::LevelFilter;

use sys::{dprint, dprintln, init_logger, read_debug_log};

fn debug_log_contains(needle: &str) -> bool {
    String::from_utf8_lossy(&read_debug_log()).contains(needle)
}

#[test]
fn logger_follows_max_level() {
    init_logger(LevelFilter::Info);
    assert!(log::log_enabled!(log::Level::Info));
    assert!(!log::log_enabled!(log::Level::Debug));

    log::info!("info record 7f3a");
    log::debug!("filtered debug record 7f3a");
    assert!(debug_log_contains("info record 7f3a"));
    assert!(!debug_log_contains("filtered debug record 7f3a"));

    // a second call only changes the level of the installed logger
    init_logger(LevelFilter::Trace);
    assert_eq!(log::max_level(), LevelFilter::Trace);
    assert!(log::log_enabled!(log::Level::Trace));

    log::trace!(target: "logger_test", "trace record 7f3a");
    assert!(debug_log_contains("[TRACE logger_test] trace record 7f3a"));
}

#[test]
fn dprintln_goes_to_the_debug_log() {
    dprint!("partial ");
    dprintln!("line {:#x}", 0xbeefusize);
    dprintln!();

    assert!(debug_log_contains("line 0xbeef\n"));
}
