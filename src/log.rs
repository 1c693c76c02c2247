//! Driver logging filter.
//!
//! Driver records go through the `mux_*` macros with `target: "driver"` unless another
//! target is given. Apart from the `RUST_LOG` filter of the backend, they are bounded by
//! a process-wide level, so a host can keep the transport logs while silencing debugger
//! dialogue (`--quiet`).

use log::{Level, LevelFilter};
use std::sync::atomic::{AtomicUsize, Ordering};

static DRIVER_LEVEL: AtomicUsize = AtomicUsize::new(LevelFilter::Trace as usize);

fn level_filter(raw: usize) -> LevelFilter {
    match raw {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Most verbose level driver records are emitted at.
pub fn driver_level() -> LevelFilter {
    level_filter(DRIVER_LEVEL.load(Ordering::Relaxed))
}

pub fn set_driver_level(level: LevelFilter) {
    DRIVER_LEVEL.store(level as usize, Ordering::Relaxed)
}

/// Keep only driver errors.
pub fn quiet() {
    set_driver_level(LevelFilter::Error)
}

#[inline(always)]
pub fn is_enabled(level: Level) -> bool {
    level <= driver_level()
}

#[doc(hidden)]
#[macro_export]
macro_rules! mux_log {
    ($level:expr, target: $target:expr, $($arg:tt)+) => {
        if $crate::log::is_enabled($level) {
            ::log::log!(target: $target, $level, $($arg)+)
        }
    };
    ($level:expr, $($arg:tt)+) => {
        $crate::mux_log!($level, target: "driver", $($arg)+)
    };
}

#[macro_export]
macro_rules! mux_error {
    ($($arg:tt)+) => { $crate::mux_log!(::log::Level::Error, $($arg)+) };
}

#[macro_export]
macro_rules! mux_warn {
    ($($arg:tt)+) => { $crate::mux_log!(::log::Level::Warn, $($arg)+) };
}

#[macro_export]
macro_rules! mux_info {
    ($($arg:tt)+) => { $crate::mux_log!(::log::Level::Info, $($arg)+) };
}

#[macro_export]
macro_rules! mux_debug {
    ($($arg:tt)+) => { $crate::mux_log!(::log::Level::Debug, $($arg)+) };
}
