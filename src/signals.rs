//! Crash signal handling (spec §7): `SIGABRT`, `SIGSEGV`, `SIGBUS`,
//! `SIGTRAP`, `SIGILL` print the signal name and exit(1) immediately,
//! unless `SHOW_CRASH_DIALOG=1`, in which case the default disposition is
//! restored and the signal re-raised so a platform crash dialog can attach.
//!
//! Grounded on the `denoland-deno` example's use of `signal-hook` for
//! process-wide signal plumbing (its `ext/os` and `ext/signals` crates),
//! adapted to a single dedicated listener thread instead of an extension API
//! surfaced to scripts.

use signal_hook::consts::{SIGABRT, SIGBUS, SIGILL, SIGSEGV, SIGTRAP};
use signal_hook::iterator::Signals;

const CRASH_SIGNALS: [i32; 5] = [SIGABRT, SIGSEGV, SIGBUS, SIGTRAP, SIGILL];

fn signal_name(signal: i32) -> &'static str {
    match signal {
        SIGABRT => "SIGABRT",
        SIGSEGV => "SIGSEGV",
        SIGBUS => "SIGBUS",
        SIGTRAP => "SIGTRAP",
        SIGILL => "SIGILL",
        _ => "UNKNOWN",
    }
}

/// Spawns a dedicated thread that blocks on the crash-signal set and acts on
/// the first one delivered. `show_crash_dialog` mirrors `SHOW_CRASH_DIALOG=1`.
pub fn install(show_crash_dialog: bool) {
    let mut signals = match Signals::new(CRASH_SIGNALS) {
        Ok(signals) => signals,
        Err(e) => {
            log::warn!("could not install crash signal handler: {e}");
            return;
        }
    };

    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            eprintln!("mystral: received {}", signal_name(signal));
            if show_crash_dialog {
                signal_hook::low_level::emulate_default_handler(signal).ok();
            } else {
                std::process::exit(1);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_crash_signal_has_a_printable_name() {
        for signal in CRASH_SIGNALS {
            assert_ne!(signal_name(signal), "UNKNOWN");
        }
    }
}
