// src/system/interrupt.rs

use colored::Colorize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

static DEFER_DEPTH: AtomicUsize = AtomicUsize::new(0);
static PENDING: AtomicBool = AtomicBool::new(false);

/// Installs the process-wide Ctrl+C handler.
///
/// Outside of a deferred section the process prints a short message and exits
/// with code 130. Inside one, the interrupt is remembered and acted upon when
/// the outermost [`DeferGuard`] is dropped.
pub fn install_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(|| {
        if DEFER_DEPTH.load(Ordering::SeqCst) > 0 {
            PENDING.store(true, Ordering::SeqCst);
            log::warn!("Interrupt received while writing configuration; finishing the write first.");
        } else {
            exit_interrupted();
        }
    })
}

/// Defers interrupt handling until the returned guard is dropped.
pub fn defer() -> DeferGuard {
    DEFER_DEPTH.fetch_add(1, Ordering::SeqCst);
    DeferGuard { _private: () }
}

#[derive(Debug)]
pub struct DeferGuard {
    _private: (),
}

impl Drop for DeferGuard {
    fn drop(&mut self) {
        let previous = DEFER_DEPTH.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && PENDING.swap(false, Ordering::SeqCst) {
            exit_interrupted();
        }
    }
}

fn exit_interrupted() -> ! {
    eprintln!("\n{}", t!("interrupt.message").yellow());
    std::process::exit(130);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defer_guards_nest() {
        let outer = defer();
        {
            let _inner = defer();
            assert!(DEFER_DEPTH.load(Ordering::SeqCst) >= 2);
        }
        assert!(DEFER_DEPTH.load(Ordering::SeqCst) >= 1);
        drop(outer);
    }
}
