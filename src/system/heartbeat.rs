// src/system/heartbeat.rs

use crate::constants::HEARTBEAT_INTERVAL;
use lazy_static::lazy_static;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

lazy_static! {
    // Only one heartbeat prints at a time.
    static ref ACTIVE: Mutex<bool> = Mutex::new(false);
}

/// Prints a progress dot every two seconds while a long command runs.
///
/// The thread starts with [`Heartbeat::start`] and stops when the guard is
/// dropped. Starting a heartbeat while another one is active is a no-op.
#[derive(Debug)]
pub struct Heartbeat {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn start() -> Self {
        Self::start_with_interval(HEARTBEAT_INTERVAL)
    }

    pub fn start_with_interval(interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));

        let mut active = ACTIVE.lock().unwrap_or_else(|e| e.into_inner());
        if *active {
            return Self { stop, handle: None };
        }
        *active = true;
        drop(active);

        let flag = stop.clone();
        let handle = thread::spawn(move || {
            let mut last = Instant::now();
            while !flag.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(50).min(interval));
                if last.elapsed() >= interval {
                    print!(".");
                    std::io::stdout().flush().ok();
                    last = Instant::now();
                }
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.stop.store(true, Ordering::Relaxed);
        if handle.join().is_err() {
            log::warn!("Heartbeat thread panicked.");
        }
        *ACTIVE.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }
}
