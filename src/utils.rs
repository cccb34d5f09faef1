use std::{
    process::exit,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use tracing::info;

use crate::error::{RequestError, Result};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Set by the interrupt handler, checked by the run between steps so a file
/// write in progress always completes.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    /// Returns whether an interrupt was already pending.
    pub fn raise(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_raised() {
            Err(RequestError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Blocking pause between steps of the run.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Sleeps in short slices and wakes up early on interrupt.
pub struct ThreadSleeper {
    interrupt: Interrupt,
}

impl ThreadSleeper {
    pub fn new(interrupt: Interrupt) -> Self {
        Self { interrupt }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.interrupt.is_raised() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            thread::sleep(left.min(SLEEP_SLICE));
        }
    }
}

/// Logs the wait before pausing.
pub fn wait(sleeper: &mut impl Sleeper, duration: Duration, what: &str) {
    info!("Waiting for {} seconds {what}", duration.as_secs());
    sleeper.sleep(duration);
}

pub fn exit_with_msg_and_code(message: &str, code: i32) -> ! {
    eprintln!("{message}");
    exit(code)
}
