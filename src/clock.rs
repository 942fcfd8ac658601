use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

/// Wall-clock reads and sleeps for the scheduler.
pub trait Clock {
    fn now(&self) -> DateTime<Local>;

    /// Sleeps for `dur`. Returns `false` if a stop was requested before the sleep
    /// completed; callers should wind down instead of continuing.
    fn sleep(&mut self, dur: Duration) -> bool;

    fn stop_requested(&self) -> bool {
        false
    }
}

pub(crate) fn sleep_interruptible(stop: &AtomicBool, dur: Duration) -> bool {
    let mut remaining = dur;
    while !remaining.is_zero() {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let step = remaining.min(Duration::from_millis(50));
        std::thread::sleep(step);
        remaining -= step;
    }
    !stop.load(Ordering::SeqCst)
}

/// Real time, interruptible through a shared stop flag (set from a Ctrl+C handler).
#[derive(Debug, Clone, Default)]
pub struct SystemClock {
    stop: Arc<AtomicBool>,
}

impl SystemClock {
    pub fn new(stop: Arc<AtomicBool>) -> Self {
        Self { stop }
    }

    /// Installs a Ctrl+C handler that flips this clock's stop flag.
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let stop = self.stop.clone();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .context("failed to install Ctrl+C handler")
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&mut self, dur: Duration) -> bool {
        sleep_interruptible(&self.stop, dur)
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Simulated time: sleeps advance `now` instantly and are recorded.
///
/// With a budget set, a sleep that would run past the budget is refused (returns
/// `false`) and time does not advance.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    start: DateTime<Local>,
    now: DateTime<Local>,
    budget: Option<Duration>,
    slept: Vec<Duration>,
}

impl VirtualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            start,
            now: start,
            budget: None,
            slept: Vec::new(),
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn slept(&self) -> &[Duration] {
        &self.slept
    }

    pub fn elapsed(&self) -> Duration {
        (self.now - self.start).to_std().unwrap_or_default()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Local> {
        self.now
    }

    fn sleep(&mut self, dur: Duration) -> bool {
        if let Some(budget) = self.budget {
            if self.elapsed() + dur > budget {
                return false;
            }
        }

        let delta = chrono::Duration::from_std(dur).unwrap_or_else(|_| chrono::Duration::zero());
        self.now = self.now + delta;
        self.slept.push(dur);
        true
    }
}
