use std::ops::Range;
use std::time::Duration;

use anyhow::{ensure, Result};
use chrono::{DateTime, Local};
use rand::Rng;
use serde::Serialize;

use crate::clock::Clock;
use crate::composer::perform_turn;
use crate::inject::InputInjector;
use crate::model::ActionRecord;
use crate::sink::LogSink;
use crate::timing::TimingModel;
use crate::window::{WindowBridge, WindowHandle};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub startup_delay: Duration,
    /// Extended breaks are only considered once more than this many actions ran.
    pub extended_break_after: u64,
    pub extended_break_probability: f64,
    pub extended_break_secs: Range<u64>,
    pub delay_ceiling_secs: u64,
    /// Replacement range for delays over the ceiling.
    pub ceiling_fallback_secs: Range<u64>,
    pub test_turns: u64,
    pub test_spacing: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(10),
            extended_break_after: 10,
            extended_break_probability: 0.05,
            extended_break_secs: 60..180,
            delay_ceiling_secs: 240,
            ceiling_fallback_secs: 180..240,
            test_turns: 10,
            test_spacing: Duration::from_secs(1),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.extended_break_probability),
            "extended_break_probability must be between 0.0 and 1.0"
        );
        ensure!(
            !self.extended_break_secs.is_empty(),
            "extended_break_secs must not be empty"
        );
        ensure!(
            !self.ceiling_fallback_secs.is_empty(),
            "ceiling_fallback_secs must not be empty"
        );
        ensure!(
            self.ceiling_fallback_secs.start > 0
                && self.ceiling_fallback_secs.end <= self.delay_ceiling_secs,
            "ceiling_fallback_secs must lie within (0, delay_ceiling_secs]"
        );
        Ok(())
    }
}

/// Process-lifetime counters for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub started_at: DateTime<Local>,
    pub actions: u64,
    pub keys: u64,
}

impl SessionStats {
    pub fn new(started_at: DateTime<Local>) -> Self {
        Self::with_counts(started_at, 0, 0)
    }

    pub fn with_counts(started_at: DateTime<Local>, actions: u64, keys: u64) -> Self {
        Self {
            started_at,
            actions,
            keys,
        }
    }

    pub fn next_turn(&self) -> u64 {
        self.actions + 1
    }

    pub fn record(&mut self, record: &ActionRecord) {
        self.actions += 1;
        self.keys += record.key_count();
    }

    pub fn elapsed(&self, now: DateTime<Local>) -> Duration {
        (now - self.started_at).to_std().unwrap_or_default()
    }
}

/// How the delay after one turn was arrived at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DelayDecision {
    pub pattern: usize,
    pub base_secs: i64,
    pub extended_break_secs: Option<u64>,
    /// Base plus any extended break, before the ceiling.
    pub uncapped_secs: i64,
    pub ceiling_replaced: bool,
    pub delay_secs: u64,
}

impl DelayDecision {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Samples the wait before the next turn.
///
/// `stats` must already include the turn that just ran. Over-ceiling results are
/// replaced by a fresh draw from the fallback range, not clamped.
pub fn next_delay<R: Rng + ?Sized>(
    cfg: &SchedulerConfig,
    timing: &TimingModel,
    stats: &SessionStats,
    rng: &mut R,
) -> DelayDecision {
    let sample = timing.sample_inter(rng);
    let mut uncapped = sample.seconds;

    let mut extended_break_secs = None;
    if stats.actions > cfg.extended_break_after && rng.gen_bool(cfg.extended_break_probability) {
        let extra = rng.gen_range(cfg.extended_break_secs.clone());
        uncapped += extra as i64;
        extended_break_secs = Some(extra);
    }

    let ceiling_replaced = uncapped > cfg.delay_ceiling_secs as i64;
    let delay_secs = if ceiling_replaced {
        rng.gen_range(cfg.ceiling_fallback_secs.clone())
    } else {
        uncapped.max(1) as u64
    };

    DelayDecision {
        pattern: sample.pattern,
        base_secs: sample.seconds,
        extended_break_secs,
        uncapped_secs: uncapped,
        ceiling_replaced,
        delay_secs,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnReport {
    pub record: ActionRecord,
    pub delay: DelayDecision,
    pub next_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Stopped before the first turn.
    DuringStartup,
    Stopped(SessionStats),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestOutcome {
    pub turns: u64,
    pub completed: bool,
    pub stats: SessionStats,
}

/// Everything one scheduler run talks to.
pub struct Session<'a> {
    pub cfg: &'a SchedulerConfig,
    pub timing: &'a TimingModel,
    pub injector: &'a mut dyn InputInjector,
    pub bridge: &'a mut dyn WindowBridge,
    pub target: WindowHandle,
    pub clock: &'a mut dyn Clock,
    pub sink: &'a mut LogSink,
}

impl Session<'_> {
    fn focus_target(&mut self) {
        if let Err(err) = self.bridge.focus_and_raise(self.target) {
            log::debug!("best-effort focus of {} failed: {err:#}", self.target);
        }
    }

    /// Focus, act, pick the next delay, log. Does not sleep the delay.
    pub fn run_turn<R: Rng + ?Sized>(
        &mut self,
        stats: &mut SessionStats,
        rng: &mut R,
    ) -> TurnReport {
        let started = self.clock.now();
        let elapsed = stats.elapsed(started);

        self.focus_target();

        let record = perform_turn(
            stats.next_turn(),
            self.timing,
            &mut *self.injector,
            &mut *self.clock,
            rng,
        );
        stats.record(&record);
        self.sink.action(&record);

        let delay = next_delay(self.cfg, self.timing, stats, rng);
        if let Some(extra) = delay.extended_break_secs {
            self.sink.extended_break(started, extra, delay.uncapped_secs);
        }

        let now = self.clock.now();
        let next_at = now + chrono::Duration::seconds(delay.delay_secs as i64);
        self.sink.stats(started, elapsed, stats, next_at, delay.delay_secs);

        TurnReport {
            record,
            delay,
            next_at,
        }
    }

    /// Runs turns with the given counters until the clock reports a stop.
    pub fn run_loop<R: Rng + ?Sized>(&mut self, stats: &mut SessionStats, rng: &mut R) {
        while !self.clock.stop_requested() {
            let report = self.run_turn(stats, rng);
            if !self.clock.sleep(report.delay.delay()) {
                break;
            }
        }
    }

    /// Startup delay, session markers, then the unbounded loop.
    pub fn run<R: Rng + ?Sized>(&mut self, rng: &mut R) -> SessionEnd {
        self.sink.console(&format!(
            "Anti-idle will start in {} seconds...",
            self.cfg.startup_delay.as_secs()
        ));
        if !self.clock.sleep(self.cfg.startup_delay) {
            return SessionEnd::DuringStartup;
        }

        let started_at = self.clock.now();
        let title = self.bridge.title(self.target);
        self.sink.session_started(started_at, self.target, &title);

        let mut stats = SessionStats::new(started_at);
        self.run_loop(&mut stats, rng);

        let now = self.clock.now();
        self.sink.session_ended(now, &stats);
        SessionEnd::Stopped(stats)
    }

    /// A fixed number of turns at fixed spacing; inter-action sampling is bypassed.
    pub fn run_test_mode<R: Rng + ?Sized>(&mut self, rng: &mut R) -> TestOutcome {
        let total = self.cfg.test_turns;
        self.sink.console("=== TEST MODE ===");
        self.sink.console(&format!(
            "Sending {total} test inputs, one every {}s...",
            self.cfg.test_spacing.as_secs()
        ));

        let started_at = self.clock.now();
        self.sink.test_started(started_at);

        let mut stats = SessionStats::new(started_at);
        let mut completed = true;
        for turn in 1..=total {
            if self.clock.stop_requested() {
                completed = false;
                break;
            }

            self.focus_target();
            self.sink.console(&format!("Test {turn}/{total}"));

            let record = perform_turn(
                turn,
                self.timing,
                &mut *self.injector,
                &mut *self.clock,
                rng,
            );
            stats.record(&record);
            self.sink.action(&record);

            if !self.clock.sleep(self.cfg.test_spacing) {
                completed = false;
                break;
            }
        }

        if completed {
            let now = self.clock.now();
            self.sink.test_completed(now);
            self.sink.console("Test complete!");
        }

        TestOutcome {
            turns: stats.actions,
            completed,
            stats,
        }
    }
}
